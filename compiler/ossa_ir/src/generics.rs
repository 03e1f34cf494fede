//! Generic signatures, requirements, conformances and substitution maps.
//!
//! A [`GenericSignature`] lists generic parameter types (each a
//! [`TypeKind::GenericParam`](crate::TypeKind::GenericParam) at some depth)
//! and the requirements placed on them. A call to a generic function
//! supplies a [`SubstitutionMap`] binding every parameter of the callee's
//! signature to a concrete, opened or caller-generic type.

use crate::types::{Idx, TypePool};

/// The kind of constraint a requirement places on its subject.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum RequirementKind {
    /// Subject conforms to a protocol or composition.
    Conformance,
    /// Subject is a subclass of a class type.
    Superclass,
    /// Subject is the same type as the constraint.
    SameType,
}

/// A single requirement of a generic signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Requirement {
    pub kind: RequirementKind,
    pub subject: Idx,
    pub constraint: Idx,
}

impl Requirement {
    pub fn conformance(subject: Idx, constraint: Idx) -> Self {
        Requirement {
            kind: RequirementKind::Conformance,
            subject,
            constraint,
        }
    }
}

/// Generic parameters plus their requirements.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct GenericSignature {
    params: Vec<Idx>,
    requirements: Vec<Requirement>,
}

impl GenericSignature {
    pub fn new(params: Vec<Idx>, requirements: Vec<Requirement>) -> Self {
        GenericSignature {
            params,
            requirements,
        }
    }

    /// The signature of a non-generic function.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn params(&self) -> &[Idx] {
        &self.params
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// The depth at which parameters of a signature nested inside this one
    /// are placed: one past the deepest parameter, or 0 when non-generic.
    pub fn next_depth(&self, pool: &TypePool) -> u32 {
        self.params
            .iter()
            .filter_map(|&param| pool.generic_param_key(param))
            .map(|(depth, _)| depth + 1)
            .max()
            .unwrap_or(0)
    }

    /// This signature with additional parameters and requirements appended.
    pub fn extended(&self, params: Vec<Idx>, requirements: Vec<Requirement>) -> Self {
        let mut extended = self.clone();
        extended.params.extend(params);
        extended.requirements.extend(requirements);
        extended
    }

    /// Requirements whose subject is `subject`.
    pub fn requirements_for(&self, subject: Idx) -> impl Iterator<Item = &Requirement> + '_ {
        self.requirements
            .iter()
            .filter(move |req| req.subject == subject)
    }
}

/// Evidence that a type conforms to a protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Conformance {
    /// A declared conformance of a concrete type.
    Concrete { ty: Idx, protocol: Idx },
    /// A conformance guaranteed by a requirement on a generic or opened type,
    /// resolved only once the type is substituted.
    Abstract { ty: Idx, protocol: Idx },
}

impl Conformance {
    pub fn protocol(self) -> Idx {
        match self {
            Conformance::Concrete { protocol, .. } | Conformance::Abstract { protocol, .. } => {
                protocol
            }
        }
    }
}

/// Replacement types for the parameters of a generic signature.
///
/// Entries are kept in the order of the signature's parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct SubstitutionMap {
    entries: Vec<(Idx, Idx)>,
}

impl SubstitutionMap {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a map for `sig`, asking `replacement` for each parameter.
    pub fn build(sig: &GenericSignature, mut replacement: impl FnMut(Idx) -> Idx) -> Self {
        SubstitutionMap {
            entries: sig
                .params()
                .iter()
                .map(|&param| (param, replacement(param)))
                .collect(),
        }
    }

    /// The identity map: every parameter maps to itself.
    pub fn forwarding(sig: &GenericSignature) -> Self {
        Self::build(sig, |param| param)
    }

    pub fn lookup(&self, param: Idx) -> Option<Idx> {
        self.entries
            .iter()
            .find(|(p, _)| *p == param)
            .map(|(_, replacement)| *replacement)
    }

    /// Substitute `ty`.
    ///
    /// Types in the pool are atomic with respect to generic parameters, so
    /// only a parameter itself is ever replaced.
    pub fn apply(&self, ty: Idx) -> Idx {
        self.lookup(ty).unwrap_or(ty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Idx, Idx)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
