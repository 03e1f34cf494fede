//! Argument model: per-parameter descriptors and candidate validation.

use std::collections::BTreeMap;

use ossa_ir::{
    ArgFlags, ExistentialRepr, FuncId, Function, Idx, Module, Name, OpenedAccess, OwnershipKind,
    ParamConvention, ValueId,
};
use thiserror::Error;

/// One parameter of a candidate function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArgumentDescriptor {
    pub index: usize,
    /// The entry block argument.
    pub value: ValueId,
    pub ty: Idx,
    pub convention: ParamConvention,
    pub ownership: OwnershipKind,
    pub decl: Option<Name>,
    pub flags: ArgFlags,
}

impl ArgumentDescriptor {
    /// Describe every parameter of `func`, in order.
    pub fn collect(func: &Function) -> Vec<ArgumentDescriptor> {
        func.entry_args()
            .iter()
            .zip(&func.ty.params)
            .enumerate()
            .map(|(index, (&value, param))| {
                let data = func.value(value);
                ArgumentDescriptor {
                    index,
                    value,
                    ty: param.ty,
                    convention: param.convention,
                    ownership: data.ownership,
                    decl: data.decl,
                    flags: data.flags,
                }
            })
            .collect()
    }
}

/// Metadata of a parameter selected for specialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExistentialArgDescriptor {
    /// Whether the body takes ownership of the boxed value.
    pub is_consumed: bool,
    /// Access mode used when opening the box.
    pub access: OpenedAccess,
}

impl ExistentialArgDescriptor {
    /// Metadata implied by a parameter convention: consuming and mutating
    /// conventions open the box mutably.
    pub fn for_convention(convention: ParamConvention) -> Self {
        let mutating = convention.is_consumed() || convention == ParamConvention::IndirectInout;
        ExistentialArgDescriptor {
            is_consumed: convention.is_consumed(),
            access: if mutating {
                OpenedAccess::Mutable
            } else {
                OpenedAccess::Immutable
            },
        }
    }
}

/// A function together with the parameters to turn into generic ones.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub function: FuncId,
    pub existential_args: BTreeMap<usize, ExistentialArgDescriptor>,
}

impl Candidate {
    pub fn new(function: FuncId) -> Self {
        Candidate {
            function,
            existential_args: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_arg(mut self, index: usize, descriptor: ExistentialArgDescriptor) -> Self {
        self.existential_args.insert(index, descriptor);
        self
    }

    /// Select `indices`, deriving each descriptor from the parameter's
    /// convention. Out-of-range indices are kept and rejected by
    /// [`check_candidate`].
    pub fn from_conventions(
        module: &Module,
        function: FuncId,
        indices: impl IntoIterator<Item = usize>,
    ) -> Self {
        let params = &module.function(function).ty.params;
        let existential_args = indices
            .into_iter()
            .map(|index| {
                let convention = params
                    .get(index)
                    .map_or(ParamConvention::DirectGuaranteed, |p| p.convention);
                (index, ExistentialArgDescriptor::for_convention(convention))
            })
            .collect();
        Candidate {
            function,
            existential_args,
        }
    }
}

/// Why a candidate cannot be specialized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CandidateError {
    #[error("function has no body")]
    NoBody,

    #[error("no arguments selected")]
    NoSelection,

    #[error("argument {index} out of range ({params} parameters)")]
    IndexOutOfRange { index: usize, params: usize },

    #[error("argument {index} is not an existential")]
    NotExistential { index: usize },

    #[error("argument {index} has unsupported existential representation {repr:?}")]
    UnsupportedRepresentation { index: usize, repr: ExistentialRepr },

    #[error("opaque existential argument {index} is not passed indirectly")]
    OpaqueNotIndirect { index: usize },

    #[error("argument {index} is inout")]
    InoutArgument { index: usize },

    #[error("argument {index} consumption does not match its convention")]
    ConsumptionMismatch { index: usize },
}

/// Check that `candidate` satisfies the transform's preconditions.
pub fn check_candidate(module: &Module, candidate: &Candidate) -> Result<(), CandidateError> {
    let func = module.function(candidate.function);
    if !func.is_definition() {
        return Err(CandidateError::NoBody);
    }
    if candidate.existential_args.is_empty() {
        return Err(CandidateError::NoSelection);
    }

    let params = &func.ty.params;
    for (&index, desc) in &candidate.existential_args {
        let Some(param) = params.get(index) else {
            return Err(CandidateError::IndexOutOfRange {
                index,
                params: params.len(),
            });
        };
        let Some(repr) = module.types.existential_repr(param.ty) else {
            return Err(CandidateError::NotExistential { index });
        };
        if param.convention == ParamConvention::IndirectInout {
            return Err(CandidateError::InoutArgument { index });
        }
        if desc.is_consumed != param.convention.is_consumed() {
            return Err(CandidateError::ConsumptionMismatch { index });
        }
        match repr {
            ExistentialRepr::Opaque if !param.convention.is_indirect() => {
                return Err(CandidateError::OpaqueNotIndirect { index });
            }
            ExistentialRepr::Opaque | ExistentialRepr::Class => {}
            ExistentialRepr::Boxed => {
                return Err(CandidateError::UnsupportedRepresentation { index, repr });
            }
        }
    }
    Ok(())
}
