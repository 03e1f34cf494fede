//! Specialized function type construction.

use std::collections::BTreeMap;

use ossa_ir::{FnRepresentation, FnType, Idx, ParamInfo, Requirement, TypePool};

/// The type of a specialized function and its fresh generic parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecializedSignature {
    pub ty: FnType,
    /// Selected parameter index → generic parameter replacing its type.
    pub generic_params: BTreeMap<usize, Idx>,
}

/// Build the type of the specialization of `orig` that takes the
/// parameters at `selected` generically.
///
/// The new generic parameters sit one level below `orig`'s own, numbered in
/// index order, each with a single conformance requirement to the
/// constraint of the existential it replaces. Conventions, results and the
/// error type are kept; the representation becomes thin.
///
/// # Panics
///
/// Panics if a selected parameter is not existential.
pub fn build_specialized_signature(
    pool: &mut TypePool,
    orig: &FnType,
    selected: impl IntoIterator<Item = usize>,
) -> SpecializedSignature {
    let depth = orig.generic_sig.next_depth(pool);
    let mut generic_params = BTreeMap::new();
    let mut params = Vec::new();
    let mut requirements = Vec::new();

    for index in selected {
        let existential = orig.params[index].ty;
        let Some(constraint) = pool.existential_constraint(existential) else {
            panic!(
                "selected argument {index} has non-existential type {:?}",
                existential
            );
        };
        let ordinal = u32::try_from(generic_params.len())
            .unwrap_or_else(|_| panic!("too many generic parameters"));
        let param = pool.generic_param(depth, ordinal);
        if generic_params.insert(index, param).is_some() {
            panic!("argument {index} selected twice");
        }
        params.push(param);
        requirements.push(Requirement::conformance(param, constraint));
    }

    let ty = FnType {
        generic_sig: orig.generic_sig.extended(params, requirements),
        representation: FnRepresentation::Thin,
        params: orig
            .params
            .iter()
            .enumerate()
            .map(|(index, param)| ParamInfo {
                ty: generic_params.get(&index).copied().unwrap_or(param.ty),
                convention: param.convention,
            })
            .collect(),
        result: orig.result,
        error: orig.error,
    };

    SpecializedSignature { ty, generic_params }
}
