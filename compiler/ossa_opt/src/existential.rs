//! Existential specialization.
//!
//! Turns existential parameters of a function `f` into generic parameters:
//!
//! ```text
//! f(n: int, x: any P)                    f'<τ: P>(n: int, x: τ)
//!   <body using x>              ==>        x0 = <box x as any P>
//!                                          <body using x0>
//!                                          <release x0 at every exit>
//!
//!                                        f(n: int, x: any P)
//!                                          o = open x       // o: @opened any P
//!                                          apply f'<@opened any P>(n, o)
//! ```
//!
//! The specialization `f'` is registered in the module under a name derived
//! from `f`'s name and the selected parameters. `f` keeps its signature and
//! becomes an always-inline thunk, so once it is inlined into a caller that
//! knows the dynamic type, the call to `f'` can be devirtualized.
//!
//! # Pieces
//!
//! - [`descriptor`]: argument model and candidate validation
//! - [`signature`]: generic signature and type of `f'`
//! - [`mangle`]: the specialization's name
//! - `clone`: `f'`'s body: boxing prologue, cloned CFG, exit cleanups
//! - `thunk`: `f`'s new body: opening, substitution map, forwarding call
//!
//! # Ownership
//!
//! Every scratch slot and every value copied to satisfy a convention is
//! released exactly once on every path out of `f'` and out of the thunk,
//! including the error path of a throwing specialization. Values the body
//! consumes itself are never released by the transform.
//!
//! # Concurrency
//!
//! The transform mutates the module's function table through `&mut Module`;
//! one module is transformed by one thread at a time.

mod clone;
pub mod descriptor;
pub mod mangle;
pub mod signature;
mod thunk;

use std::collections::BTreeMap;

use ossa_ir::verify::verify_function;
use ossa_ir::{
    ExistentialRepr, FnType, FuncId, Function, FunctionFlags, Idx, Module, Name, OpenedAccess,
    ParamConvention,
};

use self::clone::SpecializerCloner;
use self::descriptor::{check_candidate, ArgumentDescriptor, Candidate};
use self::mangle::ExistentialMangler;
use self::signature::{build_specialized_signature, SpecializedSignature};
use self::thunk::ThunkBuilder;

/// Knobs of the transform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransformOptions {
    /// Run the IR verifier on the specialization and the thunk afterwards.
    pub verify: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        TransformOptions {
            verify: cfg!(debug_assertions),
        }
    }
}

/// Outcome of one transform invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Specialization {
    /// The generic specialization the thunk forwards to.
    pub specialized: FuncId,
    /// Whether the specialization already existed.
    pub reused: bool,
}

/// A parameter being turned into a generic one.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SelectedArg {
    pub existential: Idx,
    pub generic_param: Idx,
    pub repr: ExistentialRepr,
    pub convention: ParamConvention,
    pub is_consumed: bool,
    pub access: OpenedAccess,
}

pub struct ExistentialTransform<'m> {
    module: &'m mut Module,
    candidate: Candidate,
    options: TransformOptions,
}

impl<'m> ExistentialTransform<'m> {
    /// # Panics
    ///
    /// Panics if the candidate fails [`check_candidate`].
    pub fn new(module: &'m mut Module, candidate: Candidate) -> Self {
        Self::with_options(module, candidate, TransformOptions::default())
    }

    pub fn with_options(
        module: &'m mut Module,
        candidate: Candidate,
        options: TransformOptions,
    ) -> Self {
        if let Err(err) = check_candidate(module, &candidate) {
            panic!(
                "invalid existential specialization candidate `{}`: {err}",
                module.names.resolve(module.function(candidate.function).name)
            );
        }
        ExistentialTransform {
            module,
            candidate,
            options,
        }
    }

    /// Create (or reuse) the specialization and turn the candidate into a
    /// thunk forwarding to it.
    pub fn run(self) -> Specialization {
        let ExistentialTransform {
            module,
            candidate,
            options,
        } = self;

        let orig = module.function(candidate.function).clone();
        let args = ArgumentDescriptor::collect(&orig);

        let mut mangler = ExistentialMangler::new(module.names.resolve(orig.name), args.len());
        for &index in candidate.existential_args.keys() {
            mangler.set_argument_existential_to_generic(index);
        }
        let name = mangler.mangle();
        let new_name = module.names.intern(&name);

        let SpecializedSignature { ty, generic_params } = build_specialized_signature(
            &mut module.types,
            &orig.ty,
            candidate.existential_args.keys().copied(),
        );

        let selected: BTreeMap<usize, SelectedArg> = candidate
            .existential_args
            .iter()
            .map(|(&index, desc)| {
                let existential = orig.ty.params[index].ty;
                let Some(repr) = module.types.existential_repr(existential) else {
                    panic!("argument {index} is not an existential");
                };
                let arg = SelectedArg {
                    existential,
                    generic_param: generic_params[&index],
                    repr,
                    convention: orig.ty.params[index].convention,
                    is_consumed: desc.is_consumed,
                    access: desc.access,
                };
                (index, arg)
            })
            .collect();

        tracing::debug!(
            function = %module.names.resolve(orig.name),
            specialized = %name,
            generic_params = generic_params.len(),
            "built specialized signature"
        );

        let (specialized, reused) = match module.lookup_function(new_name) {
            Some(existing) => {
                assert_eq!(
                    module.function(existing).ty,
                    ty,
                    "cached specialization `{name}` has a different type"
                );
                tracing::debug!(specialized = %name, "reusing existing specialization");
                (existing, true)
            }
            None => {
                let mut new_fn = create_specialized_function(&orig, new_name, ty.clone());
                SpecializerCloner::new(module, &orig, &mut new_fn, &args, &selected)
                    .clone_function();
                tracing::debug!(
                    specialized = %name,
                    blocks = new_fn.blocks.len(),
                    values = new_fn.values.len(),
                    "cloned body into specialization"
                );
                (module.add_function(new_fn), false)
            }
        };

        ThunkBuilder::new(module, candidate.function, &orig, &args, &selected)
            .populate(new_name, &ty);
        tracing::debug!(
            function = %module.names.resolve(orig.name),
            specialized = %name,
            "populated thunk"
        );

        if options.verify {
            for id in [specialized, candidate.function] {
                let func = module.function(id);
                if let Err(err) = verify_function(func) {
                    panic!(
                        "existential specialization produced invalid `{}`: {err}",
                        module.names.resolve(func.name)
                    );
                }
            }
        }

        Specialization {
            specialized,
            reused,
        }
    }
}

/// Specialize the selected existential arguments of `candidate` with
/// default options.
pub fn specialize_existential_args(module: &mut Module, candidate: Candidate) -> Specialization {
    ExistentialTransform::new(module, candidate).run()
}

/// A bodiless function carrying `orig`'s attributes under the new name and type.
fn create_specialized_function(orig: &Function, name: Name, ty: FnType) -> Function {
    let mut func = Function::new(name, ty);
    func.linkage = orig.linkage.specialized(orig.serialized);
    func.flags = orig.flags & FunctionFlags::INHERITED_BY_SPECIALIZATION;
    func.serialized = orig.serialized;
    func.inline = orig.inline;
    func.thunk = orig.thunk;
    func.effects = orig.effects;
    func.semantics = orig.semantics.clone();
    func.ownership = orig.ownership;
    func.entry_count = orig.entry_count;
    func
}
