//! Ownership-SSA intermediate representation.
//!
//! This crate provides the substrate that function signature optimizations
//! operate on:
//!
//! - **Types** ([`TypePool`], [`Idx`]): hash-consed types including
//!   protocol-constrained existentials, generic parameters and opened
//!   existential types.
//!
//! - **Generics** ([`GenericSignature`], [`Requirement`], [`SubstitutionMap`]):
//!   generic parameters at a nesting depth with conformance requirements,
//!   resolved per call through a substitution map.
//!
//! - **IR** ([`Function`], [`Block`], [`Instr`], [`Terminator`]): a basic-block
//!   IR whose values carry an ownership kind, with explicit stack allocation,
//!   existential boxing/opening and copy/destroy operations.
//!
//! - **Module** ([`Module`]): the shared function table together with the
//!   type pool, name interner and conformance table.
//!
//! - **Checking** ([`verify::verify_function`], [`interp::Interpreter`]): a
//!   static structural verifier and a reference interpreter that detects
//!   leaks, double releases and stack discipline violations at run time.
//!
//! # Ownership
//!
//! Functions are either ownership-tracked ([`OwnershipMode::Tracked`]), in
//! which case every owned value must be consumed exactly once on every path,
//! or have ownership eliminated, in which case copy/destroy pairs for
//! reference values are not materialized.

pub mod generics;
pub mod graph;
pub mod interp;
pub mod ir;
pub mod module;
pub mod name;
pub mod types;
pub mod verify;

pub use generics::{Conformance, GenericSignature, Requirement, RequirementKind, SubstitutionMap};
pub use ir::{
    ArgFlags, Block, BlockId, BuiltinOp, Category, EffectsKind, FnRepresentation, FnType,
    Function, FunctionFlags, InlineStrategy, Instr, Linkage, LoadQualifier, OpenedAccess,
    OwnershipKind, OwnershipMode, ParamConvention, ParamInfo, SerializedKind, StoreQualifier,
    Terminator, ThunkKind, ValueData, ValueId,
};
pub use module::{FuncId, Module};
pub use name::{Interner, Name};
pub use types::{ExistentialRepr, Idx, TypeKind, TypePool};
