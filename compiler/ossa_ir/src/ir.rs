//! Ownership-SSA IR: basic-block intermediate representation.
//!
//! # Architecture
//!
//! - **[`Function`]**: signature, attributes, value table and blocks
//! - **[`Block`]**: a basic block with its arguments, body and terminator
//! - **[`Instr`]**: a single instruction (allocation, boxing, copy, call, ...)
//! - **[`Terminator`]**: block exit (return, throw, branch, try-apply)
//!
//! Every SSA value (block argument or instruction result) is described by a
//! [`ValueData`] entry in [`Function::values`], indexed by [`ValueId`]. A value
//! is either an object or an address, and objects carry an
//! [`OwnershipKind`] that says who is responsible for destroying them.
//!
//! `blocks[0]` is the entry block; its arguments are the function parameters.

use bitflags::bitflags;
use smallvec::{smallvec, SmallVec};

use crate::generics::{Conformance, GenericSignature, SubstitutionMap};
use crate::name::Name;
use crate::types::Idx;

// ── ID newtypes ─────────────────────────────────────────────────────

/// SSA value ID within a [`Function`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct ValueId(u32);

impl ValueId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Basic block ID within a [`Function`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    /// The entry block of every function with a body.
    pub const ENTRY: BlockId = BlockId(0);

    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ── Conventions and ownership ───────────────────────────────────────

/// How a parameter is passed and who owns it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ParamConvention {
    /// By value; the callee consumes it.
    DirectOwned,
    /// By value; the caller keeps it alive for the duration of the call.
    DirectGuaranteed,
    /// By value with no ownership guarantee; the callee must copy to keep it.
    DirectUnowned,
    /// By address; the callee consumes the contents.
    IndirectIn,
    /// By address; the caller keeps the contents alive.
    IndirectInGuaranteed,
    /// By address; the callee may mutate the contents in place.
    IndirectInout,
}

impl ParamConvention {
    pub fn is_indirect(self) -> bool {
        matches!(
            self,
            ParamConvention::IndirectIn
                | ParamConvention::IndirectInGuaranteed
                | ParamConvention::IndirectInout
        )
    }

    /// Whether the callee takes ownership of the argument.
    pub fn is_consumed(self) -> bool {
        matches!(
            self,
            ParamConvention::DirectOwned | ParamConvention::IndirectIn
        )
    }

    pub fn category(self) -> Category {
        if self.is_indirect() {
            Category::Address
        } else {
            Category::Object
        }
    }
}

/// Whether a value is the object itself or the address of one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Category {
    Object,
    Address,
}

/// Ownership kind of an SSA value.
///
/// Inspired by Swift's ownership SSA: an `Owned` value must be consumed
/// exactly once, a `Guaranteed` value is kept alive by someone else for its
/// whole scope, an `Unowned` value must be copied before it can be kept.
/// Addresses and trivial values have no ownership (`None`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum OwnershipKind {
    None,
    Owned,
    Guaranteed,
    Unowned,
}

impl OwnershipKind {
    /// Ownership of a function argument passed with `convention`.
    pub fn for_argument(convention: ParamConvention, mode: OwnershipMode, trivial: bool) -> Self {
        if mode == OwnershipMode::Eliminated || trivial || convention.is_indirect() {
            return OwnershipKind::None;
        }
        match convention {
            ParamConvention::DirectOwned => OwnershipKind::Owned,
            ParamConvention::DirectGuaranteed => OwnershipKind::Guaranteed,
            ParamConvention::DirectUnowned => OwnershipKind::Unowned,
            ParamConvention::IndirectIn
            | ParamConvention::IndirectInGuaranteed
            | ParamConvention::IndirectInout => OwnershipKind::None,
        }
    }

    /// Ownership of a freshly produced object (call result, loaded copy).
    pub fn for_owned_result(mode: OwnershipMode, trivial: bool) -> Self {
        if mode == OwnershipMode::Eliminated || trivial {
            OwnershipKind::None
        } else {
            OwnershipKind::Owned
        }
    }
}

/// Whether a function body is ownership-checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum OwnershipMode {
    Tracked,
    Eliminated,
}

bitflags! {
    /// Flags carried by function arguments, copied verbatim when an
    /// argument is recreated in a new entry block.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    #[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
    pub struct ArgFlags: u8 {
        /// The argument may not be implicitly copied.
        const NO_IMPLICIT_COPY = 1 << 0;
        /// The argument's lifetime is tied to its lexical scope.
        const LEXICAL = 1 << 1;
        /// The argument is captured by a closure.
        const CLOSURE_CAPTURE = 1 << 2;
    }
}

// ── Values ──────────────────────────────────────────────────────────

/// Description of an SSA value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueData {
    /// The value's type (for addresses, the type stored at the address).
    pub ty: Idx,
    pub category: Category,
    pub ownership: OwnershipKind,
    /// Source declaration of a function argument.
    pub decl: Option<Name>,
    pub flags: ArgFlags,
}

impl ValueData {
    pub fn object(ty: Idx, ownership: OwnershipKind) -> Self {
        ValueData {
            ty,
            category: Category::Object,
            ownership,
            decl: None,
            flags: ArgFlags::empty(),
        }
    }

    pub fn address(ty: Idx) -> Self {
        ValueData {
            ty,
            category: Category::Address,
            ownership: OwnershipKind::None,
            decl: None,
            flags: ArgFlags::empty(),
        }
    }

    pub fn is_address(&self) -> bool {
        self.category == Category::Address
    }
}

// ── Instruction operands ────────────────────────────────────────────

/// Access mode of an opened existential address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum OpenedAccess {
    Immutable,
    Mutable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum LoadQualifier {
    /// Move the value out, leaving the memory uninitialized.
    Take,
    /// Copy the value, leaving the memory initialized.
    Copy,
    /// Load of a trivial value.
    Trivial,
    /// Bitwise load in a function without ownership.
    Unqualified,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum StoreQualifier {
    /// Initialize uninitialized memory.
    Init,
    /// Destroy the old value, then store.
    Assign,
    /// Store of a trivial value.
    Trivial,
    /// Bitwise store in a function without ownership.
    Unqualified,
}

/// Primitive operations used by function bodies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum BuiltinOp {
    /// Integer addition of two operands.
    Add,
    /// Read the integer payload of an int or a class instance (borrowing).
    Payload,
    /// Test an integer for zero, producing a bool.
    IsZero,
}

// ── Instructions ────────────────────────────────────────────────────

/// A single instruction in a basic block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Instr {
    /// Allocate uninitialized scratch storage for a `ty`: `dst = alloc_stack ty`.
    AllocStack { dst: ValueId, ty: Idx },

    /// Release scratch storage. The memory must be uninitialized.
    DeallocStack { slot: ValueId },

    /// Initialize an opaque existential box in place for a value of type
    /// `concrete`, producing the address of the (uninitialized) payload.
    InitExistentialAddr {
        dst: ValueId,
        existential: ValueId,
        concrete: Idx,
        conformances: Vec<Conformance>,
    },

    /// Project the payload address out of an initialized opaque existential.
    /// `opened` names the dynamic type for the rest of the function.
    OpenExistentialAddr {
        dst: ValueId,
        existential: ValueId,
        opened: Idx,
        access: OpenedAccess,
    },

    /// Box a class reference into a class existential of type `ty`.
    /// Forwards the ownership of `value`.
    InitExistentialRef {
        dst: ValueId,
        ty: Idx,
        concrete: Idx,
        value: ValueId,
        conformances: Vec<Conformance>,
    },

    /// Open a class existential into its reference. Forwards ownership.
    OpenExistentialRef {
        dst: ValueId,
        value: ValueId,
        opened: Idx,
    },

    /// Copy (or move, if `take`) the contents of `src` into `dst`.
    /// `init` is `true` when `dst` is uninitialized.
    CopyAddr {
        src: ValueId,
        dst: ValueId,
        take: bool,
        init: bool,
    },

    Load {
        dst: ValueId,
        addr: ValueId,
        qualifier: LoadQualifier,
    },

    Store {
        value: ValueId,
        addr: ValueId,
        qualifier: StoreQualifier,
    },

    /// Produce an owned copy of `value`.
    CopyValue { dst: ValueId, value: ValueId },

    /// Consume an owned value.
    DestroyValue { value: ValueId },

    /// Destroy the contents of `addr`, leaving it uninitialized.
    DestroyAddr { addr: ValueId },

    /// Integer literal.
    Literal { dst: ValueId, value: i64 },

    Builtin {
        dst: ValueId,
        op: BuiltinOp,
        args: Vec<ValueId>,
    },

    /// Direct call of a function that cannot throw.
    Apply {
        dst: ValueId,
        callee: Name,
        subs: SubstitutionMap,
        args: Vec<ValueId>,
    },
}

impl Instr {
    /// Returns the value defined by this instruction, if any.
    pub fn defined_value(&self) -> Option<ValueId> {
        match self {
            Instr::AllocStack { dst, .. }
            | Instr::InitExistentialAddr { dst, .. }
            | Instr::OpenExistentialAddr { dst, .. }
            | Instr::InitExistentialRef { dst, .. }
            | Instr::OpenExistentialRef { dst, .. }
            | Instr::Load { dst, .. }
            | Instr::CopyValue { dst, .. }
            | Instr::Literal { dst, .. }
            | Instr::Builtin { dst, .. }
            | Instr::Apply { dst, .. } => Some(*dst),

            Instr::DeallocStack { .. }
            | Instr::CopyAddr { .. }
            | Instr::Store { .. }
            | Instr::DestroyValue { .. }
            | Instr::DestroyAddr { .. } => None,
        }
    }

    /// Returns all values read by this instruction.
    pub fn operands(&self) -> SmallVec<[ValueId; 4]> {
        match self {
            Instr::AllocStack { .. } | Instr::Literal { .. } => SmallVec::new(),
            Instr::DeallocStack { slot } => smallvec![*slot],
            Instr::InitExistentialAddr { existential, .. }
            | Instr::OpenExistentialAddr { existential, .. } => smallvec![*existential],
            Instr::InitExistentialRef { value, .. }
            | Instr::OpenExistentialRef { value, .. }
            | Instr::CopyValue { value, .. }
            | Instr::DestroyValue { value } => smallvec![*value],
            Instr::CopyAddr { src, dst, .. } => smallvec![*src, *dst],
            Instr::Load { addr, .. } | Instr::DestroyAddr { addr } => smallvec![*addr],
            Instr::Store { value, addr, .. } => smallvec![*value, *addr],
            Instr::Builtin { args, .. } | Instr::Apply { args, .. } => {
                args.iter().copied().collect()
            }
        }
    }

    /// Rewrite every value reference, definitions included.
    pub fn map_values(&mut self, mut f: impl FnMut(ValueId) -> ValueId) {
        match self {
            Instr::AllocStack { dst, .. } | Instr::Literal { dst, .. } => *dst = f(*dst),
            Instr::DeallocStack { slot } => *slot = f(*slot),
            Instr::InitExistentialAddr {
                dst, existential, ..
            }
            | Instr::OpenExistentialAddr {
                dst, existential, ..
            } => {
                *dst = f(*dst);
                *existential = f(*existential);
            }
            Instr::InitExistentialRef { dst, value, .. }
            | Instr::OpenExistentialRef { dst, value, .. }
            | Instr::CopyValue { dst, value } => {
                *dst = f(*dst);
                *value = f(*value);
            }
            Instr::CopyAddr { src, dst, .. } => {
                *src = f(*src);
                *dst = f(*dst);
            }
            Instr::Load { dst, addr, .. } => {
                *dst = f(*dst);
                *addr = f(*addr);
            }
            Instr::Store { value, addr, .. } => {
                *value = f(*value);
                *addr = f(*addr);
            }
            Instr::DestroyValue { value } => *value = f(*value),
            Instr::DestroyAddr { addr } => *addr = f(*addr),
            Instr::Builtin { dst, args, .. } | Instr::Apply { dst, args, .. } => {
                *dst = f(*dst);
                for arg in args {
                    *arg = f(*arg);
                }
            }
        }
    }
}

// ── Terminators ─────────────────────────────────────────────────────

/// Block terminator: how control leaves a basic block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Terminator {
    Return { value: ValueId },

    /// Raise `value` as the function's error.
    Throw { value: ValueId },

    Br { target: BlockId, args: Vec<ValueId> },

    CondBr {
        cond: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },

    /// Call a function that may throw. The result is passed as the single
    /// argument of `normal`, the error as the single argument of `error`.
    TryApply {
        callee: Name,
        subs: SubstitutionMap,
        args: Vec<ValueId>,
        normal: BlockId,
        error: BlockId,
    },

    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Terminator::Return { .. } | Terminator::Throw { .. } | Terminator::Unreachable => {
                SmallVec::new()
            }
            Terminator::Br { target, .. } => smallvec![*target],
            Terminator::CondBr {
                then_block,
                else_block,
                ..
            } => smallvec![*then_block, *else_block],
            Terminator::TryApply { normal, error, .. } => smallvec![*normal, *error],
        }
    }

    /// Returns all values read by this terminator.
    pub fn operands(&self) -> SmallVec<[ValueId; 4]> {
        match self {
            Terminator::Return { value } | Terminator::Throw { value } => smallvec![*value],
            Terminator::Br { args, .. } | Terminator::TryApply { args, .. } => {
                args.iter().copied().collect()
            }
            Terminator::CondBr { cond, .. } => smallvec![*cond],
            Terminator::Unreachable => SmallVec::new(),
        }
    }

    /// Whether control leaves the function here (return or throw).
    pub fn is_function_exit(&self) -> bool {
        matches!(self, Terminator::Return { .. } | Terminator::Throw { .. })
    }

    pub fn map_values(&mut self, mut f: impl FnMut(ValueId) -> ValueId) {
        match self {
            Terminator::Return { value } | Terminator::Throw { value } => *value = f(*value),
            Terminator::Br { args, .. } | Terminator::TryApply { args, .. } => {
                for arg in args {
                    *arg = f(*arg);
                }
            }
            Terminator::CondBr { cond, .. } => *cond = f(*cond),
            Terminator::Unreachable => {}
        }
    }

    pub fn map_blocks(&mut self, mut f: impl FnMut(BlockId) -> BlockId) {
        match self {
            Terminator::Return { .. } | Terminator::Throw { .. } | Terminator::Unreachable => {}
            Terminator::Br { target, .. } => *target = f(*target),
            Terminator::CondBr {
                then_block,
                else_block,
                ..
            } => {
                *then_block = f(*then_block);
                *else_block = f(*else_block);
            }
            Terminator::TryApply { normal, error, .. } => {
                *normal = f(*normal);
                *error = f(*error);
            }
        }
    }
}

// ── Blocks ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Block {
    pub id: BlockId,
    /// Block arguments. For the entry block these are the function parameters.
    pub args: Vec<ValueId>,
    pub body: Vec<Instr>,
    pub terminator: Terminator,
}

// ── Function types ──────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ParamInfo {
    pub ty: Idx,
    pub convention: ParamConvention,
}

/// Calling convention of a function value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum FnRepresentation {
    /// Carries a context.
    Thick,
    /// Context-free; type information arrives only through substitutions.
    Thin,
    Method,
    /// Receives the conformance witness table as implicit metadata.
    WitnessMethod,
}

/// A lowered function type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct FnType {
    pub generic_sig: GenericSignature,
    pub representation: FnRepresentation,
    pub params: Vec<ParamInfo>,
    pub result: Idx,
    /// Error type for throwing functions.
    pub error: Option<Idx>,
}

impl FnType {
    pub fn has_error_result(&self) -> bool {
        self.error.is_some()
    }

    /// Whether a call never returns normally.
    pub fn is_noreturn(&self) -> bool {
        self.result.is_never()
    }
}

// ── Function attributes ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Linkage {
    Public,
    PublicNonAbi,
    Hidden,
    Shared,
    Private,
    PublicExternal,
}

impl Linkage {
    /// Linkage of a specialization of a function with this linkage.
    ///
    /// A private, non-serialized function keeps private specializations;
    /// everything else gets shared linkage so that identical specializations
    /// emitted by different modules can be merged.
    pub fn specialized(self, serialized: SerializedKind) -> Linkage {
        if self == Linkage::Private && serialized == SerializedKind::NotSerialized {
            Linkage::Private
        } else {
            Linkage::Shared
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum SerializedKind {
    NotSerialized,
    Serialized,
    SerializedForPackage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum InlineStrategy {
    Default,
    AlwaysInline,
    NeverInline,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ThunkKind {
    NotThunk,
    Thunk,
    /// Forwarding function left behind by a signature optimization.
    SignatureOptimizedThunk,
    ReabstractionThunk,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum EffectsKind {
    Unspecified,
    ReadNone,
    ReadOnly,
    ReleaseNone,
    ReadWrite,
}

bitflags! {
    /// Boolean function attributes.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    #[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
    pub struct FunctionFlags: u8 {
        /// No debug information is attached.
        const BARE = 1 << 0;
        /// Must be inlined before any other optimization.
        const TRANSPARENT = 1 << 1;
        /// May be replaced dynamically at run time.
        const DYNAMIC = 1 << 2;
        /// Participates in distributed actor dispatch.
        const DISTRIBUTED = 1 << 3;
        /// Callable through runtime reflection.
        const RUNTIME_ACCESSIBLE = 1 << 4;
    }
}

impl FunctionFlags {
    /// Flags a derived (specialized) function inherits from its original.
    pub const INHERITED_BY_SPECIALIZATION: Self = Self::BARE.union(Self::TRANSPARENT);
}

// ── Functions ───────────────────────────────────────────────────────

/// A function: a declaration when `blocks` is empty, otherwise a definition
/// whose entry block is `blocks[0]`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Function {
    pub name: Name,
    pub ty: FnType,
    pub linkage: Linkage,
    pub flags: FunctionFlags,
    pub serialized: SerializedKind,
    pub inline: InlineStrategy,
    pub thunk: ThunkKind,
    pub effects: EffectsKind,
    /// Semantics attributes (`@_semantics("...")`).
    pub semantics: Vec<String>,
    pub ownership: OwnershipMode,
    /// Profile-derived entry count.
    pub entry_count: Option<u64>,
    /// Type and ownership of each value, indexed by `ValueId::index()`.
    pub values: Vec<ValueData>,
    pub blocks: Vec<Block>,
}

impl Function {
    /// A bodiless function with default attributes and tracked ownership.
    pub fn new(name: Name, ty: FnType) -> Self {
        Function {
            name,
            ty,
            linkage: Linkage::Hidden,
            flags: FunctionFlags::empty(),
            serialized: SerializedKind::NotSerialized,
            inline: InlineStrategy::Default,
            thunk: ThunkKind::NotThunk,
            effects: EffectsKind::Unspecified,
            semantics: Vec::new(),
            ownership: OwnershipMode::Tracked,
            entry_count: None,
            values: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn is_definition(&self) -> bool {
        !self.blocks.is_empty()
    }

    pub fn has_ownership(&self) -> bool {
        self.ownership == OwnershipMode::Tracked
    }

    /// Look up a value's description.
    ///
    /// # Panics
    ///
    /// Panics if `value` is out of bounds.
    #[inline]
    pub fn value(&self, value: ValueId) -> &ValueData {
        match self.values.get(value.index()) {
            Some(data) => data,
            None => panic!(
                "value %{} out of bounds (have {} values)",
                value.raw(),
                self.values.len()
            ),
        }
    }

    #[inline]
    pub fn value_type(&self, value: ValueId) -> Idx {
        self.value(value).ty
    }

    /// Allocate a fresh value.
    pub fn add_value(&mut self, data: ValueData) -> ValueId {
        let id = u32::try_from(self.values.len())
            .unwrap_or_else(|_| panic!("value count exceeds u32::MAX"));
        self.values.push(data);
        ValueId::new(id)
    }

    /// Append an empty block terminated by `unreachable`.
    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId::new(
            u32::try_from(self.blocks.len())
                .unwrap_or_else(|_| panic!("block count exceeds u32::MAX")),
        );
        self.blocks.push(Block {
            id,
            args: Vec::new(),
            body: Vec::new(),
            terminator: Terminator::Unreachable,
        });
        id
    }

    /// Append an argument to `block`.
    pub fn add_block_arg(&mut self, block: BlockId, data: ValueData) -> ValueId {
        let value = self.add_value(data);
        self.block_mut(block).args.push(value);
        value
    }

    pub fn block(&self, id: BlockId) -> &Block {
        match self.blocks.get(id.index()) {
            Some(block) => block,
            None => panic!("block {} out of bounds", id.raw()),
        }
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        match self.blocks.get_mut(id.index()) {
            Some(block) => block,
            None => panic!("block {} out of bounds", id.raw()),
        }
    }

    /// Append an instruction to the end of `block`'s body (immediately
    /// before its terminator).
    pub fn push(&mut self, block: BlockId, instr: Instr) {
        self.block_mut(block).body.push(instr);
    }

    pub fn set_terminator(&mut self, block: BlockId, terminator: Terminator) {
        self.block_mut(block).terminator = terminator;
    }

    /// The function parameters, i.e. the entry block arguments.
    pub fn entry_args(&self) -> &[ValueId] {
        self.blocks
            .first()
            .map_or(&[], |entry| entry.args.as_slice())
    }

    /// Drop the body, turning the function back into a declaration.
    pub fn discard_body(&mut self) {
        self.blocks.clear();
        self.values.clear();
    }
}

// ── Tests ───────────────────────────────────────────────────────────
