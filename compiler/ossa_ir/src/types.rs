//! Type pool and type index handle.
//!
//! Every type is hash-consed into a [`TypePool`] and referred to by a 32-bit
//! [`Idx`]. Two types are equal exactly when their indices are equal, so
//! function types built from the same components compare equal without a
//! structural walk.
//!
//! # Existentials
//!
//! An existential `any C` wraps a constraint `C`, which is either a single
//! protocol or a composition of protocols. How an existential is stored is
//! decided by its constraint, see [`ExistentialRepr`]. Opening an existential
//! yields an [`Opened`](TypeKind::Opened) type standing for the dynamic
//! concrete type inside the box; every call to
//! [`TypePool::open_existential`] produces a distinct opened type.

use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};

use crate::name::{Interner, Name};

/// A 32-bit index into the type pool.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Idx(u32);

impl Idx {
    // === Primitive Types (indices 0-3) ===
    // Pre-interned at pool creation in this order.

    /// The `int` type (64-bit signed integer).
    pub const INT: Self = Self(0);
    /// The `bool` type.
    pub const BOOL: Self = Self(1);
    /// The unit type `()`.
    pub const UNIT: Self = Self(2);
    /// The never type (no values; a function returning it never returns).
    pub const NEVER: Self = Self(3);

    /// Number of pre-interned primitive types.
    pub const PRIMITIVE_COUNT: u32 = 4;

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_primitive(self) -> bool {
        self.0 < Self::PRIMITIVE_COUNT
    }

    #[inline]
    pub const fn is_never(self) -> bool {
        self.0 == Self::NEVER.0
    }
}

impl fmt::Debug for Idx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => write!(f, "Idx(int)"),
            1 => write!(f, "Idx(bool)"),
            2 => write!(f, "Idx(unit)"),
            3 => write!(f, "Idx(never)"),
            n => write!(f, "Idx({n})"),
        }
    }
}

/// The structure of a type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeKind {
    Int,
    Bool,
    Unit,
    Never,
    /// A reference-counted class instance.
    Class(Name),
    /// A protocol, usable only as a constraint.
    ///
    /// `class_bound` protocols can only be adopted by classes, so their
    /// existentials are a single reference. `error` marks the error protocol,
    /// whose existentials use a dedicated boxed representation.
    Protocol {
        name: Name,
        class_bound: bool,
        error: bool,
    },
    /// Composition of two or more protocols, `P & Q`.
    Composition(Vec<Idx>),
    /// Existential `any C` over a protocol or composition.
    Existential(Idx),
    /// Generic type parameter `τ_depth_index`.
    GenericParam { depth: u32, index: u32 },
    /// The dynamic type inside an opened existential.
    Opened { id: u32, existential: Idx },
}

/// Storage strategy of an existential value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ExistentialRepr {
    /// Address-only box with inline or out-of-line payload storage.
    Opaque,
    /// A single reference word (class-bound constraint).
    Class,
    /// Heap box reserved for error existentials.
    Boxed,
}

/// Hash-consed type storage.
#[derive(Clone, Debug)]
pub struct TypePool {
    kinds: Vec<TypeKind>,
    map: FxHashMap<TypeKind, Idx>,
    next_opened: u32,
}

impl TypePool {
    pub fn new() -> Self {
        let mut pool = TypePool {
            kinds: Vec::new(),
            map: FxHashMap::default(),
            next_opened: 0,
        };
        for kind in [TypeKind::Int, TypeKind::Bool, TypeKind::Unit, TypeKind::Never] {
            pool.intern(kind);
        }
        debug_assert_eq!(pool.kinds.len(), Idx::PRIMITIVE_COUNT as usize);
        pool
    }

    /// Intern a type, returning the existing index for structurally equal types.
    pub fn intern(&mut self, kind: TypeKind) -> Idx {
        if let Some(&idx) = self.map.get(&kind) {
            return idx;
        }
        let raw = u32::try_from(self.kinds.len())
            .unwrap_or_else(|_| panic!("type count exceeds u32::MAX"));
        let idx = Idx(raw);
        self.kinds.push(kind.clone());
        self.map.insert(kind, idx);
        idx
    }

    /// Look up the structure of a type.
    ///
    /// # Panics
    ///
    /// Panics if `idx` does not belong to this pool.
    pub fn kind(&self, idx: Idx) -> &TypeKind {
        match self.kinds.get(idx.0 as usize) {
            Some(kind) => kind,
            None => panic!("type index {} out of bounds ({} types)", idx.0, self.kinds.len()),
        }
    }

    /// Number of interned types.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Always `false`: primitives are pre-interned.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    // === Constructors ===

    pub fn class(&mut self, name: Name) -> Idx {
        self.intern(TypeKind::Class(name))
    }

    /// A protocol adoptable by any type.
    pub fn protocol(&mut self, name: Name) -> Idx {
        self.intern(TypeKind::Protocol {
            name,
            class_bound: false,
            error: false,
        })
    }

    /// A protocol adoptable only by classes.
    pub fn class_protocol(&mut self, name: Name) -> Idx {
        self.intern(TypeKind::Protocol {
            name,
            class_bound: true,
            error: false,
        })
    }

    /// The error protocol.
    pub fn error_protocol(&mut self, name: Name) -> Idx {
        self.intern(TypeKind::Protocol {
            name,
            class_bound: false,
            error: true,
        })
    }

    /// Compose protocols into a single constraint.
    ///
    /// A single protocol is its own composition.
    pub fn composition(&mut self, protocols: &[Idx]) -> Idx {
        debug_assert!(!protocols.is_empty(), "empty protocol composition");
        if let [single] = protocols {
            return *single;
        }
        self.intern(TypeKind::Composition(protocols.to_vec()))
    }

    /// The existential `any constraint`.
    pub fn existential(&mut self, constraint: Idx) -> Idx {
        debug_assert!(
            matches!(
                self.kind(constraint),
                TypeKind::Protocol { .. } | TypeKind::Composition(_)
            ),
            "existential constraint must be a protocol or composition"
        );
        self.intern(TypeKind::Existential(constraint))
    }

    pub fn generic_param(&mut self, depth: u32, index: u32) -> Idx {
        self.intern(TypeKind::GenericParam { depth, index })
    }

    /// Create a fresh opened type for the dynamic type inside `existential`.
    pub fn open_existential(&mut self, existential: Idx) -> Idx {
        debug_assert!(self.is_existential(existential), "opening a non-existential");
        let id = self.next_opened;
        self.next_opened += 1;
        self.intern(TypeKind::Opened { id, existential })
    }

    // === Queries ===

    pub fn is_existential(&self, idx: Idx) -> bool {
        matches!(self.kind(idx), TypeKind::Existential(_))
    }

    /// The constraint of an existential type.
    pub fn existential_constraint(&self, idx: Idx) -> Option<Idx> {
        match self.kind(idx) {
            TypeKind::Existential(constraint) => Some(*constraint),
            _ => None,
        }
    }

    /// The protocols named by a constraint, in declaration order.
    pub fn protocols_of(&self, constraint: Idx) -> SmallVec<[Idx; 2]> {
        match self.kind(constraint) {
            TypeKind::Protocol { .. } => smallvec![constraint],
            TypeKind::Composition(protocols) => protocols.iter().copied().collect(),
            TypeKind::Existential(inner) => self.protocols_of(*inner),
            _ => SmallVec::new(),
        }
    }

    /// How values of an existential type are stored, or `None` for
    /// non-existential types.
    pub fn existential_repr(&self, idx: Idx) -> Option<ExistentialRepr> {
        let constraint = self.existential_constraint(idx)?;
        let mut class_bound = false;
        for protocol in self.protocols_of(constraint) {
            if let TypeKind::Protocol {
                class_bound: bound,
                error,
                ..
            } = self.kind(protocol)
            {
                if *error {
                    return Some(ExistentialRepr::Boxed);
                }
                class_bound |= *bound;
            }
        }
        Some(if class_bound {
            ExistentialRepr::Class
        } else {
            ExistentialRepr::Opaque
        })
    }

    /// `(depth, index)` of a generic parameter type.
    pub fn generic_param_key(&self, idx: Idx) -> Option<(u32, u32)> {
        match self.kind(idx) {
            TypeKind::GenericParam { depth, index } => Some((*depth, *index)),
            _ => None,
        }
    }

    /// Whether values of this type need no ownership operations.
    pub fn is_trivial(&self, idx: Idx) -> bool {
        matches!(
            self.kind(idx),
            TypeKind::Int | TypeKind::Bool | TypeKind::Unit | TypeKind::Never
        )
    }

    /// Render a type for logs and mangled names.
    pub fn display(&self, idx: Idx, names: &Interner) -> String {
        match self.kind(idx) {
            TypeKind::Int => "int".to_owned(),
            TypeKind::Bool => "bool".to_owned(),
            TypeKind::Unit => "()".to_owned(),
            TypeKind::Never => "never".to_owned(),
            TypeKind::Class(name) | TypeKind::Protocol { name, .. } => {
                names.resolve(*name).to_owned()
            }
            TypeKind::Composition(protocols) => protocols
                .iter()
                .map(|p| self.display(*p, names))
                .collect::<Vec<_>>()
                .join(" & "),
            TypeKind::Existential(constraint) => {
                format!("any {}", self.display(*constraint, names))
            }
            TypeKind::GenericParam { depth, index } => format!("τ_{depth}_{index}"),
            TypeKind::Opened { id, existential } => {
                format!("@opened({id}) {}", self.display(*existential, names))
            }
        }
    }
}

impl Default for TypePool {
    fn default() -> Self {
        Self::new()
    }
}
