//! The module: function table plus shared type and name storage.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::generics::Conformance;
use crate::ir::Function;
use crate::name::{Interner, Name};
use crate::types::{Idx, TypeKind, TypePool};

/// Stable handle of a function in a [`Module`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct FuncId(u32);

impl FuncId {
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Functions of a compilation unit, looked up by handle or by name.
#[derive(Clone, Debug, Default)]
pub struct Module {
    pub types: TypePool,
    pub names: Interner,
    functions: Vec<Option<Function>>,
    by_name: FxHashMap<Name, FuncId>,
    /// Declared `(concrete type, protocol)` conformances.
    conformances: FxHashSet<(Idx, Idx)>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function.
    ///
    /// # Panics
    ///
    /// Panics if a function with the same name already exists.
    pub fn add_function(&mut self, func: Function) -> FuncId {
        if self.by_name.contains_key(&func.name) {
            panic!(
                "duplicate function `{}`",
                self.names.resolve(func.name)
            );
        }
        let id = FuncId(
            u32::try_from(self.functions.len())
                .unwrap_or_else(|_| panic!("function count exceeds u32::MAX")),
        );
        self.by_name.insert(func.name, id);
        self.functions.push(Some(func));
        id
    }

    pub fn lookup_function(&self, name: Name) -> Option<FuncId> {
        self.by_name.get(&name).copied()
    }

    pub fn lookup_function_by_str(&self, name: &str) -> Option<FuncId> {
        self.names
            .lookup(name)
            .and_then(|name| self.lookup_function(name))
    }

    /// # Panics
    ///
    /// Panics if the function was removed.
    pub fn function(&self, id: FuncId) -> &Function {
        match self.functions.get(id.index()) {
            Some(Some(func)) => func,
            _ => panic!("function #{} does not exist", id.raw()),
        }
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        match self.functions.get_mut(id.index()) {
            Some(Some(func)) => func,
            _ => panic!("function #{} does not exist", id.raw()),
        }
    }

    /// Remove a function, returning it. Its handle is never reused.
    pub fn remove_function(&mut self, id: FuncId) -> Option<Function> {
        let func = self.functions.get_mut(id.index())?.take()?;
        self.by_name.remove(&func.name);
        Some(func)
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> + '_ {
        self.functions
            .iter()
            .enumerate()
            .filter_map(|(i, func)| func.as_ref().map(|f| (FuncId(i as u32), f)))
    }

    // === Conformances ===

    pub fn declare_conformance(&mut self, ty: Idx, protocol: Idx) {
        self.conformances.insert((ty, protocol));
    }

    /// Find evidence that `ty` conforms to `protocol`.
    ///
    /// Generic parameters and opened existentials conform abstractly: the
    /// requirement or the existential they come from guarantees it.
    pub fn lookup_conformance(&self, ty: Idx, protocol: Idx) -> Option<Conformance> {
        match self.types.kind(ty) {
            TypeKind::GenericParam { .. } | TypeKind::Opened { .. } => {
                Some(Conformance::Abstract { ty, protocol })
            }
            _ if self.conformances.contains(&(ty, protocol)) => {
                Some(Conformance::Concrete { ty, protocol })
            }
            _ => None,
        }
    }

    /// Conformances of `concrete` to every protocol of the existential `existential`,
    /// in the order the existential lists them.
    ///
    /// # Panics
    ///
    /// Panics if a conformance is missing.
    pub fn collect_existential_conformances(
        &self,
        concrete: Idx,
        existential: Idx,
    ) -> Vec<Conformance> {
        self.types
            .protocols_of(existential)
            .into_iter()
            .map(|protocol| match self.lookup_conformance(concrete, protocol) {
                Some(conformance) => conformance,
                None => panic!(
                    "`{}` does not conform to `{}`",
                    self.types.display(concrete, &self.names),
                    self.types.display(protocol, &self.names)
                ),
            })
            .collect()
    }
}
