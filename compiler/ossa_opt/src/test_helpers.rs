//! Shared test utilities for the signature optimizations.
//!
//! A fixture module with a handful of protocols and one conforming class,
//! plus a small builder for candidate functions. Only compiled in test
//! builds.

use ossa_ir::{
    BlockId, BuiltinOp, FnRepresentation, FnType, FuncId, Function, GenericSignature, Idx, Instr,
    Module, OwnershipKind, OwnershipMode, ParamConvention, ParamInfo, Terminator, ValueData,
    ValueId,
};

pub(crate) struct Fixture {
    pub module: Module,
    /// Class conforming to every protocol below.
    pub widget: Idx,
    pub p: Idx,
    pub any_p: Idx,
    /// `P & Q`.
    pub pq: Idx,
    pub any_pq: Idx,
    /// `any CP`, CP being class-bound.
    pub any_cp: Idx,
    pub any_error: Idx,
}

pub(crate) fn fixture() -> Fixture {
    crate::init_tracing();
    let mut module = Module::new();
    let [widget, p, q, cp, error] =
        ["Widget", "P", "Q", "CP", "Error"].map(|name| module.names.intern(name));

    let widget = module.types.class(widget);
    let p = module.types.protocol(p);
    let q = module.types.protocol(q);
    let cp = module.types.class_protocol(cp);
    let error = module.types.error_protocol(error);
    let pq = module.types.composition(&[p, q]);
    let any_p = module.types.existential(p);
    let any_pq = module.types.existential(pq);
    let any_cp = module.types.existential(cp);
    let any_error = module.types.existential(error);

    for protocol in [p, q, cp, error] {
        module.declare_conformance(widget, protocol);
    }
    for protocol in [p, q] {
        module.declare_conformance(Idx::INT, protocol);
    }

    Fixture {
        module,
        widget,
        p,
        any_p,
        pq,
        any_pq,
        any_cp,
        any_error,
    }
}

/// Builder for a candidate function's body.
pub(crate) struct FnBuilder {
    pub func: Function,
    pub params: Vec<ValueId>,
}

impl FnBuilder {
    pub fn new(
        module: &mut Module,
        name: &str,
        params: &[(Idx, ParamConvention)],
        result: Idx,
        error: Option<Idx>,
    ) -> Self {
        Self::with_mode(module, name, params, result, error, OwnershipMode::Tracked)
    }

    pub fn with_mode(
        module: &mut Module,
        name: &str,
        params: &[(Idx, ParamConvention)],
        result: Idx,
        error: Option<Idx>,
        mode: OwnershipMode,
    ) -> Self {
        let ty = FnType {
            generic_sig: GenericSignature::empty(),
            representation: FnRepresentation::Thin,
            params: params
                .iter()
                .map(|&(ty, convention)| ParamInfo { ty, convention })
                .collect(),
            result,
            error,
        };
        let mut func = Function::new(module.names.intern(name), ty);
        func.ownership = mode;
        let entry = func.create_block();
        let params = params
            .iter()
            .enumerate()
            .map(|(i, &(ty, convention))| {
                let mut data = if convention.is_indirect() {
                    ValueData::address(ty)
                } else {
                    let trivial = module.types.is_trivial(ty);
                    ValueData::object(ty, OwnershipKind::for_argument(convention, mode, trivial))
                };
                data.decl = Some(module.names.intern(&format!("arg{i}")));
                func.add_block_arg(entry, data)
            })
            .collect();
        FnBuilder { func, params }
    }

    pub fn param(&self, index: usize) -> ValueId {
        self.params[index]
    }

    pub fn block(&mut self) -> BlockId {
        self.func.create_block()
    }

    pub fn push(&mut self, block: BlockId, instr: Instr) {
        self.func.push(block, instr);
    }

    fn builtin(&mut self, block: BlockId, op: BuiltinOp, ty: Idx, args: Vec<ValueId>) -> ValueId {
        let dst = self
            .func
            .add_value(ValueData::object(ty, OwnershipKind::None));
        self.func.push(block, Instr::Builtin { dst, op, args });
        dst
    }

    /// Integer payload of `value` (borrowing).
    pub fn payload(&mut self, block: BlockId, value: ValueId) -> ValueId {
        self.builtin(block, BuiltinOp::Payload, Idx::INT, vec![value])
    }

    pub fn add(&mut self, block: BlockId, a: ValueId, b: ValueId) -> ValueId {
        self.builtin(block, BuiltinOp::Add, Idx::INT, vec![a, b])
    }

    pub fn is_zero(&mut self, block: BlockId, value: ValueId) -> ValueId {
        self.builtin(block, BuiltinOp::IsZero, Idx::BOOL, vec![value])
    }

    pub fn copy_value(&mut self, block: BlockId, value: ValueId) -> ValueId {
        let data = self.func.value(value).clone();
        let dst = self.func.add_value(ValueData {
            ownership: OwnershipKind::Owned,
            decl: None,
            ..data
        });
        self.func.push(block, Instr::CopyValue { dst, value });
        dst
    }

    pub fn terminate(&mut self, block: BlockId, terminator: Terminator) {
        self.func.set_terminator(block, terminator);
    }

    pub fn ret(&mut self, block: BlockId, value: ValueId) {
        self.terminate(block, Terminator::Return { value });
    }

    pub fn finish(self, module: &mut Module) -> FuncId {
        module.add_function(self.func)
    }
}

/// Number of instructions in `func` matching `pred`.
pub(crate) fn count(func: &Function, pred: impl Fn(&Instr) -> bool) -> usize {
    func.blocks
        .iter()
        .flat_map(|block| block.body.iter())
        .filter(|instr| pred(instr))
        .count()
}

/// Body of the entry block.
pub(crate) fn entry_body(func: &Function) -> &[Instr] {
    &func.block(BlockId::ENTRY).body
}
