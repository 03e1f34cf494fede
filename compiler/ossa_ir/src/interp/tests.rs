use pretty_assertions::assert_eq;

use crate::generics::GenericSignature;
use crate::ir::{
    FnRepresentation, FnType, OwnershipKind, OwnershipMode, ParamInfo, ValueData,
};

use super::*;

struct Fixture {
    module: Module,
    widget: Idx,
    any_p: Idx,
}

fn fixture() -> Fixture {
    let mut module = Module::new();
    let widget = module.names.intern("Widget");
    let p = module.names.intern("P");
    let widget = module.types.class(widget);
    let p = module.types.protocol(p);
    let any_p = module.types.existential(p);
    module.declare_conformance(widget, p);
    Fixture {
        module,
        widget,
        any_p,
    }
}

/// A function with one parameter whose entry block holds `arg`.
fn one_param(
    module: &mut Module,
    name: &str,
    ty: Idx,
    convention: ParamConvention,
    result: Idx,
) -> (Function, ValueId) {
    let name = module.names.intern(name);
    let fn_ty = FnType {
        generic_sig: GenericSignature::empty(),
        representation: FnRepresentation::Thin,
        params: vec![ParamInfo { ty, convention }],
        result,
        error: None,
    };
    let mut func = Function::new(name, fn_ty);
    let entry = func.create_block();
    let data = if convention.is_indirect() {
        ValueData::address(ty)
    } else {
        let trivial = module.types.is_trivial(ty);
        ValueData::object(
            ty,
            OwnershipKind::for_argument(convention, OwnershipMode::Tracked, trivial),
        )
    };
    let arg = func.add_block_arg(entry, data);
    (func, arg)
}

fn return_unit(func: &mut Function) {
    let unit = func.add_value(ValueData::object(Idx::UNIT, OwnershipKind::None));
    func.push(BlockId::ENTRY, Instr::Literal { dst: unit, value: 0 });
    func.set_terminator(BlockId::ENTRY, Terminator::Return { value: unit });
}

#[test]
fn consumed_object_is_released() {
    let mut fx = fixture();
    let (mut func, x) = one_param(
        &mut fx.module,
        "consume",
        fx.widget,
        ParamConvention::DirectOwned,
        Idx::UNIT,
    );
    func.push(BlockId::ENTRY, Instr::DestroyValue { value: x });
    return_unit(&mut func);
    fx.module.add_function(func);

    let mut interp = Interpreter::new(&fx.module);
    let obj = interp.alloc_object(7);
    let outcome = interp.call("consume", vec![obj]);
    assert_eq!(outcome, Ok(Outcome::Returned(Value::Unit)));
    assert_eq!(interp.live_objects(), 0);
}

#[test]
fn leaked_object_stays_live() {
    let mut fx = fixture();
    let (mut func, _) = one_param(
        &mut fx.module,
        "leak",
        fx.widget,
        ParamConvention::DirectOwned,
        Idx::UNIT,
    );
    return_unit(&mut func);
    fx.module.add_function(func);

    let mut interp = Interpreter::new(&fx.module);
    let obj = interp.alloc_object(7);
    interp.call("leak", vec![obj]).ok();
    assert_eq!(interp.live_objects(), 1);
    assert_eq!(interp.refcount(obj), Some(1));
}

#[test]
fn double_release_is_detected() {
    let mut fx = fixture();
    let (mut func, x) = one_param(
        &mut fx.module,
        "twice",
        fx.widget,
        ParamConvention::DirectOwned,
        Idx::UNIT,
    );
    func.push(BlockId::ENTRY, Instr::DestroyValue { value: x });
    func.push(BlockId::ENTRY, Instr::DestroyValue { value: x });
    return_unit(&mut func);
    fx.module.add_function(func);

    let mut interp = Interpreter::new(&fx.module);
    let obj = interp.alloc_object(1);
    assert!(matches!(
        interp.call("twice", vec![obj]),
        Err(InterpError::UseAfterRelease(_))
    ));
}

#[test]
fn reads_payload_through_box() {
    let mut fx = fixture();
    let (mut func, x) = one_param(
        &mut fx.module,
        "peek",
        fx.any_p,
        ParamConvention::IndirectInGuaranteed,
        Idx::INT,
    );
    let r = func.add_value(ValueData::object(Idx::INT, OwnershipKind::None));
    func.push(
        BlockId::ENTRY,
        Instr::Builtin {
            dst: r,
            op: BuiltinOp::Payload,
            args: vec![x],
        },
    );
    func.set_terminator(BlockId::ENTRY, Terminator::Return { value: r });
    fx.module.add_function(func);

    let mut interp = Interpreter::new(&fx.module);
    let obj = interp.alloc_object(42);
    let boxed = interp.alloc_boxed(fx.any_p, fx.widget, obj);
    assert_eq!(
        interp.call("peek", vec![boxed]),
        Ok(Outcome::Returned(Value::Int(42)))
    );
    assert!(interp.is_initialized(boxed));
    interp.destroy_slot(boxed).ok();
    assert_eq!(interp.live_objects(), 0);
    assert_eq!(interp.live_slots(), 0);
}

#[test]
fn consumed_indirect_argument_must_be_taken() {
    let mut fx = fixture();
    let (mut func, _) = one_param(
        &mut fx.module,
        "keep",
        fx.any_p,
        ParamConvention::IndirectIn,
        Idx::UNIT,
    );
    return_unit(&mut func);
    fx.module.add_function(func);

    let mut interp = Interpreter::new(&fx.module);
    let boxed = interp.alloc_boxed(fx.any_p, Idx::INT, Value::Int(3));
    assert_eq!(
        interp.call("keep", vec![boxed]),
        Err(InterpError::ArgumentNotConsumed {
            function: "keep".to_owned(),
            index: 0
        })
    );
}

#[test]
fn copy_addr_duplicates_box_payload() {
    let mut fx = fixture();
    let (mut func, x) = one_param(
        &mut fx.module,
        "dup",
        fx.any_p,
        ParamConvention::IndirectInGuaranteed,
        Idx::UNIT,
    );
    let slot = func.add_value(ValueData::address(fx.any_p));
    let entry = BlockId::ENTRY;
    func.push(entry, Instr::AllocStack { dst: slot, ty: fx.any_p });
    func.push(
        entry,
        Instr::CopyAddr {
            src: x,
            dst: slot,
            take: false,
            init: true,
        },
    );
    func.push(entry, Instr::DestroyAddr { addr: slot });
    func.push(entry, Instr::DeallocStack { slot });
    return_unit(&mut func);
    fx.module.add_function(func);

    let mut interp = Interpreter::new(&fx.module);
    let obj = interp.alloc_object(5);
    let boxed = interp.alloc_boxed(fx.any_p, fx.widget, obj);
    assert_eq!(
        interp.call("dup", vec![boxed]),
        Ok(Outcome::Returned(Value::Unit))
    );
    assert_eq!(interp.refcount(obj), Some(1));
    assert_eq!(interp.live_slots(), 2);
}

#[test]
fn live_stack_slot_on_return_is_a_leak() {
    let mut fx = fixture();
    let (mut func, _) = one_param(
        &mut fx.module,
        "forget",
        Idx::INT,
        ParamConvention::DirectGuaranteed,
        Idx::UNIT,
    );
    let slot = func.add_value(ValueData::address(Idx::INT));
    func.push(BlockId::ENTRY, Instr::AllocStack { dst: slot, ty: Idx::INT });
    return_unit(&mut func);
    fx.module.add_function(func);

    let mut interp = Interpreter::new(&fx.module);
    assert_eq!(
        interp.call("forget", vec![Value::Int(0)]),
        Err(InterpError::StackLeak {
            function: "forget".to_owned(),
            live: 1
        })
    );
}

#[test]
fn untracked_functions_are_rejected() {
    let mut fx = fixture();
    let (mut func, _) = one_param(
        &mut fx.module,
        "raw",
        Idx::INT,
        ParamConvention::DirectGuaranteed,
        Idx::UNIT,
    );
    return_unit(&mut func);
    func.ownership = OwnershipMode::Eliminated;
    fx.module.add_function(func);

    let mut interp = Interpreter::new(&fx.module);
    assert_eq!(
        interp.call("raw", vec![Value::Int(0)]),
        Err(InterpError::OwnershipEliminated("raw".to_owned()))
    );
}

#[test]
fn step_limit_stops_infinite_loops() {
    let mut fx = fixture();
    let (mut func, _) = one_param(
        &mut fx.module,
        "spin",
        Idx::INT,
        ParamConvention::DirectGuaranteed,
        Idx::UNIT,
    );
    func.set_terminator(
        BlockId::ENTRY,
        Terminator::Br {
            target: BlockId::ENTRY,
            args: vec![],
        },
    );
    fx.module.add_function(func);

    let mut interp = Interpreter::new(&fx.module).with_step_limit(50);
    assert_eq!(
        interp.call("spin", vec![Value::Int(0)]),
        Err(InterpError::StepLimit)
    );
}
