//! Property-based tests for existential specialization.
//!
//! Random candidate functions mix plain integers with opaque and class
//! existentials under every supported convention. For any non-empty
//! selection of existential parameters the transform must:
//! 1. Add exactly one generic parameter and requirement per selection
//! 2. Leave the thunk's type unchanged
//! 3. Preserve behavior, with every copy and slot released
//! 4. Reuse the specialization when run again

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]

use ossa_ir::interp::{Interpreter, Outcome, Value};
use ossa_ir::{
    BlockId, BuiltinOp, FnRepresentation, FnType, Function, GenericSignature, Idx, Instr, Module,
    OwnershipKind, OwnershipMode, ParamConvention, ParamInfo, Terminator, ValueData, ValueId,
};
use ossa_opt::{Candidate, ExistentialTransform, TransformOptions};
use proptest::prelude::*;

// -- Parameter Shapes --

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Shape {
    Int,
    Opaque(ParamConvention),
    Class(ParamConvention),
}

impl Shape {
    fn is_existential(self) -> bool {
        !matches!(self, Shape::Int)
    }

    fn convention(self) -> ParamConvention {
        match self {
            Shape::Int => ParamConvention::DirectGuaranteed,
            Shape::Opaque(c) | Shape::Class(c) => c,
        }
    }
}

fn shape_strategy() -> impl Strategy<Value = Shape> {
    use ParamConvention::*;
    prop_oneof![
        Just(Shape::Int),
        Just(Shape::Opaque(IndirectInGuaranteed)),
        Just(Shape::Opaque(IndirectIn)),
        Just(Shape::Class(DirectGuaranteed)),
        Just(Shape::Class(DirectOwned)),
        Just(Shape::Class(DirectUnowned)),
        Just(Shape::Class(IndirectInGuaranteed)),
        Just(Shape::Class(IndirectIn)),
    ]
}

/// Shapes, payloads and a non-empty subset of the existential parameters.
fn candidate_strategy() -> impl Strategy<Value = (Vec<Shape>, Vec<i64>, Vec<usize>)> {
    prop::collection::vec(shape_strategy(), 1..6)
        .prop_filter("needs an existential", |shapes| {
            shapes.iter().any(|s| s.is_existential())
        })
        .prop_flat_map(|shapes| {
            let n = shapes.len();
            let existential: Vec<usize> = (0..n).filter(|&i| shapes[i].is_existential()).collect();
            let selection = prop::sample::subsequence(existential.clone(), 1..=existential.len());
            (
                Just(shapes),
                prop::collection::vec(-1000i64..1000, n),
                selection,
            )
        })
}

// -- Module Construction --

struct World {
    module: Module,
    widget: Idx,
    any_p: Idx,
    any_cp: Idx,
}

fn world() -> World {
    let mut module = Module::new();
    let widget = module.names.intern("Widget");
    let p = module.names.intern("P");
    let cp = module.names.intern("CP");
    let widget = module.types.class(widget);
    let p = module.types.protocol(p);
    let cp = module.types.class_protocol(cp);
    let any_p = module.types.existential(p);
    let any_cp = module.types.existential(cp);
    module.declare_conformance(widget, p);
    module.declare_conformance(widget, cp);
    World {
        module,
        widget,
        any_p,
        any_cp,
    }
}

/// `sum(params...) -> int`: adds the payload of every parameter and
/// consumes the ones passed owned.
fn build_sum(world: &mut World, shapes: &[Shape]) -> Function {
    let params: Vec<ParamInfo> = shapes
        .iter()
        .map(|&shape| ParamInfo {
            ty: match shape {
                Shape::Int => Idx::INT,
                Shape::Opaque(_) => world.any_p,
                Shape::Class(_) => world.any_cp,
            },
            convention: shape.convention(),
        })
        .collect();
    let ty = FnType {
        generic_sig: GenericSignature::empty(),
        representation: FnRepresentation::Thin,
        params: params.clone(),
        result: Idx::INT,
        error: None,
    };
    let mut func = Function::new(world.module.names.intern("sum"), ty);
    let entry = func.create_block();
    let args: Vec<ValueId> = params
        .iter()
        .map(|param| {
            let data = if param.convention.is_indirect() {
                ValueData::address(param.ty)
            } else {
                let trivial = world.module.types.is_trivial(param.ty);
                ValueData::object(
                    param.ty,
                    OwnershipKind::for_argument(param.convention, OwnershipMode::Tracked, trivial),
                )
            };
            func.add_block_arg(entry, data)
        })
        .collect();

    let mut total = func.add_value(ValueData::object(Idx::INT, OwnershipKind::None));
    func.push(entry, Instr::Literal { dst: total, value: 0 });
    for (&arg, param) in args.iter().zip(&params) {
        let payload = func.add_value(ValueData::object(Idx::INT, OwnershipKind::None));
        func.push(
            entry,
            Instr::Builtin {
                dst: payload,
                op: BuiltinOp::Payload,
                args: vec![arg],
            },
        );
        let sum = func.add_value(ValueData::object(Idx::INT, OwnershipKind::None));
        func.push(
            entry,
            Instr::Builtin {
                dst: sum,
                op: BuiltinOp::Add,
                args: vec![total, payload],
            },
        );
        total = sum;
        match param.convention {
            ParamConvention::IndirectIn => func.push(entry, Instr::DestroyAddr { addr: arg }),
            ParamConvention::DirectOwned => func.push(entry, Instr::DestroyValue { value: arg }),
            _ => {}
        }
    }
    func.set_terminator(BlockId::ENTRY, Terminator::Return { value: total });
    func
}

/// Materialize the arguments for a call to `sum`.
fn make_args(
    interp: &mut Interpreter<'_>,
    world: &World,
    shapes: &[Shape],
    payloads: &[i64],
) -> Vec<Value> {
    shapes
        .iter()
        .zip(payloads)
        .map(|(&shape, &payload)| match shape {
            Shape::Int => Value::Int(payload),
            Shape::Opaque(_) => {
                let object = interp.alloc_object(payload);
                interp.alloc_boxed(world.any_p, world.widget, object)
            }
            Shape::Class(convention) => {
                let reference = interp.alloc_existential_ref(world.widget, payload);
                if convention.is_indirect() {
                    interp.alloc_slot_with(reference)
                } else {
                    reference
                }
            }
        })
        .collect()
}

/// Release what the caller still owns after the call.
fn release_args(interp: &mut Interpreter<'_>, shapes: &[Shape], args: &[Value]) {
    for (&shape, &arg) in shapes.iter().zip(args) {
        match shape {
            Shape::Int | Shape::Class(ParamConvention::DirectOwned) => {}
            Shape::Opaque(_) => interp.destroy_slot(arg).unwrap(),
            Shape::Class(convention) if convention.is_indirect() => {
                interp.destroy_slot(arg).unwrap();
            }
            Shape::Class(_) => interp.release(arg).unwrap(),
        }
    }
}

// -- Properties --

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn specialization_preserves_signature_and_behavior(
        (shapes, payloads, selection) in candidate_strategy()
    ) {
        let mut world = world();
        let func = build_sum(&mut world, &shapes);
        let orig_ty = func.ty.clone();
        let f = world.module.add_function(func);

        let candidate = Candidate::from_conventions(&world.module, f, selection.iter().copied());
        let spec = ExistentialTransform::with_options(
            &mut world.module,
            candidate,
            TransformOptions { verify: true },
        )
        .run();
        prop_assert!(!spec.reused);

        let new_ty = &world.module.function(spec.specialized).ty;
        prop_assert_eq!(new_ty.generic_sig.params().len(), selection.len());
        prop_assert_eq!(new_ty.generic_sig.requirements().len(), selection.len());
        prop_assert_eq!(new_ty.params.len(), shapes.len());
        for (index, (new, old)) in new_ty.params.iter().zip(&orig_ty.params).enumerate() {
            prop_assert_eq!(new.convention, old.convention);
            prop_assert_eq!(new.ty == old.ty, !selection.contains(&index));
        }
        prop_assert_eq!(&world.module.function(f).ty, &orig_ty);

        let functions = world.module.functions().count();
        let candidate = Candidate::from_conventions(&world.module, f, selection.iter().copied());
        let again = ExistentialTransform::with_options(
            &mut world.module,
            candidate,
            TransformOptions { verify: true },
        )
        .run();
        prop_assert!(again.reused);
        prop_assert_eq!(again.specialized, spec.specialized);
        prop_assert_eq!(world.module.functions().count(), functions);

        let mut interp = Interpreter::new(&world.module);
        let args = make_args(&mut interp, &world, &shapes, &payloads);
        let expected: i64 = payloads.iter().sum();
        prop_assert_eq!(
            interp.call("sum", args.clone()),
            Ok(Outcome::Returned(Value::Int(expected)))
        );
        release_args(&mut interp, &shapes, &args);
        prop_assert_eq!(interp.live_objects(), 0);
        prop_assert_eq!(interp.live_slots(), 0);
    }
}
