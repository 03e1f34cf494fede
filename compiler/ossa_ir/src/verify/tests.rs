use pretty_assertions::assert_eq;

use crate::generics::GenericSignature;
use crate::ir::{
    FnRepresentation, FnType, OwnershipKind, ParamConvention, ParamInfo, ValueData,
};
use crate::name::Interner;
use crate::types::Idx;

use super::*;

/// `f(x: int) -> ()` with an entry block holding `x`.
fn int_fn() -> (Function, ValueId) {
    let mut names = Interner::new();
    let ty = FnType {
        generic_sig: GenericSignature::empty(),
        representation: FnRepresentation::Thin,
        params: vec![ParamInfo {
            ty: Idx::INT,
            convention: ParamConvention::DirectGuaranteed,
        }],
        result: Idx::UNIT,
        error: None,
    };
    let mut func = Function::new(names.intern("f"), ty);
    let entry = func.create_block();
    let x = func.add_block_arg(entry, ValueData::object(Idx::INT, OwnershipKind::None));
    (func, x)
}

fn unit(func: &mut Function, block: BlockId) -> ValueId {
    let dst = func.add_value(ValueData::object(Idx::UNIT, OwnershipKind::None));
    func.push(block, Instr::Literal { dst, value: 0 });
    dst
}

fn alloc(func: &mut Function, block: BlockId) -> ValueId {
    let dst = func.add_value(ValueData::address(Idx::INT));
    func.push(block, Instr::AllocStack { dst, ty: Idx::INT });
    dst
}

#[test]
fn declarations_are_valid() {
    let (mut func, _) = int_fn();
    func.discard_body();
    assert_eq!(verify_function(&func), Ok(()));
}

#[test]
fn balanced_nested_slots_verify() {
    let (mut func, _) = int_fn();
    let entry = BlockId::ENTRY;
    let outer = alloc(&mut func, entry);
    let inner = alloc(&mut func, entry);
    func.push(entry, Instr::DeallocStack { slot: inner });
    func.push(entry, Instr::DeallocStack { slot: outer });
    let value = unit(&mut func, entry);
    func.set_terminator(entry, Terminator::Return { value });
    assert_eq!(verify_function(&func), Ok(()));
}

#[test]
fn entry_arity_must_match_type() {
    let (mut func, _) = int_fn();
    func.ty.params.clear();
    let value = unit(&mut func, BlockId::ENTRY);
    func.set_terminator(BlockId::ENTRY, Terminator::Return { value });
    assert_eq!(
        verify_function(&func),
        Err(VerifyError::EntryArity {
            expected: 0,
            found: 1
        })
    );
}

#[test]
fn undefined_operand_is_reported() {
    let (mut func, _) = int_fn();
    let dangling = func.add_value(ValueData::object(Idx::UNIT, OwnershipKind::None));
    func.set_terminator(BlockId::ENTRY, Terminator::Return { value: dangling });
    assert_eq!(
        verify_function(&func),
        Err(VerifyError::UndefinedValue {
            block: BlockId::ENTRY,
            value: dangling
        })
    );
}

#[test]
fn branch_arguments_are_counted() {
    let (mut func, x) = int_fn();
    let exit = func.create_block();
    func.add_block_arg(exit, ValueData::object(Idx::INT, OwnershipKind::None));
    func.set_terminator(
        BlockId::ENTRY,
        Terminator::Br {
            target: exit,
            args: vec![x, x],
        },
    );
    assert_eq!(
        verify_function(&func),
        Err(VerifyError::ArgCountMismatch {
            block: BlockId::ENTRY,
            target: exit,
            expected: 1,
            found: 2
        })
    );
}

#[test]
fn missing_branch_target() {
    let (mut func, _) = int_fn();
    let target = BlockId::new(7);
    func.set_terminator(BlockId::ENTRY, Terminator::Br { target, args: vec![] });
    assert_eq!(
        verify_function(&func),
        Err(VerifyError::MissingBlock {
            block: BlockId::ENTRY,
            target
        })
    );
}

#[test]
fn out_of_order_dealloc_is_rejected() {
    let (mut func, _) = int_fn();
    let entry = BlockId::ENTRY;
    let outer = alloc(&mut func, entry);
    let inner = alloc(&mut func, entry);
    func.push(entry, Instr::DeallocStack { slot: outer });
    func.push(entry, Instr::DeallocStack { slot: inner });
    let value = unit(&mut func, entry);
    func.set_terminator(entry, Terminator::Return { value });
    assert_eq!(
        verify_function(&func),
        Err(VerifyError::NonLifoDealloc {
            block: entry,
            slot: outer
        })
    );
}

#[test]
fn leaked_slot_on_return() {
    let (mut func, _) = int_fn();
    let entry = BlockId::ENTRY;
    alloc(&mut func, entry);
    let value = unit(&mut func, entry);
    func.set_terminator(entry, Terminator::Return { value });
    assert_eq!(
        verify_function(&func),
        Err(VerifyError::StackLeak {
            block: entry,
            live: 1
        })
    );
}

#[test]
fn unreachable_exit_may_hold_slots() {
    let (mut func, _) = int_fn();
    alloc(&mut func, BlockId::ENTRY);
    assert_eq!(func.block(BlockId::ENTRY).terminator, Terminator::Unreachable);
    assert_eq!(verify_function(&func), Ok(()));
}

#[test]
fn merge_points_must_agree() {
    let (mut func, _) = int_fn();
    let entry = BlockId::ENTRY;
    let left = func.create_block();
    let right = func.create_block();
    let join = func.create_block();

    let cond = func.add_value(ValueData::object(Idx::BOOL, OwnershipKind::None));
    func.push(entry, Instr::Literal { dst: cond, value: 1 });
    func.set_terminator(
        entry,
        Terminator::CondBr {
            cond,
            then_block: left,
            else_block: right,
        },
    );
    alloc(&mut func, left);
    func.set_terminator(left, Terminator::Br { target: join, args: vec![] });
    func.set_terminator(right, Terminator::Br { target: join, args: vec![] });

    assert_eq!(
        verify_function(&func),
        Err(VerifyError::InconsistentStack { block: join })
    );
}

#[test]
fn entry_block_cannot_be_a_branch_target() {
    let (mut func, _) = int_fn();
    let body = func.create_block();
    func.set_terminator(BlockId::ENTRY, Terminator::Br { target: body, args: vec![] });
    func.set_terminator(
        body,
        Terminator::Br {
            target: BlockId::ENTRY,
            args: vec![],
        },
    );
    assert_eq!(
        verify_function(&func),
        Err(VerifyError::EntryIsBranchTarget { block: body })
    );
}
