//! Structural verifier for function bodies.
//!
//! Checks the invariants every pass must preserve:
//!
//! - the entry block arguments match the function type's parameters
//! - every operand is a value defined somewhere in the function
//! - every branch target exists and receives the right number of arguments
//! - no block branches back to the entry block
//! - stack slots are deallocated in LIFO order, nothing is left allocated
//!   when the function returns or throws, and all paths into a block agree
//!   on the set of live slots
//!
//! Paths ending in `unreachable` are exempt from the stack leak check.

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::graph::depth_first_preorder;
use crate::ir::{BlockId, Function, Instr, Terminator, ValueId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("entry block has {found} arguments, function type has {expected} parameters")]
    EntryArity { expected: usize, found: usize },

    #[error("entry argument {index} does not match parameter {index} of the function type")]
    ParamMismatch { index: usize },

    #[error("block {block:?} uses undefined value {value:?}")]
    UndefinedValue { block: BlockId, value: ValueId },

    #[error("block {block:?} branches to missing block {target:?}")]
    MissingBlock { block: BlockId, target: BlockId },

    #[error("block {block:?} branches to the entry block")]
    EntryIsBranchTarget { block: BlockId },

    #[error("block {block:?} passes {found} arguments to {target:?}, which takes {expected}")]
    ArgCountMismatch {
        block: BlockId,
        target: BlockId,
        expected: usize,
        found: usize,
    },

    #[error("block {block:?} deallocates {slot:?}, which is not the innermost live stack slot")]
    NonLifoDealloc { block: BlockId, slot: ValueId },

    #[error("block {block:?} exits the function with {live} live stack slots")]
    StackLeak { block: BlockId, live: usize },

    #[error("predecessors of block {block:?} disagree on the live stack slots")]
    InconsistentStack { block: BlockId },
}

/// Verify a function. Declarations are trivially valid.
pub fn verify_function(func: &Function) -> Result<(), VerifyError> {
    if !func.is_definition() {
        return Ok(());
    }
    check_entry(func)?;
    let order = depth_first_preorder(func);
    check_operands_and_edges(func, &order)?;
    check_stack_discipline(func, &order)
}

fn check_entry(func: &Function) -> Result<(), VerifyError> {
    let args = func.entry_args();
    if args.len() != func.ty.params.len() {
        return Err(VerifyError::EntryArity {
            expected: func.ty.params.len(),
            found: args.len(),
        });
    }
    for (index, (&arg, param)) in args.iter().zip(&func.ty.params).enumerate() {
        let data = func.value(arg);
        if data.ty != param.ty || data.category != param.convention.category() {
            return Err(VerifyError::ParamMismatch { index });
        }
    }
    Ok(())
}

fn check_operands_and_edges(func: &Function, order: &[BlockId]) -> Result<(), VerifyError> {
    let mut defined: FxHashSet<ValueId> = FxHashSet::default();
    for block in &func.blocks {
        defined.extend(block.args.iter().copied());
        defined.extend(block.body.iter().filter_map(Instr::defined_value));
    }
    let is_defined =
        |value: ValueId| value.index() < func.values.len() && defined.contains(&value);

    for &id in order {
        let block = func.block(id);
        let operands = block
            .body
            .iter()
            .flat_map(Instr::operands)
            .chain(block.terminator.operands());
        for value in operands {
            if !is_defined(value) {
                return Err(VerifyError::UndefinedValue { block: id, value });
            }
        }

        for target in block.terminator.successors() {
            if target == BlockId::ENTRY {
                return Err(VerifyError::EntryIsBranchTarget { block: id });
            }
            let Some(target_block) = func.blocks.get(target.index()) else {
                return Err(VerifyError::MissingBlock { block: id, target });
            };
            let passed = match &block.terminator {
                Terminator::Br { args, .. } => args.len(),
                // The call result or the error.
                Terminator::TryApply { .. } => 1,
                _ => 0,
            };
            if target_block.args.len() != passed {
                return Err(VerifyError::ArgCountMismatch {
                    block: id,
                    target,
                    expected: target_block.args.len(),
                    found: passed,
                });
            }
        }
    }
    Ok(())
}

fn check_stack_discipline(func: &Function, order: &[BlockId]) -> Result<(), VerifyError> {
    let mut at_entry: Vec<Option<Vec<ValueId>>> = vec![None; func.blocks.len()];
    at_entry[BlockId::ENTRY.index()] = Some(Vec::new());

    // Preorder visits a block only after at least one predecessor, except
    // for loop headers reached through a back edge, which are compared
    // when the back edge is processed.
    for &id in order {
        let Some(mut stack) = at_entry[id.index()].clone() else {
            continue;
        };
        let block = func.block(id);
        for instr in &block.body {
            match instr {
                Instr::AllocStack { dst, .. } => stack.push(*dst),
                Instr::DeallocStack { slot } => {
                    if stack.last() != Some(slot) {
                        return Err(VerifyError::NonLifoDealloc {
                            block: id,
                            slot: *slot,
                        });
                    }
                    stack.pop();
                }
                _ => {}
            }
        }

        if block.terminator.is_function_exit() && !stack.is_empty() {
            return Err(VerifyError::StackLeak {
                block: id,
                live: stack.len(),
            });
        }

        for succ in block.terminator.successors() {
            match &at_entry[succ.index()] {
                Some(existing) if *existing != stack => {
                    return Err(VerifyError::InconsistentStack { block: succ });
                }
                Some(_) => {}
                None => at_entry[succ.index()] = Some(stack.clone()),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
