//! Body of the specialization.
//!
//! The entry block is synthesized: each selected argument arrives as a value
//! (or address) of its generic parameter type and is boxed back into the
//! existential shape the original body expects. The rest of the CFG is
//! cloned depth-first from the entry, remapping values through an
//! index-keyed table. Blocks unreachable from the entry are dropped.
//!
//! Boxing may leave obligations behind: scratch slots to deallocate and
//! values to destroy. They are discharged immediately before the terminator
//! of every block without successors, destroys first, then deallocations in
//! reverse allocation order.

use std::collections::BTreeMap;

use ossa_ir::graph::{depth_first_preorder, exiting_blocks};
use ossa_ir::{
    BlockId, ExistentialRepr, Function, Idx, Instr, LoadQualifier, Module, OwnershipKind,
    StoreQualifier, ValueData, ValueId,
};

use super::descriptor::ArgumentDescriptor;
use super::SelectedArg;

pub(super) struct SpecializerCloner<'a> {
    module: &'a Module,
    orig: &'a Function,
    new_fn: &'a mut Function,
    args: &'a [ArgumentDescriptor],
    selected: &'a BTreeMap<usize, SelectedArg>,
    /// Original value index → cloned value.
    value_map: Vec<Option<ValueId>>,
    /// Original block index → cloned block.
    block_map: Vec<Option<BlockId>>,
    /// Scratch slots, in allocation order.
    stack_slots: Vec<ValueId>,
    /// Slots whose contents must be destroyed on exit.
    destroy_addrs: Vec<ValueId>,
    /// Objects that must be destroyed on exit.
    destroy_values: Vec<ValueId>,
}

impl<'a> SpecializerCloner<'a> {
    pub(super) fn new(
        module: &'a Module,
        orig: &'a Function,
        new_fn: &'a mut Function,
        args: &'a [ArgumentDescriptor],
        selected: &'a BTreeMap<usize, SelectedArg>,
    ) -> Self {
        SpecializerCloner {
            module,
            orig,
            new_fn,
            args,
            selected,
            value_map: vec![None; orig.values.len()],
            block_map: vec![None; orig.blocks.len()],
            stack_slots: Vec::new(),
            destroy_addrs: Vec::new(),
            destroy_values: Vec::new(),
        }
    }

    pub(super) fn clone_function(mut self) {
        let entry = self.new_fn.create_block();
        self.block_map[BlockId::ENTRY.index()] = Some(entry);

        let (args, selected) = (self.args, self.selected);
        for arg in args {
            let replacement = match selected.get(&arg.index) {
                Some(selected) => self.box_generic_arg(entry, arg, *selected),
                None => self.new_fn.add_block_arg(
                    entry,
                    ValueData {
                        ty: arg.ty,
                        category: arg.convention.category(),
                        ownership: arg.ownership,
                        decl: arg.decl,
                        flags: arg.flags,
                    },
                ),
            };
            self.value_map[arg.value.index()] = Some(replacement);
        }

        self.clone_blocks();
        self.insert_exit_cleanups();
    }

    /// Create the generic argument for `arg` and box it into the
    /// existential shape, returning the value that stands in for the
    /// original argument.
    fn box_generic_arg(
        &mut self,
        entry: BlockId,
        arg: &ArgumentDescriptor,
        selected: SelectedArg,
    ) -> ValueId {
        let tracked = self.new_fn.has_ownership();
        let by_address = arg.convention.is_indirect();
        let generic_arg = self.new_fn.add_block_arg(
            entry,
            ValueData {
                ty: selected.generic_param,
                category: arg.convention.category(),
                ownership: OwnershipKind::for_argument(
                    arg.convention,
                    self.new_fn.ownership,
                    false,
                ),
                decl: arg.decl,
                flags: arg.flags,
            },
        );
        let conformances = self
            .module
            .collect_existential_conformances(selected.generic_param, selected.existential);

        match selected.repr {
            ExistentialRepr::Opaque => {
                let slot = self.alloc_stack(entry, selected.existential);
                let payload = self
                    .new_fn
                    .add_value(ValueData::address(selected.generic_param));
                self.new_fn.push(
                    entry,
                    Instr::InitExistentialAddr {
                        dst: payload,
                        existential: slot,
                        concrete: selected.generic_param,
                        conformances,
                    },
                );
                self.new_fn.push(
                    entry,
                    Instr::CopyAddr {
                        src: generic_arg,
                        dst: payload,
                        take: selected.is_consumed,
                        init: true,
                    },
                );
                if !selected.is_consumed {
                    self.destroy_addrs.push(slot);
                }
                slot
            }
            ExistentialRepr::Class => {
                let mut value = generic_arg;
                if by_address {
                    let qualifier = match (tracked, selected.is_consumed) {
                        (false, _) => LoadQualifier::Unqualified,
                        (true, true) => LoadQualifier::Take,
                        (true, false) => LoadQualifier::Copy,
                    };
                    value = self.new_fn.add_value(ValueData::object(
                        selected.generic_param,
                        OwnershipKind::for_owned_result(self.new_fn.ownership, false),
                    ));
                    self.new_fn.push(
                        entry,
                        Instr::Load {
                            dst: value,
                            addr: generic_arg,
                            qualifier,
                        },
                    );
                } else if tracked && arg.ownership == OwnershipKind::Unowned {
                    let copy = self.new_fn.add_value(ValueData::object(
                        selected.generic_param,
                        OwnershipKind::Owned,
                    ));
                    self.new_fn.push(entry, Instr::CopyValue { dst: copy, value });
                    value = copy;
                }

                let ownership = self.new_fn.value(value).ownership;
                let existential_ref = self
                    .new_fn
                    .add_value(ValueData::object(selected.existential, ownership));
                self.new_fn.push(
                    entry,
                    Instr::InitExistentialRef {
                        dst: existential_ref,
                        ty: selected.existential,
                        concrete: selected.generic_param,
                        value,
                        conformances,
                    },
                );

                if !by_address {
                    if tracked && arg.ownership == OwnershipKind::Unowned {
                        self.destroy_values.push(existential_ref);
                    }
                    return existential_ref;
                }

                let slot = self.alloc_stack(entry, selected.existential);
                self.new_fn.push(
                    entry,
                    Instr::Store {
                        value: existential_ref,
                        addr: slot,
                        qualifier: if tracked {
                            StoreQualifier::Init
                        } else {
                            StoreQualifier::Unqualified
                        },
                    },
                );
                // The slot holds a copy the body only borrows.
                if tracked && !selected.is_consumed {
                    self.destroy_addrs.push(slot);
                }
                slot
            }
            ExistentialRepr::Boxed => panic!(
                "unsupported existential representation for argument {}",
                arg.index
            ),
        }
    }

    fn alloc_stack(&mut self, block: BlockId, ty: Idx) -> ValueId {
        let slot = self.new_fn.add_value(ValueData::address(ty));
        self.new_fn.push(block, Instr::AllocStack { dst: slot, ty });
        self.stack_slots.push(slot);
        slot
    }

    fn clone_blocks(&mut self) {
        let orig = self.orig;
        let order = depth_first_preorder(orig);

        // Create every block (and its arguments) first so branches to
        // blocks not yet visited can be remapped.
        for &id in &order {
            if id == BlockId::ENTRY {
                continue;
            }
            let new_id = self.new_fn.create_block();
            self.block_map[id.index()] = Some(new_id);
            for &arg in &orig.block(id).args {
                let data = orig.value(arg).clone();
                let new_arg = self.new_fn.add_block_arg(new_id, data);
                self.value_map[arg.index()] = Some(new_arg);
            }
        }

        for &id in &order {
            let new_id = remap_block(&self.block_map, id);
            let block = orig.block(id);
            for instr in &block.body {
                if let Some(def) = instr.defined_value() {
                    let data = orig.value(def).clone();
                    self.value_map[def.index()] = Some(self.new_fn.add_value(data));
                }
                let mut cloned = instr.clone();
                cloned.map_values(|v| remap_value(&self.value_map, v));
                self.new_fn.push(new_id, cloned);
            }
            let mut terminator = block.terminator.clone();
            terminator.map_values(|v| remap_value(&self.value_map, v));
            terminator.map_blocks(|b| remap_block(&self.block_map, b));
            self.new_fn.set_terminator(new_id, terminator);
        }
    }

    fn insert_exit_cleanups(&mut self) {
        for exit in exiting_blocks(self.new_fn) {
            for &addr in &self.destroy_addrs {
                self.new_fn.push(exit, Instr::DestroyAddr { addr });
            }
            for &value in &self.destroy_values {
                self.new_fn.push(exit, Instr::DestroyValue { value });
            }
            for &slot in self.stack_slots.iter().rev() {
                self.new_fn.push(exit, Instr::DeallocStack { slot });
            }
        }
    }
}

fn remap_value(map: &[Option<ValueId>], value: ValueId) -> ValueId {
    match map.get(value.index()).copied().flatten() {
        Some(mapped) => mapped,
        None => panic!("value {value:?} used before its definition was cloned"),
    }
}

fn remap_block(map: &[Option<BlockId>], block: BlockId) -> BlockId {
    match map.get(block.index()).copied().flatten() {
        Some(mapped) => mapped,
        None => panic!("branch to block {block:?}, which was not cloned"),
    }
}
