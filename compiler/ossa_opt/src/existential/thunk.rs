//! Thunk generation: the original function becomes a trampoline that opens
//! its existential arguments and forwards to the specialization.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use ossa_ir::{
    BlockId, ExistentialRepr, FnType, FuncId, Function, Idx, InlineStrategy, Instr, LoadQualifier,
    Module, Name, OwnershipKind, StoreQualifier, SubstitutionMap, Terminator, ThunkKind,
    TypePool, ValueData, ValueId,
};

use super::descriptor::ArgumentDescriptor;
use super::SelectedArg;

/// Release obligations of the marshalling code, discharged after the call.
#[derive(Default)]
struct Temps {
    /// Scratch slots, in allocation order.
    dealloc: SmallVec<[ValueId; 4]>,
    /// Addresses whose contents must be destroyed.
    destroy_addr: SmallVec<[ValueId; 4]>,
}

pub(super) struct ThunkBuilder<'a> {
    module: &'a mut Module,
    thunk: FuncId,
    orig: &'a Function,
    args: &'a [ArgumentDescriptor],
    selected: &'a BTreeMap<usize, SelectedArg>,
}

impl<'a> ThunkBuilder<'a> {
    pub(super) fn new(
        module: &'a mut Module,
        thunk: FuncId,
        orig: &'a Function,
        args: &'a [ArgumentDescriptor],
        selected: &'a BTreeMap<usize, SelectedArg>,
    ) -> Self {
        ThunkBuilder {
            module,
            thunk,
            orig,
            args,
            selected,
        }
    }

    /// Replace the thunk's body with a call to `callee` of type `callee_ty`.
    pub(super) fn populate(self, callee: Name, callee_ty: &FnType) {
        let ThunkBuilder {
            module,
            thunk,
            orig,
            args,
            selected,
        } = self;

        // Type work happens before the function is borrowed mutably.
        let opened: BTreeMap<usize, Idx> = selected
            .iter()
            .map(|(&index, arg)| (index, module.types.open_existential(arg.existential)))
            .collect();
        let subs = build_substitutions(&module.types, orig, selected, &opened, callee_ty);
        let result_trivial = module.types.is_trivial(callee_ty.result);

        let func = module.function_mut(thunk);
        func.discard_body();
        func.thunk = ThunkKind::SignatureOptimizedThunk;
        func.inline = InlineStrategy::AlwaysInline;
        let tracked = func.has_ownership();

        let entry = func.create_block();
        let mut temps = Temps::default();
        let mut call_args = Vec::with_capacity(args.len());

        for arg in args {
            let param = func.add_block_arg(entry, orig.value(arg.value).clone());
            let Some(sel) = selected.get(&arg.index) else {
                call_args.push(param);
                continue;
            };
            let opened_ty = opened[&arg.index];
            let forwarded = match sel.repr {
                ExistentialRepr::Opaque => {
                    open_opaque(func, entry, param, opened_ty, *sel, &mut temps)
                }
                ExistentialRepr::Class => {
                    open_class(func, entry, param, opened_ty, *sel, tracked, &mut temps)
                }
                ExistentialRepr::Boxed => panic!(
                    "unsupported existential representation for argument {}",
                    arg.index
                ),
            };
            call_args.push(forwarded);
        }

        let result_ownership = OwnershipKind::for_owned_result(func.ownership, result_trivial);
        let noreturn = callee_ty.is_noreturn();

        match callee_ty.error {
            None => {
                let result = func.add_value(ValueData::object(callee_ty.result, result_ownership));
                func.push(
                    entry,
                    Instr::Apply {
                        dst: result,
                        callee,
                        subs,
                        args: call_args,
                    },
                );
                finish_normal_path(func, entry, result, &temps, noreturn);
            }
            Some(error_ty) => {
                let normal = func.create_block();
                let result =
                    func.add_block_arg(normal, ValueData::object(callee_ty.result, result_ownership));
                let error_block = func.create_block();
                let error = func.add_block_arg(
                    error_block,
                    ValueData::object(error_ty, OwnershipKind::for_owned_result(func.ownership, false)),
                );
                func.set_terminator(
                    entry,
                    Terminator::TryApply {
                        callee,
                        subs,
                        args: call_args,
                        normal,
                        error: error_block,
                    },
                );
                finish_normal_path(func, normal, result, &temps, noreturn);
                emit_cleanups(func, error_block, &temps);
                func.set_terminator(error_block, Terminator::Throw { value: error });
            }
        }
    }
}

/// Open an opaque existential. A consumed argument is copied into a private
/// slot because the projection is only borrowed; the box is destroyed after
/// the call.
fn open_opaque(
    func: &mut Function,
    entry: BlockId,
    param: ValueId,
    opened_ty: Idx,
    sel: SelectedArg,
    temps: &mut Temps,
) -> ValueId {
    let projection = func.add_value(ValueData::address(opened_ty));
    func.push(
        entry,
        Instr::OpenExistentialAddr {
            dst: projection,
            existential: param,
            opened: opened_ty,
            access: sel.access,
        },
    );
    if !sel.is_consumed {
        return projection;
    }

    let copy = func.add_value(ValueData::address(opened_ty));
    func.push(entry, Instr::AllocStack { dst: copy, ty: opened_ty });
    func.push(
        entry,
        Instr::CopyAddr {
            src: projection,
            dst: copy,
            take: false,
            init: true,
        },
    );
    temps.dealloc.push(copy);
    temps.destroy_addr.push(param);
    copy
}

/// Open a class existential, loading it first when passed by address and
/// spilling the opened reference when the callee expects an address.
fn open_class(
    func: &mut Function,
    entry: BlockId,
    param: ValueId,
    opened_ty: Idx,
    sel: SelectedArg,
    tracked: bool,
    temps: &mut Temps,
) -> ValueId {
    let by_address = sel.convention.is_indirect();
    let reference = if by_address {
        let qualifier = match (tracked, sel.is_consumed) {
            (false, _) => LoadQualifier::Unqualified,
            (true, true) => LoadQualifier::Take,
            (true, false) => LoadQualifier::Copy,
        };
        let loaded = func.add_value(ValueData::object(
            sel.existential,
            OwnershipKind::for_owned_result(func.ownership, false),
        ));
        func.push(
            entry,
            Instr::Load {
                dst: loaded,
                addr: param,
                qualifier,
            },
        );
        loaded
    } else {
        param
    };

    let ownership = func.value(reference).ownership;
    let opened = func.add_value(ValueData::object(opened_ty, ownership));
    func.push(
        entry,
        Instr::OpenExistentialRef {
            dst: opened,
            value: reference,
            opened: opened_ty,
        },
    );
    if !by_address {
        return opened;
    }

    let slot = func.add_value(ValueData::address(opened_ty));
    func.push(entry, Instr::AllocStack { dst: slot, ty: opened_ty });
    func.push(
        entry,
        Instr::Store {
            value: opened,
            addr: slot,
            qualifier: if tracked {
                StoreQualifier::Init
            } else {
                StoreQualifier::Unqualified
            },
        },
    );
    temps.dealloc.push(slot);
    // A borrowing callee leaves the loaded copy in the slot.
    if tracked && !sel.is_consumed {
        temps.destroy_addr.push(slot);
    }
    slot
}

fn emit_cleanups(func: &mut Function, block: BlockId, temps: &Temps) {
    for &addr in &temps.destroy_addr {
        func.push(block, Instr::DestroyAddr { addr });
    }
    for &slot in temps.dealloc.iter().rev() {
        func.push(block, Instr::DeallocStack { slot });
    }
}

fn finish_normal_path(
    func: &mut Function,
    block: BlockId,
    result: ValueId,
    temps: &Temps,
    noreturn: bool,
) {
    if noreturn {
        func.set_terminator(block, Terminator::Unreachable);
        return;
    }
    emit_cleanups(func, block, temps);
    func.set_terminator(block, Terminator::Return { value: result });
}

/// Substitutions for the callee's signature: the thunk's own generic
/// parameters forward to themselves, the new ones bind to the opened types.
fn build_substitutions(
    pool: &TypePool,
    orig: &Function,
    selected: &BTreeMap<usize, SelectedArg>,
    opened: &BTreeMap<usize, Idx>,
    callee_ty: &FnType,
) -> SubstitutionMap {
    let orig_depth = orig.ty.generic_sig.next_depth(pool);
    let forwarding = SubstitutionMap::forwarding(&orig.ty.generic_sig);
    let by_param: FxHashMap<Idx, Idx> = selected
        .iter()
        .map(|(index, arg)| (arg.generic_param, opened[index]))
        .collect();

    SubstitutionMap::build(&callee_ty.generic_sig, |param| {
        match pool.generic_param_key(param) {
            Some((depth, _)) if depth < orig_depth => forwarding.apply(param),
            _ => match by_param.get(&param) {
                Some(&opened) => opened,
                None => panic!("generic parameter {param:?} has no replacement"),
            },
        }
    })
}
