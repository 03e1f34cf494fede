//! Reference interpreter for ownership-tracked functions.
//!
//! Executes function bodies over a small object model and reports ownership
//! and memory errors instead of silently tolerating them:
//!
//! - class instances are reference counted; using a released instance is an
//!   error, and [`Interpreter::live_objects`] exposes leaks
//! - memory slots track whether they are initialized; reading uninitialized
//!   memory, initializing twice or deallocating initialized stack memory are
//!   errors
//! - stack slots must be deallocated in LIFO order and none may be live when
//!   a function returns or throws
//! - an indirect argument passed `@in` must be left uninitialized by the
//!   callee, one passed `@in_guaranteed` must be left initialized
//!
//! Opaque existentials live in memory as a box referring to a separate
//! payload slot, class existentials are a reference plus its dynamic type.
//! Opening an existential binds the opened type to the dynamic type for the
//! rest of the frame; generic parameters are bound by the caller's
//! substitution map.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::generics::SubstitutionMap;
use crate::ir::{
    BlockId, BuiltinOp, Function, Instr, LoadQualifier, ParamConvention, StoreQualifier,
    Terminator, ValueId,
};
use crate::module::Module;
use crate::name::Name;
use crate::types::Idx;

const DEFAULT_STEP_LIMIT: usize = 100_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectId(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotId(u32);

/// A run-time value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Unit,
    /// Reference to a class instance.
    Object(ObjectId),
    /// Class existential: a reference tagged with its dynamic type.
    ExistentialRef { concrete: Idx, object: ObjectId },
    /// Address of a memory slot.
    Address(SlotId),
}

/// Result of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Returned(Value),
    Threw(Value),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpError {
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("function `{0}` has no body")]
    NoBody(String),
    #[error("function `{0}` does not track ownership")]
    OwnershipEliminated(String),
    #[error("`{function}` expects {expected} arguments, got {found}")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },
    #[error("use of undefined value {0:?}")]
    UndefinedValue(ValueId),
    #[error("access to deallocated slot {0:?}")]
    DeadSlot(SlotId),
    #[error("read of uninitialized slot {0:?}")]
    Uninitialized(SlotId),
    #[error("initialization of already initialized slot {0:?}")]
    AlreadyInitialized(SlotId),
    #[error("deallocation of initialized slot {0:?}")]
    DeallocInitialized(SlotId),
    #[error("slot {0:?} is not the innermost stack allocation")]
    StackOrder(SlotId),
    #[error("use of released object {0:?}")]
    UseAfterRelease(ObjectId),
    #[error("expected {0}")]
    TypeMismatch(&'static str),
    #[error("`{function}` exits with {live} live stack slots")]
    StackLeak { function: String, live: usize },
    #[error("`{function}` left its consumed argument {index} initialized")]
    ArgumentNotConsumed { function: String, index: usize },
    #[error("`{function}` consumed its borrowed argument {index}")]
    ArgumentConsumed { function: String, index: usize },
    #[error("reached unreachable in `{0}`")]
    ReachedUnreachable(String),
    #[error("non-throwing call to `{0}` threw")]
    UnhandledThrow(String),
    #[error("step limit exceeded")]
    StepLimit,
}

/// Contents of an initialized slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Contents {
    Value(Value),
    /// Opaque existential box holding a value of type `concrete`.
    Boxed { concrete: Idx, payload: SlotId },
}

#[derive(Debug)]
struct ObjectData {
    payload: i64,
    refcount: u32,
}

#[derive(Debug)]
struct SlotData {
    live: bool,
    contents: Option<Contents>,
}

struct Frame {
    env: FxHashMap<ValueId, Value>,
    /// Opened and generic parameter types bound to dynamic types.
    types: FxHashMap<Idx, Idx>,
    stack: Vec<SlotId>,
}

impl Frame {
    fn get(&self, value: ValueId) -> Result<Value, InterpError> {
        self.env
            .get(&value)
            .copied()
            .ok_or(InterpError::UndefinedValue(value))
    }

    fn resolve(&self, ty: Idx) -> Idx {
        self.types.get(&ty).copied().unwrap_or(ty)
    }
}

pub struct Interpreter<'m> {
    module: &'m Module,
    objects: Vec<ObjectData>,
    slots: Vec<SlotData>,
    /// `(existential type, dynamic type)` of every box created.
    boxing_log: Vec<(Idx, Idx)>,
    steps: usize,
    step_limit: usize,
}

impl<'m> Interpreter<'m> {
    pub fn new(module: &'m Module) -> Self {
        Interpreter {
            module,
            objects: Vec::new(),
            slots: Vec::new(),
            boxing_log: Vec::new(),
            steps: 0,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    #[must_use]
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    // === Heap setup and inspection ===

    /// Allocate a class instance with refcount 1.
    pub fn alloc_object(&mut self, payload: i64) -> Value {
        Value::Object(self.new_object(payload))
    }

    /// Allocate a class instance of type `concrete` wrapped in a class
    /// existential.
    pub fn alloc_existential_ref(&mut self, concrete: Idx, payload: i64) -> Value {
        Value::ExistentialRef {
            concrete,
            object: self.new_object(payload),
        }
    }

    /// Allocate a slot initialized with `value`, returning its address.
    pub fn alloc_slot_with(&mut self, value: Value) -> Value {
        Value::Address(self.new_slot(Some(Contents::Value(value))))
    }

    /// Allocate an opaque existential box of type `existential` holding
    /// `value` of type `concrete`, returning its address.
    pub fn alloc_boxed(&mut self, existential: Idx, concrete: Idx, value: Value) -> Value {
        let payload = self.new_slot(Some(Contents::Value(value)));
        self.boxing_log.push((existential, concrete));
        Value::Address(self.new_slot(Some(Contents::Boxed { concrete, payload })))
    }

    /// Destroy an owned value.
    pub fn release(&mut self, value: Value) -> Result<(), InterpError> {
        match value {
            Value::Object(object) | Value::ExistentialRef { object, .. } => {
                let data = self.object_mut(object)?;
                data.refcount -= 1;
                Ok(())
            }
            Value::Int(_) | Value::Bool(_) | Value::Unit | Value::Address(_) => Ok(()),
        }
    }

    /// Destroy the contents of a slot (if initialized) and free it.
    pub fn destroy_slot(&mut self, addr: Value) -> Result<(), InterpError> {
        let slot = expect_address(addr)?;
        if let Some(contents) = self.slot_mut(slot)?.contents.take() {
            self.destroy_contents(contents)?;
        }
        self.slot_mut(slot)?.live = false;
        Ok(())
    }

    /// Whether the slot at `addr` holds an initialized value.
    pub fn is_initialized(&self, addr: Value) -> bool {
        match addr {
            Value::Address(slot) => self
                .slots
                .get(slot.0 as usize)
                .is_some_and(|s| s.live && s.contents.is_some()),
            _ => false,
        }
    }

    /// Current reference count of a class instance.
    pub fn refcount(&self, value: Value) -> Option<u32> {
        match value {
            Value::Object(object) | Value::ExistentialRef { object, .. } => {
                self.objects.get(object.0 as usize).map(|o| o.refcount)
            }
            _ => None,
        }
    }

    /// Number of class instances with a nonzero reference count.
    pub fn live_objects(&self) -> usize {
        self.objects.iter().filter(|o| o.refcount > 0).count()
    }

    /// Number of allocated memory slots.
    pub fn live_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.live).count()
    }

    /// `(existential type, dynamic type)` of every box created so far,
    /// including boxes created through [`alloc_boxed`](Self::alloc_boxed).
    pub fn boxing_log(&self) -> &[(Idx, Idx)] {
        &self.boxing_log
    }

    // === Calls ===

    /// Call the function named `name` with no generic substitutions.
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Outcome, InterpError> {
        let module = self.module;
        let func = module
            .lookup_function_by_str(name)
            .map(|id| module.function(id))
            .ok_or_else(|| InterpError::UnknownFunction(name.to_owned()))?;
        self.invoke(func, args, FxHashMap::default())
    }

    fn invoke(
        &mut self,
        func: &'m Function,
        args: Vec<Value>,
        types: FxHashMap<Idx, Idx>,
    ) -> Result<Outcome, InterpError> {
        let indirect: Vec<(usize, ParamConvention, Value)> = func
            .ty
            .params
            .iter()
            .zip(&args)
            .enumerate()
            .filter(|(_, (param, _))| param.convention.is_indirect())
            .map(|(index, (param, &arg))| (index, param.convention, arg))
            .collect();

        let outcome = self.run(func, args, types)?;

        for (index, convention, arg) in indirect {
            let initialized = self.is_initialized(arg);
            if convention.is_consumed() && initialized {
                return Err(InterpError::ArgumentNotConsumed {
                    function: self.func_name(func),
                    index,
                });
            }
            if !convention.is_consumed() && !initialized {
                return Err(InterpError::ArgumentConsumed {
                    function: self.func_name(func),
                    index,
                });
            }
        }
        Ok(outcome)
    }

    fn run(
        &mut self,
        func: &'m Function,
        args: Vec<Value>,
        types: FxHashMap<Idx, Idx>,
    ) -> Result<Outcome, InterpError> {
        if !func.is_definition() {
            return Err(InterpError::NoBody(self.func_name(func)));
        }
        if !func.has_ownership() {
            return Err(InterpError::OwnershipEliminated(self.func_name(func)));
        }
        let params = func.entry_args();
        if params.len() != args.len() {
            return Err(InterpError::Arity {
                function: self.func_name(func),
                expected: params.len(),
                found: args.len(),
            });
        }

        tracing::trace!(function = %self.module.names.resolve(func.name), "enter");
        let mut frame = Frame {
            env: params.iter().copied().zip(args).collect(),
            types,
            stack: Vec::new(),
        };

        let mut current = BlockId::ENTRY;
        loop {
            let block = func.block(current);
            for instr in &block.body {
                self.tick()?;
                tracing::trace!(block = current.raw(), ?instr, "exec");
                self.exec(func, &mut frame, instr)?;
            }
            self.tick()?;

            let (target, passed) = match &block.terminator {
                Terminator::Return { value } => {
                    self.check_stack_empty(func, &frame)?;
                    return Ok(Outcome::Returned(frame.get(*value)?));
                }
                Terminator::Throw { value } => {
                    self.check_stack_empty(func, &frame)?;
                    return Ok(Outcome::Threw(frame.get(*value)?));
                }
                Terminator::Unreachable => {
                    return Err(InterpError::ReachedUnreachable(self.func_name(func)));
                }
                Terminator::Br { target, args } => {
                    let passed = args
                        .iter()
                        .map(|&arg| frame.get(arg))
                        .collect::<Result<Vec<_>, _>>()?;
                    (*target, passed)
                }
                Terminator::CondBr {
                    cond,
                    then_block,
                    else_block,
                } => match frame.get(*cond)? {
                    Value::Bool(true) => (*then_block, Vec::new()),
                    Value::Bool(false) => (*else_block, Vec::new()),
                    _ => return Err(InterpError::TypeMismatch("bool condition")),
                },
                Terminator::TryApply {
                    callee,
                    subs,
                    args,
                    normal,
                    error,
                } => match self.call_direct(&frame, *callee, subs, args)? {
                    Outcome::Returned(value) => (*normal, vec![value]),
                    Outcome::Threw(value) => (*error, vec![value]),
                },
            };

            let target_block = func.block(target);
            for (&param, value) in target_block.args.iter().zip(passed) {
                frame.env.insert(param, value);
            }
            current = target;
        }
    }

    fn exec(
        &mut self,
        func: &'m Function,
        frame: &mut Frame,
        instr: &Instr,
    ) -> Result<(), InterpError> {
        match instr {
            Instr::AllocStack { dst, .. } => {
                let slot = self.new_slot(None);
                frame.stack.push(slot);
                frame.env.insert(*dst, Value::Address(slot));
            }
            Instr::DeallocStack { slot } => {
                let slot = expect_address(frame.get(*slot)?)?;
                if frame.stack.last() != Some(&slot) {
                    return Err(InterpError::StackOrder(slot));
                }
                let data = self.slot_mut(slot)?;
                if data.contents.is_some() {
                    return Err(InterpError::DeallocInitialized(slot));
                }
                data.live = false;
                frame.stack.pop();
            }
            Instr::InitExistentialAddr {
                dst,
                existential,
                concrete,
                ..
            } => {
                let slot = expect_address(frame.get(*existential)?)?;
                if self.slot_mut(slot)?.contents.is_some() {
                    return Err(InterpError::AlreadyInitialized(slot));
                }
                let concrete = frame.resolve(*concrete);
                let payload = self.new_slot(None);
                self.slot_mut(slot)?.contents = Some(Contents::Boxed { concrete, payload });
                self.boxing_log
                    .push((func.value_type(*existential), concrete));
                frame.env.insert(*dst, Value::Address(payload));
            }
            Instr::OpenExistentialAddr {
                dst,
                existential,
                opened,
                ..
            } => {
                let slot = expect_address(frame.get(*existential)?)?;
                match self.read(slot)? {
                    Contents::Boxed { concrete, payload } => {
                        frame.types.insert(*opened, concrete);
                        frame.env.insert(*dst, Value::Address(payload));
                    }
                    Contents::Value(_) => {
                        return Err(InterpError::TypeMismatch("opaque existential box"))
                    }
                }
            }
            Instr::InitExistentialRef {
                dst,
                ty,
                concrete,
                value,
                ..
            } => {
                let object = match frame.get(*value)? {
                    Value::Object(object) => object,
                    _ => return Err(InterpError::TypeMismatch("class reference")),
                };
                self.object_mut(object)?;
                let concrete = frame.resolve(*concrete);
                self.boxing_log.push((*ty, concrete));
                frame
                    .env
                    .insert(*dst, Value::ExistentialRef { concrete, object });
            }
            Instr::OpenExistentialRef { dst, value, opened } => match frame.get(*value)? {
                Value::ExistentialRef { concrete, object } => {
                    self.object_mut(object)?;
                    frame.types.insert(*opened, concrete);
                    frame.env.insert(*dst, Value::Object(object));
                }
                _ => return Err(InterpError::TypeMismatch("class existential")),
            },
            Instr::CopyAddr {
                src,
                dst,
                take,
                init,
            } => {
                let src = expect_address(frame.get(*src)?)?;
                let dst = expect_address(frame.get(*dst)?)?;
                let contents = self.read(src)?;
                let contents = if *take {
                    self.slot_mut(src)?.contents = None;
                    contents
                } else {
                    self.copy_contents(contents)?
                };
                self.write(dst, contents, *init)?;
            }
            Instr::Load {
                dst,
                addr,
                qualifier,
            } => {
                let slot = expect_address(frame.get(*addr)?)?;
                let value = match self.read(slot)? {
                    Contents::Value(value) => value,
                    Contents::Boxed { .. } => {
                        return Err(InterpError::TypeMismatch("loadable value"))
                    }
                };
                match qualifier {
                    LoadQualifier::Take => self.slot_mut(slot)?.contents = None,
                    LoadQualifier::Copy => self.retain(value)?,
                    LoadQualifier::Trivial | LoadQualifier::Unqualified => {}
                }
                frame.env.insert(*dst, value);
            }
            Instr::Store {
                value,
                addr,
                qualifier,
            } => {
                let slot = expect_address(frame.get(*addr)?)?;
                let value = frame.get(*value)?;
                let init = *qualifier != StoreQualifier::Assign;
                self.write(slot, Contents::Value(value), init)?;
            }
            Instr::CopyValue { dst, value } => {
                let value = frame.get(*value)?;
                self.retain(value)?;
                frame.env.insert(*dst, value);
            }
            Instr::DestroyValue { value } => {
                let value = frame.get(*value)?;
                self.release(value)?;
            }
            Instr::DestroyAddr { addr } => {
                let slot = expect_address(frame.get(*addr)?)?;
                let contents = self.read(slot)?;
                self.slot_mut(slot)?.contents = None;
                self.destroy_contents(contents)?;
            }
            Instr::Literal { dst, value } => {
                let literal = match func.value_type(*dst) {
                    Idx::BOOL => Value::Bool(*value != 0),
                    Idx::UNIT => Value::Unit,
                    _ => Value::Int(*value),
                };
                frame.env.insert(*dst, literal);
            }
            Instr::Builtin { dst, op, args } => {
                let args = args
                    .iter()
                    .map(|&arg| frame.get(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                let result = self.builtin(*op, &args)?;
                frame.env.insert(*dst, result);
            }
            Instr::Apply {
                dst,
                callee,
                subs,
                args,
            } => match self.call_direct(frame, *callee, subs, args)? {
                Outcome::Returned(value) => {
                    frame.env.insert(*dst, value);
                }
                Outcome::Threw(_) => {
                    return Err(InterpError::UnhandledThrow(
                        self.module.names.resolve(*callee).to_owned(),
                    ))
                }
            },
        }
        Ok(())
    }

    fn call_direct(
        &mut self,
        frame: &Frame,
        callee: Name,
        subs: &SubstitutionMap,
        args: &[ValueId],
    ) -> Result<Outcome, InterpError> {
        let module = self.module;
        let callee_name = module.names.resolve(callee);
        let func = module
            .lookup_function(callee)
            .map(|id| module.function(id))
            .ok_or_else(|| InterpError::UnknownFunction(callee_name.to_owned()))?;
        let args = args
            .iter()
            .map(|&arg| frame.get(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let types = subs
            .iter()
            .map(|(param, replacement)| (param, frame.resolve(replacement)))
            .collect();
        self.invoke(func, args, types)
    }

    fn builtin(&self, op: BuiltinOp, args: &[Value]) -> Result<Value, InterpError> {
        match (op, args) {
            (BuiltinOp::Add, [Value::Int(a), Value::Int(b)]) => Ok(Value::Int(a.wrapping_add(*b))),
            (BuiltinOp::IsZero, [Value::Int(a)]) => Ok(Value::Bool(*a == 0)),
            (BuiltinOp::Payload, [value]) => self.payload_of(*value).map(Value::Int),
            _ => Err(InterpError::TypeMismatch("builtin operands")),
        }
    }

    /// Integer payload of a value, looking through references, addresses
    /// and existential boxes without consuming anything.
    pub fn payload_of(&self, value: Value) -> Result<i64, InterpError> {
        match value {
            Value::Int(n) => Ok(n),
            Value::Object(object) | Value::ExistentialRef { object, .. } => {
                let data = self
                    .objects
                    .get(object.0 as usize)
                    .filter(|o| o.refcount > 0)
                    .ok_or(InterpError::UseAfterRelease(object))?;
                Ok(data.payload)
            }
            Value::Address(slot) => match self.slot(slot)?.contents {
                Some(Contents::Value(inner)) => self.payload_of(inner),
                Some(Contents::Boxed { payload, .. }) => self.payload_of(Value::Address(payload)),
                None => Err(InterpError::Uninitialized(slot)),
            },
            Value::Bool(_) | Value::Unit => Err(InterpError::TypeMismatch("payload carrier")),
        }
    }

    // === Ownership helpers ===

    fn retain(&mut self, value: Value) -> Result<(), InterpError> {
        if let Value::Object(object) | Value::ExistentialRef { object, .. } = value {
            self.object_mut(object)?.refcount += 1;
        }
        Ok(())
    }

    fn copy_contents(&mut self, contents: Contents) -> Result<Contents, InterpError> {
        match contents {
            Contents::Value(value) => {
                self.retain(value)?;
                Ok(Contents::Value(value))
            }
            Contents::Boxed { concrete, payload } => {
                let inner = self.read(payload)?;
                let copied = self.copy_contents(inner)?;
                let payload = self.new_slot(Some(copied));
                Ok(Contents::Boxed { concrete, payload })
            }
        }
    }

    fn destroy_contents(&mut self, contents: Contents) -> Result<(), InterpError> {
        match contents {
            Contents::Value(value) => self.release(value),
            Contents::Boxed { payload, .. } => {
                if let Some(inner) = self.slot_mut(payload)?.contents.take() {
                    self.destroy_contents(inner)?;
                }
                self.slot_mut(payload)?.live = false;
                Ok(())
            }
        }
    }

    // === Memory helpers ===

    fn new_object(&mut self, payload: i64) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(ObjectData {
            payload,
            refcount: 1,
        });
        id
    }

    fn new_slot(&mut self, contents: Option<Contents>) -> SlotId {
        let id = SlotId(self.slots.len() as u32);
        self.slots.push(SlotData {
            live: true,
            contents,
        });
        id
    }

    fn slot(&self, slot: SlotId) -> Result<&SlotData, InterpError> {
        self.slots
            .get(slot.0 as usize)
            .filter(|s| s.live)
            .ok_or(InterpError::DeadSlot(slot))
    }

    fn slot_mut(&mut self, slot: SlotId) -> Result<&mut SlotData, InterpError> {
        self.slots
            .get_mut(slot.0 as usize)
            .filter(|s| s.live)
            .ok_or(InterpError::DeadSlot(slot))
    }

    fn read(&self, slot: SlotId) -> Result<Contents, InterpError> {
        self.slot(slot)?
            .contents
            .ok_or(InterpError::Uninitialized(slot))
    }

    /// Store `contents` into `slot`, destroying the old contents unless
    /// this is an initialization.
    fn write(&mut self, slot: SlotId, contents: Contents, init: bool) -> Result<(), InterpError> {
        let old = self.slot_mut(slot)?.contents.take();
        match (old, init) {
            (Some(_), true) => return Err(InterpError::AlreadyInitialized(slot)),
            (None, false) => return Err(InterpError::Uninitialized(slot)),
            (Some(old), false) => self.destroy_contents(old)?,
            (None, true) => {}
        }
        self.slot_mut(slot)?.contents = Some(contents);
        Ok(())
    }

    fn object_mut(&mut self, object: ObjectId) -> Result<&mut ObjectData, InterpError> {
        self.objects
            .get_mut(object.0 as usize)
            .filter(|o| o.refcount > 0)
            .ok_or(InterpError::UseAfterRelease(object))
    }

    // === Misc ===

    fn tick(&mut self) -> Result<(), InterpError> {
        self.steps += 1;
        if self.steps > self.step_limit {
            return Err(InterpError::StepLimit);
        }
        Ok(())
    }

    fn check_stack_empty(&self, func: &Function, frame: &Frame) -> Result<(), InterpError> {
        if frame.stack.is_empty() {
            Ok(())
        } else {
            Err(InterpError::StackLeak {
                function: self.func_name(func),
                live: frame.stack.len(),
            })
        }
    }

    fn func_name(&self, func: &Function) -> String {
        self.module.names.resolve(func.name).to_owned()
    }
}

fn expect_address(value: Value) -> Result<SlotId, InterpError> {
    match value {
        Value::Address(slot) => Ok(slot),
        _ => Err(InterpError::TypeMismatch("address")),
    }
}

#[cfg(test)]
mod tests;
