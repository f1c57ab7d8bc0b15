use std::collections::HashMap;
use std::rc::Rc;

use crate::{
    bytecode::{compile::Bytecode, op::Opcode},
    lang::object::{Closure, CompiledFunction, Object},
    runtime::{
        frame::Frame,
        runtime_error::{
            self, RuntimeError, division_by_zero, frame_overflow, index_not_supported,
            not_callable, stack_overflow, stack_underflow, type_mismatch, unknown_operator,
            unsupported_negation, unusable_hash_key, wrong_arity,
        },
    },
};

// =============================================================================
// VM - Bytecode interpreter
// =============================================================================

/// Operand stack slots.
pub const STACK_SIZE: usize = 2048;
/// Global binding slots, the most a 2-byte operand can address.
pub const GLOBALS_SIZE: usize = u16::MAX as usize + 1;
/// Maximum call depth.
pub const MAX_FRAMES: usize = 1024;

pub struct Vm {
    constants: Vec<Object>,
    /// Operand stack; its length is the stack pointer.
    stack: Vec<Object>,
    /// Global slots, grown on first write. Indices are bounded by the
    /// 2-byte operand, so this never exceeds GLOBALS_SIZE.
    globals: Vec<Object>,
    frames: Vec<Frame>,
    /// Value most recently discarded by a Pop instruction. A program's
    /// result is the value its final expression statement popped.
    last_popped: Object,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Vm::with_globals(bytecode, Vec::new())
    }

    /// Resume with an earlier session's global slots. The REPL uses this
    /// to carry bindings across lines.
    pub fn with_globals(bytecode: Bytecode, globals: Vec<Object>) -> Self {
        let main = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let closure = Closure {
            function: main,
            free: Vec::new(),
        };
        Vm {
            constants: bytecode.constants,
            stack: Vec::with_capacity(STACK_SIZE),
            globals,
            frames: vec![Frame::new(closure, 0)],
            last_popped: Object::Null,
        }
    }

    pub fn into_globals(self) -> Vec<Object> {
        self.globals
    }

    pub fn last_popped(&self) -> &Object {
        &self.last_popped
    }

    pub fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            let frame = self.current_frame_mut();
            let ip = frame.ip;
            if ip >= frame.instructions().len() {
                // Function bodies always end in a return; only the main
                // frame runs off the end of its instructions.
                break;
            }
            let byte = frame.instructions()[ip];
            frame.ip = ip + 1;
            let op = Opcode::try_from(byte).map_err(runtime_error::unknown_opcode)?;

            match op {
                Opcode::Constant => {
                    let index = self.read_u16_operand()?;
                    let constant = self.constant(index)?;
                    self.push(constant)?;
                }
                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                    self.execute_binary(op)?;
                }
                Opcode::Pop => {
                    self.last_popped = self.pop()?;
                }
                Opcode::True => self.push(Object::Boolean(true))?,
                Opcode::False => self.push(Object::Boolean(false))?,
                Opcode::Null => self.push(Object::Null)?,
                Opcode::Equal | Opcode::NotEqual | Opcode::GreaterThan => {
                    self.execute_comparison(op)?;
                }
                Opcode::Minus => {
                    let operand = self.pop()?;
                    match operand {
                        Object::Integer(value) => {
                            self.push(Object::Integer(value.wrapping_neg()))?;
                        }
                        other => return Err(unsupported_negation(other.type_name())),
                    }
                }
                Opcode::Bang => {
                    let operand = self.pop()?;
                    self.push(Object::Boolean(!operand.is_truthy()))?;
                }
                Opcode::Jump => {
                    let target = self.read_u16_operand()?;
                    self.current_frame_mut().ip = target;
                }
                Opcode::JumpNotTruthy => {
                    let target = self.read_u16_operand()?;
                    let condition = self.pop()?;
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target;
                    }
                }
                Opcode::SetGlobal => {
                    let index = self.read_u16_operand()?;
                    let value = self.pop()?;
                    if index >= self.globals.len() {
                        self.globals.resize(index + 1, Object::Null);
                    }
                    self.globals[index] = value;
                }
                Opcode::GetGlobal => {
                    let index = self.read_u16_operand()?;
                    let value = self.globals.get(index).cloned().unwrap_or(Object::Null);
                    self.push(value)?;
                }
                Opcode::SetLocal => {
                    let index = self.read_u8_operand()?;
                    let slot = self.current_frame_mut().base_pointer + index;
                    let value = self.pop()?;
                    *self.stack.get_mut(slot).ok_or_else(stack_underflow)? = value;
                }
                Opcode::GetLocal => {
                    let index = self.read_u8_operand()?;
                    let slot = self.current_frame_mut().base_pointer + index;
                    let value = self.stack.get(slot).cloned().ok_or_else(stack_underflow)?;
                    self.push(value)?;
                }
                Opcode::GetFree => {
                    let index = self.read_u8_operand()?;
                    let frame = self.current_frame_mut();
                    let value = frame
                        .closure
                        .free
                        .get(index)
                        .cloned()
                        .ok_or_else(|| RuntimeError::new("missing captured variable"))?;
                    self.push(value)?;
                }
                Opcode::Array => {
                    let count = self.read_u16_operand()?;
                    let elements = self.take_from_stack(count)?;
                    self.push(Object::Array(elements))?;
                }
                Opcode::Hash => {
                    let count = self.read_u16_operand()?;
                    let elements = self.take_from_stack(count)?;
                    let hash = build_hash(elements)?;
                    self.push(hash)?;
                }
                Opcode::Index => {
                    let index = self.pop()?;
                    let left = self.pop()?;
                    let value = execute_index(left, index)?;
                    self.push(value)?;
                }
                Opcode::Call => {
                    let argc = self.read_u8_operand()?;
                    let callee_slot = self
                        .stack
                        .len()
                        .checked_sub(1 + argc)
                        .ok_or_else(stack_underflow)?;
                    match self.stack[callee_slot].clone() {
                        Object::Closure(closure) => self.call_closure(closure, argc)?,
                        other => return Err(not_callable(other.type_name())),
                    }
                }
                Opcode::ReturnValue => {
                    let value = self.pop()?;
                    let frame = self.pop_frame()?;
                    // Drop the frame's locals and the callee slot below them.
                    self.stack.truncate(frame.base_pointer - 1);
                    self.push(value)?;
                }
                Opcode::Return => {
                    let frame = self.pop_frame()?;
                    self.stack.truncate(frame.base_pointer - 1);
                    self.push(Object::Null)?;
                }
                Opcode::Closure => {
                    let index = self.read_u16_operand()?;
                    let free_count = self.read_u8_operand()?;
                    let function = match self.constant(index)? {
                        Object::CompiledFunction(function) => function,
                        other => return Err(not_callable(other.type_name())),
                    };
                    let free = self.take_from_stack(free_count)?;
                    self.push(Object::Closure(Closure { function, free }))?;
                }
            }
        }
        Ok(())
    }

    // ==========================================================================
    // Stack and frame plumbing
    // ==========================================================================

    fn current_frame_mut(&mut self) -> &mut Frame {
        // run() keeps at least the main frame alive.
        let index = self.frames.len() - 1;
        &mut self.frames[index]
    }

    // Operand reads are bounds-checked: a hand-built or corrupt image can
    // end mid-instruction, and that must surface as an error, not a panic.
    fn read_u16_operand(&mut self) -> Result<usize, RuntimeError> {
        let frame = self.current_frame_mut();
        let ip = frame.ip;
        let bytes = frame
            .instructions()
            .get(ip..ip + 2)
            .ok_or_else(runtime_error::truncated_instructions)?;
        let value = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
        frame.ip = ip + 2;
        Ok(value)
    }

    fn read_u8_operand(&mut self) -> Result<usize, RuntimeError> {
        let frame = self.current_frame_mut();
        let ip = frame.ip;
        let value = *frame
            .instructions()
            .get(ip)
            .ok_or_else(runtime_error::truncated_instructions)? as usize;
        frame.ip = ip + 1;
        Ok(value)
    }

    fn push(&mut self, object: Object) -> Result<(), RuntimeError> {
        if self.stack.len() >= STACK_SIZE {
            return Err(stack_overflow());
        }
        self.stack.push(object);
        Ok(())
    }

    fn pop(&mut self) -> Result<Object, RuntimeError> {
        self.stack.pop().ok_or_else(stack_underflow)
    }

    /// Remove the top `count` values, preserving their stack order.
    fn take_from_stack(&mut self, count: usize) -> Result<Vec<Object>, RuntimeError> {
        let start = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or_else(stack_underflow)?;
        Ok(self.stack.split_off(start))
    }

    fn constant(&self, index: usize) -> Result<Object, RuntimeError> {
        self.constants
            .get(index)
            .cloned()
            .ok_or_else(|| RuntimeError::new(format!("constant index {index} out of range")))
    }

    fn call_closure(&mut self, closure: Closure, argc: usize) -> Result<(), RuntimeError> {
        let want = closure.function.num_parameters;
        if argc != want {
            return Err(wrong_arity(want, argc));
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(frame_overflow());
        }
        // Arguments already sit on the stack and double as the first
        // locals; reserve slots for the rest.
        let base_pointer = self.stack.len() - argc;
        let top = base_pointer + closure.function.num_locals;
        if top > STACK_SIZE {
            return Err(stack_overflow());
        }
        self.stack.resize(top, Object::Null);
        self.frames.push(Frame::new(closure, base_pointer));
        Ok(())
    }

    fn pop_frame(&mut self) -> Result<Frame, RuntimeError> {
        if self.frames.len() <= 1 {
            return Err(RuntimeError::new("return outside of a function"));
        }
        // Just checked there is more than one frame.
        self.frames.pop().ok_or_else(stack_underflow)
    }

    // ==========================================================================
    // Operators
    // ==========================================================================

    fn execute_binary(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;
        match (&left, &right) {
            (Object::Integer(l), Object::Integer(r)) => {
                let result = match op {
                    Opcode::Add => l.wrapping_add(*r),
                    Opcode::Sub => l.wrapping_sub(*r),
                    Opcode::Mul => l.wrapping_mul(*r),
                    Opcode::Div => {
                        if *r == 0 {
                            return Err(division_by_zero());
                        }
                        l.wrapping_div(*r)
                    }
                    _ => return Err(runtime_error::unknown_opcode(op as u8)),
                };
                self.push(Object::Integer(result))
            }
            (Object::Str(l), Object::Str(r)) if op == Opcode::Add => {
                self.push(Object::Str(format!("{l}{r}")))
            }
            _ if left.type_name() == right.type_name() => Err(unknown_operator(
                op_symbol(op),
                left.type_name(),
                right.type_name(),
            )),
            _ => Err(type_mismatch(
                op_symbol(op),
                left.type_name(),
                right.type_name(),
            )),
        }
    }

    fn execute_comparison(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;
        let result = match op {
            Opcode::Equal => left == right,
            Opcode::NotEqual => left != right,
            Opcode::GreaterThan => match (&left, &right) {
                (Object::Integer(l), Object::Integer(r)) => l > r,
                _ => {
                    return Err(unknown_operator(
                        ">",
                        left.type_name(),
                        right.type_name(),
                    ));
                }
            },
            _ => return Err(runtime_error::unknown_opcode(op as u8)),
        };
        self.push(Object::Boolean(result))
    }
}

fn op_symbol(op: Opcode) -> &'static str {
    match op {
        Opcode::Add => "+",
        Opcode::Sub => "-",
        Opcode::Mul => "*",
        Opcode::Div => "/",
        Opcode::GreaterThan => ">",
        _ => "?",
    }
}

fn build_hash(elements: Vec<Object>) -> Result<Object, RuntimeError> {
    let mut pairs = HashMap::with_capacity(elements.len() / 2);
    let mut elements = elements.into_iter();
    while let (Some(key), Some(value)) = (elements.next(), elements.next()) {
        let hash_key = key
            .hash_key()
            .ok_or_else(|| unusable_hash_key(key.type_name()))?;
        pairs.insert(hash_key, value);
    }
    Ok(Object::Hash(pairs))
}

fn execute_index(left: Object, index: Object) -> Result<Object, RuntimeError> {
    match (left, index) {
        (Object::Array(elements), Object::Integer(i)) => {
            // Out-of-range reads yield null, not an error.
            if i < 0 {
                return Ok(Object::Null);
            }
            Ok(elements.get(i as usize).cloned().unwrap_or(Object::Null))
        }
        (Object::Hash(pairs), key) => {
            let hash_key = key
                .hash_key()
                .ok_or_else(|| unusable_hash_key(key.type_name()))?;
            Ok(pairs.get(&hash_key).cloned().unwrap_or(Object::Null))
        }
        (left, _) => Err(index_not_supported(left.type_name())),
    }
}
