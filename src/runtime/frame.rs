use crate::lang::object::Closure;

/// One activation record: the closure being executed, the next byte to
/// fetch, and where its locals start on the operand stack.
#[derive(Debug)]
pub struct Frame {
    pub closure: Closure,
    pub ip: usize,
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(closure: Closure, base_pointer: usize) -> Self {
        Frame {
            closure,
            ip: 0,
            base_pointer,
        }
    }

    pub fn instructions(&self) -> &[u8] {
        self.closure.function.instructions.as_bytes()
    }
}
