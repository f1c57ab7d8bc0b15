#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub message: String,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error: {}", self.message)
    }
}

impl std::error::Error for RuntimeError {}

impl RuntimeError {
    pub fn new(msg: impl Into<String>) -> Self {
        RuntimeError {
            message: msg.into(),
        }
    }
}

// Constructors for the errors the machine can raise.

pub fn stack_overflow() -> RuntimeError {
    RuntimeError::new("stack overflow")
}

pub fn stack_underflow() -> RuntimeError {
    RuntimeError::new("stack underflow")
}

pub fn frame_overflow() -> RuntimeError {
    RuntimeError::new("call stack exceeded maximum depth")
}

pub fn division_by_zero() -> RuntimeError {
    RuntimeError::new("division by zero")
}

pub fn unknown_opcode(byte: u8) -> RuntimeError {
    RuntimeError::new(format!("unknown opcode {byte}"))
}

pub fn truncated_instructions() -> RuntimeError {
    RuntimeError::new("truncated instruction stream")
}

pub fn type_mismatch(operator: &str, left: &str, right: &str) -> RuntimeError {
    RuntimeError::new(format!("type mismatch: {left} {operator} {right}"))
}

pub fn unknown_operator(operator: &str, left: &str, right: &str) -> RuntimeError {
    RuntimeError::new(format!("unknown operator: {left} {operator} {right}"))
}

pub fn unsupported_negation(type_name: &str) -> RuntimeError {
    RuntimeError::new(format!("unsupported type for negation: {type_name}"))
}

pub fn not_callable(type_name: &str) -> RuntimeError {
    RuntimeError::new(format!("calling non-function: {type_name}"))
}

pub fn wrong_arity(want: usize, got: usize) -> RuntimeError {
    RuntimeError::new(format!("wrong number of arguments: want={want}, got={got}"))
}

pub fn unusable_hash_key(type_name: &str) -> RuntimeError {
    RuntimeError::new(format!("unusable as hash key: {type_name}"))
}

pub fn index_not_supported(type_name: &str) -> RuntimeError {
    RuntimeError::new(format!("index operator not supported: {type_name}"))
}
