pub mod code;
pub mod compile;
pub mod compile_error;
pub mod image;
pub mod op;
pub mod symbols;

pub use compile::{Bytecode, Compiler};
pub use op::Opcode;
