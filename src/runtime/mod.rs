pub mod eval;
pub mod frame;
pub mod runtime_error;
pub mod vm;
