//! # Rill language core
//!
//! The AST produced by the parser and the runtime value model shared by
//! both execution engines: the tree-walking evaluator and the bytecode
//! virtual machine.

pub mod ast;
pub mod env;
pub mod object;
