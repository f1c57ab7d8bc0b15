use crate::bytecode::code::Instructions;
use crate::lang::ast::BlockStatement;
use crate::lang::env::Env;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;

// =============================================================================
// OBJECT - Runtime values
// =============================================================================

/// Runtime value in the Rill language.
///
/// Both execution backends (the tree-walking evaluator and the bytecode VM)
/// operate on this one closed type. `Display` is the user-facing inspect
/// form printed by the REPL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Object {
    /// 64-bit signed integer.
    Integer(i64),

    /// Boolean value.
    Boolean(bool),

    /// UTF-8 string value.
    Str(String),

    /// Array literal value: `[1, 2, 3]`.
    Array(Vec<Object>),

    /// Hash map value: `{"a": 1}`. Keys are restricted to the hashable
    /// primitives, see [`HashKey`].
    Hash(HashMap<HashKey, Object>),

    /// The null value, produced by `if` with no taken branch and by
    /// out-of-range index lookups.
    Null,

    /// Wrapper the evaluator uses to unwind a `return` out of nested blocks.
    /// Never observable from Rill code.
    ReturnValue(Box<Object>),

    /// Evaluator-side error value; halts evaluation when produced.
    Error(String),

    /// Evaluator-side function: unparsed body plus the environment it
    /// closed over.
    Function(Function),

    /// Compiler output: a function lowered to instructions. Shared, since
    /// every closure over the same literal references the same code.
    CompiledFunction(Rc<CompiledFunction>),

    /// A compiled function bundled with its captured free variables.
    Closure(Closure),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub parameters: Vec<String>,
    pub body: BlockStatement,
    pub env: Env,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Closure {
    pub function: Rc<CompiledFunction>,
    /// Free variables captured by value at closure-creation time.
    pub free: Vec<Object>,
}

/// Subset of values usable as hash keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashKey {
    Integer(i64),
    Boolean(bool),
    Str(String),
}

impl Object {
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Integer(_) => "INTEGER",
            Object::Boolean(_) => "BOOLEAN",
            Object::Str(_) => "STRING",
            Object::Array(_) => "ARRAY",
            Object::Hash(_) => "HASH",
            Object::Null => "NULL",
            Object::ReturnValue(_) => "RETURN_VALUE",
            Object::Error(_) => "ERROR",
            Object::Function(_) => "FUNCTION",
            Object::CompiledFunction(_) => "COMPILED_FUNCTION",
            Object::Closure(_) => "CLOSURE",
        }
    }

    /// Truthiness: `null` and `false` are falsy, everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Object::Boolean(b) => *b,
            Object::Null => false,
            _ => true,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Object::Error(_))
    }

    /// Returns the hash-key form of this value, or `None` for unhashable types.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Object::Integer(n) => Some(HashKey::Integer(*n)),
            Object::Boolean(b) => Some(HashKey::Boolean(*b)),
            Object::Str(s) => Some(HashKey::Str(s.clone())),
            _ => None,
        }
    }
}

impl std::fmt::Display for HashKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashKey::Integer(n) => write!(f, "{}", n),
            HashKey::Boolean(b) => write!(f, "{}", b),
            HashKey::Str(s) => write!(f, "{}", s),
        }
    }
}

impl std::fmt::Display for Object {
    /// Format a value using the inspect contract.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Object::Integer(n) => write!(f, "{}", n),
            Object::Boolean(b) => write!(f, "{}", b),
            Object::Str(s) => write!(f, "{}", s),
            Object::Array(elements) => {
                let inner: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", inner.join(", "))
            }
            Object::Hash(pairs) => {
                // Sorted by key text so the inspect form is stable.
                let mut inner: Vec<String> =
                    pairs.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                inner.sort();
                write!(f, "{{{}}}", inner.join(", "))
            }
            Object::Null => write!(f, "null"),
            Object::ReturnValue(value) => write!(f, "{}", value),
            Object::Error(message) => write!(f, "ERROR: {}", message),
            Object::Function(function) => {
                write!(f, "fn({}) {{...}}", function.parameters.join(", "))
            }
            Object::CompiledFunction(function) => {
                write!(f, "fn<compiled, {} bytes>", function.instructions.len())
            }
            Object::Closure(closure) => {
                write!(f, "closure<{} bytes>", closure.function.instructions.len())
            }
        }
    }
}
