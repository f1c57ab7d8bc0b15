#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// A name referenced before any binding defined it
    UndefinedVariable { name: String },
    /// `return` outside of a function body
    ReturnOutsideFunction,
    /// The constant pool index no longer fits its 2-byte operand
    TooManyConstants { count: usize },
    /// The global slot index no longer fits its 2-byte operand
    TooManyGlobals { count: usize },
    /// The local slot index no longer fits its 1-byte operand
    TooManyLocals { name: String, count: usize },
    /// The capture-list index no longer fits its 1-byte operand
    TooManyFreeVariables { count: usize },
    /// A call site with more arguments than the 1-byte operand can carry
    TooManyArguments { count: usize },
    /// Internal compiler error (shouldn't happen in normal use)
    Internal(String),
}

impl CompileError {
    pub fn undefined_variable(name: &str) -> Self {
        CompileError::UndefinedVariable {
            name: name.to_string(),
        }
    }

    pub fn too_many_locals(name: &str, count: usize) -> Self {
        CompileError::TooManyLocals {
            name: name.to_string(),
            count,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::UndefinedVariable { name } => {
                write!(f, "compile error: undefined variable '{}'", name)
            }
            CompileError::ReturnOutsideFunction => {
                write!(f, "compile error: 'return' outside of a function")
            }
            CompileError::TooManyConstants { count } => {
                write!(f, "compile error: constant pool overflow ({} constants)", count)
            }
            CompileError::TooManyGlobals { count } => {
                write!(f, "compile error: too many global bindings ({})", count)
            }
            CompileError::TooManyLocals { name, count } => {
                write!(
                    f,
                    "compile error: too many local bindings in function (defining '{}' as number {})",
                    name, count
                )
            }
            CompileError::TooManyFreeVariables { count } => {
                write!(f, "compile error: too many captured variables ({})", count)
            }
            CompileError::TooManyArguments { count } => {
                write!(f, "compile error: too many call arguments ({})", count)
            }
            CompileError::Internal(msg) => {
                write!(f, "compile error: internal error: {}", msg)
            }
        }
    }
}

impl std::error::Error for CompileError {}
