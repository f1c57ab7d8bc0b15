use std::io::{self, BufRead, Write};
use std::mem;

use crate::bytecode::{Compiler, symbols::SymbolTable};
use crate::frontend::{lexer::Lexer, parser::Parser};
use crate::lang::{env::Environment, object::Object};
use crate::runtime::{eval, vm::Vm};

// =============================================================================
// REPL - Interactive session
// =============================================================================

const PROMPT: &str = ">> ";

/// Which execution engine the session runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// Tree-walking evaluator.
    Eval,
    /// Compile each line and run it on the virtual machine.
    Bytecode,
}

pub fn start(engine: Engine) -> io::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    // Session state carried across lines: the environment for the
    // evaluator; bindings, constants and globals for the VM.
    let env = Environment::new();
    let mut symbols = SymbolTable::new();
    let mut constants: Vec<Object> = Vec::new();
    let mut globals: Vec<Object> = Vec::new();

    loop {
        write!(stdout, "{PROMPT}")?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            writeln!(stdout)?;
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let tokens = Lexer::new(&line).tokenize();
        let mut parser = Parser::new(tokens);
        let program = parser.parse_program();
        if !parser.errors().is_empty() {
            for error in parser.errors() {
                writeln!(stdout, "parse error: {error}")?;
            }
            continue;
        }

        match engine {
            Engine::Eval => {
                let result = eval::eval_program(&program, &env);
                if result != Object::Null {
                    writeln!(stdout, "{result}")?;
                }
            }
            Engine::Bytecode => {
                let mut compiler =
                    Compiler::with_state(mem::take(&mut symbols), mem::take(&mut constants));
                match compiler.compile_program(&program) {
                    Ok(bytecode) => {
                        let mut vm = Vm::with_globals(bytecode, mem::take(&mut globals));
                        match vm.run() {
                            Ok(()) => {
                                let result = vm.last_popped();
                                if *result != Object::Null {
                                    writeln!(stdout, "{result}")?;
                                }
                            }
                            Err(error) => writeln!(stdout, "{error}")?,
                        }
                        globals = vm.into_globals();
                    }
                    Err(error) => writeln!(stdout, "{error}")?,
                }
                let (next_symbols, next_constants) = compiler.into_state();
                symbols = next_symbols;
                constants = next_constants;
            }
        }
    }
    Ok(())
}
