mod bytecode;
mod frontend;
mod lang;
mod repl;
mod runtime;

use std::{env, fs, path::Path, process};

use crate::bytecode::compile::{Bytecode, Compiler};
use crate::bytecode::image;
use crate::frontend::lexer::Lexer;
use crate::frontend::parser::Parser;
use crate::lang::ast::Program;
use crate::lang::env::Environment;
use crate::lang::object::Object;
use crate::repl::Engine;
use crate::runtime::eval;
use crate::runtime::vm::Vm;

fn main() {
    let args: Vec<String> = env::args().collect();

    let tokens_only = args.contains(&"--tokens".to_string());
    let ast_only = args.contains(&"--ast".to_string());
    let disasm = args.contains(&"--disasm".to_string());
    let bytecode_engine =
        args.contains(&"--bc".to_string()) || args.contains(&"--bytecode".to_string());
    let repl_mode = args.contains(&"--repl".to_string()) || args.contains(&"-i".to_string());

    if args.contains(&"--help".to_string()) || args.contains(&"-h".to_string()) {
        print_usage();
        return;
    }

    // first non-flag argument is the filename; --emit-bc consumes the next
    // argument as its output path
    let mut filename = None;
    let mut emit_path = None;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--emit-bc" {
            match iter.next() {
                Some(path) => emit_path = Some(path.clone()),
                None => {
                    eprintln!("--emit-bc requires an output path");
                    process::exit(1);
                }
            }
        } else if !arg.starts_with('-') && filename.is_none() {
            filename = Some(arg.clone());
        }
    }

    let engine = if bytecode_engine {
        Engine::Bytecode
    } else {
        Engine::Eval
    };

    match filename {
        Some(filename) if !repl_mode => {
            if Path::new(&filename).extension().and_then(|e| e.to_str()) == Some("rlbc") {
                run_image(&filename);
                return;
            }
            ensure_extension(&filename);
            let source = match fs::read_to_string(&filename) {
                Ok(source) => source,
                Err(e) => {
                    eprintln!("Failed to read '{}': {}", filename, e);
                    process::exit(1);
                }
            };
            if tokens_only {
                dump_tokens(&source);
                return;
            }
            let program = parse_or_exit(&source);
            if ast_only {
                println!("{:#?}", program);
                return;
            }
            if disasm || emit_path.is_some() || engine == Engine::Bytecode {
                run_program_bc(&program, disasm, emit_path.as_deref());
            } else {
                run_program_eval(&program);
            }
        }
        _ => {
            if let Err(e) = repl::start(engine) {
                eprintln!("REPL error: {}", e);
                process::exit(1);
            }
        }
    }
}

fn print_usage() {
    println!("RILL - Bytecode-compiled scripting language");
    println!();
    println!("Usage:");
    println!("  rill                        Start interactive REPL (tree-walking engine)");
    println!("  rill --bc                   Start interactive REPL on the bytecode VM");
    println!("  rill <file.rl>              Run a program (tree-walking engine)");
    println!("  rill --bc <file.rl>         Compile and run on the bytecode VM");
    println!("  rill --disasm <file.rl>     Show compiled bytecode, then run it");
    println!("  rill --emit-bc <out> <file.rl>  Compile to a .rlbc image");
    println!("  rill <file.rlbc>            Run a compiled image");
    println!("  rill --tokens <file.rl>     Show tokens only");
    println!("  rill --ast <file.rl>        Show the parsed AST");
    println!("  rill --help, -h             Show this help");
}

fn ensure_extension(filename: &str) {
    let path = Path::new(filename);
    if path.extension().and_then(|e| e.to_str()) != Some("rl") {
        eprintln!("Error: expected a .rl file, got {}", filename);
        process::exit(1);
    }
}

fn parse_or_exit(source: &str) -> Program {
    let tokens = Lexer::new(source).tokenize();
    let mut parser = Parser::new(tokens);
    let program = parser.parse_program();
    if !parser.errors().is_empty() {
        for error in parser.errors() {
            eprintln!("Parse error: {}", error);
        }
        process::exit(1);
    }
    program
}

fn dump_tokens(source: &str) {
    for spanned in Lexer::new(source).tokenize() {
        println!(
            "{}:{}\t{:?}",
            spanned.span.line, spanned.span.col, spanned.token
        );
    }
}

fn run_program_eval(program: &Program) {
    let env = Environment::new();
    match eval::eval_program(program, &env) {
        Object::Error(message) => {
            eprintln!("Runtime error: {}", message);
            process::exit(1);
        }
        Object::Null => {}
        result => println!("{}", result),
    }
}

fn run_program_bc(program: &Program, disasm: bool, emit_path: Option<&str>) {
    let bytecode = match Compiler::new().compile_program(program) {
        Ok(bytecode) => bytecode,
        Err(e) => {
            eprintln!("Compile error: {}", e);
            process::exit(1);
        }
    };

    if disasm {
        print_disassembly(&bytecode);
    }

    if let Some(path) = emit_path {
        if let Err(e) = image::save(&bytecode, Path::new(path)) {
            eprintln!("Failed to write '{}': {}", path, e);
            process::exit(1);
        }
        return;
    }

    run_bytecode(bytecode);
}

fn run_image(filename: &str) {
    match image::load(Path::new(filename)) {
        Ok(bytecode) => run_bytecode(bytecode),
        Err(e) => {
            eprintln!("Failed to load '{}': {}", filename, e);
            process::exit(1);
        }
    }
}

fn run_bytecode(bytecode: Bytecode) {
    let mut vm = Vm::new(bytecode);
    if let Err(e) = vm.run() {
        eprintln!("{}", e);
        process::exit(1);
    }
    match vm.last_popped() {
        Object::Null => {}
        result => println!("{}", result),
    }
}

fn print_disassembly(bytecode: &Bytecode) {
    println!("=== BYTECODE ===");
    print!("{}", bytecode.instructions);
    for (index, constant) in bytecode.constants.iter().enumerate() {
        match constant {
            Object::CompiledFunction(function) => {
                println!(
                    "--- constant {} fn ({} params, {} locals) ---",
                    index, function.num_parameters, function.num_locals
                );
                print!("{}", function.instructions);
            }
            other => println!("--- constant {}: {} ---", index, other),
        }
    }
    println!("================");
}
