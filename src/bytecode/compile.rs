use std::mem;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::{
    bytecode::{
        code::{Instructions, make},
        compile_error::CompileError,
        op::Opcode,
        symbols::{Symbol, SymbolScope, SymbolTable},
    },
    lang::{
        ast::{BlockStatement, Expression, InfixOp, PrefixOp, Program, Statement},
        object::{CompiledFunction, Object},
    },
};

// =============================================================================
// COMPILE - AST to bytecode
// =============================================================================

/// Operand-width limits the encoding imposes.
const MAX_CONSTANTS: usize = u16::MAX as usize + 1;
const MAX_GLOBALS: usize = u16::MAX as usize + 1;
const MAX_LOCALS: usize = u8::MAX as usize + 1;
const MAX_FREE: usize = u8::MAX as usize + 1;
const MAX_ARGUMENTS: usize = u8::MAX as usize;

/// Finished compilation output: the main instruction stream plus the
/// constant pool it indexes into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Object>,
}

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

/// Per-function instruction buffer. Function literals open a fresh scope
/// so their body assembles into its own stream.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

pub struct Compiler {
    constants: Vec<Object>,
    symbols: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    pub fn new() -> Self {
        Compiler {
            constants: Vec::new(),
            symbols: SymbolTable::new(),
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Resume from an earlier session's bindings and constant pool. The
    /// REPL uses this to carry state across lines.
    pub fn with_state(symbols: SymbolTable, constants: Vec<Object>) -> Self {
        Compiler {
            constants,
            symbols,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Hand the bindings and constant pool back for the next session.
    pub fn into_state(self) -> (SymbolTable, Vec<Object>) {
        (self.symbols, self.constants)
    }

    pub fn compile_program(&mut self, program: &Program) -> Result<Bytecode, CompileError> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }
        Ok(Bytecode {
            instructions: self.scopes[0].instructions.clone(),
            constants: self.constants.clone(),
        })
    }

    // ==========================================================================
    // Statements
    // ==========================================================================

    fn compile_statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match statement {
            Statement::Let { name, value } => {
                // Defined before the value compiles, so a global function
                // can refer to itself by name.
                let symbol = self.symbols.define(name);
                match symbol.scope {
                    SymbolScope::Global if symbol.index >= MAX_GLOBALS => {
                        return Err(CompileError::TooManyGlobals {
                            count: symbol.index + 1,
                        });
                    }
                    SymbolScope::Local if symbol.index >= MAX_LOCALS => {
                        return Err(CompileError::too_many_locals(name, symbol.index + 1));
                    }
                    _ => {}
                }
                self.compile_expression(value)?;
                match symbol.scope {
                    SymbolScope::Global => self.emit(Opcode::SetGlobal, &[symbol.index]),
                    _ => self.emit(Opcode::SetLocal, &[symbol.index]),
                };
            }
            Statement::Return(value) => {
                if self.scopes.len() == 1 {
                    return Err(CompileError::ReturnOutsideFunction);
                }
                self.compile_expression(value)?;
                self.emit(Opcode::ReturnValue, &[]);
            }
            Statement::Expression(expression) => {
                self.compile_expression(expression)?;
                self.emit(Opcode::Pop, &[]);
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &BlockStatement) -> Result<(), CompileError> {
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    // ==========================================================================
    // Expressions
    // ==========================================================================

    fn compile_expression(&mut self, expression: &Expression) -> Result<(), CompileError> {
        match expression {
            Expression::IntegerLiteral(value) => {
                let index = self.add_constant(Object::Integer(*value))?;
                self.emit(Opcode::Constant, &[index]);
            }
            Expression::StringLiteral(value) => {
                let index = self.add_constant(Object::Str(value.clone()))?;
                self.emit(Opcode::Constant, &[index]);
            }
            Expression::BooleanLiteral(value) => {
                if *value {
                    self.emit(Opcode::True, &[]);
                } else {
                    self.emit(Opcode::False, &[]);
                }
            }
            Expression::Identifier(name) => {
                let symbol = self
                    .symbols
                    .resolve(name)
                    .ok_or_else(|| CompileError::undefined_variable(name))?;
                self.load_symbol(&symbol);
            }
            Expression::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator {
                    PrefixOp::Bang => self.emit(Opcode::Bang, &[]),
                    PrefixOp::Minus => self.emit(Opcode::Minus, &[]),
                };
            }
            Expression::Infix {
                left,
                operator,
                right,
            } => {
                // `<` has no opcode of its own; swap operands and reuse GT.
                if *operator == InfixOp::Lt {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(Opcode::GreaterThan, &[]);
                    return Ok(());
                }
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                match operator {
                    InfixOp::Plus => self.emit(Opcode::Add, &[]),
                    InfixOp::Minus => self.emit(Opcode::Sub, &[]),
                    InfixOp::Asterisk => self.emit(Opcode::Mul, &[]),
                    InfixOp::Slash => self.emit(Opcode::Div, &[]),
                    InfixOp::Gt => self.emit(Opcode::GreaterThan, &[]),
                    InfixOp::Eq => self.emit(Opcode::Equal, &[]),
                    InfixOp::NotEq => self.emit(Opcode::NotEqual, &[]),
                    InfixOp::Lt => unreachable!("handled above"),
                };
            }
            Expression::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if(condition, consequence, alternative.as_ref())?,
            Expression::ArrayLiteral(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Opcode::Array, &[elements.len()]);
            }
            Expression::HashLiteral(pairs) => {
                // Key order in source is not significant; sort by the key's
                // printed form so output bytes are deterministic.
                let mut pairs: Vec<_> = pairs.iter().collect();
                pairs.sort_by_key(|(key, _)| key.to_string());
                for (key, value) in &pairs {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Opcode::Hash, &[pairs.len() * 2]);
            }
            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Opcode::Index, &[]);
            }
            Expression::FunctionLiteral { parameters, body } => {
                self.compile_function(parameters, body)?;
            }
            Expression::Call {
                function,
                arguments,
            } => {
                if arguments.len() > MAX_ARGUMENTS {
                    return Err(CompileError::TooManyArguments {
                        count: arguments.len(),
                    });
                }
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(Opcode::Call, &[arguments.len()]);
            }
        }
        Ok(())
    }

    fn compile_if(
        &mut self,
        condition: &Expression,
        consequence: &BlockStatement,
        alternative: Option<&BlockStatement>,
    ) -> Result<(), CompileError> {
        self.compile_expression(condition)?;

        // Placeholder operand, patched once the consequence length is known.
        let jump_not_truthy_pos = self.emit(Opcode::JumpNotTruthy, &[9999]);

        self.compile_block(consequence)?;
        if self.last_instruction_is(Opcode::Pop) {
            self.remove_last_pop();
        } else {
            // Branch ended without a value (empty block, trailing let).
            // Both branches must leave exactly one value on the stack.
            self.emit(Opcode::Null, &[]);
        }

        let jump_pos = self.emit(Opcode::Jump, &[9999]);

        let after_consequence = self.scope().instructions.len();
        self.change_operand(jump_not_truthy_pos, after_consequence);

        match alternative {
            Some(block) => {
                self.compile_block(block)?;
                if self.last_instruction_is(Opcode::Pop) {
                    self.remove_last_pop();
                } else {
                    self.emit(Opcode::Null, &[]);
                }
            }
            // A missing else branch still produces a value.
            None => {
                self.emit(Opcode::Null, &[]);
            }
        }

        let after_alternative = self.scope().instructions.len();
        self.change_operand(jump_pos, after_alternative);
        Ok(())
    }

    fn compile_function(
        &mut self,
        parameters: &[String],
        body: &BlockStatement,
    ) -> Result<(), CompileError> {
        self.enter_scope();
        for parameter in parameters {
            let symbol = self.symbols.define(parameter);
            if symbol.index >= MAX_LOCALS {
                return Err(CompileError::too_many_locals(parameter, symbol.index + 1));
            }
        }

        self.compile_block(body)?;

        // Body value becomes the implicit return; an empty body returns null.
        if self.last_instruction_is(Opcode::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(Opcode::ReturnValue) {
            self.emit(Opcode::Return, &[]);
        }

        let free_symbols = self.symbols.free_symbols.clone();
        let num_locals = self.symbols.num_definitions;
        let instructions = self.leave_scope()?;

        if free_symbols.len() > MAX_FREE {
            return Err(CompileError::TooManyFreeVariables {
                count: free_symbols.len(),
            });
        }
        // Captured values are loaded in the enclosing scope so Closure can
        // collect them off the stack.
        for symbol in &free_symbols {
            self.load_symbol(symbol);
        }

        let function = CompiledFunction {
            instructions,
            num_locals,
            num_parameters: parameters.len(),
        };
        let index = self.add_constant(Object::CompiledFunction(Rc::new(function)))?;
        self.emit(Opcode::Closure, &[index, free_symbols.len()]);
        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Opcode::GetLocal, &[symbol.index]),
            SymbolScope::Free => self.emit(Opcode::GetFree, &[symbol.index]),
        };
    }

    // ==========================================================================
    // Emission helpers
    // ==========================================================================

    fn scope(&mut self) -> &mut CompilationScope {
        let index = self.scopes.len() - 1;
        &mut self.scopes[index]
    }

    fn add_constant(&mut self, object: Object) -> Result<usize, CompileError> {
        if self.constants.len() >= MAX_CONSTANTS {
            return Err(CompileError::TooManyConstants {
                count: self.constants.len() + 1,
            });
        }
        self.constants.push(object);
        Ok(self.constants.len() - 1)
    }

    fn emit(&mut self, op: Opcode, operands: &[usize]) -> usize {
        let ins = make(op, operands);
        let scope = self.scope();
        let position = scope.instructions.append(&ins);
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction {
            opcode: op,
            position,
        });
        position
    }

    fn last_instruction_is(&self, op: Opcode) -> bool {
        self.scopes[self.scopes.len() - 1]
            .last_instruction
            .is_some_and(|last| last.opcode == op)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.scope();
        if let Some(last) = scope.last_instruction {
            scope.instructions.truncate(last.position);
            scope.last_instruction = scope.previous_instruction.take();
        }
    }

    /// Re-encode the instruction at `pos` with a new operand. Only valid
    /// for same-width replacements (jump patching).
    fn change_operand(&mut self, pos: usize, operand: usize) {
        let op_byte = self.scope().instructions.as_bytes()[pos];
        // The byte came out of this buffer, so it decodes.
        if let Ok(op) = Opcode::try_from(op_byte) {
            let ins = make(op, &[operand]);
            self.scope().instructions.overwrite(pos, &ins);
        }
    }

    fn replace_last_pop_with_return(&mut self) {
        let scope = self.scope();
        if let Some(last) = &mut scope.last_instruction {
            let position = last.position;
            last.opcode = Opcode::ReturnValue;
            scope
                .instructions
                .overwrite(position, &make(Opcode::ReturnValue, &[]));
        }
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        self.symbols = SymbolTable::enclosed(mem::take(&mut self.symbols));
    }

    fn leave_scope(&mut self) -> Result<Instructions, CompileError> {
        let scope = self
            .scopes
            .pop()
            .ok_or_else(|| CompileError::internal("leave_scope with no open scope"))?;
        self.symbols = mem::take(&mut self.symbols)
            .into_outer()
            .ok_or_else(|| CompileError::internal("leave_scope at global symbol table"))?;
        Ok(scope.instructions)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{lexer::Lexer, parser::Parser};

    fn parse(input: &str) -> Program {
        let tokens = Lexer::new(input).tokenize();
        let mut parser = Parser::new(tokens);
        let program = parser.parse_program();
        assert!(
            parser.errors().is_empty(),
            "parser errors: {:?}",
            parser.errors()
        );
        program
    }

    fn compile(input: &str) -> Bytecode {
        let program = parse(input);
        Compiler::new()
            .compile_program(&program)
            .unwrap_or_else(|err| panic!("compile error for {input:?}: {err}"))
    }

    fn concat(parts: &[Vec<u8>]) -> Instructions {
        let mut ins = Instructions::new();
        for part in parts {
            ins.append(part);
        }
        ins
    }

    fn ints(values: &[i64]) -> Vec<Object> {
        values.iter().map(|v| Object::Integer(*v)).collect()
    }

    fn function_constant(bytecode: &Bytecode, index: usize) -> Rc<CompiledFunction> {
        match &bytecode.constants[index] {
            Object::CompiledFunction(f) => Rc::clone(f),
            other => panic!("constant {index} is not a function: {other:?}"),
        }
    }

    #[test]
    fn test_integer_arithmetic() {
        let bytecode = compile("1 + 2");
        assert_eq!(bytecode.constants, ints(&[1, 2]));
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_expression_statements_each_pop() {
        let bytecode = compile("1; 2");
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::Constant, &[0]),
                make(Opcode::Pop, &[]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_other_arithmetic_operators() {
        for (input, op) in [
            ("2 - 1", Opcode::Sub),
            ("2 * 1", Opcode::Mul),
            ("2 / 1", Opcode::Div),
        ] {
            let bytecode = compile(input);
            assert_eq!(
                bytecode.instructions,
                concat(&[
                    make(Opcode::Constant, &[0]),
                    make(Opcode::Constant, &[1]),
                    make(op, &[]),
                    make(Opcode::Pop, &[]),
                ]),
                "input: {input}"
            );
        }
    }

    #[test]
    fn test_prefix_expressions() {
        let bytecode = compile("-1");
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::Constant, &[0]),
                make(Opcode::Minus, &[]),
                make(Opcode::Pop, &[]),
            ])
        );

        let bytecode = compile("!true");
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::True, &[]),
                make(Opcode::Bang, &[]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_boolean_literals() {
        let bytecode = compile("true");
        assert!(bytecode.constants.is_empty());
        assert_eq!(
            bytecode.instructions,
            concat(&[make(Opcode::True, &[]), make(Opcode::Pop, &[])])
        );
    }

    #[test]
    fn test_comparison_operators() {
        let bytecode = compile("1 > 2");
        assert_eq!(bytecode.constants, ints(&[1, 2]));
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::GreaterThan, &[]),
                make(Opcode::Pop, &[]),
            ])
        );

        // `<` swaps its operands and reuses GT.
        let bytecode = compile("1 < 2");
        assert_eq!(bytecode.constants, ints(&[2, 1]));
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::GreaterThan, &[]),
                make(Opcode::Pop, &[]),
            ])
        );

        let bytecode = compile("true != false");
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::True, &[]),
                make(Opcode::False, &[]),
                make(Opcode::NotEqual, &[]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_conditional_without_else() {
        let bytecode = compile("if (true) { 10 }; 3333;");
        assert_eq!(bytecode.constants, ints(&[10, 3333]));
        assert_eq!(
            bytecode.instructions,
            concat(&[
                // 0000
                make(Opcode::True, &[]),
                // 0001: patched to point past the Jump
                make(Opcode::JumpNotTruthy, &[10]),
                // 0004
                make(Opcode::Constant, &[0]),
                // 0007: patched to point past the implicit null branch
                make(Opcode::Jump, &[11]),
                // 0010
                make(Opcode::Null, &[]),
                // 0011
                make(Opcode::Pop, &[]),
                // 0012
                make(Opcode::Constant, &[1]),
                // 0015
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_conditional_with_else() {
        let bytecode = compile("if (true) { 10 } else { 20 }; 3333;");
        assert_eq!(bytecode.constants, ints(&[10, 20, 3333]));
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::True, &[]),
                make(Opcode::JumpNotTruthy, &[10]),
                make(Opcode::Constant, &[0]),
                make(Opcode::Jump, &[13]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Pop, &[]),
                make(Opcode::Constant, &[2]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_conditional_with_valueless_consequence() {
        // A branch ending in a let pushes nothing on its own, so the
        // compiler supplies a Null to keep one value for the Pop.
        let bytecode = compile("if (true) { let a = 1; }");
        assert_eq!(bytecode.constants, ints(&[1]));
        assert_eq!(
            bytecode.instructions,
            concat(&[
                // 0000
                make(Opcode::True, &[]),
                // 0001
                make(Opcode::JumpNotTruthy, &[14]),
                // 0004
                make(Opcode::Constant, &[0]),
                // 0007
                make(Opcode::SetGlobal, &[0]),
                // 0010: supplied branch value
                make(Opcode::Null, &[]),
                // 0011
                make(Opcode::Jump, &[15]),
                // 0014: implicit null branch
                make(Opcode::Null, &[]),
                // 0015
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_conditional_with_valueless_alternative() {
        let bytecode = compile("if (false) { 1 } else { let a = 2; }");
        assert_eq!(bytecode.constants, ints(&[1, 2]));
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::False, &[]),
                make(Opcode::JumpNotTruthy, &[10]),
                make(Opcode::Constant, &[0]),
                make(Opcode::Jump, &[17]),
                make(Opcode::Constant, &[1]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::Null, &[]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_jump_targets_via_disassembly() {
        let bytecode = compile("if (1 < 2) { 10 } else { 20 }");
        let expected = "\
0000 CONSTANT 0
0003 CONSTANT 1
0006 GT
0007 JUMP_NOT_TRUTHY 16
0010 CONSTANT 2
0013 JUMP 19
0016 CONSTANT 3
0019 POP
";
        assert_eq!(bytecode.instructions.to_string(), expected);
    }

    #[test]
    fn test_global_let_statements() {
        let bytecode = compile("let one = 1; let two = 2;");
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::Constant, &[0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::SetGlobal, &[1]),
            ])
        );

        let bytecode = compile("let one = 1; one;");
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::Constant, &[0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_undefined_variable_errors() {
        let program = parse("foobar");
        let err = Compiler::new().compile_program(&program).unwrap_err();
        assert_eq!(err, CompileError::undefined_variable("foobar"));
    }

    #[test]
    fn test_return_outside_function_errors() {
        let program = parse("return 5;");
        let err = Compiler::new().compile_program(&program).unwrap_err();
        assert_eq!(err, CompileError::ReturnOutsideFunction);
    }

    #[test]
    fn test_string_expressions() {
        let bytecode = compile("\"mon\" + \"key\"");
        assert_eq!(
            bytecode.constants,
            vec![
                Object::Str("mon".to_string()),
                Object::Str("key".to_string())
            ]
        );
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_array_literals() {
        let bytecode = compile("[]");
        assert_eq!(
            bytecode.instructions,
            concat(&[make(Opcode::Array, &[0]), make(Opcode::Pop, &[])])
        );

        let bytecode = compile("[1 + 2, 3 - 4, 5 * 6]");
        assert_eq!(bytecode.constants, ints(&[1, 2, 3, 4, 5, 6]));
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::Constant, &[2]),
                make(Opcode::Constant, &[3]),
                make(Opcode::Sub, &[]),
                make(Opcode::Constant, &[4]),
                make(Opcode::Constant, &[5]),
                make(Opcode::Mul, &[]),
                make(Opcode::Array, &[3]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_hash_literals() {
        let bytecode = compile("{}");
        assert_eq!(
            bytecode.instructions,
            concat(&[make(Opcode::Hash, &[0]), make(Opcode::Pop, &[])])
        );

        // Operand counts stack slots: twice the pair count.
        let bytecode = compile("{1: 2, 3: 4, 5: 6}");
        assert_eq!(bytecode.constants, ints(&[1, 2, 3, 4, 5, 6]));
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Constant, &[2]),
                make(Opcode::Constant, &[3]),
                make(Opcode::Constant, &[4]),
                make(Opcode::Constant, &[5]),
                make(Opcode::Hash, &[6]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_hash_literal_keys_sorted() {
        // Pairs compile in sorted key order regardless of source order.
        let bytecode = compile("{3: 4, 1: 2}");
        assert_eq!(bytecode.constants, ints(&[1, 2, 3, 4]));
    }

    #[test]
    fn test_index_expressions() {
        let bytecode = compile("[1, 2, 3][1 + 1]");
        assert_eq!(bytecode.constants, ints(&[1, 2, 3, 1, 1]));
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Constant, &[2]),
                make(Opcode::Array, &[3]),
                make(Opcode::Constant, &[3]),
                make(Opcode::Constant, &[4]),
                make(Opcode::Add, &[]),
                make(Opcode::Index, &[]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_functions() {
        let bytecode = compile("fn() { return 5 + 10 }");
        assert_eq!(bytecode.constants[0], Object::Integer(5));
        assert_eq!(bytecode.constants[1], Object::Integer(10));
        let function = function_constant(&bytecode, 2);
        assert_eq!(
            function.instructions,
            concat(&[
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::ReturnValue, &[]),
            ])
        );
        assert_eq!(function.num_locals, 0);
        assert_eq!(function.num_parameters, 0);
        assert_eq!(
            bytecode.instructions,
            concat(&[make(Opcode::Closure, &[2, 0]), make(Opcode::Pop, &[])])
        );
    }

    #[test]
    fn test_function_implicit_return() {
        // The trailing expression's Pop becomes ReturnValue.
        let bytecode = compile("fn() { 5 + 10 }");
        let function = function_constant(&bytecode, 2);
        assert_eq!(
            function.instructions,
            concat(&[
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::ReturnValue, &[]),
            ])
        );

        let bytecode = compile("fn() { 1; 2 }");
        let function = function_constant(&bytecode, 2);
        assert_eq!(
            function.instructions,
            concat(&[
                make(Opcode::Constant, &[0]),
                make(Opcode::Pop, &[]),
                make(Opcode::Constant, &[1]),
                make(Opcode::ReturnValue, &[]),
            ])
        );
    }

    #[test]
    fn test_function_without_body_returns_null() {
        let bytecode = compile("fn() { }");
        let function = function_constant(&bytecode, 0);
        assert_eq!(function.instructions, concat(&[make(Opcode::Return, &[])]));
    }

    #[test]
    fn test_function_calls() {
        let bytecode = compile("fn() { 24 }();");
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::Closure, &[1, 0]),
                make(Opcode::Call, &[0]),
                make(Opcode::Pop, &[]),
            ])
        );

        let bytecode = compile("let oneArg = fn(a) { a }; oneArg(24);");
        let function = function_constant(&bytecode, 0);
        assert_eq!(
            function.instructions,
            concat(&[
                make(Opcode::GetLocal, &[0]),
                make(Opcode::ReturnValue, &[]),
            ])
        );
        assert_eq!(function.num_parameters, 1);
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::Closure, &[0, 0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Call, &[1]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_let_statement_scopes() {
        let bytecode = compile("let num = 55; fn() { num }");
        let function = function_constant(&bytecode, 1);
        assert_eq!(
            function.instructions,
            concat(&[
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::ReturnValue, &[]),
            ])
        );

        let bytecode = compile("fn() { let num = 55; num }");
        let function = function_constant(&bytecode, 1);
        assert_eq!(function.num_locals, 1);
        assert_eq!(
            function.instructions,
            concat(&[
                make(Opcode::Constant, &[0]),
                make(Opcode::SetLocal, &[0]),
                make(Opcode::GetLocal, &[0]),
                make(Opcode::ReturnValue, &[]),
            ])
        );

        let bytecode = compile("fn() { let a = 55; let b = 77; a + b }");
        let function = function_constant(&bytecode, 2);
        assert_eq!(function.num_locals, 2);
        assert_eq!(
            function.instructions,
            concat(&[
                make(Opcode::Constant, &[0]),
                make(Opcode::SetLocal, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::SetLocal, &[1]),
                make(Opcode::GetLocal, &[0]),
                make(Opcode::GetLocal, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::ReturnValue, &[]),
            ])
        );
    }

    #[test]
    fn test_closures() {
        let bytecode = compile("fn(a) { fn(b) { a + b } }");
        let inner = function_constant(&bytecode, 0);
        assert_eq!(
            inner.instructions,
            concat(&[
                make(Opcode::GetFree, &[0]),
                make(Opcode::GetLocal, &[0]),
                make(Opcode::Add, &[]),
                make(Opcode::ReturnValue, &[]),
            ])
        );
        let outer = function_constant(&bytecode, 1);
        assert_eq!(
            outer.instructions,
            concat(&[
                make(Opcode::GetLocal, &[0]),
                make(Opcode::Closure, &[0, 1]),
                make(Opcode::ReturnValue, &[]),
            ])
        );
    }

    #[test]
    fn test_nested_closures_propagate_captures() {
        let bytecode = compile("fn(a) { fn(b) { fn(c) { a + b + c } } }");

        let innermost = function_constant(&bytecode, 0);
        assert_eq!(
            innermost.instructions,
            concat(&[
                make(Opcode::GetFree, &[0]),
                make(Opcode::GetFree, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::GetLocal, &[0]),
                make(Opcode::Add, &[]),
                make(Opcode::ReturnValue, &[]),
            ])
        );

        let middle = function_constant(&bytecode, 1);
        assert_eq!(
            middle.instructions,
            concat(&[
                make(Opcode::GetFree, &[0]),
                make(Opcode::GetLocal, &[0]),
                make(Opcode::Closure, &[0, 2]),
                make(Opcode::ReturnValue, &[]),
            ])
        );

        let outermost = function_constant(&bytecode, 2);
        assert_eq!(
            outermost.instructions,
            concat(&[
                make(Opcode::GetLocal, &[0]),
                make(Opcode::Closure, &[1, 1]),
                make(Opcode::ReturnValue, &[]),
            ])
        );
    }

    #[test]
    fn test_recursive_global_function() {
        // The binding is defined before its value compiles, so the body
        // reaches itself through GetGlobal.
        let bytecode = compile("let countDown = fn(x) { countDown(x - 1) }; countDown(1);");
        let function = function_constant(&bytecode, 1);
        assert_eq!(
            function.instructions,
            concat(&[
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::GetLocal, &[0]),
                make(Opcode::Constant, &[0]),
                make(Opcode::Sub, &[]),
                make(Opcode::Call, &[1]),
                make(Opcode::ReturnValue, &[]),
            ])
        );
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::Closure, &[1, 0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Constant, &[2]),
                make(Opcode::Call, &[1]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_repl_state_carries_across_compilers() {
        let mut first = Compiler::new();
        first.compile_program(&parse("let x = 41;")).unwrap();
        let (symbols, constants) = first.into_state();

        let mut second = Compiler::with_state(symbols, constants);
        let bytecode = second.compile_program(&parse("x + 1")).unwrap();
        assert_eq!(bytecode.constants, ints(&[41, 1]));
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::Pop, &[]),
            ])
        );
    }
}
