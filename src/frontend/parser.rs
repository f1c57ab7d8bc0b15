use crate::frontend::lexer::{Span, Spanned};
use crate::frontend::token::Token;
use crate::lang::ast::{BlockStatement, Expression, InfixOp, PrefixOp, Program, Statement};

// =============================================================================
// PARSER - Pratt parser over the token stream
// =============================================================================

/// Binding power of infix positions, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum Precedence {
    Lowest,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
}

fn precedence_of(token: &Token) -> Precedence {
    match token {
        Token::Eq | Token::NotEq => Precedence::Equals,
        Token::Lt | Token::Gt => Precedence::LessGreater,
        Token::Plus | Token::Minus => Precedence::Sum,
        Token::Slash | Token::Asterisk => Precedence::Product,
        Token::LParen => Precedence::Call,
        Token::LBracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

/// Recursive-descent parser. Malformed input does not abort the parse;
/// every problem is recorded in `errors` and the parser skips ahead, so
/// one run reports as much as possible.
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    errors: Vec<String>,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        debug_assert!(
            matches!(tokens.last(), Some(spanned) if spanned.token == Token::Eof),
            "token stream must end with Eof"
        );
        Parser {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn parse_program(&mut self) -> Program {
        let mut program = Program::default();
        while self.cur().token != Token::Eof {
            if let Some(statement) = self.parse_statement() {
                program.statements.push(statement);
            }
            self.advance();
        }
        program
    }

    // ==========================================================================
    // Token cursor
    // ==========================================================================

    fn cur(&self) -> &Spanned {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Spanned {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    /// Advance past the peek token when it matches, or record an error
    /// and stay put.
    fn expect_peek(&mut self, expected: &Token) -> bool {
        if self.peek().token == *expected {
            self.advance();
            true
        } else {
            let Spanned { token, span } = self.peek().clone();
            self.error(span, format!("expected next token to be {expected}, got {token}"));
            false
        }
    }

    fn error(&mut self, span: Span, message: String) {
        self.errors.push(format!("{}:{}: {}", span.line, span.col, message));
    }

    // ==========================================================================
    // Statements
    // ==========================================================================

    fn parse_statement(&mut self) -> Option<Statement> {
        match self.cur().token {
            Token::Let => self.parse_let_statement(),
            Token::Return => self.parse_return_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_let_statement(&mut self) -> Option<Statement> {
        let name = match &self.peek().token {
            Token::Ident(name) => name.clone(),
            token => {
                let span = self.peek().span;
                let token = token.clone();
                self.error(span, format!("expected next token to be an identifier, got {token}"));
                return None;
            }
        };
        self.advance();

        if !self.expect_peek(&Token::Assign) {
            return None;
        }
        self.advance();

        let value = self.parse_expression(Precedence::Lowest)?;
        if self.peek().token == Token::Semicolon {
            self.advance();
        }
        Some(Statement::Let { name, value })
    }

    fn parse_return_statement(&mut self) -> Option<Statement> {
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        if self.peek().token == Token::Semicolon {
            self.advance();
        }
        Some(Statement::Return(value))
    }

    fn parse_expression_statement(&mut self) -> Option<Statement> {
        let expression = self.parse_expression(Precedence::Lowest)?;
        if self.peek().token == Token::Semicolon {
            self.advance();
        }
        Some(Statement::Expression(expression))
    }

    fn parse_block_statement(&mut self) -> BlockStatement {
        // cur is the opening brace
        let mut block = BlockStatement { statements: Vec::new() };
        self.advance();
        while !matches!(self.cur().token, Token::RBrace | Token::Eof) {
            if let Some(statement) = self.parse_statement() {
                block.statements.push(statement);
            }
            self.advance();
        }
        if self.cur().token == Token::Eof {
            let span = self.cur().span;
            self.error(span, "unterminated block, expected '}'".to_string());
        }
        block
    }

    // ==========================================================================
    // Expressions
    // ==========================================================================

    fn parse_expression(&mut self, precedence: Precedence) -> Option<Expression> {
        let mut left = self.parse_prefix()?;

        while self.peek().token != Token::Semicolon
            && precedence < precedence_of(&self.peek().token)
        {
            left = match self.peek().token {
                Token::Plus
                | Token::Minus
                | Token::Slash
                | Token::Asterisk
                | Token::Eq
                | Token::NotEq
                | Token::Lt
                | Token::Gt => {
                    self.advance();
                    self.parse_infix_expression(left)?
                }
                Token::LParen => {
                    self.advance();
                    self.parse_call_expression(left)?
                }
                Token::LBracket => {
                    self.advance();
                    self.parse_index_expression(left)?
                }
                _ => return Some(left),
            };
        }
        Some(left)
    }

    fn parse_prefix(&mut self) -> Option<Expression> {
        match &self.cur().token {
            Token::Ident(name) => Some(Expression::Identifier(name.clone())),
            Token::Int(value) => Some(Expression::IntegerLiteral(*value)),
            Token::Str(value) => Some(Expression::StringLiteral(value.clone())),
            Token::True => Some(Expression::BooleanLiteral(true)),
            Token::False => Some(Expression::BooleanLiteral(false)),
            Token::Bang => self.parse_prefix_expression(PrefixOp::Bang),
            Token::Minus => self.parse_prefix_expression(PrefixOp::Minus),
            Token::LParen => self.parse_grouped_expression(),
            Token::If => self.parse_if_expression(),
            Token::Function => self.parse_function_literal(),
            Token::LBracket => self.parse_array_literal(),
            Token::LBrace => self.parse_hash_literal(),
            token => {
                let span = self.cur().span;
                let token = token.clone();
                self.error(span, format!("unexpected token {token} in expression"));
                None
            }
        }
    }

    fn parse_prefix_expression(&mut self, operator: PrefixOp) -> Option<Expression> {
        self.advance();
        let right = self.parse_expression(Precedence::Prefix)?;
        Some(Expression::Prefix {
            operator,
            right: Box::new(right),
        })
    }

    fn parse_infix_expression(&mut self, left: Expression) -> Option<Expression> {
        let operator = match self.cur().token {
            Token::Plus => InfixOp::Plus,
            Token::Minus => InfixOp::Minus,
            Token::Asterisk => InfixOp::Asterisk,
            Token::Slash => InfixOp::Slash,
            Token::Lt => InfixOp::Lt,
            Token::Gt => InfixOp::Gt,
            Token::Eq => InfixOp::Eq,
            Token::NotEq => InfixOp::NotEq,
            _ => return None,
        };
        let precedence = precedence_of(&self.cur().token);
        self.advance();
        let right = self.parse_expression(precedence)?;
        Some(Expression::Infix {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        })
    }

    fn parse_grouped_expression(&mut self) -> Option<Expression> {
        self.advance();
        let expression = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(&Token::RParen) {
            return None;
        }
        Some(expression)
    }

    fn parse_if_expression(&mut self) -> Option<Expression> {
        if !self.expect_peek(&Token::LParen) {
            return None;
        }
        self.advance();
        let condition = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(&Token::RParen) {
            return None;
        }
        if !self.expect_peek(&Token::LBrace) {
            return None;
        }
        let consequence = self.parse_block_statement();

        let alternative = if self.peek().token == Token::Else {
            self.advance();
            if !self.expect_peek(&Token::LBrace) {
                return None;
            }
            Some(self.parse_block_statement())
        } else {
            None
        };

        Some(Expression::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    fn parse_function_literal(&mut self) -> Option<Expression> {
        if !self.expect_peek(&Token::LParen) {
            return None;
        }
        let parameters = self.parse_function_parameters()?;
        if !self.expect_peek(&Token::LBrace) {
            return None;
        }
        let body = self.parse_block_statement();
        Some(Expression::FunctionLiteral { parameters, body })
    }

    fn parse_function_parameters(&mut self) -> Option<Vec<String>> {
        let mut parameters = Vec::new();
        if self.peek().token == Token::RParen {
            self.advance();
            return Some(parameters);
        }
        loop {
            self.advance();
            match &self.cur().token {
                Token::Ident(name) => parameters.push(name.clone()),
                token => {
                    let span = self.cur().span;
                    let token = token.clone();
                    self.error(span, format!("expected parameter name, got {token}"));
                    return None;
                }
            }
            if self.peek().token != Token::Comma {
                break;
            }
            self.advance();
        }
        if !self.expect_peek(&Token::RParen) {
            return None;
        }
        Some(parameters)
    }

    fn parse_call_expression(&mut self, function: Expression) -> Option<Expression> {
        let arguments = self.parse_expression_list(&Token::RParen)?;
        Some(Expression::Call {
            function: Box::new(function),
            arguments,
        })
    }

    fn parse_array_literal(&mut self) -> Option<Expression> {
        let elements = self.parse_expression_list(&Token::RBracket)?;
        Some(Expression::ArrayLiteral(elements))
    }

    /// Comma-separated expressions up to `end`; cur is the opening
    /// delimiter on entry and `end` on exit.
    fn parse_expression_list(&mut self, end: &Token) -> Option<Vec<Expression>> {
        let mut list = Vec::new();
        if self.peek().token == *end {
            self.advance();
            return Some(list);
        }
        self.advance();
        list.push(self.parse_expression(Precedence::Lowest)?);
        while self.peek().token == Token::Comma {
            self.advance();
            self.advance();
            list.push(self.parse_expression(Precedence::Lowest)?);
        }
        if !self.expect_peek(end) {
            return None;
        }
        Some(list)
    }

    fn parse_index_expression(&mut self, left: Expression) -> Option<Expression> {
        self.advance();
        let index = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(&Token::RBracket) {
            return None;
        }
        Some(Expression::Index {
            left: Box::new(left),
            index: Box::new(index),
        })
    }

    fn parse_hash_literal(&mut self) -> Option<Expression> {
        let mut pairs = Vec::new();
        while self.peek().token != Token::RBrace {
            self.advance();
            let key = self.parse_expression(Precedence::Lowest)?;
            if !self.expect_peek(&Token::Colon) {
                return None;
            }
            self.advance();
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));
            if self.peek().token != Token::RBrace && !self.expect_peek(&Token::Comma) {
                return None;
            }
        }
        self.advance();
        Some(Expression::HashLiteral(pairs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    fn parse(input: &str) -> Program {
        let tokens = Lexer::new(input).tokenize();
        let mut parser = Parser::new(tokens);
        let program = parser.parse_program();
        assert!(
            parser.errors().is_empty(),
            "parser errors for {input:?}: {:?}",
            parser.errors()
        );
        program
    }

    fn parse_single_expression(input: &str) -> Expression {
        let program = parse(input);
        assert_eq!(program.statements.len(), 1, "input: {input}");
        match program.statements.into_iter().next() {
            Some(Statement::Expression(expression)) => expression,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn test_let_statements() {
        let cases = [
            ("let x = 5;", "x", "5"),
            ("let y = true;", "y", "true"),
            ("let foobar = y;", "foobar", "y"),
        ];
        for (input, expected_name, expected_value) in cases {
            let program = parse(input);
            assert_eq!(program.statements.len(), 1);
            let Statement::Let { name, value } = &program.statements[0] else {
                panic!("expected let statement, got {:?}", program.statements[0]);
            };
            assert_eq!(name, expected_name);
            assert_eq!(value.to_string(), expected_value);
        }
    }

    #[test]
    fn test_return_statements() {
        let program = parse("return 5; return 10; return 993322;");
        assert_eq!(program.statements.len(), 3);
        for statement in &program.statements {
            assert!(matches!(statement, Statement::Return(_)));
        }
    }

    #[test]
    fn test_parse_errors_are_collected() {
        let tokens = Lexer::new("let x 5; let = 10;").tokenize();
        let mut parser = Parser::new(tokens);
        parser.parse_program();
        assert!(parser.errors().len() >= 2, "errors: {:?}", parser.errors());
        assert!(parser.errors()[0].contains("expected next token to be ="));
    }

    #[test]
    fn test_errors_carry_positions() {
        let tokens = Lexer::new("let x 5;").tokenize();
        let mut parser = Parser::new(tokens);
        parser.parse_program();
        assert!(parser.errors()[0].starts_with("1:7:"), "errors: {:?}", parser.errors());
    }

    #[test]
    fn test_literal_expressions() {
        assert_eq!(
            parse_single_expression("foobar;"),
            Expression::Identifier("foobar".to_string())
        );
        assert_eq!(
            parse_single_expression("5;"),
            Expression::IntegerLiteral(5)
        );
        assert_eq!(
            parse_single_expression("\"hello world\";"),
            Expression::StringLiteral("hello world".to_string())
        );
        assert_eq!(
            parse_single_expression("true;"),
            Expression::BooleanLiteral(true)
        );
    }

    #[test]
    fn test_prefix_expressions() {
        assert_eq!(parse_single_expression("!5;").to_string(), "(!5)");
        assert_eq!(parse_single_expression("-15;").to_string(), "(-15)");
        assert_eq!(parse_single_expression("!!true;").to_string(), "(!(!true))");
    }

    #[test]
    fn test_infix_expressions() {
        for op in ["+", "-", "*", "/", ">", "<", "==", "!="] {
            let input = format!("5 {op} 5;");
            let expected = format!("(5 {op} 5)");
            assert_eq!(parse_single_expression(&input).to_string(), expected);
        }
    }

    #[test]
    fn test_operator_precedence() {
        let cases = [
            ("-a * b", "((-a) * b)"),
            ("!-a", "(!(-a))"),
            ("a + b + c", "((a + b) + c)"),
            ("a + b - c", "((a + b) - c)"),
            ("a * b * c", "((a * b) * c)"),
            ("a + b / c", "(a + (b / c))"),
            ("a + b * c + d / e - f", "(((a + (b * c)) + (d / e)) - f)"),
            ("3 + 4; -5 * 5", "(3 + 4)((-5) * 5)"),
            ("5 > 4 == 3 < 4", "((5 > 4) == (3 < 4))"),
            ("5 < 4 != 3 > 4", "((5 < 4) != (3 > 4))"),
            (
                "3 + 4 * 5 == 3 * 1 + 4 * 5",
                "((3 + (4 * 5)) == ((3 * 1) + (4 * 5)))",
            ),
            ("true == true", "(true == true)"),
            ("!(true == true)", "(!(true == true))"),
            ("(5 + 5) * 2", "((5 + 5) * 2)"),
            ("2 / (5 + 5)", "(2 / (5 + 5))"),
            ("-(5 + 5)", "(-(5 + 5))"),
            ("a + add(b * c) + d", "((a + add((b * c))) + d)"),
            (
                "add(a, b, 1, 2 * 3, 4 + 5, add(6, 7 * 8))",
                "add(a, b, 1, (2 * 3), (4 + 5), add(6, (7 * 8)))",
            ),
            (
                "a * [1, 2, 3, 4][b * c] * d",
                "((a * ([1, 2, 3, 4][(b * c)])) * d)",
            ),
            (
                "add(a * b[2], b[1], 2 * [1, 2][1])",
                "add((a * (b[2])), (b[1]), (2 * ([1, 2][1])))",
            ),
        ];
        for (input, expected) in cases {
            assert_eq!(parse(input).to_string(), expected, "input: {input}");
        }
    }

    #[test]
    fn test_if_expression() {
        let expression = parse_single_expression("if (x < y) { x }");
        let Expression::If {
            condition,
            consequence,
            alternative,
        } = expression
        else {
            panic!("expected if expression");
        };
        assert_eq!(condition.to_string(), "(x < y)");
        assert_eq!(consequence.to_string(), "x");
        assert!(alternative.is_none());
    }

    #[test]
    fn test_if_else_expression() {
        let expression = parse_single_expression("if (x < y) { x } else { y }");
        let Expression::If { alternative, .. } = expression else {
            panic!("expected if expression");
        };
        assert_eq!(alternative.map(|b| b.to_string()), Some("y".to_string()));
    }

    #[test]
    fn test_function_literal() {
        let expression = parse_single_expression("fn(x, y) { x + y; }");
        let Expression::FunctionLiteral { parameters, body } = expression else {
            panic!("expected function literal");
        };
        assert_eq!(parameters, vec!["x", "y"]);
        assert_eq!(body.to_string(), "(x + y)");
    }

    #[test]
    fn test_function_parameter_variants() {
        let cases = [
            ("fn() {};", vec![]),
            ("fn(x) {};", vec!["x"]),
            ("fn(x, y, z) {};", vec!["x", "y", "z"]),
        ];
        for (input, expected) in cases {
            let Expression::FunctionLiteral { parameters, .. } = parse_single_expression(input)
            else {
                panic!("expected function literal for {input}");
            };
            assert_eq!(parameters, expected);
        }
    }

    #[test]
    fn test_call_expression() {
        let expression = parse_single_expression("add(1, 2 * 3, 4 + 5);");
        let Expression::Call {
            function,
            arguments,
        } = expression
        else {
            panic!("expected call expression");
        };
        assert_eq!(function.to_string(), "add");
        assert_eq!(arguments.len(), 3);
        assert_eq!(arguments[1].to_string(), "(2 * 3)");
    }

    #[test]
    fn test_array_literal() {
        assert_eq!(
            parse_single_expression("[1, 2 * 2, 3 + 3]").to_string(),
            "[1, (2 * 2), (3 + 3)]"
        );
        assert_eq!(parse_single_expression("[]").to_string(), "[]");
    }

    #[test]
    fn test_hash_literals() {
        let expression = parse_single_expression("{\"one\": 1, \"two\": 2, \"three\": 3}");
        let Expression::HashLiteral(pairs) = expression else {
            panic!("expected hash literal");
        };
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0].0.to_string(), "one");
        assert_eq!(pairs[0].1.to_string(), "1");

        let expression = parse_single_expression("{}");
        assert_eq!(expression, Expression::HashLiteral(vec![]));

        // Values can be arbitrary expressions.
        let expression = parse_single_expression("{1: 0 + 1, 2: 10 - 8}");
        let Expression::HashLiteral(pairs) = expression else {
            panic!("expected hash literal");
        };
        assert_eq!(pairs[0].1.to_string(), "(0 + 1)");
        assert_eq!(pairs[1].1.to_string(), "(10 - 8)");
    }

    #[test]
    fn test_unterminated_block_reports_error() {
        let tokens = Lexer::new("if (true) { 1").tokenize();
        let mut parser = Parser::new(tokens);
        parser.parse_program();
        assert!(
            parser.errors().iter().any(|e| e.contains("unterminated block")),
            "errors: {:?}",
            parser.errors()
        );
    }
}
