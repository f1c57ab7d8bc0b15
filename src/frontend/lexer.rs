use crate::frontend::token::{Token, lookup_ident};

/// Source position of a token, 1-based.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

/// A token together with the position it started at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Consumes the whole input and returns the token stream, terminated
    /// by a single `Eof` token.
    pub fn tokenize(&mut self) -> Vec<Spanned> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token();
            let done = matches!(spanned.token, Token::Eof);
            tokens.push(spanned);
            if done {
                break;
            }
        }
        tokens
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_ascii_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    pub fn next_token(&mut self) -> Spanned {
        self.skip_whitespace();

        let span = self.span();
        let token = match self.current() {
            None => Token::Eof,
            Some('=') => {
                self.advance();
                if self.current() == Some('=') {
                    self.advance();
                    Token::Eq
                } else {
                    Token::Assign
                }
            }
            Some('!') => {
                self.advance();
                if self.current() == Some('=') {
                    self.advance();
                    Token::NotEq
                } else {
                    Token::Bang
                }
            }
            Some('+') => {
                self.advance();
                Token::Plus
            }
            Some('-') => {
                self.advance();
                Token::Minus
            }
            Some('*') => {
                self.advance();
                Token::Asterisk
            }
            Some('/') => {
                self.advance();
                Token::Slash
            }
            Some('<') => {
                self.advance();
                Token::Lt
            }
            Some('>') => {
                self.advance();
                Token::Gt
            }
            Some(',') => {
                self.advance();
                Token::Comma
            }
            Some(';') => {
                self.advance();
                Token::Semicolon
            }
            Some(':') => {
                self.advance();
                Token::Colon
            }
            Some('(') => {
                self.advance();
                Token::LParen
            }
            Some(')') => {
                self.advance();
                Token::RParen
            }
            Some('{') => {
                self.advance();
                Token::LBrace
            }
            Some('}') => {
                self.advance();
                Token::RBrace
            }
            Some('[') => {
                self.advance();
                Token::LBracket
            }
            Some(']') => {
                self.advance();
                Token::RBracket
            }
            Some('"') => self.read_string(),
            Some(ch) if ch.is_ascii_digit() => self.read_number(),
            Some(ch) if is_ident_char(ch) => self.read_identifier(),
            Some(ch) => {
                self.advance();
                Token::Illegal(ch)
            }
        };

        Spanned { token, span }
    }

    fn read_identifier(&mut self) -> Token {
        let start = self.pos;
        while let Some(ch) = self.current() {
            if is_ident_char(ch) || ch.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }
        let ident: String = self.source[start..self.pos].iter().collect();
        lookup_ident(&ident)
    }

    fn read_number(&mut self) -> Token {
        let start = self.pos;
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }
        let literal: String = self.source[start..self.pos].iter().collect();
        match literal.parse::<i64>() {
            Ok(n) => Token::Int(n),
            // Out-of-range literal; surfaced to the parser as illegal input.
            Err(_) => Token::Illegal(self.source[start]),
        }
    }

    fn read_string(&mut self) -> Token {
        self.advance(); // opening quote

        let mut string = String::new();
        loop {
            match self.current() {
                Some('"') => {
                    self.advance();
                    return Token::Str(string);
                }
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        Some('n') => string.push('\n'),
                        Some('t') => string.push('\t'),
                        Some('r') => string.push('\r'),
                        Some('\\') => string.push('\\'),
                        Some('"') => string.push('"'),
                        other => return Token::Illegal(other.unwrap_or('\\')),
                    }
                    self.advance();
                }
                Some(ch) => {
                    string.push(ch);
                    self.advance();
                }
                None => return Token::Illegal('"'),
            }
        }
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}
