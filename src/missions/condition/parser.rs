/// Parser for trigger conditions
///
/// Parses condition source into an Abstract Syntax Tree (AST) that the
/// evaluator runs once per emission of the subscribed event.
///
/// **Supported Syntax:**
/// - Literals: `"text"`, `'text'`, `42`, `true`, `false`, `null`
/// - Names bound from `conditionArgs`, with field access: `message.content`
/// - Calls: `contains_any(lower(message.content), "done", "fixed")`
/// - Operators: `!`, `==`, `!=`, `<`, `<=`, `>`, `>=`, `&&`, `||`, `? :`
use std::fmt;

/// Longest condition source accepted.
pub const MAX_SOURCE_LEN: usize = 2048;
/// Deepest nesting of unary operators and parentheses accepted.
pub const MAX_DEPTH: usize = 16;

/// Token types for lexical analysis
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Identifiers and literals
    Identifier(String),
    String(String),
    Number(i64),

    // Operators
    Not,          // !
    And,          // &&
    Or,           // ||
    Question,     // ?
    Colon,        // :
    Equal,        // == (=== accepted)
    NotEqual,     // != (!== accepted)
    Greater,      // >
    Less,         // <
    GreaterEqual, // >=
    LessEqual,    // <=

    // Delimiters
    Dot,        // .
    LeftParen,  // (
    RightParen, // )
    Comma,      // ,

    // Special
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Identifier(s) => write!(f, "identifier '{}'", s),
            Token::String(s) => write!(f, "string \"{}\"", s),
            Token::Number(n) => write!(f, "number {}", n),
            Token::Not => write!(f, "!"),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Question => write!(f, "?"),
            Token::Colon => write!(f, ":"),
            Token::Equal => write!(f, "=="),
            Token::NotEqual => write!(f, "!="),
            Token::Greater => write!(f, ">"),
            Token::Less => write!(f, "<"),
            Token::GreaterEqual => write!(f, ">="),
            Token::LessEqual => write!(f, "<="),
            Token::Dot => write!(f, "."),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

/// Abstract Syntax Tree node types
#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    /// Built-in function call
    Call { name: String, args: Vec<AstNode> },

    /// Name bound from the emitted arguments or mission variables
    Identifier(String),

    /// `target.field`
    Field { target: Box<AstNode>, field: String },

    Not(Box<AstNode>),

    BinaryOp {
        op: BinaryOperator,
        left: Box<AstNode>,
        right: Box<AstNode>,
    },

    Ternary {
        condition: Box<AstNode>,
        then_branch: Box<AstNode>,
        else_branch: Box<AstNode>,
    },

    // Literals
    StringLiteral(String),
    NumberLiteral(i64),
    BooleanLiteral(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    And,
    Or,
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOperator::And => write!(f, "&&"),
            BinaryOperator::Or => write!(f, "||"),
            BinaryOperator::Equal => write!(f, "=="),
            BinaryOperator::NotEqual => write!(f, "!="),
            BinaryOperator::Greater => write!(f, ">"),
            BinaryOperator::Less => write!(f, "<"),
            BinaryOperator::GreaterEqual => write!(f, ">="),
            BinaryOperator::LessEqual => write!(f, "<="),
        }
    }
}

/// Tokenizer for condition source
pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
}

impl Tokenizer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        self.position += 1;
        ch
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.current() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self, quote: char) -> Result<String, String> {
        let mut result = String::new();

        while let Some(ch) = self.advance() {
            if ch == quote {
                return Ok(result);
            } else if ch == '\\' {
                match self.advance() {
                    Some('n') => result.push('\n'),
                    Some('t') => result.push('\t'),
                    Some(escaped) => result.push(escaped),
                    None => break,
                }
            } else {
                result.push(ch);
            }
        }

        Err("Unterminated string literal".to_string())
    }

    fn read_identifier(&mut self) -> String {
        let mut result = String::new();

        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        result
    }

    fn read_number(&mut self) -> Result<i64, String> {
        let mut result = String::new();

        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        result
            .parse()
            .map_err(|_| format!("Number literal out of range: {}", result))
    }

    pub fn next_token(&mut self) -> Result<Token, String> {
        self.skip_whitespace();

        let Some(ch) = self.advance() else {
            return Ok(Token::Eof);
        };

        match ch {
            '(' => Ok(Token::LeftParen),
            ')' => Ok(Token::RightParen),
            ',' => Ok(Token::Comma),
            '.' => Ok(Token::Dot),
            '?' => Ok(Token::Question),
            ':' => Ok(Token::Colon),

            '&' if self.eat('&') => Ok(Token::And),
            '&' => Err("Expected '&&', found single '&'".to_string()),

            '|' if self.eat('|') => Ok(Token::Or),
            '|' => Err("Expected '||', found single '|'".to_string()),

            '=' if self.eat('=') => {
                self.eat('=');
                Ok(Token::Equal)
            }
            '=' => Err("Expected '==', found single '='".to_string()),

            '!' if self.eat('=') => {
                self.eat('=');
                Ok(Token::NotEqual)
            }
            '!' => Ok(Token::Not),

            '>' if self.eat('=') => Ok(Token::GreaterEqual),
            '>' => Ok(Token::Greater),
            '<' if self.eat('=') => Ok(Token::LessEqual),
            '<' => Ok(Token::Less),

            '"' | '\'' => Ok(Token::String(self.read_string(ch)?)),

            c if c.is_ascii_digit() => {
                self.position -= 1;
                Ok(Token::Number(self.read_number()?))
            }

            c if c.is_alphabetic() || c == '_' => {
                self.position -= 1;
                Ok(Token::Identifier(self.read_identifier()))
            }

            c => Err(format!("Unexpected character: '{}'", c)),
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, String> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            if token == Token::Eof {
                tokens.push(token);
                break;
            }
            tokens.push(token);
        }

        Ok(tokens)
    }
}

/// Parser for condition source
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
        }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        let current = self.current().clone();
        if std::mem::discriminant(&current) == std::mem::discriminant(&expected) {
            self.advance();
            Ok(())
        } else {
            Err(format!("Expected {}, found {}", expected, current))
        }
    }

    fn enter(&mut self) -> Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            Err(format!("Expression nested deeper than {} levels", MAX_DEPTH))
        } else {
            Ok(())
        }
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Parse a primary expression (literals, names, calls, parenthesized expressions)
    fn parse_primary(&mut self) -> Result<AstNode, String> {
        match self.current().clone() {
            Token::String(s) => {
                self.advance();
                Ok(AstNode::StringLiteral(s))
            }

            Token::Number(n) => {
                self.advance();
                Ok(AstNode::NumberLiteral(n))
            }

            Token::Identifier(name) => {
                self.advance();

                match name.as_str() {
                    "true" => return Ok(AstNode::BooleanLiteral(true)),
                    "false" => return Ok(AstNode::BooleanLiteral(false)),
                    "null" => return Ok(AstNode::Null),
                    _ => {}
                }

                if !matches!(self.current(), Token::LeftParen) {
                    return Ok(AstNode::Identifier(name));
                }

                self.advance(); // consume '('
                let mut args = Vec::new();

                if !matches!(self.current(), Token::RightParen) {
                    loop {
                        args.push(self.parse_ternary()?);

                        if matches!(self.current(), Token::Comma) {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }

                self.expect(Token::RightParen)?;
                Ok(AstNode::Call { name, args })
            }

            Token::LeftParen => {
                self.advance(); // consume '('
                self.enter()?;
                let expr = self.parse_ternary()?;
                self.leave();
                self.expect(Token::RightParen)?;
                Ok(expr)
            }

            token => Err(format!("Unexpected token in expression: {}", token)),
        }
    }

    /// Parse field access (`a.b.c`)
    fn parse_postfix(&mut self) -> Result<AstNode, String> {
        let mut node = self.parse_primary()?;

        while matches!(self.current(), Token::Dot) {
            self.advance();
            match self.current().clone() {
                Token::Identifier(field) => {
                    self.advance();
                    node = AstNode::Field {
                        target: Box::new(node),
                        field,
                    };
                }
                other => return Err(format!("Expected field name after '.', found {}", other)),
            }
        }

        Ok(node)
    }

    /// Parse logical not (`!expr`)
    fn parse_unary(&mut self) -> Result<AstNode, String> {
        if matches!(self.current(), Token::Not) {
            self.advance();
            self.enter()?;
            let inner = self.parse_unary()?;
            self.leave();
            return Ok(AstNode::Not(Box::new(inner)));
        }
        self.parse_postfix()
    }

    /// Parse comparison operators (==, !=, >, <, >=, <=)
    fn parse_comparison(&mut self) -> Result<AstNode, String> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.current() {
                Token::Equal => BinaryOperator::Equal,
                Token::NotEqual => BinaryOperator::NotEqual,
                Token::Greater => BinaryOperator::Greater,
                Token::Less => BinaryOperator::Less,
                Token::GreaterEqual => BinaryOperator::GreaterEqual,
                Token::LessEqual => BinaryOperator::LessEqual,
                _ => break,
            };

            self.advance();
            let right = self.parse_unary()?;

            left = AstNode::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse AND operator (&&)
    fn parse_and(&mut self) -> Result<AstNode, String> {
        let mut left = self.parse_comparison()?;

        while matches!(self.current(), Token::And) {
            self.advance();
            let right = self.parse_comparison()?;

            left = AstNode::BinaryOp {
                op: BinaryOperator::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse OR operator (||)
    fn parse_or(&mut self) -> Result<AstNode, String> {
        let mut left = self.parse_and()?;

        while matches!(self.current(), Token::Or) {
            self.advance();
            let right = self.parse_and()?;

            left = AstNode::BinaryOp {
                op: BinaryOperator::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse ternary operator (condition ? then : else)
    fn parse_ternary(&mut self) -> Result<AstNode, String> {
        let condition = self.parse_or()?;

        if matches!(self.current(), Token::Question) {
            self.advance();
            self.enter()?;
            let then_branch = self.parse_or()?;
            self.expect(Token::Colon)?;
            let else_branch = self.parse_ternary()?;
            self.leave();

            Ok(AstNode::Ternary {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            })
        } else {
            Ok(condition)
        }
    }

    /// Parse the entire expression
    pub fn parse(&mut self) -> Result<AstNode, String> {
        let expr = self.parse_ternary()?;

        if !matches!(self.current(), Token::Eof) {
            return Err(format!(
                "Unexpected token after expression: {}",
                self.current()
            ));
        }

        Ok(expr)
    }
}

/// Parse condition source into an AST
pub fn parse_expression(source: &str) -> Result<AstNode, String> {
    if source.chars().count() > MAX_SOURCE_LEN {
        return Err(format!(
            "Condition longer than {} characters",
            MAX_SOURCE_LEN
        ));
    }
    let mut tokenizer = Tokenizer::new(source);
    let tokens = tokenizer.tokenize()?;
    let mut parser = Parser::new(tokens);
    parser.parse()
}
