//! S-expression lexer and parser for Kernel source.
//!
//! The parser produces runtime values directly: lists become pair chains
//! (with source positions on the pairs), atoms become the matching value
//! variants. Accepted lexical classes: `#t`/`#f`, `#inert`, `#ignore`
//! (all case-insensitive), `#;` datum comments, `;` line comments,
//! identifiers (downcased), strings with backslash escapes, exact integers
//! with optional `#e`/`#b`/`#o`/`#d`/`#x` prefixes, `#e+infinity` and
//! `#e-infinity`, and dotted lists.

use num_bigint::BigInt;
use std::fmt;
use std::rc::Rc;

use crate::backend::symbol::intern;
use crate::backend::types::{
    boolean, cons_at, ignore, inert, integer, negative_infinity, nil, positive_infinity, string,
    symbol, SourcePos, ValueRef,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LParen,
    RParen,
    Dot,
    Symbol(String),
    Str(String),
    Integer(BigInt),
    Boolean(bool),
    Inert,
    Ignore,
    PositiveInfinity,
    NegativeInfinity,
    DatumComment,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Dot => write!(f, "."),
            Token::Symbol(s) => write!(f, "{}", s),
            Token::Str(s) => write!(f, "\"{}\"", s),
            Token::Integer(n) => write!(f, "{}", n),
            Token::Boolean(true) => write!(f, "#t"),
            Token::Boolean(false) => write!(f, "#f"),
            Token::Inert => write!(f, "#inert"),
            Token::Ignore => write!(f, "#ignore"),
            Token::PositiveInfinity => write!(f, "#e+infinity"),
            Token::NegativeInfinity => write!(f, "#e-infinity"),
            Token::DatumComment => write!(f, "#;"),
            Token::Eof => write!(f, "EOF"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub pos: Option<SourcePos>,
}

impl ParseError {
    fn new(message: impl Into<String>, pos: Option<SourcePos>) -> Self {
        ParseError {
            message: message.into(),
            pos,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.pos {
            Some(pos) => write!(f, "{}: {}", pos, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ParseError {}

fn is_initial(c: char) -> bool {
    c.is_ascii_alphabetic() || "!$%&*/:<=>?@^_~".contains(c)
}

fn is_subsequent(c: char) -> bool {
    is_initial(c) || c.is_ascii_digit() || "+-.".contains(c)
}

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    file: Option<Rc<str>>,
}

impl Lexer {
    pub fn new(input: &str, file: Option<&str>) -> Self {
        Lexer {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            file: file.map(Rc::from),
        }
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn here(&self) -> SourcePos {
        SourcePos {
            line: self.line,
            column: self.column,
            file: self.file.clone(),
        }
    }

    fn at_delimiter(&self) -> bool {
        match self.current() {
            None => true,
            Some(c) => c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';'),
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.current() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some(';') => {
                    while let Some(c) = self.advance() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn read_string(&mut self, pos: &SourcePos) -> Result<Token, ParseError> {
        self.advance(); // consume opening quote
        let mut result = String::new();
        while let Some(ch) = self.current() {
            if ch == '"' {
                self.advance();
                return Ok(Token::Str(result));
            } else if ch == '\\' {
                self.advance();
                match self.current() {
                    Some('n') => result.push('\n'),
                    Some('t') => result.push('\t'),
                    Some('\\') => result.push('\\'),
                    Some('"') => result.push('"'),
                    Some(c) => result.push(c),
                    None => {
                        return Err(ParseError::new(
                            "unexpected end of string",
                            Some(pos.clone()),
                        ))
                    }
                }
                self.advance();
            } else {
                result.push(ch);
                self.advance();
            }
        }
        Err(ParseError::new("unclosed string literal", Some(pos.clone())))
    }

    fn read_digits(
        &mut self,
        sign: i8,
        radix: u32,
        pos: &SourcePos,
    ) -> Result<Token, ParseError> {
        let mut digits = String::new();
        while let Some(c) = self.current() {
            if c.is_ascii_alphanumeric() {
                digits.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if digits.is_empty() {
            return Err(ParseError::new("expected digits", Some(pos.clone())));
        }
        match BigInt::parse_bytes(digits.as_bytes(), radix) {
            Some(n) => Ok(Token::Integer(if sign < 0 { -n } else { n })),
            None => Err(ParseError::new(
                format!("invalid radix-{} integer: {}", radix, digits),
                Some(pos.clone()),
            )),
        }
    }

    fn read_identifier(&mut self) -> Token {
        let mut result = String::new();
        while let Some(c) = self.current() {
            if is_subsequent(c) {
                result.push(c.to_ascii_lowercase());
                self.advance();
            } else {
                break;
            }
        }
        Token::Symbol(result)
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.current() {
            if c.is_ascii_alphabetic() {
                word.push(c.to_ascii_lowercase());
                self.advance();
            } else {
                break;
            }
        }
        word
    }

    fn read_hash(&mut self, pos: &SourcePos) -> Result<Token, ParseError> {
        self.advance(); // consume '#'
        match self.current() {
            Some(';') => {
                self.advance();
                return Ok(Token::DatumComment);
            }
            Some(c) if c.eq_ignore_ascii_case(&'t') && self.peek(1).map_or(true, |c| !c.is_ascii_alphanumeric()) => {
                self.advance();
                return Ok(Token::Boolean(true));
            }
            Some(c) if c.eq_ignore_ascii_case(&'f') && self.peek(1).map_or(true, |c| !c.is_ascii_alphanumeric()) => {
                self.advance();
                return Ok(Token::Boolean(false));
            }
            Some(c) if c.eq_ignore_ascii_case(&'i') => {
                let word = self.read_word();
                return match word.as_str() {
                    "inert" => Ok(Token::Inert),
                    "ignore" => Ok(Token::Ignore),
                    _ => Err(ParseError::new(
                        format!("unknown token #{}", word),
                        Some(pos.clone()),
                    )),
                };
            }
            _ => {}
        }

        // Exactness/radix prefixes, possibly chained like #e#x.
        let mut radix: Option<u32> = None;
        loop {
            match self.current().map(|c| c.to_ascii_lowercase()) {
                Some('e') => {
                    self.advance();
                }
                Some('b') => {
                    radix = Some(2);
                    self.advance();
                }
                Some('o') => {
                    radix = Some(8);
                    self.advance();
                }
                Some('d') => {
                    radix = Some(10);
                    self.advance();
                }
                Some('x') => {
                    radix = Some(16);
                    self.advance();
                }
                Some(c) => {
                    return Err(ParseError::new(
                        format!("unknown token #{}", c),
                        Some(pos.clone()),
                    ))
                }
                None => return Err(ParseError::new("unexpected end after #", Some(pos.clone()))),
            }
            if self.current() == Some('#') {
                self.advance();
                continue;
            }
            break;
        }

        let sign: i8 = match self.current() {
            Some('+') => {
                self.advance();
                1
            }
            Some('-') => {
                self.advance();
                -1
            }
            _ => 1,
        };
        if self.current().map_or(false, |c| c.is_ascii_alphabetic()) && radix != Some(16) {
            let word = self.read_word();
            if word == "infinity" {
                return Ok(if sign < 0 {
                    Token::NegativeInfinity
                } else {
                    Token::PositiveInfinity
                });
            }
            return Err(ParseError::new(
                format!("unknown token #{}", word),
                Some(pos.clone()),
            ));
        }
        self.read_digits(sign, radix.unwrap_or(10), pos)
    }

    pub fn next_token(&mut self) -> Result<(Token, SourcePos), ParseError> {
        self.skip_whitespace_and_comments();
        let pos = self.here();
        let token = match self.current() {
            None => Token::Eof,
            Some('(') => {
                self.advance();
                Token::LParen
            }
            Some(')') => {
                self.advance();
                Token::RParen
            }
            Some('"') => self.read_string(&pos)?,
            Some('#') => self.read_hash(&pos)?,
            Some('.') => {
                self.advance();
                if self.at_delimiter() {
                    Token::Dot
                } else {
                    return Err(ParseError::new("unexpected character after .", Some(pos)));
                }
            }
            Some(c @ ('+' | '-')) => {
                self.advance();
                if self.current().map_or(false, |c| c.is_ascii_digit()) {
                    self.read_digits(if c == '-' { -1 } else { 1 }, 10, &pos)?
                } else if self.at_delimiter() {
                    Token::Symbol(c.to_string())
                } else {
                    return Err(ParseError::new(
                        format!("unexpected character after {}", c),
                        Some(pos),
                    ));
                }
            }
            Some(c) if c.is_ascii_digit() => self.read_digits(1, 10, &pos)?,
            Some(c) if is_initial(c) => self.read_identifier(),
            Some(c) => {
                return Err(ParseError::new(
                    format!("unexpected character: '{}'", c),
                    Some(pos),
                ))
            }
        };
        Ok((token, pos))
    }

    pub fn tokenize(&mut self) -> Result<Vec<(Token, SourcePos)>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let entry = self.next_token()?;
            let done = entry.0 == Token::Eof;
            tokens.push(entry);
            if done {
                break;
            }
        }
        Ok(tokens)
    }
}

pub struct Parser {
    tokens: Vec<(Token, SourcePos)>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<(Token, SourcePos)>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|(t, _)| t)
            .unwrap_or(&Token::Eof)
    }

    fn current_pos(&self) -> Option<SourcePos> {
        self.tokens.get(self.pos).map(|(_, p)| p.clone())
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    /// Consume any number of `#;` markers, each cancelling the datum that
    /// follows it.
    fn skip_datum_comments(&mut self) -> Result<(), ParseError> {
        while self.current() == &Token::DatumComment {
            self.advance();
            self.parse_expr()?;
        }
        Ok(())
    }

    pub fn parse_expr(&mut self) -> Result<ValueRef, ParseError> {
        self.skip_datum_comments()?;
        let pos = self.current_pos();
        match self.current().clone() {
            Token::LParen => {
                self.advance();
                self.parse_list_tail(pos)
            }
            Token::Symbol(s) => {
                self.advance();
                Ok(symbol(intern(&s)))
            }
            Token::Str(s) => {
                self.advance();
                Ok(string(s))
            }
            Token::Integer(n) => {
                self.advance();
                Ok(integer(n))
            }
            Token::Boolean(b) => {
                self.advance();
                Ok(boolean(b))
            }
            Token::Inert => {
                self.advance();
                Ok(inert())
            }
            Token::Ignore => {
                self.advance();
                Ok(ignore())
            }
            Token::PositiveInfinity => {
                self.advance();
                Ok(positive_infinity())
            }
            Token::NegativeInfinity => {
                self.advance();
                Ok(negative_infinity())
            }
            Token::Dot => Err(ParseError::new("unexpected .", pos)),
            Token::RParen => Err(ParseError::new("unexpected )", pos)),
            Token::DatumComment => unreachable!("datum comments consumed above"),
            Token::Eof => Err(ParseError::new("unexpected end of input", pos)),
        }
    }

    fn parse_list_tail(&mut self, open_pos: Option<SourcePos>) -> Result<ValueRef, ParseError> {
        let mut elements: Vec<(ValueRef, Option<SourcePos>)> = Vec::new();
        let mut tail = nil();
        loop {
            self.skip_datum_comments()?;
            match self.current() {
                Token::RParen => {
                    self.advance();
                    break;
                }
                Token::Dot => {
                    if elements.is_empty() {
                        return Err(ParseError::new("unexpected .", self.current_pos()));
                    }
                    self.advance();
                    tail = self.parse_expr()?;
                    self.skip_datum_comments()?;
                    if self.current() != &Token::RParen {
                        return Err(ParseError::new(
                            "expected ) after dotted tail",
                            self.current_pos(),
                        ));
                    }
                    self.advance();
                    break;
                }
                Token::Eof => {
                    return Err(ParseError::new("unexpected EOF, expected )", open_pos))
                }
                _ => {
                    let pos = self.current_pos();
                    let expr = self.parse_expr()?;
                    elements.push((expr, pos));
                }
            }
        }
        let mut out = tail;
        let mut iter = elements.into_iter().rev().peekable();
        while let Some((expr, pos)) = iter.next() {
            // The outermost pair carries the open paren's position.
            let cell_pos = if iter.peek().is_none() {
                open_pos.clone().or(pos)
            } else {
                pos
            };
            out = cons_at(expr, out, cell_pos);
        }
        Ok(out)
    }

    pub fn parse(&mut self) -> Result<Vec<ValueRef>, ParseError> {
        let mut exprs = Vec::new();
        loop {
            self.skip_datum_comments()?;
            if self.current() == &Token::Eof {
                break;
            }
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }
}

/// Parse a whole source string into its top-level expressions.
pub fn parse_str(input: &str, file: Option<&str>) -> Result<Vec<ValueRef>, ParseError> {
    let tokens = Lexer::new(input, file).tokenize()?;
    Parser::new(tokens).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::Value;

    #[test]
    fn test_lexer_basic() {
        let tokens = Lexer::new("(+ 1 2)", None).tokenize().unwrap();
        assert_eq!(tokens.len(), 6); // (, +, 1, 2, ), EOF
        assert_eq!(tokens[1].0, Token::Symbol("+".to_string()));
    }

    #[test]
    fn test_parser_basic() {
        let exprs = parse_str("(+ 1 2)", None).unwrap();
        assert_eq!(exprs.len(), 1);
        assert_eq!(format!("{}", exprs[0]), "(+ 1 2)");
    }

    #[test]
    fn test_dotted_list() {
        let exprs = parse_str("(a b . c)", None).unwrap();
        assert_eq!(format!("{}", exprs[0]), "(a b . c)");
    }

    #[test]
    fn test_identifiers_are_downcased() {
        let exprs = parse_str("FooBar", None).unwrap();
        assert_eq!(format!("{}", exprs[0]), "foobar");
    }

    #[test]
    fn test_hash_tokens_case_insensitive() {
        let exprs = parse_str("#T #F #Inert #IGNORE", None).unwrap();
        assert!(matches!(&*exprs[0], Value::Boolean(true)));
        assert!(matches!(&*exprs[1], Value::Boolean(false)));
        assert!(matches!(&*exprs[2], Value::Inert));
        assert!(matches!(&*exprs[3], Value::Ignore));
    }

    #[test]
    fn test_radix_prefixes() {
        let exprs = parse_str("#x10 #b101 #o17 #d42 #e#xff", None).unwrap();
        assert!(matches!(&*exprs[0], Value::Fixnum(16)));
        assert!(matches!(&*exprs[1], Value::Fixnum(5)));
        assert!(matches!(&*exprs[2], Value::Fixnum(15)));
        assert!(matches!(&*exprs[3], Value::Fixnum(42)));
        assert!(matches!(&*exprs[4], Value::Fixnum(255)));
    }

    #[test]
    fn test_infinities() {
        let exprs = parse_str("#e+infinity #e-infinity", None).unwrap();
        assert!(matches!(&*exprs[0], Value::PositiveInfinity));
        assert!(matches!(&*exprs[1], Value::NegativeInfinity));
    }

    #[test]
    fn test_datum_comment() {
        let exprs = parse_str("(a #;(b c) d) #;e 1", None).unwrap();
        assert_eq!(exprs.len(), 2);
        assert_eq!(format!("{}", exprs[0]), "(a d)");
        assert!(matches!(&*exprs[1], Value::Fixnum(1)));
    }

    #[test]
    fn test_line_comments_and_negative_numbers() {
        let exprs = parse_str("; a comment\n-42 - +", None).unwrap();
        assert!(matches!(&*exprs[0], Value::Fixnum(-42)));
        assert_eq!(format!("{}", exprs[1]), "-");
        assert_eq!(format!("{}", exprs[2]), "+");
    }

    #[test]
    fn test_string_escapes() {
        let exprs = parse_str(r#""a\"b\n""#, None).unwrap();
        assert!(matches!(&*exprs[0], Value::String(s) if s == "a\"b\n"));
    }

    #[test]
    fn test_unclosed_list_is_an_error() {
        assert!(parse_str("(a b", None).is_err());
        assert!(parse_str("(a . b c)", None).is_err());
    }

    #[test]
    fn test_pairs_carry_positions() {
        let exprs = parse_str("\n  (f x)", None).unwrap();
        if let Value::Pair(p) = &*exprs[0] {
            let pos = p.pos.as_ref().unwrap();
            assert_eq!(pos.line, 2);
            assert_eq!(pos.column, 3);
        } else {
            unreachable!();
        }
    }

    #[test]
    fn test_huge_integers_become_bignums() {
        let exprs = parse_str("123456789012345678901234567890", None).unwrap();
        assert!(matches!(&*exprs[0], Value::Bignum(_)));
    }
}
