//! Tokenizer shared by the parser and the dependency scanner.

use super::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Text(String),
    Ident(String),
    /// An explicit-source prefix, colon already consumed (`rawinput:`).
    Namespace(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token's first character.
    pub pos: usize,
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, ParseError> {
    Lexer { src: src.as_bytes(), text: src, pos: 0 }.run()
}

struct Lexer<'a> {
    src: &'a [u8],
    text: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() {
                self.pos += 1;
                continue;
            }
            let start = self.pos;
            let kind = match c {
                b'0'..=b'9' | b'.' => self.number()?,
                b'"' | b'\'' => self.text_literal()?,
                c if is_ident_start(c) => self.word(),
                _ => self.symbol()?,
            };
            tokens.push(Token { kind, pos: start });
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.src.get(self.pos + ahead).copied()
    }

    fn number(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        let literal = &self.text[start..self.pos];
        literal
            .parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| ParseError::new(format!("invalid number '{}'", literal), start))
    }

    fn text_literal(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.pos;
        let quote = self.src[self.pos];
        self.pos += 1;
        let body_start = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                let body = self.text[body_start..self.pos].to_string();
                self.pos += 1;
                return Ok(TokenKind::Text(body));
            }
            self.pos += 1;
        }
        Err(ParseError::new("unterminated string literal", start))
    }

    /// Identifiers, or a namespace prefix when the word is immediately
    /// followed by a colon. Hyphenated prefixes (`peer-domain:`) must be
    /// lower-case so that `REVENUE-rawinput:ADJ` still lexes as a subtraction.
    fn word(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        let ident_end = self.pos;

        let mut end = ident_end;
        if is_lower_word(&self.src[start..ident_end]) {
            while self.src.get(end) == Some(&b'-') {
                let seg_start = end + 1;
                let mut seg_end = seg_start;
                while self.src.get(seg_end).is_some_and(|&c| is_lower_char(c)) {
                    seg_end += 1;
                }
                if seg_end == seg_start {
                    break;
                }
                end = seg_end;
            }
        }
        if self.src.get(end) == Some(&b':') {
            self.pos = end + 1;
            return TokenKind::Namespace(self.text[start..end].to_string());
        }
        TokenKind::Ident(self.text[start..ident_end].to_string())
    }

    fn symbol(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.pos;
        let c = self.src[self.pos];
        let next_is_eq = self.peek_at(1) == Some(b'=');
        let (kind, width) = match c {
            b'+' => (TokenKind::Plus, 1),
            b'-' => (TokenKind::Minus, 1),
            b'*' => (TokenKind::Star, 1),
            b'/' => (TokenKind::Slash, 1),
            b'^' => (TokenKind::Caret, 1),
            b'(' => (TokenKind::LParen, 1),
            b')' => (TokenKind::RParen, 1),
            b'[' => (TokenKind::LBracket, 1),
            b']' => (TokenKind::RBracket, 1),
            b',' => (TokenKind::Comma, 1),
            b'<' if next_is_eq => (TokenKind::Le, 2),
            b'<' => (TokenKind::Lt, 1),
            b'>' if next_is_eq => (TokenKind::Ge, 2),
            b'>' => (TokenKind::Gt, 1),
            b'=' if next_is_eq => (TokenKind::Eq, 2),
            b'=' => (TokenKind::Eq, 1),
            b'!' if next_is_eq => (TokenKind::Ne, 2),
            _ => {
                let ch = self.text[start..].chars().next().unwrap_or('?');
                return Err(ParseError::new(format!("unexpected character '{}'", ch), start));
            }
        };
        self.pos += width;
        Ok(kind)
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn is_lower_char(c: u8) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == b'_'
}

fn is_lower_word(word: &[u8]) -> bool {
    !word.is_empty() && word.iter().all(|&c| is_lower_char(c))
}
