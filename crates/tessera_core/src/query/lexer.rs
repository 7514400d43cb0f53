//! Tokenizer for predicate strings.

use crate::error::{CoreError, CoreResult};
use crate::value::Timestamp;
use chrono::{NaiveDate, TimeZone, Utc};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Ident(String),
    /// `@links`, `@count`, `@size`.
    At(String),
    Int(i64),
    Float(f64),
    Str(String),
    Date(Timestamp),
    Arg(usize),
    True,
    False,
    Null,
    TruePredicate,
    FalsePredicate,
    Dot,
    LParen,
    RParen,
    Minus,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    BeginsWith,
    EndsWith,
    Contains,
    Like,
    /// `[c]`
    CaseInsensitive,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub offset: usize,
    /// Source text of the token.
    pub text: String,
}

pub(crate) fn tokenize(input: &str) -> CoreResult<Vec<Token>> {
    let mut lexer = Lexer {
        input,
        bytes: input.as_bytes(),
        pos: 0,
    };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn error(&self, start: usize, message: impl Into<String>) -> CoreError {
        let end = self.input[start..]
            .char_indices()
            .nth(1)
            .map_or(self.input.len(), |(i, _)| start + i)
            .max(self.pos.min(self.input.len()));
        CoreError::predicate_syntax(&self.input[start..end], start, message)
    }

    fn token(&self, kind: TokenKind, start: usize) -> Token {
        Token {
            kind,
            offset: start,
            text: self.input[start..self.pos].to_string(),
        }
    }

    fn next_token(&mut self) -> CoreResult<Token> {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
        let start = self.pos;
        let Some(b) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                offset: start,
                text: String::new(),
            });
        };

        let kind = match b {
            b'(' => self.single(TokenKind::LParen),
            b')' => self.single(TokenKind::RParen),
            b'.' => self.single(TokenKind::Dot),
            b'-' => self.single(TokenKind::Minus),
            b'=' => match self.peek_at(1) {
                Some(b'=') => self.double(TokenKind::Eq),
                Some(b'<') => self.double(TokenKind::Le),
                Some(b'>') => self.double(TokenKind::Ge),
                _ => self.single(TokenKind::Eq),
            },
            b'!' => match self.peek_at(1) {
                Some(b'=') => self.double(TokenKind::Ne),
                _ => self.single(TokenKind::Not),
            },
            b'<' => match self.peek_at(1) {
                Some(b'=') => self.double(TokenKind::Le),
                Some(b'>') => self.double(TokenKind::Ne),
                _ => self.single(TokenKind::Lt),
            },
            b'>' => match self.peek_at(1) {
                Some(b'=') => self.double(TokenKind::Ge),
                _ => self.single(TokenKind::Gt),
            },
            b'&' if self.peek_at(1) == Some(b'&') => self.double(TokenKind::And),
            b'|' if self.peek_at(1) == Some(b'|') => self.double(TokenKind::Or),
            b'[' => self.modifier(start)?,
            b'\'' | b'"' => self.string(start, b)?,
            b'$' => self.argument(start)?,
            b'@' => {
                self.pos += 1;
                let word = self.word().to_string();
                if word.is_empty() {
                    return Err(self.error(start, "expected a keyword after '@'"));
                }
                TokenKind::At(word)
            }
            b'0'..=b'9' => self.number_or_date(start)?,
            b if b.is_ascii_alphabetic() || b == b'_' => {
                let word = self.word();
                keyword(word).unwrap_or_else(|| TokenKind::Ident(word.to_string()))
            }
            _ => return Err(self.error(start, "unexpected character")),
        };
        Ok(self.token(kind, start))
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn double(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 2;
        kind
    }

    fn word(&mut self) -> &'a str {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    fn digits(&mut self) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    fn modifier(&mut self, start: usize) -> CoreResult<TokenKind> {
        if matches!(self.peek_at(1), Some(b'c' | b'C')) && self.peek_at(2) == Some(b']') {
            self.pos += 3;
            Ok(TokenKind::CaseInsensitive)
        } else {
            Err(self.error(start, "expected '[c]'"))
        }
    }

    fn argument(&mut self, start: usize) -> CoreResult<TokenKind> {
        self.pos += 1;
        let digits = self.digits();
        digits
            .parse()
            .map(TokenKind::Arg)
            .map_err(|_| self.error(start, "expected an argument index after '$'"))
    }

    fn string(&mut self, start: usize, quote: u8) -> CoreResult<TokenKind> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            let Some(c) = self.input[self.pos..].chars().next() else {
                return Err(self.error(start, "unterminated string literal"));
            };
            self.pos += c.len_utf8();
            match c {
                c if c as u32 == u32::from(quote) => return Ok(TokenKind::Str(out)),
                '\\' => {
                    let Some(escaped) = self.input[self.pos..].chars().next() else {
                        return Err(self.error(start, "unterminated string literal"));
                    };
                    self.pos += escaped.len_utf8();
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                }
                c => out.push(c),
            }
        }
    }

    /// Numbers, and dates when four digits are followed by `-<digit>`.
    fn number_or_date(&mut self, start: usize) -> CoreResult<TokenKind> {
        let int_part = self.digits().len();
        if int_part == 4
            && self.peek() == Some(b'-')
            && self.peek_at(1).is_some_and(|b| b.is_ascii_digit())
        {
            return self.date(start);
        }

        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            self.digits();
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some(b'+' | b'-')));
            if self.peek_at(1 + sign).is_some_and(|b| b.is_ascii_digit()) {
                is_float = true;
                self.pos += 1 + sign;
                self.digits();
            }
        }

        let text = &self.input[start..self.pos];
        if is_float {
            text.parse()
                .map(TokenKind::Float)
                .map_err(|_| self.error(start, "invalid number"))
        } else {
            text.parse()
                .map(TokenKind::Int)
                .map_err(|_| self.error(start, "integer literal out of range"))
        }
    }

    /// `YYYY-MM-DD`, optionally followed by `@HH:MM:SS` or `THH:MM:SS`
    /// and an optional `:NANOS`.
    fn date(&mut self, start: usize) -> CoreResult<TokenKind> {
        let mut fields = vec![self.input[start..self.pos].to_string()];
        for _ in 0..2 {
            if self.peek() != Some(b'-') {
                return Err(self.error(start, "malformed date literal"));
            }
            self.pos += 1;
            fields.push(self.digits().to_string());
        }

        let mut time = Vec::new();
        if matches!(self.peek(), Some(b'@' | b'T')) && self.peek_at(1).is_some_and(|b| b.is_ascii_digit())
        {
            self.pos += 1;
            time.push(self.digits().to_string());
            while self.peek() == Some(b':') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
                time.push(self.digits().to_string());
            }
            if !(3..=4).contains(&time.len()) {
                return Err(self.error(start, "date literal time must be HH:MM:SS[:NANOS]"));
            }
        }

        let num = parse_u32;
        let year = fields[0].parse::<i32>().ok();
        let timestamp = (|| {
            let date = NaiveDate::from_ymd_opt(year?, num(&fields[1])?, num(&fields[2])?)?;
            let (h, m, s, n) = match time.as_slice() {
                [] => (0, 0, 0, 0),
                [h, m, s] => (num(h)?, num(m)?, num(s)?, 0),
                [h, m, s, n] => (num(h)?, num(m)?, num(s)?, num(n)?),
                _ => return None,
            };
            let naive = date.and_hms_nano_opt(h, m, s, n)?;
            Some(Utc.from_utc_datetime(&naive))
        })();

        timestamp
            .map(TokenKind::Date)
            .ok_or_else(|| self.error(start, "invalid date literal"))
    }
}

fn parse_u32(s: &str) -> Option<u32> {
    s.parse().ok()
}

fn keyword(word: &str) -> Option<TokenKind> {
    let kind = match word.to_ascii_uppercase().as_str() {
        "AND" => TokenKind::And,
        "OR" => TokenKind::Or,
        "NOT" => TokenKind::Not,
        "TRUE" => TokenKind::True,
        "FALSE" => TokenKind::False,
        "NULL" | "NIL" => TokenKind::Null,
        "TRUEPREDICATE" => TokenKind::TruePredicate,
        "FALSEPREDICATE" => TokenKind::FalsePredicate,
        "BEGINSWITH" => TokenKind::BeginsWith,
        "ENDSWITH" => TokenKind::EndsWith,
        "CONTAINS" => TokenKind::Contains,
        "LIKE" => TokenKind::Like,
        _ => return None,
    };
    Some(kind)
}
