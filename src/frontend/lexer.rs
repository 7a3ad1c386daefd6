use std::{collections::BTreeMap, iter::Peekable, str::Chars, str::FromStr};

use once_cell::sync::Lazy;
use strum::EnumString;

use crate::{diagnostics::Diagnostics, frontend::SourceFile};

#[derive(Debug, Clone, Copy)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// 1-based source line the token starts on
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /* Words */
    Keyword(Keyword), // fn
    Identifier,       // main

    /* Literals */
    IntegerLiteral, // 1

    /* Delimiters */
    OpenParen,  // (
    CloseParen, // )
    OpenBrace,  // {
    CloseBrace, // }
    Semicolon,  // ;
    Comma,      // ,

    /* Binary Ops */
    Asterisk,     // *
    Plus,         // +
    LessThan,     // <
    DoubleEquals, // ==

    /* Assignment */
    Equals, // =
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Keyword {
    Fn,
    Let,
    If,
    Else,
    Loop,
    Break,
    Return,
}

/// Table of single char tokens (matched after longer sequences are checked for)
static SINGLE_TOKENS: Lazy<BTreeMap<char, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ('(', TokenKind::OpenParen),
        (')', TokenKind::CloseParen),
        ('{', TokenKind::OpenBrace),
        ('}', TokenKind::CloseBrace),
        (';', TokenKind::Semicolon),
        (',', TokenKind::Comma),
        ('*', TokenKind::Asterisk),
        ('+', TokenKind::Plus),
        ('<', TokenKind::LessThan),
        ('=', TokenKind::Equals),
    ])
});

#[derive(Debug, Clone, Copy)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

#[derive(Debug)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    chars: Peekable<Chars<'source>>,
    position: usize,
    line: u32,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            chars: source.contents.chars().peekable(),
            position: 0,
            line: 1,
        }
    }

    /// Lexes the whole source up front. Unknown characters are reported and
    /// skipped so the parser always gets a token stream.
    pub fn tokenize(source: &'source SourceFile, diagnostics: &mut Diagnostics) -> Vec<Token> {
        let mut lexer = Self::new(source);
        let mut tokens = Vec::new();

        while let Some(token) = lexer.next_token(diagnostics) {
            tokens.push(token);
        }

        tokens
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;

        self.position += c.len_utf8();

        if c == '\n' {
            self.line += 1;
        }

        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(c) = self.chars.peek().copied() {
            if c.is_ascii_whitespace() {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.chars.peek().copied() {
                    if c == '\n' {
                        break;
                    }

                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self, diagnostics: &mut Diagnostics) -> Option<Token> {
        self.skip_whitespace_and_comments();

        let c = self.chars.peek().copied()?;
        let start = self.position;
        let line = self.line;

        let kind = if c.is_ascii_digit() {
            while self
                .chars
                .peek()
                .is_some_and(|c| c.is_ascii_digit())
            {
                self.bump();
            }

            TokenKind::IntegerLiteral
        } else if c.is_ascii_alphabetic() || c == '_' {
            while self
                .chars
                .peek()
                .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_')
            {
                self.bump();
            }

            let word = &self.source.contents[start..self.position];

            match Keyword::from_str(word) {
                Ok(keyword) => TokenKind::Keyword(keyword),
                Err(_) => TokenKind::Identifier,
            }
        } else if c == '=' {
            self.bump();

            if self.chars.peek() == Some(&'=') {
                self.bump();
                TokenKind::DoubleEquals
            } else {
                TokenKind::Equals
            }
        } else if let Some(kind) = SINGLE_TOKENS.get(&c).copied() {
            self.bump();
            kind
        } else {
            diagnostics.report(line, format!("unexpected character '{c}'"));
            self.bump();
            return self.next_token(diagnostics);
        };

        Some(Token {
            kind,
            span: Span::new(start, self.position),
            line,
        })
    }
}
