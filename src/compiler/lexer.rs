use derive_more::From;
use thiserror::Error;

use crate::compiler::{
    reader::Reader,
    source::{FileId, SourceRange},
};

/// A single lexed token.
///
/// Tokens never own text; the source slice is recovered from the range, so
/// concatenating every token's slice in order reproduces the input verbatim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub range: SourceRange,
}

impl Token {
    pub fn slice<'code>(&self, code: &'code str) -> &'code str {
        &code[self.range.start.index..self.range.end.index]
    }

    /// Whether this token touches `other` with no bytes in between.
    pub fn touches(&self, other: &Token) -> bool {
        self.range.end.index == other.range.start.index
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexError {
    #[error("unrecognized input")]
    UnrecognizedInput,
    #[error("unexpected end of string")]
    UnexpectedEndOfString,
}

/// A [`LexError`] paired with the range it covers.
///
/// Unrecognized input spans the whole contiguous run of bad bytes; an
/// unterminated string is anchored at its opening quote.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{error}")]
pub struct LocatedLexError {
    pub error: LexError,
    pub range: SourceRange,
}

macro_rules! tokens {
    ( $( $( #[$attr:meta] )* enum $T:ident { $( $Variant:ident = $name:literal, )* } )* ) => { $(
        $( #[$attr] )*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
        pub enum $T {
            $( $Variant, )*
        }

        impl $T {
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$Variant => $name, )*
                }
            }
        }
    )* };
}

tokens! {

/// Keywords of the NL language.
///
/// A keyword is only recognized when the following byte cannot continue an
/// identifier, so `constant` lexes as a single identifier.
enum KeywordToken {
    Const = "`const`",
    Proc = "`proc`",
    Is = "`is`",
    Recursive = "`recursive`",
    EntryPoint = "`entry_point`",
    Param = "`param`",
    Returns = "`returns`",
    Begin = "`begin`",
    Return = "`return`",
    Then = "`then`",
    Else = "`else`",
    End = "`end`",
    Mut = "`mut`",
    Imm = "`imm`",
    Or = "`or`",
    And = "`and`",
    Not = "`not`",
}

/// Punctuation tokens, including the multi character operators.
enum PunctuationToken {
    Shl = "`<<`",
    Shr = "`>>`",
    EqEq = "`==`",
    Ne = "`!=`",
    Le = "`<=`",
    Ge = "`>=`",
    Plus = "`+`",
    Minus = "`-`",
    Star = "`*`",
    Slash = "`/`",
    Percent = "`%`",
    Tilde = "`~`",
    Amp = "`&`",
    Pipe = "`|`",
    Caret = "`^`",
    Lt = "`<`",
    Gt = "`>`",
    Eq = "`=`",
    Bang = "`!`",
    Comma = "`,`",
    Semi = "`;`",
    Colon = "`:`",
    Hash = "`#`",
    LParen = "`(`",
    RParen = "`)`",
}

}

impl PunctuationToken {
    /// Byte length of the punctuation in source text.
    fn len(self) -> usize {
        // The display name wraps the raw text in backquotes.
        self.name().len() - 2
    }
}

/// All token kinds the lexer can produce.
///
/// Whitespace, comments and documentation are real tokens rather than being
/// dropped, so the parser can skip them explicitly and attach documentation
/// to the statement that follows it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, From)]
pub enum TokenKind {
    Whitespace,
    Comment,
    Documentation,
    Identifier,
    Integer,
    String,
    Keyword(KeywordToken),
    Punctuation(PunctuationToken),
}

impl TokenKind {
    /// A human readable name for error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Whitespace => "whitespace",
            Self::Comment => "comment",
            Self::Documentation => "documentation",
            Self::Identifier => "identifier",
            Self::Integer => "integer",
            Self::String => "string",
            Self::Keyword(keyword) => keyword.name(),
            Self::Punctuation(punctuation) => punctuation.name(),
        }
    }

    /// Whether the parser skips over this kind without looking at it.
    pub fn is_trivia(self) -> bool {
        matches!(self, Self::Whitespace | Self::Comment | Self::Documentation)
    }
}

/// Streaming lexer over a single source file.
///
/// Each [`Lexer::next_token`] call produces one token or one error; after an
/// error the cursor has advanced past the offending bytes, so lexing can
/// resume with the next call.
#[derive(Clone, Copy, Debug)]
pub struct Lexer<'code> {
    reader: Reader<'code>,
}

impl<'code> Lexer<'code> {
    pub fn new(code: &'code str, file: FileId) -> Self {
        Self {
            reader: Reader::new(code.as_bytes(), file),
        }
    }

    pub fn is_eof(&self) -> bool {
        self.reader.is_eof()
    }

    /// Lexes the next token, or [`None`] at the end of the code.
    pub fn next_token(&mut self) -> Result<Option<Token>, LocatedLexError> {
        let Some(byte) = self.reader.peek(0) else {
            return Ok(None);
        };

        if byte.is_ascii_whitespace() {
            return Ok(Some(
                self.lex_run(TokenKind::Whitespace, |b| b.is_ascii_whitespace()),
            ));
        }
        if self.starts_with(b"//") {
            let kind = if self.starts_with(b"///") {
                TokenKind::Documentation
            } else {
                TokenKind::Comment
            };
            return Ok(Some(self.lex_run(kind, |b| b != b'\n')));
        }
        if byte == b'"' {
            return self.lex_string().map(Some);
        }
        if byte.is_ascii_digit() {
            return Ok(Some(self.lex_run(TokenKind::Integer, |b| b.is_ascii_digit())));
        }
        if byte.is_ascii_alphabetic() || byte == b'_' {
            return Ok(Some(self.lex_word()));
        }
        if let Some(token) = self.lex_punctuation() {
            return Ok(Some(token));
        }

        Err(self.lex_unrecognized())
    }

    fn starts_with(&self, prefix: &[u8]) -> bool {
        prefix
            .iter()
            .enumerate()
            .all(|(offset, &byte)| self.reader.peek(offset) == Some(byte))
    }

    /// Lexes a maximal run of bytes matching `continues`.
    fn lex_run(&mut self, kind: TokenKind, continues: impl Fn(u8) -> bool) -> Token {
        let start = self.reader.location();
        while self.reader.peek(0).is_some_and(&continues) {
            self.reader.advance(1);
        }
        Token {
            kind,
            range: self.reader.range_from(start),
        }
    }

    fn lex_string(&mut self) -> Result<Token, LocatedLexError> {
        let start = self.reader.location();
        self.reader.advance(1);
        let after_quote = self.reader.location();
        loop {
            match self.reader.peek(0) {
                Some(b'"') => {
                    self.reader.advance(1);
                    return Ok(Token {
                        kind: TokenKind::String,
                        range: self.reader.range_from(start),
                    });
                }
                Some(_) => self.reader.advance(1),
                None => {
                    return Err(LocatedLexError {
                        error: LexError::UnexpectedEndOfString,
                        range: SourceRange::new(start, after_quote),
                    })
                }
            }
        }
    }

    fn lex_word(&mut self) -> Token {
        let start = self.reader.location();
        let start_index = self.reader.index();
        while self
            .reader
            .peek(0)
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.reader.advance(1);
        }
        let kind = keyword_token(self.reader.slice_from(start_index))
            .map_or(TokenKind::Identifier, TokenKind::from);
        Token {
            kind,
            range: self.reader.range_from(start),
        }
    }

    fn lex_punctuation(&mut self) -> Option<Token> {
        let start = self.reader.location();
        let punctuation = punctuation_token(
            self.reader.peek(0).expect("caller should have peeked"),
            self.reader.peek(1),
        )?;
        self.reader.advance(punctuation.len());
        Some(Token {
            kind: punctuation.into(),
            range: self.reader.range_from(start),
        })
    }

    /// Coalesces a contiguous run of bytes that cannot start any token into
    /// a single error.
    fn lex_unrecognized(&mut self) -> LocatedLexError {
        let start = self.reader.location();
        while self
            .reader
            .peek(0)
            .is_some_and(|byte| !starts_token(byte, self.reader.peek(1)))
        {
            self.reader.advance(1);
        }
        LocatedLexError {
            error: LexError::UnrecognizedInput,
            range: self.reader.range_from(start),
        }
    }
}

fn keyword_token(word: &[u8]) -> Option<KeywordToken> {
    macro_rules! keywords {
        ( $( $string:literal => $Keyword:ident, )* ) => {
            $( if word == $string.as_bytes() {
                Some(KeywordToken::$Keyword)
            } else )+ {
                None
            }
        };
    }

    keywords! {
        "const" => Const,
        "proc" => Proc,
        "is" => Is,
        "recursive" => Recursive,
        "entry_point" => EntryPoint,
        "param" => Param,
        "returns" => Returns,
        "begin" => Begin,
        "return" => Return,
        "then" => Then,
        "else" => Else,
        "end" => End,
        "mut" => Mut,
        "imm" => Imm,
        "or" => Or,
        "and" => And,
        "not" => Not,
    }
}

fn punctuation_token(byte: u8, next: Option<u8>) -> Option<PunctuationToken> {
    use PunctuationToken::*;
    Some(match (byte, next) {
        (b'<', Some(b'<')) => Shl,
        (b'>', Some(b'>')) => Shr,
        (b'=', Some(b'=')) => EqEq,
        (b'!', Some(b'=')) => Ne,
        (b'<', Some(b'=')) => Le,
        (b'>', Some(b'=')) => Ge,
        (b'+', _) => Plus,
        (b'-', _) => Minus,
        (b'*', _) => Star,
        (b'/', _) => Slash,
        (b'%', _) => Percent,
        (b'~', _) => Tilde,
        (b'&', _) => Amp,
        (b'|', _) => Pipe,
        (b'^', _) => Caret,
        (b'<', _) => Lt,
        (b'>', _) => Gt,
        (b'=', _) => Eq,
        (b'!', _) => Bang,
        (b',', _) => Comma,
        (b';', _) => Semi,
        (b':', _) => Colon,
        (b'#', _) => Hash,
        (b'(', _) => LParen,
        (b')', _) => RParen,
        _ => return None,
    })
}

fn starts_token(byte: u8, next: Option<u8>) -> bool {
    byte.is_ascii_whitespace()
        || byte.is_ascii_alphanumeric()
        || byte == b'_'
        || byte == b'"'
        || punctuation_token(byte, next).is_some()
}

/// Lexes the whole input, collecting tokens and errors separately.
///
/// Mostly useful for tests and for the token print flag; the parser pulls
/// tokens one at a time instead.
pub fn lex_all(code: &str, file: FileId) -> (Vec<Token>, Vec<LocatedLexError>) {
    let mut lexer = Lexer::new(code, file);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    loop {
        match lexer.next_token() {
            Ok(Some(token)) => tokens.push(token),
            Ok(None) => break,
            Err(error) => errors.push(error),
        }
    }
    (tokens, errors)
}
