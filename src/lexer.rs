//! The bytes → tokens boundary: an incremental JSON tokenizer.
//!
//! Input may arrive in arbitrary chunks; strings, numbers, literals, escape
//! sequences and multi-byte UTF-8 characters are all safe to split across
//! chunk boundaries. The option knobs choose streamed and/or packed forms
//! per token class; [`LexerOptions::big_string`] is the profile for
//! documents dominated by one large string per entry (streamed strings,
//! packed keys and numbers).
//!
//! Unlike the in-core trackers, this is an input-validating boundary:
//! malformed JSON text surfaces as [`LexError`], not a panic.

use async_stream::stream;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::{pin_mut, StreamExt};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::trace;

use crate::error::{LexError, PipelineError};
use crate::token::{Token, TokenResult};

/// Which token forms the lexer emits per class. At least one form per class
/// is enforced at construction (packed wins when both are off).
#[derive(Debug, Clone, Copy)]
pub struct LexerOptions {
    pub stream_keys: bool,
    pub pack_keys: bool,
    pub stream_strings: bool,
    pub pack_strings: bool,
    pub stream_numbers: bool,
    pub pack_numbers: bool,
}

impl Default for LexerOptions {
    /// Both forms for every class; the most general stream, at the cost of
    /// buffering each scalar whole.
    fn default() -> Self {
        Self {
            stream_keys: true,
            pack_keys: true,
            stream_strings: true,
            pack_strings: true,
            stream_numbers: true,
            pack_numbers: true,
        }
    }
}

impl LexerOptions {
    /// The "big string" profile: strings streamed in chunks and never
    /// packed, keys and numbers packed only. Minimal memory for documents
    /// dominated by one large string per entry.
    pub fn big_string() -> Self {
        Self {
            stream_keys: false,
            pack_keys: true,
            stream_strings: true,
            pack_strings: false,
            stream_numbers: false,
            pack_numbers: true,
        }
    }

    /// Packed-only for every class.
    pub fn packed() -> Self {
        Self {
            stream_keys: false,
            pack_keys: true,
            stream_strings: false,
            pack_strings: true,
            stream_numbers: false,
            pack_numbers: true,
        }
    }

    fn normalized(mut self) -> Self {
        if !self.stream_keys && !self.pack_keys {
            self.pack_keys = true;
        }
        if !self.stream_strings && !self.pack_strings {
            self.pack_strings = true;
        }
        if !self.stream_numbers && !self.pack_numbers {
            self.pack_numbers = true;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Container {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    /// Expecting a value.
    Value,
    /// Expecting a value or the end of an empty array.
    FirstValueOrEnd,
    /// Expecting a key or the end of an empty object.
    FirstKeyOrEnd,
    /// Expecting a key.
    Key,
    /// Expecting the colon after a key.
    Colon,
    /// Expecting a comma or the container's end.
    AfterValue,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Scalar {
    None,
    Str { is_key: bool },
    StrEscape { is_key: bool },
    StrUnicode { is_key: bool, digits: u8, code: u32 },
    Number,
    Literal { text: &'static str, matched: usize },
}

/// Incremental JSON tokenizer. Feed with [`write`](Lexer::write), terminate
/// with [`finish`](Lexer::finish).
#[derive(Debug)]
pub struct Lexer {
    options: LexerOptions,
    mode: Mode,
    scalar: Scalar,
    stack: Vec<Container>,
    /// Current streamed chunk segment, flushed at each write boundary.
    chunk_buf: String,
    /// Whole scalar text, kept when packing (and always for numbers, which
    /// are validated at their end).
    value_buf: String,
    pending_surrogate: Option<u16>,
    /// Incomplete UTF-8 tail carried to the next write.
    pending_utf8: Vec<u8>,
    offset: u64,
}

impl Lexer {
    pub fn new(options: LexerOptions) -> Self {
        Self {
            options: options.normalized(),
            mode: Mode::Value,
            scalar: Scalar::None,
            stack: Vec::new(),
            chunk_buf: String::new(),
            value_buf: String::new(),
            pending_surrogate: None,
            pending_utf8: Vec::new(),
            offset: 0,
        }
    }

    /// Tokenize one chunk of input. Streamed scalars spanning the boundary
    /// emit a chunk token now and continue in the next write.
    pub fn write(&mut self, chunk: &[u8]) -> Result<Vec<Token>, LexError> {
        let mut out = Vec::new();
        let data = if self.pending_utf8.is_empty() {
            ChunkData::Borrowed(chunk)
        } else {
            let mut owned = std::mem::take(&mut self.pending_utf8);
            owned.extend_from_slice(chunk);
            ChunkData::Owned(owned)
        };
        let bytes = data.as_slice();
        let (text, rest) = match std::str::from_utf8(bytes) {
            Ok(text) => (text, &[][..]),
            Err(e) => {
                let valid = e.valid_up_to();
                if e.error_len().is_some() {
                    return Err(self.err("invalid UTF-8"));
                }
                // Incomplete trailing sequence; carry it over.
                let (head, tail) = bytes.split_at(valid);
                (std::str::from_utf8(head).expect("validated prefix"), tail)
            }
        };
        for c in text.chars() {
            self.consume_char(c, &mut out)?;
        }
        self.pending_utf8 = rest.to_vec();
        self.flush_chunk(&mut out);
        trace!(target: "jsonflow::lexer", bytes = chunk.len(), tokens = out.len(), "lexed chunk");
        Ok(out)
    }

    /// Signal end of input. Fails if a value, container or escape is still
    /// open.
    pub fn finish(&mut self) -> Result<Vec<Token>, LexError> {
        let mut out = Vec::new();
        if self.scalar == Scalar::Number {
            self.end_number(&mut out)?;
        }
        if self.scalar != Scalar::None {
            return Err(self.err("unexpected end of input inside a scalar"));
        }
        if !self.pending_utf8.is_empty() {
            return Err(self.err("unexpected end of input inside a UTF-8 sequence"));
        }
        if !self.stack.is_empty() {
            return Err(self.err("unexpected end of input inside a container"));
        }
        if self.mode != Mode::Value {
            return Err(self.err("unexpected end of input"));
        }
        Ok(out)
    }

    fn consume_char(&mut self, c: char, out: &mut Vec<Token>) -> Result<(), LexError> {
        let consumed = self.consume_scalar_char(c, out)?;
        if !consumed {
            self.consume_grammar_char(c, out)?;
        }
        self.offset += c.len_utf8() as u64;
        Ok(())
    }

    /// Returns true when the character belonged to the scalar in progress. A
    /// number is the one scalar with no terminator of its own: its first
    /// non-number character falls through to the grammar.
    fn consume_scalar_char(&mut self, c: char, out: &mut Vec<Token>) -> Result<bool, LexError> {
        match self.scalar {
            Scalar::None => Ok(false),
            Scalar::Str { is_key } => {
                if self.pending_surrogate.is_some() && c != '\\' {
                    return Err(self.err("unpaired surrogate escape"));
                }
                match c {
                    '"' => self.end_string(is_key, out)?,
                    '\\' => self.scalar = Scalar::StrEscape { is_key },
                    _ if (c as u32) < 0x20 => {
                        return Err(self.err("unescaped control character in string"));
                    }
                    _ => self.push_scalar_char(c, is_key),
                }
                Ok(true)
            }
            Scalar::StrEscape { is_key } => {
                if self.pending_surrogate.is_some() && c != 'u' {
                    return Err(self.err("unpaired surrogate escape"));
                }
                let decoded = match c {
                    '"' => Some('"'),
                    '\\' => Some('\\'),
                    '/' => Some('/'),
                    'b' => Some('\u{8}'),
                    'f' => Some('\u{c}'),
                    'n' => Some('\n'),
                    'r' => Some('\r'),
                    't' => Some('\t'),
                    'u' => None,
                    _ => return Err(self.err("invalid escape sequence")),
                };
                match decoded {
                    Some(ch) => {
                        self.push_scalar_char(ch, is_key);
                        self.scalar = Scalar::Str { is_key };
                    }
                    None => {
                        self.scalar = Scalar::StrUnicode {
                            is_key,
                            digits: 0,
                            code: 0,
                        };
                    }
                }
                Ok(true)
            }
            Scalar::StrUnicode {
                is_key,
                digits,
                code,
            } => {
                let digit = c
                    .to_digit(16)
                    .ok_or_else(|| self.err("invalid unicode escape digit"))?;
                let code = (code << 4) | digit;
                if digits + 1 < 4 {
                    self.scalar = Scalar::StrUnicode {
                        is_key,
                        digits: digits + 1,
                        code,
                    };
                    return Ok(true);
                }
                let unit = code as u16;
                match self.pending_surrogate.take() {
                    Some(high) => {
                        if !(0xDC00..=0xDFFF).contains(&unit) {
                            return Err(self.err("invalid low surrogate"));
                        }
                        let combined = 0x10000
                            + (((high as u32) - 0xD800) << 10)
                            + ((unit as u32) - 0xDC00);
                        let ch = char::from_u32(combined)
                            .ok_or_else(|| self.err("invalid surrogate pair"))?;
                        self.push_scalar_char(ch, is_key);
                    }
                    None if (0xD800..=0xDBFF).contains(&unit) => {
                        self.pending_surrogate = Some(unit);
                    }
                    None if (0xDC00..=0xDFFF).contains(&unit) => {
                        return Err(self.err("unpaired low surrogate"));
                    }
                    None => {
                        let ch = char::from_u32(code)
                            .ok_or_else(|| self.err("invalid unicode escape"))?;
                        self.push_scalar_char(ch, is_key);
                    }
                }
                self.scalar = Scalar::Str { is_key };
                Ok(true)
            }
            Scalar::Number => {
                if matches!(c, '0'..='9' | '-' | '+' | '.' | 'e' | 'E') {
                    if self.options.stream_numbers {
                        self.chunk_buf.push(c);
                    }
                    self.value_buf.push(c);
                    Ok(true)
                } else {
                    self.end_number(out)?;
                    Ok(false)
                }
            }
            Scalar::Literal { text, matched } => {
                let expected = text.as_bytes()[matched] as char;
                if c != expected {
                    return Err(self.err("invalid literal"));
                }
                if matched + 1 == text.len() {
                    out.push(match text {
                        "true" => Token::TrueValue,
                        "false" => Token::FalseValue,
                        _ => Token::NullValue,
                    });
                    self.scalar = Scalar::None;
                    self.after_value();
                } else {
                    self.scalar = Scalar::Literal {
                        text,
                        matched: matched + 1,
                    };
                }
                Ok(true)
            }
        }
    }

    fn consume_grammar_char(&mut self, c: char, out: &mut Vec<Token>) -> Result<(), LexError> {
        if matches!(c, ' ' | '\t' | '\n' | '\r') {
            return Ok(());
        }
        match self.mode {
            Mode::Value | Mode::FirstValueOrEnd => match c {
                '{' => {
                    out.push(Token::StartObject);
                    self.stack.push(Container::Object);
                    self.mode = Mode::FirstKeyOrEnd;
                    Ok(())
                }
                '[' => {
                    out.push(Token::StartArray);
                    self.stack.push(Container::Array);
                    self.mode = Mode::FirstValueOrEnd;
                    Ok(())
                }
                ']' if self.mode == Mode::FirstValueOrEnd => self.close_container(c, out),
                '"' => {
                    self.begin_string(false, out);
                    Ok(())
                }
                '-' | '0'..='9' => {
                    self.begin_number(c);
                    Ok(())
                }
                't' => self.begin_literal("true"),
                'f' => self.begin_literal("false"),
                'n' => self.begin_literal("null"),
                _ => Err(self.err("unexpected character, expected a value")),
            },
            Mode::FirstKeyOrEnd => match c {
                '}' => self.close_container(c, out),
                '"' => {
                    self.begin_string(true, out);
                    Ok(())
                }
                _ => Err(self.err("unexpected character, expected a key or '}'")),
            },
            Mode::Key => match c {
                '"' => {
                    self.begin_string(true, out);
                    Ok(())
                }
                _ => Err(self.err("unexpected character, expected a key")),
            },
            Mode::Colon => match c {
                ':' => {
                    self.mode = Mode::Value;
                    Ok(())
                }
                _ => Err(self.err("unexpected character, expected ':'")),
            },
            Mode::AfterValue => match (c, self.stack.last()) {
                (',', Some(Container::Object)) => {
                    self.mode = Mode::Key;
                    Ok(())
                }
                (',', Some(Container::Array)) => {
                    self.mode = Mode::Value;
                    Ok(())
                }
                ('}', Some(Container::Object)) | (']', Some(Container::Array)) => {
                    self.close_container(c, out)
                }
                _ => Err(self.err("unexpected character, expected ',' or a container end")),
            },
        }
    }

    fn begin_string(&mut self, is_key: bool, out: &mut Vec<Token>) {
        if is_key && self.options.stream_keys {
            out.push(Token::StartKey);
        }
        if !is_key && self.options.stream_strings {
            out.push(Token::StartString);
        }
        self.chunk_buf.clear();
        self.value_buf.clear();
        self.scalar = Scalar::Str { is_key };
    }

    fn end_string(&mut self, is_key: bool, out: &mut Vec<Token>) -> Result<(), LexError> {
        self.scalar = Scalar::None;
        if is_key {
            if self.options.stream_keys {
                if !self.chunk_buf.is_empty() {
                    out.push(Token::StringChunk(std::mem::take(&mut self.chunk_buf)));
                }
                out.push(Token::EndKey);
            }
            if self.options.pack_keys {
                out.push(Token::KeyValue(std::mem::take(&mut self.value_buf)));
            }
            self.mode = Mode::Colon;
        } else {
            if self.options.stream_strings {
                if !self.chunk_buf.is_empty() {
                    out.push(Token::StringChunk(std::mem::take(&mut self.chunk_buf)));
                }
                out.push(Token::EndString);
            }
            if self.options.pack_strings {
                out.push(Token::StringValue(std::mem::take(&mut self.value_buf)));
            }
            self.after_value();
        }
        Ok(())
    }

    fn push_scalar_char(&mut self, c: char, is_key: bool) {
        let streaming = if is_key {
            self.options.stream_keys
        } else {
            self.options.stream_strings
        };
        let packing = if is_key {
            self.options.pack_keys
        } else {
            self.options.pack_strings
        };
        if streaming {
            self.chunk_buf.push(c);
        }
        if packing {
            self.value_buf.push(c);
        }
    }

    fn begin_number(&mut self, c: char) {
        self.chunk_buf.clear();
        self.value_buf.clear();
        if self.options.stream_numbers {
            self.chunk_buf.push(c);
        }
        self.value_buf.push(c);
        self.scalar = Scalar::Number;
    }

    fn end_number(&mut self, out: &mut Vec<Token>) -> Result<(), LexError> {
        self.scalar = Scalar::None;
        if !is_valid_number(&self.value_buf) {
            return Err(self.err("invalid number"));
        }
        if self.options.stream_numbers {
            if self.options.pack_numbers {
                // Both forms: the streamed rendition arrives whole at the
                // number's end, right before its packed duplicate.
                out.push(Token::StartNumber);
                out.push(Token::NumberChunk(self.value_buf.clone()));
                out.push(Token::EndNumber);
            } else {
                let emitted_start = self.value_buf.len() > self.chunk_buf.len();
                if !emitted_start {
                    out.push(Token::StartNumber);
                }
                if !self.chunk_buf.is_empty() {
                    out.push(Token::NumberChunk(std::mem::take(&mut self.chunk_buf)));
                }
                out.push(Token::EndNumber);
            }
        }
        if self.options.pack_numbers {
            out.push(Token::NumberValue(std::mem::take(&mut self.value_buf)));
        }
        self.chunk_buf.clear();
        self.value_buf.clear();
        self.after_value();
        Ok(())
    }

    fn begin_literal(&mut self, text: &'static str) -> Result<(), LexError> {
        self.scalar = Scalar::Literal { text, matched: 1 };
        Ok(())
    }

    fn close_container(&mut self, c: char, out: &mut Vec<Token>) -> Result<(), LexError> {
        match (self.stack.pop(), c) {
            (Some(Container::Object), '}') => out.push(Token::EndObject),
            (Some(Container::Array), ']') => out.push(Token::EndArray),
            _ => return Err(self.err("mismatched container end")),
        }
        self.after_value();
        Ok(())
    }

    fn after_value(&mut self) {
        self.mode = if self.stack.is_empty() {
            Mode::Value
        } else {
            Mode::AfterValue
        };
    }

    /// Flush the streamed chunk segment at a write boundary.
    fn flush_chunk(&mut self, out: &mut Vec<Token>) {
        match self.scalar {
            Scalar::Str { is_key }
            | Scalar::StrEscape { is_key }
            | Scalar::StrUnicode { is_key, .. } => {
                let streaming = if is_key {
                    self.options.stream_keys
                } else {
                    self.options.stream_strings
                };
                if streaming && !self.chunk_buf.is_empty() {
                    out.push(Token::StringChunk(std::mem::take(&mut self.chunk_buf)));
                }
            }
            Scalar::Number => {
                // Streamed-only numbers flush per write; when packing too,
                // the whole number is emitted at its end instead.
                if self.options.stream_numbers && !self.options.pack_numbers {
                    if !self.chunk_buf.is_empty() {
                        let emitted_start = self.value_buf.len() > self.chunk_buf.len();
                        if !emitted_start {
                            out.push(Token::StartNumber);
                        }
                        out.push(Token::NumberChunk(std::mem::take(&mut self.chunk_buf)));
                    }
                }
            }
            _ => {}
        }
    }

    fn err(&self, message: &str) -> LexError {
        LexError {
            offset: self.offset,
            message: message.to_string(),
        }
    }
}

enum ChunkData<'a> {
    Borrowed(&'a [u8]),
    Owned(Vec<u8>),
}

impl ChunkData<'_> {
    fn as_slice(&self) -> &[u8] {
        match self {
            ChunkData::Borrowed(b) => b,
            ChunkData::Owned(v) => v,
        }
    }
}

/// Strict JSON number shape: `-?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?`.
fn is_valid_number(text: &str) -> bool {
    let mut rest = text.strip_prefix('-').unwrap_or(text);
    let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    match int_len {
        0 => return false,
        1 => {}
        _ if rest.starts_with('0') => return false,
        _ => {}
    }
    rest = &rest[int_len..];
    if let Some(frac) = rest.strip_prefix('.') {
        let frac_len = frac.bytes().take_while(u8::is_ascii_digit).count();
        if frac_len == 0 {
            return false;
        }
        rest = &frac[frac_len..];
    }
    if let Some(exp) = rest.strip_prefix(&['e', 'E'][..]) {
        let exp = exp.strip_prefix(&['+', '-'][..]).unwrap_or(exp);
        let exp_len = exp.bytes().take_while(u8::is_ascii_digit).count();
        if exp_len == 0 {
            return false;
        }
        rest = &exp[exp_len..];
    }
    rest.is_empty()
}

/// Tokenize a complete in-memory document.
pub fn lex_slice(input: &[u8], options: LexerOptions) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(options);
    let mut out = lexer.write(input)?;
    out.extend(lexer.finish()?);
    Ok(out)
}

/// Tokenize a fallible byte stream (such as a file or network body).
pub fn lex_bytes<S>(input: S, options: LexerOptions) -> impl Stream<Item = TokenResult>
where
    S: Stream<Item = std::io::Result<Bytes>>,
{
    stream! {
        pin_mut!(input);
        let mut lexer = Lexer::new(options);
        while let Some(chunk) = input.next().await {
            match chunk {
                Ok(bytes) => match lexer.write(&bytes) {
                    Ok(tokens) => {
                        for t in tokens {
                            yield Ok(t);
                        }
                    }
                    Err(e) => {
                        yield Err(e.into());
                        return;
                    }
                },
                Err(e) => {
                    yield Err(PipelineError::Io(e));
                    return;
                }
            }
        }
        match lexer.finish() {
            Ok(tokens) => {
                for t in tokens {
                    yield Ok(t);
                }
            }
            Err(e) => yield Err(e.into()),
        }
    }
}

/// Tokenize an [`AsyncRead`].
pub fn lex_reader<R>(reader: R, options: LexerOptions) -> impl Stream<Item = TokenResult>
where
    R: AsyncRead + Send + 'static,
{
    lex_bytes(ReaderStream::new(reader), options)
}
