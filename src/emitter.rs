//! The tokens → bytes boundary: writes a token stream back out as JSON text.
//!
//! Mirrors the lexer: packed and streamed forms are both accepted, and a
//! packed token immediately following its streamed form is recognized as the
//! redundant duplicate and skipped. `make_array` wraps a sequence of root
//! values in one top-level array, which is how a pipeline emitting a
//! sequence of objects becomes a single JSON document.
//!
//! This is an outward-facing boundary: a token sequence that violates the
//! grammar surfaces as [`PipelineError::MalformedTokenStream`] instead of a
//! panic.

use async_stream::stream;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::{pin_mut, StreamExt};

use crate::error::PipelineError;
use crate::token::{Token, TokenResult};

/// Configuration for the [`Emitter`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EmitterOptions {
    /// Wrap all root values in a single top-level array.
    pub make_array: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Container {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Streamed {
    Key,
    Str,
    Num,
}

/// Incremental JSON text writer over tokens.
#[derive(Debug)]
pub struct Emitter {
    options: EmitterOptions,
    stack: Vec<Container>,
    /// Comma is owed before the next entry/element at the current level.
    needs_comma: bool,
    /// Inside an object, a key has been written and its value is owed.
    expect_value: bool,
    streaming: Option<Streamed>,
    just_streamed: Option<Streamed>,
    root_count: usize,
}

impl Emitter {
    pub fn new(options: EmitterOptions) -> Self {
        Self {
            options,
            stack: Vec::new(),
            needs_comma: false,
            expect_value: false,
            streaming: None,
            just_streamed: None,
            root_count: 0,
        }
    }

    /// Render one token. Most tokens produce a small byte string; redundant
    /// packed duplicates and `Final` produce nothing.
    pub fn write(&mut self, token: &Token) -> Result<Vec<u8>, PipelineError> {
        if token.is_synthetic() {
            return Err(PipelineError::MalformedTokenStream(format!(
                "synthetic token reached the emitter: {token:?}"
            )));
        }
        if matches!(token, Token::Final) {
            return Ok(Vec::new());
        }
        let just_streamed = self.just_streamed.take();
        let mut out = Vec::new();
        match token {
            Token::StartObject => {
                self.value_prefix(&mut out)?;
                out.push(b'{');
                self.stack.push(Container::Object);
                self.needs_comma = false;
            }
            Token::EndObject => {
                if self.expect_value {
                    return Err(self.malformed("object closed after a key with no value"));
                }
                match self.stack.pop() {
                    Some(Container::Object) => {}
                    _ => return Err(self.malformed("unbalanced endObject")),
                }
                out.push(b'}');
                self.value_done();
            }
            Token::StartArray => {
                self.value_prefix(&mut out)?;
                out.push(b'[');
                self.stack.push(Container::Array);
                self.needs_comma = false;
            }
            Token::EndArray => {
                match self.stack.pop() {
                    Some(Container::Array) => {}
                    _ => return Err(self.malformed("unbalanced endArray")),
                }
                out.push(b']');
                self.value_done();
            }
            Token::StartKey => {
                self.key_prefix(&mut out)?;
                out.push(b'"');
                self.streaming = Some(Streamed::Key);
            }
            Token::EndKey => {
                if self.streaming.take() != Some(Streamed::Key) {
                    return Err(self.malformed("endKey with no startKey"));
                }
                out.extend_from_slice(b"\":");
                self.expect_value = true;
                self.just_streamed = Some(Streamed::Key);
            }
            Token::StartString => {
                self.value_prefix(&mut out)?;
                out.push(b'"');
                self.streaming = Some(Streamed::Str);
            }
            Token::EndString => {
                if self.streaming.take() != Some(Streamed::Str) {
                    return Err(self.malformed("endString with no startString"));
                }
                out.push(b'"');
                self.value_done();
                self.just_streamed = Some(Streamed::Str);
            }
            Token::StartNumber => {
                self.value_prefix(&mut out)?;
                self.streaming = Some(Streamed::Num);
            }
            Token::EndNumber => {
                if self.streaming.take() != Some(Streamed::Num) {
                    return Err(self.malformed("endNumber with no startNumber"));
                }
                self.value_done();
                self.just_streamed = Some(Streamed::Num);
            }
            Token::StringChunk(text) => match self.streaming {
                Some(Streamed::Key) | Some(Streamed::Str) => escape_into(text, &mut out),
                _ => return Err(self.malformed("string chunk outside a streamed key or string")),
            },
            Token::NumberChunk(text) => match self.streaming {
                Some(Streamed::Num) => out.extend_from_slice(text.as_bytes()),
                _ => return Err(self.malformed("number chunk outside a streamed number")),
            },
            Token::KeyValue(key) => {
                if just_streamed != Some(Streamed::Key) {
                    self.key_prefix(&mut out)?;
                    out.push(b'"');
                    escape_into(key, &mut out);
                    out.extend_from_slice(b"\":");
                    self.expect_value = true;
                }
            }
            Token::StringValue(text) => {
                if just_streamed != Some(Streamed::Str) {
                    self.value_prefix(&mut out)?;
                    out.push(b'"');
                    escape_into(text, &mut out);
                    out.push(b'"');
                    self.value_done();
                }
            }
            Token::NumberValue(text) => {
                if just_streamed != Some(Streamed::Num) {
                    self.value_prefix(&mut out)?;
                    out.extend_from_slice(text.as_bytes());
                    self.value_done();
                }
            }
            Token::TrueValue => {
                self.value_prefix(&mut out)?;
                out.extend_from_slice(b"true");
                self.value_done();
            }
            Token::FalseValue => {
                self.value_prefix(&mut out)?;
                out.extend_from_slice(b"false");
                self.value_done();
            }
            Token::NullValue => {
                self.value_prefix(&mut out)?;
                out.extend_from_slice(b"null");
                self.value_done();
            }
            Token::PackedEntry(_)
            | Token::SparseKeyStart(_)
            | Token::SparseKeyEnd(_)
            | Token::SparseValueStart(_)
            | Token::SparseValueEnd(_)
            | Token::Final => unreachable!(),
        }
        Ok(out)
    }

    /// Close the document. With `make_array`, writes the closing bracket (or
    /// `[]` when no root value was emitted).
    pub fn finish(&mut self) -> Result<Vec<u8>, PipelineError> {
        if self.streaming.is_some() || !self.stack.is_empty() || self.expect_value {
            return Err(self.malformed("token stream ended mid-value"));
        }
        if self.options.make_array {
            if self.root_count == 0 {
                Ok(b"[]".to_vec())
            } else {
                Ok(b"]".to_vec())
            }
        } else {
            Ok(Vec::new())
        }
    }

    /// Separator and wrapping owed before a value starts at this position.
    fn value_prefix(&mut self, out: &mut Vec<u8>) -> Result<(), PipelineError> {
        match self.stack.last() {
            Some(Container::Object) => {
                if !self.expect_value {
                    return Err(self.malformed("value inside object with no key"));
                }
                self.expect_value = false;
            }
            Some(Container::Array) => {
                if self.needs_comma {
                    out.push(b',');
                }
            }
            None => {
                if self.options.make_array {
                    if self.root_count == 0 {
                        out.push(b'[');
                    } else {
                        out.push(b',');
                    }
                } else if self.root_count > 0 {
                    // Keep concatenated roots lexable.
                    out.push(b'\n');
                }
                self.root_count += 1;
            }
        }
        Ok(())
    }

    fn key_prefix(&mut self, out: &mut Vec<u8>) -> Result<(), PipelineError> {
        match self.stack.last() {
            Some(Container::Object) => {
                if self.expect_value {
                    return Err(self.malformed("key written while a value was owed"));
                }
                if self.needs_comma {
                    out.push(b',');
                }
                Ok(())
            }
            _ => Err(self.malformed("key token outside an object")),
        }
    }

    fn value_done(&mut self) {
        self.needs_comma = true;
    }

    fn malformed(&self, message: &str) -> PipelineError {
        PipelineError::MalformedTokenStream(message.to_string())
    }
}

/// JSON string escaping, incremental-safe (operates per chunk).
fn escape_into(text: &str, out: &mut Vec<u8>) {
    for c in text.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            '\u{8}' => out.extend_from_slice(b"\\b"),
            '\u{c}' => out.extend_from_slice(b"\\f"),
            c if (c as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

/// Render a token stream as a stream of JSON text fragments.
pub fn emit<S>(input: S, options: EmitterOptions) -> impl Stream<Item = Result<Bytes, PipelineError>>
where
    S: Stream<Item = TokenResult>,
{
    stream! {
        pin_mut!(input);
        let mut emitter = Emitter::new(options);
        while let Some(item) = input.next().await {
            match item {
                Ok(token) => match emitter.write(&token) {
                    Ok(bytes) => {
                        if !bytes.is_empty() {
                            yield Ok(Bytes::from(bytes));
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                },
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        match emitter.finish() {
            Ok(bytes) => {
                if !bytes.is_empty() {
                    yield Ok(Bytes::from(bytes));
                }
            }
            Err(e) => yield Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(tokens: Vec<Token>, options: EmitterOptions) -> String {
        let mut emitter = Emitter::new(options);
        let mut out = Vec::new();
        for t in &tokens {
            out.extend(emitter.write(t).unwrap());
        }
        out.extend(emitter.finish().unwrap());
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn renders_packed_tokens() {
        let text = render(
            vec![
                Token::StartObject,
                Token::KeyValue("a".into()),
                Token::NumberValue("1".into()),
                Token::KeyValue("b".into()),
                Token::StartArray,
                Token::TrueValue,
                Token::NullValue,
                Token::EndArray,
                Token::EndObject,
            ],
            EmitterOptions::default(),
        );
        assert_eq!(text, r#"{"a":1,"b":[true,null]}"#);
    }

    #[test]
    fn renders_streamed_forms_and_skips_duplicates() {
        let text = render(
            vec![
                Token::StartObject,
                Token::StartKey,
                Token::StringChunk("na".into()),
                Token::StringChunk("me".into()),
                Token::EndKey,
                Token::KeyValue("name".into()),
                Token::StartString,
                Token::StringChunk("hi".into()),
                Token::EndString,
                Token::StringValue("hi".into()),
                Token::EndObject,
            ],
            EmitterOptions::default(),
        );
        assert_eq!(text, r#"{"name":"hi"}"#);
    }

    #[test]
    fn make_array_wraps_roots() {
        let tokens = vec![
            Token::StartObject,
            Token::EndObject,
            Token::StartObject,
            Token::EndObject,
        ];
        assert_eq!(
            render(tokens, EmitterOptions { make_array: true }),
            "[{},{}]"
        );
        assert_eq!(
            render(Vec::new(), EmitterOptions { make_array: true }),
            "[]"
        );
    }

    #[test]
    fn escapes_strings() {
        let text = render(
            vec![Token::StringValue("a\"b\\c\nd\u{1}".into())],
            EmitterOptions::default(),
        );
        assert_eq!(text, r#""a\"b\\c\nd\u0001""#);
    }

    #[test]
    fn rejects_malformed_sequences() {
        let mut emitter = Emitter::new(EmitterOptions::default());
        assert!(emitter.write(&Token::EndObject).is_err());

        let mut emitter = Emitter::new(EmitterOptions::default());
        emitter.write(&Token::StartObject).unwrap();
        assert!(emitter.write(&Token::TrueValue).is_err());
    }
}
