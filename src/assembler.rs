//! Value reconstruction from token streams.
//!
//! [`FullAssembler`] rebuilds a [`serde_json::Value`] from any valid token
//! sequence, handling every combination of streamed-only, packed-only and
//! streamed+packed forms without double-counting. Its sparse mode keeps the
//! identical `done`/stack behavior while materializing nothing, which is what
//! lets the filters reuse the completion detection for values they will
//! never look at.

use serde_json::{Map, Value};

use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Streamed {
    Key,
    Str,
    Num,
}

/// Reconstructs a JSON value from a token stream.
///
/// `done()` is true exactly when the last fully formed root value is complete
/// (initially true: nothing is in progress). Feeding a token sequence that
/// violates the grammar (orphan `EndKey`, chunk outside a streamed primitive,
/// unbalanced close) is a programmer error and panics; this assembler is not
/// an input validator.
#[derive(Debug, Default)]
pub struct FullAssembler {
    current: Option<Value>,
    stack: Vec<(Option<Value>, Option<String>)>,
    key: Option<String>,
    done: bool,
    sparse: bool,
    buffer: String,
    buffering: Option<Streamed>,
    saved_done: bool,
    just_streamed: Option<Streamed>,
}

impl FullAssembler {
    pub fn new() -> Self {
        Self {
            done: true,
            ..Self::default()
        }
    }

    /// Sparse variant: tracks `done` and stack depth at the same token
    /// boundaries as the normal mode without materializing any value.
    /// `current()` reads as null.
    pub fn new_sparse() -> Self {
        Self {
            done: true,
            sparse: true,
            ..Self::default()
        }
    }

    /// True whenever the last fully formed root value is complete.
    pub fn done(&self) -> bool {
        self.done
    }

    /// The latest completed or in-progress value. Null in sparse mode.
    pub fn current(&self) -> Option<&Value> {
        self.current.as_ref()
    }

    /// Take the completed value out of the assembler.
    pub fn into_current(self) -> Option<Value> {
        self.current
    }

    /// The internal construction stack: one `(parent, pending key)` slot per
    /// open container.
    pub fn stack(&self) -> &[(Option<Value>, Option<String>)] {
        &self.stack
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Advance the assembler by one token.
    pub fn consume(&mut self, token: &Token) {
        if token.is_passthrough() {
            return;
        }
        let just_streamed = self.just_streamed.take();
        match token {
            Token::StartKey => self.begin(Streamed::Key),
            Token::StartString => self.begin(Streamed::Str),
            Token::StartNumber => self.begin(Streamed::Num),
            Token::StringChunk(chunk) => {
                match self.buffering {
                    // Sparse mode never materializes, so chunks are not kept.
                    Some(Streamed::Key) | Some(Streamed::Str) => {
                        if !self.sparse {
                            self.buffer.push_str(chunk);
                        }
                    }
                    _ => panic!("string chunk outside a streamed key or string"),
                }
            }
            Token::NumberChunk(chunk) => {
                match self.buffering {
                    Some(Streamed::Num) => {
                        if !self.sparse {
                            self.buffer.push_str(chunk);
                        }
                    }
                    _ => panic!("number chunk outside a streamed number"),
                }
            }
            Token::EndKey => {
                let text = self.end(Streamed::Key);
                self.set_key(text);
                self.just_streamed = Some(Streamed::Key);
            }
            Token::EndString => {
                let text = self.end(Streamed::Str);
                self.finish_value(Value::String(text));
                self.just_streamed = Some(Streamed::Str);
            }
            Token::EndNumber => {
                let text = self.end(Streamed::Num);
                let value = self.number_value(&text);
                self.finish_value(value);
                self.just_streamed = Some(Streamed::Num);
            }
            Token::KeyValue(key) => {
                // Redundant after a streamed key.
                if just_streamed != Some(Streamed::Key) {
                    self.set_key(key.clone());
                }
            }
            Token::StringValue(s) => {
                if just_streamed != Some(Streamed::Str) {
                    self.finish_value(Value::String(s.clone()));
                }
            }
            Token::NumberValue(text) => {
                if just_streamed != Some(Streamed::Num) {
                    let value = self.number_value(text);
                    self.finish_value(value);
                }
            }
            Token::TrueValue => self.finish_value(Value::Bool(true)),
            Token::FalseValue => self.finish_value(Value::Bool(false)),
            Token::NullValue => self.finish_value(Value::Null),
            Token::StartObject => self.open(Value::Object(Map::new())),
            Token::StartArray => self.open(Value::Array(Vec::new())),
            Token::EndObject | Token::EndArray => self.close(),
            // is_passthrough covered synthetic tokens and Final above.
            _ => unreachable!(),
        }
    }

    fn begin(&mut self, kind: Streamed) {
        if self.buffering.is_some() {
            panic!("nested streamed primitive");
        }
        self.saved_done = self.done;
        self.done = false;
        self.buffer.clear();
        self.buffering = Some(kind);
    }

    fn end(&mut self, kind: Streamed) -> String {
        if self.buffering != Some(kind) {
            panic!("streamed primitive end without matching start");
        }
        self.buffering = None;
        self.done = self.saved_done;
        std::mem::take(&mut self.buffer)
    }

    fn set_key(&mut self, key: String) {
        self.key = Some(key);
    }

    fn open(&mut self, container: Value) {
        if self.done && self.stack.is_empty() {
            // A completed previous root value; the new one replaces it.
            self.current = None;
        }
        self.done = false;
        let parent = self.current.take();
        let key = self.key.take();
        self.stack.push((parent, key));
        self.current = Some(if self.sparse { Value::Null } else { container });
    }

    fn close(&mut self) {
        let finished = self
            .current
            .take()
            .unwrap_or_else(|| panic!("container close with nothing open"));
        let (parent, key) = self
            .stack
            .pop()
            .unwrap_or_else(|| panic!("unbalanced container close"));
        self.current = parent;
        self.key = key;
        self.finish_value(finished);
    }

    fn finish_value(&mut self, value: Value) {
        if self.sparse {
            self.key = None;
            if self.stack.is_empty() {
                self.current = Some(Value::Null);
                self.done = true;
            } else {
                self.done = false;
            }
            return;
        }
        if self.done && self.stack.is_empty() {
            self.current = None;
        }
        match self.current.as_mut() {
            Some(Value::Object(map)) => {
                let key = self
                    .key
                    .take()
                    .unwrap_or_else(|| panic!("value inside object with no key"));
                map.insert(key, value);
                self.done = false;
            }
            Some(Value::Array(items)) => {
                items.push(value);
                self.done = false;
            }
            _ => {
                if !self.stack.is_empty() {
                    panic!("value token with no open container slot");
                }
                self.current = Some(value);
                self.done = true;
            }
        }
    }

    fn number_value(&self, text: &str) -> Value {
        if self.sparse {
            return Value::Null;
        }
        let number = serde_json::from_str(text)
            .unwrap_or_else(|e| panic!("invalid number text {text:?}: {e}"));
        Value::Number(number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed(assembler: &mut FullAssembler, tokens: &[Token]) {
        for t in tokens {
            assembler.consume(t);
        }
    }

    #[test]
    fn packed_only_object() {
        let mut a = FullAssembler::new();
        assert!(a.done());
        feed(
            &mut a,
            &[
                Token::StartObject,
                Token::KeyValue("a".into()),
                Token::NumberValue("1".into()),
                Token::KeyValue("b".into()),
                Token::TrueValue,
                Token::EndObject,
            ],
        );
        assert!(a.done());
        assert_eq!(a.current(), Some(&json!({"a": 1, "b": true})));
    }

    #[test]
    fn streamed_and_packed_does_not_double_count() {
        // {"name":"object-3"} with both forms for the key and the value.
        let mut a = FullAssembler::new();
        feed(
            &mut a,
            &[
                Token::StartObject,
                Token::StartKey,
                Token::StringChunk("na".into()),
                Token::StringChunk("me".into()),
                Token::EndKey,
                Token::KeyValue("name".into()),
                Token::StartString,
                Token::StringChunk("object-3".into()),
                Token::EndString,
                Token::StringValue("object-3".into()),
                Token::EndObject,
            ],
        );
        assert!(a.done());
        assert_eq!(a.current(), Some(&json!({"name": "object-3"})));
    }

    #[test]
    fn done_toggles_during_root_streamed_string() {
        let mut a = FullAssembler::new();
        a.consume(&Token::StartString);
        assert!(!a.done());
        a.consume(&Token::StringChunk("hi".into()));
        assert!(!a.done());
        a.consume(&Token::EndString);
        assert!(a.done());
        assert_eq!(a.current(), Some(&json!("hi")));
    }

    #[test]
    fn consecutive_roots_replace_current() {
        let mut a = FullAssembler::new();
        feed(
            &mut a,
            &[
                Token::StartObject,
                Token::KeyValue("n".into()),
                Token::NumberValue("1".into()),
                Token::EndObject,
            ],
        );
        assert_eq!(a.current(), Some(&json!({"n": 1})));
        feed(&mut a, &[Token::StartArray, Token::NullValue, Token::EndArray]);
        assert!(a.done());
        assert_eq!(a.current(), Some(&json!([null])));
        a.consume(&Token::NumberValue("7".into()));
        assert_eq!(a.current(), Some(&json!(7)));
    }

    #[test]
    fn streamed_numbers_parse_from_chunks() {
        let mut a = FullAssembler::new();
        feed(
            &mut a,
            &[
                Token::StartArray,
                Token::StartNumber,
                Token::NumberChunk("-12".into()),
                Token::NumberChunk(".5e2".into()),
                Token::EndNumber,
                Token::EndArray,
            ],
        );
        assert_eq!(a.current(), Some(&json!([-1250.0])));
    }

    #[test]
    fn sparse_done_matches_normal_mode() {
        let tokens = vec![
            Token::StartObject,
            Token::KeyValue("a".into()),
            Token::StartArray,
            Token::StartString,
            Token::StringChunk("x".into()),
            Token::EndString,
            Token::StringValue("x".into()),
            Token::NumberValue("3".into()),
            Token::EndArray,
            Token::EndObject,
        ];
        let mut normal = FullAssembler::new();
        let mut sparse = FullAssembler::new_sparse();
        for t in &tokens {
            normal.consume(t);
            sparse.consume(t);
            assert_eq!(normal.done(), sparse.done(), "diverged at {t:?}");
            assert_eq!(normal.depth(), sparse.depth(), "depth diverged at {t:?}");
        }
        assert_eq!(sparse.current(), Some(&Value::Null));
    }

    #[test]
    #[should_panic(expected = "without matching start")]
    fn orphan_end_key_panics() {
        let mut a = FullAssembler::new();
        a.consume(&Token::EndKey);
    }
}
