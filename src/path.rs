//! Key-path tracking: the ordered stack of object keys and array indices
//! locating the cursor position in the document.

use crate::token::{join_path, PathComponent, Token};

/// What the previous token ended, used to recognize a packed duplicate that
/// immediately follows its streamed form.
#[derive(Debug, Clone, Copy, PartialEq)]
enum JustEnded {
    String,
    Number,
}

/// Tracks the full key path (array indices and object keys) through a token
/// stream.
///
/// The stack holds one [`PathComponent`] per open container: the current
/// index inside an array (starting at -1, incremented when each contained
/// value starts), the current key inside an object, or
/// [`PathComponent::Pending`] before a key is assigned. Feeding a malformed
/// token sequence is a programmer error and panics; this tracker is not an
/// input validator.
#[derive(Debug, Clone, Default)]
pub struct PathTracker {
    stack: Vec<PathComponent>,
    key_buffer: Option<String>,
    just_ended: Option<JustEnded>,
}

impl PathTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the tracker by one token.
    pub fn update(&mut self, token: &Token) {
        if token.is_passthrough() {
            return;
        }
        let just_ended = self.just_ended.take();
        match token {
            Token::StartObject => {
                self.bump_index();
                self.stack.push(PathComponent::Pending);
            }
            Token::StartArray => {
                self.bump_index();
                self.stack.push(PathComponent::Index(-1));
            }
            Token::EndObject | Token::EndArray => {
                self.stack
                    .pop()
                    .unwrap_or_else(|| panic!("container close with empty path stack"));
            }
            Token::StartKey => {
                self.key_buffer = Some(String::new());
            }
            Token::StringChunk(chunk) => {
                // Only key chunks matter for the path; string-value chunks
                // leave it untouched.
                if let Some(buf) = self.key_buffer.as_mut() {
                    buf.push_str(chunk);
                }
            }
            Token::EndKey => {
                let key = self
                    .key_buffer
                    .take()
                    .unwrap_or_else(|| panic!("endKey with no startKey"));
                self.set_key(key);
            }
            Token::KeyValue(key) => {
                // Idempotent after a streamed key: the head already holds the
                // same key.
                self.set_key(key.clone());
            }
            Token::StartString | Token::StartNumber => self.bump_index(),
            Token::TrueValue | Token::FalseValue | Token::NullValue => self.bump_index(),
            Token::StringValue(_) => {
                if just_ended != Some(JustEnded::String) {
                    self.bump_index();
                }
            }
            Token::NumberValue(_) => {
                if just_ended != Some(JustEnded::Number) {
                    self.bump_index();
                }
            }
            Token::EndString => self.just_ended = Some(JustEnded::String),
            Token::EndNumber => self.just_ended = Some(JustEnded::Number),
            Token::NumberChunk(_) => {}
            // is_passthrough covered synthetic tokens and Final above.
            _ => unreachable!(),
        }
    }

    /// The current path stack, outermost first.
    pub fn stack(&self) -> &[PathComponent] {
        &self.stack
    }

    /// Component at `offset` from the top of the stack (0 = head).
    pub fn head(&self, offset: usize) -> Option<&PathComponent> {
        self.stack.len().checked_sub(1 + offset).map(|i| &self.stack[i])
    }

    /// Joined string form of the current path.
    pub fn path(&self, separator: &str) -> String {
        join_path(&self.stack, separator)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn set_key(&mut self, key: String) {
        match self.stack.last_mut() {
            Some(head @ (PathComponent::Pending | PathComponent::Key(_))) => {
                *head = PathComponent::Key(key);
            }
            _ => panic!("key token outside an object"),
        }
    }

    fn bump_index(&mut self) {
        if let Some(PathComponent::Index(i)) = self.stack.last_mut() {
            *i += 1;
        }
    }
}
