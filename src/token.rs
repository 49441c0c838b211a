//! The token model: lexical events passed between pipeline transformers.
//!
//! A token stream is a flat sequence of JSON lexical events. Keys, strings
//! and numbers may travel in streamed form (`StartX`, chunks, `EndX`), packed
//! form (a single `XValue`), or both, in which case the packed token
//! immediately follows the matching `EndX` and carries the same text.
//! Filters additionally emit synthetic tokens (`PackedEntry` and the sparse
//! brackets) that other transformers pass through untouched unless they own
//! them.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_core::Stream;
use serde_json::Value;

use crate::error::PipelineError;

/// Item type flowing between transformers.
pub type TokenResult = Result<Token, PipelineError>;

/// Boxed token stream, the common currency for composed pipelines.
pub type BoxTokenStream = Pin<Box<dyn Stream<Item = TokenResult> + Send>>;

/// Opaque identity tag scoping synthetic tokens to the filter instance that
/// produced them. Compared only by equality; never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Allocate a fresh process-unique id.
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        OwnerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

/// One component of a key path: an object key, an array index, or the
/// placeholder used inside an object before a key has been assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathComponent {
    /// Current index inside an array. Starts at -1 on `StartArray` and is
    /// incremented when each contained value starts.
    Index(i64),
    /// Current key inside an object.
    Key(String),
    /// Inside an object, no key assigned yet.
    Pending,
}

impl PathComponent {
    pub fn key(k: impl Into<String>) -> Self {
        PathComponent::Key(k.into())
    }

    fn render(&self, out: &mut String) {
        match self {
            PathComponent::Index(i) => out.push_str(&i.to_string()),
            PathComponent::Key(k) => out.push_str(k),
            PathComponent::Pending => {}
        }
    }
}

/// Join path components with a separator into the string form matched by
/// key filters.
pub fn join_path(components: &[PathComponent], separator: &str) -> String {
    let mut out = String::new();
    for (i, c) in components.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        c.render(&mut out);
    }
    out
}

/// Payload of a [`Token::PackedEntry`]: a fully materialized matched entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedEntry {
    /// The entry's key.
    pub key: String,
    /// Full key path including the entry's key.
    pub stack: Vec<PathComponent>,
    /// Display form of the filter that matched.
    pub matcher: String,
    /// The assembled value.
    pub value: Value,
    /// Identity of the emitting filter instance, if scoped.
    pub owner: Option<OwnerId>,
}

/// Payload of the four sparse bracket tokens: a matched entry whose value is
/// deliberately not materialized.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseEntry {
    /// The entry's key.
    pub key: String,
    /// Full key path including the entry's key.
    pub stack: Vec<PathComponent>,
    /// Display form of the filter that matched.
    pub matcher: String,
    /// Identity of the emitting filter instance, if scoped.
    pub owner: Option<OwnerId>,
}

/// One lexical event of a JSON stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Structural delimiters.
    StartObject,
    EndObject,
    StartArray,
    EndArray,

    // Streamed key/string/number delimiters.
    StartKey,
    EndKey,
    StartString,
    EndString,
    StartNumber,
    EndNumber,

    /// Fragment of the key or string currently being streamed.
    StringChunk(String),
    /// Fragment of the number currently being streamed (decimal text).
    NumberChunk(String),

    // Packed (complete) primitives.
    KeyValue(String),
    StringValue(String),
    /// Decimal text; never parsed to a float inside the pipeline.
    NumberValue(String),
    TrueValue,
    FalseValue,
    NullValue,

    // Synthetic tokens, produced and recognized by filters.
    PackedEntry(PackedEntry),
    SparseKeyStart(SparseEntry),
    SparseKeyEnd(SparseEntry),
    SparseValueStart(SparseEntry),
    SparseValueEnd(SparseEntry),

    /// End-of-source marker appended by collaborator sources; passed through
    /// by every filter so sinks know when to finalize.
    Final,
}

impl Token {
    /// True for the synthetic tokens owned by filters (`PackedEntry` and the
    /// sparse brackets). Transformers that do not own a synthetic token must
    /// pass it through unchanged.
    pub fn is_synthetic(&self) -> bool {
        matches!(
            self,
            Token::PackedEntry(_)
                | Token::SparseKeyStart(_)
                | Token::SparseKeyEnd(_)
                | Token::SparseValueStart(_)
                | Token::SparseValueEnd(_)
        )
    }

    /// Owner attached to a synthetic token, if any.
    pub fn owner(&self) -> Option<OwnerId> {
        match self {
            Token::PackedEntry(e) => e.owner,
            Token::SparseKeyStart(e)
            | Token::SparseKeyEnd(e)
            | Token::SparseValueStart(e)
            | Token::SparseValueEnd(e) => e.owner,
            _ => None,
        }
    }

    /// True for tokens that pass through every transformer without touching
    /// its state: synthetic tokens it does not own and the `Final` marker.
    pub fn is_passthrough(&self) -> bool {
        self.is_synthetic() || matches!(self, Token::Final)
    }
}

/// Tokenize a materialized JSON value in fully packed form (packed keys,
/// strings and numbers). The inverse of [`crate::FullAssembler`] for values
/// that are already in memory; used by sources and injected-value factories.
pub fn value_tokens(value: &Value) -> Vec<Token> {
    let mut out = Vec::new();
    push_value_tokens(value, &mut out);
    out
}

fn push_value_tokens(value: &Value, out: &mut Vec<Token>) {
    match value {
        Value::Null => out.push(Token::NullValue),
        Value::Bool(true) => out.push(Token::TrueValue),
        Value::Bool(false) => out.push(Token::FalseValue),
        Value::Number(n) => out.push(Token::NumberValue(n.to_string())),
        Value::String(s) => out.push(Token::StringValue(s.clone())),
        Value::Array(items) => {
            out.push(Token::StartArray);
            for item in items {
                push_value_tokens(item, out);
            }
            out.push(Token::EndArray);
        }
        Value::Object(map) => {
            out.push(Token::StartObject);
            for (key, item) in map {
                out.push(Token::KeyValue(key.clone()));
                push_value_tokens(item, out);
            }
            out.push(Token::EndObject);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn owner_ids_are_unique() {
        let a = OwnerId::new();
        let b = OwnerId::new();
        assert_ne!(a, b);
        assert_eq!(a, a);
    }

    #[test]
    fn join_path_renders_keys_and_indices() {
        let stack = vec![
            PathComponent::key("items"),
            PathComponent::Index(2),
            PathComponent::key("name"),
        ];
        assert_eq!(join_path(&stack, "."), "items.2.name");
        assert_eq!(join_path(&stack, "/"), "items/2/name");
    }

    #[test]
    fn value_tokens_round_shape() {
        let tokens = value_tokens(&json!({"a": [1, true], "b": null}));
        assert_eq!(
            tokens,
            vec![
                Token::StartObject,
                Token::KeyValue("a".into()),
                Token::StartArray,
                Token::NumberValue("1".into()),
                Token::TrueValue,
                Token::EndArray,
                Token::KeyValue("b".into()),
                Token::NullValue,
                Token::EndObject,
            ]
        );
    }
}
