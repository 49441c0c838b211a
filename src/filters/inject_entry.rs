//! Inserts a new key/value entry into every matching object, with the value
//! produced by a per-object token sub-stream.

use async_stream::stream;
use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use regex::Regex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::matcher::{KeyMatcher, DEFAULT_SEPARATOR};
use crate::path::PathTracker;
use crate::token::{join_path, value_tokens, BoxTokenStream, PathComponent, Token, TokenResult};

use super::omit_entry::{omit_entry, OmitEntryOptions};

/// A per-object value stream handed out by a [`ValueStreamFactory`].
///
/// The writable `context` side, when present, receives a copy of every
/// upstream token while the stream is current, letting the factory's stream
/// observe the matched object's own entries before producing its value. The
/// channel's capacity is the factory's high water mark: if it fills before
/// the readable side is drained, the pipeline fails with
/// [`PipelineError::BackpressureDeadlock`].
pub struct ValueTokenStream {
    pub context: Option<mpsc::Sender<Token>>,
    pub tokens: Option<BoxTokenStream>,
}

/// Produces one [`ValueTokenStream`] per matched object. Invoked again after
/// each injection completes.
#[async_trait]
pub trait ValueStreamFactory: Send {
    async fn create(&mut self) -> Result<ValueTokenStream, PipelineError>;
}

/// Factory injecting the same materialized value into every matching object.
pub struct StaticValue {
    value: serde_json::Value,
}

impl StaticValue {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }
}

#[async_trait]
impl ValueStreamFactory for StaticValue {
    async fn create(&mut self) -> Result<ValueTokenStream, PipelineError> {
        let tokens = value_tokens(&self.value);
        Ok(ValueTokenStream {
            context: None,
            tokens: Some(Box::pin(futures_util::stream::iter(
                tokens.into_iter().map(Ok),
            ))),
        })
    }
}

/// Configuration for [`inject_entry`].
pub struct InjectEntryOptions {
    /// Key-path filter over the enclosing path of the target object. When
    /// omitted, every root object is matched.
    pub injection_point: Option<KeyMatcher>,
    pub separator: String,
    /// Key of the injected entry.
    pub key: String,
    pub factory: Box<dyn ValueStreamFactory>,
    /// Remove any pre-existing entry with the injected key first.
    pub auto_omit_injection_key: bool,
    /// Emit the injected key in streamed form.
    pub stream_keys: bool,
    /// Emit the injected key in packed form.
    pub pack_keys: bool,
}

impl InjectEntryOptions {
    pub fn new(key: impl Into<String>, factory: Box<dyn ValueStreamFactory>) -> Self {
        Self {
            injection_point: None,
            separator: DEFAULT_SEPARATOR.to_string(),
            key: key.into(),
            factory,
            auto_omit_injection_key: true,
            stream_keys: true,
            pack_keys: true,
        }
    }

    /// Shorthand for injecting a fixed materialized value.
    pub fn value(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(key, Box::new(StaticValue::new(value)))
    }

    pub fn injection_point(mut self, filters: impl Into<KeyMatcher>) -> Self {
        self.injection_point = Some(filters.into());
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn auto_omit_injection_key(mut self, auto_omit: bool) -> Self {
        self.auto_omit_injection_key = auto_omit;
        self
    }

    pub fn stream_keys(mut self, stream_keys: bool) -> Self {
        self.stream_keys = stream_keys;
        self
    }

    pub fn pack_keys(mut self, pack_keys: bool) -> Self {
        self.pack_keys = pack_keys;
        self
    }
}

/// Matcher for the pre-existing entry removed by `auto_omit_injection_key`:
/// the injection-point filter extended by the separator and the injected key.
/// Composing an invalid regular expression is a configuration error and
/// panics at construction, before any token flows.
fn injection_omit_matcher(point: Option<&KeyMatcher>, key: &str, separator: &str) -> KeyMatcher {
    match point {
        None => {
            // Every root object: the entry lives at "key" in a bare root
            // object or "<index>.key" under the outermost array.
            let pattern = format!(
                "^(?:\\d+{})?{}$",
                regex::escape(separator),
                regex::escape(key)
            );
            KeyMatcher::Pattern(
                Regex::new(&pattern)
                    .unwrap_or_else(|e| panic!("invalid auto-omit pattern {pattern:?}: {e}")),
            )
        }
        Some(KeyMatcher::Literal(path)) => {
            KeyMatcher::Literal(format!("{path}{separator}{key}"))
        }
        Some(KeyMatcher::Pattern(re)) => {
            let pattern = format!(
                "(?:{}){}{}$",
                re.as_str(),
                regex::escape(separator),
                regex::escape(key)
            );
            KeyMatcher::Pattern(
                Regex::new(&pattern)
                    .unwrap_or_else(|e| panic!("invalid auto-omit pattern {pattern:?}: {e}")),
            )
        }
        Some(KeyMatcher::Any(list)) => KeyMatcher::Any(
            list.iter()
                .map(|m| injection_omit_matcher(Some(m), key, separator))
                .collect(),
        ),
    }
}

/// Insert a new entry into every object matching the injection point.
///
/// Two cooperating stages: every upstream token is forwarded downstream and
/// teed into the current value stream's context side; on the matched
/// object's `EndObject` the context side is closed, the injected key tokens
/// are emitted, the value stream is piped downstream under backpressure, and
/// only then does the `EndObject` follow and the factory prepare the next
/// stream.
pub fn inject_entry<S>(input: S, options: InjectEntryOptions) -> impl Stream<Item = TokenResult>
where
    S: Stream<Item = TokenResult> + Send + 'static,
{
    let InjectEntryOptions {
        injection_point,
        separator,
        key,
        mut factory,
        auto_omit_injection_key,
        mut stream_keys,
        pack_keys,
    } = options;
    if !stream_keys && !pack_keys {
        // A key must be emitted somehow.
        stream_keys = true;
    }
    let mut input: BoxTokenStream = if auto_omit_injection_key {
        let omit = injection_omit_matcher(injection_point.as_ref(), &key, &separator);
        Box::pin(omit_entry(
            input,
            OmitEntryOptions::new(omit).separator(separator.clone()),
        ))
    } else {
        Box::pin(input)
    };

    stream! {
        let mut tracker = PathTracker::new();
        let mut target_depth: Option<usize> = None;
        // Created eagerly so the stream observes context from the start;
        // re-created after every completed injection.
        let mut value_stream = match factory.create().await {
            Ok(vs) => vs,
            Err(e) => {
                yield Err(e);
                return;
            }
        };
        if value_stream.tokens.is_none() {
            yield Err(PipelineError::UnreadableValueStream);
            return;
        }

        while let Some(item) = input.next().await {
            let token = match item {
                Ok(t) => t,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            if token.is_passthrough() {
                yield Ok(token);
                continue;
            }
            tracker.update(&token);

            if let Some(context) = value_stream.context.as_ref() {
                match context.try_send(token.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(
                            target: "jsonflow::filters",
                            "value token stream write buffer filled before it was drained"
                        );
                        yield Err(PipelineError::BackpressureDeadlock);
                        return;
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        value_stream.context = None;
                    }
                }
            }

            match token {
                Token::StartObject if target_depth.is_none() => {
                    let stack = tracker.stack();
                    let enclosing = &stack[..stack.len() - 1];
                    let matched = match injection_point.as_ref() {
                        None => {
                            enclosing.is_empty()
                                || (enclosing.len() == 1
                                    && matches!(enclosing[0], PathComponent::Index(_)))
                        }
                        Some(m) => m.matches(&join_path(enclosing, &separator)).is_some(),
                    };
                    if matched {
                        target_depth = Some(tracker.depth());
                        debug!(
                            target: "jsonflow::filters",
                            depth = tracker.depth(),
                            "inject_entry matched object"
                        );
                    }
                    yield Ok(Token::StartObject);
                }
                Token::EndObject if Some(tracker.depth() + 1) == target_depth => {
                    target_depth = None;
                    // End the writable side so the factory's stream can
                    // finish computing its value.
                    value_stream.context = None;
                    if stream_keys {
                        yield Ok(Token::StartKey);
                        yield Ok(Token::StringChunk(key.clone()));
                        yield Ok(Token::EndKey);
                    }
                    if pack_keys {
                        yield Ok(Token::KeyValue(key.clone()));
                    }
                    let mut tokens = match value_stream.tokens.take() {
                        Some(t) => t,
                        None => {
                            yield Err(PipelineError::UnreadableValueStream);
                            return;
                        }
                    };
                    while let Some(item) = tokens.next().await {
                        match item {
                            Ok(t) => yield Ok(t),
                            Err(e) => {
                                yield Err(e);
                                return;
                            }
                        }
                    }
                    drop(tokens);
                    yield Ok(Token::EndObject);
                    debug!(target: "jsonflow::filters", key = %key, "inject_entry injection complete");
                    value_stream = match factory.create().await {
                        Ok(vs) => vs,
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    };
                    if value_stream.tokens.is_none() {
                        yield Err(PipelineError::UnreadableValueStream);
                        return;
                    }
                }
                other => yield Ok(other),
            }
        }
    }
}
