//! Packs matching object entries into synthetic tokens.
//!
//! Scans the stream for entries whose key path matches the configured
//! filters. For each match, a [`Token::PackedEntry`] carrying the fully
//! assembled value is emitted immediately after the final token of that
//! value (after any trailing packed duplicate). In sparse mode the value is
//! never materialized; the matched entry's key tokens and value tokens are
//! bracketed by the four sparse tokens instead. `omit_entry`, `select_entry`
//! and the object sieve are all built on this machine.

use futures_core::Stream;
use serde_json::Value;
use tracing::debug;

use crate::assembler::FullAssembler;
use crate::error::PipelineError;
use crate::inflate::{pump, TokenMachine};
use crate::matcher::{KeyMatcher, DEFAULT_SEPARATOR};
use crate::path::PathTracker;
use crate::token::{OwnerId, PackedEntry as PackedEntryToken, PathComponent, SparseEntry, Token, TokenResult};

/// Configuration for [`pack_entry`].
#[derive(Debug)]
pub struct PackEntryOptions {
    pub filters: KeyMatcher,
    pub separator: String,
    /// Track completion without materializing the matched value; emit the
    /// sparse bracket tokens instead of `PackedEntry`.
    pub sparse: bool,
    /// Remove the matched entry's key and value tokens from the stream,
    /// leaving only the synthetic output.
    pub discard_component_tokens: bool,
    /// Identity stamped on emitted synthetic tokens so cooperating filters
    /// can recognize their own output.
    pub owner: Option<OwnerId>,
}

impl PackEntryOptions {
    pub fn new(filters: impl Into<KeyMatcher>) -> Self {
        Self {
            filters: filters.into(),
            separator: DEFAULT_SEPARATOR.to_string(),
            sparse: false,
            discard_component_tokens: false,
            owner: None,
        }
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    pub fn discard_component_tokens(mut self, discard: bool) -> Self {
        self.discard_component_tokens = discard;
        self
    }

    pub fn owner(mut self, owner: OwnerId) -> Self {
        self.owner = Some(owner);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Ended {
    Str,
    Num,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Idle,
    /// Buffering a streamed key's tokens.
    PackingKey,
    /// Matched key assembled; a packed key duplicate may still follow.
    FinalizingKey,
    /// Assembling the matched entry's value.
    PackingValue,
    /// Value complete; a packed value duplicate may still follow.
    FinalizingValue(Ended),
}

#[derive(Debug, Clone)]
struct Matched {
    key: String,
    stack: Vec<PathComponent>,
    matcher: String,
}

/// The entry-packing state machine. One match is tracked at a time; entries
/// inside a matched value are not re-detected.
#[derive(Debug)]
pub struct PackEntry {
    options: PackEntryOptions,
    tracker: PathTracker,
    state: State,
    key_tokens: Vec<Token>,
    matched: Option<Matched>,
    assembler: Option<FullAssembler>,
}

impl PackEntry {
    pub fn new(options: PackEntryOptions) -> Self {
        Self {
            options,
            tracker: PathTracker::new(),
            state: State::Idle,
            key_tokens: Vec::new(),
            matched: None,
            assembler: None,
        }
    }

    fn step(&mut self, token: Token, out: &mut Vec<Token>) {
        match self.state {
            State::Idle => self.step_idle(token, out),
            State::PackingKey => self.step_packing_key(token, out),
            State::FinalizingKey => self.step_finalizing_key(token, out),
            State::PackingValue => self.step_packing_value(token, out),
            State::FinalizingValue(ended) => self.step_finalizing_value(ended, token, out),
        }
    }

    fn step_idle(&mut self, token: Token, out: &mut Vec<Token>) {
        match token {
            Token::StartKey => {
                self.key_tokens.push(token);
                self.state = State::PackingKey;
            }
            Token::KeyValue(_) => {
                // Packed-only key, or the idempotent duplicate of a streamed
                // key that did not match.
                self.key_tokens.push(token);
                self.try_match(out);
            }
            other => out.push(other),
        }
    }

    fn step_packing_key(&mut self, token: Token, out: &mut Vec<Token>) {
        match token {
            Token::StringChunk(_) => self.key_tokens.push(token),
            Token::EndKey => {
                self.key_tokens.push(token);
                self.try_match(out);
            }
            other => panic!("unexpected token inside a streamed key: {other:?}"),
        }
    }

    fn step_finalizing_key(&mut self, token: Token, out: &mut Vec<Token>) {
        if matches!(token, Token::KeyValue(_)) {
            // The packed duplicate belongs to the key token group.
            self.key_tokens.push(token);
            self.begin_value(out);
        } else {
            self.begin_value(out);
            self.step_packing_value(token, out);
        }
    }

    fn step_packing_value(&mut self, token: Token, out: &mut Vec<Token>) {
        let assembler = self
            .assembler
            .as_mut()
            .unwrap_or_else(|| panic!("value token with no assembler"));
        assembler.consume(&token);
        let ended = match token {
            Token::EndString => Some(Ended::Str),
            Token::EndNumber => Some(Ended::Num),
            _ => None,
        };
        let done = assembler.done();
        if !self.options.discard_component_tokens {
            out.push(token);
        }
        if done {
            match ended {
                // A packed duplicate may immediately follow a streamed
                // scalar; hold the synthetic emission for one token.
                Some(e) => self.state = State::FinalizingValue(e),
                None => self.emit_entry(out),
            }
        }
    }

    fn step_finalizing_value(&mut self, ended: Ended, token: Token, out: &mut Vec<Token>) {
        let duplicate = matches!(
            (ended, &token),
            (Ended::Str, Token::StringValue(_)) | (Ended::Num, Token::NumberValue(_))
        );
        if duplicate {
            if let Some(assembler) = self.assembler.as_mut() {
                assembler.consume(&token);
            }
            if !self.options.discard_component_tokens {
                out.push(token);
            }
            self.emit_entry(out);
        } else {
            self.emit_entry(out);
            self.step(token, out);
        }
    }

    /// Key assembly is complete; the tracker head holds the entry's key.
    fn try_match(&mut self, out: &mut Vec<Token>) {
        let path = self.tracker.path(&self.options.separator);
        match self.options.filters.matches(&path) {
            Some(matcher) => {
                let key = match self.tracker.head(0) {
                    Some(PathComponent::Key(k)) => k.clone(),
                    other => panic!("matched entry without a key head: {other:?}"),
                };
                debug!(target: "jsonflow::filters", path = %path, matcher = %matcher, "pack_entry matched");
                self.matched = Some(Matched {
                    key,
                    stack: self.tracker.stack().to_vec(),
                    matcher,
                });
                let streamed = matches!(self.key_tokens.last(), Some(Token::EndKey));
                if streamed {
                    // A packed key duplicate may still follow.
                    self.state = State::FinalizingKey;
                } else {
                    self.begin_value(out);
                }
            }
            None => {
                self.flush_key(out);
                self.state = State::Idle;
            }
        }
    }

    /// The key token group is complete; emit it and start value assembly.
    fn begin_value(&mut self, out: &mut Vec<Token>) {
        if self.options.sparse {
            let entry = self.sparse_entry();
            out.push(Token::SparseKeyStart(entry.clone()));
            if self.options.discard_component_tokens {
                self.key_tokens.clear();
            } else {
                out.append(&mut self.key_tokens);
            }
            out.push(Token::SparseKeyEnd(entry.clone()));
            out.push(Token::SparseValueStart(entry));
            self.assembler = Some(FullAssembler::new_sparse());
        } else {
            if self.options.discard_component_tokens {
                self.key_tokens.clear();
            } else {
                out.append(&mut self.key_tokens);
            }
            self.assembler = Some(FullAssembler::new());
        }
        self.state = State::PackingValue;
    }

    fn emit_entry(&mut self, out: &mut Vec<Token>) {
        let matched = self
            .matched
            .take()
            .unwrap_or_else(|| panic!("entry emission with no match recorded"));
        let assembler = self.assembler.take();
        if self.options.sparse {
            out.push(Token::SparseValueEnd(SparseEntry {
                key: matched.key,
                stack: matched.stack,
                matcher: matched.matcher,
                owner: self.options.owner,
            }));
        } else {
            let value = assembler
                .and_then(FullAssembler::into_current)
                .unwrap_or(Value::Null);
            debug!(target: "jsonflow::filters", key = %matched.key, "pack_entry emitting packed entry");
            out.push(Token::PackedEntry(PackedEntryToken {
                key: matched.key,
                stack: matched.stack,
                matcher: matched.matcher,
                value,
                owner: self.options.owner,
            }));
        }
        self.state = State::Idle;
    }

    fn flush_key(&mut self, out: &mut Vec<Token>) {
        out.append(&mut self.key_tokens);
    }

    fn sparse_entry(&self) -> SparseEntry {
        let matched = self
            .matched
            .as_ref()
            .unwrap_or_else(|| panic!("sparse entry with no match recorded"));
        SparseEntry {
            key: matched.key.clone(),
            stack: matched.stack.clone(),
            matcher: matched.matcher.clone(),
            owner: self.options.owner,
        }
    }
}

impl TokenMachine for PackEntry {
    fn advance(&mut self, token: Token) -> Result<Vec<Token>, PipelineError> {
        if token.is_passthrough() {
            return Ok(vec![token]);
        }
        self.tracker.update(&token);
        let mut out = Vec::new();
        self.step(token, &mut out);
        Ok(out)
    }

    fn finish(&mut self) -> Result<Vec<Token>, PipelineError> {
        let mut out = Vec::new();
        // A value that completed on the stream's last token is still pending
        // its possible packed duplicate; emit the entry now.
        if matches!(self.state, State::FinalizingValue(_)) {
            self.emit_entry(&mut out);
        }
        Ok(out)
    }
}

/// Emit a synthetic packed-entry token (or sparse brackets) for every entry
/// whose key path matches the configured filters. All other tokens pass
/// through unchanged.
pub fn pack_entry<S>(input: S, options: PackEntryOptions) -> impl Stream<Item = TokenResult>
where
    S: Stream<Item = TokenResult>,
{
    pump(input, PackEntry::new(options))
}
