//! Buffers root-level objects and releases or discards them based on their
//! entries.

use futures_core::Stream;
use tracing::debug;

use crate::error::PipelineError;
use crate::inflate::{pump, TokenMachine};
use crate::matcher::{KeyMatcher, ValueMatcher, DEFAULT_SEPARATOR};
use crate::path::PathTracker;
use crate::token::{join_path, OwnerId, PathComponent, Token, TokenResult};

use super::pack_entry::{PackEntry, PackEntryOptions};

/// Configuration for [`object_sieve`]: `(key filter, value filter)` pairs.
/// An object is released as soon as one matching entry's value is accepted.
#[derive(Debug)]
pub struct ObjectSieveOptions {
    pub filters: Vec<(KeyMatcher, ValueMatcher)>,
    pub separator: String,
}

impl ObjectSieveOptions {
    pub fn new(filters: Vec<(KeyMatcher, ValueMatcher)>) -> Self {
        Self {
            filters,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }

    /// Single-pair shorthand.
    pub fn entry(key: impl Into<KeyMatcher>, value: impl Into<ValueMatcher>) -> Self {
        Self::new(vec![(key.into(), value.into())])
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }
}

enum Mode {
    /// Outside a root object; everything passes.
    Pass,
    /// Inside an undecided root object; tokens buffer while an inner
    /// [`PackEntry`] surfaces candidate entries.
    Buffering {
        buf: Vec<Token>,
        pack: Box<PackEntry>,
        object_depth: usize,
    },
    /// Decision made: flush-through until the object ends.
    Releasing { object_depth: usize },
    /// Decision made: swallow until the object ends.
    Discarding { object_depth: usize },
}

struct ObjectSieve {
    pairs: Vec<(KeyMatcher, ValueMatcher)>,
    separator: String,
    /// With exactly one literal key filter, a non-accepting entry is
    /// conclusive and the object discards immediately instead of waiting
    /// for its end.
    single_literal: bool,
    owner: OwnerId,
    tracker: PathTracker,
    mode: Mode,
}

impl ObjectSieve {
    fn new(options: ObjectSieveOptions) -> Self {
        let single_literal =
            options.filters.len() == 1 && options.filters[0].0.is_single_literal();
        Self {
            pairs: options.filters,
            separator: options.separator,
            single_literal,
            owner: OwnerId::new(),
            tracker: PathTracker::new(),
            mode: Mode::Pass,
        }
    }

    /// A root object sits at depth 0, or at depth 1 under the outermost
    /// array.
    fn at_root_object_position(&self) -> bool {
        let stack = self.tracker.stack();
        let enclosing = &stack[..stack.len() - 1];
        enclosing.is_empty()
            || (enclosing.len() == 1 && matches!(enclosing[0], PathComponent::Index(_)))
    }

    fn inner_pack(&self) -> Box<PackEntry> {
        let keys: Vec<KeyMatcher> = self.pairs.iter().map(|(k, _)| k.clone()).collect();
        Box::new(PackEntry::new(
            PackEntryOptions::new(KeyMatcher::Any(keys))
                .separator(self.separator.clone())
                .owner(self.owner),
        ))
    }

    /// None: undecided. Some(true): release. Some(false): conclusively
    /// unmatched.
    fn decide(&self, inner_out: &[Token]) -> Option<bool> {
        for token in inner_out {
            let entry = match token {
                Token::PackedEntry(entry) if entry.owner == Some(self.owner) => entry,
                _ => continue,
            };
            let path = join_path(&entry.stack, &self.separator);
            let mut key_matched = false;
            for (key_filter, value_filter) in &self.pairs {
                if key_filter.matches(&path).is_some() {
                    key_matched = true;
                    if value_filter.accepts(&entry.value) {
                        return Some(true);
                    }
                }
            }
            if key_matched && self.single_literal {
                return Some(false);
            }
        }
        None
    }
}

impl TokenMachine for ObjectSieve {
    fn advance(&mut self, token: Token) -> Result<Vec<Token>, PipelineError> {
        if token.is_passthrough() {
            return Ok(vec![token]);
        }
        self.tracker.update(&token);

        let mode = std::mem::replace(&mut self.mode, Mode::Pass);
        match mode {
            Mode::Pass => {
                if matches!(token, Token::StartObject) && self.at_root_object_position() {
                    let mut pack = self.inner_pack();
                    pack.advance(token.clone())?;
                    self.mode = Mode::Buffering {
                        buf: vec![token],
                        pack,
                        object_depth: self.tracker.depth(),
                    };
                    Ok(Vec::new())
                } else {
                    self.mode = Mode::Pass;
                    Ok(vec![token])
                }
            }
            Mode::Buffering {
                mut buf,
                mut pack,
                object_depth,
            } => {
                buf.push(token.clone());
                let inner_out = pack.advance(token.clone())?;
                let decision = self.decide(&inner_out);
                let ended = matches!(token, Token::EndObject)
                    && self.tracker.depth() + 1 == object_depth;
                match decision {
                    Some(true) => {
                        debug!(
                            target: "jsonflow::filters",
                            buffered = buf.len(),
                            "object_sieve releasing object"
                        );
                        self.mode = if ended {
                            Mode::Pass
                        } else {
                            Mode::Releasing { object_depth }
                        };
                        Ok(buf)
                    }
                    Some(false) => {
                        debug!(target: "jsonflow::filters", "object_sieve discarding object");
                        self.mode = if ended {
                            Mode::Pass
                        } else {
                            Mode::Discarding { object_depth }
                        };
                        Ok(Vec::new())
                    }
                    None if ended => {
                        // Undecided at the object's end defaults to discard.
                        debug!(target: "jsonflow::filters", "object_sieve discarding undecided object");
                        self.mode = Mode::Pass;
                        Ok(Vec::new())
                    }
                    None => {
                        self.mode = Mode::Buffering {
                            buf,
                            pack,
                            object_depth,
                        };
                        Ok(Vec::new())
                    }
                }
            }
            Mode::Releasing { object_depth } => {
                let ended = matches!(token, Token::EndObject)
                    && self.tracker.depth() + 1 == object_depth;
                self.mode = if ended {
                    Mode::Pass
                } else {
                    Mode::Releasing { object_depth }
                };
                Ok(vec![token])
            }
            Mode::Discarding { object_depth } => {
                let ended = matches!(token, Token::EndObject)
                    && self.tracker.depth() + 1 == object_depth;
                self.mode = if ended {
                    Mode::Pass
                } else {
                    Mode::Discarding { object_depth }
                };
                Ok(Vec::new())
            }
        }
    }
}

/// Buffer every root-level non-array object until one of its entries decides
/// its fate: released objects contribute exactly their original tokens in
/// order, discarded objects contribute nothing. Non-objects at root level
/// pass through unchanged.
///
/// The whole object can sit in the buffer at once; pass only metadata-sized
/// objects through the sieve, or arrange matching entries to appear early.
pub fn object_sieve<S>(input: S, options: ObjectSieveOptions) -> impl Stream<Item = TokenResult>
where
    S: Stream<Item = TokenResult>,
{
    pump(input, ObjectSieve::new(options))
}
