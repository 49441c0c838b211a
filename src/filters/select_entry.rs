//! Keeps only the value of the first matching entry per root value.

use futures_core::Stream;

use crate::depth::DepthTracker;
use crate::error::PipelineError;
use crate::inflate::{pump, TokenMachine};
use crate::matcher::{KeyMatcher, DEFAULT_SEPARATOR};
use crate::token::{OwnerId, Token, TokenResult};

use super::pack_entry::{pack_entry, PackEntryOptions};

/// Configuration for [`select_entry`].
#[derive(Debug)]
pub struct SelectEntryOptions {
    pub filters: KeyMatcher,
    pub separator: String,
    /// When the selected value is an array, suppress its own delimiters so
    /// each element streams as a top-level value. A selected object or
    /// scalar passes through whole either way.
    pub discard_enclosing_array: bool,
}

impl SelectEntryOptions {
    pub fn new(filters: impl Into<KeyMatcher>) -> Self {
        Self {
            filters: filters.into(),
            separator: DEFAULT_SEPARATOR.to_string(),
            discard_enclosing_array: true,
        }
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn discard_enclosing_array(mut self, discard: bool) -> Self {
        self.discard_enclosing_array = discard;
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum Region {
    Outside,
    /// Inside the matched entry's key tokens (dropped).
    Key,
    /// Inside the matched entry's value tokens (kept).
    Value {
        first: bool,
        unwrap: bool,
        rel_depth: usize,
    },
    /// A later match in the same root value (dropped whole).
    SkippingValue,
}

struct SelectEntry {
    owner: OwnerId,
    discard_enclosing_array: bool,
    region: Region,
    taken: bool,
    depth: DepthTracker,
}

impl SelectEntry {
    fn new(owner: OwnerId, discard_enclosing_array: bool) -> Self {
        Self {
            owner,
            discard_enclosing_array,
            region: Region::Outside,
            taken: false,
            depth: DepthTracker::new(),
        }
    }
}

impl TokenMachine for SelectEntry {
    fn advance(&mut self, token: Token) -> Result<Vec<Token>, PipelineError> {
        if token.is_synthetic() {
            if token.owner() != Some(self.owner) {
                return Ok(vec![token]);
            }
            match token {
                Token::SparseKeyStart(_) => self.region = Region::Key,
                Token::SparseKeyEnd(_) => self.region = Region::Outside,
                Token::SparseValueStart(_) => {
                    self.region = if self.taken {
                        Region::SkippingValue
                    } else {
                        self.taken = true;
                        Region::Value {
                            first: true,
                            unwrap: false,
                            rel_depth: 0,
                        }
                    };
                }
                Token::SparseValueEnd(_) => self.region = Region::Outside,
                _ => {}
            }
            return Ok(Vec::new());
        }
        if matches!(token, Token::Final) {
            return Ok(vec![token]);
        }

        self.depth.update(&token);
        let out = match &mut self.region {
            Region::Key | Region::SkippingValue => Vec::new(),
            Region::Value {
                first,
                unwrap,
                rel_depth,
            } => {
                let mut emit = true;
                if *first {
                    *first = false;
                    if matches!(token, Token::StartArray) && self.discard_enclosing_array {
                        *unwrap = true;
                        emit = false;
                    }
                }
                match token {
                    Token::StartObject | Token::StartArray => *rel_depth += 1,
                    Token::EndObject | Token::EndArray => *rel_depth -= 1,
                    _ => {}
                }
                if *unwrap && *rel_depth == 0 && matches!(token, Token::EndArray) {
                    // The unwrapped array's own closing delimiter.
                    emit = false;
                }
                if emit {
                    vec![token]
                } else {
                    Vec::new()
                }
            }
            Region::Outside => Vec::new(),
        };
        // A root value just completed: the next root starts a fresh
        // first-match window.
        if self.depth.at_root() {
            self.taken = false;
        }
        Ok(out)
    }
}

/// Keep only the value of the first entry per root value whose key path
/// matches, discarding everything else. With `discard_enclosing_array` (the
/// default), a selected array is unwrapped and its elements stream as
/// top-level values.
pub fn select_entry<S>(input: S, options: SelectEntryOptions) -> impl Stream<Item = TokenResult>
where
    S: Stream<Item = TokenResult>,
{
    let owner = OwnerId::new();
    let discard_enclosing_array = options.discard_enclosing_array;
    let packed = pack_entry(
        input,
        PackEntryOptions::new(options.filters)
            .separator(options.separator)
            .sparse(true)
            .owner(owner),
    );
    pump(packed, SelectEntry::new(owner, discard_enclosing_array))
}
