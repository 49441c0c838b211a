//! Drops matching entries from the stream.

use futures_core::Stream;

use crate::error::PipelineError;
use crate::inflate::{pump, TokenMachine};
use crate::matcher::{KeyMatcher, DEFAULT_SEPARATOR};
use crate::token::{OwnerId, Token, TokenResult};

use super::pack_entry::{pack_entry, PackEntryOptions};

/// Configuration for [`omit_entry`].
#[derive(Debug)]
pub struct OmitEntryOptions {
    pub filters: KeyMatcher,
    pub separator: String,
}

impl OmitEntryOptions {
    pub fn new(filters: impl Into<KeyMatcher>) -> Self {
        Self {
            filters: filters.into(),
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }
}

/// Drops the four sparse bracket tokens carrying one specific owner.
struct DropSparse {
    owner: OwnerId,
}

impl TokenMachine for DropSparse {
    fn advance(&mut self, token: Token) -> Result<Vec<Token>, PipelineError> {
        let ours = matches!(
            token,
            Token::SparseKeyStart(_)
                | Token::SparseKeyEnd(_)
                | Token::SparseValueStart(_)
                | Token::SparseValueEnd(_)
        ) && token.owner() == Some(self.owner);
        if ours {
            Ok(Vec::new())
        } else {
            Ok(vec![token])
        }
    }
}

/// Remove every entry whose key path matches. Non-matching entries pass
/// through in their original order.
///
/// Chains [`pack_entry`] in sparse + discard mode under a private owner, then
/// strips that owner's bracket tokens, leaving nothing of the matched entry.
pub fn omit_entry<S>(input: S, options: OmitEntryOptions) -> impl Stream<Item = TokenResult>
where
    S: Stream<Item = TokenResult>,
{
    let owner = OwnerId::new();
    let packed = pack_entry(
        input,
        PackEntryOptions::new(options.filters)
            .separator(options.separator)
            .sparse(true)
            .discard_component_tokens(true)
            .owner(owner),
    );
    pump(packed, DropSparse { owner })
}
