//! Token-stream sources over external paginated APIs.
//!
//! The application glue (lists, tasks, attachments) is the same shape
//! applied to different endpoints: drive a [`PagedSource`] page by page and
//! emit one JSON array of objects as tokens, with a final [`Token::Final`]
//! marker so downstream sinks know when to finalize.

use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::pin::Pin;
use tracing::{debug, instrument};

use crate::error::SourceError;
use crate::token::{value_tokens, Token, TokenResult};

/// One page of a paginated listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    pub items: Vec<Value>,
    /// Cursor of the next page, or `None` when the listing is exhausted.
    pub next: Option<String>,
}

/// A paginated external listing (lists, tasks, attachments, ...).
#[async_trait]
pub trait PagedSource: Send + Sync {
    async fn fetch_page(&self, cursor: Option<String>) -> Result<Page, SourceError>;
}

/// Byte stream of one attachment's content.
pub type ContentBytes = Pin<Box<dyn Stream<Item = Result<Bytes, SourceError>> + Send>>;

/// A listing whose items each carry a large out-of-band content body.
#[async_trait]
pub trait ContentSource: PagedSource {
    async fn open_content(&self, item: &Value) -> Result<ContentBytes, SourceError>;
}

/// Stream every item of a paginated listing as one JSON array of objects,
/// followed by [`Token::Final`].
#[instrument(target = "jsonflow::source", skip(source))]
pub fn entity_stream<S>(source: S) -> impl Stream<Item = TokenResult>
where
    S: PagedSource + 'static,
{
    stream! {
        yield Ok(Token::StartArray);
        let mut cursor = None;
        let mut pages = 0usize;
        loop {
            let page = match source.fetch_page(cursor.take()).await {
                Ok(page) => page,
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            };
            pages += 1;
            debug!(target: "jsonflow::source", page = pages, items = page.items.len(), "fetched page");
            for item in &page.items {
                for token in value_tokens(item) {
                    yield Ok(token);
                }
            }
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        yield Ok(Token::EndArray);
        yield Ok(Token::Final);
    }
}

/// Stream a listing whose items carry large content bodies: each item
/// becomes an object holding the item's entries plus a `content` entry whose
/// string value is streamed chunk by chunk, never materialized whole. The
/// token shape downstream is exactly the lexer's "big string" profile.
#[instrument(target = "jsonflow::source", skip(source))]
pub fn content_stream<S>(source: S) -> impl Stream<Item = TokenResult>
where
    S: ContentSource + 'static,
{
    stream! {
        yield Ok(Token::StartArray);
        let mut cursor = None;
        loop {
            let page = match source.fetch_page(cursor.take()).await {
                Ok(page) => page,
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            };
            for item in &page.items {
                yield Ok(Token::StartObject);
                if let Value::Object(map) = item {
                    for (key, value) in map {
                        yield Ok(Token::KeyValue(key.clone()));
                        for token in value_tokens(value) {
                            yield Ok(token);
                        }
                    }
                }
                yield Ok(Token::KeyValue("content".to_string()));
                yield Ok(Token::StartString);
                let mut bytes = match source.open_content(item).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        yield Err(e.into());
                        return;
                    }
                };
                while let Some(chunk) = bytes.next().await {
                    match chunk {
                        Ok(chunk) => {
                            let text = String::from_utf8_lossy(&chunk).into_owned();
                            yield Ok(Token::StringChunk(text));
                        }
                        Err(e) => {
                            yield Err(e.into());
                            return;
                        }
                    }
                }
                yield Ok(Token::EndString);
                yield Ok(Token::EndObject);
            }
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        yield Ok(Token::EndArray);
        yield Ok(Token::Final);
    }
}
