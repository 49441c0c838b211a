//! The inflation primitive: expanding one input item into many output items
//! under downstream backpressure.
//!
//! In this pipeline the "flow" signal of a push-based stream maps onto the
//! pull model directly: a `yield` suspends the transformer until the
//! downstream consumer polls again, so a single input chunk may inflate into
//! an unbounded number of output chunks without buffering them anywhere and
//! without blocking the pipeline. This module is the only concurrency
//! machinery in the core; every filter is a sequential state machine driven
//! through [`pump`].

use std::pin::Pin;

use async_stream::stream;
use futures_core::Stream;
use futures_util::{pin_mut, StreamExt};

use crate::error::PipelineError;
use crate::token::{Token, TokenResult};

/// A multi-shape chunk source: a single chunk, a batch, a synchronous
/// iterator, an asynchronous stream, or a zero-argument producer of any of
/// these.
pub enum Chunks<T> {
    One(T),
    Many(Vec<T>),
    Iter(Box<dyn Iterator<Item = T> + Send>),
    Stream(Pin<Box<dyn Stream<Item = T> + Send>>),
    Producer(Box<dyn FnOnce() -> Chunks<T> + Send>),
}

impl<T: std::fmt::Debug> std::fmt::Debug for Chunks<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Chunks::One(item) => f.debug_tuple("One").field(item).finish(),
            Chunks::Many(items) => f.debug_tuple("Many").field(items).finish(),
            Chunks::Iter(_) => f.write_str("Iter(..)"),
            Chunks::Stream(_) => f.write_str("Stream(..)"),
            Chunks::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// Flatten a stream of [`Chunks`] into a stream of chunks, pushing each chunk
/// downstream in order and suspending per chunk when the consumer is not
/// pulling.
pub fn inflate<T, S>(input: S) -> impl Stream<Item = T>
where
    S: Stream<Item = Chunks<T>>,
{
    stream! {
        pin_mut!(input);
        while let Some(chunks) = input.next().await {
            let mut chunks = chunks;
            loop {
                match chunks {
                    Chunks::Producer(produce) => {
                        chunks = produce();
                        continue;
                    }
                    Chunks::One(item) => yield item,
                    Chunks::Many(items) => {
                        for item in items {
                            yield item;
                        }
                    }
                    Chunks::Iter(iter) => {
                        for item in iter {
                            yield item;
                        }
                    }
                    Chunks::Stream(inner) => {
                        pin_mut!(inner);
                        while let Some(item) = inner.next().await {
                            yield item;
                        }
                    }
                }
                break;
            }
        }
    }
}

/// A per-token filter state machine: consumes one token, emits zero or more.
///
/// An `Err` from either method tears the pipeline down; it is surfaced once
/// downstream and nothing further is pulled from upstream.
pub trait TokenMachine {
    fn advance(&mut self, token: Token) -> Result<Vec<Token>, PipelineError>;

    /// Called once after the input is exhausted.
    fn finish(&mut self) -> Result<Vec<Token>, PipelineError> {
        Ok(Vec::new())
    }
}

/// Drive a [`TokenMachine`] over a fallible token stream through the
/// inflation path. Upstream errors are forwarded and terminate the stream.
pub fn pump<S, M>(input: S, mut machine: M) -> impl Stream<Item = TokenResult>
where
    S: Stream<Item = TokenResult>,
    M: TokenMachine,
{
    let expanded = stream! {
        pin_mut!(input);
        while let Some(item) = input.next().await {
            match item {
                Ok(token) => match machine.advance(token) {
                    Ok(out) => yield Chunks::Many(out.into_iter().map(Ok).collect()),
                    Err(e) => {
                        yield Chunks::One(Err(e));
                        return;
                    }
                },
                Err(e) => {
                    yield Chunks::One(Err(e));
                    return;
                }
            }
        }
        match machine.finish() {
            Ok(out) => yield Chunks::Many(out.into_iter().map(Ok).collect()),
            Err(e) => yield Chunks::One(Err(e)),
        }
    };
    inflate(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn inflate_flattens_every_shape_in_order() {
        let input = stream::iter(vec![
            Chunks::One(1),
            Chunks::Many(vec![2, 3]),
            Chunks::Iter(Box::new(4..=5)),
            Chunks::Stream(Box::pin(stream::iter(vec![6]))),
            Chunks::Producer(Box::new(|| Chunks::Many(vec![7, 8]))),
        ]);
        let out: Vec<i32> = inflate(input).collect().await;
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    struct Doubler;

    impl TokenMachine for Doubler {
        fn advance(&mut self, token: Token) -> Result<Vec<Token>, PipelineError> {
            Ok(vec![token.clone(), token])
        }

        fn finish(&mut self) -> Result<Vec<Token>, PipelineError> {
            Ok(vec![Token::Final])
        }
    }

    #[tokio::test]
    async fn pump_drives_machine_and_finishes() {
        let input = stream::iter(vec![Ok(Token::TrueValue)]);
        let out: Vec<TokenResult> = pump(input, Doubler).collect().await;
        let tokens: Vec<Token> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(tokens, vec![Token::TrueValue, Token::TrueValue, Token::Final]);
    }

    #[tokio::test]
    async fn pump_forwards_upstream_error_and_stops() {
        let input = stream::iter(vec![
            Ok(Token::NullValue),
            Err(PipelineError::MalformedTokenStream("boom".into())),
            Ok(Token::TrueValue),
        ]);
        let out: Vec<TokenResult> = pump(input, Doubler).collect().await;
        assert_eq!(out.len(), 3);
        assert!(out[0].is_ok() && out[1].is_ok());
        assert!(out[2].is_err());
    }
}
