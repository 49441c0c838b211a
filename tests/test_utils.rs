use async_trait::async_trait;
use futures_core::Stream;
use futures_util::{pin_mut, stream, StreamExt};
use serde_json::Value;

use jsonflow::emitter::{Emitter, EmitterOptions};
use jsonflow::error::SourceError;
use jsonflow::lexer::{lex_slice, LexerOptions};
use jsonflow::source::{Page, PagedSource};
use jsonflow::token::{Token, TokenResult};

/// Tokenize a complete test document, panicking on invalid JSON.
pub fn lex(input: &str, options: LexerOptions) -> Vec<Token> {
    lex_slice(input.as_bytes(), options).expect("valid test JSON")
}

/// A finite all-Ok token stream.
pub fn token_stream(tokens: Vec<Token>) -> impl Stream<Item = TokenResult> {
    stream::iter(tokens.into_iter().map(Ok))
}

/// Collect a token stream, panicking on the first error.
pub async fn collect(input: impl Stream<Item = TokenResult>) -> Vec<Token> {
    pin_mut!(input);
    let mut out = Vec::new();
    while let Some(item) = input.next().await {
        out.push(item.expect("unexpected pipeline error"));
    }
    out
}

/// Collect a token stream, keeping errors as items.
pub async fn collect_results(input: impl Stream<Item = TokenResult>) -> Vec<TokenResult> {
    pin_mut!(input);
    input.collect().await
}

/// Render tokens back to JSON text.
pub fn render(tokens: &[Token], options: EmitterOptions) -> String {
    let mut emitter = Emitter::new(options);
    let mut out = Vec::new();
    for token in tokens {
        out.extend(emitter.write(token).expect("valid token sequence"));
    }
    out.extend(emitter.finish().expect("complete token sequence"));
    String::from_utf8(out).expect("emitter output is UTF-8")
}

/// Render tokens and parse the result for structural comparison.
pub fn render_value(tokens: &[Token]) -> Value {
    serde_json::from_str(&render(tokens, EmitterOptions::default())).expect("rendered valid JSON")
}

/// A paginated source backed by fixed pages; the cursor is the page index.
pub struct StaticPages {
    pages: Vec<Vec<Value>>,
}

impl StaticPages {
    pub fn new(pages: Vec<Vec<Value>>) -> Self {
        Self { pages }
    }
}

#[async_trait]
impl PagedSource for StaticPages {
    async fn fetch_page(&self, cursor: Option<String>) -> Result<Page, SourceError> {
        let index: usize = match cursor {
            Some(c) => c
                .parse()
                .map_err(|_| SourceError::Fetch(format!("bad cursor {c:?}")))?,
            None => 0,
        };
        let items = self.pages.get(index).cloned().unwrap_or_default();
        let next = (index + 1 < self.pages.len()).then(|| (index + 1).to_string());
        Ok(Page { items, next })
    }
}
