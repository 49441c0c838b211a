mod test_utils;

use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{pin_mut, stream as futures_stream, StreamExt};
use serde_json::{json, Value};

use jsonflow::emitter::EmitterOptions;
use jsonflow::filters::{inject_entry, omit_entry, InjectEntryOptions, OmitEntryOptions};
use jsonflow::lexer::{lex_bytes, lex_slice, LexerOptions};
use jsonflow::sink::write_json_file;
use jsonflow::source::{content_stream, entity_stream, ContentBytes, ContentSource, Page, PagedSource};
use jsonflow::{FullAssembler, PipelineError, SourceError, Token};

use crate::test_utils::{collect, lex, render, render_value, token_stream, StaticPages};

/// tokens → emitter → lexer → tokens is the identity for a fixed profile.
#[tokio::test]
async fn round_trip_idempotence() {
    let documents = [
        r#"{"a":1,"b":"two","c":[true,null,{"d":-2.5e3}]}"#,
        r#"[{"name":"object-1"},{"name":"object-2"}]"#,
        r#""just a string""#,
    ];
    for doc in documents {
        for options in [LexerOptions::packed(), LexerOptions::big_string()] {
            let first = lex(doc, options);
            let text = render(&first, EmitterOptions::default());
            let second = lex_slice(text.as_bytes(), options).unwrap();
            assert_eq!(first, second, "round trip diverged for {doc}");
        }
    }
}

/// A filter chain built from lexed text: omit then inject, rendered back.
#[tokio::test]
async fn omit_then_inject_chain() {
    let input = lex(
        r#"[{"id":1,"secret":"x"},{"id":2,"secret":"y"}]"#,
        LexerOptions::packed(),
    );
    let cleaned = omit_entry(
        token_stream(input),
        OmitEntryOptions::new(regex::Regex::new(r"^\d+\.secret$").unwrap()),
    );
    let out = collect(inject_entry(
        cleaned,
        InjectEntryOptions::value("tag", json!("backup")),
    ))
    .await;
    assert_eq!(
        render_value(&out),
        json!([{"id": 1, "tag": "backup"}, {"id": 2, "tag": "backup"}])
    );
}

/// One thousand sizable objects through an injection, pulled one token at a
/// time: terminates, stays ordered, and every object gets its entry.
#[tokio::test]
async fn inflation_under_slow_consumer() {
    let input = stream! {
        yield Ok(Token::StartArray);
        for i in 0..1000 {
            yield Ok(Token::StartObject);
            yield Ok(Token::KeyValue("id".to_string()));
            yield Ok(Token::NumberValue(i.to_string()));
            yield Ok(Token::KeyValue("payload".to_string()));
            yield Ok(Token::StartString);
            for _ in 0..10 {
                yield Ok(Token::StringChunk("x".repeat(1024)));
            }
            yield Ok(Token::EndString);
            yield Ok(Token::EndObject);
        }
        yield Ok(Token::EndArray);
    };
    let out = inject_entry(
        input,
        InjectEntryOptions::value("children", json!(["c1", "c2", "c3"])),
    );
    pin_mut!(out);

    let mut injected = 0usize;
    let mut last = None;
    while let Some(item) = out.next().await {
        let token = item.expect("pipeline stayed healthy");
        if matches!(&token, Token::KeyValue(k) if k == "children") {
            injected += 1;
        }
        last = Some(token);
        tokio::task::yield_now().await;
    }
    assert_eq!(injected, 1000);
    assert_eq!(last, Some(Token::EndArray));
}

/// entity_stream shapes pages as one array of objects plus the final marker.
#[tokio::test]
async fn entity_stream_paginates() {
    let source = StaticPages::new(vec![
        vec![json!({"id": 1}), json!({"id": 2})],
        vec![json!({"id": 3})],
    ]);
    let out = collect(entity_stream(source)).await;
    assert_eq!(out.last(), Some(&Token::Final));
    assert_eq!(
        render_value(&out),
        json!([{"id": 1}, {"id": 2}, {"id": 3}])
    );
}

struct FailingPages;

#[async_trait]
impl PagedSource for FailingPages {
    async fn fetch_page(&self, _cursor: Option<String>) -> Result<Page, SourceError> {
        Err(SourceError::Fetch("service unavailable".into()))
    }
}

#[tokio::test]
async fn entity_stream_propagates_fetch_errors() {
    let results: Vec<_> = entity_stream(FailingPages).collect().await;
    assert!(matches!(
        results.last(),
        Some(Err(PipelineError::Source(SourceError::Fetch(_))))
    ));
}

struct AttachmentSource;

#[async_trait]
impl PagedSource for AttachmentSource {
    async fn fetch_page(&self, _cursor: Option<String>) -> Result<Page, SourceError> {
        Ok(Page {
            items: vec![json!({"id": "att-1"})],
            next: None,
        })
    }
}

#[async_trait]
impl ContentSource for AttachmentSource {
    async fn open_content(&self, _item: &Value) -> Result<ContentBytes, SourceError> {
        Ok(Box::pin(futures_stream::iter(vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ])))
    }
}

/// content_stream emits the big-string shape: metadata entries packed, the
/// content entry streamed chunk by chunk.
#[tokio::test]
async fn content_stream_streams_big_strings() {
    let out = collect(content_stream(AttachmentSource)).await;
    let chunk_count = out
        .iter()
        .filter(|t| matches!(t, Token::StringChunk(_)))
        .count();
    assert_eq!(chunk_count, 2);
    assert_eq!(
        render_value(&out),
        json!([{"id": "att-1", "content": "hello world"}])
    );
}

/// The lexer's byte-stream adapter survives arbitrary chunk boundaries.
#[tokio::test]
async fn lex_bytes_across_chunk_boundaries() {
    let text = r#"{"name":"object-3","n":12.5}"#.as_bytes();
    let chunks: Vec<Result<Bytes, std::io::Error>> = text
        .chunks(3)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    let tokens = collect(lex_bytes(
        futures_stream::iter(chunks),
        LexerOptions::big_string(),
    ))
    .await;
    let mut assembler = FullAssembler::new();
    for token in &tokens {
        assembler.consume(token);
    }
    assert!(assembler.done());
    assert_eq!(
        assembler.current(),
        Some(&json!({"name": "object-3", "n": 12.5}))
    );
}

/// The sink writes complete documents, and renames failures to `-partial`.
#[tokio::test]
async fn sink_writes_and_renames_partials() {
    let dir = std::env::temp_dir().join(format!("jsonflow-sink-{}", std::process::id()));
    tokio::fs::create_dir_all(&dir).await.unwrap();

    let good = dir.join("lists.json");
    let tokens = lex(r#"{"ok":true}"#, LexerOptions::packed());
    let written = write_json_file(
        token_stream(tokens),
        &good,
        EmitterOptions { make_array: true },
    )
    .await
    .unwrap();
    assert_eq!(written, r#"[{"ok":true}]"#.len() as u64);
    let text = tokio::fs::read_to_string(&good).await.unwrap();
    assert_eq!(text, r#"[{"ok":true}]"#);

    let bad = dir.join("tasks.json");
    let failing = futures_stream::iter(vec![
        Ok(Token::StartObject),
        Ok(Token::KeyValue("a".into())),
        Ok(Token::NumberValue("1".into())),
        Err(PipelineError::MalformedTokenStream("upstream died".into())),
    ]);
    let result = write_json_file(failing, &bad, EmitterOptions::default()).await;
    assert!(result.is_err());
    assert!(!bad.exists());
    assert!(dir.join("tasks.json-partial").exists());

    tokio::fs::remove_dir_all(&dir).await.unwrap();
}
