mod test_utils;

use jsonflow::filters::{object_sieve, ObjectSieveOptions};
use jsonflow::lexer::LexerOptions;
use jsonflow::{KeyMatcher, Token, ValueMatcher};
use regex::Regex;
use serde_json::json;

use crate::test_utils::{collect, lex, render, render_value, token_stream};

fn five_objects() -> Vec<Token> {
    let mut tokens = Vec::new();
    for i in 1..=5 {
        tokens.extend(lex(
            &format!(r#"{{"name":"object-{i}"}}"#),
            LexerOptions::packed(),
        ));
    }
    tokens
}

/// One of five root objects survives the sieve; the others contribute
/// nothing downstream.
#[tokio::test]
async fn releases_only_the_matching_object() {
    let out = collect(object_sieve(
        token_stream(five_objects()),
        ObjectSieveOptions::entry("name", "object-3"),
    ))
    .await;
    assert_eq!(render(&out, Default::default()), r#"{"name":"object-3"}"#);
}

/// Same decision under an array of root objects; the array's own
/// delimiters pass through unchanged.
#[tokio::test]
async fn sieves_objects_under_a_root_array() {
    let input = lex(
        r#"[{"name":"a"},{"name":"b"},{"name":"c"}]"#,
        LexerOptions::packed(),
    );
    let out = collect(object_sieve(
        token_stream(input),
        ObjectSieveOptions::entry("name", "b"),
    ))
    .await;
    assert_eq!(render_value(&out), json!([{"name": "b"}]));
}

/// A released object contributes exactly its original tokens in order.
#[tokio::test]
async fn released_object_is_token_identical() {
    let original = lex(
        r#"{"name":"keep","nested":{"deep":[1,2]},"tail":true}"#,
        LexerOptions::big_string(),
    );
    let out = collect(object_sieve(
        token_stream(original.clone()),
        ObjectSieveOptions::entry("name", "keep"),
    ))
    .await;
    assert_eq!(out, original);
}

/// Entries after the deciding one flow straight through once released.
#[tokio::test]
async fn release_happens_at_the_deciding_entry() {
    let input = lex(
        r#"{"name":"hit","later":"also kept"}"#,
        LexerOptions::packed(),
    );
    let out = collect(object_sieve(
        token_stream(input),
        ObjectSieveOptions::entry("name", "hit"),
    ))
    .await;
    assert_eq!(
        render_value(&out),
        json!({"name": "hit", "later": "also kept"})
    );
}

/// Non-objects at root level pass through unchanged.
#[tokio::test]
async fn non_objects_pass_through() {
    let mut input = lex(r#"[1,"two",[3]]"#, LexerOptions::packed());
    input.extend(lex(r#"{"name":"drop"}"#, LexerOptions::packed()));
    input.extend(lex("42", LexerOptions::packed()));
    let out = collect(object_sieve(
        token_stream(input),
        ObjectSieveOptions::entry("name", "nope"),
    ))
    .await;
    assert_eq!(render(&out, Default::default()), "[1,\"two\",[3]]\n42");
}

/// Deep-subset matching releases on structural inclusion, not equality.
#[tokio::test]
async fn contains_matcher_checks_subset() {
    let input = lex(
        r#"[{"meta":{"tags":["a","b"],"id":1}},{"meta":{"tags":["c"],"id":2}}]"#,
        LexerOptions::packed(),
    );
    let out = collect(object_sieve(
        token_stream(input),
        ObjectSieveOptions::entry("meta", ValueMatcher::Contains(json!({"tags": ["b"]}))),
    ))
    .await;
    assert_eq!(render_value(&out), json!([{"meta": {"tags": ["a", "b"], "id": 1}}]));
}

/// Predicate matchers get the fully assembled entry value.
#[tokio::test]
async fn predicate_matcher_decides() {
    let input = lex(
        r#"[{"size":5},{"size":50}]"#,
        LexerOptions::packed(),
    );
    let out = collect(object_sieve(
        token_stream(input),
        ObjectSieveOptions::entry(
            "size",
            ValueMatcher::predicate(|v| v.as_i64().map_or(false, |n| n > 10)),
        ),
    ))
    .await;
    assert_eq!(render_value(&out), json!([{"size": 50}]));
}

/// With a single literal key filter, a non-matching entry is conclusive and
/// the rest of the object is swallowed without buffering; a regex filter
/// defers the decision to the object's end. Both configurations produce the
/// same output.
#[tokio::test]
async fn early_and_deferred_discard_agree() {
    let input = lex(
        r#"[{"name":"miss","huge":[1,2,3,4]},{"name":"hit","huge":[5]}]"#,
        LexerOptions::packed(),
    );
    let expected = json!([{"name": "hit", "huge": [5]}]);

    let early = collect(object_sieve(
        token_stream(input.clone()),
        ObjectSieveOptions::entry("name", "hit"),
    ))
    .await;
    assert_eq!(render_value(&early), expected);

    let deferred = collect(object_sieve(
        token_stream(input),
        ObjectSieveOptions::entry(KeyMatcher::Pattern(Regex::new("^name$").unwrap()), "hit"),
    ))
    .await;
    assert_eq!(render_value(&deferred), expected);
}

/// Multiple filter pairs: any accepted pair releases the object.
#[tokio::test]
async fn multiple_pairs_release_on_any_match() {
    let input = lex(
        r#"[{"kind":"list"},{"kind":"task"},{"kind":"other"}]"#,
        LexerOptions::packed(),
    );
    let out = collect(object_sieve(
        token_stream(input),
        ObjectSieveOptions::new(vec![
            (KeyMatcher::from("kind"), ValueMatcher::from("list")),
            (KeyMatcher::from("kind"), ValueMatcher::from("task")),
        ]),
    ))
    .await;
    assert_eq!(render_value(&out), json!([{"kind": "list"}, {"kind": "task"}]));
}

/// An object none of whose entries decide anything discards at its end.
#[tokio::test]
async fn undecided_objects_discard_at_end() {
    let input = lex(
        r#"[{"unrelated":1},{"name":"hit"}]"#,
        LexerOptions::packed(),
    );
    let out = collect(object_sieve(
        token_stream(input),
        ObjectSieveOptions::entry(KeyMatcher::Pattern(Regex::new("^name$").unwrap()), "hit"),
    ))
    .await;
    assert_eq!(render_value(&out), json!([{"name": "hit"}]));
}

/// The sieve adds no synthetic tokens of its own.
#[tokio::test]
async fn no_synthetic_tokens_leak() {
    let out = collect(object_sieve(
        token_stream(five_objects()),
        ObjectSieveOptions::entry("name", "object-3"),
    ))
    .await;
    assert!(out.iter().all(|t| !t.is_synthetic()));
}
