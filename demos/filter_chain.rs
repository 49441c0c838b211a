//! Token-level filtering over lexed JSON text: watch packed entries surface
//! and select one entry's array out of a document.
//!
//! Run with: cargo run --example filter_chain

use futures_util::{pin_mut, StreamExt};

use jsonflow::emitter::EmitterOptions;
use jsonflow::filters::{pack_entry, select_entry, PackEntryOptions, SelectEntryOptions};
use jsonflow::lexer::{lex_reader, LexerOptions};
use jsonflow::{Emitter, Token};

const DOCUMENT: &str = r#"{
    "meta": {"source": "demo", "count": 2},
    "lists": [
        {"name": "groceries", "open": 3},
        {"name": "errands", "open": 0}
    ]
}"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Surface every list name as a packed entry while the stream flows by.
    let tokens = lex_reader(DOCUMENT.as_bytes(), LexerOptions::big_string());
    let packed = pack_entry(
        tokens,
        PackEntryOptions::new(regex::Regex::new(r"^lists\.\d+\.name$")?),
    );
    pin_mut!(packed);
    while let Some(token) = packed.next().await {
        if let Token::PackedEntry(entry) = token? {
            println!("saw list name {} at {:?}", entry.value, entry.stack);
        }
    }

    // Select the lists array; its elements stream as top-level values.
    let tokens = lex_reader(DOCUMENT.as_bytes(), LexerOptions::big_string());
    let selected = select_entry(tokens, SelectEntryOptions::new("lists"));
    pin_mut!(selected);
    let mut emitter = Emitter::new(EmitterOptions { make_array: true });
    let mut out = Vec::new();
    while let Some(token) = selected.next().await {
        out.extend(emitter.write(&token?)?);
    }
    out.extend(emitter.finish()?);
    println!("selected: {}", String::from_utf8(out)?);
    Ok(())
}
