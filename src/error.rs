use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("malformed token stream: {0}")]
    MalformedTokenStream(String),
    #[error("backpressure deadlock: value token stream high water mark reached")]
    BackpressureDeadlock,
    #[error("value token stream factory failed: {0}")]
    Factory(String),
    #[error("value token stream is not readable")]
    UnreadableValueStream,
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    #[error("source error: {0}")]
    Source(#[from] SourceError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
#[error("invalid JSON at byte {offset}: {message}")]
pub struct LexError {
    /// Absolute byte offset into the input where lexing failed.
    pub offset: u64,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("page fetch failed: {0}")]
    Fetch(String),
    #[error("malformed page payload: {0}")]
    Payload(#[source] serde_json::Error),
    #[error("content read failed: {0}")]
    Content(String),
}
