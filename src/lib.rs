pub mod assembler;
pub mod depth;
pub mod emitter;
pub mod error;
pub mod filters;
pub mod inflate;
pub mod lexer;
pub mod matcher;
pub mod path;
pub mod sink;
pub mod source;
pub mod token;

// Convenient re-exports
pub use assembler::FullAssembler;
pub use depth::DepthTracker;
pub use emitter::{Emitter, EmitterOptions};
pub use error::{LexError, PipelineError, SourceError};
pub use filters::{inject_entry, object_sieve, omit_entry, pack_entry, select_entry};
pub use lexer::{Lexer, LexerOptions};
pub use matcher::{KeyMatcher, ValueMatcher};
pub use path::PathTracker;
pub use token::{BoxTokenStream, OwnerId, PathComponent, Token, TokenResult};
