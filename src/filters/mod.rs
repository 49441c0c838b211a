//! The token-level filters: composable transformers over token streams.

pub mod inject_entry;
pub mod object_sieve;
pub mod omit_entry;
pub mod pack_entry;
pub mod select_entry;

pub use inject_entry::{
    inject_entry, InjectEntryOptions, StaticValue, ValueStreamFactory, ValueTokenStream,
};
pub use object_sieve::{object_sieve, ObjectSieveOptions};
pub use omit_entry::{omit_entry, OmitEntryOptions};
pub use pack_entry::{pack_entry, PackEntry, PackEntryOptions};
pub use select_entry::{select_entry, SelectEntryOptions};
