//! `sqltag` core: query tags, the ambient per-task tag scope stack, and query
//! annotation helpers.

pub mod metadata;
pub mod query;
pub mod scope;
pub mod tag;

pub use metadata::{Metadata, MetadataError};
pub use query::{QueryTagExt, SqlQuery, Taggable};
pub use scope::{begin, current, TagScope};
pub use tag::Tag;
