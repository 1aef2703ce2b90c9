//! Papeline Loader - the Shard Decoder, Bulk Loader, Title Loader and Corpusid
//! Extractor (C2, C3, C6, C4.10): everything that turns gzip NDJSON shards into
//! COPYed rows and finalises the resulting temp table into place.

pub mod decode;
pub mod extractor;
pub mod finalize;
pub mod pipeline;
pub mod title;

pub use pipeline::{LoadConfig, LoadReport, RowKind, copy_sql_for, copy_sql_for_corpusid_only};
