//! The S2ORC dataset kinds, their target tables, and primary-key columns.
//!
//! A pure lookup, shared by the catalogue (ledger paths), the bulk loader (COPY
//! column lists), the citation graph builder, and the CLI's `--dataset` flag.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dataset {
    Papers,
    Abstracts,
    Tldrs,
    Authors,
    PublicationVenues,
    Citations,
    S2orc,
    S2orcV2,
    EmbeddingsSpecterV1,
    EmbeddingsSpecterV2,
    PaperIds,
}

impl Dataset {
    pub const ALL: [Dataset; 11] = [
        Dataset::Papers,
        Dataset::Abstracts,
        Dataset::Tldrs,
        Dataset::Authors,
        Dataset::PublicationVenues,
        Dataset::Citations,
        Dataset::S2orc,
        Dataset::S2orcV2,
        Dataset::EmbeddingsSpecterV1,
        Dataset::EmbeddingsSpecterV2,
        Dataset::PaperIds,
    ];

    /// Canonical lowercase name, also used as the default table name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Papers => "papers",
            Self::Abstracts => "abstracts",
            Self::Tldrs => "tldrs",
            Self::Authors => "authors",
            Self::PublicationVenues => "publication_venues",
            Self::Citations => "citations",
            Self::S2orc => "s2orc",
            Self::S2orcV2 => "s2orc_v2",
            Self::EmbeddingsSpecterV1 => "embeddings_specter_v1",
            Self::EmbeddingsSpecterV2 => "embeddings_specter_v2",
            Self::PaperIds => "paper_ids",
        }
    }

    /// Primary-key column for this dataset's table. `Citations` has none (synthetic
    /// auto-id, duplicates allowed) — represented as `None`.
    pub const fn primary_key_column(self) -> Option<&'static str> {
        match self {
            Self::Authors => Some("authorid"),
            Self::PublicationVenues => Some("publicationvenueid"),
            Self::Citations => None,
            _ => Some("corpusid"),
        }
    }

    /// Whether records of this dataset carry a plain `corpusid` field usable by the
    /// byte-scan fast path (every kind except `authors`/`publication_venues`, whose
    /// natural id lives under a different key, and `citations`, which has two).
    pub const fn is_corpusid_keyed(self) -> bool {
        matches!(self.primary_key_column(), Some("corpusid"))
    }

    /// Payload field extracted from the record (beyond the primary key), or `None`
    /// when the whole remaining object is the payload (authors, publication_venues).
    pub const fn payload_field(self) -> Option<&'static str> {
        match self {
            Self::S2orc | Self::S2orcV2 => Some("content"),
            Self::EmbeddingsSpecterV1 | Self::EmbeddingsSpecterV2 => Some("vector"),
            Self::Papers => Some("title"),
            _ => None,
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
pub struct UnknownDataset(pub String);

impl fmt::Display for UnknownDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown dataset: {}", self.0)
    }
}

impl std::error::Error for UnknownDataset {}

impl FromStr for Dataset {
    type Err = UnknownDataset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dataset::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or_else(|| UnknownDataset(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_all_names() {
        for d in Dataset::ALL {
            assert_eq!(d.name().parse::<Dataset>().unwrap(), d);
        }
    }

    #[test]
    fn unknown_name_errors() {
        assert!("not_a_dataset".parse::<Dataset>().is_err());
    }

    #[test]
    fn primary_keys_match_spec_table() {
        assert_eq!(Dataset::Papers.primary_key_column(), Some("corpusid"));
        assert_eq!(Dataset::S2orc.primary_key_column(), Some("corpusid"));
        assert_eq!(Dataset::PaperIds.primary_key_column(), Some("corpusid"));
        assert_eq!(Dataset::Authors.primary_key_column(), Some("authorid"));
        assert_eq!(
            Dataset::PublicationVenues.primary_key_column(),
            Some("publicationvenueid")
        );
        assert_eq!(Dataset::Citations.primary_key_column(), None);
    }

    #[test]
    fn payload_fields() {
        assert_eq!(Dataset::S2orc.payload_field(), Some("content"));
        assert_eq!(Dataset::S2orcV2.payload_field(), Some("content"));
        assert_eq!(
            Dataset::EmbeddingsSpecterV1.payload_field(),
            Some("vector")
        );
        assert_eq!(Dataset::Authors.payload_field(), None);
    }
}
