//! Shard Decoder (C2): turns one NDJSON line into a COPY-ready TSV row for a given
//! dataset. Malformed lines and lines missing the fields a dataset requires are
//! skipped (return `None`) rather than treated as errors — whole-shard corruption
//! (truncated gzip, bad magic) is a decoder-level `io::Error` surfaced by the caller,
//! not something this module sees.

use papeline_core::{Dataset, tsv_escape};
use serde_json::Value;

/// Decode one line into a TSV row for `dataset`'s COPY target (primary key plus
/// payload columns, per §4.2/§4.3), or `None` if the line doesn't parse or lacks a
/// field this dataset requires. Not used for [`Dataset::Citations`] — see
/// [`decode_edge`] and [`decode_citation_payload`].
pub fn decode_record(line: &str, dataset: Dataset) -> Option<Vec<u8>> {
    let value: Value = serde_json::from_str(line).ok()?;

    match dataset {
        Dataset::Citations => None,
        Dataset::Authors => {
            let id = as_i64(value.get("authorid")?)?;
            Some(two_column_row(id, &without_key(&value, "authorid")))
        }
        Dataset::PublicationVenues => {
            let id = extract_publication_venue_id(&value)?;
            Some(two_column_row(id, &without_key(&value, "id")))
        }
        Dataset::Papers => {
            let id = as_i64(value.get("corpusid")?)?;
            let title = value.get("title")?.as_str()?;
            Some(format!("{id}\t{}\n", tsv_escape(title)).into_bytes())
        }
        Dataset::S2orc | Dataset::S2orcV2 => {
            let id = as_i64(value.get("corpusid")?)?;
            let payload = match value.get("content") {
                Some(content) => content.clone(),
                None => {
                    let body = value.get("body")?;
                    let bibliography = value.get("bibliography")?;
                    serde_json::json!({ "body": body, "bibliography": bibliography })
                }
            };
            Some(two_column_row(id, &payload))
        }
        Dataset::EmbeddingsSpecterV1 | Dataset::EmbeddingsSpecterV2 => {
            let id = as_i64(value.get("corpusid")?)?;
            let vector = value.get("vector")?;
            Some(two_column_row(id, vector))
        }
        Dataset::Abstracts => {
            let id = as_i64(value.get("corpusid")?)?;
            let payload = value.get("abstract")?;
            Some(two_column_row(id, payload))
        }
        Dataset::Tldrs => {
            let id = as_i64(value.get("corpusid")?)?;
            let payload = value.get("text")?;
            Some(two_column_row(id, payload))
        }
        Dataset::PaperIds => {
            let id = as_i64(value.get("corpusid")?)?;
            Some(format!("{id}\n").into_bytes())
        }
    }
}

/// Decode one `citations` shard line in edge mode: `(citingcorpusid, citedcorpusid)`,
/// emitted only when both are present (§4.2).
pub fn decode_edge(line: &str) -> Option<Vec<u8>> {
    let value: Value = serde_json::from_str(line).ok()?;
    let citing = as_i64(value.get("citingcorpusid")?)?;
    let cited = as_i64(value.get("citedcorpusid")?)?;
    Some(format!("{citing}\t{cited}\n").into_bytes())
}

/// Decode one `citations` shard line in payload mode (`temp_import`): two JSON text
/// fields alongside the synthetic id, used when citations carry their own metadata
/// rather than being loaded purely as raw edges.
pub fn decode_citation_payload(line: &str) -> Option<Vec<u8>> {
    let value: Value = serde_json::from_str(line).ok()?;
    let citing = value.get("citingcorpusid")?;
    let cited = value.get("citedcorpusid")?;
    Some(
        format!(
            "{}\t{}\n",
            tsv_escape(&citing.to_string()),
            tsv_escape(&cited.to_string())
        )
        .into_bytes(),
    )
}

/// Extract only the `corpusid` column for the cross-dataset corpusid extractor
/// (§4.10), via a byte-level regex-equivalent scan rather than full JSON parsing —
/// the hottest loop in the system, per the Design Notes.
pub fn decode_corpusid_only(line: &str) -> Option<Vec<u8>> {
    let id = scan_corpusid(line.as_bytes())?;
    Some(format!("{id}\n").into_bytes())
}

/// Byte-level scan for the first `"corpusid"\s*:\s*<digits>` occurrence, case
/// insensitive on the key, avoiding a full JSON parse. Returns `None` if not found or
/// if the digits don't fit in an `i64`.
pub fn scan_corpusid(line: &[u8]) -> Option<i64> {
    const NEEDLE: &[u8] = b"\"corpusid\"";
    let mut i = 0usize;
    while i + NEEDLE.len() <= line.len() {
        if line[i..].get(..NEEDLE.len())?.eq_ignore_ascii_case(NEEDLE) {
            let mut j = i + NEEDLE.len();
            while j < line.len() && (line[j] as char).is_whitespace() {
                j += 1;
            }
            if line.get(j) != Some(&b':') {
                i += 1;
                continue;
            }
            j += 1;
            while j < line.len() && (line[j] as char).is_whitespace() {
                j += 1;
            }
            let start = j;
            while j < line.len() && line[j].is_ascii_digit() {
                j += 1;
            }
            if j > start {
                let digits = std::str::from_utf8(&line[start..j]).ok()?;
                return digits.parse().ok();
            }
            i += 1;
        } else {
            i += 1;
        }
    }
    None
}

fn as_i64(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_str()?.parse().ok())
}

/// `publication_venues` keys its rows by the `id` field rather than `corpusid`/
/// `authorid` (§4.3).
fn extract_publication_venue_id(value: &Value) -> Option<i64> {
    as_i64(value.get("id")?)
}

fn without_key(value: &Value, key: &str) -> Value {
    let mut object = value.as_object().cloned().unwrap_or_default();
    object.remove(key);
    Value::Object(object)
}

fn two_column_row(id: i64, payload: &Value) -> Vec<u8> {
    let text = match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!("{id}\t{}\n", tsv_escape(&text)).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_s2orc_with_content_field() {
        let line = r#"{"corpusid":1,"content":{"x":"a"}}"#;
        let row = decode_record(line, Dataset::S2orc).unwrap();
        assert_eq!(String::from_utf8(row).unwrap(), "1\t{\"x\":\"a\"}\n");
    }

    #[test]
    fn synthesizes_s2orc_content_from_body_and_bibliography() {
        let line = r#"{"corpusid":2,"body":{"a":1},"bibliography":{"b":2}}"#;
        let row = decode_record(line, Dataset::S2orc).unwrap();
        let text = String::from_utf8(row).unwrap();
        assert!(text.starts_with("2\t"));
        assert!(text.contains("\"body\""));
        assert!(text.contains("\"bibliography\""));
    }

    #[test]
    fn skips_s2orc_without_content_or_body() {
        let line = r#"{"corpusid":3,"other":"x"}"#;
        assert!(decode_record(line, Dataset::S2orc).is_none());
    }

    #[test]
    fn skips_malformed_json() {
        assert!(decode_record("not json", Dataset::S2orc).is_none());
    }

    #[test]
    fn decodes_embeddings_vector() {
        let line = r#"{"corpusid":5,"vector":[0.1,0.2,0.3]}"#;
        let row = decode_record(line, Dataset::EmbeddingsSpecterV1).unwrap();
        assert_eq!(String::from_utf8(row).unwrap(), "5\t[0.1,0.2,0.3]\n");
    }

    #[test]
    fn skips_embeddings_without_vector() {
        let line = r#"{"corpusid":5}"#;
        assert!(decode_record(line, Dataset::EmbeddingsSpecterV1).is_none());
    }

    #[test]
    fn decodes_papers_title_with_tsv_escaping() {
        let line = r#"{"corpusid":7,"title":"A\tTitle\nwith\\escapes"}"#;
        let row = decode_record(line, Dataset::Papers).unwrap();
        assert_eq!(
            String::from_utf8(row).unwrap(),
            "7\tA\\tTitle\\nwith\\\\escapes\n"
        );
    }

    #[test]
    fn decodes_authors_with_whole_object_payload() {
        let line = r#"{"authorid":9,"name":"Jane"}"#;
        let row = decode_record(line, Dataset::Authors).unwrap();
        let text = String::from_utf8(row).unwrap();
        assert!(text.starts_with("9\t"));
        assert!(text.contains("\"name\":\"Jane\""));
        assert!(!text.contains("authorid"));
    }

    #[test]
    fn decodes_publication_venue_from_id_field() {
        let line = r#"{"id":11,"name":"Venue"}"#;
        let row = decode_record(line, Dataset::PublicationVenues).unwrap();
        assert!(String::from_utf8(row).unwrap().starts_with("11\t"));
    }

    #[test]
    fn decodes_paper_ids_as_single_column() {
        let line = r#"{"corpusid":13}"#;
        let row = decode_record(line, Dataset::PaperIds).unwrap();
        assert_eq!(String::from_utf8(row).unwrap(), "13\n");
    }

    #[test]
    fn decodes_citation_edge() {
        let line = r#"{"citingcorpusid":1,"citedcorpusid":2}"#;
        let row = decode_edge(line).unwrap();
        assert_eq!(String::from_utf8(row).unwrap(), "1\t2\n");
    }

    #[test]
    fn skips_edge_missing_one_side() {
        let line = r#"{"citingcorpusid":1}"#;
        assert!(decode_edge(line).is_none());
    }

    #[test]
    fn edge_with_identical_citing_and_cited_persists() {
        let line = r#"{"citingcorpusid":5,"citedcorpusid":5}"#;
        let row = decode_edge(line).unwrap();
        assert_eq!(String::from_utf8(row).unwrap(), "5\t5\n");
    }

    #[test]
    fn corpusid_zero_roundtrips() {
        let line = r#"{"corpusid":0,"content":{"x":"a"}}"#;
        let row = decode_record(line, Dataset::S2orc).unwrap();
        assert!(String::from_utf8(row).unwrap().starts_with("0\t"));
    }

    #[test]
    fn scan_corpusid_fast_path_finds_digits() {
        let line = br#"{"corpusid": 12345, "other": "stuff"}"#;
        assert_eq!(scan_corpusid(line), Some(12345));
    }

    #[test]
    fn scan_corpusid_fast_path_case_insensitive() {
        let line = br#"{"CorpusId":42}"#;
        assert_eq!(scan_corpusid(line), Some(42));
    }

    #[test]
    fn scan_corpusid_fast_path_missing_returns_none() {
        let line = br#"{"other":42}"#;
        assert_eq!(scan_corpusid(line), None);
    }

    #[test]
    fn decode_corpusid_only_matches_scan() {
        let line = r#"{"corpusid":99,"anything":"else"}"#;
        let row = decode_corpusid_only(line).unwrap();
        assert_eq!(String::from_utf8(row).unwrap(), "99\n");
    }
}
