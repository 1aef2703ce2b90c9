//! Benchmarks the shard decoder's hot loop (§Design Notes: "regex fast path for
//! primary-key extraction ... to avoid paying JSON-parse cost") against an
//! alternative JSON parser, mirroring `papeline-semantic-scholar`'s `parse_s2`
//! bench in the pack this crate was reworked from.

use papeline_loader::decode::{decode_record, scan_corpusid};
use papeline_core::Dataset;

#[derive(serde::Deserialize)]
struct CorpusIdProbe {
    #[serde(default)]
    #[allow(dead_code)]
    corpusid: i64,
}

fn sample_lines(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            format!(
                r#"{{"corpusid":{i},"content":{{"body":"sample body text {i}","bibliography":["a","b","c"]}}}}"#
            )
        })
        .collect()
}

#[divan::bench(args = [1_000, 10_000])]
fn decode_record_serde_json(bencher: divan::Bencher, n: usize) {
    let lines = sample_lines(n);
    bencher.bench(|| {
        for line in &lines {
            let _ = decode_record(line, Dataset::S2orc);
        }
    });
}

#[divan::bench(args = [1_000, 10_000])]
fn corpusid_scan_fast_path(bencher: divan::Bencher, n: usize) {
    let lines = sample_lines(n);
    bencher.bench(|| {
        for line in &lines {
            let _ = scan_corpusid(line.as_bytes());
        }
    });
}

#[divan::bench(args = [1_000, 10_000])]
fn corpusid_probe_sonic_rs(bencher: divan::Bencher, n: usize) {
    let lines = sample_lines(n);
    bencher.bench(|| {
        for line in &lines {
            let probe: CorpusIdProbe = sonic_rs::from_str(line).unwrap();
            std::hint::black_box(probe.corpusid);
        }
    });
}

fn main() {
    divan::main();
}
