//! Test fixtures: random names and generated text payloads

use std::io::Write;

use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::common::Result;

const WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua", "enim",
    "ad", "minim", "veniam", "quis", "nostrud", "exercitation", "ullamco", "laboris", "nisi",
    "aliquip", "ex", "ea", "commodo", "consequat", "duis", "aute", "irure", "in", "voluptate",
];

/// Bucket name with the given prefix and a random suffix
pub fn bucket_name(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

/// Random object key
pub fn object_name() -> String {
    Uuid::new_v4().to_string()
}

/// Random lowercase alphanumeric string of exactly `len` characters
pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect()
}

/// A paragraph of generated text, a few hundred bytes long
pub fn paragraph() -> String {
    let mut rng = rand::thread_rng();
    let mut out = String::new();
    for _ in 0..rng.gen_range(3..6) {
        let words: Vec<&str> = (0..rng.gen_range(6..14))
            .filter_map(|_| WORDS.choose(&mut rng).copied())
            .collect();
        let mut sentence = words.join(" ");
        if !sentence.is_empty() {
            let first = sentence[..1].to_uppercase();
            sentence.replace_range(..1, &first);
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&sentence);
        out.push('.');
    }
    out.push('\n');
    out
}

/// Generated text of exactly `size` bytes
pub fn text(size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(size);
    while out.len() < size {
        out.extend_from_slice(paragraph().as_bytes());
    }
    out.truncate(size);
    out
}

/// Temp file holding `data`; removed when the handle is dropped
pub fn temp_file(data: &[u8]) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(data)?;
    file.flush()?;
    Ok(file)
}

/// Temp file of `size` bytes of generated text, written `chunk` bytes at a time
pub fn large_temp_file(size: usize, chunk: usize) -> Result<NamedTempFile> {
    let chunk = chunk.max(1);
    let mut file = NamedTempFile::new()?;
    let mut remaining = size;
    while remaining > 0 {
        let n = remaining.min(chunk);
        file.write_all(&text(n))?;
        remaining -= n;
    }
    file.flush()?;
    Ok(file)
}
