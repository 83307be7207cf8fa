//! Inverted index: for every word, the documents it appears in.

use std::collections::BTreeSet;
use std::path::Path;

use crate::KeyValue;

/// Emit `(word, document)` once per distinct word of the document.
pub fn map(filename: &Path, contents: &str) -> Vec<KeyValue> {
    let doc = filename.to_string_lossy();
    contents
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|w| (w.to_owned(), doc.to_string()))
        .collect()
}

/// `<document count> <sorted, comma separated documents>`
pub fn reduce(_key: &str, values: &[String]) -> String {
    let docs: BTreeSet<&str> = values.iter().map(String::as_str).collect();
    format!(
        "{} {}",
        docs.len(),
        docs.into_iter().collect::<Vec<_>>().join(",")
    )
}
