//! Word count.

use std::path::Path;

use crate::KeyValue;

/// Emit `(word, "1")` for every run of letters.
pub fn map(_filename: &Path, contents: &str) -> Vec<KeyValue> {
    contents
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(|w| (w.to_owned(), "1".to_owned()))
        .collect()
}

pub fn reduce(_key: &str, values: &[String]) -> String {
    values.len().to_string()
}
