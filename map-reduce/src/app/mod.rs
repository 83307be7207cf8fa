//! Applications that can be plugged into a worker.

use crate::{MapFn, ReduceFn};

pub mod indexer;
pub mod wc;

/// Map and reduce callbacks of the built-in application called `name`.
pub fn lookup(name: &str) -> Option<(MapFn, ReduceFn)> {
    match name {
        "wc" => Some((wc::map as MapFn, wc::reduce as ReduceFn)),
        "indexer" => Some((indexer::map as MapFn, indexer::reduce as ReduceFn)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert!(lookup("wc").is_some());
        assert!(lookup("indexer").is_some());
        assert!(lookup("grep").is_none());
    }
}
