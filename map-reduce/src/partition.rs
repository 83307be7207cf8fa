//! Where a key goes and what the files between the two phases look like.
//!
//! Map and reduce workers never talk to each other. They agree on
//! `mr-<map id>-<partition>` for intermediate files and `mr-out-<partition>`
//! for output, and on one `key value` record per line in both.

use std::hash::Hasher;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, ensure, Result};
use fnv::FnvHasher;

/// FNV-1a of the key bytes, masked to 31 bits.
pub fn ihash(key: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(key.as_bytes());
    hasher.finish() & 0x7fff_ffff
}

/// Reduce partition of `key` in a job with `nreduce` reduce tasks.
///
/// # Panics
///
/// Panics if `nreduce` is zero.
pub fn partition_of(key: &str, nreduce: usize) -> usize {
    // The result is below nreduce, so it fits back into usize.
    (ihash(key) % nreduce as u64) as usize
}

pub fn intermediate_path(dir: &Path, map_id: usize, partition: usize) -> PathBuf {
    dir.join(format!("mr-{}-{}", map_id, partition))
}

pub fn output_path(dir: &Path, partition: usize) -> PathBuf {
    dir.join(format!("mr-out-{}", partition))
}

/// Append one `key value` line to `buf`.
///
/// Records are split on the first space when read back, so the key may not
/// contain whitespace and the value may not contain a line break.
pub fn write_record(buf: &mut String, key: &str, value: &str) -> Result<()> {
    ensure!(
        !key.contains(char::is_whitespace),
        "key {:?} contains whitespace",
        key
    );
    ensure!(
        !value.contains(|c| c == '\n' || c == '\r'),
        "value {:?} of key {:?} contains a line break",
        value,
        key
    );
    buf.push_str(key);
    buf.push(' ');
    buf.push_str(value);
    buf.push('\n');
    Ok(())
}

pub fn read_record(line: &str) -> Result<(String, String)> {
    let (key, value) = line
        .split_once(' ')
        .ok_or_else(|| anyhow!("malformed record {:?}", line))?;
    Ok((key.to_owned(), value.to_owned()))
}
