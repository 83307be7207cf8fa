use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use atomicwrites::{AllowOverwrite, AtomicFile};
use log::{debug, info, trace};
use rand::Rng;
use tarpc::context;

use crate::config::{RpcConfig, WorkerConfig};
use crate::partition::{intermediate_path, output_path, partition_of, read_record, write_record};
use crate::rpc::Connection;
use crate::{KeyValue, MapFn, ReduceFn, Task};

/// A worker process: asks the coordinator for tasks and runs them, forever.
///
/// A failed file operation ends [`Worker::launch`] with an error. The task
/// it was running is picked up again by someone else once it goes stale.
#[derive(Clone)]
pub struct Worker {
    pub dir: PathBuf,
    pub socket: PathBuf,
    pub poll_interval: Duration,
    pub max_backoff: Duration,
    pub map: MapFn,
    pub reduce: ReduceFn,
}

impl Worker {
    pub fn new(config: &WorkerConfig, rpc: &RpcConfig, map: MapFn, reduce: ReduceFn) -> Self {
        Self {
            dir: config.dir.clone(),
            socket: rpc.socket_path(),
            poll_interval: config.poll_interval,
            max_backoff: config.max_backoff,
            map,
            reduce,
        }
    }

    pub async fn launch(&self) -> Result<()> {
        let mut conn = Connection::new(self.socket.clone(), self.max_backoff);
        loop {
            let task = conn
                .call(|c| async move { c.get_task(context::current()).await })
                .await;
            match task {
                Some(task) => {
                    debug!("got {:?}", task);
                    self.execute(task.clone()).await?;
                    match task {
                        Task::Map { map_id, .. } => {
                            conn.call(|c| async move {
                                c.report_map_done(context::current(), map_id).await
                            })
                            .await
                        }
                        Task::Reduce { partition, .. } => {
                            conn.call(|c| async move {
                                c.report_reduce_done(context::current(), partition).await
                            })
                            .await
                        }
                    }
                }
                None => {
                    let pause = jitter(self.poll_interval);
                    trace!("no task, sleeping {:?}", pause);
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }

    /// Like [`Worker::launch`], returning `Ok` once `stop` completes. A task
    /// interrupted this way is never reported.
    pub async fn launch_until(&self, stop: impl Future<Output = ()>) -> Result<()> {
        tokio::select! {
            r = self.launch() => r,
            _ = stop => {
                info!("worker stopped");
                Ok(())
            }
        }
    }

    async fn execute(&self, task: Task) -> Result<()> {
        let dir = self.dir.clone();
        let (map, reduce) = (self.map, self.reduce);
        // User callbacks and file I/O block, keep them off the runtime threads.
        tokio::task::spawn_blocking(move || match task {
            Task::Map {
                map_id,
                input,
                nreduce,
            } => run_map(&dir, map, map_id, &input, nreduce),
            Task::Reduce { partition, nmap } => run_reduce(&dir, reduce, partition, nmap),
        })
        .await?
    }
}

fn jitter(base: Duration) -> Duration {
    let spread = u64::try_from(base.as_millis() / 2).unwrap_or(u64::MAX);
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    AtomicFile::new(path, AllowOverwrite)
        .write(|f| f.write_all(content.as_bytes()))
        .with_context(|| format!("unable to write {:?}", path))
}

/// Run the map callback over `input` and write its pairs to one intermediate
/// file per partition that received any. Each file replaces an older copy
/// as a whole, so a re-executed task leaves exactly one version behind.
pub fn run_map(dir: &Path, map: MapFn, map_id: usize, input: &Path, nreduce: usize) -> Result<()> {
    let contents =
        fs::read_to_string(input).with_context(|| format!("unable to read {:?}", input))?;

    let mut partitions = HashMap::<usize, String>::new();
    for (k, v) in map(input, &contents) {
        let buf = partitions.entry(partition_of(&k, nreduce)).or_default();
        write_record(buf, &k, &v)?;
    }

    for (partition, buf) in partitions.iter() {
        write_atomic(&intermediate_path(dir, map_id, *partition), buf)?;
    }
    debug!(
        "map task {} wrote {} of {} partitions",
        map_id,
        partitions.len(),
        nreduce
    );
    Ok(())
}

/// Gather partition `partition` from the intermediate files of all `nmap`
/// map tasks, call reduce once per key in ascending key order and replace the
/// output file. A map task that emitted nothing for this partition left no
/// file, which is fine.
pub fn run_reduce(dir: &Path, reduce: ReduceFn, partition: usize, nmap: usize) -> Result<()> {
    let mut kvs = Vec::<KeyValue>::new();
    for map_id in 0..nmap {
        let path = intermediate_path(dir, map_id, partition);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!("{:?} does not exist", path);
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("unable to read {:?}", path)),
        };
        for line in contents.lines() {
            kvs.push(read_record(line).with_context(|| format!("in {:?}", path))?);
        }
    }

    // Stable, so values of one key keep the order they were read in.
    kvs.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = String::new();
    let mut rest = &kvs[..];
    while let Some((key, _)) = rest.first() {
        let n = rest.iter().take_while(|(k, _)| k == key).count();
        let values: Vec<String> = rest[..n].iter().map(|(_, v)| v.clone()).collect();
        write_record(&mut out, key, &reduce(key, &values))?;
        rest = &rest[n..];
    }

    write_atomic(&output_path(dir, partition), &out)?;
    debug!("reduce task {} wrote {} records", partition, kvs.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::wc;
    use tempfile::TempDir;

    fn read_output(dir: &Path, nreduce: usize) -> Vec<String> {
        let mut lines = Vec::new();
        for p in 0..nreduce {
            let path = output_path(dir, p);
            if let Ok(s) = fs::read_to_string(path) {
                lines.extend(s.lines().map(str::to_owned));
            }
        }
        lines.sort();
        lines
    }

    #[test]
    fn test_map_then_reduce() {
        const NREDUCE: usize = 2;
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "a b a").unwrap();
        fs::write(&b, "b b").unwrap();

        run_map(dir.path(), wc::map, 0, &a, NREDUCE).unwrap();
        run_map(dir.path(), wc::map, 1, &b, NREDUCE).unwrap();

        // Every intermediate record sits in the partition its key hashes to.
        for map_id in 0..2 {
            for p in 0..NREDUCE {
                let path = intermediate_path(dir.path(), map_id, p);
                if let Ok(s) = fs::read_to_string(path) {
                    for line in s.lines() {
                        let (k, v) = read_record(line).unwrap();
                        assert_eq!(partition_of(&k, NREDUCE), p);
                        assert_eq!(v, "1");
                    }
                }
            }
        }

        for p in 0..NREDUCE {
            run_reduce(dir.path(), wc::reduce, p, 2).unwrap();
            assert!(output_path(dir.path(), p).exists());
        }
        assert_eq!(read_output(dir.path(), NREDUCE), vec!["a 2", "b 3"]);
    }

    #[test]
    fn test_map_skips_empty_partitions() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        fs::write(&input, "x").unwrap();
        run_map(dir.path(), wc::map, 4, &input, 8).unwrap();

        let p = partition_of("x", 8);
        for q in 0..8 {
            assert_eq!(intermediate_path(dir.path(), 4, q).exists(), p == q);
        }
    }

    #[test]
    fn test_rerun_overwrites() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        fs::write(&input, "x x").unwrap();
        run_map(dir.path(), wc::map, 0, &input, 1).unwrap();
        run_map(dir.path(), wc::map, 0, &input, 1).unwrap();
        run_reduce(dir.path(), wc::reduce, 0, 1).unwrap();
        run_reduce(dir.path(), wc::reduce, 0, 1).unwrap();
        assert_eq!(read_output(dir.path(), 1), vec!["x 2"]);
    }

    #[test]
    fn test_reduce_sorted_and_grouped() {
        fn join(_: &str, values: &[String]) -> String {
            values.join(",")
        }
        let dir = TempDir::new().unwrap();
        fs::write(intermediate_path(dir.path(), 0, 0), "b 1\na 2\nb 3\n").unwrap();
        fs::write(intermediate_path(dir.path(), 2, 0), "a 4\nc x y\n").unwrap();

        // Map task 1 produced nothing for partition 0.
        run_reduce(dir.path(), join, 0, 3).unwrap();
        let out = fs::read_to_string(output_path(dir.path(), 0)).unwrap();
        assert_eq!(out, "a 2,4\nb 1,3\nc x y\n");
    }

    #[test]
    fn test_reduce_with_no_input_writes_empty_output() {
        let dir = TempDir::new().unwrap();
        run_reduce(dir.path(), wc::reduce, 3, 5).unwrap();
        assert_eq!(fs::read_to_string(output_path(dir.path(), 3)).unwrap(), "");
    }

    #[test]
    fn test_malformed_intermediate_is_fatal() {
        let dir = TempDir::new().unwrap();
        fs::write(intermediate_path(dir.path(), 0, 0), "broken\n").unwrap();
        assert!(run_reduce(dir.path(), wc::reduce, 0, 1).is_err());
        assert!(!output_path(dir.path(), 0).exists());
    }

    #[test]
    fn test_missing_input_is_fatal() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        assert!(run_map(dir.path(), wc::map, 0, &missing, 1).is_err());
    }

    #[test]
    fn test_jitter_bounds() {
        let base = Duration::from_millis(100);
        for _ in 0..100 {
            let d = jitter(base);
            assert!(d >= base && d <= Duration::from_millis(150));
        }
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
    }
}
