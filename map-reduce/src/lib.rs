//! MapReduce on a single machine: a coordinator hands out map and reduce tasks
//! over a unix socket, workers run them against user supplied callbacks and
//! meet each other through intermediate files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod app;
pub mod config;
mod coordinator;
mod ledger;
pub mod partition;
pub mod rpc;
mod worker;

pub use coordinator::Coordinator;
pub use worker::{run_map, run_reduce, Worker};

#[tarpc::service]
pub trait Service {
    /// Hand out the next assignable task, `None` when there is nothing to do right now.
    async fn get_task() -> Option<Task>;
    async fn report_map_done(map_id: usize);
    async fn report_reduce_done(partition: usize);
    /// Whether every map and reduce task has been reported done.
    async fn job_done() -> bool;
}

/// A unit of work as seen by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Task {
    /// Turn one input file into intermediate files, one per non-empty partition.
    Map {
        map_id: usize,
        input: PathBuf,
        nreduce: usize,
    },
    /// Fold the intermediate files of one partition into its output file.
    Reduce { partition: usize, nmap: usize },
}

pub type KeyValue = (String, String);

/// `(document name, document content) -> pairs`
pub type MapFn = fn(&Path, &str) -> Vec<KeyValue>;

/// `(key, all values of the key) -> output value`
pub type ReduceFn = fn(&str, &[String]) -> String;
