//! Options shared by the library and the binaries.
//!
//! Every struct can be flattened into a binary's `StructOpt` options or built
//! with `Default` when driving a job from code.

use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

use structopt::StructOpt;

use crate::rpc;

/// Time an assigned task may go unreported before it is handed out again.
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(10);

fn parse_secs(s: &str) -> Result<Duration, ParseIntError> {
    s.parse().map(Duration::from_secs)
}

fn parse_millis(s: &str) -> Result<Duration, ParseIntError> {
    s.parse().map(Duration::from_millis)
}

#[derive(StructOpt, Debug, Clone)]
pub struct JobConfig {
    /// Number of reduce tasks, fixed for the whole job
    #[structopt(long, default_value = "10")]
    pub nreduce: usize,

    /// Seconds an assigned task may go unreported before it is reassigned
    #[structopt(long, default_value = "10", parse(try_from_str = parse_secs))]
    pub staleness: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            nreduce: 10,
            staleness: DEFAULT_STALENESS,
        }
    }
}

#[derive(StructOpt, Debug, Clone, Default)]
pub struct RpcConfig {
    /// Coordinator socket, a per-user path under /var/tmp when omitted
    #[structopt(long, parse(from_os_str))]
    pub socket: Option<PathBuf>,
}

impl RpcConfig {
    pub fn socket_path(&self) -> PathBuf {
        self.socket.clone().unwrap_or_else(rpc::default_socket_path)
    }
}

#[derive(StructOpt, Debug, Clone)]
pub struct WorkerConfig {
    /// Directory for intermediate and output files
    #[structopt(long, default_value = ".", parse(from_os_str))]
    pub dir: PathBuf,

    /// Milliseconds to wait before asking again when no task is available
    #[structopt(long = "poll-ms", default_value = "500", parse(try_from_str = parse_millis))]
    pub poll_interval: Duration,

    /// Cap in milliseconds on the wait between failed coordinator calls
    #[structopt(long = "max-backoff-ms", default_value = "1000", parse(try_from_str = parse_millis))]
    pub max_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            poll_interval: Duration::from_millis(500),
            max_backoff: Duration::from_secs(1),
        }
    }
}
