use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use anyhow::{Context, Result};
use futures::{future, prelude::*};
use log::{debug, info, trace, warn};
use tarpc::{
    context,
    server::{self, Channel},
    tokio_serde::formats::Json,
};

use crate::config::{JobConfig, RpcConfig};
use crate::ledger::Ledger;
use crate::{Service, Task};

fn lock(ledger: &Mutex<Ledger>) -> MutexGuard<'_, Ledger> {
    // Ledger methods never panic halfway through an update.
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

// Implements the generated Service trait, one clone per request.
#[derive(Debug, Clone)]
struct CoordinatorServer {
    ledger: Arc<Mutex<Ledger>>,
}

impl Service for CoordinatorServer {
    async fn get_task(self, _: context::Context) -> Option<Task> {
        let task = lock(&self.ledger).assign_next_task(Instant::now());
        match &task {
            Some(t) => debug!("assigned {:?}", t),
            None => trace!("nothing to assign"),
        }
        task
    }

    async fn report_map_done(self, _: context::Context, map_id: usize) {
        let mut ledger = lock(&self.ledger);
        ledger.record_map_done(map_id);
        let (maps, _) = ledger.progress();
        info!("map task {} done ({}/{})", map_id, maps, ledger.nmap());
    }

    async fn report_reduce_done(self, _: context::Context, partition: usize) {
        let mut ledger = lock(&self.ledger);
        ledger.record_reduce_done(partition);
        let (_, reduces) = ledger.progress();
        info!(
            "reduce task {} done ({}/{})",
            partition,
            reduces,
            ledger.nreduce()
        );
    }

    async fn job_done(self, _: context::Context) -> bool {
        lock(&self.ledger).job_complete()
    }
}

async fn spawn(fut: impl Future<Output = ()> + Send + 'static) {
    tokio::spawn(fut);
}

/// Owns the task ledger of one job and serves it to workers.
#[derive(Debug, Clone)]
pub struct Coordinator {
    socket: PathBuf,
    ledger: Arc<Mutex<Ledger>>,
}

impl Coordinator {
    /// One map task per input file and `job.nreduce` reduce tasks.
    pub fn new(files: Vec<PathBuf>, job: &JobConfig, rpc: &RpcConfig) -> Result<Self> {
        let ledger = Ledger::new(files, job.nreduce, job.staleness)?;
        Ok(Self {
            socket: rpc.socket_path(),
            ledger: Arc::new(Mutex::new(ledger)),
        })
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Whether every task has been reported done. Never changes any state.
    pub fn done(&self) -> bool {
        lock(&self.ledger).job_complete()
    }

    /// Serve the scheduling RPCs until the listener fails.
    pub async fn launch(&self) -> Result<()> {
        match std::fs::remove_file(&self.socket) {
            Ok(()) => debug!("removed stale socket {:?}", self.socket),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("unable to remove {:?}", self.socket))
            }
        }

        let listener = tarpc::serde_transport::unix::listen(&self.socket, Json::default)
            .await
            .with_context(|| format!("unable to listen on {:?}", self.socket))?;
        info!("coordinator listening on {:?}", self.socket);

        let server = CoordinatorServer {
            ledger: self.ledger.clone(),
        };
        listener
            .filter_map(|r| {
                future::ready(
                    r.map_err(|e| warn!("failed to accept a worker: {}", e))
                        .ok(),
                )
            })
            .map(server::BaseChannel::with_defaults)
            // Every worker keeps its connection open, so channels are not bounded.
            .for_each(|channel| {
                let server = server.clone();
                async move {
                    tokio::spawn(channel.execute(server.serve()).for_each(spawn));
                }
            })
            .await;
        Ok(())
    }
}
