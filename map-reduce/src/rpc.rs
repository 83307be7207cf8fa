//! Client side of the coordinator service: a tarpc channel with a JSON codec
//! over a unix socket.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, trace, warn};
use tarpc::{
    client::{self, RpcError},
    context,
    tokio_serde::formats::Json,
};

use crate::ServiceClient;

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);

/// Socket used when none is configured. It carries the user name so jobs of
/// different users on one machine do not collide.
pub fn default_socket_path() -> PathBuf {
    PathBuf::from(format!("/var/tmp/mr-coordinator-{}.sock", whoami::username()))
}

pub async fn connect(socket: &Path) -> io::Result<ServiceClient> {
    let transport = tarpc::serde_transport::unix::connect(socket, Json::default).await?;
    Ok(ServiceClient::new(client::Config::default(), transport).spawn())
}

/// A coordinator connection that is re-established on demand.
///
/// [`Connection::call`] never gives up: a failed call drops the client and is
/// retried with a doubling delay capped at `max_backoff`.
pub struct Connection {
    socket: PathBuf,
    client: Option<ServiceClient>,
    max_backoff: Duration,
}

impl Connection {
    pub fn new(socket: PathBuf, max_backoff: Duration) -> Self {
        Self {
            socket,
            client: None,
            max_backoff,
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    pub async fn call<T, F, Fut>(&mut self, f: F) -> T
    where
        F: Fn(ServiceClient) -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let mut backoff = INITIAL_BACKOFF.min(self.max_backoff);
        loop {
            match self.client().await {
                Ok(client) => match f(client).await {
                    Ok(resp) => return resp,
                    Err(e) => {
                        warn!("call to {:?} failed: {}", self.socket, e);
                        self.client = None;
                    }
                },
                Err(e) => debug!("unable to connect to {:?}: {}", self.socket, e),
            }
            trace!("retrying in {:?}", backoff);
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(self.max_backoff);
        }
    }

    async fn client(&mut self) -> io::Result<ServiceClient> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }
        let client = connect(&self.socket).await?;
        self.client = Some(client.clone());
        Ok(client)
    }
}

/// Block until the coordinator behind `socket` reports the job done.
pub async fn wait_for_job(socket: &Path, interval: Duration) {
    let mut conn = Connection::new(socket.to_owned(), interval);
    while !conn
        .call(|c| async move { c.job_done(context::current()).await })
        .await
    {
        tokio::time::sleep(interval).await;
    }
}
