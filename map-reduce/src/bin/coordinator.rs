use std::path::PathBuf;
use std::time::Duration;

use log::{error, info};
use structopt::StructOpt;

use map_reduce::config::{JobConfig, RpcConfig};
use map_reduce::Coordinator;

#[derive(StructOpt, Debug)]
#[structopt(name = "mr-coordinator", version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"), author = env!("CARGO_PKG_AUTHORS"))]
struct Opt {
    #[structopt(flatten)]
    job: JobConfig,

    #[structopt(flatten)]
    rpc: RpcConfig,

    /// Files to process, one map task each
    #[structopt(name = "FILE", parse(from_os_str))]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    let coordinator = Coordinator::new(opt.files, &opt.job, &opt.rpc)?;

    let server = coordinator.clone();
    tokio::spawn(async move {
        if let Err(e) = server.launch().await {
            error!("coordinator stopped serving: {:#}", e);
            std::process::exit(1);
        }
    });

    while !coordinator.done() {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    info!("all tasks done");

    // Give workers a moment to get their last reports acknowledged.
    tokio::time::sleep(Duration::from_secs(1)).await;
    Ok(())
}
