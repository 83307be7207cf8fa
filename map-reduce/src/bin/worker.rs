use anyhow::anyhow;
use structopt::StructOpt;

use map_reduce::config::{RpcConfig, WorkerConfig};
use map_reduce::{app, Worker};

#[derive(StructOpt, Debug)]
#[structopt(name = "mr-worker", version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"), author = env!("CARGO_PKG_AUTHORS"))]
struct Opt {
    /// Application to run: wc or indexer
    #[structopt(short, long, default_value = "wc")]
    app: String,

    #[structopt(flatten)]
    worker: WorkerConfig,

    #[structopt(flatten)]
    rpc: RpcConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    let (map, reduce) =
        app::lookup(&opt.app).ok_or_else(|| anyhow!("unknown application {:?}", opt.app))?;
    let w = Worker::new(&opt.worker, &opt.rpc, map, reduce);
    w.launch().await
}
