use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use log::trace;
use structopt::StructOpt;

use map_reduce::app;
use map_reduce::partition::{output_path, partition_of, write_record};

#[derive(StructOpt, Debug)]
#[structopt(name = "mr-sequential", version = env!("CARGO_PKG_VERSION"), about = "Run a job in a single process, for checking distributed output", author = env!("CARGO_PKG_AUTHORS"))]
struct Opt {
    /// Application to run: wc or indexer
    #[structopt(short, long, default_value = "wc")]
    app: String,

    /// Directory for output files
    #[structopt(long, default_value = ".", parse(from_os_str))]
    dir: PathBuf,

    #[structopt(long, default_value = "10")]
    nreduce: usize,

    /// Files to process
    #[structopt(name = "FILE", parse(from_os_str))]
    files: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    anyhow::ensure!(opt.nreduce > 0, "--nreduce should be non-zero");
    let (map, reduce) =
        app::lookup(&opt.app).ok_or_else(|| anyhow!("unknown application {:?}", opt.app))?;

    let mut cnt = BTreeMap::<String, Vec<String>>::new();
    for fname in opt.files.iter() {
        let contents =
            fs::read_to_string(fname).with_context(|| format!("unable to read {:?}", fname))?;
        for (k, v) in map(fname, &contents) {
            cnt.entry(k).or_default().push(v);
        }
    }

    // Keys come out of the BTreeMap sorted, so every partition is too.
    let mut result = vec![String::new(); opt.nreduce];
    for (k, vs) in cnt.iter() {
        write_record(&mut result[partition_of(k, opt.nreduce)], k, &reduce(k, vs))?;
    }
    for (r, content) in result.iter().enumerate() {
        let path = output_path(&opt.dir, r);
        fs::write(&path, content).with_context(|| format!("unable to write {:?}", path))?;
        trace!("output {:?}", path);
    }
    Ok(())
}
