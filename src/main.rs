use anyhow::Result;
use clap::Parser;

use raftlet::config::{ClusterConfig, Tunables, DEFAULT_CLUSTER_SIZE};
use raftlet::{repl, runtime};
use raftlet_raft::PrintingStateMachine;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    nodenum: usize,

    #[arg(long, default_value_t = DEFAULT_CLUSTER_SIZE)]
    cluster_size: usize,
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let cluster = ClusterConfig::localhost(cli.cluster_size);
    anyhow::ensure!(
        cli.nodenum < cluster.len(),
        "nodenum {} out of range for a {}-node cluster",
        cli.nodenum,
        cluster.len()
    );

    let handle = runtime::start_node(
        cli.nodenum,
        cluster,
        Tunables::default(),
        Box::new(PrintingStateMachine),
    )
    .await?;

    repl::run(handle).await
}
