use anyhow::Context;
use repliquay::cli::{Args, Runner};
use repliquay::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse_args();

    let runner = Runner::new(args).context("Invalid run configuration")?;
    logging::init(runner.settings().config.debug);

    runner.run().await.context("Replication failed")?;
    Ok(())
}
