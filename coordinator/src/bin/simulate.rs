use std::{
    env,
    io::{self, Read},
    sync::Arc,
};

use anyhow::{Context, bail};
use coordinator::{SimulationConfig, run_simulation};
use log::{error, info};
use model::NoopModel;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let port: u16 = env::args()
        .nth(1)
        .context("usage: simulate <port> < config.json")?
        .parse()
        .context("port must be a number")?;

    info!("waiting for configuration on stdin");
    let mut raw = Vec::new();
    io::stdin().read_to_end(&mut raw)?;
    let configs = SimulationConfig::parse_batch(&raw)?;

    let total = configs.len();
    let mut failed = 0;

    for (i, config) in configs.iter().enumerate() {
        info!("running simulation {}/{total}: {}", i + 1, config.name);

        match run_simulation(config, Arc::new(NoopModel), port).await {
            Ok(report) => info!(
                "{} done after {} ticks and {} rounds, {} clients dropped",
                config.name,
                report.ticks,
                report.rounds,
                report.dropped.len()
            ),
            Err(e) => {
                error!("{} failed: {e}", config.name);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {total} simulations failed");
    }

    Ok(())
}
