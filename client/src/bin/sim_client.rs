use std::{env, sync::Arc};

use anyhow::Context;
use client::SimulationClient;
use log::info;
use model::NoopModel;

const DEFAULT_HOST: &str = "127.0.0.1";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let addr = format!(
        "{}:{}",
        env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
        env::var("PORT").context("PORT must be set")?,
    );
    let name = env::var("CLIENT_NAME").unwrap_or_else(|_| format!("client-{}", std::process::id()));

    info!("connecting to coordinator at {addr}");
    let client = SimulationClient::connect(&addr, &name, Arc::new(NoopModel)).await?;
    let report = client.run().await?;

    info!(
        "done: trained {} times, committed {} updates",
        report.trainings, report.commits
    );
    Ok(())
}
