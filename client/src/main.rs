use std::{env, sync::Arc};

use client::{DirCredentials, HttpRegistry, Session};
use log::info;
use model::NoopModel;
use tokio::signal;
use tokio_util::sync::CancellationToken;

const DEFAULT_REGISTRY: &str = "http://127.0.0.1:8080";
const DEFAULT_CREDENTIALS_DIR: &str = ".credentials";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let url = env::var("REGISTRY_URL").unwrap_or_else(|_| DEFAULT_REGISTRY.to_string());
    let dir = env::var("CREDENTIALS_DIR").unwrap_or_else(|_| DEFAULT_CREDENTIALS_DIR.to_string());

    let credentials = DirCredentials::open(&dir)?;
    let mut session = Session::new(HttpRegistry::new(&url), credentials, Arc::new(NoopModel));

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let _ = signal::ctrl_c().await;
            info!("received SIGINT, unsubscribing...");
            cancel.cancel();
        }
    });

    info!("joining registry at {url}");
    session.run(cancel).await?;
    Ok(())
}
