use std::{env, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use coordinator::jobs::{self, JobScheduler, Launcher, ProcessLauncher, TaskLauncher};
use log::info;
use model::NoopModel;
use tokio::{net::TcpListener, signal, time};

const FORWARD_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port = env::var("PORT").unwrap_or_else(|_| "8080".into());
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    match env::var("LAUNCHER").as_deref() {
        Ok("task") => serve(addr, TaskLauncher::new(Arc::new(NoopModel))).await,
        _ => serve(addr, ProcessLauncher::new(simulate_bin()?)).await,
    }
}

fn simulate_bin() -> anyhow::Result<PathBuf> {
    if let Ok(bin) = env::var("SIMULATE_BIN") {
        return Ok(PathBuf::from(bin));
    }

    Ok(env::current_exe()?.with_file_name("simulate"))
}

async fn serve<L: Launcher + 'static>(addr: SocketAddr, launcher: L) -> anyhow::Result<()> {
    let jobs = Arc::new(JobScheduler::new(launcher));

    let ticker = {
        let jobs = Arc::clone(&jobs);
        tokio::spawn(async move {
            let mut interval = time::interval(FORWARD_INTERVAL);
            loop {
                interval.tick().await;
                jobs.forward();
            }
        })
    };

    let listener = TcpListener::bind(addr).await?;
    info!("job queue listening at {addr}");

    axum::serve(listener, jobs::router(jobs))
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            info!("received SIGINT, shutting down");
        })
        .await?;

    ticker.abort();
    Ok(())
}
