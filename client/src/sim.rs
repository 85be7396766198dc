use std::sync::Arc;

use comms::{Channel, ChannelErr, ClientHello, Command, RoundInfo};
use log::{debug, info, warn};
use model::{Model, ModelErr};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{
        TcpStream, ToSocketAddrs,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    task::{self, JoinHandle},
};

use crate::error::{Result, SessionErr};

/// What a simulation client did before the coordinator closed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimReport {
    pub client_idx: usize,
    pub trainings: usize,
    pub commits: usize,
}

/// A client driven by a coordinator through a framed channel.
///
/// It trains on every snapshot it's sent and hands back the result when asked to
/// commit, until the coordinator closes the channel.
pub struct SimulationClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    channel: Channel<R, W>,
    model: Arc<dyn Model>,
    hello: ClientHello,
    weights: Vec<u8>,
    training: Option<JoinHandle<std::result::Result<Vec<u8>, ModelErr>>>,
}

impl SimulationClient<OwnedReadHalf, OwnedWriteHalf> {
    /// Connects to a coordinator at `addr` and joins its simulation.
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        name: &str,
        model: Arc<dyn Model>,
    ) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(ChannelErr::from)?;
        let (rx, tx) = stream.into_split();
        Self::join(comms::channel(rx, tx), name, model).await
    }
}

impl<R, W> SimulationClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Introduces this client over an already open channel.
    ///
    /// # Arguments
    /// * `channel` - The channel to the coordinator.
    /// * `name` - How this client presents itself, echoed back by the coordinator.
    /// * `model` - Trains on the snapshots.
    pub async fn join(
        mut channel: Channel<R, W>,
        name: &str,
        model: Arc<dyn Model>,
    ) -> Result<Self> {
        channel.send(name.as_bytes()).await?;

        let echo = channel.receive().await?;
        if echo != name.as_bytes() {
            return Err(SessionErr::Transient(format!(
                "coordinator echoed {:?} instead of our name",
                String::from_utf8_lossy(&echo)
            )));
        }

        let hello: ClientHello = channel.receive_json().await?;
        channel.send_ack().await?;

        info!(client = hello.client_idx; "joined simulation of {} clients", hello.n_clients);

        Ok(Self {
            channel,
            model,
            hello,
            weights: Vec::new(),
            training: None,
        })
    }

    pub fn hello(&self) -> &ClientHello {
        &self.hello
    }

    /// Serves the coordinator until it closes the channel.
    pub async fn run(mut self) -> Result<SimReport> {
        let mut report = SimReport {
            client_idx: self.hello.client_idx,
            trainings: 0,
            commits: 0,
        };

        loop {
            let cmd = match self.channel.receive_command().await {
                Ok(cmd) => cmd,
                Err(e) if e.is_disconnect() => {
                    warn!("coordinator went away without closing: {e}");
                    break;
                }
                Err(e) => return Err(e.into()),
            };

            match cmd {
                Command::Close => {
                    debug!("coordinator closed the simulation");
                    break;
                }
                Command::Retr => {
                    self.channel.send_ack().await?;
                    self.retrieve().await?;
                    report.trainings += 1;
                }
                Command::Comm => {
                    self.channel.send_ack().await?;
                    self.commit().await?;
                    report.commits += 1;
                }
                other => {
                    warn!("ignoring unexpected command {other}");
                }
            }
        }

        if let Some(handle) = self.training.take() {
            handle.abort();
        }

        Ok(report)
    }

    async fn retrieve(&mut self) -> Result<()> {
        self.weights = self.channel.receive().await?;
        let info: RoundInfo = self.channel.receive_json().await?;

        debug!(round = info.round; "training on snapshot");

        let model = Arc::clone(&self.model);
        let weights = self.weights.clone();
        let handle = task::spawn_blocking(move || model.train(&weights, &info.params));

        if let Some(previous) = self.training.replace(handle) {
            previous.abort();
        }

        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let trained = match self.training.take() {
            Some(handle) => match handle.await {
                Ok(Ok(trained)) => Some(trained),
                Ok(Err(e)) => {
                    warn!("training failed, committing the snapshot as is: {e}");
                    None
                }
                Err(e) => {
                    warn!("training task failed, committing the snapshot as is: {e}");
                    None
                }
            },
            None => None,
        };

        if let Some(trained) = trained {
            self.weights = trained;
        }

        self.channel.send(&self.weights).await?;
        self.channel.expect(Command::Ok).await?;
        Ok(())
    }
}
