use std::{io, sync::Arc};

use aggregator::GlobalSnapshot;
use comms::{Channel, ClientHello, Command, RoundInfo};
use log::{debug, info, warn};
use serde_json::Value;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{
        TcpListener,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

use super::ClientLink;
use crate::error::LinkErr;

/// A client living in another process, reached through a framed channel.
pub struct ChannelLink<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    name: String,
    channel: Channel<R, W>,
    retrieved: bool,
}

impl<R, W> ChannelLink<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Runs the opening exchange with a freshly connected client.
    ///
    /// The client sends its name and gets it echoed back, then it's told its index
    /// and acknowledges it.
    ///
    /// # Arguments
    /// * `channel` - The channel to the client.
    /// * `client_idx` - The index assigned to this client.
    /// * `n_clients` - The amount of clients in the run.
    ///
    /// # Returns
    /// A link ready to be scheduled, or the reason the client was refused.
    pub async fn handshake(
        mut channel: Channel<R, W>,
        client_idx: usize,
        n_clients: usize,
    ) -> Result<Self, LinkErr> {
        let raw = channel.receive().await?;
        let name = String::from_utf8(raw)
            .map_err(|_| LinkErr::Handshake("client name is not valid utf-8".into()))?;

        channel.send(name.as_bytes()).await?;
        channel
            .send_json(&ClientHello {
                client_idx,
                n_clients,
            })
            .await?;
        channel.receive_ack().await?;

        info!(client = client_idx; "client {name:?} joined");

        Ok(Self {
            name,
            channel,
            retrieved: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<R, W> ClientLink for ChannelLink<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn retrieve(
        &mut self,
        snapshot: Arc<GlobalSnapshot>,
        params: &Value,
    ) -> Result<(), LinkErr> {
        debug!(round = snapshot.round(); "sending snapshot to {}", self.name);

        self.channel.send_command(Command::Retr).await?;
        self.channel.receive_ack().await?;
        self.channel.send(snapshot.payload()).await?;

        let info = RoundInfo {
            round: snapshot.round(),
            params: params.clone(),
        };
        self.channel.send_json(&info).await?;

        self.retrieved = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<Vec<u8>, LinkErr> {
        if !self.retrieved {
            return Err(LinkErr::NothingToCommit);
        }

        self.channel.send_command(Command::Comm).await?;
        self.channel.receive_ack().await?;
        let update = self.channel.receive().await?;
        self.channel.send_command(Command::Ok).await?;

        debug!(size = update.len(); "received update from {}", self.name);

        self.retrieved = false;
        Ok(update)
    }

    async fn close(self) {
        self.channel.close().await;
    }
}

/// Accepts `n_clients` connections and runs the handshake with each of them.
///
/// Clients are indexed in the order they connect. A client failing its handshake
/// only loses its own slot.
///
/// # Returns
/// The outcome of every client's handshake, or an io error if the listener failed.
pub async fn accept_all(
    listener: &TcpListener,
    n_clients: usize,
) -> io::Result<Vec<Result<ChannelLink<OwnedReadHalf, OwnedWriteHalf>, LinkErr>>> {
    let mut joins = Vec::with_capacity(n_clients);

    for client_idx in 0..n_clients {
        let (stream, addr) = listener.accept().await?;
        debug!("client {client_idx} connected from {addr}");

        let (rx, tx) = stream.into_split();
        let channel = comms::channel(rx, tx);
        let join = ChannelLink::handshake(channel, client_idx, n_clients).await;

        if let Err(e) = &join {
            warn!(client = client_idx; "handshake with {addr} failed: {e}");
        }

        joins.push(join);
    }

    Ok(joins)
}

#[cfg(test)]
mod tests {
    use aggregator::{MemoryBackend, UpdateStore};
    use tokio::{
        io::{self, DuplexStream, ReadHalf, WriteHalf},
        net::TcpStream,
    };

    use super::*;

    type TestChannel = Channel<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    fn channel_pair() -> (TestChannel, TestChannel) {
        let (left, right) = io::duplex(4096);
        let (lrx, ltx) = io::split(left);
        let (rrx, rtx) = io::split(right);
        (comms::channel(lrx, ltx), comms::channel(rrx, rtx))
    }

    #[tokio::test]
    async fn test_handshake_and_round_trip() {
        let (coordinator, mut client) = channel_pair();

        let peer = tokio::spawn(async move {
            client.send(b"alice").await.unwrap();
            assert_eq!(client.receive().await.unwrap(), b"alice");
            let hello: ClientHello = client.receive_json().await.unwrap();
            client.send_ack().await.unwrap();

            assert_eq!(client.receive_command().await.unwrap(), Command::Retr);
            client.send_ack().await.unwrap();
            let weights = client.receive().await.unwrap();
            let info: RoundInfo = client.receive_json().await.unwrap();

            client.expect(Command::Comm).await.unwrap();
            client.send_ack().await.unwrap();
            client.send(&weights).await.unwrap();
            client.expect(Command::Ok).await.unwrap();

            client.expect(Command::Close).await.unwrap();
            (hello, info)
        });

        let mut link = ChannelLink::handshake(coordinator, 1, 2).await.unwrap();
        assert_eq!(link.name(), "alice");

        let store = UpdateStore::new(MemoryBackend::new(), false).unwrap();
        let snapshot = store.publish_snapshot(b"model".to_vec()).unwrap();
        let params = serde_json::json!({ "epochs": 1 });

        link.retrieve(snapshot, &params).await.unwrap();
        assert_eq!(link.commit().await.unwrap(), b"model");
        link.close().await;

        let (hello, info) = peer.await.unwrap();
        assert_eq!(
            hello,
            ClientHello {
                client_idx: 1,
                n_clients: 2
            }
        );
        assert_eq!(info.round, 0);
        assert_eq!(info.params, params);
    }

    #[tokio::test]
    async fn test_dropped_client_is_fatal() {
        let (coordinator, mut client) = channel_pair();

        let peer = tokio::spawn(async move {
            client.send(b"bob").await.unwrap();
            client.receive().await.unwrap();
            client.receive_json::<ClientHello>().await.unwrap();
            client.send_ack().await.unwrap();
        });

        let mut link = ChannelLink::handshake(coordinator, 0, 1).await.unwrap();
        peer.await.unwrap();

        let store = UpdateStore::new(MemoryBackend::new(), false).unwrap();
        let snapshot = store.publish_snapshot(Vec::new()).unwrap();

        let err = link.retrieve(snapshot, &Value::Null).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_commit_before_retrieve() {
        let (coordinator, mut client) = channel_pair();

        let peer = tokio::spawn(async move {
            client.send(b"carol").await.unwrap();
            client.receive().await.unwrap();
            client.receive_json::<ClientHello>().await.unwrap();
            client.send_ack().await.unwrap();
            client
        });

        let mut link = ChannelLink::handshake(coordinator, 0, 1).await.unwrap();
        let _client = peer.await.unwrap();

        assert!(matches!(
            link.commit().await.unwrap_err(),
            LinkErr::NothingToCommit
        ));
    }

    #[tokio::test]
    async fn test_failed_handshake_only_loses_its_slot() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let peers = tokio::spawn(async move {
            let (rx, tx) = TcpStream::connect(addr).await.unwrap().into_split();
            let mut quitter = comms::channel(rx, tx);
            quitter.send(b"quitter").await.unwrap();
            drop(quitter);

            let (rx, tx) = TcpStream::connect(addr).await.unwrap().into_split();
            let mut client = comms::channel(rx, tx);
            client.send(b"dave").await.unwrap();
            client.receive().await.unwrap();
            let hello: ClientHello = client.receive_json().await.unwrap();
            client.send_ack().await.unwrap();
            (hello, client)
        });

        let joins = accept_all(&listener, 2).await.unwrap();
        let (hello, _client) = peers.await.unwrap();

        assert_eq!(joins.len(), 2);
        assert!(joins[0].is_err());
        assert_eq!(joins[1].as_ref().unwrap().name(), "dave");
        assert_eq!(hello.client_idx, 1);
    }
}
