//! TCP accept loop. One task owns the [`Engine`] outright and is the only
//! thing that ever touches it; every connection talks to it only through an
//! `mpsc` channel, never by sharing the engine itself.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::common::{ClientId, Key, WorkerAddr};
use crate::errors::{ErrorKind, Result};
use crate::net::codec::MessageCodec;
use crate::scheduler::events::{ClientCommand, ClientNotification, Event, WorkerCommand, WorkerReply};
use crate::scheduler::graph::DEBUG_CHECK_CONSISTENCY;
use crate::scheduler::lifecycle::Engine;

/// Everything that can arrive on the wire. Registration is out of band from
/// [`Event`] (see `scheduler::events`), so it gets its own variants here;
/// every frame after the first one on a connection is a `Client`/`Worker`
/// variant matching whichever kind that connection registered as.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Inbound {
    RegisterClient {
        client: ClientId,
    },
    RegisterWorker {
        address: WorkerAddr,
        ncores: usize,
        keys: Option<Vec<Key>>,
    },
    Client(ClientCommand),
    Worker(WorkerReply),
}

enum Control {
    Event(Event),
    RegisterClient(ClientId, UnboundedSender<ClientNotification>),
    RegisterWorker(WorkerAddr, usize, Option<Vec<Key>>, UnboundedSender<WorkerCommand>),
}

/// Bind `addr` and run the scheduler until the process is killed. `strict`
/// enables full consistency checking after every mutation (`--strict` /
/// `SKEIN_STRICT_MODE=1`).
pub async fn serve(addr: SocketAddr, strict: bool) -> Result<()> {
    if strict {
        DEBUG_CHECK_CONSISTENCY.store(true, Ordering::Relaxed);
        info!("strict consistency checking enabled");
    }

    let (control_tx, control_rx) = mpsc::unbounded_channel();
    tokio::spawn(engine_loop(control_rx));

    let listener = TcpListener::bind(addr).await?;
    info!("scheduler listening on {}", addr);
    loop {
        let (socket, peer) = listener.accept().await?;
        let control_tx = control_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, control_tx).await {
                warn!("connection from {} closed: {}", peer, e);
            }
        });
    }
}

/// How often feed subscriptions are advanced and checked for due samples.
const FEED_TICK: Duration = Duration::from_millis(100);

async fn engine_loop(mut rx: mpsc::UnboundedReceiver<Control>) {
    let mut engine = Engine::new();
    let mut ticker = tokio::time::interval(FEED_TICK);
    loop {
        tokio::select! {
            ctrl = rx.recv() => {
                let Some(ctrl) = ctrl else { break };
                match ctrl {
                    Control::RegisterClient(id, tx) => engine.register_client(id, tx),
                    Control::RegisterWorker(address, ncores, keys, tx) => {
                        if let Err(e) = engine.register_worker(address, ncores, keys, tx) {
                            warn!("register_worker failed: {}", e);
                        }
                    }
                    Control::Event(event) => {
                        if let Err(e) = engine.apply_event(event) {
                            warn!("event handling failed: {}", e);
                        }
                    }
                }
            }
            _ = ticker.tick() => {
                engine.tick_feed(FEED_TICK);
            }
        }
    }
}

async fn handle_connection(socket: TcpStream, control_tx: UnboundedSender<Control>) -> Result<()> {
    let (read_half, write_half) = socket.into_split();
    let mut reader: FramedRead<_, MessageCodec<Inbound>> = FramedRead::new(read_half, MessageCodec::new());

    let first = reader
        .next()
        .await
        .ok_or_else(|| ErrorKind::Serialization("connection closed before handshake".into()))??;

    match first {
        Inbound::RegisterClient { client } => {
            let (notify_tx, mut notify_rx) = mpsc::unbounded_channel::<ClientNotification>();
            control_tx
                .send(Control::RegisterClient(client.clone(), notify_tx))
                .ok();

            let mut writer: FramedWrite<_, MessageCodec<ClientNotification>> = FramedWrite::new(write_half, MessageCodec::new());
            let writer_task = tokio::spawn(async move {
                while let Some(note) = notify_rx.recv().await {
                    if writer.send(note).await.is_err() {
                        break;
                    }
                }
            });

            while let Some(frame) = reader.next().await {
                match frame? {
                    Inbound::Client(cmd) => {
                        control_tx.send(Control::Event(Event::Client(client.clone(), cmd))).ok();
                    }
                    _ => warn!("client {} sent a non-client frame after handshake", client),
                }
            }
            control_tx.send(Control::Event(Event::RemoveClient(client))).ok();
            writer_task.abort();
        }
        Inbound::RegisterWorker { address, ncores, keys } => {
            let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<WorkerCommand>();
            control_tx
                .send(Control::RegisterWorker(address.clone(), ncores, keys, cmd_tx))
                .ok();

            let mut writer: FramedWrite<_, MessageCodec<WorkerCommand>> = FramedWrite::new(write_half, MessageCodec::new());
            let writer_task = tokio::spawn(async move {
                while let Some(cmd) = cmd_rx.recv().await {
                    if writer.send(cmd).await.is_err() {
                        break;
                    }
                }
            });

            while let Some(frame) = reader.next().await {
                match frame? {
                    Inbound::Worker(reply) => {
                        control_tx.send(Control::Event(Event::Worker(reply))).ok();
                    }
                    _ => warn!("worker {} sent a non-worker frame after handshake", address),
                }
            }
            control_tx
                .send(Control::Event(Event::Worker(WorkerReply::RemoveWorker { address })))
                .ok();
            writer_task.abort();
        }
        Inbound::Client(_) | Inbound::Worker(_) => {
            return Err(ErrorKind::Serialization("first frame on a connection must be a registration".into()).into());
        }
    }

    Ok(())
}
