use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::metrics::METRICS;
use crate::util::socket_addr_of;

/// Per-subscriber send queue bound. Once a subscriber falls this far
/// behind, further messages to it are dropped silently.
pub const SEND_QUEUE_CAPACITY: usize = 10_000;

struct PubMessage {
    topic: String,
    payload: String,
}

/// Process-wide PUB endpoint.
///
/// Bound once at startup; fans out `(topic, payload)` two-frame messages
/// to zero or more subscribers. `publish` never blocks: each subscriber
/// has a bounded queue and a slow subscriber loses messages rather than
/// stalling the snapshot cadence. Surviving messages are delivered in
/// publish order.
pub struct Publisher {
    subs: Mutex<Vec<mpsc::Sender<Arc<PubMessage>>>>,
    local_addr: SocketAddr,
}

impl Publisher {
    /// Bind the endpoint and start accepting subscribers.
    ///
    /// `endpoint` accepts the `tcp://host:port` form with `*` as a
    /// wildcard host.
    pub async fn bind(endpoint: &str) -> Result<Arc<Self>> {
        let addr = socket_addr_of(endpoint);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind publisher on {}", addr))?;
        let local_addr = listener.local_addr()?;
        info!("publisher listening on {}", local_addr);

        let publisher = Arc::new(Self {
            subs: Mutex::new(Vec::new()),
            local_addr,
        });

        let accept_pub = publisher.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, peer)) => {
                        debug!("subscriber connected from {}", peer);
                        let (tx, rx) = mpsc::channel::<Arc<PubMessage>>(SEND_QUEUE_CAPACITY);
                        accept_pub.subs.lock().push(tx);
                        METRICS.subscribers_active.fetch_add(1, Ordering::Relaxed);
                        tokio::spawn(subscriber_write_loop(socket, rx, peer));
                    }
                    Err(e) => {
                        warn!("publisher accept failed: {}", e);
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                }
            }
        });

        Ok(publisher)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Fan one message out to every connected subscriber. Non-blocking:
    /// a full queue drops the message for that subscriber, a closed queue
    /// unregisters it.
    pub fn publish(&self, topic: &str, payload: &str) {
        let msg = Arc::new(PubMessage {
            topic: topic.to_string(),
            payload: payload.to_string(),
        });

        self.subs.lock().retain(|tx| match tx.try_send(msg.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                METRICS.publish_drops.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Closed(_)) => {
                METRICS.subscribers_active.fetch_sub(1, Ordering::Relaxed);
                false
            }
        });
    }
}

async fn subscriber_write_loop(
    mut socket: TcpStream,
    mut rx: mpsc::Receiver<Arc<PubMessage>>,
    peer: SocketAddr,
) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = write_message(&mut socket, &msg.topic, &msg.payload).await {
            debug!("subscriber {} dropped: {}", peer, e);
            break;
        }
    }
}

/// Wire format: one count byte (2 = topic + payload), then per frame a
/// u32 big-endian length followed by the bytes.
async fn write_message<W: AsyncWrite + Unpin>(
    w: &mut W,
    topic: &str,
    payload: &str,
) -> std::io::Result<()> {
    w.write_u8(2).await?;
    w.write_u32(topic.len() as u32).await?;
    w.write_all(topic.as_bytes()).await?;
    w.write_u32(payload.len() as u32).await?;
    w.write_all(payload.as_bytes()).await?;
    w.flush().await
}
