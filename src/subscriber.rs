use anyhow::{Context, Result, bail};
use log::info;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::schema::MarketState;
use crate::util::socket_addr_of;

/// Upper bound on a single frame; anything larger is a corrupt stream.
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// SUB side of the fan-out bus.
///
/// Connects to a publisher endpoint, applies a topic prefix filter
/// (default `state.`) and yields decoded `MarketState` records. Malformed
/// payloads and filtered topics yield no record; the receiver keeps
/// running. Only a transport failure surfaces as an error.
pub struct MarketSubscriber {
    stream: TcpStream,
    topic_filter: String,
}

impl MarketSubscriber {
    pub async fn connect(endpoint: &str, topic_filter: &str) -> Result<Self> {
        let addr = socket_addr_of(endpoint);
        let stream = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("failed to connect subscriber to {}", addr))?;
        info!("subscribed to {} (filter '{}')", addr, topic_filter);
        Ok(Self {
            stream,
            topic_filter: topic_filter.to_string(),
        })
    }

    /// One receive.
    ///
    /// A two-frame message is `(topic, payload)`; a single frame is
    /// treated as payload with an empty topic. Returns `Ok(None)` when the
    /// message was filtered out or failed to decode.
    pub async fn recv_one(&mut self) -> Result<Option<(String, MarketState)>> {
        let nframes = self.stream.read_u8().await?;

        let (topic, payload) = match nframes {
            1 => (String::new(), self.read_frame().await?),
            2 => {
                let topic = self.read_frame().await?;
                let payload = self.read_frame().await?;
                (topic, payload)
            }
            n => bail!("unexpected frame count {}", n),
        };

        if nframes == 2 && !topic.starts_with(&self.topic_filter) {
            return Ok(None);
        }

        Ok(MarketState::parse(&payload).map(|s| (topic, s)))
    }

    async fn read_frame(&mut self) -> Result<String> {
        let len = self.stream.read_u32().await?;
        if len > MAX_FRAME_LEN {
            bail!("frame length {} exceeds limit", len);
        }
        let mut buf = vec![0u8; len as usize];
        self.stream.read_exact(&mut buf).await?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::Publisher;
    use crate::schema::{StateSnapshot, encode_market_state};

    fn sample_payload() -> String {
        let snap = StateSnapshot {
            exchange: "binance".into(),
            instrument: "ETHUSDT".into(),
            ts_ms: 1700000000000,
            mid: 100.05,
            spread: 0.1,
            r1: 0.0,
            r5: 0.0,
            r10: 0.0,
            imbalance: 0.0,
            cross_ex_signal: 0.0,
            bid_vol: [1.0, 2.0, 0.0, 0.0, 0.0],
            ask_vol: [1.0, 1.0, 1.0, 0.0, 0.0],
        };
        encode_market_state(&snap, 100.0, 100.1, 2, 3)
    }

    #[tokio::test]
    async fn loopback_delivery_with_prefix_filter() {
        let publisher = Publisher::bind("tcp://127.0.0.1:0").await.expect("bind");
        let endpoint = format!("tcp://{}", publisher.local_addr());

        let mut sub = MarketSubscriber::connect(&endpoint, "state.")
            .await
            .expect("connect");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        publisher.publish("control.heartbeat", "{}");
        publisher.publish("state.binance.ETHUSDT", &sample_payload());

        // First message fails the prefix filter.
        assert!(sub.recv_one().await.expect("recv").is_none());

        let (topic, state) = sub
            .recv_one()
            .await
            .expect("recv")
            .expect("decoded record");
        assert_eq!(topic, "state.binance.ETHUSDT");
        assert_eq!(state.exchange, "binance");
        assert_eq!(state.instrument, "ETHUSDT");
        assert_eq!(state.bid, 100.0);
        assert_eq!(state.bid_levels, 2);
    }

    #[tokio::test]
    async fn malformed_payload_yields_no_record() {
        let publisher = Publisher::bind("tcp://127.0.0.1:0").await.expect("bind");
        let endpoint = format!("tcp://{}", publisher.local_addr());

        let mut sub = MarketSubscriber::connect(&endpoint, "state.")
            .await
            .expect("connect");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        publisher.publish("state.binance.ETHUSDT", "{ this is not json");
        publisher.publish("state.binance.ETHUSDT", &sample_payload());

        assert!(sub.recv_one().await.expect("recv").is_none());
        assert!(sub.recv_one().await.expect("recv").is_some());
    }
}
