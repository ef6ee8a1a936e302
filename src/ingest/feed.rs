//! Per-symbol feed loops: live WebSocket streaming with reconnect, and the
//! synthetic demo injector. Both routes go through the same [`TickFanout`],
//! so everything downstream of tick creation is identical.

use crate::delivery::DeliveryQueue;
use crate::ingest::backoff::ReconnectBackoff;
use crate::ingest::normalizer::normalize;
use crate::model::{current_timestamp_ms, Tick};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};

const FEED_URL_BASE: &str = "wss://fstream.binance.com/ws";

/// Connection lifecycle of one symbol's feed loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Disconnected,
    Connecting,
    Streaming,
}

impl ConnState {
    fn as_str(&self) -> &'static str {
        match self {
            ConnState::Disconnected => "disconnected",
            ConnState::Connecting => "connecting",
            ConnState::Streaming => "streaming",
        }
    }
}

/// Fans one tick out to both sinks: the bounded delivery queue read by the
/// consumer, and the durable write pipeline's intake.
#[derive(Clone)]
pub(crate) struct TickFanout {
    pub delivery: DeliveryQueue,
    pub store_tx: mpsc::UnboundedSender<Tick>,
}

impl TickFanout {
    pub fn publish(&self, tick: Tick) {
        self.delivery.push(tick.clone());
        // Send fails only when the store is gone; nothing to do then.
        let _ = self.store_tx.send(tick);
    }
}

/// Maintain one logical connection for `symbol` until the stop signal fires.
/// Errors never escape: every failure path leads back to a delayed reconnect.
pub(crate) async fn run_symbol_loop(
    symbol: String,
    base_backoff_secs: f64,
    cap_backoff_secs: f64,
    fanout: TickFanout,
    shutdown: watch::Receiver<bool>,
) {
    let url = format!("{}/{}@trade", FEED_URL_BASE, symbol.to_lowercase());
    run_feed_loop(symbol, url, base_backoff_secs, cap_backoff_secs, fanout, shutdown).await
}

async fn run_feed_loop(
    symbol: String,
    url: String,
    base_backoff_secs: f64,
    cap_backoff_secs: f64,
    fanout: TickFanout,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = ReconnectBackoff::new(base_backoff_secs, cap_backoff_secs);

    while !*shutdown.borrow() {
        let mut state = ConnState::Connecting;
        log::info!("🔗 [{}] {} -> {}", symbol, state.as_str(), url);

        // A hung handshake must not outlive the stop signal.
        let connected = tokio::select! {
            _ = shutdown.changed() => {
                log::info!("🛑 [{}] stopped while connecting", symbol);
                return;
            }
            result = connect_async(&url) => result,
        };

        match connected {
            Ok((ws, _response)) => {
                state = ConnState::Streaming;
                backoff.reset();
                log::info!("✅ [{}] {}", symbol, state.as_str());

                let (mut write, mut read) = ws.split();
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            let _ = write.close().await;
                            log::info!("🛑 [{}] closed on stop signal", symbol);
                            return;
                        }
                        message = read.next() => match message {
                            Some(Ok(Message::Text(text))) => {
                                if let Ok(value) = serde_json::from_str(&text) {
                                    if let Some(tick) = normalize(&value) {
                                        fanout.publish(tick);
                                    }
                                }
                                // Unparsable frames are dropped silently.
                            }
                            Some(Ok(Message::Ping(payload))) => {
                                let _ = write.send(Message::Pong(payload)).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                log::warn!("⚠️  [{}] stream closed by remote", symbol);
                                break;
                            }
                            Some(Err(e)) => {
                                log::warn!("⚠️  [{}] stream error: {}", symbol, e);
                                break;
                            }
                            Some(Ok(_)) => {}
                        }
                    }
                }
            }
            Err(e) => {
                log::warn!("⚠️  [{}] connect failed: {}", symbol, e);
            }
        }

        state = ConnState::Disconnected;
        if *shutdown.borrow() {
            break;
        }
        let delay = backoff.on_failure();
        log::info!(
            "⏳ [{}] {}, reconnecting in {:.1}s",
            symbol,
            state.as_str(),
            delay.as_secs_f64()
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }
    log::info!("✅ [{}] feed loop exited", symbol);
}

/// Synthesize one plausible tick for `symbol`: a symbol-specific base price
/// with ±0.1% jitter.
pub(crate) fn synthetic_tick(symbol: &str) -> Tick {
    let mut rng = rand::thread_rng();
    let upper = symbol.to_uppercase();
    let base = if upper.starts_with("BTC") {
        90_000.0
    } else if upper.starts_with("ETH") {
        3_000.0
    } else {
        100.0
    };
    let price = base + (rng.gen::<f64>() - 0.5) * (base * 0.002);
    let size = rng.gen::<f64>() * 0.5;
    Tick::new(
        upper,
        current_timestamp_ms(),
        (price * 100.0).round() / 100.0,
        (size * 1e6).round() / 1e6,
    )
}

/// Demo mode: bypass the network and emit synthetic ticks for every symbol at
/// a fixed interval, through the same fanout as live ticks.
pub(crate) async fn run_demo_injector(
    symbols: Vec<String>,
    interval: Duration,
    fanout: TickFanout,
    mut shutdown: watch::Receiver<bool>,
) {
    log::info!("🎛️  Demo injector started for {:?}", symbols);
    while !*shutdown.borrow() {
        for symbol in &symbols {
            fanout.publish(synthetic_tick(symbol));
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }
    }
    log::info!("✅ Demo injector exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_tick_base_prices() {
        let btc = synthetic_tick("btcusdt");
        assert_eq!(btc.symbol, "BTCUSDT");
        assert!((btc.price - 90_000.0).abs() <= 90.0);

        let eth = synthetic_tick("ETHUSDT");
        assert!((eth.price - 3_000.0).abs() <= 3.0);

        let other = synthetic_tick("solusdt");
        assert!((other.price - 100.0).abs() <= 0.1);

        assert!(btc.size >= 0.0 && btc.size <= 0.5);
    }

    #[tokio::test]
    async fn test_fanout_reaches_both_sinks() {
        let delivery = DeliveryQueue::new(16);
        let (store_tx, mut store_rx) = mpsc::unbounded_channel();
        let fanout = TickFanout {
            delivery: delivery.clone(),
            store_tx,
        };

        fanout.publish(Tick::new("BTCUSDT", 1, 100.0, 0.1));

        assert_eq!(delivery.len(), 1);
        let stored = store_rx.recv().await.unwrap();
        assert_eq!(stored.symbol, "BTCUSDT");
    }

    #[tokio::test]
    async fn test_stop_interrupts_pending_connect() {
        let delivery = DeliveryQueue::new(16);
        let (store_tx, _store_rx) = mpsc::unbounded_channel();
        let fanout = TickFanout {
            delivery,
            store_tx,
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Blackhole address: the TCP handshake hangs (or fails fast and the
        // loop enters backoff); either way stop must be observed promptly.
        let handle = tokio::spawn(run_feed_loop(
            "btcusdt".to_string(),
            "ws://10.255.255.1:81".to_string(),
            3.0,
            30.0,
            fanout,
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("feed loop should stop while connecting")
            .unwrap();
    }

    #[tokio::test]
    async fn test_demo_injector_stops_on_signal() {
        let delivery = DeliveryQueue::new(1024);
        let (store_tx, _store_rx) = mpsc::unbounded_channel();
        let fanout = TickFanout {
            delivery: delivery.clone(),
            store_tx,
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_demo_injector(
            vec!["btcusdt".to_string(), "ethusdt".to_string()],
            Duration::from_millis(10),
            fanout,
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("injector should observe stop promptly")
            .unwrap();

        assert!(delivery.len() >= 2);
    }
}
