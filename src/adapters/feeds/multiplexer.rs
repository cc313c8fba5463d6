//! Stream multiplexer - dual-channel WebSocket owner.
//!
//! Maintains the market and user channels to the venue, demultiplexing
//! both into a single bounded event stream. Owns the subscription sets,
//! the reconnect policy, and per-channel application-layer liveness.
//!
//! The venue checks for a literal `PING` text frame every few seconds;
//! transport-level ping/pong is not what it looks at, so it is left
//! unused. A channel that sees no inbound traffic for three ping windows
//! is treated as dead and goes through the reconnect path.
//!
//! The output channel is a bounded mpsc: a consumer that falls behind
//! back-pressures the receive loop. Market events are never dropped.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{broadcast, mpsc, Mutex, Notify, RwLock};
use tokio::time::{interval_at, sleep, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};

use super::decoder::MessageDecoder;
use crate::adapters::api::ApiCredentials;
use crate::config::AppConfig;
use crate::domain::MarketEvent;

/// Outbound event buffer size; the receive loop blocks when full.
const EVENT_BUFFER: usize = 1024;
/// Consecutive silent ping windows before a channel counts as dead.
const LIVENESS_WINDOWS: u32 = 3;
/// How long the market channel waits for the initial book dump before
/// flushing buffered events anyway.
const INITIAL_DUMP_TIMEOUT: Duration = Duration::from_secs(5);

/// The two logical channels to the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Public price/book/trade stream, subscribed by token ids.
    Market,
    /// Authenticated order lifecycle stream, subscribed by condition ids.
    User,
}

impl ChannelKind {
    fn name(self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::User => "user",
        }
    }
}

/// Per-channel connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    /// Connected, awaiting the initial dump; events buffer here.
    Subscribing,
    /// Streaming; liveness pings are sent only in this state.
    Live,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribing => "subscribing",
            Self::Live => "live",
        };
        write!(f, "{s}")
    }
}

/// Snapshot of both channel states for the heartbeat line.
#[derive(Debug, Clone, Copy)]
pub struct MuxStatus {
    pub market: ChannelState,
    pub user: ChannelState,
}

/// Stream configuration extracted from the application config.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Market-channel WebSocket URL.
    pub market_ws_url: String,
    /// User-channel WebSocket URL.
    pub user_ws_url: String,
    /// Credentials for the user channel; absent means market-only.
    pub credentials: Option<ApiCredentials>,
    /// Application-layer PING cadence.
    pub ping_interval: Duration,
    /// Delay before reconnecting a dropped channel.
    pub reconnect_delay: Duration,
    /// Whether transport errors trigger reconnection.
    pub auto_reconnect: bool,
}

impl StreamConfig {
    /// Build stream configuration from the application config.
    pub fn from_config(config: &AppConfig) -> Self {
        let credentials = config.has_ws_credentials().then(|| ApiCredentials {
            api_key: config.api.api_key.clone(),
            api_secret: config.api.api_secret.clone(),
            api_passphrase: config.api.api_passphrase.clone(),
        });

        Self {
            market_ws_url: config.api.market_ws_url.clone(),
            user_ws_url: config.api.user_ws_url.clone(),
            credentials,
            ping_interval: Duration::from_secs(config.websocket.ping_interval_secs),
            reconnect_delay: Duration::from_secs(config.websocket.reconnect_delay_secs),
            auto_reconnect: config.websocket.auto_reconnect,
        }
    }
}

/// Dual-channel WebSocket multiplexer.
pub struct StreamMultiplexer {
    config: StreamConfig,
    /// Market-channel token id subscriptions.
    market_subs: RwLock<HashSet<String>>,
    /// User-channel condition id subscriptions.
    user_subs: RwLock<HashSet<String>>,
    /// Outbound demultiplexed event stream.
    event_tx: mpsc::Sender<MarketEvent>,
    /// Shared decoder; counters survive reconnects.
    decoder: Mutex<MessageDecoder>,
    market_state: RwLock<ChannelState>,
    user_state: RwLock<ChannelState>,
    /// Wake the market channel to re-send its subscription frame.
    market_resub: Notify,
    /// Wake the user channel to re-send its subscription frame.
    user_resub: Notify,
}

impl StreamMultiplexer {
    /// Create a multiplexer and the receiving end of its event stream.
    pub fn new(config: StreamConfig) -> (Self, mpsc::Receiver<MarketEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let mux = Self {
            config,
            market_subs: RwLock::new(HashSet::new()),
            user_subs: RwLock::new(HashSet::new()),
            event_tx,
            decoder: Mutex::new(MessageDecoder::new()),
            market_state: RwLock::new(ChannelState::Disconnected),
            user_state: RwLock::new(ChannelState::Disconnected),
            market_resub: Notify::new(),
            user_resub: Notify::new(),
        };
        (mux, event_rx)
    }

    /// Subscribe the market channel to additional token ids.
    ///
    /// Idempotent; if the channel is live the full current set is
    /// re-sent, which the venue treats as a replacement subscription.
    pub async fn subscribe_market<I>(&self, token_ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut subs = self.market_subs.write().await;
        subs.extend(token_ids);
        debug!(tokens = subs.len(), "Market subscriptions updated");
        drop(subs);
        self.market_resub.notify_one();
    }

    /// Subscribe the user channel to additional condition ids.
    pub async fn subscribe_user<I>(&self, condition_ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut subs = self.user_subs.write().await;
        subs.extend(condition_ids);
        debug!(markets = subs.len(), "User subscriptions updated");
        drop(subs);
        self.user_resub.notify_one();
    }

    /// Current per-channel state snapshot.
    pub async fn status(&self) -> MuxStatus {
        MuxStatus {
            market: *self.market_state.read().await,
            user: *self.user_state.read().await,
        }
    }

    /// Decoder side-channel counters: (frames ok, frames failed, events).
    pub async fn decode_stats(&self) -> (u64, u64, u64) {
        let d = self.decoder.lock().await;
        (d.frames_ok, d.frames_failed, d.events_out)
    }

    /// Run both channels until shutdown.
    ///
    /// The user channel is only driven when credentials are configured;
    /// otherwise it is skipped with a log line. Returns `Ok` on clean
    /// shutdown, or the terminal transport error when `auto_reconnect`
    /// is disabled.
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        if self.config.credentials.is_some() {
            let user_rx = shutdown_rx.resubscribe();
            tokio::try_join!(
                self.run_channel(ChannelKind::Market, shutdown_rx),
                self.run_channel(ChannelKind::User, user_rx),
            )?;
        } else {
            info!("User channel credentials not configured, skipping user stream");
            self.run_channel(ChannelKind::Market, shutdown_rx).await?;
        }
        Ok(())
    }

    /// Drive one channel through its connect/stream/reconnect cycle.
    async fn run_channel(
        &self,
        kind: ChannelKind,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        loop {
            self.set_state(kind, ChannelState::Connecting).await;

            let outcome = self.connect_and_stream(kind, &mut shutdown_rx).await;
            self.set_state(kind, ChannelState::Disconnected).await;

            match outcome {
                Ok(()) => {
                    info!(channel = kind.name(), "Stream closed");
                    return Ok(());
                }
                Err(e) => {
                    if !self.config.auto_reconnect {
                        return Err(e)
                            .with_context(|| format!("{} stream failed", kind.name()));
                    }
                    warn!(
                        channel = kind.name(),
                        error = %e,
                        delay_secs = self.config.reconnect_delay.as_secs(),
                        "Stream disconnected, reconnecting"
                    );
                    tokio::select! {
                        _ = shutdown_rx.recv() => return Ok(()),
                        _ = sleep(self.config.reconnect_delay) => {}
                    }
                }
            }
        }
    }

    /// One WebSocket session: connect, subscribe, stream until error or
    /// shutdown. `Ok` means a deliberate close; `Err` feeds the
    /// reconnect path.
    async fn connect_and_stream(
        &self,
        kind: ChannelKind,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<()> {
        let url = match kind {
            ChannelKind::Market => &self.config.market_ws_url,
            ChannelKind::User => &self.config.user_ws_url,
        };

        let (ws, _) = connect_async(url)
            .await
            .with_context(|| format!("{} WebSocket connection failed", kind.name()))?;
        let (mut write, mut read) = ws.split();

        info!(channel = kind.name(), url = %url, "WebSocket connected");
        self.set_state(kind, ChannelState::Subscribing).await;

        if let Some(frame) = self.subscription_frame(kind).await {
            write
                .send(Message::Text(frame))
                .await
                .context("Subscription send failed")?;
        }

        // The market channel buffers until the venue has replayed the
        // initial book for every subscribed token (or the deadline
        // passes). The user channel has no dump and goes live at once.
        let mut awaiting_dump: HashSet<String> = match kind {
            ChannelKind::Market => self.market_subs.read().await.iter().cloned().collect(),
            ChannelKind::User => HashSet::new(),
        };
        let mut pending: Vec<MarketEvent> = Vec::new();
        let mut live = awaiting_dump.is_empty();
        if live {
            self.set_state(kind, ChannelState::Live).await;
        }

        let dump_deadline = tokio::time::sleep(INITIAL_DUMP_TIMEOUT);
        tokio::pin!(dump_deadline);

        let ping_interval = self.config.ping_interval;
        let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);
        let mut last_rx = Instant::now();

        let resub = match kind {
            ChannelKind::Market => &self.market_resub,
            ChannelKind::User => &self.user_resub,
        };

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                _ = resub.notified() => {
                    if let Some(frame) = self.subscription_frame(kind).await {
                        write
                            .send(Message::Text(frame))
                            .await
                            .context("Resubscription send failed")?;
                    }
                }
                _ = &mut dump_deadline, if !live => {
                    debug!(
                        channel = kind.name(),
                        missing = awaiting_dump.len(),
                        "Initial dump timed out, going live"
                    );
                    live = true;
                    self.set_state(kind, ChannelState::Live).await;
                    if !self.flush(&mut pending).await {
                        return Ok(());
                    }
                }
                _ = ping.tick() => {
                    if liveness_expired(last_rx.elapsed(), ping_interval) {
                        anyhow::bail!(
                            "No traffic for {} ping windows",
                            LIVENESS_WINDOWS
                        );
                    }
                    if live {
                        write
                            .send(Message::Text("PING".to_string()))
                            .await
                            .context("Liveness ping failed")?;
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            last_rx = Instant::now();
                            if text == "PONG" || text == "PING" {
                                continue;
                            }
                            let events = self.decoder.lock().await.decode(&text);
                            for event in events {
                                if let MarketEvent::Book { token_id, .. } = &event {
                                    awaiting_dump.remove(token_id);
                                }
                                if live {
                                    if self.event_tx.send(event).await.is_err() {
                                        info!(channel = kind.name(),
                                            "Event consumer dropped, closing stream");
                                        return Ok(());
                                    }
                                } else {
                                    pending.push(event);
                                }
                            }
                            if !live && awaiting_dump.is_empty() {
                                live = true;
                                self.set_state(kind, ChannelState::Live).await;
                                if !self.flush(&mut pending).await {
                                    return Ok(());
                                }
                            }
                        }
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                            last_rx = Instant::now();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            anyhow::bail!("Server closed connection: {frame:?}");
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(e).context("WebSocket receive error");
                        }
                        None => anyhow::bail!("WebSocket stream ended"),
                    }
                }
            }
        }
    }

    /// Forward buffered events in order. Returns false when the consumer
    /// is gone.
    async fn flush(&self, pending: &mut Vec<MarketEvent>) -> bool {
        for event in pending.drain(..) {
            if self.event_tx.send(event).await.is_err() {
                return false;
            }
        }
        true
    }

    /// Build the subscription frame for a channel from its current set.
    ///
    /// Returns `None` when there is nothing to subscribe (or, for the
    /// user channel, no credentials).
    async fn subscription_frame(&self, kind: ChannelKind) -> Option<String> {
        match kind {
            ChannelKind::Market => {
                let subs = self.market_subs.read().await;
                if subs.is_empty() {
                    return None;
                }
                let mut ids: Vec<&String> = subs.iter().collect();
                ids.sort();
                let mut frame = json!({
                    "type": "MARKET",
                    "assets_ids": ids,
                    "initial_dump": true,
                });
                if let Some(creds) = &self.config.credentials {
                    frame["auth"] = auth_object(creds);
                }
                Some(frame.to_string())
            }
            ChannelKind::User => {
                let creds = self.config.credentials.as_ref()?;
                let subs = self.user_subs.read().await;
                if subs.is_empty() {
                    return None;
                }
                let mut ids: Vec<&String> = subs.iter().collect();
                ids.sort();
                Some(
                    json!({
                        "type": "USER",
                        "auth": auth_object(creds),
                        "markets": ids,
                    })
                    .to_string(),
                )
            }
        }
    }

    async fn set_state(&self, kind: ChannelKind, state: ChannelState) {
        let slot = match kind {
            ChannelKind::Market => &self.market_state,
            ChannelKind::User => &self.user_state,
        };
        *slot.write().await = state;
    }
}

/// Whether the silence since the last inbound frame exceeds the liveness
/// budget of three consecutive ping windows.
fn liveness_expired(silence: Duration, ping_interval: Duration) -> bool {
    silence >= ping_interval * LIVENESS_WINDOWS
}

fn auth_object(creds: &ApiCredentials) -> serde_json::Value {
    json!({
        "apiKey": creds.api_key,
        "secret": creds.api_secret,
        "passphrase": creds.api_passphrase,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_config(credentials: Option<ApiCredentials>) -> StreamConfig {
        StreamConfig {
            market_ws_url: "wss://example.com/ws/market".to_string(),
            user_ws_url: "wss://example.com/ws/user".to_string(),
            credentials,
            ping_interval: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(5),
            auto_reconnect: true,
        }
    }

    fn credentials() -> ApiCredentials {
        ApiCredentials {
            api_key: "k".to_string(),
            api_secret: "s".to_string(),
            api_passphrase: "p".to_string(),
        }
    }

    #[tokio::test]
    async fn market_frame_contains_every_subscribed_token() {
        let (mux, _rx) = StreamMultiplexer::new(stream_config(None));
        mux.subscribe_market(["TY".to_string(), "TN".to_string()]).await;

        let frame = mux.subscription_frame(ChannelKind::Market).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(parsed["type"], "MARKET");
        assert_eq!(parsed["initial_dump"], true);
        let ids: Vec<&str> = parsed["assets_ids"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert!(ids.contains(&"TY"));
        assert!(ids.contains(&"TN"));
        assert!(parsed.get("auth").is_none());
    }

    #[tokio::test]
    async fn resubscribing_is_idempotent() {
        let (mux, _rx) = StreamMultiplexer::new(stream_config(None));
        mux.subscribe_market(["TY".to_string()]).await;
        mux.subscribe_market(["TY".to_string(), "TN".to_string()]).await;

        let frame = mux.subscription_frame(ChannelKind::Market).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["assets_ids"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn market_frame_carries_auth_when_configured() {
        let (mux, _rx) = StreamMultiplexer::new(stream_config(Some(credentials())));
        mux.subscribe_market(["TY".to_string()]).await;

        let frame = mux.subscription_frame(ChannelKind::Market).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["auth"]["apiKey"], "k");
        assert_eq!(parsed["auth"]["passphrase"], "p");
    }

    #[tokio::test]
    async fn user_frame_requires_credentials() {
        let (mux, _rx) = StreamMultiplexer::new(stream_config(None));
        mux.subscribe_user(["0xcond".to_string()]).await;
        assert!(mux.subscription_frame(ChannelKind::User).await.is_none());

        let (mux, _rx) = StreamMultiplexer::new(stream_config(Some(credentials())));
        mux.subscribe_user(["0xcond".to_string()]).await;
        let frame = mux.subscription_frame(ChannelKind::User).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["type"], "USER");
        assert_eq!(parsed["markets"][0], "0xcond");
        assert_eq!(parsed["auth"]["secret"], "s");
    }

    #[tokio::test]
    async fn empty_subscription_sends_nothing() {
        let (mux, _rx) = StreamMultiplexer::new(stream_config(None));
        assert!(mux.subscription_frame(ChannelKind::Market).await.is_none());
    }

    #[test]
    fn liveness_budget_is_three_windows() {
        let window = Duration::from_secs(5);
        assert!(!liveness_expired(Duration::from_secs(14), window));
        assert!(liveness_expired(Duration::from_secs(15), window));
        assert!(liveness_expired(Duration::from_secs(60), window));
    }
}
