//! Authenticated publish/subscribe hub: channel-typed dispatch to
//! WebSocket subscribers with authorisation, backpressure, and
//! cursor-based replay (SPEC_FULL.md §4.C). Transport-agnostic — `at-gateway`
//! owns the Axum WebSocket framing on top of this.

mod authz;
mod error;
mod message;

pub use authz::AgentAccessResolver;
pub use error::HubError;
pub use message::{HubMessage, OutboundFrame, ReplayAudit};

use std::sync::Arc;
use std::time::{Duration, Instant};

use at_core::types::{AuthContext, Channel};
use at_eventlog::EventLog;
use dashmap::{DashMap, DashSet};
use tokio::sync::{mpsc, Mutex};
use tracing::{instrument, warn};

const REPLAY_RATE_LIMIT_PER_MINUTE: u32 = 30;

#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    pub subscriber_queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: 256,
        }
    }
}

impl From<at_core::config::HubConfig> for HubConfig {
    fn from(cfg: at_core::config::HubConfig) -> Self {
        Self {
            subscriber_queue_capacity: cfg.subscriber_queue_capacity,
        }
    }
}

struct Subscriber {
    sender: mpsc::Sender<OutboundFrame>,
    channels: DashSet<String>,
}

#[derive(Default)]
struct ReplayGuardState {
    in_flight: bool,
    recent_requests: Vec<Instant>,
}

/// Owns the subscriber table and mediates every publish/subscribe through
/// [`authz`]. One `Hub` per daemon process.
pub struct Hub {
    event_log: Arc<EventLog>,
    config: HubConfig,
    agent_access: Option<Arc<dyn AgentAccessResolver>>,
    subscribers: DashMap<String, Subscriber>,
    channel_index: DashMap<String, DashSet<String>>,
    replay_guards: DashMap<String, Mutex<ReplayGuardState>>,
}

impl Hub {
    pub fn new(
        event_log: Arc<EventLog>,
        config: HubConfig,
        agent_access: Option<Arc<dyn AgentAccessResolver>>,
    ) -> Self {
        Self {
            event_log,
            config,
            agent_access,
            subscribers: DashMap::new(),
            channel_index: DashMap::new(),
            replay_guards: DashMap::new(),
        }
    }

    /// Register a new connection, returning the receiving half of its
    /// bounded outbound queue.
    pub fn register(&self, connection_id: impl Into<String>) -> mpsc::Receiver<OutboundFrame> {
        let connection_id = connection_id.into();
        let (tx, rx) = mpsc::channel(self.config.subscriber_queue_capacity);
        self.subscribers.insert(
            connection_id.clone(),
            Subscriber {
                sender: tx,
                channels: DashSet::new(),
            },
        );
        self.replay_guards
            .insert(connection_id, Mutex::new(ReplayGuardState::default()));
        rx
    }

    /// Drop a connection's subscriptions and outbound queue.
    pub fn unregister(&self, connection_id: &str) {
        if let Some((_, sub)) = self.subscribers.remove(connection_id) {
            for channel in sub.channels.iter() {
                if let Some(subs) = self.channel_index.get(channel.as_str()) {
                    subs.remove(connection_id);
                }
            }
        }
        self.replay_guards.remove(connection_id);
    }

    /// Subscribe `connection_id` to `channel`, replaying from `cursor` if
    /// given. Returns replay statistics for the caller to audit.
    #[instrument(skip(self, auth), fields(channel = %channel.wire_name()))]
    pub async fn subscribe(
        &self,
        connection_id: &str,
        auth: &AuthContext,
        channel: Channel,
        cursor: Option<String>,
    ) -> Result<ReplayAudit, HubError> {
        authz::authorize_subscribe(auth, &channel, self.agent_access.as_deref())?;
        self.check_replay_budget(connection_id).await?;

        let wire = channel.wire_name();
        self.channel_index
            .entry(wire.clone())
            .or_default()
            .insert(connection_id.to_string());
        if let Some(sub) = self.subscribers.get(connection_id) {
            sub.channels.insert(wire.clone());
        }

        let start = Instant::now();
        let result = self.event_log.range_after(&wire, cursor.as_deref(), 1000).await;

        let release_guard = || {
            if let Some(guard) = self.replay_guards.get(connection_id) {
                if let Ok(mut state) = guard.try_lock() {
                    state.in_flight = false;
                }
            }
        };

        let audit = match result {
            Ok(entries) => {
                let to_cursor = entries.last().map(|e| e.cursor.clone()).or_else(|| cursor.clone());
                let count = entries.len();
                for entry in entries {
                    let frame = OutboundFrame::Event(HubMessage {
                        channel: entry.channel,
                        message_type: entry.message_type,
                        data: entry.payload,
                        cursor: entry.cursor,
                        sequence: entry.sequence,
                        timestamp: entry.created_at,
                        correlation_id: entry.correlation_id,
                    });
                    self.send_to(connection_id, frame).await;
                }
                ReplayAudit {
                    connection_id: connection_id.to_string(),
                    user_id: auth.user_id.clone(),
                    channel: wire.clone(),
                    from_cursor: cursor,
                    to_cursor,
                    messages_replayed: count,
                    cursor_expired: false,
                    used_snapshot: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                }
            }
            Err(at_eventlog::EventLogError::CursorExpired(_)) if channel.supports_snapshot() => {
                self.send_to(
                    connection_id,
                    OutboundFrame::Snapshot {
                        channel: wire.clone(),
                        at_cursor: self.event_log.latest_cursor(&wire).await.ok().flatten(),
                    },
                )
                .await;
                ReplayAudit {
                    connection_id: connection_id.to_string(),
                    user_id: auth.user_id.clone(),
                    channel: wire.clone(),
                    from_cursor: cursor,
                    to_cursor: None,
                    messages_replayed: 0,
                    cursor_expired: true,
                    used_snapshot: true,
                    duration_ms: start.elapsed().as_millis() as u64,
                }
            }
            Err(at_eventlog::EventLogError::CursorExpired(_)) => {
                self.send_to(connection_id, OutboundFrame::ResyncRequired { channel: wire.clone() })
                    .await;
                ReplayAudit {
                    connection_id: connection_id.to_string(),
                    user_id: auth.user_id.clone(),
                    channel: wire.clone(),
                    from_cursor: cursor,
                    to_cursor: None,
                    messages_replayed: 0,
                    cursor_expired: true,
                    used_snapshot: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                }
            }
            Err(e) => {
                release_guard();
                return Err(e.into());
            }
        };

        release_guard();
        Ok(audit)
    }

    async fn check_replay_budget(&self, connection_id: &str) -> Result<(), HubError> {
        let guard = self
            .replay_guards
            .get(connection_id)
            .ok_or(HubError::ReplayInFlight)?;
        let mut state = guard.lock().await;
        if state.in_flight {
            return Err(HubError::ReplayInFlight);
        }
        let cutoff = Instant::now() - Duration::from_secs(60);
        state.recent_requests.retain(|t| *t > cutoff);
        if state.recent_requests.len() as u32 >= REPLAY_RATE_LIMIT_PER_MINUTE {
            return Err(HubError::ReplayRateLimited);
        }
        state.recent_requests.push(Instant::now());
        state.in_flight = true;
        Ok(())
    }

    /// Publish an event to `channel`: appends to the durable log first,
    /// then fans out to every current subscriber of that channel.
    #[instrument(skip(self, auth, data), fields(channel = %channel.wire_name()))]
    pub async fn publish(
        &self,
        auth: &AuthContext,
        channel: Channel,
        message_type: &str,
        data: serde_json::Value,
        correlation_id: Option<String>,
    ) -> Result<HubMessage, HubError> {
        authz::authorize_publish(auth, &channel)?;
        let wire = channel.wire_name();
        let (cursor, sequence) = self
            .event_log
            .append(&wire, message_type, data.clone(), correlation_id.clone())
            .await?;

        let message = HubMessage {
            channel: wire.clone(),
            message_type: message_type.to_string(),
            data,
            cursor,
            sequence,
            timestamp: chrono::Utc::now(),
            correlation_id,
        };

        let subscriber_ids: Vec<String> = self
            .channel_index
            .get(&wire)
            .map(|subs| subs.iter().map(|id| id.to_string()).collect())
            .unwrap_or_default();
        for connection_id in subscriber_ids {
            self.send_to(&connection_id, OutboundFrame::Event(message.clone())).await;
        }

        Ok(message)
    }

    async fn send_to(&self, connection_id: &str, frame: OutboundFrame) {
        let Some(sub) = self.subscribers.get(connection_id) else {
            return;
        };
        if sub.sender.try_send(frame).is_err() {
            warn!(connection_id, "subscriber queue full, disconnecting");
            drop(sub);
            self.unregister(connection_id);
        }
    }
}
