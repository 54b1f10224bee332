use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use bytes::Bytes;
use futures::Stream;
use tracing::{debug, trace, warn};

use super::{Broker, PatternSubscription, Subscription};
use crate::{
    error::{BusError, ValidationError},
    telemetry::{
        asset_channel, ChangeEnvelope, ChangeEvent, ChangeKind, PositionRecord, StateRecord,
        ALL_ASSETS_CHANNEL,
    },
};

/// Matches both global telemetry channels.
const GLOBAL_PATTERN: &str = "telemetry:*:update";

#[derive(Default)]
struct BusCounters {
    published: AtomicU64,
    dropped: AtomicU64,
    malformed: AtomicU64,
    lagged: AtomicU64,
}

struct BusInner {
    broker: Broker,
    counters: BusCounters,
}

/// Snapshot of bus counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Events handed to the broker.
    pub published: u64,
    /// Events that could not be encoded and were never sent.
    pub dropped: u64,
    /// Inbound messages discarded as non-JSON.
    pub malformed: u64,
    /// Messages a slow subscriber skipped.
    pub lagged: u64,
    /// Channel writes that found no listener left.
    pub undelivered: u64,
    /// Live per-channel subscriptions in the broker.
    pub channels: usize,
}

/// Change announcement bus.
///
/// Publishing and subscribing go through separate handles so one task can
/// hold both without either blocking the other. Delivery is at-most-once
/// with no replay.
#[derive(Clone)]
pub struct ChangeBus {
    inner: Arc<BusInner>,
}

/// Publish side of the bus. Fire-and-forget: failures are logged and
/// counted, never returned.
#[derive(Clone)]
pub struct BusPublisher {
    inner: Arc<BusInner>,
}

/// Subscribe side of the bus.
#[derive(Clone)]
pub struct BusSubscriber {
    inner: Arc<BusInner>,
}

enum Source {
    Exact(Subscription),
    Pattern(PatternSubscription),
}

/// Stream of change events from one subscription.
///
/// Non-JSON messages are dropped here with a warning. Envelopes that parse
/// but fail the schema check are yielded as `Err` so the consumer decides
/// what to do with them.
pub struct ChangeStream {
    source: Source,
    inner: Arc<BusInner>,
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                broker: Broker::new(capacity),
                counters: BusCounters::default(),
            }),
        }
    }

    pub fn publisher(&self) -> BusPublisher {
        BusPublisher {
            inner: self.inner.clone(),
        }
    }

    pub fn subscriber(&self) -> BusSubscriber {
        BusSubscriber {
            inner: self.inner.clone(),
        }
    }

    pub fn stats(&self) -> BusStats {
        let c = &self.inner.counters;
        let broker = self.inner.broker.stats();
        BusStats {
            published: c.published.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            malformed: c.malformed.load(Ordering::Relaxed),
            lagged: c.lagged.load(Ordering::Relaxed),
            undelivered: broker.undelivered,
            channels: broker.channels,
        }
    }
}

impl BusPublisher {
    pub fn publish_position(
        &self,
        asset_id: &str,
        position: &PositionRecord,
    ) {
        self.publish(&ChangeEvent::position(asset_id, position.clone()));
    }

    pub fn publish_state(
        &self,
        asset_id: &str,
        state: &StateRecord,
    ) {
        self.publish(&ChangeEvent::state(asset_id, state.clone()));
    }

    /// Sends the event to its global channel and, when someone listens, to
    /// `asset:<id>:updates` and `asset:all:updates`.
    pub fn publish(
        &self,
        event: &ChangeEvent,
    ) {
        let channel = event.kind().channel();
        let payload = match ChangeEnvelope::from_event(event).and_then(|e| serde_json::to_vec(&e)) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                let err = BusError::Encode {
                    channel: channel.to_string(),
                    reason: e.to_string(),
                };
                self.inner.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(asset_id = %event.asset_id, error = %err, "Failed to publish change event");
                return;
            }
        };

        let broker = &self.inner.broker;
        let mut delivered = broker.publish(channel, payload.clone());
        let per_asset = asset_channel(&event.asset_id);
        for extra in [per_asset.as_str(), ALL_ASSETS_CHANNEL] {
            if broker.has_subscribers(extra) {
                delivered += broker.publish(extra, payload.clone());
            }
        }

        self.inner.counters.published.fetch_add(1, Ordering::Relaxed);
        trace!(asset_id = %event.asset_id, channel, delivered, "Change event published");
    }

    /// Publishes an arbitrary payload; used by producers that already hold
    /// the encoded envelope.
    pub fn publish_raw(
        &self,
        channel: &str,
        payload: impl Into<Bytes>,
    ) -> usize {
        self.inner.broker.publish(channel, payload.into())
    }
}

impl BusSubscriber {
    /// Position and state announcements of every asset.
    pub fn subscribe_global(&self) -> Result<ChangeStream, BusError> {
        let sub = self.inner.broker.psubscribe(GLOBAL_PATTERN)?;
        debug!(pattern = GLOBAL_PATTERN, "Subscribed to global change stream");
        Ok(self.stream(Source::Pattern(sub)))
    }

    /// Announcements of a single asset via `asset:<id>:updates`.
    pub fn subscribe_asset(
        &self,
        asset_id: &str,
    ) -> ChangeStream {
        let sub = self.inner.broker.subscribe(&asset_channel(asset_id));
        debug!(asset_id, "Subscribed to asset channel");
        self.stream(Source::Exact(sub))
    }

    /// Closes every stream obtained from `subscribe_asset(asset_id)`.
    pub fn unsubscribe_asset(
        &self,
        asset_id: &str,
    ) {
        self.inner.broker.unsubscribe_all(&asset_channel(asset_id));
        debug!(asset_id, "Unsubscribed from asset channel");
    }

    /// Catch-all per-asset channel `asset:all:updates`.
    pub fn subscribe_all_assets(&self) -> ChangeStream {
        self.stream(Source::Exact(self.inner.broker.subscribe(ALL_ASSETS_CHANNEL)))
    }

    fn stream(
        &self,
        source: Source,
    ) -> ChangeStream {
        ChangeStream {
            source,
            inner: self.inner.clone(),
        }
    }
}

impl ChangeStream {
    /// Next event, or `None` once the underlying channel is closed.
    pub async fn next(&mut self) -> Option<Result<ChangeEvent, ValidationError>> {
        loop {
            let received = match &mut self.source {
                Source::Exact(sub) => sub.recv().await,
                Source::Pattern(sub) => sub.recv().await,
            };
            let msg = match received {
                Ok(msg) => msg,
                Err(BusError::Lagged { skipped }) => {
                    self.inner.counters.lagged.fetch_add(skipped, Ordering::Relaxed);
                    warn!(skipped, "Change stream lagged, messages lost");
                    continue;
                }
                Err(_) => return None,
            };

            let envelope: ChangeEnvelope = match serde_json::from_slice(&msg.payload) {
                Ok(env) => env,
                Err(e) => {
                    let err = BusError::Malformed {
                        channel: msg.channel.to_string(),
                        reason: e.to_string(),
                    };
                    self.inner.counters.malformed.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %err, "Dropping malformed bus message");
                    continue;
                }
            };

            let kind = ChangeKind::from_channel(&msg.channel).unwrap_or(if envelope.position.is_some() {
                ChangeKind::Position
            } else {
                ChangeKind::State
            });
            return Some(envelope.into_event(kind));
        }
    }

    /// Detaches from the bus. Messages published afterwards are not
    /// delivered to this stream.
    pub fn unsubscribe(self) {
        match self.source {
            Source::Exact(sub) => {
                debug!(channel = %sub.channel, "Change stream unsubscribed");
                sub.unsubscribe();
            }
            Source::Pattern(sub) => {
                debug!(pattern = %sub.pattern, "Change stream unsubscribed");
                sub.unsubscribe();
            }
        }
    }

    /// Adapts the subscription into a `futures::Stream`.
    pub fn into_stream(self) -> impl Stream<Item = Result<ChangeEvent, ValidationError>> + Send {
        futures::stream::unfold(self, |mut s| async move {
            let item = s.next().await?;
            Some((item, s))
        })
    }
}
