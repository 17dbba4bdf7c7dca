//! State aggregator for one channel device.
//!
//! Folds the notification stream from the parent controller into a coarse
//! device state. Three protections keep a flaky serial line from flapping
//! the state:
//!
//! - hysteresis: a channel only goes UNKNOWN after `max_errors` consecutive
//!   failures on the same attribute;
//! - untrusted parent: while the parent itself is INIT or UNKNOWN, the whole
//!   cache is blanked and the channel follows it into UNKNOWN;
//! - staleness: silence on the event stream beyond the staleness window
//!   forces FAULT.
//!
//! The aggregator is synchronous; an optional unbounded channel pushes
//! committed state changes to whoever wants them, fire-and-forget.

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};
use vacline_core::constants::{MAX_ERRORS, STALENESS_WINDOW};
use vacline_core::parse::{channel_base, channel_ordinal};
use vacline_core::{AttrValue, AttributeSample, DeviceState, ErrorAccounting};

use crate::cache::AttributeCache;
use crate::classify::StateClassifier;
use crate::event::{EventKind, Notification};

/// One committed state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub from: DeviceState,
    pub to: DeviceState,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Event-driven state machine for one channel device.
pub struct StateAggregator<C: StateClassifier> {
    classifier: C,
    channel: String,
    cache: AttributeCache,
    errors: ErrorAccounting,
    state: DeviceState,
    state_reason: String,
    state_error: Option<String>,
    seen_event: bool,
    last_event_at: DateTime<Utc>,
    max_errors: u32,
    staleness: Duration,
    push: Option<UnboundedSender<StateChange>>,
}

impl<C: StateClassifier> StateAggregator<C> {
    /// Create an aggregator in INIT, subscribed to `channel` and the parent
    /// state attribute.
    pub fn new(channel: impl Into<String>, classifier: C) -> Self {
        let channel = channel.into();
        let mut cache = AttributeCache::new();
        cache.seed([channel_base(&channel), "state"]);
        Self {
            classifier,
            channel,
            cache,
            errors: ErrorAccounting::new(),
            state: DeviceState::Init,
            state_reason: "initialising".to_string(),
            state_error: None,
            seen_event: false,
            last_event_at: Utc::now(),
            max_errors: MAX_ERRORS,
            staleness: STALENESS_WINDOW,
            push: None,
        }
    }

    /// Push committed state changes into the given channel.
    pub fn with_push(mut self, sender: UnboundedSender<StateChange>) -> Self {
        self.push = Some(sender);
        self
    }

    /// Override the consecutive-error threshold.
    pub fn with_max_errors(mut self, max_errors: u32) -> Self {
        self.max_errors = max_errors.max(1);
        self
    }

    /// Override the staleness window.
    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }

    /// Current device state.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Why the current state was entered.
    pub fn state_reason(&self) -> &str {
        &self.state_reason
    }

    /// Standing failure description (staleness), if any.
    pub fn state_error(&self) -> Option<&str> {
        self.state_error.as_deref()
    }

    /// When the last notification arrived.
    pub fn last_event_at(&self) -> DateTime<Utc> {
        self.last_event_at
    }

    /// Latest cached sample for an attribute.
    pub fn sample(&self, name: &str) -> Option<&AttributeSample> {
        self.cache.get(name)
    }

    /// The attribute cache.
    pub fn cache(&self) -> &AttributeCache {
        &self.cache
    }

    /// Consecutive error count for an attribute.
    pub fn errors_for(&self, attribute: &str) -> u32 {
        self.errors.count_for(attribute)
    }

    /// Human-readable error summary.
    pub fn error_report(&self) -> String {
        self.errors.report()
    }

    /// Fold one notification into the state machine.
    ///
    /// Returns the state change it caused, if any. Never panics on bad
    /// input: classifier failures and malformed samples are folded into the
    /// error counters like any other failure.
    pub fn on_notification(&mut self, n: &Notification) -> Option<StateChange> {
        self.seen_event = true;
        self.last_event_at = Utc::now();
        self.state_error = None;

        // Attribute name is fixed before any fallible step so every error
        // below can be attributed to it.
        let att = n.source.attribute.to_lowercase();
        let prev = self.state;

        match n.kind {
            EventKind::Config => None,
            EventKind::Error => {
                if let Some(parent) = self.untrusted_parent(n, &att) {
                    return self.follow_untrusted_parent(n, parent, prev);
                }
                let description = n
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("error event on '{}'", att));
                self.register_failure(&att, description, prev)
            }
            EventKind::Value => {
                if let Some(parent) = self.untrusted_parent(n, &att) {
                    return self.follow_untrusted_parent(n, parent, prev);
                }
                let Some(sample) = &n.sample else {
                    return self.register_failure(
                        &att,
                        format!("value event on '{}' carried no sample", att),
                        prev,
                    );
                };

                if att == "state" {
                    // The parent is trusted here; cache its state verbatim.
                    self.cache.update(renamed(sample, "state"));
                    return None;
                }

                let resolved = resolve_sample(&att, sample, &self.channel);
                match self.classifier.classify(&att, &resolved, prev) {
                    Err(e) => self.register_failure(&att, e.to_string(), prev),
                    Ok(DeviceState::Unknown) if prev != DeviceState::Unknown => self
                        .register_failure(
                            &att,
                            format!("'{}' classified as UNKNOWN", att),
                            prev,
                        ),
                    Ok(candidate) => {
                        self.errors.reset_for(&att);
                        self.cache.update(resolved);
                        let reason = format!("'{}' is {}", att, candidate);
                        self.commit(prev, candidate, reason)
                    }
                }
            }
        }
    }

    /// Force FAULT when the event stream has gone silent.
    ///
    /// Armed only once at least one notification has ever arrived; a device
    /// still waiting for its first event is INIT, not faulty.
    pub fn check_staleness(&mut self, now: DateTime<Utc>) -> Option<StateChange> {
        if !self.seen_event {
            return None;
        }
        let window =
            ChronoDuration::from_std(self.staleness).unwrap_or_else(|_| ChronoDuration::minutes(5));
        if now - self.last_event_at <= window || self.state == DeviceState::Fault {
            return None;
        }
        let reason = format!(
            "Events not received since {}",
            self.last_event_at.format("%Y-%m-%d %H:%M:%S")
        );
        self.state_error = Some(reason.clone());
        let prev = self.state;
        self.commit(prev, DeviceState::Fault, reason)
    }

    /// Commit a state decided outside the event stream (operator commands).
    pub fn force_state(
        &mut self,
        to: DeviceState,
        reason: impl Into<String>,
    ) -> Option<StateChange> {
        let prev = self.state;
        self.commit(prev, to, reason.into())
    }

    /// The parent state this notification should be judged against, if it is
    /// INIT or UNKNOWN. A value event on the state attribute speaks for
    /// itself; everything else (including error events) goes by the cache.
    fn untrusted_parent(&self, n: &Notification, att: &str) -> Option<DeviceState> {
        let parent = if att == "state" && matches!(n.kind, EventKind::Value) {
            n.sample.as_ref().and_then(|s| s.value.as_state())
        } else {
            self.cache.value_of("state").and_then(|v| v.as_state())
        };
        parent.filter(|s| s.is_untrusted())
    }

    /// While the parent device is INIT or UNKNOWN nothing it publishes can
    /// be trusted: record its state, blank the cache and follow it into
    /// UNKNOWN. The notification itself is consumed here, whether or not the
    /// channel was already UNKNOWN.
    fn follow_untrusted_parent(
        &mut self,
        n: &Notification,
        parent: DeviceState,
        prev: DeviceState,
    ) -> Option<StateChange> {
        if let Some(sample) = &n.sample {
            if n.source.attribute.eq_ignore_ascii_case("state") {
                self.cache.update(renamed(sample, "state"));
            }
        }
        self.cache.blank_for_untrusted();
        let reason = format!("{} state is {}", n.source.device, parent);
        self.commit(prev, DeviceState::Unknown, reason)
    }

    fn register_failure(
        &mut self,
        att: &str,
        description: String,
        prev: DeviceState,
    ) -> Option<StateChange> {
        let count = self.errors.record_for(att, description.clone());
        warn!(attribute = %att, count, error = %description, "notification failure");
        if count < self.max_errors {
            return None;
        }
        self.cache.write_sentinel(att);
        let reason = format!(
            "{} consecutive errors on '{}': {}",
            count, att, description
        );
        self.commit(prev, DeviceState::Unknown, reason)
    }

    fn commit(&mut self, from: DeviceState, to: DeviceState, reason: String) -> Option<StateChange> {
        if from == to {
            return None;
        }
        self.state = to;
        self.state_reason = reason.clone();
        info!(%from, %to, %reason, "state change");
        let change = StateChange {
            from,
            to,
            reason,
            at: Utc::now(),
        };
        if let Some(push) = &self.push {
            push.send(change.clone()).ok();
        }
        Some(change)
    }
}

fn renamed(sample: &AttributeSample, name: &str) -> AttributeSample {
    AttributeSample::at(name, sample.value.clone(), sample.quality, sample.timestamp)
}

/// Reduce a spectrum sample to the scalar this channel watches.
fn resolve_sample(att: &str, sample: &AttributeSample, channel: &str) -> AttributeSample {
    let value = match &sample.value {
        AttrValue::NumberArray(_) => match sample.value.element(channel_ordinal(channel)) {
            Some(v) => AttrValue::Number(v),
            None => AttrValue::Null,
        },
        other => other.clone(),
    };
    AttributeSample::at(att, value, sample.quality, sample.timestamp)
}
