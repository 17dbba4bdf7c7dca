//! Event-driven state aggregation for vacuum channel devices.
//!
//! A channel device does not talk to hardware itself: it subscribes to
//! attribute notifications from a parent controller device and folds them
//! into a coarse [`DeviceState`](vacline_core::DeviceState). This crate
//! holds the notification types, the per-device attribute cache, the state
//! classifiers and the aggregator that ties them together with hysteresis
//! and staleness detection.

pub mod aggregator;
pub mod cache;
pub mod classify;
pub mod event;

pub use aggregator::{StateAggregator, StateChange};
pub use cache::AttributeCache;
pub use classify::{PressureChannelClassifier, StateClassifier};
pub use event::{EventKind, EventSource, Notification};
