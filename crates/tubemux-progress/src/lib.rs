//! Real-time progress broadcast for the tubemux pipeline.
//!
//! Observers subscribe to a [`ProgressHub`] and receive every
//! [`tubemux_models::ProgressEvent`] published after they joined.

pub mod hub;

pub use hub::{ProgressHub, Subscription, SubscriptionId, DEFAULT_SUBSCRIBER_BUFFER};
