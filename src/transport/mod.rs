//! Realtime call transport.
//!
//! The adapter normalizes a realtime client's events into [`TransportEvent`]
//! and wraps its commands with the connection guards the session relies on.

pub mod adapter;
pub mod client;
pub mod error;
pub mod event;
pub mod microphone;

pub use adapter::{
    ConnectRequest, DisconnectOutcome, SubscriptionId, TransportAdapter, TransportSubscription,
};
pub use client::{
    raw_event_channel, RawEventReceiver, RawEventSender, RealtimeClient, StartCallConfig,
};
pub use error::TransportError;
pub use event::{normalize, RawTransportEvent, TransportEvent};
pub use microphone::{CpalMicrophone, MicrophoneProbe};
