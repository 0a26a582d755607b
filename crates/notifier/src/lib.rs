//! Delivery core: channel adapters, outcome classification, the retry
//! scheduler, the notification registry and the worker loop that drives them.

pub mod adapters;
pub mod classify;
pub mod engine;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod worker;

pub use adapters::{AdapterSet, ChannelAdapter, SendOutcome};
pub use engine::DeliveryEngine;
pub use error::DeliveryError;
pub use registry::NotificationRegistry;
pub use scheduler::{Decision, RetryScheduler};
pub use stats::DeliveryStats;
pub use store::{MemoryStore, NotificationStore, PgStore};
pub use worker::DeliveryWorker;
