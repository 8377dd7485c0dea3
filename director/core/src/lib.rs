//! Director Core - Automatic Scene Switching for Live Judging
//!
//! This crate watches a live judging feed and keeps a video switcher (OBS) on
//! the scene that matches what is happening right now. It has no UI and no
//! process-level concerns; the `director-daemon` binary wraps it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        DIRECTOR CORE                             │
//! │                                                                  │
//! │  TransportClient ──► EventFeed ──► EventStore ──► ScheduleHandle │
//! │   (SSE, retry)                      │ snapshot        │          │
//! │                                     ▼                 ▼          │
//! │                                RuleEngine ◄──── ApplyScheduler   │
//! │                                     │ Action          │          │
//! │                                     ▼                 ▼          │
//! │                              DeviceClient ──► ObsExecutor        │
//! │                                                  (WebSocket)     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use director_core::{config::load_config, Director};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let director = Director::start(&config)?;
//!     tokio::signal::ctrl_c().await?;
//!     director.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`transport`]: Reconnecting clients with backoff, buffering and sticky replay
//! - [`events`]: Live event records and snapshots
//! - [`store`]: Event aggregate store with change signalling
//! - [`rules`]: Ordered rules mapping snapshots to actions
//! - [`scheduler`]: Debounced, single-flight apply loop
//! - [`device`]: Device executor abstraction and the OBS implementation
//! - [`feed`]: Judging message decoding
//! - [`relay`]: Downstream snapshot push
//! - [`config`]: TOML configuration with environment overrides
//! - [`director`]: Wiring of all of the above

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod device;
pub mod director;
pub mod events;
pub mod feed;
pub mod relay;
pub mod rules;
pub mod scheduler;
pub mod store;
pub mod transport;

// Re-exports for convenience
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, DirectorConfig,
};
pub use device::{DeviceClient, DeviceError, DeviceExecutor, DeviceOutcome, ObsExecutor};
pub use director::Director;
pub use events::{EventId, LiveEvent, Snapshot};
pub use feed::{EventFeed, JudgingMessage};
pub use relay::SnapshotRelay;
pub use rules::{Action, Condition, Rule, RuleEngine, RuleError, RuleSpec};
pub use scheduler::{
    ApplyReport, ApplyScheduler, ScheduleHandle, ScheduleSignals, SchedulerState, StepOutcome,
};
pub use store::{ChangeListener, EventStore, StoreError};
pub use transport::{
    ClientEvent, ConnectionState, Envelope, TransportClient, TransportError, TransportOptions,
};
