//! Director
//!
//! Wires the feed, the store, the rules, the scheduler, the device and the
//! optional overlay relay together from a [`DirectorConfig`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────┐   ┌────────────┐  signal  ┌────────────────┐
//! │ judging feed │──►│ EventFeed │──►│ EventStore │────────► │ ApplyScheduler │
//! │   (SSE)      │   └───────────┘   └────────────┘          └───────┬────────┘
//! └──────────────┘                          ▲ snapshot               │
//!                                           └────────────────────────┤
//!                                                   RuleEngine ◄─────┤
//!                          ┌─────────────┐                           │
//!                          │ ObsExecutor │◄──── DeviceClient ◄───────┤
//!                          └──────┬──────┘                           │
//!                                 │ ready ─► signal                  ▼
//!                                 ▼                          SnapshotRelay
//!                               OBS                              (overlay)
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{ConfigError, DirectorConfig};
use crate::device::{DeviceClient, ObsExecutor};
use crate::feed::EventFeed;
use crate::relay::SnapshotRelay;
use crate::rules::RuleEngine;
use crate::scheduler::{spawn_nudge, ApplyReport, ApplyScheduler, ScheduleHandle};
use crate::store::EventStore;
use crate::transport::{Connector, TransportClient};

/// A running director
pub struct Director {
    store: EventStore,
    schedule: ScheduleHandle,
    feed: TransportClient,
    device: ObsExecutor,
    relay: Option<SnapshotRelay>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Director {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Director")
            .field("events", &self.store.len())
            .field("feed", &self.feed.state())
            .field("device", &self.device)
            .field("relay", &self.relay.is_some())
            .finish_non_exhaustive()
    }
}

impl Director {
    /// Start against the endpoints named in `config`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if the configuration is
    /// invalid. Unreachable endpoints are not errors; their clients keep
    /// retrying in the background.
    #[cfg(feature = "websocket")]
    pub fn start(config: &DirectorConfig) -> Result<Self, ConfigError> {
        use crate::transport::{SseConnector, WsConnector};

        let overlay = config
            .overlay
            .as_ref()
            .map(|overlay| WsConnector::new(overlay.url.clone()));
        Self::start_with(
            config,
            SseConnector::new(config.stream.endpoint()),
            WsConnector::new(config.device.url.clone()),
            overlay,
            None,
        )
    }

    /// Start with explicit connectors
    ///
    /// `overlay` is only used when `config.overlay` is set. Every apply step
    /// is reported to `observer` if one is given.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if the configuration is
    /// invalid.
    pub fn start_with<F, D, O>(
        config: &DirectorConfig,
        feed: F,
        device: D,
        overlay: Option<O>,
        observer: Option<mpsc::UnboundedSender<ApplyReport>>,
    ) -> Result<Self, ConfigError>
    where
        F: Connector,
        D: Connector,
        O: Connector,
    {
        config.validate()?;

        let (schedule, signals) = ScheduleHandle::channel();
        let store = EventStore::new(Arc::new(schedule.clone()));
        let rules = Arc::new(RuleEngine::from_specs(config.rules.clone()));
        let mut tasks = Vec::new();

        let (device, device_pump) = ObsExecutor::spawn(
            device,
            config.transport.clone(),
            config.device.password.clone(),
            config.device.request_timeout(),
            schedule.clone(),
        );
        tasks.push(device_pump);

        let relay = match (overlay, &config.overlay) {
            (Some(connector), Some(overlay)) => {
                let (relay, logger) =
                    SnapshotRelay::spawn(connector, config.transport.clone(), overlay.tag.clone());
                tasks.push(logger);
                Some(relay)
            }
            _ => None,
        };

        let mut scheduler = ApplyScheduler::new(
            signals,
            store.clone(),
            Arc::clone(&rules),
            DeviceClient::new(device.clone()),
        );
        if let Some(relay) = &relay {
            scheduler = scheduler.with_relay(relay.clone());
        }
        if let Some(observer) = observer {
            scheduler = scheduler.with_observer(observer);
        }
        tasks.push(scheduler.spawn());

        let (feed, feed_task) = EventFeed::new(store.clone()).spawn(feed, config.transport.clone());
        tasks.push(feed_task);

        if let Some(every) = config.scheduler.nudge_interval() {
            tasks.push(spawn_nudge(schedule.clone(), every));
        }

        info!(
            stream = %config.stream.endpoint(),
            device = %config.device.url,
            overlay = config.overlay.as_ref().map_or("-", |o| o.url.as_str()),
            rules = rules.rules().len(),
            "Director starting"
        );

        device.connect();
        if let Some(relay) = &relay {
            relay.connect();
        }
        feed.connect();
        schedule.schedule_update();

        Ok(Self {
            store,
            schedule,
            feed,
            device,
            relay,
            tasks,
        })
    }

    /// The event store
    #[must_use]
    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Handle for requesting an extra apply cycle
    #[must_use]
    pub fn schedule_handle(&self) -> ScheduleHandle {
        self.schedule.clone()
    }

    /// The device executor
    #[must_use]
    pub fn device(&self) -> &ObsExecutor {
        &self.device
    }

    /// The judging feed client
    #[must_use]
    pub fn feed(&self) -> &TransportClient {
        &self.feed
    }

    /// Disconnect everything and stop background tasks
    pub fn shutdown(self) {
        info!("Director shutting down");
        self.feed.disconnect();
        self.device.disconnect();
        if let Some(relay) = &self.relay {
            relay.disconnect();
        }
        for task in self.tasks {
            task.abort();
        }
    }
}
