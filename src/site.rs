//! # Site runtime: one arbiter, its fleet adapters and the event subscribers.
//!
//! [`SiteBuilder`] wires the pieces together from a [`Config`] and a [`SiteConfig`];
//! [`Site`] starts and stops them as a unit.
//!
//! ```text
//! SiteBuilder::new(cfg, site)
//!   .with_store(..) .with_clock(..)          (defaults: in-memory store, system clock)
//!   .with_vendor("amr", vendor)              → FleetConnector per fleet
//!   .with_adapter(adapter)                   → any other FleetAdapter
//!   .with_subscribers(..)
//!   .build()
//!        │
//!        ▼
//! Site::start()  arbiter.start(adapters) → every adapter starts its listener
//! Site::stop()   every listener stops    → arbiter.stop()
//! Site::run()    start → wait for SIGINT/SIGTERM/SIGQUIT → ShutdownRequested → stop
//!
//! Bus ──► site listener ──► SubscriberSet ──► LogWriter, user subscribers
//! ```
//!
//! ## Example
//! ```
//! use std::sync::Arc;
//! use spacevisor::{AccessControl, Config, SimulatedFleet, SiteBuilder, SiteConfig, SpaceConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), spacevisor::RuntimeError> {
//! let site = SiteConfig::new(
//!     "dc-east",
//!     vec![SpaceConfig { id: "door".into(), owner_fleet: "amr".into() }],
//! );
//! let vendor = Arc::new(
//!     SimulatedFleet::new(AccessControl::ExclusionZone)
//!         .with_space("door", &[(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)]),
//! );
//!
//! let site = SiteBuilder::new(Config::default(), site)?
//!     .with_vendor("amr", vendor)
//!     .build();
//!
//! site.start()?;
//! assert!(site.arbiter().is_running());
//! site.stop()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::arbiter::Arbiter;
use crate::clock::{ClockRef, SystemClock};
use crate::config::{Config, SiteConfig};
use crate::core::wait_for_shutdown_signal;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::fleet::{AdapterRef, FleetConnector, VendorClient};
use crate::store::{MemoryQueueStore, StoreRef};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builds one adapter once the clock and bus of the site are known.
type AdapterFactory = Box<dyn FnOnce(&SiteParts) -> AdapterRef + Send>;

/// What an adapter needs from the site it joins.
struct SiteParts {
    cfg: Config,
    spaces: Vec<String>,
    clock: ClockRef,
    bus: Bus,
}

/// Builder for a [`Site`].
pub struct SiteBuilder {
    cfg: Config,
    site: SiteConfig,
    clock: Option<ClockRef>,
    store: Option<StoreRef>,
    adapters: Vec<AdapterFactory>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl SiteBuilder {
    /// Validates `site` and layers its overrides on top of `cfg`.
    pub fn new(cfg: Config, site: SiteConfig) -> Result<Self, RuntimeError> {
        site.validate()?;
        Ok(Self {
            cfg: site.apply(cfg),
            site,
            clock: None,
            store: None,
            adapters: Vec::new(),
            subscribers: Vec::new(),
        })
    }

    /// Effective configuration after the site overrides.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Clock shared by the store, the adapters and the arbiter. Defaults to [`SystemClock`].
    pub fn with_clock(mut self, clock: ClockRef) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Priority queue backend. Defaults to a [`MemoryQueueStore`] on the site clock.
    pub fn with_store(mut self, store: StoreRef) -> Self {
        self.store = Some(store);
        self
    }

    /// Connects a vendor fleet through a [`FleetConnector`] watching every site space.
    pub fn with_vendor<V: VendorClient>(mut self, fleet_id: impl Into<Arc<str>>, vendor: Arc<V>) -> Self {
        let fleet_id = fleet_id.into();
        self.adapters.push(Box::new(move |parts: &SiteParts| {
            Arc::new(FleetConnector::new(
                fleet_id,
                vendor,
                parts.spaces.iter().cloned(),
                &parts.cfg,
                Arc::clone(&parts.clock),
                parts.bus.clone(),
            )) as AdapterRef
        }));
        self
    }

    /// Adds an adapter built elsewhere.
    ///
    /// It must publish to [`Site::bus`] itself if its events should reach subscribers.
    pub fn with_adapter(mut self, adapter: AdapterRef) -> Self {
        self.adapters.push(Box::new(move |_: &SiteParts| adapter));
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the site. Must be called from within a tokio runtime.
    pub fn build(self) -> Site {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as ClockRef);
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryQueueStore::new(Arc::clone(&clock))) as StoreRef);

        let parts = SiteParts {
            cfg: self.cfg.clone(),
            spaces: self.site.spaces.iter().map(|s| s.id.clone()).collect(),
            clock: Arc::clone(&clock),
            bus: bus.clone(),
        };
        let adapters = self.adapters.into_iter().map(|make| make(&parts)).collect();

        let arbiter = Arbiter::new(
            self.site.site.as_str(),
            self.site.shared_spaces(),
            store,
            clock,
            bus.clone(),
            &self.cfg,
        );
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let listener = subscriber_listener(&bus, subs);

        Site {
            cfg: self.cfg,
            bus,
            arbiter,
            adapters,
            listener,
        }
    }
}

/// Forwards bus events to the subscriber set until the bus closes.
fn subscriber_listener(bus: &Bus, set: Arc<SubscriberSet>) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => set.emit(&ev),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(target: "spacevisor", skipped, "subscriber listener lagged behind the bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// A running (or startable) site.
pub struct Site {
    cfg: Config,
    bus: Bus,
    arbiter: Arbiter,
    adapters: Vec<AdapterRef>,
    listener: JoinHandle<()>,
}

impl Site {
    pub fn name(&self) -> &str {
        self.arbiter.site()
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    pub fn adapters(&self) -> &[AdapterRef] {
        &self.adapters
    }

    /// Starts the arbiter, then every adapter listener.
    ///
    /// On failure everything started by this call is stopped again.
    pub fn start(&self) -> Result<(), RuntimeError> {
        debug!(target: "spacevisor", site = self.name(), adapters = self.adapters.len(), "starting site");
        self.arbiter.start(self.adapters.clone())?;

        for (i, adapter) in self.adapters.iter().enumerate() {
            if let Err(e) = adapter.start_shared_space_listener(self.cfg.request_poll) {
                for started in &self.adapters[..i] {
                    let _ = started.stop_shared_space_listener();
                }
                let _ = self.arbiter.stop();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Stops every listener, then the arbiter. Ticks in flight complete.
    ///
    /// Every component is stopped even if one fails; the first error is returned.
    pub fn stop(&self) -> Result<(), RuntimeError> {
        debug!(target: "spacevisor", site = self.name(), "stopping site");
        let mut first = None;
        for adapter in &self.adapters {
            if let Err(e) = adapter.stop_shared_space_listener() {
                first.get_or_insert(e);
            }
        }
        if let Err(e) = self.arbiter.stop() {
            first.get_or_insert(e);
        }
        first.map_or(Ok(()), Err)
    }

    /// Starts the site and runs it until a termination signal arrives.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        self.start()?;

        let reason = match wait_for_shutdown_signal().await {
            Ok(signal) => signal.as_str().to_string(),
            Err(e) => format!("signal handler failed: {e}"),
        };
        self.bus.publish(
            Event::new(EventKind::ShutdownRequested)
                .with_site(self.name())
                .with_reason(reason),
        );
        self.stop()
    }
}

impl Drop for Site {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
