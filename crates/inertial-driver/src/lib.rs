//! # inertial-driver
//!
//! Runtime side of the inertial navigation driver.
//!
//! - `probe`: capability query and known model table
//! - `coordinator`: device streaming commands
//! - `pool`: generic publisher pool with per-channel decimation
//! - `router`: channel set installation and telemetry dispatch
//! - `events`: event trigger/action lifecycle on the device
//! - `driver`: the session tying them together

pub mod coordinator;
pub mod driver;
pub mod error;
pub mod events;
pub mod pool;
pub mod probe;
pub mod router;
pub mod shaping;
pub mod statistics;

pub use coordinator::{ApplyError, DataRateCoordinator, StreamCommand, StreamingPlan, SubsystemPlan};
pub use driver::{ConfigureReport, DriverOptions, InertialDriver, ShutdownHandle};
pub use error::DriverError;
pub use events::{EventConfigurator, TrackedEvent};
pub use pool::{Channel, DispatchReport, PublisherPool, RouteSpec};
pub use probe::{CapabilityProbe, ProbeError};
pub use router::{Dispatcher, RouteInfo, Router};
pub use shaping::ChannelSpec;
pub use statistics::StatisticsSnapshot;
