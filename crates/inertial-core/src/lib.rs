//! # inertial-core
//!
//! Configuration model of the inertial navigation driver.
//!
//! This crate provides:
//! - Device data model (subsystems, field ids, capability snapshot)
//! - Rate resolution under integer decimation
//! - User settings and their defaults
//! - Field to channel mapping
//! - Configuration resolution against device capabilities
//! - Event trigger/action validation
//!
//! This crate is intentionally runtime-agnostic and contains no async code
//! or device I/O.

pub mod events;
pub mod model;
pub mod rate;
pub mod resolver;
pub mod settings;
pub mod topics;

pub use events::{Action, EventDefinition, EventError, EventState, Trigger};
pub use model::*;
pub use rate::{RateError, RateRequest, RateResolver, ResolvedRate};
pub use resolver::{
    ConfigError, ConfigurationResolver, FieldStream, OutputOptions, ResolvedChannel,
    ResolvedConfig, StaticCovariance, SubsystemConfig,
};
pub use settings::{DriverSettings, SettingFlag, SettingsError};
pub use topics::{ChannelDescriptor, Predicate, TopicError, TopicMapping, TopicRule};
