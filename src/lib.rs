//! Webhooker Library
//!
//! This library provides the core of the webhooker relay: the name to
//! target registry, the fan-out dispatcher, and the HTTP front end that
//! accepts inbound webhooks and forwards them to every registered target.

pub mod config;
pub mod dispatch;
pub mod logging;
pub mod metrics;
pub mod metrics_server;
pub mod registry;
pub mod server;
pub mod tls;

#[cfg(test)]
mod proptests;
#[cfg(test)]
mod test_support;

pub use dispatch::{DispatchOutcome, Dispatcher};
pub use registry::{Registry, RegistryError, TargetEndpoint, WebhookName, WebhookRegistration};
