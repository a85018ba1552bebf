//! Event manager configuration for remotely managed machines.
//!
//! The flow is strictly sequential: resolve [`credentials::Credentials`] from
//! the page cookie, [`client::connect`] to the app service, then read or write
//! event managers through an [`event_manager::MachineConfigurator`].

pub mod client;
pub mod config;
pub mod credentials;
pub mod event_manager;
pub mod http_client;
pub mod metrics_defs;
pub mod resources;
pub mod types;

#[cfg(test)]
mod testutils;

pub use client::{AppClient, ClientError, Connector, connect};
pub use credentials::{CredentialError, Credentials};
pub use event_manager::{
    EventManagerError, MachineConfigurator, find_event_managers, upsert_event_manager,
};
pub use http_client::HttpConnector;
pub use types::{ConfigDocument, EventManager, EventManagerDefinition, MachineConfig, MachinePart};
