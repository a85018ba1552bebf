//! Reading and writing event manager definitions in a machine's configuration.
//!
//! The remote API only accepts whole configuration documents, so every save
//! is a read-modify-write of the main part's config:
//! - Components: upsert by name (in place when found, appended otherwise)
//! - Modules: the event manager registry module is appended when absent and
//!   never modified when present
//! - Everything else: written back untouched

use crate::client::{AppClient, ClientError};
use crate::metrics_defs::{
    CONFIG_PARSE_DEGRADED, EVENT_MANAGER_SAVE_DURATION, EVENT_MANAGER_SAVE_FAILED,
    EVENT_MANAGER_SAVED,
};
use crate::types::{
    Component, ConfigDocument, EVENT_MANAGER_MODULE_ID, EventManager, EventManagerDefinition,
    MachineConfig, MachinePart, ModuleRef,
};
use serde_json::{Map, Value as JsonValue};
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{AcquireError, Semaphore, SemaphorePermit};

#[derive(thiserror::Error, Debug)]
pub enum EventManagerError {
    #[error("no client is available for this machine")]
    ClientUnavailable,

    #[error("machine has no main part")]
    NoMainPart,

    #[error("stored config of part {part_id} is not valid JSON ({error}), refusing to overwrite it")]
    UnparseableConfig { part_id: String, error: String },

    #[error("remote call failed: {0}")]
    Remote(#[from] ClientError),

    #[error("another save could not be serialized: {0}")]
    SaveLock(#[from] AcquireError),
}

/// Returns every event manager in `config`, in document order.
pub fn find_event_managers(config: &MachineConfig) -> Vec<EventManager> {
    config
        .components
        .iter()
        .filter(|c| c.is_event_manager())
        .map(|c| EventManager {
            name: c.name.clone(),
            config: c.attributes().cloned().unwrap_or_default(),
        })
        .collect()
}

/// Returns a copy of `config` with `definition` upserted.
///
/// The component is looked up by [`EventManagerDefinition::search_key`] so a
/// renamed event manager replaces its previous entry. `config` itself is
/// never modified.
pub fn upsert_event_manager(
    config: &MachineConfig,
    definition: &EventManagerDefinition,
) -> MachineConfig {
    let mut updated = config.clone();

    let component =
        Component::event_manager(definition.name.clone(), definition.attributes.clone());

    match updated
        .components
        .iter()
        .position(|c| c.name == definition.search_key())
    {
        Some(index) => updated.components[index] = component,
        None => updated.components.push(component),
    }

    if !updated.has_module(EVENT_MANAGER_MODULE_ID) {
        updated.modules.push(ModuleRef::event_manager());
    }

    updated
}

/// Event manager operations against one machine.
///
/// The client is optional so that a failed client creation can still be
/// represented: reads then report "not ready" and writes fail with
/// [`EventManagerError::ClientUnavailable`].
pub struct MachineConfigurator {
    client: Option<Arc<dyn AppClient>>,
    machine_id: String,
    // Held for a whole read-modify-write so overlapping saves cannot
    // overwrite each other.
    save_lock: Semaphore,
}

impl MachineConfigurator {
    pub fn new(client: Option<Arc<dyn AppClient>>, machine_id: impl Into<String>) -> Self {
        MachineConfigurator {
            client,
            machine_id: machine_id.into(),
            save_lock: Semaphore::new(1),
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    fn ready_client(&self) -> Option<&Arc<dyn AppClient>> {
        self.client.as_ref().filter(|_| !self.machine_id.is_empty())
    }

    /// Fetches the main part and its parsed configuration.
    ///
    /// Returns `Ok(None)` when no client or machine id is set, or when the
    /// machine has no main part. A stored config that fails to parse is
    /// reported as [`ConfigDocument::DefaultedEmpty`] rather than an error.
    pub async fn get_machine_config(&self) -> Result<Option<MachinePart>, EventManagerError> {
        let Some(client) = self.ready_client() else {
            tracing::debug!("Client or machine id not set, skipping config fetch");
            return Ok(None);
        };

        let parts = client.list_parts(&self.machine_id).await?;
        let Some(main_part) = parts.into_iter().find(|p| p.main_part) else {
            tracing::warn!(machine_id = %self.machine_id, "Machine has no main part");
            return Ok(None);
        };

        let part = client.get_part(&main_part.id).await?;
        let config = ConfigDocument::parse(part.config_json.as_deref());

        if let ConfigDocument::DefaultedEmpty { error } = &config {
            counter!(CONFIG_PARSE_DEGRADED).increment(1);
            tracing::error!(
                part_id = %part.id,
                error = %error,
                "Stored part config is not valid JSON, treating it as empty"
            );
        }

        Ok(Some(MachinePart { part, config }))
    }

    /// Event managers currently configured on the main part.
    pub async fn list_event_managers(&self) -> Result<Vec<EventManager>, EventManagerError> {
        Ok(self
            .get_machine_config()
            .await?
            .map(|machine_part| find_event_managers(&machine_part.config.config()))
            .unwrap_or_default())
    }

    /// Creates, updates or renames an event manager and writes the whole
    /// configuration back to the main part.
    ///
    /// `original_name` selects the entry to replace when editing; without it
    /// the entry named `name` is replaced if present.
    pub async fn save_event_manager(
        &self,
        name: &str,
        attributes: Map<String, JsonValue>,
        original_name: Option<&str>,
    ) -> Result<bool, EventManagerError> {
        let mut definition = EventManagerDefinition::new(name, attributes);
        if let Some(original) = original_name {
            definition = definition.renamed_from(original);
        }

        let start = Instant::now();
        let result = self.save_definition(&definition).await;
        histogram!(EVENT_MANAGER_SAVE_DURATION).record(start.elapsed().as_secs_f64());

        match &result {
            Ok(_) => counter!(EVENT_MANAGER_SAVED).increment(1),
            Err(e) => {
                counter!(EVENT_MANAGER_SAVE_FAILED).increment(1);
                tracing::error!(name = %definition.name, error = %e, "Failed to save event manager");
            }
        }

        result
    }

    async fn save_definition(
        &self,
        definition: &EventManagerDefinition,
    ) -> Result<bool, EventManagerError> {
        let client = self
            .ready_client()
            .ok_or(EventManagerError::ClientUnavailable)?;

        let _permit = self.get_permit().await?;

        // Always start from a fresh read, the part fetched here is reused for the update.
        let MachinePart { part, config } = self
            .get_machine_config()
            .await?
            .ok_or(EventManagerError::NoMainPart)?;

        let current = match config {
            ConfigDocument::Parsed(config) => config,
            ConfigDocument::Missing => MachineConfig::default(),
            ConfigDocument::DefaultedEmpty { error } => {
                return Err(EventManagerError::UnparseableConfig {
                    part_id: part.id,
                    error,
                });
            }
        };

        let updated = upsert_event_manager(&current, definition);

        tracing::info!(
            part_id = %part.id,
            name = %definition.name,
            original_name = ?definition.original_name,
            components = updated.components.len(),
            "Updating part config"
        );
        client.update_part(&part.id, &part.name, &updated).await?;

        // Confirmation read, only logged.
        match self.get_machine_config().await {
            Ok(Some(confirmed)) => {
                let found = confirmed.config.config().component(&definition.name).is_some();
                tracing::debug!(part_id = %confirmed.part.id, found, "Re-fetched part config after update");
            }
            Ok(None) => tracing::warn!("Main part disappeared after update"),
            Err(e) => tracing::warn!(error = %e, "Could not re-fetch part config after update"),
        }

        Ok(true)
    }

    /// Guard that ensures only one save is in progress at a time.
    async fn get_permit(&self) -> Result<SemaphorePermit<'_>, AcquireError> {
        self.save_lock.acquire().await
    }
}
