use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// API of the sensor component backing an event manager.
pub const EVENT_MANAGER_API: &str = "rdk:component:sensor";
/// Model sentinel identifying event manager components.
pub const EVENT_MANAGER_MODEL: &str = "viam:event-manager:eventing";
/// Registry id of the module providing the event manager model.
pub const EVENT_MANAGER_MODULE_ID: &str = "viam:event-manager";
pub const EVENT_MANAGER_MODULE_NAME: &str = "viam_event-manager";
pub const REGISTRY_MODULE_TYPE: &str = "registry";
pub const LATEST_VERSION: &str = "latest";

/// A machine configuration document.
///
/// Only the sections touched by the event manager are typed. Every other
/// top-level key is kept in `extra_fields` and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineConfig {
    #[serde(default)]
    pub components: Vec<Component>,

    #[serde(default)]
    pub modules: Vec<ModuleRef>,

    /// Services are opaque here and are passed through as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<JsonValue>>,

    #[serde(flatten)]
    pub extra_fields: Map<String, JsonValue>,
}

impl MachineConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn has_module(&self, module_id: &str) -> bool {
        self.modules.iter().any(|m| m.module_id() == Some(module_id))
    }
}

/// A component entry.
///
/// Only `name` is typed since the merge keys on it. Every other key,
/// including `api`, `model` and `attributes`, stays in `extra_fields` exactly
/// as stored, so entries of any shape round-trip unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,

    #[serde(flatten)]
    pub extra_fields: Map<String, JsonValue>,
}

impl Component {
    /// Builds the component record for an event manager definition.
    pub fn event_manager(name: impl Into<String>, attributes: Map<String, JsonValue>) -> Self {
        let mut extra_fields = Map::new();
        extra_fields.insert("api".into(), EVENT_MANAGER_API.into());
        extra_fields.insert("model".into(), EVENT_MANAGER_MODEL.into());
        extra_fields.insert("attributes".into(), JsonValue::Object(attributes));

        Component {
            name: name.into(),
            extra_fields,
        }
    }

    pub fn api(&self) -> Option<&str> {
        self.extra_fields.get("api")?.as_str()
    }

    pub fn model(&self) -> Option<&str> {
        self.extra_fields.get("model")?.as_str()
    }

    pub fn attributes(&self) -> Option<&Map<String, JsonValue>> {
        self.extra_fields.get("attributes")?.as_object()
    }

    pub fn is_event_manager(&self) -> bool {
        self.model() == Some(EVENT_MANAGER_MODEL)
    }
}

/// A module entry, kept as the stored object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleRef {
    pub fields: Map<String, JsonValue>,
}

impl ModuleRef {
    /// The registry entry added when a machine has no event manager module yet.
    pub fn event_manager() -> Self {
        let mut fields = Map::new();
        fields.insert("type".into(), REGISTRY_MODULE_TYPE.into());
        fields.insert("name".into(), EVENT_MANAGER_MODULE_NAME.into());
        fields.insert("module_id".into(), EVENT_MANAGER_MODULE_ID.into());
        fields.insert("version".into(), LATEST_VERSION.into());

        ModuleRef { fields }
    }

    pub fn module_id(&self) -> Option<&str> {
        self.fields.get("module_id")?.as_str()
    }

    pub fn version(&self) -> Option<&str> {
        self.fields.get("version")?.as_str()
    }
}

/// Desired state of an event manager as supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct EventManagerDefinition {
    pub name: String,
    pub attributes: Map<String, JsonValue>,
    /// Set when editing an existing event manager that may be renamed.
    pub original_name: Option<String>,
}

impl EventManagerDefinition {
    pub fn new(name: impl Into<String>, attributes: Map<String, JsonValue>) -> Self {
        EventManagerDefinition {
            name: name.into(),
            attributes,
            original_name: None,
        }
    }

    pub fn renamed_from(mut self, original_name: impl Into<String>) -> Self {
        self.original_name = Some(original_name.into());
        self
    }

    /// Name of the component to replace, if one exists.
    pub fn search_key(&self) -> &str {
        self.original_name.as_deref().unwrap_or(&self.name)
    }
}

/// An event manager found in a configuration document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventManager {
    pub name: String,
    pub config: Map<String, JsonValue>,
}

/// A machine part as returned by the remote service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub main_part: bool,

    /// Stored configuration as JSON text, absent for a part never configured.
    #[serde(default)]
    pub config_json: Option<String>,
}

/// Outcome of parsing a part's stored configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigDocument {
    Parsed(MachineConfig),
    /// Nothing has been stored for the part yet.
    Missing,
    /// The stored text was not a valid configuration document.
    DefaultedEmpty { error: String },
}

impl ConfigDocument {
    pub fn parse(config_json: Option<&str>) -> Self {
        match config_json {
            // Whitespace-only text is not valid JSON and degrades like any
            // other unparseable config.
            None | Some("") => ConfigDocument::Missing,
            Some(text) => match MachineConfig::from_json(text) {
                Ok(config) => ConfigDocument::Parsed(config),
                Err(e) => ConfigDocument::DefaultedEmpty {
                    error: e.to_string(),
                },
            },
        }
    }

    /// The parsed document, or an empty one when nothing usable was stored.
    pub fn config(&self) -> MachineConfig {
        match self {
            ConfigDocument::Parsed(config) => config.clone(),
            ConfigDocument::Missing | ConfigDocument::DefaultedEmpty { .. } => {
                MachineConfig::default()
            }
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ConfigDocument::DefaultedEmpty { .. })
    }
}

/// The main part of a machine along with its parsed configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MachinePart {
    pub part: Part,
    pub config: ConfigDocument,
}
