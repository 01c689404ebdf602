//! Settings types. Every field has a default, so a partial file is valid.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use webbridge_core::NarrowingOrder;

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    pub transport: TransportSettings,
    pub narrowing: NarrowingSettings,
    pub logging: LoggingSettings,
}

impl BridgeSettings {
    /// Check values serde cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        self.narrowing.order()?;
        if self.transport.custom_event_name.is_empty() {
            return Err(SettingsError::InvalidValue(
                "transport.customEventName must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// How envelopes cross into and out of the content process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    /// Name of the `CustomEvent` dispatched on `window` for outbound calls.
    pub custom_event_name: String,
    /// Name the host's inbound message listener is registered under.
    pub message_handler_name: String,
    /// Pretty-print outbound envelopes.
    pub pretty_json: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            custom_event_name: "bridge".to_string(),
            message_handler_name: "bridge".to_string(),
            pretty_json: false,
        }
    }
}

/// Tie-break order for narrowing inbound payloads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NarrowingSettings {
    /// Shape names tried in order. The raw-value fallback is always last.
    pub order: Vec<String>,
}

impl NarrowingSettings {
    pub fn order(&self) -> Result<NarrowingOrder> {
        NarrowingOrder::from_names(self.order.as_slice())
            .map_err(|e| SettingsError::InvalidValue(e.to_string()))
    }
}

impl Default for NarrowingSettings {
    fn default() -> Self {
        Self {
            order: NarrowingOrder::DEFAULT_SHAPES
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-target level overrides, e.g. `"webbridge_bridge": "debug"`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}
