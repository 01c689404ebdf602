//! Wire envelopes exchanged with the content process.
//!
//! Both directions share one shape; only the channel key differs:
//! ```json
//! { "module": "todo", "event": "todoCreated", "data": {...} }   // inbound
//! { "module": "todo", "method": "createTodo", "data": [...] }   // outbound
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::CoreError;
use crate::ids::ModuleId;

/// A message raised by the content process into the host.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundEnvelope {
    pub module: ModuleId,
    pub event: String,
    /// `None` when the key is absent. A literal `null` is `Some(Value::Null)`.
    pub data: Option<Value>,
}

impl InboundEnvelope {
    /// Validate routing metadata on an already-decoded JSON value.
    pub fn from_value(raw: &Value) -> Result<Self, CoreError> {
        let obj = raw.as_object().ok_or(CoreError::NotAnObject)?;
        let module = obj
            .get("module")
            .and_then(Value::as_str)
            .ok_or(CoreError::MissingField("module"))?;
        let event = obj
            .get("event")
            .and_then(Value::as_str)
            .ok_or(CoreError::MissingField("event"))?;
        Ok(Self {
            module: ModuleId::new(module),
            event: event.to_owned(),
            data: obj.get("data").cloned(),
        })
    }

    /// Parse a raw JSON string and validate it.
    pub fn from_json(raw: &str) -> Result<Self, CoreError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(&value)
    }
}

/// A call issued by the host into the content process.
///
/// `data` carries the method's positional arguments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    pub module: ModuleId,
    pub method: String,
    pub data: Value,
}

impl OutboundEnvelope {
    pub fn new(module: ModuleId, method: impl Into<String>, data: Value) -> Self {
        Self {
            module,
            method: method.into(),
            data,
        }
    }

    pub fn encode(&self, pretty: bool) -> Result<String, CoreError> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }

    pub fn decode(raw: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(raw)?)
    }
}
