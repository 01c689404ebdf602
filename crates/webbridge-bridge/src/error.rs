use webbridge_core::{CoreError, ModuleId};
use webbridge_settings::SettingsError;

/// Recoverable failures on the outbound path and during registration.
///
/// Inbound routing never produces these: dropped messages are reported as a
/// [`DispatchOutcome`](crate::DispatchOutcome) instead.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("module `{0}` is not connected to a bridge")]
    NotConnected(ModuleId),
    #[error("module `{0}` is already bound to another bridge")]
    BoundElsewhere(ModuleId),
    #[error("the unset module id cannot be registered or routed")]
    UnsetModuleId,
    #[error("payload is not representable as JSON: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("envelope error: {0}")]
    Envelope(#[from] CoreError),
    #[error("no transport sink attached")]
    TransportDetached,
    #[error("configuration error: {0}")]
    Config(#[from] SettingsError),
}

impl BridgeError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotConnected(_) => "not_connected",
            Self::BoundElsewhere(_) => "bound_elsewhere",
            Self::UnsetModuleId => "unset_module_id",
            Self::Serialize(_) => "serialize",
            Self::Envelope(_) => "envelope",
            Self::TransportDetached => "transport_detached",
            Self::Config(_) => "config",
        }
    }
}
