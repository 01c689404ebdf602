//! Outbound side: how a module's API methods reach the bridge.

use std::sync::{Arc, OnceLock};

use serde::Serialize;
use serde_json::Value;
use tracing::trace;
use webbridge_core::ModuleId;

use crate::bridge::{Bridge, WeakBridge};
use crate::error::BridgeError;

/// Name of an outbound method as the content process knows it.
pub trait ApiMethod {
    fn name(&self) -> &str;
}

impl ApiMethod for &str {
    fn name(&self) -> &str {
        self
    }
}

impl ApiMethod for String {
    fn name(&self) -> &str {
        self.as_str()
    }
}

/// Positional arguments of an outbound call, packed into a JSON array in
/// order. `()` packs to `[]`, never `null`.
pub trait ApiArgs {
    fn into_args(self) -> Result<Vec<Value>, serde_json::Error>;
}

impl ApiArgs for () {
    fn into_args(self) -> Result<Vec<Value>, serde_json::Error> {
        Ok(Vec::new())
    }
}

impl ApiArgs for Vec<Value> {
    fn into_args(self) -> Result<Vec<Value>, serde_json::Error> {
        Ok(self)
    }
}

macro_rules! tuple_args {
    ($($ty:ident $var:ident),+) => {
        impl<$($ty: Serialize),+> ApiArgs for ($($ty,)+) {
            fn into_args(self) -> Result<Vec<Value>, serde_json::Error> {
                let ($($var,)+) = self;
                Ok(vec![$(serde_json::to_value($var)?),+])
            }
        }
    };
}

tuple_args!(A a);
tuple_args!(A a, B b);
tuple_args!(A a, B b, C c);
tuple_args!(A a, B b, C c, D d);

/// A module's handle to the bridge, shared by the module and its API.
///
/// Created with the module, so the API holds it from construction on. The
/// bridge binds it on first registration and it is never rebound; until
/// then every call fails with [`BridgeError::NotConnected`].
#[derive(Clone, Debug)]
pub struct ApiLink {
    module: ModuleId,
    bridge: Arc<OnceLock<WeakBridge>>,
}

impl ApiLink {
    pub fn new(module: ModuleId) -> Self {
        Self {
            module,
            bridge: Arc::new(OnceLock::new()),
        }
    }

    pub fn module_id(&self) -> &ModuleId {
        &self.module
    }

    pub fn is_bound(&self) -> bool {
        self.bridge.get().is_some()
    }

    /// Bound, the bridge is alive, and this module (not a replacement with
    /// the same id) is the one registered on it.
    pub fn is_connected(&self) -> bool {
        self.connected_bridge().is_some()
    }

    pub(crate) fn bind(&self, bridge: &Bridge) -> Result<(), BridgeError> {
        let bound = self.bridge.get_or_init(|| bridge.downgrade());
        if bound.points_to(bridge) {
            Ok(())
        } else {
            Err(BridgeError::BoundElsewhere(self.module.clone()))
        }
    }

    fn connected_bridge(&self) -> Option<Bridge> {
        self.bridge
            .get()?
            .upgrade()
            .filter(|bridge| bridge.holds_link(self))
    }

    /// Both handles come from the same module, i.e. share one binding.
    pub(crate) fn same_link(&self, other: &ApiLink) -> bool {
        Arc::ptr_eq(&self.bridge, &other.bridge)
    }

    /// Pack `args` and send them as `method` through the bound bridge.
    pub fn call<M, A>(&self, method: M, args: A) -> Result<(), BridgeError>
    where
        M: ApiMethod,
        A: ApiArgs,
    {
        let Some(bridge) = self.connected_bridge() else {
            trace!(module = %self.module, method = method.name(), "api call before connect");
            return Err(BridgeError::NotConnected(self.module.clone()));
        };
        let args = args.into_args().inspect_err(|e| {
            tracing::warn!(
                module = %self.module,
                method = method.name(),
                error = %e,
                "api arguments not representable as JSON"
            );
            bridge.stats().record_send_failure();
        })?;
        bridge.send(&self.module, method.name(), Value::Array(args))
    }
}

/// Contract for a module kind's outbound API. The link is handed over once,
/// at construction.
pub trait ModuleApi: Send + Sync + 'static {
    fn new(link: ApiLink) -> Self;
}
