use std::fmt;
use std::sync::Arc;

use webbridge_core::{ModuleId, Payload};
use webbridge_events::{ChannelDelivery, ChannelTable, ModuleEvents};

use crate::api::{ApiLink, ModuleApi};

/// What the bridge's registry stores: a module with its concrete event and
/// API types erased.
pub trait ModuleHandle: Send + Sync + 'static {
    /// The link shared with the module's API. The bridge binds it on registration.
    fn link(&self) -> &ApiLink;

    /// Offer a narrowed payload to the inbound channel `name`.
    fn raise_channel(&self, name: &str, payload: Payload) -> ChannelDelivery;

    fn id(&self) -> &ModuleId {
        self.link().module_id()
    }
}

/// Binds one [`ModuleId`] to a fresh events object and a fresh API object.
///
/// The channel table is built once, here, from `E::channels`.
pub struct Module<E: ModuleEvents, A: ModuleApi> {
    link: ApiLink,
    events: E,
    api: A,
    channels: ChannelTable,
}

impl<E: ModuleEvents, A: ModuleApi> Module<E, A> {
    pub fn new(id: impl Into<ModuleId>) -> Arc<Self> {
        let link = ApiLink::new(id.into());
        let events = E::default();
        let channels = events.channels();
        let api = A::new(link.clone());
        Arc::new(Self {
            link,
            events,
            api,
            channels,
        })
    }

    pub fn id(&self) -> &ModuleId {
        self.link.module_id()
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }
}

impl<E: ModuleEvents, A: ModuleApi> ModuleHandle for Module<E, A> {
    fn link(&self) -> &ApiLink {
        &self.link
    }

    fn raise_channel(&self, name: &str, payload: Payload) -> ChannelDelivery {
        self.channels.raise(name, payload)
    }
}

impl<E: ModuleEvents, A: ModuleApi> fmt::Debug for Module<E, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", self.id())
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}
