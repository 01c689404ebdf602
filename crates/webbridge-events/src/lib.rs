//! Inbound side of the bridge: the typed [`Event`] primitive and the
//! per-module [`ChannelTable`] that resolves channel names to events.

pub mod channel;
pub mod event;

pub use channel::{ChannelDelivery, ChannelPayload, ChannelTable, ModuleEvents, NoEvents};
pub use event::{Event, RaiseReport, Subscription};
