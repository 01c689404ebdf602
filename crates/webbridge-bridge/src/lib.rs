//! # webbridge-bridge
//!
//! The router between host modules and an embedded content process.
//!
//! A [`Module`] pairs a [`ModuleId`](webbridge_core::ModuleId) with an
//! inbound events object and an outbound API object. Registering it on a
//! [`Bridge`] binds the API's [`ApiLink`]; from then on inbound envelopes
//! addressed to the id are narrowed and raised on the matching channel, and
//! API calls are encoded and handed to the attached [`ScriptSink`].

pub mod api;
pub mod bridge;
pub mod error;
pub mod module;
pub mod stats;
pub mod transport;

pub use api::{ApiArgs, ApiLink, ApiMethod, ModuleApi};
pub use bridge::{Bridge, BridgeConfig, DispatchOutcome, WeakBridge};
pub use error::BridgeError;
pub use module::{Module, ModuleHandle};
pub use stats::{DispatchStats, StatsSnapshot};
pub use transport::{extract_detail, BufferSink, DeliveryTemplate, ScriptSink};

pub use webbridge_events::{ChannelTable, Event, ModuleEvents, NoEvents};
