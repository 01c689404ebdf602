//! Wire-level types shared by the router and its modules: module ids,
//! envelopes, and the ordered narrowing of untyped payloads.

pub mod envelope;
pub mod errors;
pub mod ids;
pub mod payload;

pub use envelope::{InboundEnvelope, OutboundEnvelope};
pub use errors::CoreError;
pub use ids::ModuleId;
pub use payload::{NarrowingOrder, Payload, Shape};
