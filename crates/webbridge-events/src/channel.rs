use std::any::Any;
use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::debug;
use webbridge_core::{Payload, Shape};

use crate::event::{Event, RaiseReport};

/// A payload type a channel can declare. Matching is exact: a channel only
/// accepts payloads whose narrowed shape equals its declared [`Shape`].
pub trait ChannelPayload: Sized + 'static {
    const SHAPE: Shape;

    /// Take the payload if it has this type's shape, else hand it back.
    fn from_payload(payload: Payload) -> Result<Self, Payload>;
}

impl ChannelPayload for i64 {
    const SHAPE: Shape = Shape::Integer;
    fn from_payload(payload: Payload) -> Result<Self, Payload> {
        match payload {
            Payload::Integer(n) => Ok(n),
            other => Err(other),
        }
    }
}

impl ChannelPayload for String {
    const SHAPE: Shape = Shape::String;
    fn from_payload(payload: Payload) -> Result<Self, Payload> {
        match payload {
            Payload::String(s) => Ok(s),
            other => Err(other),
        }
    }
}

impl ChannelPayload for Map<String, Value> {
    const SHAPE: Shape = Shape::Object;
    fn from_payload(payload: Payload) -> Result<Self, Payload> {
        match payload {
            Payload::Object(map) => Ok(map),
            other => Err(other),
        }
    }
}

impl ChannelPayload for Vec<i64> {
    const SHAPE: Shape = Shape::IntegerArray;
    fn from_payload(payload: Payload) -> Result<Self, Payload> {
        match payload {
            Payload::IntegerArray(items) => Ok(items),
            other => Err(other),
        }
    }
}

impl ChannelPayload for Vec<Value> {
    const SHAPE: Shape = Shape::Array;
    fn from_payload(payload: Payload) -> Result<Self, Payload> {
        match payload {
            Payload::Array(items) => Ok(items),
            other => Err(other),
        }
    }
}

impl ChannelPayload for Vec<String> {
    const SHAPE: Shape = Shape::StringArray;
    fn from_payload(payload: Payload) -> Result<Self, Payload> {
        match payload {
            Payload::StringArray(items) => Ok(items),
            other => Err(other),
        }
    }
}

/// The generic-value channel: accepts whatever fell through every ordered
/// trial, including an absent `data` (delivered as `null`).
impl ChannelPayload for Value {
    const SHAPE: Shape = Shape::Any;
    fn from_payload(payload: Payload) -> Result<Self, Payload> {
        match payload {
            Payload::Value(v) => Ok(v),
            Payload::Null => Ok(Value::Null),
            other => Err(other),
        }
    }
}

/// Result of offering a payload to a named channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelDelivery {
    Delivered(RaiseReport),
    UnknownChannel,
    ShapeMismatch { expected: Shape, actual: Shape },
}

/// An [`Event`] with its payload type erased, so channels of different
/// types can live in one table.
trait ErasedChannel: Send + Sync {
    fn shape(&self) -> Shape;
    fn raise_payload(&self, payload: Payload) -> ChannelDelivery;
    fn subscriber_count(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
}

impl<T: ChannelPayload> ErasedChannel for Event<T> {
    fn shape(&self) -> Shape {
        T::SHAPE
    }

    fn raise_payload(&self, payload: Payload) -> ChannelDelivery {
        match T::from_payload(payload) {
            Ok(value) => ChannelDelivery::Delivered(self.raise(&value)),
            Err(rejected) => ChannelDelivery::ShapeMismatch {
                expected: T::SHAPE,
                actual: rejected.shape(),
            },
        }
    }

    fn subscriber_count(&self) -> usize {
        Event::subscriber_count(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Explicit name → channel table for one module's inbound events.
///
/// Built once when the module is constructed; dispatch resolves channel
/// names with a plain lookup.
#[derive(Default)]
pub struct ChannelTable {
    channels: HashMap<String, Box<dyn ErasedChannel>>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with<T: ChannelPayload>(mut self, name: impl Into<String>, event: &Event<T>) -> Self {
        self.insert(name, event);
        self
    }

    /// Register `event` under `name`. A repeated name replaces the earlier entry.
    pub fn insert<T: ChannelPayload>(&mut self, name: impl Into<String>, event: &Event<T>) {
        let name = name.into();
        if self
            .channels
            .insert(name.clone(), Box::new(event.clone()))
            .is_some()
        {
            debug!(channel = %name, "channel name declared twice, keeping the last");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn shape_of(&self, name: &str) -> Option<Shape> {
        self.channels.get(name).map(|c| c.shape())
    }

    /// Typed lookup. `None` if the name is unknown or declared with another type.
    pub fn resolve<T: ChannelPayload>(&self, name: &str) -> Option<Event<T>> {
        self.channels
            .get(name)?
            .as_any()
            .downcast_ref::<Event<T>>()
            .cloned()
    }

    /// Offer a narrowed payload to the channel called `name`.
    pub fn raise(&self, name: &str, payload: Payload) -> ChannelDelivery {
        match self.channels.get(name) {
            Some(channel) => channel.raise_payload(payload),
            None => ChannelDelivery::UnknownChannel,
        }
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.channels.get(name).map_or(0, |c| c.subscriber_count())
    }

    /// Channel names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.channels.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl std::fmt::Debug for ChannelTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelTable")
            .field("channels", &self.names())
            .finish()
    }
}

/// Contract for a module kind's inbound events.
///
/// Implementors hold their [`Event`] fields directly and declare them, with
/// their channel names, in [`channels`](Self::channels).
pub trait ModuleEvents: Default + Send + Sync + 'static {
    fn channels(&self) -> ChannelTable;
}

/// Events for a module that raises nothing into the host.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoEvents;

impl ModuleEvents for NoEvents {
    fn channels(&self) -> ChannelTable {
        ChannelTable::new()
    }
}
