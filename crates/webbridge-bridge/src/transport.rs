//! The seam to whatever physically reaches the content process.
//!
//! Outbound, the bridge renders an envelope into a script and hands it to a
//! [`ScriptSink`]. Inbound, the host's message listener passes decoded JSON
//! to [`Bridge::dispatch`](crate::Bridge::dispatch).

use parking_lot::Mutex;

/// Delivers a script into the content process (e.g. evaluates it in a web
/// view). Fire-and-forget: the bridge never waits for a result.
pub trait ScriptSink: Send + Sync {
    fn evaluate(&self, script: &str);
}

/// Wraps a serialized envelope in a script that dispatches a `CustomEvent`
/// on `window` carrying the envelope as its `detail`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryTemplate {
    event_name: String,
}

impl DeliveryTemplate {
    pub fn new(event_name: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
        }
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// Render the script for an already-serialized envelope.
    pub fn render(&self, envelope_json: &str) -> String {
        // A JSON string literal is also a valid JS string literal.
        let name = serde_json::Value::from(self.event_name.as_str()).to_string();
        format!(
            "var event = new CustomEvent({name}, {{ detail: {envelope_json} }});\
             window.dispatchEvent(event);"
        )
    }
}

impl Default for DeliveryTemplate {
    fn default() -> Self {
        Self::new("bridge")
    }
}

/// Sink that keeps every script it is given. Handy for hosts that batch
/// delivery themselves, and for tests.
#[derive(Debug, Default)]
pub struct BufferSink {
    scripts: Mutex<Vec<String>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything delivered so far.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.scripts.lock())
    }

    pub fn len(&self) -> usize {
        self.scripts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.lock().is_empty()
    }
}

impl ScriptSink for BufferSink {
    fn evaluate(&self, script: &str) {
        self.scripts.lock().push(script.to_owned());
    }
}

/// Pull the JSON `detail` back out of a rendered script.
///
/// Inverse of [`DeliveryTemplate::render`]; returns `None` for scripts the
/// template did not produce.
pub fn extract_detail(script: &str) -> Option<&str> {
    let start = script.find("{ detail: ")? + "{ detail: ".len();
    let end = script.rfind(" });")?;
    (start <= end).then(|| &script[start..end])
}
