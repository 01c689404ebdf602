//! Line-oriented host: each stdin line is either an inbound envelope or a
//! host-side `call` request.

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::ValueEnum;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use webbridge_bridge::{Bridge, DispatchOutcome, ScriptSink};
use webbridge_modules::{
    content_renderer_module, todo_module, ContentRendererMethod, ContentRendererModule, TodoList,
    TodoMethod, TodoModule,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModuleKind {
    Todo,
    #[value(name = "contentRenderer")]
    ContentRenderer,
}

/// Forwards rendered scripts to the stdout writer task.
pub struct LineSink {
    tx: mpsc::UnboundedSender<String>,
}

impl LineSink {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl ScriptSink for LineSink {
    fn evaluate(&self, script: &str) {
        if self.tx.send(script.to_owned()).is_err() {
            warn!("stdout writer closed, script dropped");
        }
    }
}

/// `{"call": "<method>", ...}` issued from the host side.
#[derive(Debug, Deserialize)]
struct CallRequest {
    call: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    completed: Option<bool>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LineOutcome {
    Blank,
    Dispatched(DispatchOutcome),
    Called,
    CallFailed,
}

pub struct Host {
    bridge: Bridge,
    todo: Option<(Arc<TodoModule>, Arc<TodoList>)>,
    renderer: Option<Arc<ContentRendererModule>>,
}

impl Host {
    /// Register the chosen modules on `bridge`.
    pub fn new(bridge: Bridge, kinds: &[ModuleKind]) -> anyhow::Result<Self> {
        let mut host = Self {
            bridge,
            todo: None,
            renderer: None,
        };
        for kind in kinds {
            match kind {
                ModuleKind::Todo if host.todo.is_none() => {
                    let module = todo_module();
                    host.bridge
                        .register(module.clone())
                        .context("registering todo module")?;
                    let list = TodoList::attach(&module);
                    log_todo_events(&module);
                    host.todo = Some((module, list));
                }
                ModuleKind::ContentRenderer if host.renderer.is_none() => {
                    let module = content_renderer_module();
                    host.bridge
                        .register(module.clone())
                        .context("registering content renderer module")?;
                    host.renderer = Some(module);
                }
                _ => debug!(?kind, "module already registered"),
            }
        }
        info!(modules = ?host.bridge.module_ids(), "host ready");
        Ok(host)
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn todo_list(&self) -> Option<&Arc<TodoList>> {
        self.todo.as_ref().map(|(_, list)| list)
    }

    pub fn handle_line(&self, line: &str) -> LineOutcome {
        let line = line.trim();
        if line.is_empty() {
            return LineOutcome::Blank;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => return LineOutcome::Dispatched(self.bridge.dispatch_str(line)),
        };
        if value.get("call").is_none() {
            let outcome = self.bridge.dispatch(&value);
            debug!(?outcome, "inbound line handled");
            return LineOutcome::Dispatched(outcome);
        }

        match self.call(value) {
            Ok(()) => LineOutcome::Called,
            Err(e) => {
                warn!(error = %e, "host call failed");
                LineOutcome::CallFailed
            }
        }
    }

    fn call(&self, value: Value) -> anyhow::Result<()> {
        let request: CallRequest = serde_json::from_value(value).context("invalid call request")?;

        if let Some(method) = TodoMethod::parse(&request.call) {
            let (_, list) = self.todo.as_ref().context("todo module not registered")?;
            match method {
                TodoMethod::CreateTodo => {
                    let description = request.description.unwrap_or_default();
                    let todo = list.create(description)?;
                    debug!(id = todo.id, "createTodo sent");
                }
                TodoMethod::DeleteTodo => {
                    let id = request.id.context("deleteTodo needs an id")?;
                    if !list.delete(id)? {
                        bail!("no todo with id {id}");
                    }
                }
                TodoMethod::CompleteTodo => {
                    let id = request.id.context("completeTodo needs an id")?;
                    if !list.set_completed(id, request.completed.unwrap_or(true))? {
                        bail!("no todo with id {id}");
                    }
                }
                TodoMethod::ClearTodoList => list.clear()?,
            }
            return Ok(());
        }

        if let Some(method) = ContentRendererMethod::parse(&request.call) {
            let renderer = self
                .renderer
                .as_ref()
                .context("content renderer module not registered")?;
            renderer.api().invoke(method)?;
            return Ok(());
        }

        bail!("unknown method `{}`", request.call)
    }
}

fn log_todo_events(module: &TodoModule) {
    let events = module.events();
    events
        .todo_created
        .subscribe_fn(|todo| info!(todo = %serde_json::Value::Object(todo.clone()), "todoCreated"));
    events
        .todo_deleted
        .subscribe_fn(|todo| info!(todo = %serde_json::Value::Object(todo.clone()), "todoDeleted"));
    events
        .todo_completed
        .subscribe_fn(|todo| info!(todo = %serde_json::Value::Object(todo.clone()), "todoCompleted"));
    events
        .todo_list_cleared
        .subscribe_fn(|_| info!("todoListCleared"));
}
