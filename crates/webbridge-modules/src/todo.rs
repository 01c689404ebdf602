//! The todo module: a list kept in the content process, mirrored natively.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use webbridge_bridge::{
    ApiLink, ApiMethod, BridgeError, ChannelTable, Event, Module, ModuleApi, ModuleEvents,
};

pub const TODO_MODULE: &str = "todo";

pub type TodoModule = Module<TodoEvents, TodoApi>;

/// A fresh, unregistered todo module.
pub fn todo_module() -> Arc<TodoModule> {
    TodoModule::new(TODO_MODULE)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: i64,
    pub description: String,
    pub completed: bool,
}

impl Todo {
    pub fn new(id: i64, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            completed: false,
        }
    }

    pub fn from_json(json: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(json.clone()))
    }

    pub fn to_json(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".into(), self.id.into());
        map.insert("description".into(), self.description.clone().into());
        map.insert("completed".into(), self.completed.into());
        map
    }
}

/// Inbound channel names raised by the content process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TodoEvent {
    TodoCreated,
    TodoDeleted,
    TodoCompleted,
    TodoListCleared,
}

impl TodoEvent {
    pub const ALL: [TodoEvent; 4] = [
        Self::TodoCreated,
        Self::TodoDeleted,
        Self::TodoCompleted,
        Self::TodoListCleared,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TodoCreated => "todoCreated",
            Self::TodoDeleted => "todoDeleted",
            Self::TodoCompleted => "todoCompleted",
            Self::TodoListCleared => "todoListCleared",
        }
    }
}

impl fmt::Display for TodoEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Default)]
pub struct TodoEvents {
    pub todo_created: Event<Map<String, Value>>,
    pub todo_deleted: Event<Map<String, Value>>,
    pub todo_completed: Event<Map<String, Value>>,
    /// Payload carries nothing useful; any value is accepted.
    pub todo_list_cleared: Event<Value>,
}

impl ModuleEvents for TodoEvents {
    fn channels(&self) -> ChannelTable {
        ChannelTable::new()
            .with(TodoEvent::TodoCreated.as_str(), &self.todo_created)
            .with(TodoEvent::TodoDeleted.as_str(), &self.todo_deleted)
            .with(TodoEvent::TodoCompleted.as_str(), &self.todo_completed)
            .with(TodoEvent::TodoListCleared.as_str(), &self.todo_list_cleared)
    }
}

/// Outbound methods understood by the content process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TodoMethod {
    CreateTodo,
    DeleteTodo,
    CompleteTodo,
    ClearTodoList,
}

impl TodoMethod {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "createTodo" => Some(Self::CreateTodo),
            "deleteTodo" => Some(Self::DeleteTodo),
            "completeTodo" => Some(Self::CompleteTodo),
            "clearTodoList" => Some(Self::ClearTodoList),
            _ => None,
        }
    }
}

impl ApiMethod for TodoMethod {
    fn name(&self) -> &str {
        match self {
            Self::CreateTodo => "createTodo",
            Self::DeleteTodo => "deleteTodo",
            Self::CompleteTodo => "completeTodo",
            Self::ClearTodoList => "clearTodoList",
        }
    }
}

#[derive(Clone, Debug)]
pub struct TodoApi {
    link: ApiLink,
}

impl ModuleApi for TodoApi {
    fn new(link: ApiLink) -> Self {
        Self { link }
    }
}

impl TodoApi {
    pub fn create_todo(&self, todo: &Todo) -> Result<(), BridgeError> {
        self.link.call(TodoMethod::CreateTodo, (todo,))
    }

    pub fn delete_todo(&self, todo: &Todo) -> Result<(), BridgeError> {
        self.link.call(TodoMethod::DeleteTodo, (todo,))
    }

    pub fn complete_todo(&self, todo: &Todo) -> Result<(), BridgeError> {
        self.link.call(TodoMethod::CompleteTodo, (todo,))
    }

    pub fn clear_todo_list(&self) -> Result<(), BridgeError> {
        self.link.call(TodoMethod::ClearTodoList, ())
    }
}

// ── Native mirror ───────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum TodoError {
    /// The content process already used `i64::MAX`; no larger id exists.
    #[error("no todo id left above the highest one seen")]
    IdsExhausted,
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

#[derive(Debug, Default)]
struct TodoListState {
    todos: Vec<Todo>,
    max_id: i64,
}

impl TodoListState {
    fn observe_id(&mut self, id: i64) {
        self.max_id = self.max_id.max(id);
    }
}

/// Native copy of the content process's todo list.
///
/// Changes requested here go out through the API; the list itself only
/// changes when the content process confirms them with an event. Deleting
/// is the exception and applies locally right away.
pub struct TodoList {
    api: TodoApi,
    state: Mutex<TodoListState>,
}

impl TodoList {
    /// Build a mirror and subscribe it to the module's events. The
    /// subscriptions hold the mirror weakly and lapse once it is dropped.
    pub fn attach(module: &TodoModule) -> Arc<Self> {
        let list = Arc::new(Self {
            api: module.api().clone(),
            state: Mutex::new(TodoListState::default()),
        });
        let events = module.events();
        events.todo_created.subscribe(&list, |list, json| list.on_created(json));
        events.todo_deleted.subscribe(&list, |list, json| list.on_deleted(json));
        events.todo_completed.subscribe(&list, |list, json| list.on_completed(json));
        events.todo_list_cleared.subscribe(&list, |list, _| list.on_cleared());
        list
    }

    pub fn todos(&self) -> Vec<Todo> {
        self.state.lock().todos.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().todos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().todos.is_empty()
    }

    /// Highest todo id seen so far, from either side.
    pub fn max_id(&self) -> i64 {
        self.state.lock().max_id
    }

    /// Ask the content process to create a todo with the next free id.
    pub fn create(&self, description: impl Into<String>) -> Result<Todo, TodoError> {
        let todo = {
            let mut state = self.state.lock();
            let id = state.max_id.checked_add(1).ok_or(TodoError::IdsExhausted)?;
            state.observe_id(id);
            Todo::new(id, description)
        };
        self.api.create_todo(&todo)?;
        Ok(todo)
    }

    /// Request a completion-state change for `id`.
    pub fn set_completed(&self, id: i64, completed: bool) -> Result<bool, BridgeError> {
        let todo = {
            let state = self.state.lock();
            state.todos.iter().find(|t| t.id == id).cloned()
        };
        let Some(mut todo) = todo else {
            return Ok(false);
        };
        todo.completed = completed;
        self.api.complete_todo(&todo)?;
        Ok(true)
    }

    /// Remove `id` locally and tell the content process.
    pub fn delete(&self, id: i64) -> Result<bool, BridgeError> {
        let removed = {
            let mut state = self.state.lock();
            let idx = state.todos.iter().position(|t| t.id == id);
            idx.map(|i| state.todos.remove(i))
        };
        match removed {
            Some(todo) => self.api.delete_todo(&todo).map(|()| true),
            None => Ok(false),
        }
    }

    pub fn clear(&self) -> Result<(), BridgeError> {
        self.api.clear_todo_list()
    }

    fn parse(&self, channel: TodoEvent, json: &Map<String, Value>) -> Option<Todo> {
        match Todo::from_json(json) {
            Ok(todo) => {
                self.state.lock().observe_id(todo.id);
                Some(todo)
            }
            Err(e) => {
                warn!(%channel, error = %e, "ignoring malformed todo");
                None
            }
        }
    }

    fn on_created(&self, json: &Map<String, Value>) {
        let Some(todo) = self.parse(TodoEvent::TodoCreated, json) else {
            return;
        };
        debug!(id = todo.id, "todo created");
        let mut state = self.state.lock();
        if let Some(existing) = state.todos.iter_mut().find(|t| t.id == todo.id) {
            *existing = todo;
        } else {
            state.todos.push(todo);
        }
    }

    fn on_deleted(&self, json: &Map<String, Value>) {
        let Some(todo) = self.parse(TodoEvent::TodoDeleted, json) else {
            return;
        };
        debug!(id = todo.id, "todo deleted");
        self.state.lock().todos.retain(|t| t.id != todo.id);
    }

    fn on_completed(&self, json: &Map<String, Value>) {
        let Some(todo) = self.parse(TodoEvent::TodoCompleted, json) else {
            return;
        };
        debug!(id = todo.id, "todo completed");
        if let Some(existing) = self.state.lock().todos.iter_mut().find(|t| t.id == todo.id) {
            existing.completed = true;
        }
    }

    fn on_cleared(&self) {
        debug!("todo list cleared");
        self.state.lock().todos.clear();
    }
}

impl fmt::Debug for TodoList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TodoList")
            .field("todos", &state.todos.len())
            .field("max_id", &state.max_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use webbridge_bridge::{extract_detail, Bridge, BridgeConfig, BufferSink};
    use webbridge_core::OutboundEnvelope;

    fn setup() -> (Bridge, Arc<TodoModule>, Arc<BufferSink>) {
        let bridge = Bridge::new(BridgeConfig::default());
        let sink = Arc::new(BufferSink::new());
        bridge.attach_sink(sink.clone());
        let module = todo_module();
        bridge.register(module.clone()).unwrap();
        (bridge, module, sink)
    }

    fn sent(sink: &BufferSink) -> Vec<OutboundEnvelope> {
        sink.drain()
            .iter()
            .map(|s| OutboundEnvelope::decode(extract_detail(s).unwrap()).unwrap())
            .collect()
    }

    fn todo_event(event: TodoEvent, data: Value) -> Value {
        json!({"module": TODO_MODULE, "event": event.as_str(), "data": data})
    }

    #[test]
    fn todo_created_then_create_call() {
        let (bridge, module, sink) = setup();
        let received = Arc::new(Mutex::new(Vec::new()));
        let r = Arc::clone(&received);
        module
            .events()
            .todo_created
            .subscribe_fn(move |todo| r.lock().push(todo.clone()));

        let data = json!({"id": 1, "description": "buy milk", "completed": false});
        assert!(bridge
            .dispatch(&todo_event(TodoEvent::TodoCreated, data.clone()))
            .is_delivered());
        let received = received.lock().clone();
        assert_eq!(received.len(), 1);
        assert_eq!(Value::Object(received[0].clone()), data);

        let todo = Todo::new(2, "walk the dog");
        module.api().create_todo(&todo).unwrap();
        let envelopes = sent(&sink);
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].module.as_str(), "todo");
        assert_eq!(envelopes[0].method, "createTodo");
        assert_eq!(
            envelopes[0].data,
            json!([{"id": 2, "description": "walk the dog", "completed": false}])
        );
    }

    #[test]
    fn clear_sends_empty_args() {
        let (_bridge, module, sink) = setup();
        module.api().clear_todo_list().unwrap();
        let envelopes = sent(&sink);
        assert_eq!(envelopes[0].method, "clearTodoList");
        assert_eq!(envelopes[0].data, json!([]));
    }

    #[test]
    fn list_cleared_accepts_any_payload() {
        let (bridge, module, _) = setup();
        let hits = Arc::new(Mutex::new(0));
        let h = Arc::clone(&hits);
        module
            .events()
            .todo_list_cleared
            .subscribe_fn(move |_| *h.lock() += 1);

        for data in [json!(null), json!({}), json!(3), json!("x")] {
            bridge.dispatch(&todo_event(TodoEvent::TodoListCleared, data));
        }
        bridge.dispatch(&json!({"module": "todo", "event": "todoListCleared"}));
        // Objects, integers and strings narrow to their own shapes.
        assert_eq!(*hits.lock(), 2);
    }

    #[test]
    fn mirror_follows_events() {
        let (bridge, module, _) = setup();
        let list = TodoList::attach(&module);

        bridge.dispatch(&todo_event(
            TodoEvent::TodoCreated,
            json!({"id": 4, "description": "a", "completed": false}),
        ));
        bridge.dispatch(&todo_event(
            TodoEvent::TodoCreated,
            json!({"id": 5, "description": "b", "completed": false}),
        ));
        bridge.dispatch(&todo_event(
            TodoEvent::TodoCompleted,
            json!({"id": 4, "description": "a", "completed": true}),
        ));
        assert_eq!(list.len(), 2);
        assert!(list.todos()[0].completed);
        assert_eq!(list.max_id(), 5);

        bridge.dispatch(&todo_event(
            TodoEvent::TodoDeleted,
            json!({"id": 5, "description": "b", "completed": false}),
        ));
        assert_eq!(list.todos(), vec![Todo { id: 4, description: "a".into(), completed: true }]);

        bridge.dispatch(&todo_event(TodoEvent::TodoListCleared, Value::Null));
        assert!(list.is_empty());
    }

    #[test]
    fn mirror_ignores_malformed_todos() {
        let (bridge, module, _) = setup();
        let list = TodoList::attach(&module);
        let outcome = bridge.dispatch(&todo_event(TodoEvent::TodoCreated, json!({"id": "x"})));
        assert!(outcome.is_delivered());
        assert!(list.is_empty());
    }

    #[test]
    fn mirror_allocates_ids_past_the_highest_seen() {
        let (bridge, module, sink) = setup();
        let list = TodoList::attach(&module);
        bridge.dispatch(&todo_event(
            TodoEvent::TodoCreated,
            json!({"id": 9, "description": "a", "completed": false}),
        ));

        let todo = list.create("next").unwrap();
        assert_eq!(todo.id, 10);
        assert_eq!(list.create("after").unwrap().id, 11);
        // Nothing local until the content process confirms.
        assert_eq!(list.len(), 1);
        assert_eq!(sent(&sink).len(), 2);
    }

    #[test]
    fn mirror_delete_is_local_and_outbound() {
        let (bridge, module, sink) = setup();
        let list = TodoList::attach(&module);
        bridge.dispatch(&todo_event(
            TodoEvent::TodoCreated,
            json!({"id": 1, "description": "a", "completed": false}),
        ));

        assert!(list.delete(1).unwrap());
        assert!(!list.delete(1).unwrap());
        assert!(list.is_empty());
        let envelopes = sent(&sink);
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].method, "deleteTodo");
    }

    #[test]
    fn mirror_complete_sends_updated_todo() {
        let (bridge, module, sink) = setup();
        let list = TodoList::attach(&module);
        bridge.dispatch(&todo_event(
            TodoEvent::TodoCreated,
            json!({"id": 1, "description": "a", "completed": false}),
        ));

        assert!(list.set_completed(1, true).unwrap());
        assert!(!list.set_completed(2, true).unwrap());
        let envelopes = sent(&sink);
        assert_eq!(
            envelopes[0].data,
            json!([{"id": 1, "description": "a", "completed": true}])
        );
    }

    #[test]
    fn dropped_mirror_stops_listening() {
        let (bridge, module, _) = setup();
        let list = TodoList::attach(&module);
        drop(list);
        let outcome = bridge.dispatch(&todo_event(
            TodoEvent::TodoCreated,
            json!({"id": 1, "description": "a", "completed": false}),
        ));
        assert!(matches!(
            outcome,
            webbridge_bridge::DispatchOutcome::Delivered(r) if r.delivered == 0 && r.stale == 1
        ));
    }

    #[test]
    fn unregistered_mirror_reports_not_connected() {
        let module = todo_module();
        let list = TodoList::attach(&module);
        assert!(matches!(
            list.create("x"),
            Err(TodoError::Bridge(BridgeError::NotConnected(_)))
        ));
    }

    #[test]
    fn create_after_max_id_fails_without_sending() {
        let (bridge, module, sink) = setup();
        let list = TodoList::attach(&module);
        let outcome = bridge.dispatch(&todo_event(
            TodoEvent::TodoCreated,
            json!({"id": i64::MAX, "description": "last", "completed": false}),
        ));
        assert!(outcome.is_delivered());
        assert_eq!(list.max_id(), i64::MAX);

        assert!(matches!(list.create("next"), Err(TodoError::IdsExhausted)));
        assert_eq!(list.max_id(), i64::MAX);
        assert!(sink.is_empty());
    }

    #[test]
    fn json_helpers() {
        let todo = Todo::new(3, "x");
        let json = todo.to_json();
        assert_eq!(Value::Object(json.clone()), json!({"id": 3, "description": "x", "completed": false}));
        assert_eq!(Todo::from_json(&json).unwrap(), todo);
        assert!(Todo::from_json(&Map::new()).is_err());
    }

    #[test]
    fn method_names() {
        for m in [
            TodoMethod::CreateTodo,
            TodoMethod::DeleteTodo,
            TodoMethod::CompleteTodo,
            TodoMethod::ClearTodoList,
        ] {
            assert_eq!(TodoMethod::parse(m.name()), Some(m));
        }
        assert_eq!(TodoMethod::parse("zoomIn"), None);
    }

    #[test]
    fn every_event_has_a_channel() {
        let module = todo_module();
        for event in TodoEvent::ALL {
            assert!(module.channels().contains(event.as_str()), "{event}");
        }
        assert_eq!(module.channels().len(), TodoEvent::ALL.len());
    }
}
