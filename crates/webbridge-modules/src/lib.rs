//! Sample modules built on the bridge: a todo list and a content renderer.

pub mod content_renderer;
pub mod todo;

pub use content_renderer::{
    content_renderer_module, ContentRendererApi, ContentRendererMethod, ContentRendererModule,
    CONTENT_RENDERER_MODULE,
};
pub use todo::{
    todo_module, Todo, TodoApi, TodoError, TodoEvent, TodoEvents, TodoList, TodoMethod, TodoModule,
    TODO_MODULE,
};
