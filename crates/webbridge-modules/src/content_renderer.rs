//! The content renderer: outbound zoom controls, no inbound events.

use std::sync::Arc;

use webbridge_bridge::{ApiLink, ApiMethod, BridgeError, Module, ModuleApi, NoEvents};

pub const CONTENT_RENDERER_MODULE: &str = "contentRenderer";

pub type ContentRendererModule = Module<NoEvents, ContentRendererApi>;

pub fn content_renderer_module() -> Arc<ContentRendererModule> {
    ContentRendererModule::new(CONTENT_RENDERER_MODULE)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentRendererMethod {
    ZoomIn,
    ZoomOut,
    ZoomToFit,
}

impl ContentRendererMethod {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "zoomIn" => Some(Self::ZoomIn),
            "zoomOut" => Some(Self::ZoomOut),
            "zoomToFit" => Some(Self::ZoomToFit),
            _ => None,
        }
    }
}

impl ApiMethod for ContentRendererMethod {
    fn name(&self) -> &str {
        match self {
            Self::ZoomIn => "zoomIn",
            Self::ZoomOut => "zoomOut",
            Self::ZoomToFit => "zoomToFit",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ContentRendererApi {
    link: ApiLink,
}

impl ModuleApi for ContentRendererApi {
    fn new(link: ApiLink) -> Self {
        Self { link }
    }
}

impl ContentRendererApi {
    pub fn zoom_in(&self) -> Result<(), BridgeError> {
        self.link.call(ContentRendererMethod::ZoomIn, ())
    }

    pub fn zoom_out(&self) -> Result<(), BridgeError> {
        self.link.call(ContentRendererMethod::ZoomOut, ())
    }

    pub fn zoom_to_fit(&self) -> Result<(), BridgeError> {
        self.link.call(ContentRendererMethod::ZoomToFit, ())
    }

    /// Issue any renderer method by value.
    pub fn invoke(&self, method: ContentRendererMethod) -> Result<(), BridgeError> {
        self.link.call(method, ())
    }
}
