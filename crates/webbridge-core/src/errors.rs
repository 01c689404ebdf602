/// Errors from decoding envelopes and parsing narrowing configuration.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("envelope is not a JSON object")]
    NotAnObject,
    #[error("envelope missing string field `{0}`")]
    MissingField(&'static str),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown payload shape: {0}")]
    UnknownShape(String),
    #[error("the `any` shape is the implicit fallback and cannot be ordered")]
    ReservedShape,
}

impl CoreError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotAnObject => "not_an_object",
            Self::MissingField(_) => "missing_field",
            Self::Json(_) => "json",
            Self::UnknownShape(_) => "unknown_shape",
            Self::ReservedShape => "reserved_shape",
        }
    }
}
