use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("incompatible snapshot version: expected major {expected}, found '{found}'")]
    IncompatibleVersion { expected: u32, found: String },

    #[error("summary-based pruning requires a chat client")]
    MissingSummarizer,

    #[error("semantic pruning requires an embedding provider")]
    MissingEmbedder,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
