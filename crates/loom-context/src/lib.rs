pub mod error;
pub mod export;
pub mod store;
pub mod strategy;

pub use error::ContextError;
pub use export::{ContextSnapshot, EXPORT_VERSION};
pub use store::{ContextConfig, ContextStats, ContextStore, MessageFilter, SearchOptions, SearchResult};
pub use strategy::{
    PriorityConfig, PruneReport, PruningStrategy, SemanticConfig, SlidingWindowConfig,
    SummaryConfig,
};
