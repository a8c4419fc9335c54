pub mod context;
pub mod convoy;
pub mod format;
pub mod queue;
pub mod recycle;
pub mod resume;
pub mod schema;
pub mod sling;
