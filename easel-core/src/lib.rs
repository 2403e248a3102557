pub mod cache;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod settings;

pub use cache::ListingCache;
pub use error::CoreError;
pub use pipeline::{ArchiveOptions, Pipeline, RunStage, RunSummary, execute_archive};
pub use settings::Settings;
