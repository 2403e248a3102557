// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    load_urls_from_file,
    load_urls_from_source,
    parse_url_line,
    settings_from_matches,
};

// Re-export archive functionality from easel-core
pub use easel_core::pipeline::{
    ArchiveOptions, ArchiveProgressCallback, RunSummary, execute_archive,
};
pub use easel_core::report::{generate_text_report, ReportFormat};
