pub mod client;
pub mod download;
pub mod error;
pub mod namer;
pub mod page;
pub mod resolver;
pub mod result;
pub mod walker;

pub use client::{ClientOptions, HttpClient, RetryPolicy};
pub use download::DownloadPool;
pub use error::ScanError;
pub use namer::FolderNamer;
pub use page::{ClassifiedPage, PageType, classify};
pub use resolver::LinkResolver;
pub use result::{ArtworkRecord, DownloadReport, DownloadResult, PendingDownload, ResolvedDownload};
pub use walker::{ListingWalker, Walk, WalkStop};
