use crate::cache::ListingCache;
use crate::error::Result;
use crate::settings::Settings;
use easel_scanner::client::HttpClient;
use easel_scanner::download::{DownloadPool, ItemCallback};
use easel_scanner::namer::{FolderNamer, attribution_label};
use easel_scanner::page::{ClassifiedPage, PageType, classify};
use easel_scanner::resolver::LinkResolver;
use easel_scanner::result::{ArtworkRecord, DownloadReport, DownloadResult, PendingDownload};
use easel_scanner::walker::{ListingWalker, PageCallback, WalkStop};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Where a single input URL is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum RunStage {
    Classifying,
    NamingFolder,
    ListingLoaded { records: usize, from_cache: bool },
    Downloading { total: usize },
    Done,
    Error,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStage::Classifying => write!(f, "classifying"),
            RunStage::NamingFolder => write!(f, "naming folder"),
            RunStage::ListingLoaded {
                records,
                from_cache: true,
            } => write!(f, "listing loaded from cache ({} records)", records),
            RunStage::ListingLoaded { records, .. } => {
                write!(f, "listing loaded ({} records)", records)
            }
            RunStage::Downloading { total } => write!(f, "downloading {} artworks", total),
            RunStage::Done => write!(f, "done"),
            RunStage::Error => write!(f, "error"),
        }
    }
}

pub type StageCallback = Arc<dyn Fn(&str, RunStage) + Send + Sync>;

/// Everything that happened to one input URL.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub input_url: String,
    pub page_type: Option<PageType>,
    pub folder: Option<String>,
    pub discovered: usize,
    pub from_cache: bool,
    pub walk_stop: Option<WalkStopSummary>,
    pub reports: Vec<DownloadReport>,
    pub error: Option<String>,
    pub started_at: String,
    pub elapsed_ms: u64,
}

/// Serializable form of [`WalkStop`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalkStopSummary {
    pub reason: String,
    pub page: u32,
    pub complete: bool,
}

impl From<&WalkStop> for WalkStopSummary {
    fn from(stop: &WalkStop) -> Self {
        let (reason, page) = match stop {
            WalkStop::EmptyPage { page } => ("empty page".to_string(), *page),
            WalkStop::NoNextPage { page } => ("no next page".to_string(), *page),
            WalkStop::PageLimit { page } => ("page limit".to_string(), *page),
            WalkStop::FetchFailed { page, reason } => (format!("fetch failed: {}", reason), *page),
        };
        Self {
            reason,
            page,
            complete: stop.is_complete(),
        }
    }
}

impl RunSummary {
    fn started(input_url: &str) -> Self {
        Self {
            input_url: input_url.to_string(),
            page_type: None,
            folder: None,
            discovered: 0,
            from_cache: false,
            walk_stop: None,
            reports: Vec::new(),
            error: None,
            started_at: chrono::Utc::now().to_rfc3339(),
            elapsed_ms: 0,
        }
    }

    fn count(&self, predicate: impl Fn(&DownloadResult) -> bool) -> usize {
        self.reports.iter().filter(|r| predicate(&r.result)).count()
    }

    pub fn saved(&self) -> usize {
        self.count(|r| matches!(r, DownloadResult::Saved { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|r| matches!(r, DownloadResult::SkippedExisting { .. }))
    }

    pub fn resolve_failed(&self) -> usize {
        self.count(|r| matches!(r, DownloadResult::ResolveFailed { .. }))
    }

    pub fn fetch_failed(&self) -> usize {
        self.count(|r| matches!(r, DownloadResult::FetchFailed { .. }))
    }

    pub fn failures(&self) -> Vec<&DownloadReport> {
        self.reports.iter().filter(|r| r.result.is_failure()).collect()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Classify, name, list and download one input URL at a time.
pub struct Pipeline {
    settings: Settings,
    client: HttpClient,
    cache: ListingCache,
    refresh: bool,
    stage_callback: Option<StageCallback>,
    page_callback: Option<PageCallback>,
    item_callback: Option<ItemCallback>,
}

impl Pipeline {
    pub fn new(settings: Settings) -> Result<Self> {
        let client = settings.http_client()?;
        let cache = ListingCache::new(settings.cache_dir.clone());
        Ok(Self {
            settings,
            client,
            cache,
            refresh: false,
            stage_callback: None,
            page_callback: None,
            item_callback: None,
        })
    }

    /// Ignore stored listings and walk again. A complete walk still replaces
    /// the stored entry.
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_stage_callback(mut self, callback: StageCallback) -> Self {
        self.stage_callback = Some(callback);
        self
    }

    pub fn with_page_callback(mut self, callback: PageCallback) -> Self {
        self.page_callback = Some(callback);
        self
    }

    pub fn with_item_callback(mut self, callback: ItemCallback) -> Self {
        self.item_callback = Some(callback);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &ListingCache {
        &self.cache
    }

    fn enter(&self, input: &str, stage: RunStage) {
        debug!(input = %input, stage = %stage, "Run stage");
        if let Some(ref callback) = self.stage_callback {
            callback(input, stage);
        }
    }

    /// Run one input URL to completion. Only classification failures end the
    /// run early; everything else is folded into the summary.
    pub async fn process_url(&self, input: &str) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::started(input);

        self.enter(input, RunStage::Classifying);
        let page = match classify(input) {
            Ok(page) => page,
            Err(e) => {
                warn!("Skipping {}: {}", input, e);
                summary.error = Some(e.to_string());
                self.enter(input, RunStage::Error);
                summary.elapsed_ms = started.elapsed().as_millis() as u64;
                return summary;
            }
        };
        info!(
            page_type = %page.page_type,
            key = %page.key,
            "Classified {}",
            page.input_url
        );
        summary.page_type = Some(page.page_type);

        self.enter(input, RunStage::NamingFolder);
        let folder = FolderNamer::new(self.client.clone()).folder_name(&page).await;
        let attribution = attribution_label(page.page_type, &folder);
        info!("Saving to folder {:?} as {:?}", folder, attribution);
        summary.folder = Some(folder.clone());

        let (records, from_cache, stop) = self.load_listing(&page).await;
        summary.discovered = records.len();
        summary.from_cache = from_cache;
        summary.walk_stop = stop.as_ref().map(WalkStopSummary::from);
        self.enter(
            input,
            RunStage::ListingLoaded {
                records: records.len(),
                from_cache,
            },
        );

        if records.is_empty() {
            info!("No artworks listed on {}", page.input_url);
        } else {
            self.enter(input, RunStage::Downloading { total: records.len() });
            summary.reports = self.download(records, &folder, &attribution).await;
        }

        self.enter(input, RunStage::Done);
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            saved = summary.saved(),
            skipped = summary.skipped(),
            failed = summary.resolve_failed() + summary.fetch_failed(),
            "Finished {}",
            input
        );
        summary
    }

    async fn load_listing(&self, page: &ClassifiedPage) -> (Vec<ArtworkRecord>, bool, Option<WalkStop>) {
        if !self.refresh
            && let Some(records) = self.cache.load(page.page_type, &page.key)
        {
            info!("Using cached listing for {} {}", page.page_type, page.key);
            return (records, true, None);
        }

        let mut walker = ListingWalker::new(self.client.clone(), &self.settings.site_url)
            .with_max_pages(self.settings.max_pages);
        if let Some(ref callback) = self.page_callback {
            walker = walker.with_page_callback(callback.clone());
        }

        let walk = match walker.walk(page).await {
            Ok(walk) => walk,
            Err(e) => {
                error!("Could not walk {}: {}", page.base_url, e);
                return (Vec::new(), false, None);
            }
        };

        if walk.stop.is_complete() {
            if let Err(e) = self.cache.store(page.page_type, &page.key, &walk.records) {
                warn!("Could not cache listing for {} {}: {}", page.page_type, page.key, e);
            }
        } else {
            warn!(
                "Listing for {} truncated ({} records), not caching",
                page.base_url,
                walk.records.len()
            );
        }

        (walk.records, false, Some(walk.stop))
    }

    async fn download(&self, records: Vec<ArtworkRecord>, folder: &str, attribution: &str) -> Vec<DownloadReport> {
        let resolver = LinkResolver::new(self.client.clone(), &self.settings.site_url);
        debug!("Resolving download links through {}", resolver.endpoint());

        let mut pool = DownloadPool::new(self.client.clone(), self.settings.output_dir.clone())
            .with_workers(self.settings.workers);
        if let Some(ref callback) = self.item_callback {
            pool = pool.with_item_callback(callback.clone());
        }

        let pending: Vec<PendingDownload> = records
            .into_iter()
            .map(|record| PendingDownload {
                record,
                folder: folder.to_string(),
                attribution: attribution.to_string(),
            })
            .collect();

        match pool.resolve_and_download_all(&resolver, pending).await {
            Ok(reports) => reports,
            Err(e) => {
                error!("Download pool failed: {}", e);
                Vec::new()
            }
        }
    }
}

/// Options for an archive run over one or more input URLs.
pub struct ArchiveOptions {
    pub urls: Vec<String>,
    pub settings: Settings,
    pub refresh: bool,
    pub show_progress_bars: bool,
}

/// Callback for human-readable progress lines.
pub type ArchiveProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Process every URL in order. A URL that cannot be classified is recorded
/// in its summary and the batch moves on.
pub async fn execute_archive(
    options: ArchiveOptions,
    progress_callback: Option<ArchiveProgressCallback>,
) -> Result<Vec<RunSummary>> {
    let ArchiveOptions {
        urls,
        settings,
        refresh,
        show_progress_bars,
    } = options;

    let progress_bar = if show_progress_bars {
        let pb = ProgressBar::new_spinner();
        pb.set_style(spinner_style());
        Some(Arc::new(pb))
    } else {
        None
    };

    let mut pipeline = Pipeline::new(settings)?.with_refresh(refresh);

    if let Some(ref pb) = progress_bar {
        let pb_stage = pb.clone();
        pipeline = pipeline.with_stage_callback(Arc::new(move |_input: &str, stage: RunStage| {
            match stage {
                RunStage::Downloading { total } => {
                    pb_stage.set_style(bar_style());
                    pb_stage.set_length(total as u64);
                    pb_stage.set_position(0);
                    pb_stage.set_message("downloading");
                }
                RunStage::Done | RunStage::Error => {}
                other => {
                    pb_stage.set_style(spinner_style());
                    pb_stage.set_message(other.to_string());
                    pb_stage.tick();
                }
            }
        }));

        let pb_page = pb.clone();
        pipeline = pipeline.with_page_callback(Arc::new(move |page: u32, _url: String| {
            pb_page.set_message(format!("reading listing page {}", page));
            pb_page.tick();
        }));

        let pb_item = pb.clone();
        pipeline = pipeline.with_item_callback(Arc::new(move |report: &DownloadReport| {
            pb_item.inc(1);
            if report.result.is_failure() {
                pb_item.set_message(format!("{} failed", report.record.id));
            }
        }));
    }

    let mut summaries = Vec::with_capacity(urls.len());
    for (idx, url) in urls.iter().enumerate() {
        if let Some(ref callback) = progress_callback
            && urls.len() > 1
        {
            callback(format!("Archiving {}/{}: {}", idx + 1, urls.len(), url));
        }

        let summary = pipeline.process_url(url).await;
        if let (Some(callback), Some(error)) = (&progress_callback, &summary.error) {
            callback(format!("[!]  Failed to archive {}: {}", url, error));
        }
        summaries.push(summary);
    }

    if let Some(ref pb) = progress_bar {
        let saved: usize = summaries.iter().map(RunSummary::saved).sum();
        pb.finish_with_message(format!("Archive complete! {} artworks saved", saved));
    }

    Ok(summaries)
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}
