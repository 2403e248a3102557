use crate::client::HttpClient;
use crate::error::{Result, ScanError};
use crate::namer::sanitize_name;
use crate::resolver::LinkResolver;
use crate::result::{ArtworkRecord, DownloadReport, DownloadResult, PendingDownload, ResolvedDownload};
use futures::StreamExt;
use std::collections::VecDeque;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub type ItemCallback = Arc<dyn Fn(&DownloadReport) + Send + Sync>;

pub const DEFAULT_WORKERS: usize = 5;
pub const FILE_EXTENSION: &str = "jpg";

/// Bounded pool of download workers sharing one session.
///
/// Every submitted item is attempted exactly once; a failing item never
/// affects its siblings and completion order is unspecified.
#[derive(Clone)]
pub struct DownloadPool {
    client: HttpClient,
    output_root: PathBuf,
    workers: usize,
    item_callback: Option<ItemCallback>,
}

impl DownloadPool {
    pub fn new(client: HttpClient, output_root: impl Into<PathBuf>) -> Self {
        Self {
            client,
            output_root: output_root.into(),
            workers: DEFAULT_WORKERS,
            item_callback: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_item_callback(mut self, callback: ItemCallback) -> Self {
        self.item_callback = Some(callback);
        self
    }

    /// `{root}/{folder}/{attribution} - {title}.jpg`
    pub fn destination(&self, folder: &str, attribution: &str, record: &ArtworkRecord) -> PathBuf {
        let mut title = sanitize_name(&record.title);
        if title.is_empty() {
            title = format!("Untitled {}", record.id);
        }
        self.output_root
            .join(folder)
            .join(format!("{} - {}.{}", attribution, title, FILE_EXTENSION))
    }

    pub async fn download_all(&self, items: Vec<ResolvedDownload>) -> Result<Vec<DownloadReport>> {
        let pool = self.clone();
        self.run(items, move |item: ResolvedDownload| {
            let pool = pool.clone();
            async move {
                let result = pool.download(&item).await;
                DownloadReport {
                    record: item.record,
                    result,
                }
            }
        })
        .await
    }

    /// Resolve each pending item and download it, skipping the resolve call
    /// entirely when the destination file already exists.
    pub async fn resolve_and_download_all(
        &self,
        resolver: &LinkResolver,
        items: Vec<PendingDownload>,
    ) -> Result<Vec<DownloadReport>> {
        let pool = self.clone();
        let resolver = resolver.clone();
        self.run(items, move |item: PendingDownload| {
            let pool = pool.clone();
            let resolver = resolver.clone();
            async move {
                let record = item.record.clone();
                let result = pool.resolve_and_download(&resolver, item).await;
                DownloadReport { record, result }
            }
        })
        .await
    }

    async fn resolve_and_download(&self, resolver: &LinkResolver, item: PendingDownload) -> DownloadResult {
        let destination = self.destination(&item.folder, &item.attribution, &item.record);
        if path_exists(&destination).await {
            debug!("Skipping existing {}", destination.display());
            return DownloadResult::SkippedExisting { path: destination };
        }

        match resolver.resolve(item.record.id).await {
            Ok(download_url) => self.download(&item.resolved(download_url)).await,
            Err(e) => {
                warn!("No download link for {} ({}): {}", item.record.url, item.record.id, e);
                DownloadResult::ResolveFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Stream one resolved artwork to disk. The body goes to a per-artwork
    /// `.part` file that is published with a create-exclusive link, so the
    /// final path never holds a partial file.
    pub async fn download(&self, item: &ResolvedDownload) -> DownloadResult {
        let destination = self.destination(&item.folder, &item.attribution, &item.record);
        if path_exists(&destination).await {
            debug!("Skipping existing {}", destination.display());
            return DownloadResult::SkippedExisting { path: destination };
        }

        let folder = self.output_root.join(&item.folder);
        let part = folder.join(format!(".{}.part", item.record.id));

        let written = match self.fetch_with_retry(&item.download_url, &folder, &part).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&part).await;
                warn!("Download failed for {} ({}): {}", item.download_url, item.record.id, e);
                return DownloadResult::FetchFailed {
                    reason: e.to_string(),
                };
            }
        };

        match publish(&part, &destination).await {
            Ok(true) => {
                info!("Saved {} ({} bytes)", destination.display(), written);
                DownloadResult::Saved {
                    path: destination,
                    bytes: written,
                }
            }
            Ok(false) => {
                debug!("{} appeared while downloading, keeping it", destination.display());
                DownloadResult::SkippedExisting { path: destination }
            }
            Err(e) => {
                let _ = fs::remove_file(&part).await;
                warn!("Could not publish {}: {}", destination.display(), e);
                DownloadResult::FetchFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// A body that breaks off mid-transfer is fetched again from the start,
    /// against the client's read retry budget.
    async fn fetch_with_retry(&self, url: &str, folder: &Path, part: &Path) -> Result<u64> {
        let policy = self.client.retry_policy();
        let budget = policy.read.min(policy.total);
        let mut retries = 0u32;

        loop {
            match self.fetch_to(url, folder, part).await {
                Err(ScanError::HttpError(e))
                    if retries < budget && (e.is_body() || e.is_decode()) =>
                {
                    retries += 1;
                    let delay = policy.backoff(retries);
                    debug!(url = %url, retry = retries, ?delay, "Body interrupted, fetching again: {}", e);
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    async fn fetch_to(&self, url: &str, folder: &Path, part: &Path) -> Result<u64> {
        fs::create_dir_all(folder).await?;
        let response = self.client.get(url).await?;

        let mut file = File::create(part).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    async fn run<T, F, Fut>(&self, items: Vec<T>, job: F) -> Result<Vec<DownloadReport>>
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DownloadReport> + Send + 'static,
    {
        let total = items.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let queue = Arc::new(Mutex::new(VecDeque::from(items)));
        let reports = Arc::new(Mutex::new(Vec::with_capacity(total)));
        let job = Arc::new(job);
        let workers = self.workers.min(total);

        info!("Downloading {} artworks with {} workers", total, workers);

        let mut worker_handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let queue = queue.clone();
            let reports = reports.clone();
            let job = job.clone();
            let callback = self.item_callback.clone();

            let handle = tokio::spawn(async move {
                debug!("Download worker {} started", worker_id);
                loop {
                    let next = { queue.lock().await.pop_front() };
                    let Some(item) = next else {
                        break;
                    };

                    let report = job(item).await;
                    if let Some(ref callback) = callback {
                        callback(&report);
                    }
                    reports.lock().await.push(report);
                }
                debug!("Download worker {} finished", worker_id);
            });
            worker_handles.push(handle);
        }

        for handle in worker_handles {
            handle
                .await
                .map_err(|e| ScanError::Other(format!("Download worker failed: {}", e)))?;
        }

        let mut reports = reports.lock().await;
        Ok(std::mem::take(&mut *reports))
    }
}

async fn path_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// Move `part` to `destination` unless something already lives there.
/// Returns `Ok(false)` when the destination already existed.
async fn publish(part: &Path, destination: &Path) -> std::io::Result<bool> {
    match fs::hard_link(part, destination).await {
        Ok(()) => {
            if let Err(e) = fs::remove_file(part).await {
                warn!("Published {} but could not remove {}: {}", destination.display(), part.display(), e);
            }
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            fs::remove_file(part).await?;
            Ok(false)
        }
        Err(e) => {
            debug!("Hard link unavailable ({}), falling back to rename", e);
            if path_exists(destination).await {
                fs::remove_file(part).await?;
                return Ok(false);
            }
            fs::rename(part, destination).await?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientOptions, RetryPolicy};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    fn client() -> HttpClient {
        HttpClient::with_options(ClientOptions {
            retry: RetryPolicy::none(),
            ..ClientOptions::default()
        })
        .unwrap()
    }

    fn resolved(server: &MockServer, id: u64, title: &str) -> ResolvedDownload {
        ResolvedDownload {
            record: ArtworkRecord::new(format!("{}/dl/art-{}/", server.uri(), id), id, title),
            folder: "Landscapes".to_string(),
            attribution: "Various Artists".to_string(),
            download_url: format!("{}/images/{}.jpg", server.uri(), id),
        }
    }

    async fn mount_image(server: &MockServer, id: u64, times: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/images/{}.jpg", id)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(format!("image-{}", id).into_bytes()))
            .expect(times)
            .mount(server)
            .await;
    }

    fn leftover_parts(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok().map(|e| e.path()))
                    .filter(|p| p.extension().is_some_and(|ext| ext == "part"))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Serve `body` four bytes at a time with `pause` between writes. With
    /// `cut_first`, the first connection is dropped halfway through the body.
    async fn trickle_server(body: Vec<u8>, pause: Duration, cut_first: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let body = body.clone();
                let cut = cut_first && connections.fetch_add(1, Ordering::SeqCst) == 0;
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }

                    let head = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: image/jpeg\r\ncontent-length: {}\r\n\r\n",
                        body.len()
                    );
                    if socket.write_all(head.as_bytes()).await.is_err() {
                        return;
                    }
                    let chunks: Vec<&[u8]> = body.chunks(4).collect();
                    let sent = if cut { chunks.len() / 2 } else { chunks.len() };
                    for chunk in &chunks[..sent] {
                        if socket.write_all(chunk).await.is_err() {
                            return;
                        }
                        let _ = socket.flush().await;
                        tokio::time::sleep(pause).await;
                    }
                });
            }
        });

        format!("http://{}", addr)
    }

    fn trickle_item(base: &str) -> ResolvedDownload {
        ResolvedDownload {
            record: ArtworkRecord::new(format!("{}/dl/large/", base), 77, "Large Canvas"),
            folder: "Landscapes".to_string(),
            attribution: "Various Artists".to_string(),
            download_url: format!("{}/images/77.jpg", base),
        }
    }

    #[test]
    fn test_destination_layout() {
        let pool = DownloadPool::new(client(), "/out");
        let record = ArtworkRecord::new("u", 9, "water-lilies (1916)");
        assert_eq!(
            pool.destination("Claude Monet", "Claude Monet", &record),
            PathBuf::from("/out/Claude Monet/Claude Monet - Water Lilies 1916.jpg")
        );

        let untitled = ArtworkRecord::new("u", 10, "睡蓮");
        assert_eq!(
            pool.destination("Birds", "Various Artists", &untitled),
            PathBuf::from("/out/Birds/Various Artists - Untitled 10.jpg")
        );
    }

    #[tokio::test]
    async fn test_second_run_skips_everything() {
        let server = MockServer::start().await;
        let out = TempDir::new().unwrap();
        for id in 1..=3 {
            mount_image(&server, id, 1).await;
        }

        let items: Vec<ResolvedDownload> = (1..=3)
            .map(|id| resolved(&server, id, &format!("Painting {}", id)))
            .collect();
        let pool = DownloadPool::new(client(), out.path()).with_workers(2);

        let first = pool.download_all(items.clone()).await.unwrap();
        assert_eq!(first.len(), 3);
        assert!(first.iter().all(|r| matches!(r.result, DownloadResult::Saved { .. })));

        let saved = std::fs::read(out.path().join("Landscapes/Various Artists - Painting 2.jpg")).unwrap();
        assert_eq!(saved, b"image-2");

        let second = pool.download_all(items).await.unwrap();
        assert_eq!(second.len(), 3);
        assert!(
            second
                .iter()
                .all(|r| matches!(r.result, DownloadResult::SkippedExisting { .. }))
        );
        assert!(leftover_parts(&out.path().join("Landscapes")).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_no_file() {
        let server = MockServer::start().await;
        let out = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/images/4.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        mount_image(&server, 5, 1).await;

        let pool = DownloadPool::new(client(), out.path());
        let reports = pool
            .download_all(vec![resolved(&server, 4, "Broken"), resolved(&server, 5, "Fine")])
            .await
            .unwrap();

        let broken = reports.iter().find(|r| r.record.id == 4).unwrap();
        assert!(matches!(broken.result, DownloadResult::FetchFailed { .. }));
        let fine = reports.iter().find(|r| r.record.id == 5).unwrap();
        assert!(matches!(fine.result, DownloadResult::Saved { bytes: 7, .. }));

        let folder = out.path().join("Landscapes");
        assert!(!folder.join("Various Artists - Broken.jpg").exists());
        assert!(leftover_parts(&folder).is_empty());
    }

    #[tokio::test]
    async fn test_resolve_skipped_for_existing_files() {
        let server = MockServer::start().await;
        let out = TempDir::new().unwrap();

        // id 1 already on disk: neither resolved nor fetched
        Mock::given(method("GET"))
            .and(path("/erica"))
            .and(query_param("id", "1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/erica"))
            .and(query_param("id", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"flink": format!("{}/images/2.jpg", server.uri())})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/erica"))
            .and(query_param("id", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"flink": null})))
            .mount(&server)
            .await;
        mount_image(&server, 2, 1).await;

        std::fs::create_dir_all(out.path().join("Landscapes")).unwrap();
        std::fs::write(out.path().join("Landscapes/Various Artists - One.jpg"), b"old").unwrap();

        let pending: Vec<PendingDownload> = [(1, "One"), (2, "Two"), (3, "Three")]
            .into_iter()
            .map(|(id, title)| PendingDownload {
                record: ArtworkRecord::new(format!("{}/dl/{}/", server.uri(), id), id, title),
                folder: "Landscapes".to_string(),
                attribution: "Various Artists".to_string(),
            })
            .collect();

        let finished = Arc::new(AtomicUsize::new(0));
        let finished_clone = finished.clone();
        let pool = DownloadPool::new(client(), out.path()).with_item_callback(Arc::new(
            move |_report: &DownloadReport| {
                finished_clone.fetch_add(1, Ordering::Relaxed);
            },
        ));
        let resolver = LinkResolver::new(client(), &server.uri());

        let reports = pool.resolve_and_download_all(&resolver, pending).await.unwrap();
        let result_for = |id: u64| reports.iter().find(|r| r.record.id == id).unwrap().result.clone();

        assert!(matches!(result_for(1), DownloadResult::SkippedExisting { .. }));
        assert!(matches!(result_for(2), DownloadResult::Saved { .. }));
        assert!(matches!(result_for(3), DownloadResult::ResolveFailed { .. }));
        assert_eq!(finished.load(Ordering::Relaxed), 3);
        assert_eq!(
            std::fs::read(out.path().join("Landscapes/Various Artists - One.jpg")).unwrap(),
            b"old"
        );
    }

    #[tokio::test]
    async fn test_every_item_attempted_once() {
        let server = MockServer::start().await;
        let out = TempDir::new().unwrap();
        for id in 1..=20 {
            mount_image(&server, id, 1).await;
        }

        let items: Vec<ResolvedDownload> = (1..=20)
            .map(|id| resolved(&server, id, &format!("Study {}", id)))
            .collect();
        let pool = DownloadPool::new(client(), out.path()).with_workers(3);

        let reports = pool.download_all(items).await.unwrap();

        let mut ids: Vec<u64> = reports.iter().map(|r| r.record.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=20).collect::<Vec<u64>>());
        assert!(reports.iter().all(|r| !r.result.is_failure()));
    }

    #[tokio::test]
    async fn test_slow_steady_body_outlasts_timeout() {
        let body: Vec<u8> = (0..40u8).collect();
        let base = trickle_server(body.clone(), Duration::from_millis(300), false).await;
        let out = TempDir::new().unwrap();

        let client = HttpClient::with_options(ClientOptions {
            timeout_secs: 1,
            retry: RetryPolicy::none(),
            ..ClientOptions::default()
        })
        .unwrap();
        let pool = DownloadPool::new(client, out.path());

        let result = pool.download(&trickle_item(&base)).await;

        assert!(matches!(result, DownloadResult::Saved { bytes: 40, .. }), "{:?}", result);
        let saved = std::fs::read(out.path().join("Landscapes/Various Artists - Large Canvas.jpg")).unwrap();
        assert_eq!(saved, body);
    }

    #[tokio::test]
    async fn test_interrupted_body_is_fetched_again() {
        let body: Vec<u8> = (0..40u8).collect();
        let base = trickle_server(body.clone(), Duration::from_millis(5), true).await;
        let out = TempDir::new().unwrap();

        let client = HttpClient::with_options(ClientOptions {
            retry: RetryPolicy {
                total: 1,
                connect: 0,
                read: 1,
                backoff_factor: Duration::from_millis(1),
                status_forcelist: Vec::new(),
            },
            ..ClientOptions::default()
        })
        .unwrap();
        let pool = DownloadPool::new(client, out.path());

        let result = pool.download(&trickle_item(&base)).await;

        assert!(matches!(result, DownloadResult::Saved { bytes: 40, .. }), "{:?}", result);
        assert!(leftover_parts(&out.path().join("Landscapes")).is_empty());
    }

    #[tokio::test]
    async fn test_interrupted_body_without_budget_fails_cleanly() {
        let base = trickle_server((0..40u8).collect(), Duration::from_millis(5), true).await;
        let out = TempDir::new().unwrap();

        let pool = DownloadPool::new(client(), out.path());
        let result = pool.download(&trickle_item(&base)).await;

        assert!(matches!(result, DownloadResult::FetchFailed { .. }), "{:?}", result);
        let folder = out.path().join("Landscapes");
        assert!(!folder.join("Various Artists - Large Canvas.jpg").exists());
        assert!(leftover_parts(&folder).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_publish_succeeds_when_part_cannot_be_removed() {
        use std::os::unix::fs::PermissionsExt;

        let staging = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let part = staging.path().join(".2.part");
        let destination = target.path().join("final.jpg");
        std::fs::write(&part, b"painting").unwrap();
        std::fs::set_permissions(staging.path(), std::fs::Permissions::from_mode(0o555)).unwrap();

        let published = publish(&part, &destination).await;
        std::fs::set_permissions(staging.path(), std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(published.unwrap());
        assert_eq!(std::fs::read(&destination).unwrap(), b"painting");
    }

    #[tokio::test]
    async fn test_publish_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let part = dir.path().join(".1.part");
        let destination = dir.path().join("final.jpg");
        std::fs::write(&destination, b"first").unwrap();
        std::fs::write(&part, b"second").unwrap();

        assert!(!publish(&part, &destination).await.unwrap());
        assert_eq!(std::fs::read(&destination).unwrap(), b"first");
        assert!(!part.exists());
    }
}
