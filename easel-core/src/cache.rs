use crate::error::Result;
use easel_scanner::page::{ClassifiedPage, PageType, classify};
use easel_scanner::result::ArtworkRecord;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const FILE_PREFIX: &str = "cache_";
const FILE_SUFFIX: &str = ".json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFile {
    page_type: PageType,
    key: String,
    stored_at: String,
    records: Vec<ArtworkRecord>,
}

/// Summary of one stored listing, for `cache list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub page_type: PageType,
    pub key: String,
    pub stored_at: String,
    pub records: usize,
    pub path: PathBuf,
}

/// Walker output persisted per (page type, key), one JSON file each.
///
/// Entries are never invalidated automatically; a stored listing is a
/// snapshot until it is cleared.
#[derive(Debug, Clone)]
pub struct ListingCache {
    dir: PathBuf,
}

impl ListingCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{dir}/cache_{type}_{key}.json` with the key percent-encoded, so two
    /// distinct keys never share a file.
    pub fn path_for(&self, page_type: PageType, key: &str) -> PathBuf {
        let encoded: String = url::form_urlencoded::byte_serialize(key.as_bytes()).collect();
        self.dir.join(format!(
            "{}{}_{}{}",
            FILE_PREFIX,
            page_type.as_str(),
            encoded,
            FILE_SUFFIX
        ))
    }

    /// A missing, unreadable or corrupt file is a miss.
    pub fn load(&self, page_type: PageType, key: &str) -> Option<Vec<ArtworkRecord>> {
        let path = self.path_for(page_type, key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not read cache file {}: {}", path.display(), e);
                }
                return None;
            }
        };

        match serde_json::from_str::<CacheFile>(&content) {
            Ok(file) if file.page_type == page_type && file.key == key => {
                debug!("Cache hit for {} {} ({} records)", page_type, key, file.records.len());
                Some(file.records)
            }
            Ok(_) => {
                warn!("Cache file {} belongs to another listing, ignoring", path.display());
                None
            }
            Err(e) => {
                warn!("Corrupt cache file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Write through a temporary file and rename, so readers never observe a
    /// partially written entry.
    pub fn store(&self, page_type: PageType, key: &str, records: &[ArtworkRecord]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(page_type, key);
        let tmp = path.with_extension("json.tmp");
        let file = CacheFile {
            page_type,
            key: key.to_string(),
            stored_at: chrono::Utc::now().to_rfc3339(),
            records: records.to_vec(),
        };

        fs::write(&tmp, serde_json::to_vec_pretty(&file)?)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        info!("Cached {} records for {} {}", records.len(), page_type, key);
        Ok(path)
    }

    pub fn remove(&self, page_type: PageType, key: &str) -> Result<bool> {
        match fs::remove_file(self.path_for(page_type, key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Drop the entry a listing URL would be cached under. Returns the
    /// classified page and whether a file was removed.
    pub fn forget(&self, url: &str) -> Result<(ClassifiedPage, bool)> {
        let page = classify(url)?;
        let removed = self.remove(page.page_type, &page.key)?;
        debug!("Forget {} {}: removed={}", page.page_type, page.key, removed);
        Ok((page, removed))
    }

    /// Every readable entry, sorted by type then key.
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        for path in self.cache_files()? {
            let parsed = fs::read_to_string(&path)
                .ok()
                .and_then(|content| serde_json::from_str::<CacheFile>(&content).ok());
            match parsed {
                Some(file) => entries.push(CacheEntry {
                    page_type: file.page_type,
                    key: file.key,
                    stored_at: file.stored_at,
                    records: file.records.len(),
                    path,
                }),
                None => warn!("Skipping unreadable cache file {}", path.display()),
            }
        }

        entries.sort_by(|a, b| {
            a.page_type
                .as_str()
                .cmp(b.page_type.as_str())
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(entries)
    }

    /// Delete every cache file. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let files = self.cache_files()?;
        for path in &files {
            fs::remove_file(path)?;
        }
        info!("Cleared {} cache files from {}", files.len(), self.dir.display());
        Ok(files.len())
    }

    fn cache_files(&self) -> Result<Vec<PathBuf>> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in read_dir {
            let path = entry?.path();
            let is_cache_file = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX));
            if is_cache_file && path.is_file() {
                files.push(path);
            }
        }
        Ok(files)
    }
}
