use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use crate::utils::utils::is_video_file;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub file_name: String,
    pub modified: SystemTime,
}

#[derive(Debug, Clone)]
struct Listing {
    scanned_at: Instant,
    files: Vec<MediaFile>,
}

#[derive(Error, Debug)]
pub enum RenameError {
    #[error("{0} does not exist")]
    Missing(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The media directories on disk, one per category, with a short-lived listing cache.
#[derive(Debug)]
pub struct MediaLibrary {
    root: PathBuf,
    ttl: Duration,
    listings: Mutex<HashMap<String, Listing>>,
}

impl MediaLibrary {
    pub fn new(root: PathBuf, ttl: Duration) -> Self {
        Self {
            root,
            ttl,
            listings: Mutex::new(HashMap::new()),
        }
    }

    pub fn path_of(&self, category: &str, file_name: &str) -> PathBuf {
        self.root.join(category).join(file_name)
    }

    /// `.mp4` files of a category, most recently modified first. A missing directory
    /// is an empty category.
    pub async fn list(&self, category: &str) -> io::Result<Vec<MediaFile>> {
        if let Some(listing) = self.listings.lock().get(category) {
            if listing.scanned_at.elapsed() < self.ttl {
                return Ok(listing.files.clone());
            }
        }

        let files = self.scan(category).await?;
        debug!("Scanned {category}: {} files", files.len());
        self.listings.lock().insert(
            category.to_string(),
            Listing {
                scanned_at: Instant::now(),
                files: files.clone(),
            },
        );
        Ok(files)
    }

    pub fn invalidate(&self, category: &str) {
        self.listings.lock().remove(category);
    }

    /// Renames a file inside its category. Never overwrites.
    pub async fn rename(&self, category: &str, from: &str, to: &str) -> Result<(), RenameError> {
        let source = self.path_of(category, from);
        let target = self.path_of(category, to);

        if !tokio::fs::try_exists(&source).await? {
            return Err(RenameError::Missing(from.to_string()));
        }
        if tokio::fs::try_exists(&target).await? {
            return Err(RenameError::Conflict(to.to_string()));
        }

        tokio::fs::rename(&source, &target).await?;
        self.invalidate(category);
        info!("Renamed {category}/{from} to {to}");
        Ok(())
    }

    async fn scan(&self, category: &str) -> io::Result<Vec<MediaFile>> {
        let dir = self.root.join(category);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_video_file(&path) {
                continue;
            }
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            files.push(MediaFile {
                file_name: file_name.to_string(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }

        files.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        Ok(files)
    }
}
