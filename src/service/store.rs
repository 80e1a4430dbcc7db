use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::models::{Caption, Comment, NewCaption};
use crate::utils::utils::unix_now;

/// What the server remembers about one file. Keyed by `category/file_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMeta {
    pub id: u64,
    /// Set once the title was edited; otherwise the title follows the file name
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub likes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    last_video_id: u64,
    #[serde(default)]
    last_comment_id: u64,
    #[serde(default)]
    last_caption_id: u64,
    #[serde(default)]
    videos: BTreeMap<String, VideoMeta>,
    #[serde(default)]
    comments: Vec<Comment>,
    #[serde(default)]
    captions: Vec<Caption>,
}

/// JSON-file backed metadata: stable ids, edited titles, like counts, comments and captions.
///
/// Every mutation is written through before the call returns, and the in-memory copy only
/// changes once the write succeeded. Writes go to a temporary sibling first and are renamed
/// over the store, so a crash never leaves half a file.
#[derive(Debug)]
pub struct MetaStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

fn store_key(category: &str, file_name: &str) -> String {
    format!("{category}/{file_name}")
}

impl MetaStore {
    pub fn open(path: &Path) -> Result<Self> {
        let data = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read store {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse store {}", path.display()))?
        } else {
            info!("Creating new store at {}", path.display());
            StoreData::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            data: Mutex::new(data),
        })
    }

    /// Metadata for each file of `category`, assigning ids to files seen for the first time.
    pub fn ensure_all(&self, category: &str, file_names: &[String]) -> Result<Vec<VideoMeta>> {
        let mut data = self.data.lock();
        let mut next = data.clone();
        let mut created = 0;
        let metas = file_names
            .iter()
            .map(|file_name| {
                let key = store_key(category, file_name);
                if let Some(meta) = next.videos.get(&key) {
                    return meta.clone();
                }
                next.last_video_id += 1;
                let meta = VideoMeta {
                    id: next.last_video_id,
                    title: None,
                    likes: 0,
                };
                next.videos.insert(key, meta.clone());
                created += 1;
                meta
            })
            .collect();

        if created > 0 {
            debug!("Assigned ids to {created} new files in {category}");
            self.write(&next)?;
            *data = next;
        }
        Ok(metas)
    }

    /// `(category, file_name, meta)` of a known id.
    pub fn find(&self, id: u64) -> Option<(String, String, VideoMeta)> {
        let data = self.data.lock();
        data.videos.iter().find(|(_, meta)| meta.id == id).and_then(|(key, meta)| {
            let (category, file_name) = key.split_once('/')?;
            Some((category.to_string(), file_name.to_string(), meta.clone()))
        })
    }

    /// Adds `delta` likes (never going below zero). `None` for an unknown id.
    pub fn add_likes(&self, id: u64, delta: i64) -> Result<Option<u64>> {
        self.commit(|data| {
            let meta = data.videos.values_mut().find(|meta| meta.id == id)?;
            meta.likes = meta.likes.saturating_add_signed(delta);
            Some(meta.likes)
        })
    }

    pub fn set_title(&self, id: u64, title: &str) -> Result<bool> {
        let updated = self.commit(|data| {
            let meta = data.videos.values_mut().find(|meta| meta.id == id)?;
            meta.title = Some(title.to_string());
            Some(())
        })?;
        Ok(updated.is_some())
    }

    /// Moves the metadata of `id` to its new file name, keeping id, likes and overlays.
    pub fn rename(&self, id: u64, new_file_name: &str) -> Result<bool> {
        let moved = self.commit(|data| {
            let old_key = data
                .videos
                .iter()
                .find(|(_, meta)| meta.id == id)
                .map(|(key, _)| key.clone())?;
            let (category, _) = old_key.split_once('/')?;
            let new_key = store_key(category, new_file_name);
            let meta = data.videos.remove(&old_key)?;
            data.videos.insert(new_key, meta);
            Some(())
        })?;
        Ok(moved.is_some())
    }

    pub fn comments(&self, video_id: u64) -> Vec<Comment> {
        let data = self.data.lock();
        let mut comments: Vec<Comment> = data
            .comments
            .iter()
            .filter(|comment| comment.video_id == video_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        comments
    }

    pub fn add_comment(&self, video_id: u64, content: &str) -> Result<Comment> {
        let mut data = self.data.lock();
        let mut next = data.clone();
        next.last_comment_id += 1;
        let comment = Comment {
            id: next.last_comment_id,
            video_id,
            content: content.to_string(),
            created_at: unix_now(),
        };
        next.comments.push(comment.clone());
        self.write(&next)?;
        *data = next;
        Ok(comment)
    }

    /// Captions of a video ordered by playback time.
    pub fn captions(&self, video_id: u64) -> Vec<Caption> {
        let data = self.data.lock();
        let mut captions: Vec<Caption> = data
            .captions
            .iter()
            .filter(|caption| caption.video_id == video_id)
            .cloned()
            .collect();
        captions.sort_by(|a, b| a.time.total_cmp(&b.time));
        captions
    }

    pub fn add_caption(&self, caption: &NewCaption) -> Result<Caption> {
        let mut data = self.data.lock();
        let mut next = data.clone();
        next.last_caption_id += 1;
        let caption = Caption {
            id: next.last_caption_id,
            video_id: caption.video_id,
            content: caption.content.clone(),
            time: caption.time,
        };
        next.captions.push(caption.clone());
        self.write(&next)?;
        *data = next;
        Ok(caption)
    }

    /// Applies `change` to a copy and keeps it once the copy is on disk.
    /// `None` from `change` means nothing to update, and nothing is written.
    fn commit<T>(&self, change: impl FnOnce(&mut StoreData) -> Option<T>) -> Result<Option<T>> {
        let mut data = self.data.lock();
        let mut next = data.clone();
        let Some(out) = change(&mut next) else {
            return Ok(None);
        };
        self.write(&next)?;
        *data = next;
        Ok(Some(out))
    }

    fn write(&self, data: &StoreData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension(format!("{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
