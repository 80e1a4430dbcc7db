use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task;

use crate::config::ServerConfig;
use crate::discovery::parsers::video_url;
use crate::models::models::Video;
use crate::service::library::{MediaFile, MediaLibrary};
use crate::service::store::MetaStore;
use crate::utils::utils::title_from_file_name;

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub library: Arc<MediaLibrary>,
    pub store: Arc<MetaStore>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let store = MetaStore::open(&config.store_file())?;
        let library = MediaLibrary::new(
            config.media_root.clone(),
            Duration::from_secs(config.list_cache_ttl_secs),
        );
        Ok(Self {
            config: Arc::new(config),
            library: Arc::new(library),
            store: Arc::new(store),
        })
    }

    /// Videos of one category, newest first.
    pub async fn videos_in(&self, category: &str) -> Result<Vec<Video>> {
        let files = self.library.list(category).await?;
        self.to_videos(category, &files).await
    }

    /// Videos of every configured category, newest first across categories.
    pub async fn all_videos(&self) -> Result<Vec<Video>> {
        let mut dated = Vec::new();
        for category in &self.config.categories {
            let files = self.library.list(category).await?;
            let videos = self.to_videos(category, &files).await?;
            dated.extend(files.into_iter().map(|file| file.modified).zip(videos));
        }
        dated.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(dated.into_iter().map(|(_, video)| video).collect())
    }

    /// A known video whose file is still on disk.
    pub async fn video(&self, id: u64) -> Result<Option<Video>> {
        let Some((category, file_name, meta)) = self.store.find(id) else {
            return Ok(None);
        };
        let exists = match tokio::fs::try_exists(self.library.path_of(&category, &file_name)).await {
            Ok(exists) => exists,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        if !exists {
            return Ok(None);
        }
        Ok(Some(Video {
            id: meta.id,
            url: video_url(&category, &file_name),
            title: meta.title.unwrap_or_else(|| title_from_file_name(&file_name)),
            likes: meta.likes,
            category,
            file_name,
        }))
    }

    async fn to_videos(&self, category: &str, files: &[MediaFile]) -> Result<Vec<Video>> {
        let names: Vec<String> = files.iter().map(|file| file.file_name.clone()).collect();
        // New files are written to the store, so this runs off the async workers.
        let store = Arc::clone(&self.store);
        let owned_category = category.to_string();
        let lookup = names.clone();
        let metas =
            task::spawn_blocking(move || store.ensure_all(&owned_category, &lookup)).await??;
        Ok(names
            .into_iter()
            .zip(metas)
            .map(|(file_name, meta)| Video {
                id: meta.id,
                url: video_url(category, &file_name),
                title: meta.title.unwrap_or_else(|| title_from_file_name(&file_name)),
                likes: meta.likes,
                category: category.to_string(),
                file_name,
            })
            .collect())
    }
}
