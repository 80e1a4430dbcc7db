use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::app::queue::PlayMode;
use crate::models::models::Video;

const APP_DIR: &str = "swipefeed";
const STATE_FILE: &str = "viewer.json";

/// Identity of the last video shown, used to resume after a reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastViewed {
    pub id: u64,
    pub file_name: String,
    pub title: String,
    pub category: String,
}

impl LastViewed {
    pub fn from_video(video: &Video, category: &str) -> Self {
        Self {
            id: video.id,
            file_name: video.file_name.clone(),
            title: video.title.clone(),
            category: category.to_string(),
        }
    }

    /// Position of the remembered video in `videos`, matched by id, then file name, then title.
    pub fn position_in(&self, videos: &[Video]) -> Option<usize> {
        videos
            .iter()
            .position(|video| video.id == self.id)
            .or_else(|| videos.iter().position(|video| video.file_name == self.file_name))
            .or_else(|| videos.iter().position(|video| video.title == self.title))
    }
}

/// Convenience state kept on the viewer's device. The catalogue and likes live on the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewerState {
    #[serde(default)]
    pub last_viewed: Option<LastViewed>,
    #[serde(default)]
    pub mode: PlayMode,
    #[serde(default)]
    pub autoplay: bool,
}

pub fn state_dir() -> Result<PathBuf> {
    if let Ok(override_dir) = env::var("SWIPEFEED_STATE_DIR") {
        return Ok(PathBuf::from(override_dir));
    }
    let base = dirs::config_dir().context("no configuration directory on this platform")?;
    Ok(base.join(APP_DIR))
}

pub fn default_state_path() -> Result<PathBuf> {
    Ok(state_dir()?.join(STATE_FILE))
}

pub fn load_viewer_state(path: &Path) -> Result<ViewerState> {
    if !path.exists() {
        return Ok(ViewerState::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read viewer state {}", path.display()))?;
    let state = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse viewer state {}", path.display()))?;
    Ok(state)
}

pub fn save_viewer_state(path: &Path, state: &ViewerState) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(state)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
