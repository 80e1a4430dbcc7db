use std::path::PathBuf;

use tracing::{info, warn};

use crate::app::controller::{FeedController, FeedPhase, Navigation, Overlays};
use crate::app::persisted::{load_viewer_state, save_viewer_state, ViewerState};
use crate::app::queue::PlayMode;
use crate::discovery::fetchers::VideoCatalog;
use crate::discovery::models::CatalogQuery;
use crate::discovery::parsers::video_url;
use crate::download::manager::{ResourceState, WarmupManager};
use crate::models::models::{Caption, NewCaption, Video};
use crate::utils::errors::FeedError;
use crate::utils::utils::sanitize_file_name;

/// Drives a `FeedController` against a catalogue: performs the network calls its events
/// need, forwards warm-up targets to the `WarmupManager` and remembers the last viewed
/// video between runs.
pub struct FeedSession<C: VideoCatalog> {
    catalog: C,
    feed: FeedController,
    warmup: WarmupManager,
    state_path: Option<PathBuf>,
}

impl<C: VideoCatalog> FeedSession<C> {
    pub fn new(catalog: C, feed: FeedController, warmup: WarmupManager) -> Self {
        Self {
            catalog,
            feed,
            warmup,
            state_path: None,
        }
    }

    /// Restores preferences from `path` and keeps it updated as the viewer moves.
    pub fn with_state_path(mut self, path: PathBuf) -> Self {
        match load_viewer_state(&path) {
            Ok(state) => self.feed.restore(state.last_viewed, state.mode, state.autoplay),
            Err(e) => warn!("Ignoring unreadable viewer state: {e:#}"),
        }
        self.state_path = Some(path);
        self
    }

    pub fn feed(&self) -> &FeedController {
        &self.feed
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn warmup(&self) -> &WarmupManager {
        &self.warmup
    }

    /// Replaces the list with the result of `query`. Warm-ups of the old list are cancelled.
    pub async fn load(&mut self, query: CatalogQuery) -> &FeedPhase {
        self.warmup.cancel_all();
        let ticket = self.feed.begin_load(query.clone());
        let result = self.catalog.fetch_videos(&query).await;
        if self.feed.complete_load(ticket, result) && self.feed.phase() == &FeedPhase::Ready {
            self.issue_warm();
            self.persist();
        }
        self.feed.phase()
    }

    pub async fn load_category(&mut self, category: &str) -> &FeedPhase {
        self.load(CatalogQuery::for_category(category)).await
    }

    pub fn swipe_forward(&mut self) -> Navigation {
        let nav = self.feed.swipe_forward();
        self.after_navigation(nav);
        nav
    }

    pub fn swipe_backward(&mut self) -> Navigation {
        let nav = self.feed.swipe_backward();
        self.after_navigation(nav);
        nav
    }

    pub fn video_ended(&mut self) -> Navigation {
        let nav = self.feed.video_ended();
        self.after_navigation(nav);
        nav
    }

    pub fn select_from_search(&mut self, hit: &Video) -> Navigation {
        let nav = self.feed.select_from_search(hit);
        self.after_navigation(nav);
        nav
    }

    pub fn toggle_mode(&mut self) -> PlayMode {
        let mode = self.feed.toggle_mode();
        self.issue_warm();
        self.persist();
        mode
    }

    pub fn toggle_autoplay(&mut self) -> bool {
        let on = self.feed.toggle_autoplay();
        self.persist();
        on
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.feed.set_playing(playing);
    }

    pub fn take_notice(&mut self) -> Option<String> {
        self.feed.take_notice()
    }

    /// State of the current video's resource. Anything short of `Ready` means the
    /// player is fetching on demand and shows a buffering indicator.
    pub fn current_resource_state(&self) -> ResourceState {
        match self.feed.current_video() {
            Some(video) => self.warmup.state(&self.catalog.resource_url(video)),
            None => ResourceState::NotRequested,
        }
    }

    /// Search results for the given query, most liked first. The loaded list is not replaced.
    pub async fn search(&mut self, q: &str, category: Option<&str>) -> Result<Vec<Video>, FeedError> {
        let query = CatalogQuery::Search {
            q: q.to_string(),
            category: category.map(str::to_string),
        };
        let result = self.catalog.fetch_videos(&query).await;
        self.report("Search", result)
    }

    /// Fetches captions and comments of the current video.
    pub async fn refresh_overlays(&mut self) -> Result<(), FeedError> {
        let Some(video_id) = self.current_id() else {
            return Ok(());
        };
        let result = futures::try_join!(
            self.catalog.captions(video_id),
            self.catalog.comments(video_id)
        );
        let (captions, comments) = self.report("Loading comments", result)?;
        self.feed.set_overlays(Overlays {
            video_id,
            captions,
            comments,
        });
        Ok(())
    }

    /// Likes or unlikes the current video. The local count changes only once the
    /// server confirmed it.
    pub async fn toggle_like(&mut self) -> Result<u64, FeedError> {
        let Some(video_id) = self.current_id() else {
            return Err(FeedError::NotFound(String::from("no current video")));
        };
        let liked = self.feed.is_liked(video_id);
        let result = if liked {
            self.catalog.unlike(video_id).await
        } else {
            self.catalog.like(video_id).await
        };
        let resp = self.report("Like", result)?;
        self.feed.confirm_likes(resp.id, resp.like_count, !liked);
        Ok(resp.like_count)
    }

    pub async fn rename_title(&mut self, title: &str) -> Result<(), FeedError> {
        let Some(video) = self.feed.current_video().cloned() else {
            return Err(FeedError::NotFound(String::from("no current video")));
        };
        let result = self.catalog.set_title(video.id, title).await;
        self.report("Title update", result)?;
        self.feed.apply_update(Video {
            title: title.to_string(),
            ..video
        });
        Ok(())
    }

    pub async fn rename_file(&mut self, file_name: &str) -> Result<(), FeedError> {
        let Some(video) = self.feed.current_video().cloned() else {
            return Err(FeedError::NotFound(String::from("no current video")));
        };
        let Some(file_name) = sanitize_file_name(file_name) else {
            let err = FeedError::Rejected(format!("invalid file name {file_name:?}"));
            self.feed.notify(err.to_string());
            return Err(err);
        };
        let result = self.catalog.set_file_name(video.id, &file_name).await;
        self.report("File name update", result)?;
        self.feed.apply_update(Video {
            url: video_url(&video.category, &file_name),
            file_name,
            ..video
        });
        Ok(())
    }

    pub async fn post_comment(&mut self, content: &str) -> Result<(), FeedError> {
        let Some(video_id) = self.current_id() else {
            return Err(FeedError::NotFound(String::from("no current video")));
        };
        let result = self.catalog.post_comment(video_id, content).await;
        self.report("Comment", result)?;

        let result = self.catalog.comments(video_id).await;
        let comments = self.report("Loading comments", result)?;
        self.feed.replace_comments(video_id, comments);
        Ok(())
    }

    pub async fn post_caption(&mut self, content: &str, time: f64) -> Result<Caption, FeedError> {
        let Some(video_id) = self.current_id() else {
            return Err(FeedError::NotFound(String::from("no current video")));
        };
        let body = NewCaption {
            video_id,
            content: content.to_string(),
            time,
        };
        let result = self.catalog.post_caption(&body).await;
        let caption = self.report("Caption", result)?;
        self.feed.push_caption(caption.clone());
        Ok(caption)
    }

    fn current_id(&self) -> Option<u64> {
        self.feed.current_video().map(|video| video.id)
    }

    fn after_navigation(&mut self, nav: Navigation) {
        if let Navigation::Moved(index) = nav {
            info!("Now showing #{index}");
            self.issue_warm();
            self.persist();
        }
    }

    fn issue_warm(&self) {
        let videos = self.feed.videos();
        let urls: Vec<String> = self
            .feed
            .warm_targets()
            .iter()
            .filter_map(|idx| videos.get(*idx))
            .map(|video| self.catalog.resource_url(video))
            .collect();
        self.warmup.warm(urls);
    }

    /// Turns a failed action into a transient notice; local state stays as it was.
    fn report<T>(&mut self, action: &str, result: Result<T, FeedError>) -> Result<T, FeedError> {
        if let Err(e) = &result {
            warn!("{action} failed: {e}");
            self.feed.notify(format!("{action} failed: {e}"));
        }
        result
    }

    fn persist(&self) {
        let Some(path) = &self.state_path else {
            return;
        };
        let state = ViewerState {
            last_viewed: self.feed.last_viewed(),
            mode: self.feed.state().mode,
            autoplay: self.feed.state().is_autoplay_on,
        };
        if let Err(e) = save_viewer_state(path, &state) {
            warn!("Could not save viewer state: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::controller::FeedSettings;
    use crate::download::manager::WarmupSettings;
    use crate::models::models::{Comment, LikeResponse};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Catalogue kept in memory; `fail_actions` makes every write fail.
    #[derive(Default)]
    struct MemoryCatalog {
        lists: HashMap<String, Vec<Video>>,
        likes: Mutex<HashMap<u64, u64>>,
        comments: Mutex<Vec<Comment>>,
        fail_actions: bool,
    }

    impl MemoryCatalog {
        fn with_category(category: &str, count: usize) -> Self {
            let videos = (0..count)
                .map(|n| Video {
                    id: n as u64 + 1,
                    url: format!("/{category}/v{n}.mp4"),
                    title: format!("v{n}"),
                    likes: 0,
                    category: category.to_string(),
                    file_name: format!("v{n}.mp4"),
                })
                .collect();
            let mut lists = HashMap::new();
            lists.insert(category.to_string(), videos);
            Self {
                lists,
                ..Self::default()
            }
        }

        fn check(&self) -> Result<(), FeedError> {
            if self.fail_actions {
                Err(FeedError::Status {
                    status: 500,
                    body: String::from("boom"),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl VideoCatalog for MemoryCatalog {
        async fn fetch_videos(&self, query: &CatalogQuery) -> Result<Vec<Video>, FeedError> {
            match query {
                CatalogQuery::Category(category) => self
                    .lists
                    .get(category)
                    .cloned()
                    .ok_or_else(|| FeedError::NotFound(category.clone())),
                CatalogQuery::Search { q, .. } => Ok(self
                    .lists
                    .values()
                    .flatten()
                    .filter(|video| video.title.contains(q.as_str()))
                    .cloned()
                    .collect()),
                _ => Ok(self.lists.values().flatten().cloned().collect()),
            }
        }

        async fn like(&self, video_id: u64) -> Result<LikeResponse, FeedError> {
            self.check()?;
            let mut likes = self.likes.lock();
            let count = likes.entry(video_id).or_default();
            *count += 1;
            Ok(LikeResponse {
                id: video_id,
                like_count: *count,
            })
        }

        async fn unlike(&self, video_id: u64) -> Result<LikeResponse, FeedError> {
            self.check()?;
            let mut likes = self.likes.lock();
            let count = likes.entry(video_id).or_default();
            *count = count.saturating_sub(1);
            Ok(LikeResponse {
                id: video_id,
                like_count: *count,
            })
        }

        async fn set_title(&self, _video_id: u64, _title: &str) -> Result<(), FeedError> {
            self.check()
        }

        async fn set_file_name(&self, _video_id: u64, _file_name: &str) -> Result<(), FeedError> {
            self.check()
        }

        async fn captions(&self, video_id: u64) -> Result<Vec<Caption>, FeedError> {
            Ok(vec![Caption {
                id: 1,
                video_id,
                content: String::from("first!"),
                time: 0.5,
            }])
        }

        async fn post_caption(&self, caption: &NewCaption) -> Result<Caption, FeedError> {
            self.check()?;
            Ok(Caption {
                id: 2,
                video_id: caption.video_id,
                content: caption.content.clone(),
                time: caption.time,
            })
        }

        async fn comments(&self, video_id: u64) -> Result<Vec<Comment>, FeedError> {
            Ok(self
                .comments
                .lock()
                .iter()
                .filter(|c| c.video_id == video_id)
                .cloned()
                .collect())
        }

        async fn post_comment(&self, video_id: u64, content: &str) -> Result<(), FeedError> {
            self.check()?;
            let mut comments = self.comments.lock();
            let id = comments.len() as u64 + 1;
            comments.push(Comment {
                id,
                video_id,
                content: content.to_string(),
                created_at: 0,
            });
            Ok(())
        }

        fn resource_url(&self, video: &Video) -> String {
            // Port 9 (discard) keeps warm-ups from reaching anything real.
            format!("http://127.0.0.1:9{}", video.url)
        }
    }

    fn session(catalog: MemoryCatalog) -> FeedSession<MemoryCatalog> {
        FeedSession::new(
            catalog,
            FeedController::with_seed(FeedSettings::default(), 42),
            WarmupManager::new(reqwest::Client::new(), WarmupSettings::default()),
        )
    }

    #[tokio::test]
    async fn load_then_navigate() {
        let mut session = session(MemoryCatalog::with_category("videos", 5));
        assert_eq!(session.load_category("videos").await, &FeedPhase::Ready);

        let start = session.feed().state().current_index;
        assert_eq!(session.swipe_forward(), Navigation::Moved((start + 1) % 5));
        assert_eq!(session.swipe_backward(), Navigation::Moved(start));
        assert_eq!(session.swipe_backward(), Navigation::NoEarlierVideo);
    }

    #[tokio::test]
    async fn unknown_category_is_an_error_state() {
        let mut session = session(MemoryCatalog::with_category("videos", 2));
        let phase = session.load_category("missing").await.clone();
        assert!(matches!(phase, FeedPhase::Error(_)));
    }

    #[tokio::test]
    async fn like_toggles_after_confirmation() {
        let mut session = session(MemoryCatalog::with_category("videos", 3));
        session.load_category("videos").await;

        assert_eq!(session.toggle_like().await.expect("like"), 1);
        let id = session.feed().current_video().map(|v| v.id).expect("current");
        assert!(session.feed().is_liked(id));
        assert_eq!(session.feed().current_video().map(|v| v.likes), Some(1));

        assert_eq!(session.toggle_like().await.expect("unlike"), 0);
        assert!(!session.feed().is_liked(id));
    }

    #[tokio::test]
    async fn failed_action_leaves_state_and_sets_notice() {
        let mut catalog = MemoryCatalog::with_category("videos", 3);
        catalog.fail_actions = true;
        let mut session = session(catalog);
        session.load_category("videos").await;
        let before = session.feed().current_video().cloned().expect("current");

        assert!(session.toggle_like().await.is_err());
        assert!(session.rename_title("new title").await.is_err());

        assert_eq!(session.feed().current_video(), Some(&before));
        let notice = session.take_notice().expect("notice");
        assert!(notice.contains("failed"));
    }

    #[tokio::test]
    async fn overlays_comments_and_captions() {
        let mut session = session(MemoryCatalog::with_category("videos", 3));
        session.load_category("videos").await;
        session.refresh_overlays().await.expect("overlays");
        assert_eq!(session.feed().captions_between(0.0, 1.0).len(), 1);

        session.post_comment("nice").await.expect("comment");
        let overlays = session.feed().overlays().expect("overlays");
        assert_eq!(overlays.comments.len(), 1);

        session.post_caption("wow", 3.0).await.expect("caption");
        assert_eq!(session.feed().captions_between(2.0, 4.0)[0].content, "wow");
    }

    #[tokio::test]
    async fn rename_file_updates_url() {
        let mut session = session(MemoryCatalog::with_category("videos", 2));
        session.load_category("videos").await;
        session.rename_file("sunset").await.expect("rename");

        let video = session.feed().current_video().expect("current");
        assert_eq!(video.file_name, "sunset.mp4");
        assert_eq!(video.url, "/videos/sunset.mp4");

        assert!(session.rename_file("../escape").await.is_err());
    }

    #[tokio::test]
    async fn viewer_state_resumes_last_video() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("viewer.json");

        let mut first = session(MemoryCatalog::with_category("videos", 6)).with_state_path(path.clone());
        first.load_category("videos").await;
        first.swipe_forward();
        first.toggle_mode();
        let remembered = first.feed().current_video().cloned().expect("current");

        let mut second = FeedSession::new(
            MemoryCatalog::with_category("videos", 6),
            FeedController::with_seed(FeedSettings::default(), 7),
            WarmupManager::new(reqwest::Client::new(), WarmupSettings::default()),
        )
        .with_state_path(path);
        second.load_category("videos").await;

        assert_eq!(second.feed().current_video(), Some(&remembered));
        assert_eq!(second.feed().state().mode, PlayMode::Randomized);
    }

    #[tokio::test]
    async fn search_does_not_replace_list() {
        let mut session = session(MemoryCatalog::with_category("videos", 12));
        session.load_category("videos").await;
        let hits = session.search("v11", None).await.expect("search");
        assert_eq!(hits.len(), 1);

        assert_eq!(session.select_from_search(&hits[0]), Navigation::Moved(11));
        assert_eq!(session.feed().videos().len(), 12);
    }
}
