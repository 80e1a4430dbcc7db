use std::collections::HashSet;

use rand::rngs::SmallRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::app::history::{HistoryLog, DEFAULT_HISTORY_CAPACITY};
use crate::app::persisted::LastViewed;
use crate::app::preload::{resources_to_warm, DEFAULT_PRELOAD_WINDOW};
use crate::app::queue::{PlayMode, QueuePlaybackEngine, QueueView, DEFAULT_QUEUE_SIZE};
use crate::discovery::models::CatalogQuery;
use crate::models::models::{Caption, Comment, Video};
use crate::utils::errors::FeedError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSettings {
    pub queue_size: usize,
    pub history_capacity: usize,
    pub preload_window: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            preload_window: DEFAULT_PRELOAD_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeedPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedState {
    pub current_index: usize,
    pub mode: PlayMode,
    pub is_playing: bool,
    pub is_autoplay_on: bool,
}

/// Outcome of a navigation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Moved(usize),
    /// Backward navigation reached the oldest history entry
    NoEarlierVideo,
    /// The event does not apply in the current phase
    Ignored,
}

/// Identifies one catalogue request; responses carrying an older ticket are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Captions and comments of the video currently shown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlays {
    pub video_id: u64,
    pub captions: Vec<Caption>,
    pub comments: Vec<Comment>,
}

/// The feed's state machine.
///
/// Every user or player event enters through one method here and runs to completion;
/// asynchronous work (catalogue fetches, likes, overlays) is done by the caller, which
/// hands the results back through the `complete_*`/`confirm_*`/`set_*` methods.
#[derive(Debug)]
pub struct FeedController {
    phase: FeedPhase,
    state: FeedState,
    videos: Vec<Video>,
    query: Option<CatalogQuery>,
    pending_query: Option<CatalogQuery>,
    generation: u64,
    queue: QueuePlaybackEngine,
    history: HistoryLog,
    preload_window: usize,
    warm: Vec<usize>,
    resume: Option<LastViewed>,
    overlays: Option<Overlays>,
    liked: HashSet<u64>,
    notice: Option<String>,
    rng: SmallRng,
}

impl FeedController {
    pub fn new(settings: FeedSettings) -> Self {
        Self::build(
            settings,
            QueuePlaybackEngine::new(settings.queue_size),
            SmallRng::from_os_rng(),
        )
    }

    pub fn with_seed(settings: FeedSettings, seed: u64) -> Self {
        Self::build(
            settings,
            QueuePlaybackEngine::with_seed(settings.queue_size, seed),
            SmallRng::seed_from_u64(seed.wrapping_add(1)),
        )
    }

    fn build(settings: FeedSettings, queue: QueuePlaybackEngine, rng: SmallRng) -> Self {
        Self {
            phase: FeedPhase::Idle,
            state: FeedState::default(),
            videos: Vec::new(),
            query: None,
            pending_query: None,
            generation: 0,
            queue,
            history: HistoryLog::new(settings.history_capacity),
            preload_window: settings.preload_window,
            warm: Vec::new(),
            resume: None,
            overlays: None,
            liked: HashSet::new(),
            notice: None,
            rng,
        }
    }

    /// Applies remembered preferences from a previous run.
    pub fn restore(&mut self, resume: Option<LastViewed>, mode: PlayMode, autoplay: bool) {
        self.resume = resume;
        self.queue.set_mode(mode);
        self.state.mode = mode;
        self.state.is_autoplay_on = autoplay;
    }

    pub fn phase(&self) -> &FeedPhase {
        &self.phase
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub fn videos(&self) -> &[Video] {
        &self.videos
    }

    pub fn query(&self) -> Option<&CatalogQuery> {
        self.query.as_ref()
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn queue_view(&self) -> QueueView<'_> {
        self.queue.view()
    }

    /// Indices the preloader should keep warm for the current position.
    pub fn warm_targets(&self) -> &[usize] {
        &self.warm
    }

    pub fn current_video(&self) -> Option<&Video> {
        if self.phase != FeedPhase::Ready {
            return None;
        }
        self.videos.get(self.state.current_index)
    }

    /// Identity of the current video for resuming after a reload.
    pub fn last_viewed(&self) -> Option<LastViewed> {
        let category = self.query.as_ref().map(CatalogQuery::label)?;
        self.current_video()
            .map(|video| LastViewed::from_video(video, &category))
    }

    // --- catalogue loading -------------------------------------------------

    /// Starts a category or search change. Any response for an earlier ticket
    /// becomes stale from this point on.
    pub fn begin_load(&mut self, query: CatalogQuery) -> LoadTicket {
        self.generation += 1;
        info!("Loading {:?} (generation {})", query, self.generation);
        self.pending_query = Some(query);
        self.phase = FeedPhase::Loading;
        self.state.is_playing = false;
        self.warm.clear();
        self.overlays = None;
        LoadTicket {
            generation: self.generation,
        }
    }

    /// Hands the catalogue response back. Returns `false` when the response was stale
    /// and has been discarded.
    pub fn complete_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<Vec<Video>, FeedError>,
    ) -> bool {
        if ticket.generation != self.generation {
            debug!(
                "Discarding stale catalogue response (generation {} < {})",
                ticket.generation, self.generation
            );
            return false;
        }

        match result {
            Ok(videos) => {
                self.videos = videos;
                self.query = self.pending_query.take();
                self.history.reset();
                self.queue.discard();
                self.overlays = None;

                let start = self.pick_start_index();
                self.state.current_index = start;
                self.phase = FeedPhase::Ready;
                info!("Loaded {} videos, starting at {}", self.videos.len(), start);
                if !self.videos.is_empty() {
                    self.queue.mark_played(start);
                }
                self.refresh_warm();
            }
            Err(e) => {
                warn!("Failed to load videos: {e}");
                self.videos.clear();
                self.state.current_index = 0;
                self.warm.clear();
                self.phase = FeedPhase::Error(e.user_message());
            }
        }
        true
    }

    fn pick_start_index(&mut self) -> usize {
        if self.videos.is_empty() {
            return 0;
        }

        if let Some(resume) = &self.resume {
            if let Some(pos) = resume.position_in(&self.videos) {
                debug!("Resuming at remembered video {}", resume.id);
                return pos;
            }
        }

        let indices: Vec<usize> = (0..self.videos.len()).collect();
        indices.choose(&mut self.rng).copied().unwrap_or(0)
    }

    // --- navigation ---------------------------------------------------------

    pub fn swipe_forward(&mut self) -> Navigation {
        if self.phase != FeedPhase::Ready {
            return Navigation::Ignored;
        }
        let current = self.state.current_index;
        let Some(next) = self.queue.next_index(current, self.videos.len()) else {
            return Navigation::Ignored;
        };

        self.history.record(current);
        self.show(next);
        Navigation::Moved(next)
    }

    pub fn swipe_backward(&mut self) -> Navigation {
        if self.phase != FeedPhase::Ready {
            return Navigation::Ignored;
        }
        let Some(previous) = self.history.previous() else {
            self.notice = Some(String::from("No earlier video"));
            return Navigation::NoEarlierVideo;
        };
        if previous >= self.videos.len() {
            return Navigation::Ignored;
        }

        self.queue.rewind();
        self.show(previous);
        Navigation::Moved(previous)
    }

    /// The player reached the end of the current video.
    pub fn video_ended(&mut self) -> Navigation {
        if self.state.is_autoplay_on {
            self.swipe_forward()
        } else {
            self.state.is_playing = false;
            Navigation::Ignored
        }
    }

    pub fn toggle_mode(&mut self) -> PlayMode {
        let mode = self.state.mode.toggled();
        self.queue.set_mode(mode);
        self.state.mode = mode;
        self.refresh_warm();
        mode
    }

    pub fn toggle_autoplay(&mut self) -> bool {
        self.state.is_autoplay_on = !self.state.is_autoplay_on;
        self.state.is_autoplay_on
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.state.is_playing = playing;
    }

    /// Jumps to a search hit inside the loaded list, matching by id, then url, then
    /// file name. History and queues are left alone; a hit that is not in the list is ignored.
    pub fn select_from_search(&mut self, hit: &Video) -> Navigation {
        if self.phase != FeedPhase::Ready {
            return Navigation::Ignored;
        }
        let position = self
            .videos
            .iter()
            .position(|video| video.id == hit.id)
            .or_else(|| self.videos.iter().position(|video| video.url == hit.url))
            .or_else(|| {
                self.videos
                    .iter()
                    .position(|video| video.file_name == hit.file_name)
            });

        match position {
            Some(idx) => {
                self.show(idx);
                Navigation::Moved(idx)
            }
            None => {
                debug!("Search hit {} is not in the loaded list", hit.id);
                Navigation::Ignored
            }
        }
    }

    fn show(&mut self, index: usize) {
        self.state.current_index = index;
        self.overlays = None;
        self.queue.mark_played(index);
        self.refresh_warm();
    }

    fn refresh_warm(&mut self) {
        self.warm = match self.phase {
            FeedPhase::Ready => resources_to_warm(
                self.state.current_index,
                self.state.mode,
                self.queue.view(),
                self.videos.len(),
                self.preload_window,
            ),
            _ => Vec::new(),
        };
    }

    // --- per-video data -----------------------------------------------------

    /// Replaces the loaded copy of an edited video.
    pub fn apply_update(&mut self, updated: Video) -> bool {
        match self.videos.iter_mut().find(|video| video.id == updated.id) {
            Some(slot) => {
                *slot = updated;
                true
            }
            None => false,
        }
    }

    /// Server-confirmed like count.
    pub fn confirm_likes(&mut self, video_id: u64, like_count: u64, liked: bool) {
        if let Some(video) = self.videos.iter_mut().find(|video| video.id == video_id) {
            video.likes = like_count;
        }
        if liked {
            self.liked.insert(video_id);
        } else {
            self.liked.remove(&video_id);
        }
    }

    pub fn is_liked(&self, video_id: u64) -> bool {
        self.liked.contains(&video_id)
    }

    pub fn overlays(&self) -> Option<&Overlays> {
        self.overlays.as_ref()
    }

    /// Stores overlays fetched for `overlays.video_id`, unless the viewer moved on meanwhile.
    pub fn set_overlays(&mut self, mut overlays: Overlays) -> bool {
        if self.current_video().map(|video| video.id) != Some(overlays.video_id) {
            return false;
        }
        overlays
            .captions
            .sort_by(|a, b| a.time.total_cmp(&b.time));
        self.overlays = Some(overlays);
        true
    }

    pub fn push_caption(&mut self, caption: Caption) -> bool {
        match self.overlays.as_mut() {
            Some(overlays) if overlays.video_id == caption.video_id => {
                let at = overlays
                    .captions
                    .partition_point(|existing| existing.time <= caption.time);
                overlays.captions.insert(at, caption);
                true
            }
            _ => false,
        }
    }

    /// Replaces the comment list after a refetch, if it still belongs to the current video.
    pub fn replace_comments(&mut self, video_id: u64, comments: Vec<Comment>) -> bool {
        match self.overlays.as_mut() {
            Some(overlays) if overlays.video_id == video_id => {
                overlays.comments = comments;
                true
            }
            _ => false,
        }
    }

    /// Captions due in the playback interval `[from, to)`.
    pub fn captions_between(&self, from: f64, to: f64) -> &[Caption] {
        let Some(overlays) = &self.overlays else {
            return &[];
        };
        let start = overlays.captions.partition_point(|c| c.time < from);
        let end = overlays.captions.partition_point(|c| c.time < to);
        &overlays.captions[start..end.max(start)]
    }

    /// Transient, user-visible message (failed actions, history boundary).
    pub fn notify(&mut self, message: impl Into<String>) {
        self.notice = Some(message.into());
    }

    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }
}

impl Default for FeedController {
    fn default() -> Self {
        Self::new(FeedSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn videos(category: &str, count: usize) -> Vec<Video> {
        (0..count)
            .map(|n| Video {
                id: n as u64 + 1,
                url: format!("/{category}/clip_{n}.mp4"),
                title: format!("clip_{n}"),
                likes: 0,
                category: category.to_string(),
                file_name: format!("clip_{n}.mp4"),
            })
            .collect()
    }

    fn ready(count: usize, seed: u64) -> FeedController {
        let mut feed = FeedController::with_seed(FeedSettings::default(), seed);
        let ticket = feed.begin_load(CatalogQuery::Category(String::from("videos")));
        assert!(feed.complete_load(ticket, Ok(videos("videos", count))));
        feed
    }

    fn jump_to(feed: &mut FeedController, index: usize) {
        let hit = feed.videos()[index].clone();
        assert_eq!(feed.select_from_search(&hit), Navigation::Moved(index));
    }

    #[test]
    fn load_picks_index_in_range() {
        let feed = ready(10, 4);
        assert_eq!(feed.phase(), &FeedPhase::Ready);
        assert!(feed.state().current_index < 10);
    }

    #[test]
    fn empty_list_is_ready_with_nothing_to_show() {
        let mut feed = ready(0, 1);
        assert_eq!(feed.state().current_index, 0);
        assert!(feed.current_video().is_none());
        assert_eq!(feed.swipe_forward(), Navigation::Ignored);
    }

    #[test]
    fn sequential_forward_records_history() {
        let mut feed = ready(4, 2);
        jump_to(&mut feed, 3);

        assert_eq!(feed.swipe_forward(), Navigation::Moved(0));
        assert_eq!(feed.swipe_forward(), Navigation::Moved(1));
        assert_eq!(feed.history().entries().collect::<Vec<_>>(), vec![3, 0]);
    }

    #[test]
    fn backward_replays_history_then_reports_boundary() {
        let mut feed = ready(6, 2);
        jump_to(&mut feed, 0);
        feed.swipe_forward();
        feed.swipe_forward();

        assert_eq!(feed.swipe_backward(), Navigation::Moved(1));
        assert_eq!(feed.swipe_backward(), Navigation::Moved(0));
        assert_eq!(feed.swipe_backward(), Navigation::NoEarlierVideo);
        assert_eq!(feed.take_notice().as_deref(), Some("No earlier video"));
        assert_eq!(feed.state().current_index, 0);
    }

    #[test]
    fn backward_on_fresh_feed_is_a_no_op() {
        let mut feed = ready(6, 2);
        let before = feed.state().current_index;
        assert_eq!(feed.swipe_backward(), Navigation::NoEarlierVideo);
        assert_eq!(feed.history().cursor(), None);
        assert_eq!(feed.state().current_index, before);
    }

    #[test]
    fn history_return_rewinds_random_queue() {
        let mut feed = ready(30, 8);
        feed.toggle_mode();
        let first = match feed.swipe_forward() {
            Navigation::Moved(idx) => idx,
            other => panic!("unexpected {other:?}"),
        };
        feed.swipe_forward();

        feed.swipe_backward();
        assert_eq!(feed.queue_view().cursor, None);
        assert_eq!(feed.swipe_forward(), Navigation::Moved(first));
    }

    #[test]
    fn autoplay_end_advances_only_when_enabled() {
        let mut feed = ready(5, 3);
        jump_to(&mut feed, 1);
        assert_eq!(feed.video_ended(), Navigation::Ignored);
        assert_eq!(feed.state().current_index, 1);

        assert!(feed.toggle_autoplay());
        assert_eq!(feed.video_ended(), Navigation::Moved(2));
    }

    #[test]
    fn mode_toggle_clears_queues() {
        let mut feed = ready(30, 5);
        feed.toggle_mode();
        feed.swipe_forward();
        feed.swipe_forward();
        assert!(!feed.queue_view().primary.is_empty());

        assert_eq!(feed.toggle_mode(), PlayMode::Sequential);
        assert!(feed.queue_view().primary.is_empty());

        assert_eq!(feed.toggle_mode(), PlayMode::Randomized);
        feed.swipe_forward();
        assert_eq!(feed.queue_view().cursor, Some(0));
    }

    #[test]
    fn stale_load_is_discarded() {
        let mut feed = FeedController::with_seed(FeedSettings::default(), 9);
        let slow = feed.begin_load(CatalogQuery::Category(String::from("videos1")));
        let fast = feed.begin_load(CatalogQuery::Category(String::from("videos2")));

        assert!(feed.complete_load(fast, Ok(videos("videos2", 3))));
        assert!(!feed.complete_load(slow, Ok(videos("videos1", 10))));

        assert_eq!(feed.videos().len(), 3);
        assert_eq!(
            feed.query(),
            Some(&CatalogQuery::Category(String::from("videos2")))
        );
    }

    #[test]
    fn category_switch_recomputes_index_for_new_list() {
        let mut feed = ready(10, 6);
        jump_to(&mut feed, 9);
        feed.swipe_forward();

        let ticket = feed.begin_load(CatalogQuery::Category(String::from("videos2")));
        feed.complete_load(ticket, Ok(videos("videos2", 3)));

        assert!(feed.state().current_index < 3);
        assert!(feed.history().is_empty());
        assert!(feed.current_video().is_some());
    }

    #[test]
    fn failed_load_enters_error_and_recovers() {
        let mut feed = FeedController::with_seed(FeedSettings::default(), 1);
        let ticket = feed.begin_load(CatalogQuery::All);
        feed.complete_load(ticket, Err(FeedError::Decode(String::from("bad json"))));
        assert!(matches!(feed.phase(), FeedPhase::Error(_)));
        assert_eq!(feed.swipe_forward(), Navigation::Ignored);

        let ticket = feed.begin_load(CatalogQuery::All);
        feed.complete_load(ticket, Ok(videos("videos", 2)));
        assert_eq!(feed.phase(), &FeedPhase::Ready);
    }

    #[test]
    fn resume_prefers_remembered_video() {
        let mut feed = FeedController::with_seed(FeedSettings::default(), 1);
        let list = videos("videos", 8);
        feed.restore(
            Some(LastViewed::from_video(&list[5], "videos")),
            PlayMode::Sequential,
            false,
        );
        let ticket = feed.begin_load(CatalogQuery::Category(String::from("videos")));
        feed.complete_load(ticket, Ok(list));
        assert_eq!(feed.state().current_index, 5);
    }

    #[test]
    fn resume_id_match_beats_earlier_shared_title() {
        let mut list = videos("videos", 3);
        list[0].title = String::from("clip");
        list[1].title = String::from("other");
        list[2].id = 5;
        list[2].title = String::from("clip");

        let mut feed = FeedController::with_seed(FeedSettings::default(), 1);
        feed.restore(
            Some(LastViewed::from_video(&list[2], "videos")),
            PlayMode::Sequential,
            false,
        );
        let ticket = feed.begin_load(CatalogQuery::Category(String::from("videos")));
        feed.complete_load(ticket, Ok(list));
        assert_eq!(feed.state().current_index, 2);
        assert_eq!(feed.current_video().map(|v| v.id), Some(5));
    }

    #[test]
    fn search_selection_leaves_history_alone() {
        let mut feed = ready(6, 2);
        jump_to(&mut feed, 0);
        feed.swipe_forward();
        let history_before: Vec<usize> = feed.history().entries().collect();

        let mut hit = feed.videos()[4].clone();
        hit.id = 999;
        assert_eq!(feed.select_from_search(&hit), Navigation::Moved(4));
        assert_eq!(feed.history().entries().collect::<Vec<_>>(), history_before);

        let missing = Video {
            id: 1000,
            url: String::from("/videos/nope.mp4"),
            file_name: String::from("nope.mp4"),
            ..hit
        };
        assert_eq!(feed.select_from_search(&missing), Navigation::Ignored);
        assert_eq!(feed.state().current_index, 4);
    }

    #[test]
    fn warm_targets_follow_position() {
        let mut feed = ready(10, 2);
        jump_to(&mut feed, 8);
        assert_eq!(feed.warm_targets(), &[9, 0, 1]);
    }

    #[test]
    fn going_back_in_random_mode_warms_the_queue_head() {
        let mut feed = ready(20, 6);
        feed.toggle_mode();
        feed.swipe_forward();
        feed.swipe_forward();

        assert!(matches!(feed.swipe_backward(), Navigation::Moved(_)));
        let view = feed.queue_view();
        assert_eq!(view.cursor, None);
        assert_eq!(feed.warm_targets(), &view.primary[..2]);
    }

    #[test]
    fn overlays_for_other_video_are_rejected() {
        let mut feed = ready(3, 2);
        jump_to(&mut feed, 0);
        let current_id = feed.current_video().map(|v| v.id).expect("current");

        assert!(!feed.set_overlays(Overlays {
            video_id: current_id + 1,
            ..Overlays::default()
        }));
        assert!(feed.set_overlays(Overlays {
            video_id: current_id,
            captions: vec![
                Caption { id: 2, video_id: current_id, content: String::from("late"), time: 9.0 },
                Caption { id: 1, video_id: current_id, content: String::from("early"), time: 1.0 },
            ],
            comments: Vec::new(),
        }));

        let due = feed.captions_between(0.0, 5.0);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].content, "early");

        feed.swipe_forward();
        assert!(feed.overlays().is_none());
    }

    #[test]
    fn likes_update_in_place() {
        let mut feed = ready(3, 2);
        feed.confirm_likes(2, 41, true);
        assert_eq!(feed.videos()[1].likes, 41);
        assert!(feed.is_liked(2));

        let mut renamed = feed.videos()[1].clone();
        renamed.title = String::from("renamed");
        assert!(feed.apply_update(renamed));
        assert_eq!(feed.videos()[1].title, "renamed");
    }
}
