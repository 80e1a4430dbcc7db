use std::collections::HashSet;

use rand::rngs::SmallRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Length of each look-ahead queue in randomized mode.
pub const DEFAULT_QUEUE_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PlayMode {
    #[default]
    Sequential,
    Randomized,
}

impl PlayMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Sequential => Self::Randomized,
            Self::Randomized => Self::Sequential,
        }
    }
}

/// Read-only view of the randomized queues.
///
/// `cursor` is the position in `primary` of the entry currently shown, or `None` when
/// forward navigation will start at `primary[0]`.
#[derive(Debug, Clone, Copy)]
pub struct QueueView<'a> {
    pub primary: &'a [usize],
    pub secondary: &'a [usize],
    pub cursor: Option<usize>,
}

impl QueueView<'_> {
    /// Primary entries that forward navigation will still yield, in order.
    pub fn upcoming(&self) -> &[usize] {
        let start = self.cursor.map_or(0, |c| c + 1);
        self.primary.get(start..).unwrap_or(&[])
    }
}

/// Decides which video comes next on forward navigation.
///
/// Sequential mode walks the list with wrap-around. Randomized mode keeps two look-ahead
/// queues (primary and secondary) so no video repeats until the pool of unplayed videos
/// runs dry, at which point the played set is forgotten and repeats are allowed again.
#[derive(Debug)]
pub struct QueuePlaybackEngine {
    mode: PlayMode,
    queue_size: usize,
    primary: Vec<usize>,
    secondary: Vec<usize>,
    cursor: Option<usize>,
    played: HashSet<usize>,
    rng: SmallRng,
}

impl QueuePlaybackEngine {
    pub fn new(queue_size: usize) -> Self {
        Self::with_rng(queue_size, SmallRng::from_os_rng())
    }

    /// Deterministic engine for reproducible sessions.
    pub fn with_seed(queue_size: usize, seed: u64) -> Self {
        Self::with_rng(queue_size, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(queue_size: usize, rng: SmallRng) -> Self {
        Self {
            mode: PlayMode::Sequential,
            queue_size: queue_size.max(1),
            primary: Vec::new(),
            secondary: Vec::new(),
            cursor: None,
            played: HashSet::new(),
            rng,
        }
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn queue_size(&self) -> usize {
        self.queue_size
    }

    /// Switching away from randomized mode throws the queues away; coming back
    /// regenerates them on the next `next_index` call.
    pub fn set_mode(&mut self, mode: PlayMode) {
        if self.mode == mode {
            return;
        }
        if self.mode == PlayMode::Randomized {
            self.discard();
        }
        self.mode = mode;
        debug!("Play mode: {:?}", mode);
    }

    /// Forgets queues and the played set, e.g. when the underlying list changes.
    pub fn discard(&mut self) {
        self.primary.clear();
        self.secondary.clear();
        self.cursor = None;
        self.played.clear();
    }

    /// Returning to a video through history keeps the queues but restarts the
    /// primary queue from its first entry.
    pub fn rewind(&mut self) {
        if self.mode == PlayMode::Randomized && !self.primary.is_empty() {
            self.cursor = None;
        }
    }

    /// Records that `index` has been shown in the current randomized round.
    pub fn mark_played(&mut self, index: usize) {
        if self.mode == PlayMode::Randomized {
            self.played.insert(index);
        }
    }

    pub fn played(&self) -> &HashSet<usize> {
        &self.played
    }

    pub fn view(&self) -> QueueView<'_> {
        QueueView {
            primary: &self.primary,
            secondary: &self.secondary,
            cursor: self.cursor,
        }
    }

    /// Next index to show after `current`. `None` only when the list is empty.
    pub fn next_index(&mut self, current: usize, video_count: usize) -> Option<usize> {
        if video_count == 0 {
            return None;
        }

        let next = match self.mode {
            PlayMode::Sequential => (current + 1) % video_count,
            PlayMode::Randomized => {
                // A single video has no alternative to itself.
                if video_count == 1 {
                    return Some(0);
                }
                self.next_randomized(current, video_count)
            }
        };
        self.mark_played(next);
        Some(next)
    }

    fn next_randomized(&mut self, current: usize, video_count: usize) -> usize {
        // 1) First use (or after a discard): build both queues.
        if self.primary.is_empty() {
            // The video on screen belongs to the round even if it was shown in sequential mode.
            self.played.insert(current);
            let mut exclude = self.played.clone();
            exclude.insert(current);
            self.primary = self.generate_queue(&exclude, current, video_count);

            exclude = self.played.clone();
            exclude.insert(current);
            exclude.extend(self.primary.iter().copied());
            self.secondary = self.generate_queue(&exclude, current, video_count);

            self.cursor = Some(0);
            debug!(
                "Generated queues primary={:?} secondary={:?}",
                self.primary, self.secondary
            );
            return self.primary[0];
        }

        // 2) Still inside the primary queue.
        let next_pos = self.cursor.map_or(0, |c| c + 1);
        if next_pos < self.primary.len() {
            self.cursor = Some(next_pos);
            return self.primary[next_pos];
        }

        // 3) Primary exhausted: promote secondary and draw a fresh one.
        self.primary = std::mem::take(&mut self.secondary);
        let mut exclude = self.played.clone();
        exclude.insert(current);
        exclude.extend(self.primary.iter().copied());
        self.secondary = self.generate_queue(&exclude, current, video_count);
        self.cursor = Some(0);
        debug!(
            "Promoted secondary queue primary={:?} secondary={:?}",
            self.primary, self.secondary
        );
        self.primary[0]
    }

    /// Draws `queue_size` indices from `[0, video_count)` minus `exclude` minus `current`.
    ///
    /// When that pool is smaller than a queue, the played set restarts at `{current}` and
    /// the pool becomes every index but `current`. A pool that still cannot fill a queue
    /// is padded by sampling with replacement.
    fn generate_queue(
        &mut self,
        exclude: &HashSet<usize>,
        current: usize,
        video_count: usize,
    ) -> Vec<usize> {
        let mut pool: Vec<usize> = (0..video_count)
            .filter(|idx| *idx != current && !exclude.contains(idx))
            .collect();

        if pool.len() < self.queue_size {
            debug!(
                "Only {} unplayed videos left, starting a new round",
                pool.len()
            );
            self.played.clear();
            self.played.insert(current);
            pool = (0..video_count).filter(|idx| *idx != current).collect();
        }

        pool.shuffle(&mut self.rng);
        let mut queue: Vec<usize> = pool.iter().take(self.queue_size).copied().collect();

        while queue.len() < self.queue_size {
            match pool.choose(&mut self.rng) {
                Some(idx) => queue.push(*idx),
                None => break,
            }
        }
        queue
    }
}

impl Default for QueuePlaybackEngine {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_SIZE)
    }
}
