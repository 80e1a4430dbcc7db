use crate::app::queue::{PlayMode, QueueView};

/// How many upcoming videos sequential mode keeps warm.
pub const DEFAULT_PRELOAD_WINDOW: usize = 3;

/// Primary entries past the cursor warmed in randomized mode.
const RANDOM_LOOKAHEAD: usize = 2;

/// Indices whose resources should be fetched ahead of time, nearest first.
///
/// Pure planning: the caller issues the fetches and skips resources that are already
/// loading or loaded. `current` is never part of the result.
pub fn resources_to_warm(
    current: usize,
    mode: PlayMode,
    queue: QueueView<'_>,
    video_count: usize,
    window: usize,
) -> Vec<usize> {
    if video_count <= 1 {
        return Vec::new();
    }

    let mut targets = Vec::new();
    let mut push = |idx: usize| {
        if idx != current && idx < video_count && !targets.contains(&idx) {
            targets.push(idx);
        }
    };

    match mode {
        PlayMode::Sequential => {
            for step in 1..=window {
                push((current + step) % video_count);
            }
        }
        PlayMode::Randomized => {
            let upcoming = queue.upcoming();
            for idx in upcoming.iter().take(RANDOM_LOOKAHEAD) {
                push(*idx);
            }
            // Close to the end of primary the secondary head is what comes next.
            if upcoming.len() <= 1 {
                if let Some(head) = queue.secondary.first() {
                    push(*head);
                }
            }
        }
    }

    targets
}
