use std::ffi::OsStr;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub const VIDEO_EXTENSION: &str = "mp4";

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case(VIDEO_EXTENSION))
}

/// Display title derived from a file name: the name without its `.mp4` suffix.
pub fn title_from_file_name(file_name: &str) -> String {
    let lower = file_name.to_ascii_lowercase();
    match lower.strip_suffix(".mp4") {
        Some(stem) => file_name[..stem.len()].to_string(),
        None => file_name.to_string(),
    }
}

/// Validates a user-supplied file name for a rename inside a category directory.
///
/// Returns `None` for names that could escape the directory or are otherwise unusable.
/// A missing `.mp4` extension is appended.
pub fn sanitize_file_name(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty()
        || trimmed.starts_with('.')
        || trimmed.contains(['/', '\\', '\0'])
        || trimmed.contains("..")
    {
        return None;
    }

    if is_video_file(Path::new(trimmed)) {
        Some(trimmed.to_string())
    } else {
        Some(format!("{trimmed}.{VIDEO_EXTENSION}"))
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_strips_extension_case_insensitively() {
        assert_eq!(title_from_file_name("Holiday.MP4"), "Holiday");
        assert_eq!(title_from_file_name("clip.mp4"), "clip");
        assert_eq!(title_from_file_name("notes.txt"), "notes.txt");
    }

    #[test]
    fn sanitize_rejects_traversal_and_separators() {
        assert_eq!(sanitize_file_name("../etc/passwd"), None);
        assert_eq!(sanitize_file_name("a/b.mp4"), None);
        assert_eq!(sanitize_file_name(r"a\b.mp4"), None);
        assert_eq!(sanitize_file_name(".hidden.mp4"), None);
        assert_eq!(sanitize_file_name("   "), None);
    }

    #[test]
    fn sanitize_appends_missing_extension() {
        assert_eq!(sanitize_file_name(" beach day "), Some(String::from("beach day.mp4")));
        assert_eq!(sanitize_file_name("beach.Mp4"), Some(String::from("beach.Mp4")));
    }
}
