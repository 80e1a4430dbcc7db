use serde::{Deserialize, Serialize};

/// A playable entry of the catalogue.
///
/// `likes`, `title` and `file_name` can change after the list was fetched (edits issued
/// from the feed); the feed reflects those by replacing the record in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    /// Stable, server-assigned identifier
    pub id: u64,

    /// Resource locator of the MP4 bytes, relative to the server root (`/{category}/{file}`)
    pub url: String,

    pub title: String,
    pub likes: u64,
    pub category: String,
    pub file_name: String,
}

/// A timestamped caption ("danmaku") shown over a video while it plays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caption {
    pub id: u64,
    pub video_id: u64,
    pub content: String,
    /// Playback position in seconds
    pub time: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub video_id: u64,
    pub content: String,
    /// Unix seconds
    pub created_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeResponse {
    pub id: u64,
    pub like_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentsResponse {
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleUpdate {
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileNameUpdate {
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub content: String,
}

/// Body of `POST /api/danmaku`. The client side of this endpoint speaks camelCase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCaption {
    pub video_id: u64,
    pub content: String,
    pub time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_uses_snake_case_file_name_on_the_wire() {
        let video = Video {
            id: 7,
            url: String::from("/videos/a%20b.mp4"),
            title: String::from("a b"),
            likes: 3,
            category: String::from("videos"),
            file_name: String::from("a b.mp4"),
        };
        let json = serde_json::to_value(&video).expect("serialize");
        assert_eq!(json["file_name"], "a b.mp4");
        assert_eq!(json["likes"], 3);
    }

    #[test]
    fn new_caption_reads_camel_case_video_id() {
        let body: NewCaption =
            serde_json::from_str(r#"{"videoId": 4, "content": "hi", "time": 1.5}"#).expect("parse");
        assert_eq!(body.video_id, 4);
        assert_eq!(body.time, 1.5);
    }
}
