use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::discovery::models::CatalogQuery;
use crate::discovery::parsers::{is_valid_http_url, parse_base_url};
use crate::models::models::{
    Caption, Comment, CommentsResponse, FileNameUpdate, LikeResponse, NewCaption, NewComment,
    SuccessResponse, TitleUpdate, Video,
};
use crate::utils::errors::FeedError;

/// Everything the feed needs from the catalogue backend.
///
/// `CatalogGateway` is the HTTP implementation; the seam exists so the feed session can be
/// driven by an in-memory catalogue.
#[async_trait]
pub trait VideoCatalog: Send + Sync {
    async fn fetch_videos(&self, query: &CatalogQuery) -> Result<Vec<Video>, FeedError>;
    async fn like(&self, video_id: u64) -> Result<LikeResponse, FeedError>;
    async fn unlike(&self, video_id: u64) -> Result<LikeResponse, FeedError>;
    async fn set_title(&self, video_id: u64, title: &str) -> Result<(), FeedError>;
    async fn set_file_name(&self, video_id: u64, file_name: &str) -> Result<(), FeedError>;
    async fn captions(&self, video_id: u64) -> Result<Vec<Caption>, FeedError>;
    async fn post_caption(&self, caption: &NewCaption) -> Result<Caption, FeedError>;
    async fn comments(&self, video_id: u64) -> Result<Vec<Comment>, FeedError>;
    async fn post_comment(&self, video_id: u64, content: &str) -> Result<(), FeedError>;

    /// Absolute address of the video bytes, used by the player and the warm-up worker.
    fn resource_url(&self, video: &Video) -> String;
}

#[derive(Debug, Clone)]
pub struct CatalogGateway {
    client: Client,
    base: Url,
}

impl CatalogGateway {
    pub fn new(base_url: &str) -> Result<Self, FeedError> {
        if !is_valid_http_url(base_url) {
            return Err(FeedError::Rejected(format!("not an http(s) address: {base_url}")));
        }
        Ok(Self::with_client(Client::new(), parse_base_url(base_url)?))
    }

    pub fn with_client(client: Client, base: Url) -> Self {
        Self { client, base }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, FeedError> {
        Ok(self.base.join(path)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FeedError> {
        let url = self.endpoint(path)?;
        debug!("GET {url}");
        let resp = self.client.get(url).send().await?;
        read_json(resp).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, FeedError>
    where
        B: serde::Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!("POST {url}");
        let resp = self.client.post(url).json(body).send().await?;
        read_json(resp).await
    }
}

#[async_trait]
impl VideoCatalog for CatalogGateway {
    async fn fetch_videos(&self, query: &CatalogQuery) -> Result<Vec<Video>, FeedError> {
        match query {
            CatalogQuery::All => self.get_json("api/videos").await,
            CatalogQuery::Top20 => self.get_json("api/videos/top20").await,
            CatalogQuery::Category(category) => {
                let mut url = self.endpoint("api/videos/")?;
                url.path_segments_mut()
                    .map_err(|_| FeedError::Decode(String::from("base url cannot hold a path")))?
                    .pop_if_empty()
                    .push(category);
                debug!("GET {url}");
                read_json(self.client.get(url).send().await?).await
            }
            CatalogQuery::Search { q, category } => {
                let url = self.endpoint("api/search")?;
                let mut request = self.client.get(url).query(&[("q", q.as_str())]);
                if let Some(category) = category {
                    request = request.query(&[("category", category.as_str())]);
                }
                read_json(request.send().await?).await
            }
        }
    }

    async fn like(&self, video_id: u64) -> Result<LikeResponse, FeedError> {
        self.post_json(&format!("api/videos/{video_id}/like"), &serde_json::json!({}))
            .await
    }

    async fn unlike(&self, video_id: u64) -> Result<LikeResponse, FeedError> {
        self.post_json(&format!("api/videos/{video_id}/unlike"), &serde_json::json!({}))
            .await
    }

    async fn set_title(&self, video_id: u64, title: &str) -> Result<(), FeedError> {
        let body = TitleUpdate {
            title: title.to_string(),
        };
        let resp: SuccessResponse = self
            .post_json(&format!("api/videos/{video_id}/title"), &body)
            .await?;
        expect_success(resp, "title update")
    }

    async fn set_file_name(&self, video_id: u64, file_name: &str) -> Result<(), FeedError> {
        let body = FileNameUpdate {
            file_name: file_name.to_string(),
        };
        let resp: SuccessResponse = self
            .post_json(&format!("api/videos/{video_id}/file_name"), &body)
            .await?;
        expect_success(resp, "file name update")
    }

    async fn captions(&self, video_id: u64) -> Result<Vec<Caption>, FeedError> {
        let url = self.endpoint("api/danmaku")?;
        let resp = self
            .client
            .get(url)
            .query(&[("videoId", video_id)])
            .send()
            .await?;
        read_json(resp).await
    }

    async fn post_caption(&self, caption: &NewCaption) -> Result<Caption, FeedError> {
        self.post_json("api/danmaku", caption).await
    }

    async fn comments(&self, video_id: u64) -> Result<Vec<Comment>, FeedError> {
        let resp: CommentsResponse = self
            .get_json(&format!("api/videos/{video_id}/comment"))
            .await?;
        Ok(resp.comments)
    }

    async fn post_comment(&self, video_id: u64, content: &str) -> Result<(), FeedError> {
        let body = NewComment {
            content: content.to_string(),
        };
        let resp: SuccessResponse = self
            .post_json(&format!("api/videos/{video_id}/comment"), &body)
            .await?;
        expect_success(resp, "comment")
    }

    fn resource_url(&self, video: &Video) -> String {
        let relative = video.url.trim_start_matches('/');
        match self.base.join(relative) {
            Ok(url) => url.to_string(),
            Err(e) => {
                warn!("Could not build resource url for {}: {e}", video.url);
                video.url.clone()
            }
        }
    }
}

/// Maps non-2xx answers to `FeedError::Status` and decodes the JSON body otherwise.
async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, FeedError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(FeedError::Status {
            status: status.as_u16(),
            body,
        });
    }
    resp.json::<T>()
        .await
        .map_err(|e| FeedError::Decode(e.to_string()))
}

fn expect_success(resp: SuccessResponse, what: &str) -> Result<(), FeedError> {
    if resp.success {
        Ok(())
    } else {
        Err(FeedError::Rejected(format!("{what} was not applied")))
    }
}
