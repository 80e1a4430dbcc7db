use std::io::{self, SeekFrom};
use std::path::Path as FsPath;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::task;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

use crate::models::models::{
    Caption, CommentsResponse, FileNameUpdate, LikeResponse, NewCaption, NewComment,
    SuccessResponse, TitleUpdate, Video,
};
use crate::service::library::RenameError;
use crate::service::state::AppState;
use crate::service::store::MetaStore;
use crate::utils::utils::{is_video_file, sanitize_file_name};

const TOP_LIMIT: usize = 20;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("requested range lies outside the {size} byte resource")]
    RangeNotSatisfiable { size: u64 },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiError::Io(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {self:#}");
        }
        let body = serde_json::json!({
            "error": status.canonical_reason().unwrap_or("Error"),
            "details": self.to_string(),
        });
        let mut response = (status, Json(body)).into_response();
        if let ApiError::RangeNotSatisfiable { size } = self {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Runs a store mutation off the async workers; every mutation writes the store file.
async fn with_store<T, F>(store: &Arc<MetaStore>, f: F) -> ApiResult<T>
where
    F: FnOnce(&MetaStore) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    let joined = task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    Ok(joined?)
}

// --- listings ------------------------------------------------------------------

pub async fn list_all(State(state): State<AppState>) -> ApiResult<Json<Vec<Video>>> {
    Ok(Json(state.all_videos().await?))
}

/// `GET /api/videos/{id}` where the segment names a category.
pub async fn list_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> ApiResult<Json<Vec<Video>>> {
    if !state.config.is_category(&category) {
        return Err(ApiError::NotFound(format!("category {category}")));
    }
    Ok(Json(state.videos_in(&category).await?))
}

pub async fn top20(State(state): State<AppState>) -> ApiResult<Json<Vec<Video>>> {
    let mut videos = state.all_videos().await?;
    videos.sort_by(|a, b| b.likes.cmp(&a.likes));
    videos.truncate(TOP_LIMIT);
    Ok(Json(videos))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub category: Option<String>,
}

/// Case-insensitive substring match on title or file name, most liked first.
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<Video>>> {
    let pool = match params.category.as_deref() {
        None | Some("") | Some("all") => state.all_videos().await?,
        Some(category) if state.config.is_category(category) => state.videos_in(category).await?,
        Some(category) => return Err(ApiError::NotFound(format!("category {category}"))),
    };

    let needle = params.q.trim().to_lowercase();
    let mut hits: Vec<Video> = pool
        .into_iter()
        .filter(|video| {
            video.title.to_lowercase().contains(&needle)
                || video.file_name.to_lowercase().contains(&needle)
        })
        .collect();
    hits.sort_by(|a, b| b.likes.cmp(&a.likes));
    Ok(Json(hits))
}

// --- per-video edits ---------------------------------------------------------

async fn change_likes(state: &AppState, id: u64, delta: i64) -> ApiResult<Json<LikeResponse>> {
    let likes = with_store(&state.store, move |store| store.add_likes(id, delta)).await?;
    match likes {
        Some(like_count) => Ok(Json(LikeResponse { id, like_count })),
        None => Err(ApiError::NotFound(format!("video {id}"))),
    }
}

pub async fn like(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Json<LikeResponse>> {
    change_likes(&state, id, 1).await
}

pub async fn unlike(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<LikeResponse>> {
    change_likes(&state, id, -1).await
}

pub async fn set_title(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(update): Json<TitleUpdate>,
) -> ApiResult<Json<SuccessResponse>> {
    let title = update.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::BadRequest(String::from("title must not be empty")));
    }
    let found = with_store(&state.store, move |store| store.set_title(id, &title)).await?;
    if !found {
        return Err(ApiError::NotFound(format!("video {id}")));
    }
    Ok(Json(SuccessResponse { success: true }))
}

/// Renames the file on disk. Ids, likes and overlays follow the file.
pub async fn set_file_name(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(update): Json<FileNameUpdate>,
) -> ApiResult<Json<SuccessResponse>> {
    let Some(new_name) = sanitize_file_name(&update.file_name) else {
        return Err(ApiError::BadRequest(format!(
            "invalid file name {:?}",
            update.file_name
        )));
    };
    let Some(video) = state.video(id).await? else {
        return Err(ApiError::NotFound(format!("video {id}")));
    };
    let (category, old_name) = (video.category, video.file_name);
    if old_name == new_name {
        return Ok(Json(SuccessResponse { success: true }));
    }

    state
        .library
        .rename(&category, &old_name, &new_name)
        .await
        .map_err(|e| match e {
            RenameError::Missing(name) => ApiError::NotFound(name),
            RenameError::Conflict(name) => ApiError::Conflict(format!("{name} already exists")),
            RenameError::Io(e) => ApiError::Io(e),
        })?;
    with_store(&state.store, move |store| store.rename(id, &new_name)).await?;
    Ok(Json(SuccessResponse { success: true }))
}

// --- comments and captions ---------------------------------------------------

pub async fn get_comments(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Json<CommentsResponse> {
    Json(CommentsResponse {
        comments: state.store.comments(id),
    })
}

pub async fn post_comment(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<NewComment>,
) -> ApiResult<Json<SuccessResponse>> {
    let content = body.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::BadRequest(String::from("comment must not be empty")));
    }
    if state.video(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("video {id}")));
    }
    with_store(&state.store, move |store| store.add_comment(id, &content)).await?;
    Ok(Json(SuccessResponse { success: true }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DanmakuQuery {
    pub video_id: u64,
}

pub async fn get_danmaku(
    State(state): State<AppState>,
    Query(query): Query<DanmakuQuery>,
) -> Json<Vec<Caption>> {
    Json(state.store.captions(query.video_id))
}

pub async fn post_danmaku(
    State(state): State<AppState>,
    Json(body): Json<NewCaption>,
) -> ApiResult<Json<Caption>> {
    if body.content.trim().is_empty() {
        return Err(ApiError::BadRequest(String::from("caption must not be empty")));
    }
    if !body.time.is_finite() || body.time < 0.0 {
        return Err(ApiError::BadRequest(format!("invalid caption time {}", body.time)));
    }
    let caption = with_store(&state.store, move |store| store.add_caption(&body)).await?;
    Ok(Json(caption))
}

// --- video bytes -------------------------------------------------------------

/// Serves `/{category}/{filename}`, honouring a single byte range.
///
/// Without a `Range` header the whole file is returned. Open-ended ranges are cut at
/// `max_chunk_bytes` so a player probing `bytes=0-` does not pull the entire file.
pub async fn stream_video(
    State(state): State<AppState>,
    Path((category, file_name)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    if !state.config.is_category(&category)
        || file_name.starts_with('.')
        || file_name.contains(['/', '\\'])
        || !is_video_file(FsPath::new(&file_name))
    {
        return Err(ApiError::NotFound(format!("{category}/{file_name}")));
    }

    let path = state.library.path_of(&category, &file_name);
    let meta = match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => meta,
        Ok(_) => return Err(ApiError::NotFound(format!("{category}/{file_name}"))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound(format!("{category}/{file_name}")))
        }
        Err(e) => return Err(e.into()),
    };
    let file_size = meta.len();

    let range_header = headers.get(header::RANGE).and_then(|val| val.to_str().ok());
    let Some(range_str) = range_header else {
        let file = File::open(&path).await?;
        let body = Body::from_stream(ReaderStream::new(file));
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "video/mp4")
            .header(header::CONTENT_LENGTH, file_size)
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::CACHE_CONTROL, "public, max-age=3600")
            .body(body)
            .map_err(|e| ApiError::Internal(e.into()));
    };

    let (start, end) = parse_range_header(range_str, file_size, state.config.max_chunk_bytes)?;
    let chunk_size = end - start + 1;

    let mut file = File::open(&path).await?;
    file.seek(SeekFrom::Start(start)).await?;
    let body = Body::from_stream(ReaderStream::new(file.take(chunk_size)));

    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_LENGTH, chunk_size)
        .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{file_size}"))
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, "public, max-age=3600")
        .body(body)
        .map_err(|e| ApiError::Internal(e.into()))
}

/// Resolves a `Range` header to an inclusive `(start, end)` pair within the file.
///
/// Accepts `bytes=a-b`, `bytes=a-` (capped at `max_chunk` bytes) and `bytes=-n`
/// (the last `n` bytes). Only the first range of a list is honoured.
fn parse_range_header(range_str: &str, file_size: u64, max_chunk: u64) -> ApiResult<(u64, u64)> {
    let Some(ranges) = range_str.trim().strip_prefix("bytes=") else {
        return Err(ApiError::BadRequest(format!("unsupported range {range_str:?}")));
    };
    let first = ranges.split(',').next().unwrap_or_default().trim();
    let Some((start_str, end_str)) = first.split_once('-') else {
        return Err(ApiError::BadRequest(format!("malformed range {range_str:?}")));
    };
    let parse = |raw: &str| {
        raw.trim()
            .parse::<u64>()
            .map_err(|_| ApiError::BadRequest(format!("malformed range {range_str:?}")))
    };
    let unsatisfiable = ApiError::RangeNotSatisfiable { size: file_size };

    if start_str.trim().is_empty() {
        let suffix = parse(end_str)?;
        if suffix == 0 || file_size == 0 {
            return Err(unsatisfiable);
        }
        return Ok((file_size - suffix.min(file_size), file_size - 1));
    }

    let start = parse(start_str)?;
    if start >= file_size {
        return Err(unsatisfiable);
    }
    let end = if end_str.trim().is_empty() {
        start.saturating_add(max_chunk.max(1) - 1)
    } else {
        let end = parse(end_str)?;
        if end < start {
            return Err(unsatisfiable);
        }
        end
    };
    Ok((start, end.min(file_size - 1)))
}

// --- middleware --------------------------------------------------------------

pub async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(req).await;

    let status = response.status();
    let elapsed = started.elapsed().as_millis();
    if status.is_server_error() {
        warn!("{method} {path} -> {} ({elapsed} ms)", status.as_u16());
    } else {
        info!("{method} {path} -> {} ({elapsed} ms)", status.as_u16());
    }
    response
}

/// Any origin may call the API; preflight requests are answered directly.
pub async fn cors(req: Request, next: Next) -> Response {
    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Range"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Content-Range, Content-Length, Accept-Ranges"),
    );
    response
}
