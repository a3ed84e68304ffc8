//! services/api/src/web/reader.rs
//!
//! The e-book reader endpoints. Chapter 1 is free, the rest need a subscription.

use axum::{
    extract::{RawQuery, State},
    Extension, Json,
};
use coaching_core::reader::{Navigation, Reader, ReaderNotice};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::errors::{bad_request, port_error, ErrorBody, HandlerResult};
use crate::web::rest::not_configured;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct NoticeResponse {
    /// `locked` or `out_of_bounds`.
    pub kind: String,
    pub chapter: u32,
    pub message: String,
}

impl From<ReaderNotice> for NoticeResponse {
    fn from(notice: ReaderNotice) -> Self {
        let (kind, chapter) = match notice {
            ReaderNotice::Locked { chapter } => ("locked", chapter),
            ReaderNotice::OutOfBounds { chapter } => ("out_of_bounds", chapter),
        };
        Self {
            kind: kind.to_string(),
            chapter,
            message: notice.message(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ReaderResponse {
    pub chapter: u32,
    pub chapter_count: u32,
    pub title: String,
    pub body: String,
    /// Query string to put back into the page URL, e.g. `chapter=3`.
    pub query: String,
    pub subscribed: bool,
    pub notice: Option<NoticeResponse>,
}

#[derive(Deserialize, ToSchema)]
pub struct NavigateRequest {
    /// The chapter currently shown.
    pub from: u32,
    /// `next`, `prev` or `jump`.
    pub action: String,
    /// Target for `jump`.
    pub chapter: Option<u32>,
}

//=========================================================================================
// Helpers
//=========================================================================================

async fn open_reader(
    state: &AppState,
    user_id: Uuid,
    query: Option<&str>,
) -> HandlerResult<(Reader, Option<ReaderNotice>, bool)> {
    if state.book.is_empty() {
        return Err(not_configured("The book"));
    }
    let subscribed = state.subscribed(user_id).await.map_err(|e| port_error(&e))?;
    let (reader, notice) = Reader::open(state.book.len() as u32, subscribed, query);
    Ok((reader, notice, subscribed))
}

fn render(state: &AppState, reader: &Reader, subscribed: bool, notice: Option<ReaderNotice>) -> ReaderResponse {
    let index = reader.chapter().saturating_sub(1) as usize;
    let (title, body) = state
        .book
        .get(index)
        .map(|c| (c.title.clone(), c.body.clone()))
        .unwrap_or_default();
    ReaderResponse {
        chapter: reader.chapter(),
        chapter_count: reader.chapter_count(),
        title,
        body,
        query: reader.query(),
        subscribed,
        notice: notice.map(NoticeResponse::from),
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Open the reader at `?chapter=N`. Locked or invalid values open chapter 1.
#[utoipa::path(
    get,
    path = "/reader",
    params(("chapter" = Option<u32>, Query, description = "Chapter to open")),
    responses(
        (status = 200, description = "The chapter to show", body = ReaderResponse),
        (status = 503, description = "No book loaded", body = ErrorBody)
    )
)]
pub async fn reader_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    RawQuery(query): RawQuery,
) -> HandlerResult<Json<ReaderResponse>> {
    let (reader, notice, subscribed) = open_reader(&state, user_id, query.as_deref()).await?;
    Ok(Json(render(&state, &reader, subscribed, notice)))
}

/// Move to the next, previous or a specific chapter. A refused move returns
/// the unchanged chapter with a notice.
#[utoipa::path(
    post,
    path = "/reader/navigate",
    request_body = NavigateRequest,
    responses(
        (status = 200, description = "The chapter to show", body = ReaderResponse),
        (status = 400, description = "Unknown action", body = ErrorBody),
        (status = 503, description = "No book loaded", body = ErrorBody)
    )
)]
pub async fn navigate_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<NavigateRequest>,
) -> HandlerResult<Json<ReaderResponse>> {
    let from = format!("chapter={}", req.from);
    let (mut reader, _, subscribed) = open_reader(&state, user_id, Some(&from)).await?;

    let navigation = match (req.action.as_str(), req.chapter) {
        ("next", _) => reader.next(),
        ("prev", _) => reader.prev(),
        ("jump", Some(chapter)) => reader.jump(chapter),
        ("jump", None) => return Err(bad_request("jump needs a chapter")),
        (other, _) => return Err(bad_request(format!("Unknown action '{}'", other))),
    };
    let notice = match navigation {
        Navigation::Moved(_) => None,
        Navigation::Refused(notice) => Some(notice),
    };
    Ok(Json(render(&state, &reader, subscribed, notice)))
}
