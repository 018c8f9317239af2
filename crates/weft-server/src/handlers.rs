use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use weft_core::ids::{CommunityId, ThreadId, UserId};
use weft_core::invalidate::PathInvalidator;
use weft_store::activity::{ActivityEntry, ActivityRepo};
use weft_store::comments::CommentRepo;
use weft_store::threads::{ThreadNode, ThreadPage, ThreadRepo};
use weft_store::users::{UserPage, UserRepo, UserRow};
use weft_store::{Database, StoreError, ThreadError};

use crate::server::AppState;

/// Repositories shared by all handlers over one database handle.
pub struct HandlerState {
    pub users: UserRepo,
    pub threads: ThreadRepo,
    pub comments: CommentRepo,
    pub activity: ActivityRepo,
    pub default_page_size: u32,
}

impl HandlerState {
    pub fn new(
        db: Database,
        invalidator: Arc<dyn PathInvalidator>,
        default_page_size: u32,
    ) -> Self {
        Self {
            users: UserRepo::new(db.clone()),
            threads: ThreadRepo::new(db.clone(), invalidator.clone()),
            comments: CommentRepo::new(db.clone(), invalidator),
            activity: ActivityRepo::new(db),
            default_page_size,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

fn thread_error_response(err: ThreadError) -> Response {
    let status = if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    tracing::warn!(kind = err.kind(), error = %err, "request failed");
    let body = ErrorBody {
        error: err.to_string(),
        kind: err.kind().to_string(),
    };
    (status, Json(body)).into_response()
}

fn store_error_response(err: StoreError) -> Response {
    let status = match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::warn!(error = %err, "request failed");
    let body = ErrorBody {
        error: err.to_string(),
        kind: "store_error".to_string(),
    };
    (status, Json(body)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct UpsertUserRequest {
    pub auth_id: String,
    pub name: String,
    pub username: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub onboarded: bool,
}

pub async fn upsert_user(
    State(state): State<AppState>,
    Json(req): Json<UpsertUserRequest>,
) -> Response {
    let result: Result<UserRow, StoreError> = state.handler_state.users.upsert(
        &req.auth_id,
        &req.name,
        &req.username,
        &req.image,
        req.onboarded,
    );
    match result {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(err) => store_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct UserSearchQuery {
    pub user_id: UserId,
    #[serde(default)]
    pub q: String,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

pub async fn fetch_users(
    State(state): State<AppState>,
    Query(query): Query<UserSearchQuery>,
) -> Response {
    let page = query.page.unwrap_or(1);
    let page_size = query
        .page_size
        .unwrap_or(state.handler_state.default_page_size);
    let result: Result<UserPage, StoreError> =
        state
            .handler_state
            .users
            .fetch_users(&query.user_id, &query.q, page, page_size);
    match result {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(err) => store_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateThreadRequest {
    pub text: String,
    pub author_id: UserId,
    pub community_id: Option<CommunityId>,
    pub path: String,
}

pub async fn create_thread(
    State(state): State<AppState>,
    Json(req): Json<CreateThreadRequest>,
) -> Response {
    let result = state.handler_state.threads.create_thread(
        &req.text,
        &req.author_id,
        req.community_id.as_ref(),
        &req.path,
    );
    match result {
        Ok(row) => (StatusCode::CREATED, Json(row)).into_response(),
        Err(err) => thread_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

pub async fn fetch_posts(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Response {
    let page = query.page.unwrap_or(1);
    let page_size = query
        .page_size
        .unwrap_or(state.handler_state.default_page_size);
    let result: Result<ThreadPage, ThreadError> =
        state.handler_state.threads.fetch_posts(page, page_size);
    match result {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(err) => thread_error_response(err),
    }
}

pub async fn fetch_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let id = ThreadId::from_raw(id);
    let result: Result<ThreadNode, ThreadError> =
        state.handler_state.threads.fetch_thread_by_id(&id);
    match result {
        Ok(node) => (StatusCode::OK, Json(node)).into_response(),
        Err(err) => thread_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    pub text: String,
    pub author_id: UserId,
    pub path: String,
}

pub async fn add_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AddCommentRequest>,
) -> Response {
    let thread_id = ThreadId::from_raw(id);
    let result = state
        .handler_state
        .comments
        .add_comment(&thread_id, &req.text, &req.author_id, &req.path);
    match result {
        Ok(row) => (StatusCode::CREATED, Json(row)).into_response(),
        Err(err) => thread_error_response(err),
    }
}

pub async fn get_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let user_id = UserId::from_raw(id);
    let result: Result<Vec<ActivityEntry>, ThreadError> =
        state.handler_state.activity.get_activity(&user_id);
    match result {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(err) => thread_error_response(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let resp = thread_error_response(ThreadError::NotFound("thread thr_x".into()));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn creation_failure_maps_to_500() {
        let resp = thread_error_response(ThreadError::CreationFailure {
            source: StoreError::Database("disk full".into()),
        });
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn create_thread_request_parses() {
        let json = r#"{
            "text": "hello",
            "author_id": "user_123",
            "community_id": null,
            "path": "/"
        }"#;
        let req: CreateThreadRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.text, "hello");
        assert!(req.community_id.is_none());
    }

    #[test]
    fn add_comment_request_parses() {
        let json = r#"{"text": "nice post", "author_id": "user_123", "path": "/thread/thr_1"}"#;
        let req: AddCommentRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.text, "nice post");
        assert_eq!(req.path, "/thread/thr_1");
    }

    #[test]
    fn user_search_query_defaults() {
        let json = r#"{"user_id": "user_123"}"#;
        let query: UserSearchQuery = serde_json::from_str(json).unwrap();
        assert_eq!(query.q, "");
        assert!(query.page.is_none());
    }

    #[test]
    fn upsert_user_request_defaults() {
        let json = r#"{"auth_id": "auth-1", "name": "Ada", "username": "ada"}"#;
        let req: UpsertUserRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.image, "");
        assert!(!req.onboarded);
    }
}
