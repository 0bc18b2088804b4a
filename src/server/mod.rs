//! HTTP server: JSON API, article pages and the static front end

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::content::{ArticleMeta, ArticleRecord, Rendered};
use crate::helpers::{html_escape, time_tag};
use crate::store::{Draft, StoreError, WriteError};
use crate::{AdminError, Blog};

type SharedBlog = Arc<Blog>;

/// Build the application router
pub fn router(blog: SharedBlog) -> Router {
    let public_dir = blog.public_dir.clone();

    Router::new()
        .route("/api/posts", get(list_posts))
        .route("/api/posts/:slug", get(show_post))
        .route("/api/tags", get(list_tags))
        .route("/blog/:slug", get(article_page))
        .route("/api/admin/login", post(login))
        .route("/api/admin/posts", get(admin_list).post(admin_create))
        .route(
            "/api/admin/posts/:slug",
            get(admin_show).put(admin_update).delete(admin_delete),
        )
        .fallback_service(ServeDir::new(public_dir).append_index_html_on_directories(true))
        .layer(TraceLayer::new_for_http())
        .with_state(blog)
}

/// Start the server
pub async fn start(blog: Blog, ip: &str, port: u16) -> Result<()> {
    let bind_ip = if ip == "localhost" { "127.0.0.1" } else { ip };
    let addr: SocketAddr = format!("{}:{}", bind_ip, port).parse()?;

    let app = router(Arc::new(blog));

    println!("Server running at http://{}:{}", ip, port);
    println!("Press Ctrl+C to stop.");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// JSON error body
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Errors a handler can answer with
enum ApiError {
    NotFound(String),
    Unauthorized,
    Invalid(String),
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(slug) => ApiError::NotFound(slug),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AdminError> for ApiError {
    fn from(e: AdminError) -> Self {
        match e {
            AdminError::Unauthorized => ApiError::Unauthorized,
            AdminError::Write(WriteError::Validation(msg)) => ApiError::Invalid(msg),
            AdminError::Write(other) => ApiError::Internal(other.to_string()),
            AdminError::Store(store) => store.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::NotFound(slug) => {
                (StatusCode::NOT_FOUND, format!("Article not found: {}", slug))
            }
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Not authenticated".to_string()),
            ApiError::Invalid(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::Internal(msg) => {
                tracing::warn!("Request failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct TagQuery {
    tag: Option<String>,
}

async fn list_posts(
    State(blog): State<SharedBlog>,
    Query(query): Query<TagQuery>,
) -> Json<Vec<ArticleMeta>> {
    match query.tag.as_deref().filter(|t| !t.is_empty()) {
        Some(tag) => Json(blog.by_tag(tag).await),
        None => Json(blog.list_published().await),
    }
}

/// Article with its compiled body
#[derive(Debug, Serialize)]
struct ArticlePayload {
    article: ArticleRecord,
    content: Rendered,
}

async fn show_post(
    State(blog): State<SharedBlog>,
    Path(slug): Path<String>,
) -> Result<Json<ArticlePayload>, ApiError> {
    let (article, content) = blog.render_by_slug(&slug).await?;
    Ok(Json(ArticlePayload { article, content }))
}

async fn list_tags(State(blog): State<SharedBlog>) -> Json<Vec<String>> {
    Json(blog.all_tags().await)
}

async fn article_page(State(blog): State<SharedBlog>, Path(slug): Path<String>) -> Response {
    match blog.render_by_slug(&slug).await {
        Ok((record, rendered)) => Html(article_html(&blog, &record, &rendered)).into_response(),
        Err(StoreError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Html(page(&blog, "Not found", "<p>This article does not exist.</p>")),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!("Failed to load article {}: {}", slug, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(page(&blog, "Error", "<p>This article could not be loaded.</p>")),
            )
                .into_response()
        }
    }
}

fn article_html(blog: &Blog, record: &ArticleRecord, rendered: &Rendered) -> String {
    let date = record.date.with_timezone(&blog.config.timezone());
    let mut body = format!(
        r#"<article class="post"><header><h1>{}</h1><p class="meta">{} · {}</p>"#,
        html_escape(&record.title),
        time_tag(&date),
        html_escape(&record.reading_time)
    );
    if let Some(cover) = &record.cover_image {
        body.push_str(&format!(
            r#"<img class="cover" src="{}" alt="">"#,
            html_escape(cover)
        ));
    }
    body.push_str("</header>");
    body.push_str(&format!(r#"<div class="content">{}</div>"#, rendered.html()));
    if !record.tags.is_empty() {
        body.push_str(r#"<ul class="tags">"#);
        for tag in &record.tags {
            body.push_str(&format!("<li>{}</li>", html_escape(tag)));
        }
        body.push_str("</ul>");
    }
    body.push_str("</article>");
    page(blog, &record.title, &body)
}

fn page(blog: &Blog, title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{} | {}</title></head><body>{}</body></html>",
        html_escape(title),
        html_escape(&blog.config.title),
        body
    )
}

fn bearer(headers: &HeaderMap) -> &str {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
}

async fn login(
    State(blog): State<SharedBlog>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    blog.login(&request.password)
        .map(|token| Json(LoginResponse { token }))
        .ok_or(ApiError::Unauthorized)
}

async fn admin_list(
    State(blog): State<SharedBlog>,
    headers: HeaderMap,
) -> Result<Json<Vec<ArticleMeta>>, ApiError> {
    Ok(Json(blog.admin_list(bearer(&headers)).await?))
}

async fn admin_show(
    State(blog): State<SharedBlog>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Result<Json<ArticleRecord>, ApiError> {
    Ok(Json(blog.admin_get(bearer(&headers), &slug).await?))
}

async fn admin_create(
    State(blog): State<SharedBlog>,
    headers: HeaderMap,
    Json(draft): Json<Draft>,
) -> Result<(StatusCode, Json<ArticleRecord>), ApiError> {
    let record = blog.create(bearer(&headers), draft).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn admin_update(
    State(blog): State<SharedBlog>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    Json(draft): Json<Draft>,
) -> Result<Json<ArticleRecord>, ApiError> {
    Ok(Json(blog.update(bearer(&headers), &slug, draft).await?))
}

async fn admin_delete(
    State(blog): State<SharedBlog>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    if blog.delete(bearer(&headers), &slug).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(slug))
    }
}
