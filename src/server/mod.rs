//! # HTTP Server for the Card Editor
//!
//! Exposes the editing session over a JSON API: template and element edits,
//! records and process rules, undo/redo, drag-and-drop uploads, and card
//! previews rendered on demand.
//!
//! ## Usage
//!
//! ```bash
//! cardpress serve --listen 0.0.0.0:8080 --state-dir ./.cardpress
//! ```
//!
//! ## Routes
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | GET/POST | `/api/template` | current bundle / import a template file |
//! | GET | `/api/template/export` | download `card-template.json` |
//! | PUT | `/api/template/size` | change the card size |
//! | POST | `/api/elements` | add an element |
//! | PATCH/DELETE | `/api/elements/:id` | update / delete an element |
//! | GET/PUT | `/api/records` | records and bindable fields / replace records |
//! | GET/PUT/POST | `/api/rules` | list / replace / append process rules |
//! | GET | `/api/cards/:index/png` | render one card |
//! | GET | `/api/cards/export` | every card in `cards.zip` |

mod handlers;
pub mod state;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
};
use log::info;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::{RenderConfig, ServerConfig};
use crate::error::{CardpressError, Result};
use crate::render::RenderEngine;
use crate::session::{FileStore, KeyValueStore, MemoryStore};
use state::AppState;

/// Upload limit for dropped files.
const DROP_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Build the API router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Template and project
        .route(
            "/api/template",
            get(handlers::template::get).post(handlers::template::import),
        )
        .route("/api/template/export", get(handlers::template::export))
        .route("/api/template/size", put(handlers::template::set_size))
        .route("/api/template/sizes", get(handlers::template::sizes))
        .route("/api/project/new", post(handlers::template::new_project))
        .route(
            "/api/fonts",
            get(handlers::template::fonts).post(handlers::template::add_font),
        )
        // History
        .route(
            "/api/history",
            get(handlers::template::history).delete(handlers::template::clear_history),
        )
        .route("/api/history/undo", post(handlers::template::undo))
        .route("/api/history/redo", post(handlers::template::redo))
        // Elements
        .route("/api/elements", post(handlers::elements::add))
        .route(
            "/api/elements/:id",
            patch(handlers::elements::update).delete(handlers::elements::delete),
        )
        // Records and rules
        .route(
            "/api/records",
            get(handlers::records::list).put(handlers::records::replace),
        )
        .route("/api/records/import", post(handlers::records::import))
        .route(
            "/api/rules",
            get(handlers::rules::list)
                .put(handlers::rules::replace)
                .post(handlers::rules::add),
        )
        .route(
            "/api/rules/:index",
            put(handlers::rules::update).delete(handlers::rules::remove),
        )
        // Cards
        .route("/api/cards", get(handlers::cards::summary))
        .route("/api/cards/export", get(handlers::cards::export))
        .route("/api/cards/:index/png", get(handlers::cards::png))
        .route("/api/cards/:index/layout", get(handlers::cards::layout))
        // Drag and drop (50MB limit for uploads)
        .route(
            "/api/drop",
            post(handlers::drop::upload).layer(DefaultBodyLimit::max(DROP_BODY_LIMIT)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
///
/// The session is restored from `state_dir` when one is configured and kept
/// in memory otherwise.
pub async fn serve(config: ServerConfig, render: RenderConfig) -> Result<()> {
    let store: Arc<dyn KeyValueStore> = match &config.state_dir {
        Some(dir) => {
            info!("[server] session directory: {}", dir.display());
            Arc::new(FileStore::new(dir.clone()))
        }
        None => {
            info!("[server] no session directory, session is kept in memory");
            Arc::new(MemoryStore::new())
        }
    };
    let engine = RenderEngine::from_config(render)?;
    info!(
        "[server] {} installed font families, pixel ratio {}",
        engine.fonts().families().len(),
        engine.config().pixel_ratio
    );

    let app_state = Arc::new(AppState::new(config.clone(), engine, store).await);
    let app = router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|e| {
            CardpressError::Transport(format!("Failed to bind to {}: {}", config.listen_addr, e))
        })?;
    info!("[server] listening on http://{}/", config.listen_addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| CardpressError::Transport(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::font::FontBook;
    use crate::render::loader::ImageFetcher;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use std::io::{Cursor, Read};
    use tower::ServiceExt;

    async fn test_state() -> Arc<AppState> {
        let render = RenderConfig {
            pixel_ratio: 1.0,
            ..Default::default()
        };
        let images = Arc::new(ImageFetcher::new(&render).unwrap());
        let engine = RenderEngine::new(render, FontBook::empty(), images);
        Arc::new(AppState::new(ServerConfig::default(), engine, Arc::new(MemoryStore::new())).await)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(app, request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    fn name_element() -> Value {
        json!({
            "type": "text", "id": "name", "x": 10, "y": 10, "width": 200, "height": 40,
            "fontSize": 20, "fontFamily": "Arial", "color": "#000000", "bind": "name"
        })
    }

    #[tokio::test]
    async fn bound_text_shows_the_record_value() {
        let app = router(test_state().await);

        let (status, _) = send_json(&app, json_request("POST", "/api/elements", name_element())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) =
            send_json(&app, json_request("PUT", "/api/records", json!([{ "name": "Ada" }]))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, layout) = send_json(&app, get_request("/api/cards/0/layout")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(layout["elements"][0]["content"]["text"], json!("Ada"));

        let (status, png) = send(&app, get_request("/api/cards/0/png")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&png[1..4], b"PNG");
    }

    #[tokio::test]
    async fn too_small_card_is_a_bad_request() {
        let app = router(test_state().await);
        let (status, _) = send(
            &app,
            json_request("PUT", "/api/template/size", json!({ "width": 10, "height": 10 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, bundle) = send_json(&app, get_request("/api/template")).await;
        assert_eq!(bundle["template"]["width"], json!(750.0));
    }

    #[tokio::test]
    async fn unknown_element_and_card_are_not_found() {
        let app = router(test_state().await);
        let (status, _) = send(
            &app,
            Request::builder()
                .method("DELETE")
                .uri("/api/elements/ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, get_request("/api/cards/3/png")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rules_rewrite_the_working_records() {
        let app = router(test_state().await);
        send(
            &app,
            json_request("PUT", "/api/records", json!([{ "hp": 10 }, { "hp": 2 }])),
        )
        .await;
        let rule = json!({
            "key": "hp", "comparator": ">", "value": "5", "new_key": "tier", "content": "high"
        });
        let (status, rules) = send_json(&app, json_request("POST", "/api/rules", rule)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rules.as_array().map(Vec::len), Some(1));

        let (_, records) = send_json(&app, get_request("/api/records")).await;
        assert_eq!(records["records"][0]["tier"], json!("high"));
        assert_eq!(records["records"][1].get("tier"), None);
        assert_eq!(records["original"][0].get("tier"), None);
        assert!(records["fields"].as_array().unwrap().contains(&json!("tier")));
    }

    #[tokio::test]
    async fn export_zip_holds_one_png_per_record() {
        let app = router(test_state().await);
        send(&app, json_request("POST", "/api/elements", name_element())).await;
        send(
            &app,
            json_request("PUT", "/api/records", json!([{ "name": "Ada" }, { "name": "Grace" }])),
        )
        .await;

        let (status, zip_bytes) = send(&app, get_request("/api/cards/export")).await;
        assert_eq!(status, StatusCode::OK);

        let mut archive = zip::ZipArchive::new(Cursor::new(zip_bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut png = Vec::new();
        archive.by_name("card_2.png").unwrap().read_to_end(&mut png).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[tokio::test]
    async fn undo_restores_the_deleted_element() {
        let app = router(test_state().await);
        send(&app, json_request("POST", "/api/elements", name_element())).await;
        let (status, _) = send(
            &app,
            Request::builder()
                .method("DELETE")
                .uri("/api/elements/name")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, history) = send_json(&app, json_request("POST", "/api/history/undo", json!({}))).await;
        assert_eq!(history["changed"], json!(true));
        assert_eq!(history["bundle"]["template"]["elements"][0]["id"], json!("name"));
        assert_eq!(history["canRedo"], json!(true));
    }

    #[tokio::test]
    async fn patch_renames_an_element() {
        let app = router(test_state().await);
        send(&app, json_request("POST", "/api/elements", name_element())).await;
        let (status, element) = send_json(
            &app,
            json_request("PATCH", "/api/elements/name", json!({ "id": "title", "x": 42 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(element["id"], json!("title"));
        assert_eq!(element["x"], json!(42.0));
    }
}
