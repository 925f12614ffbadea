use axum::Router;
use axum::extract::State;
use axum::response::Html;
use axum::routing::{get, post};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::conversation;
use crate::history;
use crate::state::SharedState;

/// Build the application router with all routes.
pub fn build_router(state: SharedState) -> Router {
    let static_dir = state.config.gateway.static_dir.clone();

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/frontend_settings", get(frontend_settings))
        .route("/conversation/{context}", post(conversation::conversation))
        .route(
            "/history/{conversation_id}",
            get(history::conversation_history).delete(history::delete_conversation),
        )
        .route("/history/message_feedback", post(history::message_feedback))
        .nest_service("/assets", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// GET /: landing page rendered with the configured title and favicon.
async fn index(State(state): State<SharedState>) -> Html<String> {
    let template_path = std::path::Path::new(&state.config.gateway.static_dir).join("index.html");

    // A template in the static directory wins over the compiled-in page.
    let template = std::fs::read_to_string(template_path)
        .unwrap_or_else(|_| include_str!("index.html").to_string());

    Html(render_index(
        &template,
        &state.config.ui.title,
        &state.config.ui.favicon,
    ))
}

fn render_index(template: &str, title: &str, favicon: &str) -> String {
    template
        .replace("{{ title }}", &escape_html(title))
        .replace("{{ favicon }}", &escape_html(favicon))
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

async fn frontend_settings(State(state): State<SharedState>) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "ui": {
            "title": state.config.ui.title,
            "favicon": state.config.ui.favicon,
        },
        "history_enabled": state.history_enabled(),
        "feedback_enabled": state.feedback_enabled(),
    }))
}
