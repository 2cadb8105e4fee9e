use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{middleware, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::app_state::AppState;
use crate::auth::{gate_pages, require_session, AuthUser, MaybeAuthUser};
use crate::error::Error;
use crate::orchestrator::GenerationOutcome;
use crate::rate_limit::rate_limit_middleware;

#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub url: Option<String>,
}

async fn post_generate(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerationOutcome>, Error> {
    let Json(body) =
        body.map_err(|e| Error::BadRequest(format!("Invalid request body: {}", e.body_text())))?;
    let url = body.url.unwrap_or_default();
    let outcome = state.orchestrator.generate(&user_id, &url).await?;
    Ok(Json(outcome))
}

// Listing fails open: anonymous callers and internal errors both get an empty list.
async fn get_images(State(state): State<AppState>, MaybeAuthUser(user): MaybeAuthUser) -> Json<Value> {
    let Some(user_id) = user else {
        return Json(json!({ "images": [] }));
    };
    match state.gallery.list(&user_id).await {
        Ok(images) => Json(json!({ "images": images })),
        Err(e) => {
            warn!(user_id = %user_id, "Listing failed, answering empty: {}", e);
            Json(json!({ "images": [] }))
        }
    }
}

async fn delete_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, Error> {
    state.gallery.delete(&user_id, &id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn get_credits(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Value>, Error> {
    let credit = state
        .ledger
        .balance(&user_id)
        .await?
        .ok_or(Error::NotFound)?;
    Ok(Json(json!({ "credit": credit })))
}

pub fn router(state: AppState) -> Router {
    // Later route layers run first: session check, then the throttle.
    let generate = Router::new()
        .route("/generate", post(post_generate))
        .route_layer(middleware::from_fn_with_state(
            state.rate_limit.clone(),
            rate_limit_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.sessions.clone(),
            require_session,
        ));
    let api = Router::new()
        .merge(generate)
        .route("/images", get(get_images))
        .route("/images/{id}", delete(delete_image))
        .route("/credits", get(get_credits));
    Router::new()
        .nest("/api", api)
        .fallback_service(ServeDir::new(&state.static_dir))
        .layer(middleware::from_fn_with_state(
            state.sessions.clone(),
            gate_pages,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
