use axum::extract::{Path, State};
use axum::response::Redirect;
use axum::Json;
use merch_contracts::catalog::summarize;
use serde_json::{json, Value};
use tracing::info;

use super::forms::SubmittedForm;
use super::handlers::known_tool;
use super::{blocking, ApiError, AppState};

pub async fn list_designs(
    State(state): State<AppState>,
    Path(tool_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let tool = known_tool(&tool_id)?;
    let designs = blocking(&state, move |engine| engine.admin_designs(tool.id)).await?;
    Ok(Json(json!({
        "tool": tool.id,
        "designs": designs,
    })))
}

/// Bulk publish toggle. An unchecked box is simply absent from the body.
pub async fn publish_designs(
    State(state): State<AppState>,
    Path(tool_id): Path<String>,
    form: SubmittedForm,
) -> Result<Redirect, ApiError> {
    let tool = known_tool(&tool_id)?;
    let outcome = blocking(&state, move |engine| {
        engine.publish(tool.id, form.fields.keys().map(String::as_str))
    })
    .await?;
    info!(tool = tool.id, published = outcome.published, "designs admin saved");
    Ok(Redirect::to(&format!("/admin/designs/{}", tool.id)))
}

pub async fn list_products(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let products = blocking(&state, |engine| engine.products()).await?;
    Ok(Json(json!({ "products": products })))
}

pub async fn save_product(
    State(state): State<AppState>,
    form: SubmittedForm,
) -> Result<Json<Value>, ApiError> {
    let product = blocking(&state, move |engine| engine.apply_product(&form.into_map())).await?;
    Ok(Json(json!({ "success": true, "product": product })))
}

pub async fn list_orders(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let orders = blocking(&state, |engine| engine.orders()).await?;
    Ok(Json(json!({
        "summary": summarize(&orders),
        "orders": orders,
    })))
}

pub async fn show_config(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let config = blocking(&state, |engine| engine.config()).await?;
    Ok(Json(json!({ "config": config })))
}

pub async fn save_config(
    State(state): State<AppState>,
    form: SubmittedForm,
) -> Result<Json<Value>, ApiError> {
    let changed = blocking(&state, move |engine| engine.update_config(&form.into_map())).await?;
    Ok(Json(json!({ "success": true, "changed": changed })))
}
