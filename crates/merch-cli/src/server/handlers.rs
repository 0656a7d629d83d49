use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::Redirect;
use axum::Json;
use merch_contracts::errors::StudioError;
use merch_contracts::tools::{all_tools, find_tool, ToolDescriptor};
use serde_json::{json, Value};
use tracing::warn;

use super::forms::SubmittedForm;
use super::{blocking, ApiError, AppState};

pub const GENERATE_ACTION: &str = "generate_design";

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "tools": all_tools().len(),
    }))
}

pub async fn list_tools() -> Json<&'static [ToolDescriptor]> {
    Json(all_tools())
}

pub(crate) fn known_tool(tool_id: &str) -> Result<&'static ToolDescriptor, ApiError> {
    find_tool(tool_id).ok_or_else(|| ApiError::NotFound(format!("Unknown tool '{tool_id}'.")))
}

pub async fn generate_design(
    State(state): State<AppState>,
    Path(tool_id): Path<String>,
    mut form: SubmittedForm,
) -> Result<Json<Value>, ApiError> {
    let tool = known_tool(&tool_id)?;
    match form.field("action") {
        Some(GENERATE_ACTION) => {}
        other => {
            return Err(StudioError::validation(format!(
                "Unsupported action '{}'.",
                other.unwrap_or_default()
            ))
            .into())
        }
    }
    let reference = form.take_file("ref_image").map(|file| file.into_reference());
    let fields = form.fields;

    let design = blocking(&state, move |engine| {
        engine
            .generate_design(tool.id, &fields, reference)
            .map(|record| engine.gallery_item(record))
    })
    .await?;
    Ok(Json(json!({ "success": true, "design": design })))
}

pub async fn gallery(
    State(state): State<AppState>,
    Path(tool_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let tool = known_tool(&tool_id)?;
    let designs = blocking(&state, move |engine| engine.gallery(tool.id)).await?;
    Ok(Json(json!({
        "tool": tool.id,
        "label": tool.label,
        "designs": designs,
    })))
}

/// Plain form post from a gallery page. Always redirects back; a failed upload
/// is logged rather than shown.
pub async fn upload_design(
    State(state): State<AppState>,
    Path(tool_id): Path<String>,
    headers: HeaderMap,
    form: Result<SubmittedForm, ApiError>,
) -> Result<Redirect, ApiError> {
    let tool = known_tool(&tool_id)?;
    let gallery = format!("/tools/{}/designs", tool.id);
    let back = redirect_target(&headers).unwrap_or(gallery);

    let outcome = match form {
        Ok(mut form) => {
            let name = form.field("name").map(str::to_string);
            match form.take_file("design_file") {
                Some(file) => {
                    blocking(&state, move |engine| {
                        engine.upload_design(tool.id, name.as_deref(), &file.bytes, file.mime_type())
                    })
                    .await
                }
                None => Err(StudioError::validation("Choose a design file to upload.").into()),
            }
        }
        Err(err) => Err(err),
    };
    if let Err(err) = outcome {
        warn!(tool = tool.id, "design upload failed: {}", error_text(&err));
    }
    Ok(Redirect::to(&back))
}

/// Path and query of a same-origin `Referer`. Anything else, including
/// protocol-relative and foreign-host URLs, yields `None`.
fn redirect_target(headers: &HeaderMap) -> Option<String> {
    let referer = headers.get(header::REFERER)?.to_str().ok()?.trim();
    let path = match referer
        .strip_prefix("http://")
        .or_else(|| referer.strip_prefix("https://"))
    {
        Some(rest) => {
            let host = headers.get(header::HOST)?.to_str().ok()?;
            let (authority, path) = rest.split_at(rest.find('/').unwrap_or(rest.len()));
            if !authority.eq_ignore_ascii_case(host) {
                return None;
            }
            if path.is_empty() {
                "/"
            } else {
                path
            }
        }
        None => referer,
    };
    let local = path.starts_with('/') && !path.starts_with("//") && !path.contains('\\');
    local.then(|| path.to_string())
}

fn error_text(err: &ApiError) -> String {
    match err {
        ApiError::Studio(err) => format!("{} ({})", err.message(), err.kind()),
        ApiError::NotFound(message) | ApiError::Internal(message) => message.clone(),
    }
}
