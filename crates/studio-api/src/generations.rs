use axum::{
    Extension, Json,
    extract::{Multipart, Query, State, multipart::MultipartError},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use studio_db::models::{GenerationRow, NewGeneration};
use studio_types::api::{Claims, GenerationRecord, HistoryQuery, ValidationIssue};
use studio_types::models::{GenerationStatus, ImageMime, Style};

use crate::auth::AppState;
use crate::error::{ApiError, join_error};
use crate::images;
use crate::storage::ArtifactStore;

/// 10 MB upload limit for images
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

const MAX_PROMPT_CHARS: usize = 500;

const DEFAULT_HISTORY_LIMIT: u32 = 5;
const MAX_HISTORY_LIMIT: u32 = 50;

/// A validated upload plus its metadata.
struct GenerationInput {
    image: Bytes,
    mime: ImageMime,
    prompt: String,
    style: Style,
}

/// POST /generations: validate the upload, run the simulated model, store
/// both artifacts, then insert the record that references them.
pub async fn create_generation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let input = read_input(multipart).await?;
    debug!(
        "Generation request from {}: {} bytes, style {}",
        claims.sub,
        input.image.len(),
        input.style
    );

    if state.simulation.roll_overload() {
        info!("Simulated overload for {}", claims.sub);
        return Err(ApiError::Overloaded);
    }

    tokio::time::sleep(state.simulation.sample_latency()).await;

    let generation_id = Uuid::new_v4();

    // Decode / resize / encode is CPU bound
    let (data, mime) = (input.image, input.mime);
    let jpeg = tokio::task::spawn_blocking(move || images::normalize(&data, mime))
        .await
        .map_err(join_error)?
        .map_err(|e| {
            warn!("Rejecting undecodable upload: {:#}", e);
            ApiError::BadRequest("Image could not be decoded".into())
        })?;

    let original_name = format!("original-{}.jpg", generation_id);
    let generated_name = format!("{}.jpg", generation_id);

    // Artifacts must be on disk before any row references them
    state.artifacts.write(&original_name, &jpeg).await?;
    if let Err(e) = state.artifacts.write(&generated_name, &jpeg).await {
        discard_artifacts(&state, &[&original_name]).await;
        return Err(e.into());
    }

    let record = GenerationRecord {
        id: generation_id,
        prompt: input.prompt,
        style: input.style,
        image_url: ArtifactStore::url_for(&generated_name),
        original_image_url: ArtifactStore::url_for(&original_name),
        status: GenerationStatus::Completed,
        created_at: Utc::now(),
    };

    let db = state.clone();
    let row = record.clone();
    let user_id = claims.sub.to_string();
    let inserted = tokio::task::spawn_blocking(move || {
        db.db.insert_generation(&NewGeneration {
            id: &row.id.to_string(),
            user_id: &user_id,
            prompt: &row.prompt,
            style: row.style.as_str(),
            image_url: &row.image_url,
            original_image_url: &row.original_image_url,
            created_at: &row.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    })
    .await
    .map_err(join_error)
    .and_then(|r| r.map_err(ApiError::from));

    if let Err(e) = inserted {
        discard_artifacts(&state, &[&original_name, &generated_name]).await;
        return Err(e);
    }

    info!("Generation {} saved for {}", generation_id, claims.sub);
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /generations?limit=N: the caller's most recent generations, newest first.
pub async fn list_generations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = history_limit(query.limit.as_deref());

    let db = state.clone();
    let user_id = claims.sub.to_string();
    let rows = tokio::task::spawn_blocking(move || db.db.recent_generations(&user_id, limit))
        .await
        .map_err(join_error)??;

    debug!("Found {} generations for {}", rows.len(), claims.sub);

    let records: Vec<GenerationRecord> = rows.into_iter().filter_map(row_to_record).collect();
    Ok(Json(records))
}

async fn read_input(mut multipart: Multipart) -> Result<GenerationInput, ApiError> {
    let mut image: Option<(Bytes, Option<String>)> = None;
    let mut prompt: Option<String> = None;
    let mut style: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, "Malformed multipart body"))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, "Failed to read image"))?;
                image = Some((data, content_type));
            }
            Some("prompt") => prompt = Some(read_text(field).await?),
            Some("style") => style = Some(read_text(field).await?),
            _ => {}
        }
    }

    let Some((image, content_type)) = image.filter(|(data, _)| !data.is_empty()) else {
        return Err(ApiError::BadRequest("No image provided".into()));
    };

    let mime = content_type
        .as_deref()
        .and_then(ImageMime::from_content_type)
        .ok_or_else(|| ApiError::BadRequest("Only JPEG and PNG files are allowed".into()))?;

    if image.len() > MAX_IMAGE_SIZE {
        return Err(too_large());
    }

    let (prompt, style) = validate_metadata(prompt, style)?;

    Ok(GenerationInput {
        image,
        mime,
        prompt,
        style,
    })
}

fn too_large() -> ApiError {
    ApiError::BadRequest("Image exceeds the 10MB limit".into())
}

/// Bodies cut off by the request size limit surface as the image size error.
fn multipart_error(e: MultipartError, context: &str) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return too_large();
    }
    ApiError::BadRequest(format!("{}: {}", context, e))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| multipart_error(e, "Malformed form field"))
}

fn validate_metadata(
    prompt: Option<String>,
    style: Option<String>,
) -> Result<(String, Style), ApiError> {
    let mut issues = Vec::new();

    let prompt = match prompt {
        Some(p) if p.is_empty() => {
            issues.push(ValidationIssue::new("prompt", "Prompt must not be empty"));
            None
        }
        Some(p) if p.chars().count() > MAX_PROMPT_CHARS => {
            issues.push(ValidationIssue::new(
                "prompt",
                format!("Prompt must be at most {} characters", MAX_PROMPT_CHARS),
            ));
            None
        }
        Some(p) => Some(p),
        None => {
            issues.push(ValidationIssue::new("prompt", "Prompt is required"));
            None
        }
    };

    let style = match style.as_deref().map(str::parse::<Style>) {
        Some(Ok(style)) => Some(style),
        Some(Err(e)) => {
            issues.push(ValidationIssue::new("style", e.to_string()));
            None
        }
        None => {
            issues.push(ValidationIssue::new("style", "Style is required"));
            None
        }
    };

    match (prompt, style) {
        (Some(prompt), Some(style)) => Ok((prompt, style)),
        _ => Err(ApiError::Validation(issues)),
    }
}

fn history_limit(raw: Option<&str>) -> u32 {
    raw.and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT)
}

fn row_to_record(row: GenerationRow) -> Option<GenerationRecord> {
    let parsed = (|| {
        Some(GenerationRecord {
            id: row.id.parse().ok()?,
            prompt: row.prompt.clone(),
            style: row.style.parse().ok()?,
            image_url: row.image_url.clone(),
            original_image_url: row.original_image_url.clone(),
            status: match row.status.as_str() {
                "completed" => GenerationStatus::Completed,
                _ => return None,
            },
            created_at: row.created_at.parse::<DateTime<Utc>>().ok()?,
        })
    })();

    if parsed.is_none() {
        warn!("Skipping corrupt generation row '{}'", row.id);
    }
    parsed
}

async fn discard_artifacts(state: &AppState, names: &[&str]) {
    for name in names {
        if let Err(e) = state.artifacts.delete(name).await {
            warn!("Failed to clean up artifact {}: {}", name, e);
        }
    }
}
