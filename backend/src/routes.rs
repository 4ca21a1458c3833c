use actix_files::Files;
use actix_multipart::{Field, Multipart, MultipartError};
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use futures::TryStreamExt;
use log::{debug, info};
use serde_json::json;
use shared::{HealthResponse, UploadResponse};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::inference::ClassifierId;
use crate::pipeline::{process_batch, ImageUpload, Pipeline, UploadMetadata};

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Malformed multipart request: {0}")]
    Multipart(String),
    #[error("Field '{field}' is not valid UTF-8")]
    InvalidText { field: String },
    #[error("Field '{field}' is not a number: '{value}'")]
    InvalidCoordinate { field: String, value: String },
    #[error("Field '{field}' exceeds the {limit} byte limit")]
    TooLarge { field: String, limit: usize },
}

impl From<MultipartError> for UploadError {
    fn from(err: MultipartError) -> Self {
        UploadError::Multipart(err.to_string())
    }
}

impl ResponseError for UploadError {
    fn status_code(&self) -> StatusCode {
        match self {
            UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, upload_dir: PathBuf) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/api/health").route(web::get().to(health)))
        .service(web::resource("/api/upload").route(web::post().to(handle_upload)))
        .service(web::resource("/upload").route(web::post().to(handle_upload)))
        .service(Files::new("/uploads", upload_dir));
}

async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body("Roadsight backend running. Upload inspection photos to /api/upload.")
}

async fn health(pipeline: web::Data<Pipeline>) -> HttpResponse {
    let ids = |ids: Vec<ClassifierId>| -> Vec<String> { ids.iter().map(ToString::to_string).collect() };
    HttpResponse::Ok().json(HealthResponse {
        route_points: pipeline.config().route.len(),
        classifiers_ready: ids(pipeline.ensemble().ready()),
        classifiers_unavailable: ids(pipeline.ensemble().unavailable()),
        ocr_binary: pipeline.ocr().name().to_string(),
        tolerance_meters: pipeline.config().tolerance_meters,
    })
}

async fn handle_upload(
    pipeline: web::Data<Pipeline>,
    payload: Multipart,
) -> Result<HttpResponse, UploadError> {
    let max_images = pipeline.config().max_images;
    let max_image_bytes = pipeline.store().max_image_bytes();
    let uploads = read_upload_form(payload, max_images, max_image_bytes).await?;
    info!("Received upload with {} image(s)", uploads.len());

    let records = process_batch(pipeline.into_inner(), uploads).await;
    Ok(HttpResponse::Ok().json(UploadResponse {
        results: records.iter().map(|r| r.to_upload_result()).collect(),
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Image,
    Chainage,
    Latitude,
    Longitude,
}

/// Maps `image3`, `chainage_km_3`, `lat3`, `lon3` to their kind and slot.
fn parse_field_name(name: &str) -> Option<(FieldKind, usize)> {
    let (kind, index) = if let Some(rest) = name.strip_prefix("chainage_km_") {
        (FieldKind::Chainage, rest)
    } else if let Some(rest) = name.strip_prefix("image") {
        (FieldKind::Image, rest)
    } else if let Some(rest) = name.strip_prefix("lat") {
        (FieldKind::Latitude, rest)
    } else if let Some(rest) = name.strip_prefix("lon") {
        (FieldKind::Longitude, rest)
    } else {
        return None;
    };
    index.parse().ok().map(|i| (kind, i))
}

#[derive(Default)]
struct UploadSlot {
    image: Option<(String, Vec<u8>)>,
    metadata: UploadMetadata,
}

impl UploadSlot {
    fn into_upload(self) -> Option<ImageUpload> {
        let (original_name, data) = self.image?;
        Some(ImageUpload {
            original_name,
            data,
            metadata: self.metadata,
        })
    }
}

async fn read_upload_form(
    mut payload: Multipart,
    max_images: usize,
    max_image_bytes: usize,
) -> Result<Vec<ImageUpload>, UploadError> {
    let mut slots: BTreeMap<usize, UploadSlot> = BTreeMap::new();

    while let Some(mut field) = payload.try_next().await? {
        let name = field.name().unwrap_or_default().to_string();
        let Some((kind, index)) = parse_field_name(&name) else {
            debug!("Ignoring form field '{}'", name);
            continue;
        };
        if index == 0 || index > max_images {
            debug!("Ignoring form field '{}' outside slots 1..={}", name, max_images);
            continue;
        }

        let slot = slots.entry(index).or_default();
        match kind {
            FieldKind::Image => {
                let filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .unwrap_or_default()
                    .to_string();
                let data = read_field(&mut field, &name, max_image_bytes).await?;
                if filename.is_empty() {
                    debug!("No image file received for {}", name);
                    continue;
                }
                slot.image = Some((filename, data));
            }
            FieldKind::Chainage => {
                let text = read_text(&mut field, &name).await?;
                slot.metadata.chainage_km = (!text.is_empty()).then_some(text);
            }
            FieldKind::Latitude => {
                slot.metadata.client_lat = read_coordinate(&mut field, &name).await?;
            }
            FieldKind::Longitude => {
                slot.metadata.client_lon = read_coordinate(&mut field, &name).await?;
            }
        }
    }

    Ok(slots.into_values().filter_map(UploadSlot::into_upload).collect())
}

async fn read_field(field: &mut Field, name: &str, limit: usize) -> Result<Vec<u8>, UploadError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.try_next().await? {
        if data.len() + chunk.len() > limit {
            return Err(UploadError::TooLarge {
                field: name.to_string(),
                limit,
            });
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

const MAX_TEXT_FIELD_BYTES: usize = 4 * 1024;

async fn read_text(field: &mut Field, name: &str) -> Result<String, UploadError> {
    let data = read_field(field, name, MAX_TEXT_FIELD_BYTES).await?;
    let text = String::from_utf8(data).map_err(|_| UploadError::InvalidText {
        field: name.to_string(),
    })?;
    Ok(text.trim().to_string())
}

async fn read_coordinate(field: &mut Field, name: &str) -> Result<Option<f64>, UploadError> {
    let text = read_text(field, name).await?;
    parse_coordinate(name, text)
}

/// Empty means "not supplied"; anything else must be a finite number.
fn parse_coordinate(name: &str, text: String) -> Result<Option<f64>, UploadError> {
    if text.is_empty() {
        return Ok(None);
    }
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(UploadError::InvalidCoordinate {
            field: name.to_string(),
            value: text,
        }),
    }
}
