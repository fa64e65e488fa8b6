use actix_files::{Files, NamedFile};
use actix_multipart::Multipart;
use actix_web::{Error, HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use log::{error, info};
use serde::Serialize;
use serde_json::json;
use std::io::Write;

use crate::config::AppConfig;
use crate::inference::ClassifyError;
use crate::service::{ClassifierService, ServiceState};
use shared::ClassificationResponse;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: String) {
    let index_file = format!("{}/index.html", static_dir);
    cfg.service(web::resource("/").route(web::get().to(move || {
        let path = index_file.clone();
        async move { NamedFile::open_async(path).await }
    })))
    .service(web::resource("/analyze").route(web::post().to(handle_analyze)))
    .service(web::resource("/healthz").route(web::get().to(health)))
    .service(Files::new("/static", static_dir));
}

fn supported_image_type(mime: &str) -> bool {
    matches!(
        mime,
        "image/jpeg" | "image/png" | "image/webp" | "image/gif"
    )
}

async fn handle_analyze(
    service: web::Data<ClassifierService>,
    config: web::Data<AppConfig>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let mut image_data = Vec::new();
    let mut content_type = None;

    while let Ok(Some(mut field)) = payload.try_next().await {
        content_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string());
        while let Some(chunk) = field.next().await {
            let data = chunk?;
            image_data.write_all(&data)?;
        }
        if !image_data.is_empty() {
            break;
        }
    }

    if image_data.is_empty() {
        return Ok(HttpResponse::BadRequest().json(ErrorResponse {
            error: "no image file in request".into(),
        }));
    }

    if let Some(mime) = &content_type {
        if !supported_image_type(mime) {
            return Ok(HttpResponse::UnsupportedMediaType().json(ErrorResponse {
                error: format!("unsupported content type: {mime}"),
            }));
        }
    }

    let classifier = match service.wait_ready(config.startup_timeout()).await {
        Ok(classifier) => classifier,
        Err(e) => {
            info!("rejecting request before readiness: {e}");
            return Ok(HttpResponse::ServiceUnavailable().json(ErrorResponse {
                error: e.to_string(),
            }));
        }
    };

    match classifier.classify(&image_data) {
        Ok(result) => Ok(HttpResponse::Ok().json(ClassificationResponse {
            label: result.label,
            confidence: result.confidence,
            probabilities: result.probabilities,
        })),
        Err(ClassifyError::Decode(e)) => {
            info!("rejecting undecodable upload: {e}");
            Ok(HttpResponse::UnprocessableEntity().json(ErrorResponse {
                error: e.to_string(),
            }))
        }
        Err(e) => {
            error!("inference failed: {e}");
            Ok(HttpResponse::InternalServerError().json(ErrorResponse {
                error: e.to_string(),
            }))
        }
    }
}

async fn health(service: web::Data<ClassifierService>) -> HttpResponse {
    let state = service.state();
    let body = json!({ "status": state.as_str() });
    if state == ServiceState::Ready {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
