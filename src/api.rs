use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{error, post, web, App, HttpRequest, HttpResponse, HttpServer};
use log::info;
use serde::Serialize;

use crate::clip::ConcatenateRequest;
use crate::config::Config;
use crate::error::ApiError;
use crate::pipeline::Pipeline;

pub const SUCCESS_MESSAGE: &str = "Videos concatenated and uploaded successfully.";

#[derive(Serialize)]
pub struct ConcatenateResponse {
    pub message: String,
    pub output_path: String,
    pub folder_path: String,
}

/// Concatenate every clip stored for an entity, match and clip type.
///
/// # Example
/// ```shell
/// curl -X POST http://localhost:5001/concatenate \
///   -H 'Content-Type: application/json' \
///   -d '{"id":"P227","match_id":"M002","type":"batting","entity_type":"player"}'
/// ```
///
/// # Returns
/// ```json
/// {
///   "message": "Videos concatenated and uploaded successfully.",
///   "output_path": "concatenated_output.mp4",
///   "folder_path": "highlights/players/P227/M002/batting/"
/// }
/// ```
#[post("/concatenate")]
pub async fn concatenate(
    pipeline: web::Data<Pipeline>,
    body: web::Json<ConcatenateRequest>,
) -> Result<HttpResponse, ApiError> {
    let job = body.into_inner().into_job()?;
    info!("Concatenating clips under {}", job.folder.prefix());

    let outcome = pipeline.run(&job).await?;
    info!(
        "Replaced {} clips under {} with {}",
        outcome.clip_count,
        outcome.folder_path,
        job.folder.output_key()
    );

    Ok(HttpResponse::Ok().json(ConcatenateResponse {
        message: SUCCESS_MESSAGE.to_string(),
        output_path: outcome.output_path.display().to_string(),
        folder_path: outcome.folder_path,
    }))
}

fn json_error(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(format!("Invalid JSON body: {err}")).into()
}

/// Routes and extractor settings, shared by the server and tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .service(concatenate);
}

/// Cross-origin requests are accepted from any origin.
pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .send_wildcard()
        .allow_any_method()
        .allow_any_header()
}

/// Run the API server
pub async fn run_api_server(config: &Config, pipeline: web::Data<Pipeline>) -> std::io::Result<()> {
    info!("Listening on {}:{}", config.host, config.port);
    HttpServer::new(move || {
        App::new()
            .wrap(cors())
            .wrap(Logger::default())
            .app_data(pipeline.clone())
            .configure(configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
