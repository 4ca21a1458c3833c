use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use roadsight_backend::config::Settings;
use roadsight_backend::geo::kml;
use roadsight_backend::inference::{Ensemble, TesseractOcr};
use roadsight_backend::pipeline::{Pipeline, PipelineConfig};
use roadsight_backend::routes::configure_routes;
use roadsight_backend::storage::UploadStore;
use std::env;
use std::io;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let settings = Settings::load().map_err(|e| {
        log::error!("Failed to load settings: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let store = UploadStore::new(&settings.storage.upload_dir, settings.storage.max_image_bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    let route = kml::load_route(&settings.route.kml_file);
    if route.is_empty() {
        log::warn!(
            "No route points loaded from {}; every image will report gps_valid=false",
            settings.route.kml_file.display()
        );
    } else {
        log::info!("Loaded {} route points", route.len());
    }

    let ensemble = Ensemble::load(&settings.classifiers);
    let unavailable = ensemble.unavailable();
    if !unavailable.is_empty() {
        log::warn!("Classifiers unavailable, their scores will be empty: {:?}", unavailable);
    }

    let ocr = TesseractOcr::new(&settings.ocr);
    let upload_dir = store.upload_dir().to_path_buf();
    let pipeline = web::Data::new(Pipeline::new(
        PipelineConfig::from_settings(&settings, route),
        ensemble,
        Box::new(ocr),
        store,
    ));

    let bind_address = (settings.server.host.clone(), settings.server.port);
    log::info!("Starting server on {}:{}", bind_address.0, bind_address.1);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(pipeline.clone())
            .configure(|cfg| configure_routes(cfg, upload_dir.clone()))
    })
    .bind(bind_address)?
    .run()
    .await
}
