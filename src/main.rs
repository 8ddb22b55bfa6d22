mod api;
mod auth;
mod lookup;
mod metrics;
mod models;
mod notify;
mod push;
mod realtime;
mod store;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use api::AppState;
use auth::AuthService;
use lookup::LookupService;
use metrics::MetricsCollector;
use notify::Notifier;
use push::PushService;
use realtime::RealtimeHub;
use store::Store;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    // Load environment variables
    dotenvy::dotenv().ok();

    // Get configuration from environment
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .expect("PORT must be a number");

    let db_path = env::var("DATABASE_PATH").unwrap_or_else(|_| "wax.db".to_string());

    let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
        log::warn!("JWT_SECRET not set, using default (not secure for production!)");
        "default_jwt_secret_change_me".to_string()
    });

    // Initialize store
    let store = Arc::new(Store::new(&db_path).expect("Failed to initialize database"));

    // Initialize auth service
    let auth_service = Arc::new(AuthService::new(jwt_secret));

    // Push delivery is optional; without a VAPID key only the row and
    // realtime channels run
    let push_service = PushService::new(
        env::var("VAPID_PRIVATE_KEY").ok(),
        env::var("VAPID_SUBJECT").ok(),
    );

    // Realtime hub shared between the notifier and the upgrade handler
    let realtime_hub = RealtimeHub::new();

    // Notification fan-out pipeline
    let notifier = Arc::new(Notifier::new(
        store.clone(),
        push_service,
        realtime_hub.clone(),
    ));

    // Barcode/cover-art lookup proxy
    let lookup_service = Arc::new(LookupService::new(
        env::var("LOOKUP_API_URL").ok(),
        env::var("COVERART_API_URL").ok(),
    ));

    // Request metrics live in a side database next to the main one
    let metrics_db = db_path.replace(".db", "-metrics.db");
    let metrics_collector = MetricsCollector::new(PathBuf::from(metrics_db));

    log::info!("Database: {}", db_path);
    log::info!("Starting wax-social server on port {}", port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .wrap(metrics_collector.clone())
            // Register AuthService individually for the AuthUser extractor
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(metrics_collector.clone()))
            .app_data(web::Data::new(AppState {
                store: store.clone(),
                auth_service: auth_service.clone(),
                notifier: notifier.clone(),
                realtime: realtime_hub.clone(),
                lookup: lookup_service.clone(),
            }))
            .route("/api/metrics", web::get().to(metrics::get_metrics_handler))
            .configure(api::configure_routes)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
