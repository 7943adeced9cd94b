use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use circle_match::auth::JwtService;
use circle_match::config::{LogFormat, Settings, StorageBackend};
use circle_match::core::{JaccardDiversity, MatchingPipeline};
use circle_match::models::DiversityWeights;
use circle_match::routes::{self, AppState};
use circle_match::services::{CacheManager, EventStore, MatchingService, MemoryStore, PostgresStore};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// JSON error response for malformed requests
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST)).json(self)
    }
}

/// Handle JSON payload errors
fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle malformed path parameters such as a non-UUID event id
fn handle_path_error(err: error::PathError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "invalid_path".to_string(),
        message: format!("Invalid path: {}", err),
        status_code: 400,
    }
    .into()
}

fn init_logging(level: &str, format: LogFormat) {
    // LOG_LEVEL / LOG_FORMAT win over the config file
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| level.to_string());
    let format = std::env::var("LOG_FORMAT")
        .ok()
        .and_then(|f| f.parse().ok())
        .unwrap_or(format);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.pretty().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }
}

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, e);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
        }
    };

    init_logging(&settings.logging.level, settings.logging.format);
    info!("Starting circle matching service...");

    let store: Arc<dyn EventStore> = match settings.storage.backend {
        StorageBackend::Postgres => {
            let postgres = PostgresStore::from_settings(
                &settings.database.url,
                settings.database.max_connections,
                settings.database.min_connections,
                settings.database.acquire_timeout_secs,
                settings.database.idle_timeout_secs,
            )
            .await
            .map_err(|e| startup_error("Failed to connect to PostgreSQL", e))?;
            info!("PostgreSQL store initialized");
            Arc::new(postgres)
        }
        StorageBackend::Memory => {
            warn!("Using in-memory store, state is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let cache_ttl = settings.cache.ttl_secs.unwrap_or(3600);
    let l1_cache_size = settings.cache.l1_cache_size.unwrap_or(1000);
    let cache = match CacheManager::new(settings.cache.redis_url.as_deref(), l1_cache_size, cache_ttl).await {
        Ok(cache) => cache,
        Err(e) => {
            // Results are immutable once closed, so a local cache is enough to serve them
            warn!("Failed to connect to Redis ({}), caching results in-process only", e);
            CacheManager::in_memory(l1_cache_size, cache_ttl)
        }
    };
    info!(
        "Cache initialized (L1: {} entries, TTL: {}s, redis: {})",
        l1_cache_size,
        cache_ttl,
        cache.has_redis()
    );

    let weights = DiversityWeights {
        interests: settings.diversity.weights.interests,
        dietary: settings.diversity.weights.dietary,
    };
    let pipeline = MatchingPipeline::new(Arc::new(JaccardDiversity::new(weights)));
    info!("Matching pipeline initialized with weights: {:?}", weights);

    let matching = MatchingService::new(
        store.clone(),
        pipeline,
        Arc::new(cache),
        settings.matching.circle_size,
        settings.matching.minimum_pool_size,
    );
    let app_state = AppState::new(store, matching);
    let jwt = JwtService::new(&settings.auth.jwt_secret, settings.auth.issuer.clone());

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::new(jwt.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::PathConfig::default().error_handler(handle_path_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
