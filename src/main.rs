use actix_web::{middleware::Compress, web, App, HttpResponse, HttpServer};
use actix_cors::Cors;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use vidtube::auth::TokenIssuer;
use vidtube::config::AppConfig;
use vidtube::openapi::ApiDoc;
use vidtube::rate_limit::RateLimiterFacade;
use vidtube::repo::UserRepo;
use vidtube::routes::{route_not_found, UploadLimits, BODY_LIMIT};
use vidtube::staging::StagingArea;
use vidtube::storage::CloudinaryUploader;
use vidtube::{config, AppState};

async fn metrics_endpoint(handle: web::Data<PrometheusHandle>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(handle.render())
}

#[cfg(feature = "postgres-store")]
async fn postgres_repo(cfg: &AppConfig) -> anyhow::Result<Option<Arc<dyn UserRepo>>> {
    use sqlx::postgres::PgPoolOptions;
    use vidtube::repo::pg::PgRepo;

    let Some(url) = cfg.database.connection_url() else { return Ok(None) };
    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&url)
        .await?;
    let repo = PgRepo::new(pool);
    repo.migrate().await?;
    info!("Using Postgres repository backend");
    Ok(Some(Arc::new(repo)))
}

#[cfg(not(feature = "postgres-store"))]
async fn postgres_repo(cfg: &AppConfig) -> anyhow::Result<Option<Arc<dyn UserRepo>>> {
    if cfg.database.url.is_some() {
        warn!("DATABASE_URL is set but the postgres-store feature is disabled");
    }
    Ok(None)
}

#[cfg(feature = "inmem-store")]
fn fallback_repo() -> anyhow::Result<Arc<dyn UserRepo>> {
    warn!("DATABASE_URL not set; users are kept in memory and lost on restart");
    Ok(Arc::new(vidtube::repo::inmem::InMemRepo::new()))
}

#[cfg(not(feature = "inmem-store"))]
fn fallback_repo() -> anyhow::Result<Arc<dyn UserRepo>> {
    anyhow::bail!("DATABASE_URL must be set when the inmem-store feature is disabled")
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    // Structured logging initialisation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping vidtube server");

    let cfg = AppConfig::from_env()?;
    info!("CORS origin: {}", cfg.cors_origin);

    let prometheus = PrometheusBuilder::new().install_recorder()?;

    let repo = match postgres_repo(&cfg).await? {
        Some(repo) => repo,
        None => fallback_repo()?,
    };

    let staging = StagingArea::new(&cfg.uploads.staging_dir)?;
    info!("Staging uploads in {}", staging.root().display());

    let rate_limiter = RateLimiterFacade::from_config(cfg.rate_limit.clone());
    {
        let limiter = rate_limiter.limiter.clone();
        let window = cfg.rate_limit.register_window;
        actix_web::rt::spawn(async move {
            let mut tick = tokio::time::interval(window.max(Duration::from_secs(1)));
            loop {
                tick.tick().await;
                limiter.purge_expired(window);
            }
        });
    }

    let state = web::Data::new(AppState {
        repo,
        uploader: Arc::new(CloudinaryUploader::new(cfg.media.clone())?),
        staging,
        tokens: Arc::new(TokenIssuer::new(&cfg.tokens)),
        rate_limiter: Some(rate_limiter),
        limits: UploadLimits { max_file_bytes: cfg.uploads.max_file_bytes, max_text_bytes: BODY_LIMIT },
    });
    let prometheus = web::Data::new(prometheus);
    let openapi = ApiDoc::openapi();
    let cors_origin = cfg.cors_origin.clone();

    let server = HttpServer::new(move || {
        let cors = match cors_origin.as_str() {
            "*" => Cors::default().allow_any_origin(),
            origin => Cors::default().allowed_origin(origin),
        };
        let cors = cors
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .app_data(state.clone())
            .app_data(prometheus.clone())
            .configure(config)
            .route("/metrics", web::get().to(metrics_endpoint))
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
            .default_service(web::to(route_not_found))
    })
    .bind(("0.0.0.0", cfg.port))?;

    info!("Listening on http://0.0.0.0:{}", cfg.port);

    server.run().await?;
    Ok(())
}
