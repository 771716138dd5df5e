mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header::{AUTHORIZATION, CONTENT_TYPE}};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use vidtube_api::media::{CloudinaryHost, LocalMediaHost, MediaHost};
use vidtube_api::routes::router;
use vidtube_api::state::{AppState, AppStateInner};
use vidtube_api::tokens::TokenService;
use vidtube_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vidtube=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e:#}");
            eprintln!("       Set the token secrets in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Database::open(&config.db_path)?;

    let (media, media_dir): (Arc<dyn MediaHost>, _) = match &config.cloudinary {
        Some(cloudinary) => {
            info!("Media host: Cloudinary ({})", cloudinary.cloud_name);
            let host: Arc<dyn MediaHost> = Arc::new(CloudinaryHost::new(cloudinary.clone()));
            (host, None)
        }
        None => {
            let local = LocalMediaHost::new(config.media_dir.clone(), &config.public_url).await?;
            info!("Media host: local disk at {}", local.dir().display());
            let dir = local.dir().to_path_buf();
            let host: Arc<dyn MediaHost> = Arc::new(local);
            (host, Some(dir))
        }
    };

    let state: AppState = Arc::new(AppStateInner {
        db,
        tokens: TokenService::new(&config.tokens),
        media,
        upload_dir: config.upload_tmp_dir.clone(),
        collaborator_timeout: config.collaborator_timeout,
    });

    let cors = match &config.cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE])
            .allow_credentials(true),
        None => {
            warn!("CORS_ORIGIN not set, allowing any origin without credentials");
            CorsLayer::permissive()
        }
    };

    let mut app = router(state);
    if let Some(dir) = media_dir {
        app = app.nest_service("/media", ServeDir::new(dir));
    }
    let app = app
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("VidTube server listening on {}", addr);
    info!(
        "Access tokens live {}s, refresh tokens {}s",
        config.tokens.access_ttl.num_seconds(),
        config.tokens.refresh_ttl.num_seconds()
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
