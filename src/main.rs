use anyhow::Result;
use axum::Router;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tiered_image_store::{
    config, db, routes,
    services::{
        codec::RasterCodec, image_store::ImageStore, local_archive_tier::LocalArchiveTier,
        local_object_tier::LocalObjectTier,
    },
    state::AppState,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting image-store with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    let objects_dir = Path::new(&cfg.storage_dir).join("objects");
    let archives_dir = Path::new(&cfg.storage_dir).join("archives");
    for dir in [&objects_dir, &archives_dir] {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
            tracing::info!("Created storage directory at {}", dir.display());
        }
    }

    // --- Initialize SQLite connection ---
    tracing::debug!("Connecting using raw URL => {}", cfg.database_url);
    let db = Arc::new(db::connect(&cfg.database_url).await?);

    // --- Handle migration mode ---
    if migrate {
        db::run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }
    db::run_migrations(&db).await?;

    // --- Initialize tiers and services ---
    let objects = LocalObjectTier::new(db.clone(), objects_dir);
    let archive = LocalArchiveTier::new(
        db.clone(),
        archives_dir,
        chrono::Duration::seconds(i64::try_from(cfg.retrieval_delay_secs)?),
    );
    let store = ImageStore::new(Arc::new(objects.clone()), Arc::new(archive));
    let codec = Arc::new(RasterCodec::new(cfg.jpeg_quality));
    let state = AppState::new(&cfg, store, codec).with_public_objects(objects);

    if cfg.vault_name.is_none() {
        tracing::warn!("No vault configured; uploads will not be archived");
    }

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
