use std::sync::Arc;

use anyhow::{Context, Result};
use territory_tracker::{
    AppState, BackupManager, DurabilityMode, LifecycleEngine, MirrorSink, NoopMirror,
    SystemClock, TerritoryStore,
    auth::{AuthManager, SessionStore},
    build_router,
    config::AppConfig,
    import::PhotoStore,
    mirror::{QueuedMirror, SheetsMirror},
    storage::spawn_backup_job,
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("failed to load configuration")?;

    let store = Arc::new(
        TerritoryStore::open(&config.data_dir, DurabilityMode::Snapshot)
            .await
            .with_context(|| format!("failed to open store in {}", config.data_dir.display()))?,
    );
    let seeded = store
        .seed(config.territory_count)
        .await
        .context("failed to seed territories")?;
    if seeded > 0 {
        info!(seeded, "missing territories created");
    }

    let backups = Arc::new(BackupManager::new(
        store.clone(),
        &config.backup_dir,
        config.backup_retain,
    ));
    let backup_job = spawn_backup_job(backups, config.backup_interval);

    let (mirror, mirror_queue) = build_mirror(&config)?;
    let engine = Arc::new(LifecycleEngine::new(
        store,
        mirror.clone(),
        Arc::new(SystemClock),
    ));

    let auth = Arc::new(
        AuthManager::new(config.role_passwords()).context("failed to hash role passwords")?,
    );
    let sessions = Arc::new(SessionStore::new(config.session_ttl));
    let photos = Arc::new(PhotoStore::new(&config.uploads_dir));
    tokio::fs::create_dir_all(photos.dir())
        .await
        .with_context(|| format!("failed to create {}", photos.dir().display()))?;

    let app = build_router(AppState::new(engine, auth, sessions, photos));
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!(
        bind_addr = %config.bind_addr,
        data_dir = %config.data_dir.display(),
        mirror = config.mirror.is_some(),
        "territory tracker started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    backup_job.abort();
    if let Some((queue, worker)) = mirror_queue {
        if let Err(err) = queue.flush().await {
            warn!(error = %err, "mirror queue not drained");
        }
        drop(queue);
        drop(mirror);
        if let Err(err) = worker.await {
            warn!(error = %err, "mirror worker ended abnormally");
        }
    }
    info!("territory tracker stopped");
    Ok(())
}

type MirrorQueue = (QueuedMirror, JoinHandle<()>);

fn build_mirror(config: &AppConfig) -> Result<(Arc<dyn MirrorSink>, Option<MirrorQueue>)> {
    let Some(settings) = &config.mirror else {
        info!("no spreadsheet configured, mirroring disabled");
        return Ok((Arc::new(NoopMirror), None));
    };

    let sheets =
        SheetsMirror::new(settings.sheets_config()).context("failed to build mirror client")?;
    let (queue, worker) = QueuedMirror::spawn(Arc::new(sheets));
    info!(spreadsheet_id = %settings.spreadsheet_id, "spreadsheet mirroring enabled");
    Ok((Arc::new(queue.clone()), Some((queue, worker))))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("territory_tracker=debug,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install ctrl+c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install sigterm handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
