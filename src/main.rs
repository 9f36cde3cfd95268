use anyhow::Result;
use std::sync::Arc;
use tc_shaper::command::{CommandRunner, HostRunner};
use tc_shaper::config::AppConfig;
use tc_shaper::discovery::Discovery;
use tc_shaper::docker_repo::{ContainerRuntime, DockerRepo};
use tc_shaper::link_repo::{LinkConfig, LinkRepo};
use tc_shaper::routes;
use tc_shaper::tc::{TcConfig, TcInstaller};
use tc_shaper::worker::{self, Reconciler, StatusBoard, WatcherConfig, WatcherDeps};
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = AppConfig::load()?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        failure_policy = ?app_config.reconcile.failure_policy,
        "starting tc-shaper"
    );

    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(DockerRepo::connect(app_config.docker.socket.as_deref())?);
    let runner: Arc<dyn CommandRunner> = Arc::new(HostRunner);

    let links = LinkRepo::new(
        runtime.clone(),
        runner.clone(),
        LinkConfig {
            ip_path: app_config.shaping.ip_path.clone(),
            netns_dir: app_config.shaping.netns_dir.clone(),
            link_netns: app_config.shaping.link_netns,
        },
    );
    let discovery = Discovery::new(runtime.clone(), links, app_config.reconcile.failure_policy);
    let installer = TcInstaller::new(
        runner,
        TcConfig {
            tc_path: app_config.shaping.tc_path.clone(),
            ip_path: app_config.shaping.ip_path.clone(),
        },
    );
    let status = Arc::new(StatusBoard::default());
    let reconciler = Arc::new(Reconciler::new(discovery, installer, status.clone()));

    let (trigger, trigger_rx) = worker::trigger_channel();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let reconciler_handle = worker::spawn_reconciler(
        reconciler,
        trigger_rx,
        Duration::from_millis(app_config.reconcile.debounce_ms),
    );
    let watcher_handle = worker::spawn_event_watcher(
        WatcherDeps {
            runtime,
            trigger,
            shutdown_rx,
        },
        WatcherConfig {
            resync_interval: Duration::from_secs(app_config.reconcile.resync_interval_secs),
            event_retry: Duration::from_secs(app_config.reconcile.event_retry_secs),
        },
    );

    let server = async {
        if !app_config.server.enabled {
            return std::future::pending::<Result<()>>().await;
        }
        let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("Status API listening on http://{}", addr);
        axum::serve(listener, routes::app(status)).await?;
        Ok(())
    };

    tokio::select! {
        result = server => {
            result?;
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
        }
    }

    // Watcher exit drops the last Trigger; the reconciler finishes its pass and stops.
    let _ = shutdown_tx.send(());
    let _ = watcher_handle.await;
    let _ = reconciler_handle.await;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
