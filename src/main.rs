use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use reeltime::backend::{run_compactor, Backend, HttpBackend, LocalStore};
use reeltime::calendar::SystemClock;
use reeltime::config::{BackendConfig, Config};
use reeltime::notify::NotifyHub;
use reeltime::scheduler::{Scheduler, Trigger};
use reeltime::service::{PriceListService, VoucherService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    reeltime::observability::init(config.metrics_port)?;

    let backend: Arc<dyn Backend> = match &config.backend {
        BackendConfig::Local { data_dir, compact_threshold } => {
            std::fs::create_dir_all(data_dir)?;
            let store = Arc::new(LocalStore::open(&data_dir.join("reeltime.journal"))?);
            tokio::spawn(run_compactor(store.clone(), *compact_threshold));
            info!("backend: local store in {}", data_dir.display());
            store
        }
        BackendConfig::Http { base_url, token, timeout } => {
            let client = HttpBackend::new(base_url, token.clone(), *timeout)?;
            info!("backend: {}", client.base_url());
            Arc::new(client)
        }
    };
    info!("  tick: {:?}", config.tick);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let clock = Arc::new(SystemClock);
    let notify = Arc::new(NotifyHub::new());
    let price_lists = PriceListService::new(backend.clone(), clock.clone(), notify.clone());
    let vouchers = Arc::new(VoucherService::new(backend, clock, notify));

    match price_lists.refresh().await {
        Ok(lists) => info!("{} price lists loaded", lists.len()),
        Err(e) => warn!("could not load price lists: {e}"),
    }
    if let Err(e) = price_lists.gap_report().await {
        warn!("gap report unavailable: {e}");
    }

    let scheduler = Scheduler::spawn(vouchers.clone(), config.tick);

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    warn!("no SIGTERM handler: {e}");
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else {
                    // stdin closed: keep running on the timer until signalled
                    (&mut shutdown).await;
                    break;
                };
                match line.trim() {
                    "" => {}
                    "focus" => scheduler.notify(Trigger::FocusRegained),
                    "back" => scheduler.notify(Trigger::Navigation),
                    "refresh" => scheduler.notify(Trigger::Manual),
                    "gaps" => match price_lists.gap_report().await {
                        Ok(report) if !report.has_gap => info!("price list timeline is gap-free"),
                        Ok(_) => {}
                        Err(e) => warn!("gap report failed: {e}"),
                    },
                    "status" => {
                        let snapshot = vouchers.latest();
                        let enabled = snapshot.data.iter().filter(|v| v.status.is_enabled()).count();
                        info!(
                            "vouchers: {} total, {} enabled (snapshot {})",
                            snapshot.data.len(),
                            enabled,
                            snapshot.seq
                        );
                    }
                    "quit" => break,
                    other => warn!("unknown command {other:?} (focus, back, refresh, gaps, status, quit)"),
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    scheduler.shutdown().await;
    info!("reeltime stopped");
    Ok(())
}
