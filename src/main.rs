use mimalloc::MiMalloc;
use tabshare::config::CONFIG;
use tabshare::db::PatientStore;
use tabshare::{ChangeEvent, RetryPolicy, bootstrap, notify, session};
use tokio::{signal, sync::mpsc};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = &*CONFIG;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.basic.database_url,
        loglevel = %cfg.basic.loglevel,
        channel = %cfg.session.channel_name,
        retry_max_attempts = cfg.session.retry_max_attempts,
        retry_initial_delay_ms = cfg.session.retry_initial_delay_ms,
    );

    let policy = RetryPolicy::from(&cfg.session);
    let conn = session::acquire().await?;
    bootstrap::ensure_schema(&conn, &policy).await?;

    let notifier = notify::global();
    let (refresh_tx, mut refresh_rx) = mpsc::channel::<()>(1);
    let _subscription = notifier.subscribe(move |event| {
        if event == ChangeEvent::Update {
            // A pending refresh already covers this one.
            let _ = refresh_tx.try_send(());
        }
    })?;

    refresh(&PatientStore::new(conn, notifier, policy)).await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(()) = refresh_rx.recv() => {
                match session::acquire().await {
                    Ok(conn) => refresh(&PatientStore::new(conn, notifier, policy)).await,
                    Err(e) => warn!(error = %e, "Could not reacquire session for refresh"),
                }
            }
            () = &mut shutdown => break,
        }
    }

    info!("Context has shut down gracefully.");
    Ok(())
}

async fn refresh(store: &PatientStore<'_>) {
    match store.list().await {
        Ok(patients) => {
            info!(count = patients.len(), "Rendering patients");
            for p in &patients {
                info!(id = p.id, "{}, {}, {}, {}", p.name, p.age, p.gender, p.address);
            }
        }
        Err(e) => warn!(error = %e, "Error fetching patients"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
