//! `fuddle-watch`: connects to the registry and logs the cluster view.
//!
//! Configured through `CONFIG_PATH` and `FUDDLE__*` environment variables,
//! see [`fuddle::FuddleConfig`]. Log output follows `RUST_LOG`.

use fuddle::Fuddle;
use fuddle::FuddleConfig;
use fuddle::Member;
use fuddle::Result;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tracing::error;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    init_observability();

    let settings = FuddleConfig::new()?.validate()?;

    let mut builder = Fuddle::builder(settings.seeds)
        .set_config(settings.client)
        .on_connection_state_change(|state| info!(%state, "connection state"));
    if let Some(filter) = settings.filter {
        builder = builder.filter(filter);
    }
    let client = builder.connect().await?;
    info!(client_id = %client.client_id(), seed = %client.seed(), "watching registry");

    let subscription = client.subscribe(log_members, None);

    if let Err(e) = shutdown_signal().await {
        error!("failed to listen for shutdown signal: {}", e);
    }

    subscription.unsubscribe();
    client.close().await;
    info!("Exiting program.");
    Ok(())
}

fn log_members(mut members: Vec<Member>) {
    members.sort_by(|a, b| a.service.cmp(&b.service).then_with(|| a.id.cmp(&b.id)));
    info!(count = members.len(), "cluster view changed");
    for m in &members {
        info!(
            member.id = %m.id,
            member.service = %m.service,
            member.locality = %m.locality,
            member.revision = %m.revision,
            metadata = ?m.metadata,
            "member"
        );
    }
}

async fn shutdown_signal() -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
    }
    Ok(())
}

fn init_observability() {
    let base_subscriber = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();
}
