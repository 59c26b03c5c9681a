use lib_feeds::core::{Visibility, VisibilityController};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Maps SIGUSR1 to `Hidden` and SIGUSR2 to `Visible` until shutdown.
#[cfg(unix)]
pub async fn run(visibility: Arc<VisibilityController>, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hide = signal(SignalKind::user_defined1())?;
    let mut show = signal(SignalKind::user_defined2())?;
    log::info!("Visibility control: SIGUSR1 hides, SIGUSR2 shows.");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Signal service received shutdown signal.");
                break;
            }
            Some(()) = hide.recv() => {
                visibility.set(Visibility::Hidden);
            }
            Some(()) = show.recv() => {
                visibility.set(Visibility::Visible);
            }
        }
    }
    Ok(())
}

/// Visibility stays `Visible` where user signals do not exist.
#[cfg(not(unix))]
pub async fn run(_visibility: Arc<VisibilityController>, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
    let _ = shutdown.recv().await;
    Ok(())
}
