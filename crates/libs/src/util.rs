use std::{io, path::PathBuf};

#[cfg(unix)]
pub async fn listen_for_shutdown(notify: std::sync::Arc<tokio::sync::Notify>) {
    let mut sigterm =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("cannot install SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
                notify.notify_waiters();
                return;
            }
        };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm.recv() => {},
    }

    tracing::info!("shutdown signal received – starting graceful shutdown");
    notify.notify_waiters();
}

#[cfg(not(unix))]
pub async fn listen_for_shutdown(notify: std::sync::Arc<tokio::sync::Notify>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received – starting graceful shutdown");
    notify.notify_waiters();
}

/// Per-user data directory for the application, created on demand.
pub fn get_data_dir() -> io::Result<PathBuf> {
    let mut data_dir = dirs::data_dir()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no data directory"))?;
    data_dir.push("virtual_tourist");
    std::fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}
