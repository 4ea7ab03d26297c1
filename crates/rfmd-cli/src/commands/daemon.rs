use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};

use rfmd_core::ipc::is_daemon_running;
use rfmd_core::{AppConfig, DaemonServer};

/// PID recorded in `pid_path`, if that process is still alive
fn running_pid(pid_path: &Path) -> Option<i32> {
    let contents = fs::read_to_string(pid_path).ok()?;
    let pid: i32 = contents.trim().parse().ok()?;

    // Signal 0 only probes for existence.
    if pid > 0 && kill(Pid::from_raw(pid), None).is_ok() {
        return Some(pid);
    }

    // Process not running, clean up stale PID file
    let _ = fs::remove_file(pid_path);
    None
}

fn write_pid_file(pid_path: &Path) -> Result<()> {
    if let Some(parent) = pid_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(pid_path)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(())
}

fn remove_pid_file(pid_path: &Path) {
    let _ = fs::remove_file(pid_path);
}

/// Run the daemon in the foreground until SIGINT or SIGTERM
pub async fn serve(config: Arc<AppConfig>) -> Result<()> {
    let pid_path = config.pid_file();
    if let Some(pid) = running_pid(&pid_path) {
        println!("Daemon is already running (PID: {})", pid);
        return Ok(());
    }

    let server = DaemonServer::new(config.clone())?;
    let listener = server.bind().await?;
    write_pid_file(&pid_path)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received interrupt"),
            _ = terminate.recv() => info!("Received terminate signal"),
        }
        let _ = shutdown_tx.send(true);
    });

    println!(
        "Daemon started (PID: {}) on {}, serving {}",
        std::process::id(),
        listener.local_addr()?,
        server.root().path().display()
    );

    let result = server.serve(listener, shutdown_rx).await;
    if let Err(e) = &result {
        error!("Server stopped with error: {}", e);
    }

    remove_pid_file(&pid_path);
    println!("Daemon stopped.");
    Ok(result?)
}

/// Stop the daemon: SIGTERM first, SIGKILL if it lingers
pub async fn stop(config: &AppConfig) -> Result<()> {
    let pid_path = config.pid_file();
    let Some(pid) = running_pid(&pid_path) else {
        println!("Daemon is not running.");
        return Ok(());
    };

    println!("Stopping daemon (PID: {})...", pid);
    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        println!("Failed to stop daemon ({}). You may need to kill it manually: kill {}", e, pid);
        return Ok(());
    }

    // Wait a moment for graceful shutdown
    tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

    if running_pid(&pid_path).is_none() {
        println!("Daemon stopped successfully.");
    } else {
        let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
        remove_pid_file(&pid_path);
        println!("Daemon forcefully terminated.");
    }

    Ok(())
}

/// Show daemon status
pub async fn status(config: &AppConfig) -> Result<()> {
    let pid_path = config.pid_file();
    match running_pid(&pid_path) {
        Some(pid) => {
            println!("Daemon is running (PID: {})", pid);
            println!("PID file: {}", pid_path.display());
            let addr = super::send::target_addr(config)?;
            let answering = is_daemon_running(addr).await;
            println!(
                "Address: {} ({})",
                addr,
                if answering { "answering" } else { "not answering" }
            );
        }
        None => {
            println!("Daemon is not running.");
        }
    }

    Ok(())
}
