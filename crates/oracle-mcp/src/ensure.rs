//! ensure-server
//!
//! Probe the HTTP server's health endpoint and auto-start it when absent.
//! Exit code 0 iff a healthy server is (or becomes) reachable.

use std::time::Duration;

use oracle_core::Config;
use tracing::{info, warn};

/// Health probe timeout
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// How long to wait for a freshly-spawned server
const STARTUP_ATTEMPTS: u32 = 20;
const STARTUP_POLL: Duration = Duration::from_millis(500);

async fn is_healthy(client: &reqwest::Client, port: u16) -> bool {
    let url = format!("http://127.0.0.1:{}/api/health", port);
    match client.get(&url).timeout(PROBE_TIMEOUT).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}

/// Returns the process exit code.
pub async fn ensure_server(config: &Config, status_only: bool, verbose: bool) -> i32 {
    let client = reqwest::Client::new();

    if is_healthy(&client, config.port).await {
        if verbose || status_only {
            println!("oracle server healthy on port {}", config.port);
        }
        return 0;
    }

    if status_only {
        println!("oracle server not running on port {}", config.port);
        return 1;
    }

    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            warn!("cannot resolve own binary path: {}", e);
            return 1;
        }
    };

    info!("starting oracle server on port {}", config.port);
    let spawned = std::process::Command::new(exe)
        .arg("server")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn();
    if let Err(e) = spawned {
        warn!("failed to spawn server: {}", e);
        return 1;
    }

    for attempt in 0..STARTUP_ATTEMPTS {
        tokio::time::sleep(STARTUP_POLL).await;
        if is_healthy(&client, config.port).await {
            if verbose {
                println!(
                    "oracle server healthy on port {} after {:?}",
                    config.port,
                    STARTUP_POLL * (attempt + 1)
                );
            }
            return 0;
        }
    }

    warn!("server did not become healthy within the startup window");
    1
}
