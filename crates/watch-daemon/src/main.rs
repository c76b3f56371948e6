//! server-watch-mcp: run a command and expose its output over MCP.
//!
//! stdout belongs to the child (or to the stdio protocol when `--stdio` is
//! set). Our own logs always go to stderr.

mod cli;
mod stdio;

use clap::Parser;
use env_logger::Target;
use std::future::pending;
use std::sync::Arc;
use watch_core::store::LogStore;
use watch_core::{ChildState, McpServer, ProcessSupervisor, WatchConfig};
use watch_http::SharedState;

use cli::Cli;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(Target::Stderr)
        .init();

    let config = match Cli::parse().resolve(&mut std::io::stderr()) {
        Ok(config) => config,
        Err(code) => std::process::exit(code),
    };

    // Exit explicitly: a pending stdin read would keep the runtime alive.
    std::process::exit(run(config).await);
}

/// Serve until shutdown and return the process exit code.
async fn run(config: WatchConfig) -> i32 {
    let store = Arc::new(LogStore::new(config.capacity));
    let mcp = McpServer::new(Arc::clone(&store));

    let mut http = None;
    if config.http {
        let state = Arc::new(SharedState::new(mcp.clone()));
        match watch_http::start(state, &config.host, config.port).await {
            Ok(handle) => http = Some(handle),
            Err(e) => {
                log::error!("{e}");
                if !config.stdio {
                    return 1;
                }
            }
        }
    }

    let supervisor = ProcessSupervisor::new(config.supervisor_config(), Arc::clone(&store)).start();

    // With HTTP up, stdio closing only ends that transport.
    let stdio_task = config.stdio.then(|| tokio::spawn(stdio::serve(mcp)));
    let stdio_ends_server = http.is_none();
    let stdio_closed = async move {
        match stdio_task {
            Some(task) if stdio_ends_server => match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!("stdio transport failed: {e}"),
                Err(e) => log::error!("stdio task failed: {e}"),
            },
            _ => pending::<()>().await,
        }
    };

    let exit_with_child = config.exit_with_child;
    let child_exit = async move {
        if exit_with_child {
            supervisor.wait().await
        } else {
            pending::<ChildState>().await
        }
    };

    let code = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                log::error!("Failed to listen for shutdown signal: {e}");
            }
            log::info!("Shutting down");
            0
        }
        state = child_exit => state.exit_code().unwrap_or(1),
        _ = stdio_closed => 0,
    };

    if let Some(mut handle) = http {
        handle.stop().await;
    }
    code
}
