//! QuickKV - A Single-Threaded In-Memory Key-Value Server
//!
//! Entry point: parses the configuration, binds the reactor, runs it on its
//! own thread and waits for a termination signal on this one.

use anyhow::Context;
use clap::Parser;
use quickkv::config::Config;
use quickkv::server::{termination_signal, EngineContext, Reactor, ShutdownCoordinator};
use std::sync::Arc;
use std::thread;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn print_banner(config: &Config, addr: std::net::SocketAddr) {
    println!(
        r#"
QuickKV v{} - Single-Threaded In-Memory Key-Value Server
──────────────────────────────────────────────────────────────
Listening on {}
Keys limit {} ({}), AOF {}

Use Ctrl+C to shutdown gracefully.
"#,
        quickkv::VERSION,
        addr,
        config.keys_limit,
        config.eviction_strategy,
        config.aof_file.display()
    );
}

fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::parse());
    config.validate().context("invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let ctx = Arc::new(EngineContext::new());
    let reactor = Reactor::bind(&config, Arc::clone(&ctx)).context("failed to start server")?;
    print_banner(&config, reactor.local_addr());

    let coordinator = ShutdownCoordinator::new(reactor.shutdown_handle(), &config.aof_file);
    let reactor = thread::Builder::new()
        .name("reactor".to_string())
        .spawn(move || reactor.run())
        .context("failed to spawn reactor thread")?;

    let report = coordinator
        .run(termination_signal(), reactor)
        .context("shutdown failed")?;
    info!(
        keys = report.keys_persisted.unwrap_or(0),
        clients = report.clients_dropped,
        "Server shutdown complete"
    );

    Ok(())
}
