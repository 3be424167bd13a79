//! Watches a Komari fleet from the terminal.
//!
//! Configuration comes from `KOMARI_BASE_URL` and friends. The program runs
//! the startup sequence, prints the fleet every few seconds and reports
//! connection notices as they arrive. Stop it with Ctrl-C.

use komari_client::{ConnectionOrchestrator, KomariClient, KomariConfig, KomariResult, Notice};
use std::time::Duration;

#[tokio::main]
async fn main() -> KomariResult<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = KomariConfig::from_env()?;
    let orchestrator = komari_client::create(&config)?;
    let mut notices = orchestrator.subscribe_notices();

    orchestrator.init().await?;
    if let Some(settings) = orchestrator.status().public_settings {
        println!("\n📊 {}", settings.sitename);
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    for _ in 0..12 {
        tokio::select! {
            _ = ticker.tick() => print_fleet(&orchestrator),
            Ok(notice) = notices.recv() => match notice {
                Notice::ReconnectAdvisory => println!("⚠️  Connection lost, reconnecting..."),
                Notice::FallbackToHttp => println!("⚠️  Falling back to HTTP polling"),
                Notice::ConnectionError => println!("❌ Backend unreachable"),
            },
        }
    }

    orchestrator.dispose();
    Ok(())
}

fn print_fleet(orchestrator: &ConnectionOrchestrator<KomariClient>) {
    let store = orchestrator.store();
    println!(
        "\n{} ({}/{} online)",
        store.connection_state(),
        store.online_count(),
        store.total_count()
    );
    println!("------------------------");
    for node in store.nodes() {
        let status = node.status();
        println!(
            "{:<24} {:<8} cpu {:>5.1}%  up {}s",
            node.descriptor().name,
            if node.is_online() { "online" } else { "offline" },
            status.cpu,
            status.uptime
        );
    }
}
