//! Arena Server - runs one authoritative arena match
//!
//! Starts a match for the configured mode and map, with agents filling every
//! seat, and logs its lifecycle until the match ends or the process is asked
//! to stop.

use std::sync::Arc;

use rand::Rng;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use arena_core::config::Config;
use arena_core::game::{GameMatch, MatchCoordinator, MatchHandle, MatchRegistry, SessionMsg};
use arena_core::protocol::CoreEvent;
use arena_core::util::time::TickClock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config.log_level, config.log_json);

    info!("Starting Arena Server");
    let tuning = config.load_tuning()?;
    let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
    info!(
        seed,
        tps = config.simulation_tps,
        snapshot_tps = config.snapshot_tps,
        mode = %config.mode,
        map = %config.map,
        "Configuration loaded"
    );

    let registry = Arc::new(MatchRegistry::new());
    let coordinator = MatchCoordinator::new(tuning, TickClock::new(config.simulation_tps), seed);
    let (game_match, handle) = GameMatch::new(Uuid::new_v4(), coordinator, config.snapshot_tps);
    registry.insert(handle.clone());

    let mut rx = handle.subscribe();
    let task = tokio::spawn(game_match.run());
    handle.start(config.mode, config.map.clone()).await?;

    tokio::select! {
        _ = follow(&handle, &mut rx) => {}
        _ = shutdown_signal() => {}
    }

    // the task may already be gone after a finished match
    let _ = handle.shutdown().await;
    task.await?;
    registry.remove(&handle.id);

    info!(active_matches = registry.active_matches(), "Server shutdown complete");
    Ok(())
}

/// Log lifecycle events until the match ends
async fn follow(handle: &MatchHandle, rx: &mut tokio::sync::broadcast::Receiver<SessionMsg>) {
    loop {
        match rx.recv().await {
            Ok(SessionMsg::Events { events, tick, .. }) => {
                for event in events {
                    match event {
                        CoreEvent::KillFeed(entry) => info!(
                            match_id = %handle.id,
                            tick,
                            killer = %entry.killer_name,
                            victim = %entry.victim_name,
                            weapon = %entry.weapon_name,
                            "Kill"
                        ),
                        CoreEvent::MatchEnded {
                            winner,
                            duration_secs,
                            results,
                        } => {
                            for r in &results {
                                info!(
                                    match_id = %handle.id,
                                    name = %r.name,
                                    kills = r.kills,
                                    deaths = r.deaths,
                                    experience = r.experience,
                                    credits = r.credits,
                                    won = r.won,
                                    "Result"
                                );
                            }
                            info!(match_id = %handle.id, winner = ?winner, duration_secs, "Match over");
                            return;
                        }
                        _ => {}
                    }
                }
            }
            Ok(SessionMsg::Snapshot { .. }) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(match_id = %handle.id, skipped, "Event subscriber lagged");
            }
            Err(RecvError::Closed) => return,
        }
    }
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
