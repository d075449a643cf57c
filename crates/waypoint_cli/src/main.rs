//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `waypoint_core` wiring against a
//!   live backend.
//! - Keep output line-oriented for quick local sanity checks.
//!
//! Usage: `waypoint_cli [TICKS] [--journey]`

use log::info;
use std::process::ExitCode;
use tokio::runtime::Handle;
use waypoint_core::sim::TICK_PERIOD;
use waypoint_core::{core_version, init_from_config, ping, CoreConfig, Role, TrackingEngine};

const DEFAULT_TICKS: u32 = 3;

struct Args {
    ticks: u32,
    journey: bool,
}

fn parse_args(raw: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut args = Args {
        ticks: DEFAULT_TICKS,
        journey: false,
    };
    for arg in raw {
        if arg == "--journey" {
            args.journey = true;
        } else {
            args.ticks = arg
                .parse()
                .map_err(|_| format!("expected tick count or --journey, got `{arg}`"))?;
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> ExitCode {
    println!("waypoint_core ping={}", ping());
    println!("waypoint_core version={}", core_version());

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    let config = match CoreConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config error: {err}");
            return ExitCode::FAILURE;
        }
    };
    if config.log_dir.is_some() {
        if let Err(err) = init_from_config(&config) {
            eprintln!("logging disabled: {err}");
        }
    }

    let engine = match TrackingEngine::from_config(&config, Handle::current()) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("engine error: {err}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        "event=cli_run module=cli status=start ticks={} journey={}",
        args.ticks, args.journey
    );

    engine.login(Role::Citizen);
    let online = engine.check_health().await;
    println!("backend url={} online={online}", config.api_base_url);

    if args.journey {
        engine.start_journey();
    }
    for tick in 1..=args.ticks {
        if tick > 1 {
            tokio::time::sleep(TICK_PERIOD).await;
        }
        let outcome = engine.tick_once().await;
        let view = engine.snapshot();
        println!(
            "tick={tick} poll={outcome:?} entities={} critical={} sync={:?}",
            view.entities.len(),
            view.critical_count(),
            view.journey.backend_sync
        );
    }

    for entity in engine.snapshot().display_order() {
        println!(
            "{:<8} {:<8} ({:>5.1}, {:>5.1}) {} [{}]",
            entity.origin.as_str(),
            entity.status.as_str(),
            entity.position.x,
            entity.position.y,
            entity.name,
            entity.id
        );
    }

    if args.journey {
        engine.end_journey();
        // Let the end notification go out before the runtime stops.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
    engine.teardown();
    info!("event=cli_run module=cli status=ok");
    ExitCode::SUCCESS
}
