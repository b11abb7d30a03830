//! Two simulated fleets sharing one fire door.
//!
//! Robot `amr-17` (fleet A) and `agv-4` (fleet B) wait on opposite sides of the door.
//! The arbiter admits one; once it has crossed, the other goes.
//!
//! ```text
//! cargo run --example two_fleets
//! RUST_LOG=debug cargo run --example two_fleets
//! cargo run --example two_fleets -- --serve     # keep running until Ctrl-C
//! ```

use std::sync::Arc;
use std::time::Duration;

use spacevisor::{
    AccessControl, Config, LogWriter, QueueStore, RobotState, SimulatedFleet, SiteBuilder,
    SiteConfig, Subscribe,
};
use tracing_subscriber::EnvFilter;

const SITE: &str = r#"{
    "site": "dc-east",
    "spaces": [{ "id": "fire-door-3", "ownerFleet": "fleet-a" }],
    "arbiterPeriodMs": 200,
    "requestPollMs": 200,
    "crossingBudgetMs": 3000
}"#;

const DOOR: [(f64, f64); 4] = [(0.0, 0.0), (0.0, 4.0), (2.0, 4.0), (2.0, 0.0)];

fn enable_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

async fn crossing(sim: &SimulatedFleet, robot: &str, inside: (f64, f64), beyond: (f64, f64)) {
    sim.set_state(robot, RobotState::Moving);
    sim.move_to(robot, inside);
    tokio::time::sleep(Duration::from_secs(1)).await;
    sim.move_to(robot, beyond);
    tokio::time::sleep(Duration::from_secs(1)).await;
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    enable_tracing();
    let serve = std::env::args().any(|a| a == "--serve");

    let fleet_a = Arc::new(
        SimulatedFleet::new(AccessControl::ExclusionZone)
            .with_space("fire-door-3", &DOOR)
            .with_robot("amr-17", (3.0, 2.0), RobotState::Waiting),
    );
    let fleet_b = Arc::new(
        SimulatedFleet::new(AccessControl::LocationTag)
            .with_space("fire-door-3", &DOOR)
            .with_robot("agv-4", (-1.0, 2.0), RobotState::Blocked),
    );

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let site = SiteBuilder::new(Config::default(), SiteConfig::from_json(SITE)?)?
        .with_vendor("fleet-a", fleet_a.clone())
        .with_vendor("fleet-b", fleet_b.clone())
        .with_subscribers(subs)
        .build();

    if serve {
        site.run().await?;
        return Ok(());
    }

    site.start()?;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let store = site.arbiter().store().clone();
    for _ in 0..2 {
        let Some(lock) = store.current_lock_holder("fire-door-3").await? else {
            break;
        };
        tracing::info!(robot = %lock.robot, fleet = %lock.fleet_id, "crossing");
        match lock.fleet_id.as_str() {
            "fleet-a" => crossing(&fleet_a, &lock.robot, (1.0, 2.0), (-4.0, 2.0)).await,
            _ => crossing(&fleet_b, &lock.robot, (1.0, 2.0), (6.0, 2.0)).await,
        }
    }

    site.stop()?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}
