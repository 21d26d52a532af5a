//! Run a two-worker team described by a config file.
//!
//! ```text
//! cargo run --example config_team -- demos/team.yaml "Reverse a linked list in C++"
//! ```
//!
//! Set `RUST_LOG=info` to watch turns, resets and supervisor polls.

use async_trait::async_trait;
use palette::event::{EventHandler, TeamEvent};
use palette::{ConfigMap, TeamBuilder};
use std::sync::Arc;

struct ConsoleEvents;

#[async_trait]
impl EventHandler for ConsoleEvents {
    async fn on_team_event(&self, event: &TeamEvent) {
        match event {
            TeamEvent::TurnCompleted {
                worker,
                turn,
                response_length,
            } => println!("  turn {} by {} ({} chars)", turn, worker, response_length),
            TeamEvent::AttemptCompleted {
                attempt,
                token_estimate,
                over_threshold,
                ..
            } => println!(
                "  attempt {}: ~{} tokens{}",
                attempt,
                token_estimate,
                if *over_threshold { " (over budget)" } else { "" }
            ),
            TeamEvent::RosterReset { trigger, generation } => {
                println!("  team reset #{}: {}", generation, trigger)
            }
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    palette::init_logger();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "demos/team.yaml".to_string());
    let task = args
        .next()
        .unwrap_or_else(|| "Write a function that reverses a singly linked list in C++.".into());

    let team = TeamBuilder::new()
        .with_config(ConfigMap::load(&config_path)?)
        .with_event_handler(Arc::new(ConsoleEvents))
        .build()?;

    println!("Team: {}", team.display_roster().join(", "));
    if let Some(warning) = team.check_input_tokens(&task).message() {
        println!("{}", warning);
    }

    let result = team.run(&task).await?;
    if let Some(rejection) = &result.input_rejection {
        println!("{}", rejection.message().unwrap_or_default());
    } else {
        for message in &result.transcript {
            println!("\n[{}]\n{}", message.source, message.content);
        }
        println!(
            "\n{} attempt(s), ~{} tokens",
            result.attempts, result.token_estimate
        );
    }

    let report = team.health_report().await;
    println!(
        "\nSupervisor: active={} uptime={:?} checks={} status={}",
        report.active, report.uptime, report.total_checks, report.current_status
    );
    for entry in team.supervisor_logs() {
        println!("{}", entry);
    }

    team.stop_supervisor().await;
    Ok(())
}
