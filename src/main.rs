use std::time::Duration;

use anyhow::anyhow;
use dotenvy::dotenv;
use tracing::{error, info, warn};

mod config;
mod export;
mod handlers;
mod llm;
mod session;
mod state;
mod ui;
mod utils;

use config::CONFIG;
use handlers::commands::Command;
use llm::GeminiAnalyzer;
use session::{Session, SessionFlow};
use utils::logging::init_logging;

#[derive(Debug, Default, PartialEq, Eq)]
struct LaunchArgs {
    photo: Option<String>,
    name: Option<String>,
    age: Option<String>,
    traits: Option<String>,
}

fn usage() -> &'static str {
    "Usage: mindsprout [--photo <path>] [--name <text>] [--age <text>] [--traits <text>]"
}

/// Returns `Ok(None)` when usage was requested.
fn parse_launch_args(args: &[String]) -> anyhow::Result<Option<LaunchArgs>> {
    let mut launch = LaunchArgs::default();

    let mut index = 1;
    while index < args.len() {
        let flag = args[index].as_str();
        let slot = match flag {
            "--photo" => &mut launch.photo,
            "--name" => &mut launch.name,
            "--age" => &mut launch.age,
            "--traits" => &mut launch.traits,
            "--help" | "-h" => return Ok(None),
            other => return Err(anyhow!("Unknown argument: {other}\n{}", usage())),
        };
        index += 1;
        let value = args
            .get(index)
            .ok_or_else(|| anyhow!("Missing value for {flag}"))?;
        *slot = Some(value.clone());
        index += 1;
    }

    Ok(Some(launch))
}

impl LaunchArgs {
    fn into_commands(self) -> Vec<Command> {
        let mut commands = Vec::new();
        if let Some(photo) = self.photo {
            commands.push(Command::Photo(photo));
        }
        if let Some(name) = self.name {
            commands.push(Command::Name(name));
        }
        if let Some(age) = self.age {
            commands.push(Command::Age(age));
        }
        if let Some(traits) = self.traits {
            commands.push(Command::Traits(traits));
        }
        commands
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let _guards = init_logging();

    let args: Vec<String> = std::env::args().collect();
    let Some(launch) = parse_launch_args(&args)? else {
        println!("{}", usage());
        return Ok(());
    };

    if CONFIG.gemini_api_key.trim().is_empty() {
        warn!("GEMINI_API_KEY is not set; analysis requests will fail");
    }
    info!(
        "Starting MINDSPROUT (model={}, export_dir={})",
        CONFIG.gemini_model,
        CONFIG.export_dir.display()
    );

    let mut session = Session::new(
        GeminiAnalyzer::from_config(),
        Duration::from_millis(CONFIG.loading_message_interval_ms),
        &CONFIG.export_dir,
    );
    for command in launch.into_commands() {
        if let SessionFlow::Notice(text) = session.handle_command(command).await? {
            println!("{text}");
        }
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    if let Err(err) = session.run(stdin, &mut stdout).await {
        error!("Session ended with error: {:#}", err);
        return Err(err);
    }
    info!("Session closed");
    Ok(())
}
