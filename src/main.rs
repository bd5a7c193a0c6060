//! Headless game peer
//!
//! Runs one World over libp2p and reads synthetic input from stdin, one
//! command per line: `left`, `right`, `release`, `act`, `leave`, `blur`,
//! `board`.

use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use domino_trust::network::{GameNode, NodeCommand, NodeConfig, NodeEvent};
use domino_trust::world::{ControlInput, WorldConfig, WorldEvent};

#[derive(Parser)]
#[command(name = "domino-node", about = "Serverless multiplayer domino peer")]
struct Cli {
    /// TCP listen port (0 for random)
    #[arg(long, default_value_t = 0)]
    port: u16,

    /// Multiaddr of a peer to dial, repeatable
    #[arg(long)]
    bootstrap: Vec<libp2p::Multiaddr>,

    /// Directory for the identity key and scoreboard database
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Display name of the local player
    #[arg(long, default_value = "player")]
    name: String,

    /// JSON file overriding world constants
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_world_config(path: Option<&PathBuf>) -> Result<WorldConfig, String> {
    let Some(path) = path else {
        return Ok(WorldConfig::default());
    };
    let json = std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    WorldConfig::from_json(&json).map_err(|e| format!("{}: {}", path.display(), e))
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Control(ControlInput),
    Board,
}

fn parse_command(line: &str) -> Option<Command> {
    let input = match line.trim() {
        "left" => ControlInput::MoveLeft,
        "right" => ControlInput::MoveRight,
        "release" => ControlInput::Release,
        "act" => ControlInput::Interact,
        "leave" => ControlInput::Leave,
        "blur" => ControlInput::Blur,
        "board" => return Some(Command::Board),
        _ => return None,
    };
    Some(Command::Control(input))
}

/// Forward stdin lines to the node until EOF
async fn read_input(commands: mpsc::Sender<NodeCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        match parse_command(&line) {
            Some(Command::Control(input)) => {
                if commands.send(NodeCommand::Control(input)).await.is_err() {
                    break;
                }
            }
            Some(Command::Board) => {
                let (tx, rx) = oneshot::channel();
                if commands.send(NodeCommand::Leaderboard(tx)).await.is_err() {
                    break;
                }
                if let Ok(records) = rx.await {
                    for (rank, record) in records.iter().enumerate() {
                        println!(
                            "{}. {} - {} dominoes, {} players",
                            rank + 1,
                            record.name,
                            record.dominoes,
                            record.participants
                        );
                    }
                }
            }
            None => tracing::warn!("Unknown command: {}", line.trim()),
        }
    }

    let _ = commands.send(NodeCommand::Shutdown).await;
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let world = match load_world_config(cli.config.as_ref()) {
        Ok(world) => world,
        Err(e) => {
            tracing::error!("Invalid config: {}", e);
            std::process::exit(1);
        }
    };

    let mut config = NodeConfig {
        listen_port: cli.port,
        bootstrap_peers: cli.bootstrap,
        name: cli.name,
        world,
        ..NodeConfig::default()
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    tracing::info!("Data directory {:?}", config.data_dir);

    let (mut node, mut events) = match GameNode::new(config).await {
        Ok(started) => started,
        Err(e) => {
            tracing::error!("Failed to start node: {}", e);
            std::process::exit(1);
        }
    };

    for event in [
        WorldEvent::PlayerEnter,
        WorldEvent::PlayerExit,
        WorldEvent::PlayerAttack,
        WorldEvent::PlayerCall,
        WorldEvent::PlayerPush,
        WorldEvent::GameEnd,
    ] {
        node.world_mut().subscribe(event, move |player| match player {
            Some(p) => tracing::info!("{:?}: {} at {:.2}", event, p.name, p.position),
            None => tracing::info!("{:?}", event),
        });
    }

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let NodeEvent::Listening { address } = event {
                println!("listening on {}", address);
            }
        }
    });

    tokio::spawn(read_input(node.commands()));

    node.run().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("left\n"), Some(Command::Control(ControlInput::MoveLeft)));
        assert_eq!(parse_command(" act "), Some(Command::Control(ControlInput::Interact)));
        assert_eq!(parse_command("board"), Some(Command::Board));
        assert_eq!(parse_command("jump"), None);
    }

    #[test]
    fn test_missing_config_file() {
        let path = PathBuf::from("/nonexistent/world.json");
        assert!(load_world_config(Some(&path)).is_err());
        assert_eq!(load_world_config(None).unwrap().trial_window_ms, 300);
    }
}
