//! # v2mgr CLI Entry Point
//!
//! The main executable for managing a V2Ray instance. This file drives the application lifecycle:
//!
//! 1. **Initialization**: Installs logging and parses command-line arguments using [`cli::Cli`].
//! 2. **Setup**: Loads the staged schemas and builds the clients via `v2mgr_core`.
//! 3. **Execution**: Delegates each command to one `V2rayManager` operation.
//! 4. **Presentation**: Prints replies as JSON, failures in red.

mod cli;
mod formatter;
mod sync;

use clap::Parser;
use cli::{Cli, Commands, LoggerCommands, StatsCommands, UserCommands};
use formatter::{FormattedString, SyncReport};
use std::process;
use tracing_subscriber::EnvFilter;
use v2mgr_core::{ManagerConfig, OperationError, Reply, UserSpec, V2rayManager};

#[tokio::main]
async fn main() {
    init_tracing();

    let args = Cli::parse();
    let config = ManagerConfig::new(args.addr, args.protos);

    match args.command {
        Commands::SyncProtos { source } => match sync::sync_protos(&source, &config.proto_dir) {
            Ok(count) => println!("{}", FormattedString::from(SyncReport(count, &config.proto_dir))),
            Err(err) => {
                eprintln!("{}", FormattedString::from(err));
                process::exit(1);
            }
        },
        Commands::Stats { sub } => {
            let manager = connect_or_exit(&config);
            let outcome = match sub {
                StatsCommands::Sys => manager.get_sys_stats().await,
                StatsCommands::Query { pattern, reset } => {
                    manager.query_stats(pattern.as_deref(), reset).await
                }
                StatsCommands::Get { name, reset } => manager.get_stats(&name, reset).await,
            };
            print_reply(outcome);
        }
        Commands::Logger { sub } => {
            let manager = connect_or_exit(&config);
            match sub {
                LoggerCommands::Restart => print_reply(manager.restart_logger().await),
                LoggerCommands::Follow => follow_log(&manager).await,
            }
        }
        Commands::User { sub } => {
            let manager = connect_or_exit(&config);
            let outcome = match sub {
                UserCommands::Add {
                    protocol,
                    tag,
                    email,
                    level,
                    account,
                } => {
                    let user = UserSpec {
                        level,
                        email,
                        account,
                    };
                    manager.add_inbound_user(protocol, user, &tag).await
                }
                UserCommands::Remove { email, tag } => {
                    manager.remove_inbound_user(&email, &tag).await
                }
            };
            print_reply(outcome);
        }
    }
}

/// Logs go to stderr so replies on stdout stay machine readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn connect_or_exit(config: &ManagerConfig) -> V2rayManager {
    match V2rayManager::connect(config) {
        Ok(manager) => manager,
        Err(err) => {
            eprintln!("{}", FormattedString::from(err));
            process::exit(1);
        }
    }
}

fn print_reply(outcome: Result<Reply, OperationError>) {
    match outcome {
        Ok(Ok(value)) => println!("{}", FormattedString::from(value)),
        Ok(Err(failure)) => println!("{}", FormattedString::from(failure)),
        Err(err) => {
            eprintln!("{}", FormattedString::from(err));
            process::exit(1);
        }
    }
}

async fn follow_log(manager: &V2rayManager) {
    let outcome = manager
        .follow_log(|event| match event {
            Ok(record) => println!("{}", FormattedString::from(record)),
            Err(failure) => println!("{}", FormattedString::from(failure)),
        })
        .await;

    if let Err(err) = outcome {
        eprintln!("{}", FormattedString::from(err));
        process::exit(1);
    }
}
