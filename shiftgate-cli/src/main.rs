//! shiftgate-cli - Command-line interface for the shiftgate gateway
//!
//! Sends one request envelope and prints the response. Pointed at the
//! compute engine port it speaks the same framing, so `send` also works
//! for poking the engine directly.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use shiftgate_client::{Client, ConnectionConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shiftgate-cli")]
#[command(about = "Command-line interface for the shiftgate gateway")]
#[command(version)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:5556", env = "SHIFTGATE_SERVER")]
    server: SocketAddr,

    /// Connect and response timeout in seconds
    #[arg(short, long, default_value = "7")]
    timeout: u64,

    /// Print the raw response JSON instead of a summary
    #[arg(long)]
    raw: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send an arbitrary request envelope
    Send {
        /// Protocol name
        protocol: String,

        /// Request data JSON (or @file.json to read from file)
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Staff login
    Login {
        #[arg(long)]
        id: String,

        #[arg(long)]
        pw: String,
    },

    /// Admin login
    LoginAdmin {
        #[arg(long)]
        id: String,

        #[arg(long)]
        pw: String,
    },

    /// List a staff member's shift change requests for a month
    ShiftRequests {
        #[arg(long)]
        staff_uid: i64,

        #[arg(long)]
        year: u32,

        #[arg(long)]
        month: u32,
    },

    /// File a shift change request
    AskShiftChange {
        #[arg(long)]
        staff_uid: i64,

        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// Desired duty code
        #[arg(long)]
        duty_type: String,

        /// Reason
        #[arg(short, long)]
        message: String,
    },

    /// Withdraw a pending shift change request
    CancelShiftChange {
        duty_request_uid: i64,
    },

    /// Generate a team schedule
    GenTimetable {
        #[arg(long)]
        admin_uid: i64,

        #[arg(long)]
        year: u32,

        #[arg(long)]
        month: u32,
    },

    /// Summarize a handover journal (text, or @file to read from file)
    Summary {
        text: String,
    },

    /// Print the SHA-256 digest of a password, for seed fixtures
    HashPassword {
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Handled locally, no server connection needed
    if let Commands::HashPassword { password } = &cli.command {
        println!("{}", commands::hash_password(password));
        return Ok(());
    }

    let request = match commands::build_request(cli.command) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(2);
        }
    };

    let timeout = Duration::from_secs(cli.timeout);
    let config = ConnectionConfig::new(cli.server)
        .with_connect_timeout(timeout)
        .with_request_timeout(timeout);

    let mut client = Client::connect(config).await.map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e
    })?;

    match client.send(&request).await {
        Ok(response) => {
            if cli.raw {
                println!("{}", commands::format_json(&serde_json::to_value(&response)?));
            } else {
                println!("{}", commands::format_response(&response));
            }
            if !response.is_success() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }

    Ok(())
}
