// Raw line protocol example
//
// Sends OPUS pipe commands given on the command line, or read from stdin one
// per line, and prints the replies.

use clap::Parser;
use opus_rs::socket_terminal::DEFAULT_PORT;
use opus_rs::{LineTransport, Transport};
use std::io::BufRead;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "opus_pipe")]
#[command(version = "1.0")]
#[command(about = "Talk to the OPUS pipe server")]
struct Args {
    /// Host running OPUS
    #[arg(long, default_value = "bl01bruker")]
    host: String,

    /// Commands to send; stdin is read when none are given
    commands: Vec<String>,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Reply timeout in milliseconds
    #[arg(short, long, default_value_t = 1000)]
    timeout: u64,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let mut transport = LineTransport::new(&args.host, args.port, Duration::from_millis(args.timeout));
    if !transport.is_connected() {
        eprintln!("Cannot connect to {}", transport.address());
        std::process::exit(1);
    }
    println!("✓ Connected to {}", transport.address());

    let mut send = |command: &str| match transport.send_command(command) {
        Ok(reply) => print!("{reply}"),
        Err(e) => {
            eprintln!("{command}: {e}");
            if !transport.is_connected() && transport.reconnect().is_err() {
                std::process::exit(1);
            }
        }
    };

    if args.commands.is_empty() {
        for line in std::io::stdin().lock().lines() {
            let line = line?;
            let command = line.trim();
            if !command.is_empty() {
                send(command);
            }
        }
    } else {
        for command in &args.commands {
            send(command);
        }
    }
    Ok(())
}
