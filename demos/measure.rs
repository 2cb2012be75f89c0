// Single acquisition example
//
// Runs one measurement on an OPUS spectrometer described by a TOML
// configuration file and prints the peak value and the produced file.

use clap::Parser;
use opus_rs::{
    ControllerConfig, DeviceState, OpusController, TemperatureSource, TransportConfig,
    TransportError, AXIS,
};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "measure")]
#[command(version = "1.0")]
#[command(about = "Run one OPUS acquisition")]
#[command(long_about = "Load a controller configuration, run one measurement over the OPUS line protocol and wait for it to finish.")]
struct Args {
    /// Controller configuration file
    config: String,

    /// Sample temperature used for the file name suffix
    #[arg(short, long, help = "Fixed reading in degrees for the [temperature] device of the configuration")]
    temperature: Option<f64>,

    /// Poll interval in milliseconds
    #[arg(short, long, default_value_t = 500, help = "Time between two status polls in milliseconds")]
    poll_interval: u64,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and every protocol exchange")]
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

    let config = ControllerConfig::from_file(&args.config)?;
    if let TransportConfig::Proxy { device } = &config.transport {
        eprintln!("Device server {device} needs an RPC binding, this demo only speaks the line protocol");
        std::process::exit(1);
    }

    println!("OPUS Acquisition");
    println!("================");
    println!("Experiment: {}", config.acquisition.experiment);
    println!("Mode: {:?}", config.acquisition.mode);

    let reading = args.temperature;
    let thermometer = move |device: &str| -> Result<Box<dyn TemperatureSource>, TransportError> {
        let temperature = reading.ok_or_else(|| {
            TransportError::remote("Temperature", format!("no reading given for {device}"))
        })?;
        println!("Temperature: {temperature} (as read from {device})");
        Ok(Box::new(move || -> Result<f64, TransportError> { Ok(temperature) }))
    };

    let mut opus = OpusController::from_config(&config, None, Some(&thermometer))?;
    opus.add_device(AXIS)?;

    if !opus.pre_start_one(AXIS)? {
        eprintln!("Cannot reach the instrument");
        std::process::exit(1);
    }
    if let Some(command) = opus.command() {
        println!("Command: {}", command.as_str());
    }

    let started = Instant::now();
    opus.start_one(AXIS)?;
    let (state, status) = loop {
        let (state, status) = opus.state_one(AXIS)?;
        if state != DeviceState::Acquiring {
            break (state, status);
        }
        std::thread::sleep(Duration::from_millis(args.poll_interval));
    };

    if state == DeviceState::Fault {
        eprintln!("Acquisition failed: {status}");
        std::process::exit(1);
    }

    println!("✓ Finished in {:.1}s ({status})", started.elapsed().as_secs_f64());
    match opus.read_one(AXIS)? {
        Some(peak) => println!("Peak: {peak}"),
        None => println!("Peak: not read"),
    }
    println!("File: {}", opus.ref_one(AXIS)?);
    Ok(())
}
