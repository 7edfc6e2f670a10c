use std::process::exit;
use std::time::Duration;

use ads8684::{logging, Ads8684, DriverError, Samples, SerialConfig, DEFAULT_BAUD_RATE};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "ads8684", about = "Talk to an ADS8684 fast-readout board")]
struct Args {
    /// Serial port (e.g. /dev/ttyACM0 or COM8)
    #[arg(short, long, env = "ADS8684_PORT")]
    port: Option<String>,
    /// Per-read timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
    /// Nominal baud rate
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List serial ports
    Ports,
    #[command(flatten)]
    Device(DeviceCmd),
}

#[derive(Subcommand, Debug)]
enum DeviceCmd {
    /// Print device status
    Status,
    /// Set active channels
    Chans {
        #[arg(required = true)]
        chans: Vec<u8>,
    },
    /// Set the range number of each active channel (0-4)
    Ranges {
        #[arg(required = true)]
        ranges: Vec<u8>,
    },
    /// Acquire and print in text mode (diagnostic)
    ReadText { npts: u32 },
    /// Acquire in binary mode and print one array per channel
    Read {
        npts: u32,
        /// Print raw ADC codes instead of volts
        #[arg(long)]
        raw: bool,
    },
    /// Reset the device
    Reset,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let verbosity = match args.verbose {
        0 => None,
        1 => Some(LevelFilter::Debug),
        _ => Some(LevelFilter::Trace),
    };
    logging::init_rust_logging(verbosity);

    let command = match args.command {
        Cmd::Ports => {
            for p in Ads8684::list_ports()? {
                println!("{} - {:?}", p.port_name, p.port_type);
            }
            return Ok(());
        }
        Cmd::Device(command) => command,
    };

    let port = args
        .port
        .context("no serial port given (use --port or ADS8684_PORT)")?;
    let config = SerialConfig::new(port)
        .with_timeout(Duration::from_millis(args.timeout_ms))
        .with_baud_rate(args.baud);
    let mut ads = Ads8684::open_with(&config)
        .with_context(|| format!("Failed to open serial port at {}", config.port))?;

    let out = match execute(&mut ads, command) {
        Ok(out) => out,
        Err(e) => {
            if ads.is_desynced() {
                eprintln!("The device may be mid-transfer; try `ads8684 reset`.");
            }
            return Err(e.into());
        }
    };
    println!("{}", serde_json::to_string_pretty(&out)?);

    ads.close();
    Ok(())
}

fn execute(ads: &mut Ads8684, command: DeviceCmd) -> Result<Value, DriverError> {
    let out = match command {
        DeviceCmd::Status => Value::Object(ads.status()?),
        DeviceCmd::Chans { chans } => Value::Object(ads.chans(&chans)?),
        DeviceCmd::Ranges { ranges } => Value::Object(ads.ranges(&ranges)?),
        DeviceCmd::ReadText { npts } => Value::Object(ads.read_text_mode(npts)?),
        DeviceCmd::Read { npts, raw } => {
            let samples = ads.read_binary_mode(npts, !raw)?;
            info!(
                "Read {} channels x {} samples",
                samples.channels(),
                samples.samples_per_channel()
            );
            match samples {
                Samples::Volts(rows) => serde_json::to_value(rows)?,
                Samples::Codes(rows) => serde_json::to_value(rows)?,
            }
        }
        DeviceCmd::Reset => Value::Object(ads.reset()?),
    };
    Ok(out)
}
