//! ltc-delay - measure audio round-trip delay with an LTC loop-back
//!
//! Command-line entry point: argument parsing, logging setup, signal
//! handling and the engine lifecycle.

use anyhow::{bail, Result};
use ltc_delay::{AudioEngine, EngineConfig};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ltc_delay=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config = EngineConfig::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--version" | "-V" => {
                println!("ltc-delay {}", ltc_delay::VERSION);
                return Ok(());
            }
            "--list" => {
                list_devices()?;
                return Ok(());
            }
            "--debug" | "-d" => {
                config.debug = true;
            }
            "--level" | "-l" => {
                let value = take_value(&args, i, "--level")?;
                let level: f32 = value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid level: {value}"))?;
                config.level_dbfs = level.clamp(-192.0, 0.0);
                println!("Output level {:.2} dBFS", config.level_dbfs);
                i += 1;
            }
            "--fps" | "-f" => {
                let value = take_value(&args, i, "--fps")?;
                let fps: u32 = value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid frame rate: {value}"))?;
                if ![24, 25, 30].contains(&fps) {
                    bail!("frame rate must be 24, 25 or 30");
                }
                config.fps = fps;
                i += 1;
            }
            "--input" | "-i" => {
                config.input_device = Some(take_value(&args, i, "--input")?.to_string());
                i += 1;
            }
            "--output" | "-o" => {
                config.output_device = Some(take_value(&args, i, "--output")?.to_string());
                i += 1;
            }
            arg => {
                eprintln!("unknown argument: {arg}");
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    run(config)
}

fn take_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i + 1)
        .map(|s| s.as_str())
        .ok_or_else(|| anyhow::anyhow!("{flag} requires a value"))
}

fn print_help() {
    println!("ltc-delay - measure audio round-trip delay with an LTC loop-back");
    println!();
    println!("Usage: ltc-delay [OPTIONS]");
    println!();
    println!("Route the output signal through the equipment under test and back");
    println!("into the input; the average loop delay is reported in samples.");
    println!();
    println!("Options:");
    println!("  -l, --level <dBFS>   output level in dBFS (default -6, range -192..0)");
    println!("  -f, --fps <rate>     LTC frame rate: 24, 25 or 30 (default 25)");
    println!("  -i, --input <name>   input device (default: system default)");
    println!("  -o, --output <name>  output device (default: system default)");
    println!("  -d, --debug          print one line per correlated frame");
    println!("      --list           list audio devices and exit");
    println!("  -h, --help           display this help and exit");
    println!("  -V, --version        print version information and exit");
}

fn list_devices() -> Result<()> {
    let devices = AudioEngine::list_devices()?;
    if devices.is_empty() {
        println!("no audio devices found");
        return Ok(());
    }
    for device in devices {
        let mut tags = Vec::new();
        if device.is_default_input {
            tags.push("default in");
        }
        if device.is_default_output {
            tags.push("default out");
        }
        let tags = if tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", tags.join(", "))
        };
        println!(
            "{} (in: {}, out: {}){}",
            device.name, device.input_channels, device.output_channels, tags
        );
    }
    Ok(())
}

fn run(config: EngineConfig) -> Result<()> {
    let mut engine = AudioEngine::new(config);
    engine.start()?;

    // The handler only flips the session state atomically and fires the
    // wake primitive; all cleanup happens below on this thread.
    let session = engine.session();
    ctrlc::set_handler(move || session.request_shutdown())?;

    engine.run()?;
    engine.stop();
    println!("bye.");
    Ok(())
}
