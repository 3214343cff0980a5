mod scenario;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use pds_core::logging::{LogConfig, LogLevel};
use pds_core::Device;
use pds_se30::testbench::Testbench;
use pds_se30::{BridgeConfig, Se30Bridge, TransferSize};
use scenario::{Request, Scenario};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pds-trace", about = "Run scripted SE/30 slot cycles against the bridge")]
struct Args {
    /// Scenario to run
    #[arg(value_enum)]
    scenario: Scenario,

    /// Slot byte address (hex with 0x or $ prefix, or decimal)
    #[arg(long, value_parser = parse_u32)]
    address: Option<u32>,

    /// Data written, or preloaded for reads
    #[arg(long, value_parser = parse_u32, default_value = "0xCAFEBABE")]
    data: u32,

    /// Host transfer size: long, byte, word or 3byte
    #[arg(long, value_parser = parse_size, default_value = "long")]
    size: TransferSize,

    /// Give up waiting for a handshake after this many ticks
    #[arg(long, default_value_t = 4096)]
    ticks: u32,

    /// Bridge configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dump the final save-state to this file as JSON
    #[arg(long)]
    save: Option<PathBuf>,

    /// Print one JSON record per tick
    #[arg(long, default_value_t = false)]
    trace: bool,

    /// Bridge log level: off, error, warn, info, debug, trace
    #[arg(long)]
    log_level: Option<String>,

    /// Write bridge logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Bridge log messages allowed per category per second
    #[arg(long)]
    log_rate: Option<usize>,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(&hex.replace('_', ""), 16)
    } else if let Some(hex) = s.strip_prefix('$') {
        u32::from_str_radix(&hex.replace('_', ""), 16)
    } else {
        s.replace('_', "").parse()
    };
    parsed.map_err(|e| format!("invalid number {s:?}: {e}"))
}

fn parse_size(s: &str) -> Result<TransferSize, String> {
    match s.to_ascii_lowercase().as_str() {
        "long" | "l" | "4" => Ok(TransferSize::Long),
        "byte" | "b" | "1" => Ok(TransferSize::Byte),
        "word" | "w" | "2" => Ok(TransferSize::Word),
        "3byte" | "3" => Ok(TransferSize::ThreeByte),
        other => Err(format!("unknown size {other:?}")),
    }
}

fn configure_logging(args: &Args) -> Result<()> {
    let config = LogConfig::global();
    if let Some(level) = args.log_level.as_deref() {
        match LogLevel::from_str(level) {
            Some(level) => config.set_global_level(level),
            None => bail!("Unknown log level: {}", level),
        }
    }
    if let Some(rate) = args.log_rate {
        config.set_rate_limit(rate);
    }
    if let Some(path) = args.log_file.as_ref() {
        config
            .set_log_file(path.clone())
            .with_context(|| format!("opening log file {}", path.display()))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    configure_logging(&args)?;

    let config = match args.config.as_ref() {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    info!(
        "slots {:02X?}, master timeout {:?}",
        config.slots, config.master_timeout
    );

    let mut bench = Testbench::new(Se30Bridge::with_config(config)?);
    let request = Request {
        scenario: args.scenario,
        address: args
            .address
            .unwrap_or_else(|| args.scenario.default_address()),
        data: args.data,
        size: args.size,
        max_ticks: args.ticks,
    };

    let outcome = scenario::run(&mut bench, &request);

    if args.trace {
        for record in &bench.history {
            println!("{}", serde_json::to_string(record)?);
        }
    }
    println!("{}", outcome);

    if let Some(path) = args.save.as_ref() {
        let state = bench.bridge.save_state();
        let mut f = File::create(path)
            .with_context(|| format!("creating save-state {}", path.display()))?;
        write!(f, "{}", serde_json::to_string_pretty(&state)?)?;
        info!("wrote save-state after {} ticks", bench.bridge.ticks());
    }

    LogConfig::global().clear_log_file();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u32() {
        assert_eq!(parse_u32("0xF900_0000"), Ok(0xF900_0000));
        assert_eq!(parse_u32("$FA000010"), Ok(0xFA00_0010));
        assert_eq!(parse_u32("4096"), Ok(4096));
        assert!(parse_u32("0xZZ").is_err());
        assert!(parse_u32("0x1_0000_0000").is_err());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("LONG"), Ok(TransferSize::Long));
        assert_eq!(parse_size("3byte"), Ok(TransferSize::ThreeByte));
        assert!(parse_size("quad").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "pds-trace",
            "dma-read",
            "--address",
            "0x2000",
            "--size",
            "word",
            "--trace",
            "--log-rate",
            "500",
        ])
        .expect("parse");
        assert_eq!(args.scenario, Scenario::DmaRead);
        assert_eq!(args.address, Some(0x2000));
        assert_eq!(args.size, TransferSize::Word);
        assert!(args.trace);
        assert_eq!(args.data, 0xCAFE_BABE);
        assert_eq!(args.log_rate, Some(500));
    }

    #[test]
    fn test_configure_logging_sets_rate() {
        let args = Args::try_parse_from(["pds-trace", "read", "--log-rate", "7"]).expect("parse");
        configure_logging(&args).expect("configure");
        assert_eq!(LogConfig::global().get_rate_limit(), 7);
    }

    #[test]
    fn test_scenarios_complete() {
        for scenario in [
            Scenario::Read,
            Scenario::Write,
            Scenario::DmaRead,
            Scenario::DmaWrite,
        ] {
            let mut bench = Testbench::new(Se30Bridge::new());
            let request = Request {
                scenario,
                address: scenario.default_address(),
                data: 0x1234_5678,
                size: TransferSize::Long,
                max_ticks: 256,
            };
            let outcome = scenario::run(&mut bench, &request);
            let text = outcome.to_string();
            assert!(
                text.contains("/DSACK after") || text.contains("ack after"),
                "{scenario:?}: {text}"
            );
            if matches!(scenario, Scenario::Read | Scenario::DmaRead) {
                assert!(text.ends_with("data 12345678"), "{text}");
            }
        }
    }

    #[test]
    fn test_abort_scenario() {
        let mut bench = Testbench::new(Se30Bridge::new());
        let request = Request {
            scenario: Scenario::Abort,
            address: 0xFB00_0000,
            data: 0,
            size: TransferSize::Long,
            max_ticks: 64,
        };
        let text = scenario::run(&mut bench, &request).to_string();
        assert!(text.starts_with("abort in READ_REQUEST"), "{text}");
        assert!(text.contains("idle 3 tick(s)"), "{text}");
    }
}
