#![deny(clippy::unwrap_used)]

use clap::{arg, command, value_parser};
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;

use lambdascan::address::VisaAddress;
use lambdascan::output;
use lambdascan::proto::command::OutputPath;
use lambdascan::proto::ProtoError;
use lambdascan::sweep::{SweepConfig, SweepController, SweepError};

#[tokio::main]
async fn main() {
    let matches = command!() // requires `cargo` feature
        .arg(arg!(--tls <ADDR> "VISA resource of the tunable laser source").required(true))
        .arg(arg!(--pm <ADDR> "VISA resource of the power meter").required(true))
        .arg(
            arg!(--start <NM> "Sweep start wavelength in nm")
                .default_value("1250")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            arg!(--stop <NM> "Sweep stop wavelength in nm")
                .default_value("1350")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            arg!(--step <PM> "Sweep step in pm")
                .default_value("1")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            arg!(--speed <NMS> "Sweep speed in nm/s")
                .default_value("40")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            arg!(--power <DBM> "Requested laser power in dBm")
                .default_value("5")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            arg!(--path <PATH> "Optical output path")
                .default_value("high")
                .value_parser(["high", "lows"]),
        )
        .arg(
            arg!(--range <DBM> "Power meter range in dBm")
                .default_value("10")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            arg!(--avg <US> "Power meter averaging time in microseconds")
                .default_value("100")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            arg!(--"tls-slot" <N> "Laser source slot")
                .default_value("0")
                .value_parser(value_parser!(u8)),
        )
        .arg(
            arg!(--"pm-slot" <N> "Power meter channel slot")
                .default_value("1")
                .value_parser(value_parser!(u8)),
        )
        .arg(
            arg!(--timeout <SECONDS> "Reply timeout per instrument exchange")
                .default_value("10")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            arg!(-o --output <FILE> "Output CSV path")
                .required(false)
                .value_parser(value_parser!(PathBuf)),
        )
        .get_matches();

    match run(&matches).await {
        Ok(()) => println!("tls_pm sweep complete"),
        Err(e) => {
            match e {
                SweepError::ValidationFailed(ref status) => {
                    eprintln!("Sweep configuration rejected by the laser: {}", status);
                    exit(2);
                }
                SweepError::TimingInfeasible { .. } => {
                    eprintln!("{}", e);
                    exit(3);
                }
                SweepError::AcquisitionTimeout { .. } => {
                    eprintln!("{}", e);
                    exit(4);
                }
                SweepError::LengthMismatch { .. } => {
                    eprintln!("{}", e);
                    exit(5);
                }
                SweepError::Output(ref err) => {
                    eprintln!("Failed to write output file: {}", err);
                    exit(6);
                }
                SweepError::Proto(ProtoError::BadResource(ref rsc)) => {
                    eprintln!("{}: not a valid VISA resource string", rsc);
                    exit(1);
                }
                SweepError::Proto(ProtoError::UnsupportedTransport(ref rsc)) => {
                    eprintln!(
                        "{}: only TCPIP::...::inst0::INSTR resources are supported",
                        rsc
                    );
                    exit(1);
                }
                SweepError::Proto(ref err) => {
                    eprintln!("Failed to communicate with instrument: {}", err);
                    exit(1);
                }
            }
        }
    }
}

async fn run(matches: &clap::ArgMatches) -> Result<(), SweepError> {
    let tls_addr: VisaAddress = matches
        .get_one::<String>("tls")
        .expect("required argument")
        .parse()?;
    let pm_addr: VisaAddress = matches
        .get_one::<String>("pm")
        .expect("required argument")
        .parse()?;

    let get = |name: &str| -> f64 { *matches.get_one::<f64>(name).expect("has default") };

    let path: OutputPath = matches
        .get_one::<String>("path")
        .expect("has default")
        .parse()
        .map_err(|_| ProtoError::Parse("path".into()))?;

    let config = SweepConfig {
        start_nm: get("start"),
        stop_nm: get("stop"),
        step_pm: get("step"),
        speed_nm_s: get("speed"),
        power_dbm: get("power"),
        path,
        range_dbm: get("range"),
        averaging_us: get("avg"),
        tls_slot: *matches.get_one::<u8>("tls-slot").expect("has default"),
        pm_slot: *matches.get_one::<u8>("pm-slot").expect("has default"),
        io_timeout: Duration::from_secs(*matches.get_one::<u64>("timeout").expect("has default")),
        ..SweepConfig::default()
    };

    let output_path = matches
        .get_one::<PathBuf>("output")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(output::default_csv_name()));

    eprintln!("Connecting to TLS at {}", tls_addr);
    if pm_addr == tls_addr {
        eprintln!("PM shares the TLS session");
    } else {
        eprintln!("Connecting to PM at {}", pm_addr);
    }

    let controller = SweepController::connect(&tls_addr, &pm_addr, config).await?;
    let result = controller.run().await?;

    for error in &result.tls_errors {
        println!("tls error: {}", error);
    }
    for error in &result.pm_errors {
        println!("pm error: {}", error);
    }

    output::write_csv(&output_path, &result)?;
    println!(
        "{} samples written to {}",
        result.points,
        output_path.display()
    );

    Ok(())
}
