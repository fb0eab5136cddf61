//!
//! This library drives a synchronized wavelength-sweep measurement against a
//! Keysight N777x tunable laser source and an N774x multiport power meter.
//! The laser sweeps continuously over a configured wavelength range while the
//! power meter logs one sample per sweep trigger; afterwards both logged
//! series (wavelength and power) are read back as binary blocks.
//!
//! <br>
//!
//! # Details
//!
//! - Instruments are addressed with VISA resource strings. LAN resources of
//!   the `TCPIP0::<host>::inst0::INSTR` form are reached over the raw SCPI
//!   socket (port 5025).
//!
//! - Basic setup and one acquisition run
//!
//!   ```no_run
//!   use lambdascan::address::VisaAddress;
//!   use lambdascan::sweep::{SweepConfig, SweepController, SweepError};
//!   #[tokio::main]
//!   async fn main() -> Result<(), SweepError> {
//!       let tls: VisaAddress = "TCPIP0::100.65.16.165::inst0::INSTR".parse()?;
//!       let pm: VisaAddress = "TCPIP0::100.65.16.169::inst0::INSTR".parse()?;
//!       let controller = SweepController::connect(&tls, &pm, SweepConfig::default()).await?;
//!       let result = controller.run().await?;
//!       eprintln!("logged {} samples", result.points);
//!       Ok(())
//!   }
//!   ```
//!
//! # Supported instruments
//!
//!  * Keysight N777xC tunable laser source
//!  * Keysight N774xA/C multiport power meter
//!

pub mod address;
pub mod device;
pub mod output;
pub mod proto;
pub mod sweep;

pub use address::VisaAddress;
pub use device::Device;
pub use proto::Result;
pub use sweep::{SweepConfig, SweepController, SweepResult};

use std::time::Duration;

/// Raw SCPI socket port used for `TCPIP...::inst0::INSTR` resources.
pub const SCPI_RAW_PORT: u16 = 5025;

/// Default reply timeout for a single instrument exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
