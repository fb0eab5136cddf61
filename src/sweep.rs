use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, Instant};

use crate::address::VisaAddress;
use crate::device::Device;
use crate::proto::command::{InputTrigger, OutputPath, PowerUnit};
use crate::proto::response::ScpiError;
use crate::proto::ProtoError;
use crate::DEFAULT_TIMEOUT;

/// Code used to unlock the laser's front panel.
pub const PANEL_LOCK_CODE: u32 = 1234;

/// Wavelength applied to the meter for range compensation.
const PM_RANGE_WAVELENGTH_NM: f64 = 1550.0;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Immutable parameters of one sweep-and-log run.
///
/// Defaults mirror a full C+L band scan: 1250..1350 nm in 1 pm steps at
/// 40 nm/s, 5 dBm requested power, 100 µs meter averaging.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Sweep start wavelength in nm.
    pub start_nm: f64,
    /// Sweep stop wavelength in nm.
    pub stop_nm: f64,
    /// Sweep step in pm.
    pub step_pm: f64,
    /// Sweep speed in nm/s.
    pub speed_nm_s: f64,
    /// Requested laser power in dBm; clamped to the device-reported safe
    /// maximum before it is applied.
    pub power_dbm: f64,
    /// Optical output path of the laser.
    pub path: OutputPath,
    /// Power meter range in dBm.
    pub range_dbm: f64,
    /// Power meter averaging time in µs.
    pub averaging_us: f64,
    /// Laser source slot.
    pub tls_slot: u8,
    /// Power meter channel slot.
    pub pm_slot: u8,
    /// Per-exchange reply timeout.
    pub io_timeout: Duration,
    /// Upper bound for each wait-for-instrument polling loop.
    pub poll_timeout: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            start_nm: 1250.0,
            stop_nm: 1350.0,
            step_pm: 1.0,
            speed_nm_s: 40.0,
            power_dbm: 5.0,
            path: OutputPath::High,
            range_dbm: 10.0,
            averaging_us: 100.0,
            tls_slot: 0,
            pm_slot: 1,
            io_timeout: DEFAULT_TIMEOUT,
            poll_timeout: Duration::from_secs(60),
        }
    }
}

impl SweepConfig {
    /// Local estimate of the logged point count. The device's own count
    /// (`swe:exp?`) takes precedence once queried.
    pub fn estimated_points(&self) -> usize {
        ((self.stop_nm - self.start_nm) * 1000.0 / self.step_pm + 1.0) as usize
    }

    /// Dwell time per sweep step in µs.
    pub fn step_interval_us(&self) -> f64 {
        1000.0 * self.step_pm / self.speed_nm_s
    }

    /// Coarse estimate of one sweep's duration, used only as a pacing delay
    /// after the soft trigger.
    pub fn estimated_duration(&self) -> Duration {
        Duration::from_secs_f64(((self.stop_nm - self.start_nm) / self.speed_nm_s).max(0.0))
    }
}

/// Converts a linear power in watts to dBm.
pub fn watts_to_dbm(watts: f64) -> f64 {
    10.0 * (1000.0 * watts).log10()
}

/// Power actually applied to the laser: the requested value, reduced to the
/// device-reported safe maximum when it exceeds it.
pub fn clamp_power(requested_dbm: f64, max_safe_dbm: f64) -> f64 {
    if max_safe_dbm < requested_dbm {
        max_safe_dbm
    } else {
        requested_dbm
    }
}

/// Data of one completed run: both logged series plus the drained error
/// queues. `wavelength_m` and `power` both hold exactly `points` samples.
#[derive(Debug)]
pub struct SweepResult {
    /// Device-confirmed logged point count.
    pub points: usize,
    /// Logged wavelengths in meters.
    pub wavelength_m: Vec<f64>,
    /// Logged power samples in watts.
    pub power: Vec<f32>,
    /// Error queue of the laser, drained post-acquisition.
    pub tls_errors: Vec<ScpiError>,
    /// Error queue of the meter, drained post-acquisition.
    pub pm_errors: Vec<ScpiError>,
}

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("sweep parameter check failed: {0}")]
    ValidationFailed(String),

    #[error("step duration too short for power meter: {interval_us} us per step, meter needs {atime_us} us")]
    TimingInfeasible { interval_us: f64, atime_us: f64 },

    #[error("timed out after {timeout:?} waiting for {stage}")]
    AcquisitionTimeout {
        stage: &'static str,
        timeout: Duration,
    },

    #[error("logged series do not match the expected point count: expected {points}, got {wavelengths} wavelengths and {powers} power samples")]
    LengthMismatch {
        points: usize,
        wavelengths: usize,
        powers: usize,
    },

    #[error("could not write the output file: {0}")]
    Output(#[from] std::io::Error),

    #[error(transparent)]
    Proto(#[from] ProtoError),
}

/// One session per role, or a single shared session when both roles answer
/// at the same address. A shared session is owned (and thus closed) exactly
/// once; command ordering on it stays strictly sequential.
enum Link {
    Shared(Device),
    Split { tls: Device, pm: Device },
}

impl Link {
    fn tls(&mut self) -> &mut Device {
        match self {
            Self::Shared(device) => device,
            Self::Split { tls, .. } => tls,
        }
    }

    fn pm(&mut self) -> &mut Device {
        match self {
            Self::Shared(device) => device,
            Self::Split { pm, .. } => pm,
        }
    }
}

/// Orchestrates one sweep-and-log cycle: laser setup, feasibility checks,
/// meter logging, trigger, completion waits, and data retrieval.
pub struct SweepController {
    link: Link,
    config: SweepConfig,
}

impl SweepController {
    /// Opens sessions to both instruments. Identical addresses share one
    /// session, exactly like two VISA handles aliasing one resource.
    pub async fn connect(
        tls_addr: &VisaAddress,
        pm_addr: &VisaAddress,
        config: SweepConfig,
    ) -> Result<Self, SweepError> {
        let tls = Device::connect(tls_addr, config.io_timeout).await?;
        let link = if tls_addr == pm_addr {
            Link::Shared(tls)
        } else {
            Link::Split {
                tls,
                pm: Device::connect(pm_addr, config.io_timeout).await?,
            }
        };
        Ok(Self { link, config })
    }

    #[cfg(test)]
    pub(crate) fn with_shared(device: Device, config: SweepConfig) -> Self {
        Self {
            link: Link::Shared(device),
            config,
        }
    }

    /// Performs the whole acquisition run. Consumes the controller, so both
    /// sessions are dropped (closed once each) on every exit path.
    pub async fn run(mut self) -> Result<SweepResult, SweepError> {
        let cfg = self.config.clone();

        // zero or negative values would wreck the interval and duration math
        if !(cfg.step_pm > 0.0) || !(cfg.speed_nm_s > 0.0) {
            return Err(SweepError::ValidationFailed(
                "sweep step and speed must be positive".to_string(),
            ));
        }

        let tls_id = self.link.tls().ident().await?;
        println!("TLS idn: {}", tls_id);
        let pm_id = self.link.pm().ident().await?;
        println!("PM idn: {}", pm_id);

        // Laser sweep setup
        let tls = self.link.tls();
        tls.unlock(PANEL_LOCK_CODE).await?;
        tls.set_output_path(cfg.tls_slot, cfg.path).await?;
        tls.set_trigger_loop().await?;
        tls.set_laser_output(cfg.tls_slot, true).await?;

        // wait for the source to confirm the output is live
        let deadline = Instant::now() + cfg.poll_timeout;
        while !self.link.tls().laser_output(cfg.tls_slot).await? {
            if Instant::now() >= deadline {
                return Err(SweepError::AcquisitionTimeout {
                    stage: "laser output to switch on",
                    timeout: cfg.poll_timeout,
                });
            }
            sleep(POLL_INTERVAL).await;
        }

        let tls = self.link.tls();
        tls.set_trigger_output_step(cfg.tls_slot).await?;
        tls.set_trigger_input(cfg.tls_slot, InputTrigger::SweepStart)
            .await?;
        tls.set_sweep_start(cfg.tls_slot, cfg.start_nm).await?;
        tls.set_sweep_stop(cfg.tls_slot, cfg.stop_nm).await?;
        tls.set_sweep_step(cfg.tls_slot, cfg.step_pm).await?;
        tls.set_sweep_speed(cfg.tls_slot, cfg.speed_nm_s).await?;
        tls.set_sweep_continuous(cfg.tls_slot).await?;
        tls.set_lambda_logging(cfg.tls_slot, true).await?;

        // device-side validation of the whole parameter set
        let status = tls.sweep_check(cfg.tls_slot).await?;
        if !status.starts_with('0') {
            return Err(SweepError::ValidationFailed(status));
        }

        // clamp the requested power to the safe maximum over the range
        let max_safe_w = tls
            .max_sweep_power(cfg.tls_slot, cfg.start_nm, cfg.stop_nm)
            .await?;
        let max_safe_dbm = watts_to_dbm(max_safe_w);
        let applied_dbm = clamp_power(cfg.power_dbm, max_safe_dbm);
        if applied_dbm < cfg.power_dbm {
            println!(
                "Requested power reduced to the safe maximum of {:.2} dBm",
                applied_dbm
            );
        }
        tls.set_power_dbm(cfg.tls_slot, applied_dbm).await?;

        // the device's point count is authoritative
        let points = tls.expected_points(cfg.tls_slot).await?;

        // the meter must be able to finish one average inside a sweep step
        let interval_us = cfg.step_interval_us();
        let mut averaging_us = cfg.averaging_us;
        if averaging_us >= interval_us {
            let pm = self.link.pm();
            pm.set_averaging_time_us(cfg.pm_slot, interval_us).await?;
            let actual_s = pm.averaging_time_s(cfg.pm_slot).await?;
            let actual_us = actual_s * 1e6;
            if actual_us > interval_us {
                return Err(SweepError::TimingInfeasible {
                    interval_us,
                    atime_us: actual_us,
                });
            }
            averaging_us = actual_us;
            println!("Averaging time was reduced to {} us", averaging_us);
        }

        self.link.tls().arm_sweep(cfg.tls_slot).await?;

        // Meter logging setup
        let pm = self.link.pm();
        pm.set_trigger_input(cfg.pm_slot, InputTrigger::SingleMeasurement)
            .await?;
        pm.set_power_unit(cfg.pm_slot, PowerUnit::Watt).await?;
        pm.set_auto_range(cfg.pm_slot, false).await?;
        pm.set_power_range_dbm(cfg.pm_slot, cfg.range_dbm).await?;
        // read-back settles the range change before logging starts
        let _ = pm.power_range_dbm(cfg.pm_slot).await?;
        pm.set_power_wavelength(cfg.pm_slot, PM_RANGE_WAVELENGTH_NM)
            .await?;
        pm.configure_logging(cfg.pm_slot, points, averaging_us)
            .await?;
        pm.start_logging(cfg.pm_slot).await?;

        // wait until the laser reports the sweep armed
        let deadline = Instant::now() + cfg.poll_timeout;
        let armed_flag = loop {
            let flag = self.link.tls().sweep_flag(cfg.tls_slot).await?;
            if flag != 0 {
                break flag;
            }
            if Instant::now() >= deadline {
                return Err(SweepError::AcquisitionTimeout {
                    stage: "sweep to arm",
                    timeout: cfg.poll_timeout,
                });
            }
            sleep(POLL_INTERVAL).await;
        };

        self.link.tls().soft_trigger(cfg.tls_slot).await?;
        // pacing only; completion is detected by the status polls below
        sleep(cfg.estimated_duration()).await;

        // wait for the meter to finish logging
        let deadline = Instant::now() + cfg.poll_timeout;
        loop {
            let status = self.link.pm().logging_status(cfg.pm_slot).await?;
            if !status.ends_with("PROGRESS") {
                break;
            }
            if Instant::now() >= deadline {
                return Err(SweepError::AcquisitionTimeout {
                    stage: "power meter logging to complete",
                    timeout: cfg.poll_timeout,
                });
            }
            sleep(POLL_INTERVAL).await;
        }

        let power = self.link.pm().read_power_log(cfg.pm_slot).await?;

        // the sweep flag toggles once the sweep itself is done
        let deadline = Instant::now() + cfg.poll_timeout;
        loop {
            let flag = self.link.tls().sweep_flag(cfg.tls_slot).await?;
            if flag != armed_flag {
                break;
            }
            if Instant::now() >= deadline {
                return Err(SweepError::AcquisitionTimeout {
                    stage: "sweep to complete",
                    timeout: cfg.poll_timeout,
                });
            }
            sleep(POLL_INTERVAL).await;
        }

        let wavelength_m = self.link.tls().read_wavelength_log(cfg.tls_slot).await?;

        let tls_errors = self.link.tls().drain_errors().await?;
        let pm_errors = self.link.pm().drain_errors().await?;

        if wavelength_m.len() != points || power.len() != points {
            return Err(SweepError::LengthMismatch {
                points,
                wavelengths: wavelength_m.len(),
                powers: power.len(),
            });
        }

        Ok(SweepResult {
            points,
            wavelength_m,
            power,
            tls_errors,
            pm_errors,
        })
    }
}
