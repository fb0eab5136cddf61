use futures::{SinkExt, StreamExt};
use std::str::FromStr;
use std::{pin::Pin, time::Duration};
use tokio::net::TcpStream;
use tokio_util::codec::Decoder;

use crate::address::VisaAddress;
use crate::proto::codec::ScpiCodec;
use crate::proto::command::{Command, InputTrigger, OutputPath, PowerUnit};
use crate::proto::response::{Ident, Response, ScpiError};
use crate::proto::{ProtoError, Result};
use crate::SCPI_RAW_PORT;

trait AsyncReadWrite<S>: futures::Sink<S> + futures::Stream {}

impl<T, S> AsyncReadWrite<S> for T where T: futures::Sink<S> + futures::Stream {}

// The error queue is drained until the "No error" sentinel; a misbehaving
// instrument must not keep us in that loop forever.
const MAX_ERROR_QUEUE: usize = 64;

/// One open instrument session: a framed SCPI stream plus the fixed reply
/// timeout applied to every exchange.
#[allow(clippy::type_complexity)]
pub struct Device {
    stream: Pin<
        Box<
            dyn AsyncReadWrite<
                Command,
                Error = std::io::Error,
                Item = std::result::Result<Response, std::io::Error>,
            >,
        >,
    >,
    timeout: Duration,
}

impl Device {
    /// Opens a session to `addr`. Only raw-socket LAN resources are
    /// supported; the other VISA grammars yield `UnsupportedTransport`.
    pub async fn connect(addr: &VisaAddress, timeout: Duration) -> Result<Self> {
        match addr {
            VisaAddress::Tcp { host } => {
                let socket = tokio::time::timeout(
                    timeout,
                    TcpStream::connect((host.as_str(), SCPI_RAW_PORT)),
                )
                .await
                .map_err(|_| ProtoError::Timeout(timeout))??;
                socket.set_nodelay(true)?;
                let stream = ScpiCodec::default().framed(socket);
                Ok(Self {
                    stream: Box::pin(stream),
                    timeout,
                })
            }
            other => Err(ProtoError::UnsupportedTransport(other.to_string())),
        }
    }

    #[cfg(test)]
    pub(crate) fn new_faked(link: crate::proto::fake::ScriptedLink) -> Self {
        Self {
            stream: Box::pin(ScpiCodec::default().framed(link)),
            timeout: Duration::from_millis(100),
        }
    }

    async fn send(&mut self, cmd: Command) -> Result<()> {
        self.stream.send(cmd).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Response> {
        match tokio::time::timeout(self.timeout, self.stream.next()).await {
            Err(_) => Err(ProtoError::Timeout(self.timeout)),
            Ok(Some(Ok(response))) => Ok(response),
            Ok(Some(Err(ioerr))) => Err(ioerr.into()),
            Ok(None) => Err(ProtoError::Abort),
        }
    }

    async fn query_line(&mut self, cmd: Command) -> Result<String> {
        self.send(cmd).await?;
        match self.recv().await? {
            Response::Line(line) => Ok(line),
            other => Err(ProtoError::Unexpected(other)),
        }
    }

    async fn query_parsed<T: FromStr>(&mut self, cmd: Command) -> Result<T> {
        let line = self.query_line(cmd).await?;
        line.trim().parse::<T>().map_err(|_| ProtoError::Parse(line))
    }

    pub async fn ident(&mut self) -> Result<Ident> {
        let line = self.query_line(Command::Idn).await?;
        Ident::try_from(line.as_str()).map_err(ProtoError::from)
    }

    /// Unlocks the front panel with the given lock code.
    pub async fn unlock(&mut self, code: u32) -> Result<()> {
        self.send(Command::Lock {
            locked: false,
            code,
        })
        .await
    }

    pub async fn set_output_path(&mut self, slot: u8, path: OutputPath) -> Result<()> {
        self.send(Command::SetOutputPath { slot, path }).await
    }

    pub async fn set_trigger_loop(&mut self) -> Result<()> {
        self.send(Command::SetTriggerLoop).await
    }

    pub async fn set_laser_output(&mut self, slot: u8, on: bool) -> Result<()> {
        self.send(Command::SetLaserState { slot, on }).await
    }

    pub async fn laser_output(&mut self, slot: u8) -> Result<bool> {
        let state: i32 = self.query_parsed(Command::GetLaserState { slot }).await?;
        Ok(state != 0)
    }

    /// Emit a trigger edge at every sweep step ("step finished").
    pub async fn set_trigger_output_step(&mut self, slot: u8) -> Result<()> {
        self.send(Command::SetTriggerOutput { slot }).await
    }

    pub async fn set_trigger_input(&mut self, slot: u8, mode: InputTrigger) -> Result<()> {
        self.send(Command::SetTriggerInput { slot, mode }).await
    }

    pub async fn set_sweep_start(&mut self, slot: u8, nm: f64) -> Result<()> {
        self.send(Command::SetSweepStart { slot, nm }).await
    }

    pub async fn set_sweep_stop(&mut self, slot: u8, nm: f64) -> Result<()> {
        self.send(Command::SetSweepStop { slot, nm }).await
    }

    pub async fn set_sweep_step(&mut self, slot: u8, pm: f64) -> Result<()> {
        self.send(Command::SetSweepStep { slot, pm }).await
    }

    pub async fn set_sweep_speed(&mut self, slot: u8, nm_per_s: f64) -> Result<()> {
        self.send(Command::SetSweepSpeed { slot, nm_per_s }).await
    }

    pub async fn set_sweep_continuous(&mut self, slot: u8) -> Result<()> {
        self.send(Command::SetSweepContinuous { slot }).await
    }

    pub async fn set_lambda_logging(&mut self, slot: u8, on: bool) -> Result<()> {
        self.send(Command::SetLambdaLogging { slot, on }).await
    }

    /// Device-side consistency check of the configured sweep. The reply's
    /// first field is `0` when the parameter set is valid.
    pub async fn sweep_check(&mut self, slot: u8) -> Result<String> {
        self.query_line(Command::SweepCheck { slot }).await
    }

    /// Maximum power (watts) the laser can hold over the whole range.
    pub async fn max_sweep_power(&mut self, slot: u8, start_nm: f64, stop_nm: f64) -> Result<f64> {
        self.query_parsed(Command::GetMaxPower {
            slot,
            start_nm,
            stop_nm,
        })
        .await
    }

    pub async fn set_power_dbm(&mut self, slot: u8, dbm: f64) -> Result<()> {
        self.send(Command::SetPower { slot, dbm }).await
    }

    /// Point count the device will log for the configured sweep. Overrides
    /// any locally estimated count.
    pub async fn expected_points(&mut self, slot: u8) -> Result<usize> {
        let points: f64 = self.query_parsed(Command::GetExpectedPoints { slot }).await?;
        Ok(points as usize)
    }

    pub async fn arm_sweep(&mut self, slot: u8) -> Result<()> {
        self.send(Command::ArmSweep { slot }).await
    }

    pub async fn soft_trigger(&mut self, slot: u8) -> Result<()> {
        self.send(Command::SoftTrigger { slot }).await
    }

    /// Sweep state flag; non-zero once armed, toggles when a sweep ends.
    pub async fn sweep_flag(&mut self, slot: u8) -> Result<i32> {
        self.query_parsed(Command::GetSweepFlag { slot }).await
    }

    pub async fn read_wavelength_log(&mut self, slot: u8) -> Result<Vec<f64>> {
        self.send(Command::ReadLambdaLog { slot }).await?;
        match self.recv().await? {
            Response::WavelengthLog(data) => Ok(data),
            other => Err(ProtoError::Unexpected(other)),
        }
    }

    pub async fn set_power_unit(&mut self, slot: u8, unit: PowerUnit) -> Result<()> {
        self.send(Command::SetPowerUnit { slot, unit }).await
    }

    pub async fn set_auto_range(&mut self, slot: u8, on: bool) -> Result<()> {
        self.send(Command::SetAutoRange { slot, on }).await
    }

    pub async fn set_power_range_dbm(&mut self, slot: u8, dbm: f64) -> Result<()> {
        self.send(Command::SetPowerRange { slot, dbm }).await
    }

    pub async fn power_range_dbm(&mut self, slot: u8) -> Result<f64> {
        self.query_parsed(Command::GetPowerRange { slot }).await
    }

    pub async fn set_power_wavelength(&mut self, slot: u8, nm: f64) -> Result<()> {
        self.send(Command::SetPowerWavelength { slot, nm }).await
    }

    pub async fn set_averaging_time_us(&mut self, slot: u8, us: f64) -> Result<()> {
        self.send(Command::SetAveragingTime { slot, us }).await
    }

    /// Actual averaging time, as reported by the meter, in seconds.
    pub async fn averaging_time_s(&mut self, slot: u8) -> Result<f64> {
        self.query_parsed(Command::GetAveragingTime { slot }).await
    }

    pub async fn configure_logging(
        &mut self,
        slot: u8,
        points: usize,
        averaging_us: f64,
    ) -> Result<()> {
        self.send(Command::ConfigureLogging {
            slot,
            points,
            averaging_us,
        })
        .await
    }

    pub async fn start_logging(&mut self, slot: u8) -> Result<()> {
        self.send(Command::StartLogging { slot }).await
    }

    /// Raw logging status string; ends in `PROGRESS` while samples are
    /// still being taken.
    pub async fn logging_status(&mut self, slot: u8) -> Result<String> {
        self.query_line(Command::GetLoggingStatus { slot }).await
    }

    pub async fn read_power_log(&mut self, slot: u8) -> Result<Vec<f32>> {
        self.send(Command::ReadLoggingResult { slot }).await?;
        match self.recv().await? {
            Response::PowerLog(data) => Ok(data),
            other => Err(ProtoError::Unexpected(other)),
        }
    }

    /// Drains the SCPI error queue up to and including the "No error"
    /// sentinel. Diagnostics only; entries never affect the run outcome.
    pub async fn drain_errors(&mut self) -> Result<Vec<ScpiError>> {
        let mut errors = Vec::new();
        for _ in 0..MAX_ERROR_QUEUE {
            let line = self.query_line(Command::NextError).await?;
            let error = ScpiError::try_from(line.as_str())?;
            let done = error.is_no_error();
            errors.push(error);
            if done {
                break;
            }
        }
        Ok(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::fake::ScriptedLink;

    #[tokio::test]
    async fn test_ident() {
        let link = ScriptedLink::new(&b"KEYSIGHT,N7776C,MY59700123,V2.021\n"[..]);
        let written = link.written();
        let mut device = Device::new_faked(link);

        let id = device.ident().await.unwrap();
        assert_eq!(id.model, "N7776C");
        assert_eq!(
            String::from_utf8(written.lock().unwrap().clone()).unwrap(),
            "*IDN?\n"
        );
    }

    #[tokio::test]
    async fn test_sweep_check() {
        let link = ScriptedLink::new(&b"0,OK\n"[..]);
        let mut device = Device::new_faked(link);
        assert_eq!(device.sweep_check(0).await.unwrap(), "0,OK");
    }

    #[tokio::test]
    async fn test_sweep_flag_with_sign_prefix() {
        let link = ScriptedLink::new(&b"+1\n"[..]);
        let mut device = Device::new_faked(link);
        assert_eq!(device.sweep_flag(0).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_drain_errors_stops_at_sentinel() {
        let link = ScriptedLink::new(
            &b"-113,\"Undefined header\"\n-222,\"Data out of range\"\n+0,\"No error\"\n"[..],
        );
        let mut device = Device::new_faked(link);

        let errors = device.drain_errors().await.unwrap();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].code, -113);
        assert!(errors[2].is_no_error());
    }

    #[tokio::test]
    async fn test_reply_timeout() {
        let link = ScriptedLink::stalled(Vec::new());
        let mut device = Device::new_faked(link);
        assert!(matches!(
            device.ident().await,
            Err(ProtoError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_reply_is_a_parse_error() {
        let link = ScriptedLink::new(&b"not a number\n"[..]);
        let mut device = Device::new_faked(link);
        assert!(matches!(
            device.sweep_flag(0).await,
            Err(ProtoError::Parse(_))
        ));
    }
}
