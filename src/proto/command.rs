/// Optical output path of the laser source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPath {
    /// High-power output.
    High,
    /// Low-SSE output.
    LowSse,
}

impl OutputPath {
    pub fn as_scpi(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::LowSse => "lows",
        }
    }
}

impl std::str::FromStr for OutputPath {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "lows" => Ok(Self::LowSse),
            other => Err(format!("unknown output path: {:?}", other)),
        }
    }
}

/// Hardware trigger input mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputTrigger {
    /// Start a sweep on the trigger edge (laser side).
    SweepStart,
    /// Take one measurement per trigger edge (meter side).
    SingleMeasurement,
}

impl InputTrigger {
    pub fn as_scpi(&self) -> &'static str {
        match self {
            Self::SweepStart => "sws",
            Self::SingleMeasurement => "sme",
        }
    }
}

/// Power meter display/transfer unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerUnit {
    Dbm = 0,
    Watt = 1,
}

/// Shape of the reply a command is entitled to on the wire.
///
/// SCPI set-commands produce no reply at all; queries produce a single
/// newline-terminated ASCII line; the two log retrievals produce an
/// IEEE 488.2 definite-length binary block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Line,
    BlockF32,
    BlockF64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Idn,
    // Front panel
    Lock { locked: bool, code: u32 },
    // Laser configuration
    SetOutputPath { slot: u8, path: OutputPath },
    SetTriggerLoop,
    SetLaserState { slot: u8, on: bool },
    GetLaserState { slot: u8 },
    SetTriggerOutput { slot: u8 },
    SetTriggerInput { slot: u8, mode: InputTrigger },
    // Sweep configuration
    SetSweepStart { slot: u8, nm: f64 },
    SetSweepStop { slot: u8, nm: f64 },
    SetSweepStep { slot: u8, pm: f64 },
    SetSweepSpeed { slot: u8, nm_per_s: f64 },
    SetSweepContinuous { slot: u8 },
    SetLambdaLogging { slot: u8, on: bool },
    SweepCheck { slot: u8 },
    GetMaxPower { slot: u8, start_nm: f64, stop_nm: f64 },
    SetPower { slot: u8, dbm: f64 },
    GetExpectedPoints { slot: u8 },
    // Sweep execution
    ArmSweep { slot: u8 },
    SoftTrigger { slot: u8 },
    GetSweepFlag { slot: u8 },
    ReadLambdaLog { slot: u8 },
    // Power meter configuration
    SetPowerUnit { slot: u8, unit: PowerUnit },
    SetAutoRange { slot: u8, on: bool },
    SetPowerRange { slot: u8, dbm: f64 },
    GetPowerRange { slot: u8 },
    SetPowerWavelength { slot: u8, nm: f64 },
    SetAveragingTime { slot: u8, us: f64 },
    GetAveragingTime { slot: u8 },
    // Power meter logging
    ConfigureLogging { slot: u8, points: usize, averaging_us: f64 },
    StartLogging { slot: u8 },
    GetLoggingStatus { slot: u8 },
    ReadLoggingResult { slot: u8 },
    // Error queue
    NextError,
}

impl Command {
    /// Reply the instrument owes for this command, if any.
    pub fn reply_kind(&self) -> Option<ReplyKind> {
        match self {
            Self::Idn
            | Self::GetLaserState { .. }
            | Self::SweepCheck { .. }
            | Self::GetMaxPower { .. }
            | Self::GetExpectedPoints { .. }
            | Self::GetSweepFlag { .. }
            | Self::GetPowerRange { .. }
            | Self::GetAveragingTime { .. }
            | Self::GetLoggingStatus { .. }
            | Self::NextError => Some(ReplyKind::Line),
            Self::ReadLoggingResult { .. } => Some(ReplyKind::BlockF32),
            Self::ReadLambdaLog { .. } => Some(ReplyKind::BlockF64),
            _ => None,
        }
    }
}
