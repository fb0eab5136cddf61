use byteorder::{ByteOrder, LittleEndian};
use bytes::{Buf, BytesMut};
use std::{
    fmt::{self, Write},
    io, str,
};
use tokio_util::codec::{Decoder, Encoder};

use super::command::{Command, ReplyKind};
use super::response::Response;

/// Encodes SCPI command text and decodes the reply the last sent command is
/// entitled to. Set-commands produce no reply, so the decoder only consumes
/// bytes while a query is pending; anything arriving earlier stays buffered.
#[derive(Default)]
pub struct ScpiCodec {
    pending: Option<ReplyKind>,
}

impl ScpiCodec {
    /// Takes one IEEE 488.2 definite-length block (`#<d><len><payload>`)
    /// off the buffer, or signals that more bytes are needed.
    fn take_block(src: &mut BytesMut) -> Result<Option<Vec<u8>>, io::Error> {
        if src.len() < 2 {
            return Ok(None);
        }
        if src[0] != b'#' {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "Definite-length block expected",
            ));
        }
        let ndigits = (src[1] as char).to_digit(10).ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "Invalid block header digit")
        })? as usize;
        if ndigits == 0 {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "Indefinite-length blocks are not supported",
            ));
        }
        if src.len() < 2 + ndigits {
            return Ok(None);
        }
        let len = str::from_utf8(&src[2..2 + ndigits])
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
            .parse::<usize>()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        if src.len() < 2 + ndigits + len {
            return Ok(None);
        }
        let _ = src.split_to(2 + ndigits);
        Ok(Some(src.split_to(len).to_vec()))
    }

    fn block_f32(payload: &[u8]) -> Result<Vec<f32>, io::Error> {
        if payload.len() % 4 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("Block length {} is not a multiple of 4", payload.len()),
            ));
        }
        Ok(payload.chunks_exact(4).map(LittleEndian::read_f32).collect())
    }

    fn block_f64(payload: &[u8]) -> Result<Vec<f64>, io::Error> {
        if payload.len() % 8 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("Block length {} is not a multiple of 8", payload.len()),
            ));
        }
        Ok(payload.chunks_exact(8).map(LittleEndian::read_f64).collect())
    }
}

impl Decoder for ScpiCodec {
    type Item = Response;
    // io::Error at this level: framing problems only. Whether a decoded
    // reply makes the operation fail is decided by the device layer.
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // terminator slack between exchanges (a block is followed by a
        // newline the block decode does not consume)
        while !src.is_empty() && (src[0] == b'\n' || src[0] == b'\r') {
            src.advance(1);
        }
        if src.is_empty() {
            return Ok(None);
        }
        match self.pending {
            // nothing owed right now; leave the bytes buffered until the
            // next query claims them
            None => Ok(None),
            Some(ReplyKind::Line) => {
                let Some(pos) = src.iter().position(|b| *b == b'\n') else {
                    return Ok(None);
                };
                let raw = src.split_to(pos + 1);
                let line = str::from_utf8(&raw[..pos])
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
                    .trim()
                    .to_string();
                self.pending = None;
                Ok(Some(Response::Line(line)))
            }
            Some(ReplyKind::BlockF32) => match Self::take_block(src)? {
                Some(payload) => {
                    self.pending = None;
                    Ok(Some(Response::PowerLog(Self::block_f32(&payload)?)))
                }
                None => Ok(None),
            },
            Some(ReplyKind::BlockF64) => match Self::take_block(src)? {
                Some(payload) => {
                    self.pending = None;
                    Ok(Some(Response::WavelengthLog(Self::block_f64(&payload)?)))
                }
                None => Ok(None),
            },
        }
    }
}

fn write_fmt_guarded(dst: &mut BytesMut, args: fmt::Arguments<'_>) -> Result<(), io::Error> {
    dst.write_fmt(args)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

impl Encoder<Command> for ScpiCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match &item {
            Command::Idn => write_fmt_guarded(dst, format_args!("*IDN?"))?,
            Command::Lock { locked, code } => {
                write_fmt_guarded(dst, format_args!("lock {},{}", u8::from(*locked), code))?
            }
            Command::SetOutputPath { slot, path } => {
                write_fmt_guarded(dst, format_args!("outp{}:path {}", slot, path.as_scpi()))?
            }
            Command::SetTriggerLoop => write_fmt_guarded(dst, format_args!("trig:conf loop"))?,
            Command::SetLaserState { slot, on } => write_fmt_guarded(
                dst,
                format_args!("sour{}:pow:stat {}", slot, u8::from(*on)),
            )?,
            Command::GetLaserState { slot } => {
                write_fmt_guarded(dst, format_args!("sour{}:pow:stat?", slot))?
            }
            Command::SetTriggerOutput { slot } => {
                write_fmt_guarded(dst, format_args!("trig{}:outp stf", slot))?
            }
            Command::SetTriggerInput { slot, mode } => {
                write_fmt_guarded(dst, format_args!("trig{}:inp {}", slot, mode.as_scpi()))?
            }
            Command::SetSweepStart { slot, nm } => {
                write_fmt_guarded(dst, format_args!("sour{}:wav:swe:star {}nm", slot, nm))?
            }
            Command::SetSweepStop { slot, nm } => {
                write_fmt_guarded(dst, format_args!("sour{}:wav:swe:stop {}nm", slot, nm))?
            }
            Command::SetSweepStep { slot, pm } => {
                write_fmt_guarded(dst, format_args!("sour{}:wav:swe:step {}pm", slot, pm))?
            }
            Command::SetSweepSpeed { slot, nm_per_s } => write_fmt_guarded(
                dst,
                format_args!("sour{}:wav:swe:spe {}nm/s", slot, nm_per_s),
            )?,
            Command::SetSweepContinuous { slot } => {
                write_fmt_guarded(dst, format_args!("sour{}:wav:swe:mode cont", slot))?
            }
            Command::SetLambdaLogging { slot, on } => write_fmt_guarded(
                dst,
                format_args!("sour{}:wav:swe:llog {}", slot, u8::from(*on)),
            )?,
            Command::SweepCheck { slot } => {
                write_fmt_guarded(dst, format_args!("sour{}:wav:swe:chec?", slot))?
            }
            Command::GetMaxPower {
                slot,
                start_nm,
                stop_nm,
            } => write_fmt_guarded(
                dst,
                format_args!("sour{}:wav:swe:pmax? {}nm,{}nm", slot, start_nm, stop_nm),
            )?,
            Command::SetPower { slot, dbm } => {
                write_fmt_guarded(dst, format_args!("sour{}:pow {}dbm", slot, dbm))?
            }
            Command::GetExpectedPoints { slot } => {
                write_fmt_guarded(dst, format_args!("sour{}:wav:swe:exp?", slot))?
            }
            Command::ArmSweep { slot } => {
                write_fmt_guarded(dst, format_args!("sour{}:wav:swe 1", slot))?
            }
            Command::SoftTrigger { slot } => {
                write_fmt_guarded(dst, format_args!("sour{}:wav:swe:soft", slot))?
            }
            Command::GetSweepFlag { slot } => {
                write_fmt_guarded(dst, format_args!("sour{}:wav:swe:flag?", slot))?
            }
            Command::ReadLambdaLog { slot } => {
                write_fmt_guarded(dst, format_args!("sour{}:read:data? llog", slot))?
            }
            Command::SetPowerUnit { slot, unit } => write_fmt_guarded(
                dst,
                format_args!("sens{}:pow:unit {}", slot, *unit as u8),
            )?,
            Command::SetAutoRange { slot, on } => write_fmt_guarded(
                dst,
                format_args!("sens{}:pow:rang:auto {}", slot, u8::from(*on)),
            )?,
            Command::SetPowerRange { slot, dbm } => {
                write_fmt_guarded(dst, format_args!("sens{}:pow:rang {}dbm", slot, dbm))?
            }
            Command::GetPowerRange { slot } => {
                write_fmt_guarded(dst, format_args!("sens{}:pow:rang?", slot))?
            }
            Command::SetPowerWavelength { slot, nm } => {
                write_fmt_guarded(dst, format_args!("sens{}:pow:wav {}nm", slot, nm))?
            }
            Command::SetAveragingTime { slot, us } => {
                write_fmt_guarded(dst, format_args!("sens{}:pow:atim {}us", slot, us))?
            }
            Command::GetAveragingTime { slot } => {
                write_fmt_guarded(dst, format_args!("sens{}:pow:atim?", slot))?
            }
            Command::ConfigureLogging {
                slot,
                points,
                averaging_us,
            } => write_fmt_guarded(
                dst,
                format_args!("sens{}:func:par:logg {},{}us", slot, points, averaging_us),
            )?,
            Command::StartLogging { slot } => {
                write_fmt_guarded(dst, format_args!("sens{}:func:stat logg,star", slot))?
            }
            Command::GetLoggingStatus { slot } => {
                write_fmt_guarded(dst, format_args!("sens{}:func:stat?", slot))?
            }
            Command::ReadLoggingResult { slot } => {
                write_fmt_guarded(dst, format_args!("sens{}:func:result?", slot))?
            }
            Command::NextError => write_fmt_guarded(dst, format_args!(":syst:err?"))?,
        }
        dst.write_char('\n')
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        self.pending = item.reply_kind();
        Ok(())
    }
}
