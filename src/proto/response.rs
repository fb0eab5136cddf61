use std::{fmt, io, str};

/// One decoded instrument reply.
#[derive(Debug, Clone)]
pub enum Response {
    /// Newline-terminated ASCII query reply, terminator stripped.
    Line(String),
    /// Binary block of logged power samples (watts).
    PowerLog(Vec<f32>),
    /// Binary block of logged wavelength samples (meters).
    WavelengthLog(Vec<f64>),
}

/// Parsed `*IDN?` reply.
#[derive(Debug, Clone)]
pub struct Ident {
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    pub firmware: String,
}

impl TryFrom<&str> for Ident {
    type Error = io::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let values: Vec<&str> = value.split(',').collect();
        if values.len() == 4 {
            Ok(Self {
                manufacturer: String::from(values[0].trim()),
                model: String::from(values[1].trim()),
                serial: String::from(values[2].trim()),
                firmware: String::from(values[3].trim()),
            })
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("Invalid data for *IDN? response: {}", value),
            ))
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (serial {}, firmware {})",
            self.manufacturer, self.model, self.serial, self.firmware
        )
    }
}

/// One entry of an instrument's SCPI error queue, e.g.
/// `-113,"Undefined header"`. Code `0` is the "No error" sentinel that
/// terminates the queue.
#[derive(Debug, Clone)]
pub struct ScpiError {
    pub code: i32,
    pub message: String,
}

impl ScpiError {
    pub fn is_no_error(&self) -> bool {
        self.code == 0
    }
}

impl TryFrom<&str> for ScpiError {
    type Error = io::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let (code, message) = value.split_once(',').ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Other,
                format!("Invalid error queue entry: {}", value),
            )
        })?;
        let code = code
            .trim()
            .parse::<i32>()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(Self {
            code,
            message: message.trim().trim_matches('"').to_string(),
        })
    }
}

impl fmt::Display for ScpiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},\"{}\"", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ident() {
        let id = Ident::try_from("KEYSIGHT,N7776C,MY59700123,V2.021").unwrap();
        assert_eq!(id.manufacturer, "KEYSIGHT");
        assert_eq!(id.model, "N7776C");
        assert_eq!(id.serial, "MY59700123");
        assert_eq!(id.firmware, "V2.021");
    }

    #[test]
    fn test_parse_ident_too_few_fields() {
        assert!(Ident::try_from("KEYSIGHT,N7776C").is_err());
    }

    #[test]
    fn test_parse_error_entry() {
        let err = ScpiError::try_from("-113,\"Undefined header\"").unwrap();
        assert_eq!(err.code, -113);
        assert_eq!(err.message, "Undefined header");
        assert!(!err.is_no_error());
    }

    #[test]
    fn test_parse_no_error_sentinel() {
        let err = ScpiError::try_from("+0,\"No error\"").unwrap();
        assert!(err.is_no_error());
    }
}
