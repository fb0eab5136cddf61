use std::fmt;
use std::str::FromStr;

use crate::proto::ProtoError;

/// Parsed VISA resource string.
///
/// All four common grammars are recognized; only the LAN `inst0` form maps
/// to a transport this crate can open (raw SCPI socket). Keeping the other
/// forms parseable lets the CLI report "unsupported transport" instead of
/// "malformed address" for a GPIB or USB instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisaAddress {
    /// `TCPIP<n>::<host>::inst<n>::INSTR`, a VXI-11 style LAN resource,
    /// reached here over the raw SCPI socket.
    Tcp { host: String },
    /// `TCPIP<n>::<host>::hislip<n>::INSTR`
    Hislip { host: String },
    /// `GPIB<board>::<addr>::INSTR`
    Gpib { board: u8, addr: u8 },
    /// `USB<n>::<vid>::<pid>::<serial>::...::INSTR`, kept verbatim.
    Usb { raw: String },
}

fn bad(s: &str) -> ProtoError {
    ProtoError::BadResource(s.to_string())
}

impl FromStr for VisaAddress {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split("::").collect();
        if parts.len() < 3 || !parts.last().unwrap_or(&"").eq_ignore_ascii_case("INSTR") {
            return Err(bad(s));
        }
        let head = parts[0].to_ascii_uppercase();
        if head.starts_with("TCPIP") {
            let host = parts[1];
            if host.is_empty() {
                return Err(bad(s));
            }
            match parts.len() {
                // device name omitted, inst0 implied
                3 => Ok(Self::Tcp {
                    host: host.to_string(),
                }),
                4 => {
                    let device = parts[2].to_ascii_lowercase();
                    if device.starts_with("inst") {
                        Ok(Self::Tcp {
                            host: host.to_string(),
                        })
                    } else if device.starts_with("hislip") {
                        Ok(Self::Hislip {
                            host: host.to_string(),
                        })
                    } else {
                        Err(bad(s))
                    }
                }
                _ => Err(bad(s)),
            }
        } else if head.starts_with("GPIB") {
            if parts.len() != 3 {
                return Err(bad(s));
            }
            let board = match &head["GPIB".len()..] {
                "" => 0,
                digits => digits.parse::<u8>().map_err(|_| bad(s))?,
            };
            let addr = parts[1].parse::<u8>().map_err(|_| bad(s))?;
            Ok(Self::Gpib { board, addr })
        } else if head.starts_with("USB") {
            Ok(Self::Usb { raw: s.to_string() })
        } else {
            Err(bad(s))
        }
    }
}

impl fmt::Display for VisaAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host } => write!(f, "TCPIP0::{}::inst0::INSTR", host),
            Self::Hislip { host } => write!(f, "TCPIP0::{}::hislip0::INSTR", host),
            Self::Gpib { board, addr } => write!(f, "GPIB{}::{}::INSTR", board, addr),
            Self::Usb { raw } => f.write_str(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcpip_inst() {
        let addr: VisaAddress = "TCPIP0::100.65.16.165::inst0::INSTR".parse().unwrap();
        assert_eq!(
            addr,
            VisaAddress::Tcp {
                host: "100.65.16.165".to_string()
            }
        );
    }

    #[test]
    fn test_parse_tcpip_without_device_name() {
        let addr: VisaAddress = "TCPIP0::lab-tls.local::INSTR".parse().unwrap();
        assert_eq!(
            addr,
            VisaAddress::Tcp {
                host: "lab-tls.local".to_string()
            }
        );
    }

    #[test]
    fn test_parse_hislip() {
        let addr: VisaAddress = "TCPIP0::192.168.3.242::hislip0::INSTR".parse().unwrap();
        assert_eq!(
            addr,
            VisaAddress::Hislip {
                host: "192.168.3.242".to_string()
            }
        );
    }

    #[test]
    fn test_parse_gpib() {
        let addr: VisaAddress = "GPIB0::22::INSTR".parse().unwrap();
        assert_eq!(addr, VisaAddress::Gpib { board: 0, addr: 22 });
    }

    #[test]
    fn test_parse_usb() {
        let raw = "USB0::2391::22136::MY59700123::0::INSTR";
        let addr: VisaAddress = raw.parse().unwrap();
        assert_eq!(addr, VisaAddress::Usb { raw: raw.to_string() });
        assert_eq!(addr.to_string(), raw);
    }

    #[test]
    fn test_equal_addresses_alias() {
        let a: VisaAddress = "TCPIP0::10.0.0.5::inst0::INSTR".parse().unwrap();
        let b: VisaAddress = "TCPIP0::10.0.0.5::inst0::INSTR".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_display_round_trip() {
        let addr: VisaAddress = "TCPIP0::10.0.0.5::inst0::INSTR".parse().unwrap();
        let again: VisaAddress = addr.to_string().parse().unwrap();
        assert_eq!(addr, again);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("".parse::<VisaAddress>().is_err());
        assert!("10.0.0.5".parse::<VisaAddress>().is_err());
        assert!("TCPIP0::::inst0::INSTR".parse::<VisaAddress>().is_err());
        assert!("GPIB0::notanumber::INSTR".parse::<VisaAddress>().is_err());
        assert!("ASRL1::INSTR".parse::<VisaAddress>().is_err());
    }
}
