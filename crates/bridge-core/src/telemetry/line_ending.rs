//! Line terminator selection for serial framing.
//!
//! Different firmware prints different terminators: most Unix-flavoured
//! toolchains emit LF, some vendor bootloaders emit CRLF, and a few legacy
//! stacks emit a bare CR.  The bridge reads and writes whichever the device
//! speaks, so the terminator is part of its configuration rather than a
//! hard-coded constant.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a line ending name is not recognised.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown line ending '{0}' (expected 'lf', 'cr', or 'crlf')")]
pub struct ParseLineEndingError(String);

/// The byte sequence terminating each line on the serial wire.
///
/// Used both to split incoming device bytes into lines and to terminate
/// outgoing commands.  The lowercase names (`lf`, `cr`, `crlf`) are the
/// spelling used in config files and on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    /// `\n`, the common default.
    #[default]
    Lf,
    /// `\r`, seen on some legacy firmware.
    Cr,
    /// `\r\n`, common on Windows-built firmware and modems.
    CrLf,
}

impl LineEnding {
    /// The terminator as raw bytes, ready to write to a serial port.
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::Lf => b"\n",
            LineEnding::Cr => b"\r",
            LineEnding::CrLf => b"\r\n",
        }
    }
}

impl fmt::Display for LineEnding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LineEnding::Lf => "lf",
            LineEnding::Cr => "cr",
            LineEnding::CrLf => "crlf",
        };
        write!(f, "{name}")
    }
}

impl FromStr for LineEnding {
    type Err = ParseLineEndingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lf" => Ok(LineEnding::Lf),
            "cr" => Ok(LineEnding::Cr),
            "crlf" => Ok(LineEnding::CrLf),
            other => Err(ParseLineEndingError(other.to_string())),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_bytes() {
        assert_eq!(LineEnding::Lf.as_bytes(), b"\n");
        assert_eq!(LineEnding::Cr.as_bytes(), b"\r");
        assert_eq!(LineEnding::CrLf.as_bytes(), b"\r\n");
    }

    #[test]
    fn test_default_is_lf() {
        assert_eq!(LineEnding::default(), LineEnding::Lf);
    }

    #[test]
    fn test_from_str_valid_names() {
        assert_eq!("lf".parse::<LineEnding>().unwrap(), LineEnding::Lf);
        assert_eq!("cr".parse::<LineEnding>().unwrap(), LineEnding::Cr);
        assert_eq!("crlf".parse::<LineEnding>().unwrap(), LineEnding::CrLf);
    }

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!("CRLF".parse::<LineEnding>().unwrap(), LineEnding::CrLf);
        assert_eq!("Lf".parse::<LineEnding>().unwrap(), LineEnding::Lf);
    }

    #[test]
    fn test_from_str_rejects_unknown_name() {
        let err = "unix".parse::<LineEnding>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown line ending 'unix' (expected 'lf', 'cr', or 'crlf')"
        );
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for ending in [LineEnding::Lf, LineEnding::Cr, LineEnding::CrLf] {
            let parsed: LineEnding = ending.to_string().parse().unwrap();
            assert_eq!(parsed, ending);
        }
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&LineEnding::CrLf).unwrap(), "\"crlf\"");
        assert_eq!(serde_json::to_string(&LineEnding::Lf).unwrap(), "\"lf\"");

        let parsed: LineEnding = serde_json::from_str("\"cr\"").unwrap();
        assert_eq!(parsed, LineEnding::Cr);
    }
}
