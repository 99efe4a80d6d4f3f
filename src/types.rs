use std::fmt;
use std::str::FromStr;

/// Which backend serves requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Forward to a real serial port.
    #[default]
    Live,
    /// No serial port; `/read/` returns synthetic readings.
    Simulated,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Live => f.write_str("live"),
            Mode::Simulated => f.write_str("simulated"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(Mode::Live),
            "simulated" | "sim" | "dummy" => Ok(Mode::Simulated),
            other => Err(format!("unknown mode '{other}' (expected live or simulated)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mode() {
        assert_eq!("live".parse::<Mode>().unwrap(), Mode::Live);
        assert_eq!("Simulated".parse::<Mode>().unwrap(), Mode::Simulated);
        assert_eq!("dummy".parse::<Mode>().unwrap(), Mode::Simulated);
        assert!("serial".parse::<Mode>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for mode in [Mode::Live, Mode::Simulated] {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        }
    }
}
