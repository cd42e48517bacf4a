use std::str::FromStr;
use std::time::Duration;

/// A `--timeout` value: anything humantime accepts (`30s`, `2m`, `1h 15m`),
/// or a bare number of seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let duration = match s.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => humantime::parse_duration(s).map_err(|e| format!("{}: {:?}", e, s))?,
        };
        if duration.is_zero() {
            return Err("timeout must be positive".to_string());
        }
        Ok(HumanDuration(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_durations() {
        assert_eq!("30s".parse::<HumanDuration>().unwrap().0, Duration::from_secs(30));
        assert_eq!("45".parse::<HumanDuration>().unwrap().0, Duration::from_secs(45));
        assert_eq!(
            "1h15m30s".parse::<HumanDuration>().unwrap().0,
            Duration::from_secs(3600 + 15 * 60 + 30)
        );
        assert_eq!("500ms".parse::<HumanDuration>().unwrap().0, Duration::from_millis(500));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!("".parse::<HumanDuration>().is_err());
        assert!("5x".parse::<HumanDuration>().is_err());
        assert!("m".parse::<HumanDuration>().is_err());
        assert!("0s".parse::<HumanDuration>().is_err());
        assert!("0".parse::<HumanDuration>().is_err());
    }

    #[test]
    fn test_rejects_overflow() {
        assert!("9999999999999999h".parse::<HumanDuration>().is_err());
        assert!("99999999999999999999999".parse::<HumanDuration>().is_err());
    }
}
