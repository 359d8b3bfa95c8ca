//! Parse helpers for environment values.

use std::time::Duration;

use super::ConfigError;

/// Parse an optional environment value, falling back to a default.
/// An unset variable is the default; a present-but-invalid one is an error.
pub fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Parse a positive integer number of seconds.
pub fn parse_secs(
    name: &'static str,
    value: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let secs = parse_or::<u64>(name, value, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            name,
            message: "must be greater than 0".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

/// Parse a positive integer number of milliseconds.
pub fn parse_millis(
    name: &'static str,
    value: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let millis = parse_or::<u64>(name, value, default.as_millis() as u64)?;
    if millis == 0 {
        return Err(ConfigError::Invalid {
            name,
            message: "must be greater than 0".to_string(),
        });
    }
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_defaults_when_unset() {
        assert_eq!(parse_or("PORT", None, 3000u16).unwrap(), 3000);
        assert_eq!(
            parse_or("PORT", Some("8080".to_string()), 3000u16).unwrap(),
            8080
        );
        assert!(parse_or("PORT", Some("not-a-port".to_string()), 3000u16).is_err());
    }

    #[test]
    fn test_parse_secs_rejects_zero() {
        let default = Duration::from_secs(30);
        assert_eq!(parse_secs("X", None, default).unwrap(), default);
        assert_eq!(
            parse_secs("X", Some("10".to_string()), default).unwrap(),
            Duration::from_secs(10)
        );
        assert!(parse_secs("X", Some("0".to_string()), default).is_err());
    }

    #[test]
    fn test_parse_millis() {
        let default = Duration::from_millis(500);
        assert_eq!(parse_millis("X", None, default).unwrap(), default);
        assert_eq!(
            parse_millis("X", Some("250".to_string()), default).unwrap(),
            Duration::from_millis(250)
        );
        assert!(parse_millis("X", Some("zero".to_string()), default).is_err());
    }
}
