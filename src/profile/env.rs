use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::{GatewayError, Result};

/// Variables from a parsed `.env` file layered over the process environment.
///
/// Lookups consult the dotenv map first; blank values count as unset.
#[derive(Clone, Default)]
pub struct Env {
    pub dotenv: BTreeMap<String, String>,
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&str> = self.dotenv.keys().map(|key| key.as_str()).collect();
        f.debug_struct("Env").field("dotenv_keys", &keys).finish()
    }
}

impl Env {
    pub fn parse_dotenv(contents: &str) -> Self {
        Self {
            dotenv: parse_dotenv(contents),
        }
    }

    /// Reads a `.env` file; a missing file yields an empty overlay.
    pub async fn load_dotenv(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(Self::parse_dotenv(&contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(GatewayError::Io(err)),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.dotenv.get(key) {
            return Some(value.clone());
        }
        std::env::var(key)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(invalid_env(key, &raw, "expected a boolean")),
        }
    }

    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        raw.trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| invalid_env(key, &raw, &err.to_string()))
    }

    pub fn get_duration(&self, key: &str) -> Result<Option<Duration>> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        parse_duration(&raw)
            .map(Some)
            .ok_or_else(|| invalid_env(key, &raw, "expected a duration such as 45s, 500ms or 2m"))
    }
}

fn invalid_env(key: &str, raw: &str, reason: &str) -> GatewayError {
    GatewayError::Config(format!("invalid value for {key} ({raw:?}): {reason}"))
}

/// Parses `45`, `45s`, `500ms` and `2m`; a bare number means seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => raw.split_at(split),
        None => (raw, "s"),
    };
    let value = digits.parse::<u64>().ok()?;
    match unit.trim() {
        "ms" => Some(Duration::from_millis(value)),
        "s" | "" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value.checked_mul(60)?)),
        _ => None,
    }
}

pub fn parse_dotenv(contents: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::<String, String>::new();

    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line).trim();
        let Some((raw_key, raw_value)) = line.split_once('=') else {
            continue;
        };
        let key = raw_key.trim();
        if key.is_empty() {
            continue;
        }

        let mut value = raw_value.trim().to_string();
        if let Some(stripped) = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        {
            value = stripped.to_string();
        }

        if value.trim().is_empty() {
            continue;
        }

        out.insert(key.to_string(), value);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_handles_quotes_exports_and_comments() {
        let env = Env::parse_dotenv(
            "# keys\nexport SVGIO_API_KEY=\"sk-svg\"\nRECRAFT_API_KEY='rk'\nEMPTY=\nbroken line\n",
        );
        assert_eq!(env.get("SVGIO_API_KEY").as_deref(), Some("sk-svg"));
        assert_eq!(env.get("RECRAFT_API_KEY").as_deref(), Some("rk"));
        assert!(!env.dotenv.contains_key("EMPTY"));
        assert!(!format!("{env:?}").contains("sk-svg"));
    }

    #[test]
    fn typed_getters_report_bad_values() {
        let env = Env::parse_dotenv("A=yes\nB=maybe\nC=8080\nD=30s\nE=soon\n");
        assert_eq!(env.get_bool("A").unwrap(), Some(true));
        assert!(env.get_bool("B").is_err());
        assert_eq!(env.get_parsed::<u16>("C").unwrap(), Some(8080));
        assert_eq!(env.get_duration("D").unwrap(), Some(Duration::from_secs(30)));
        let err = env.get_duration("E").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
        assert_eq!(env.get_parsed::<u16>("SVG_GATEWAY_UNSET_KEY").unwrap(), None);
    }

    #[test]
    fn durations_accept_common_units() {
        assert_eq!(parse_duration("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), None);
        assert_eq!(parse_duration("s"), None);
    }
}
