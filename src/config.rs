//! Configuration module for the profile snapshot and server limits
//!
//! All configuration is loaded from environment variables prefixed with
//! `OUTLOOK_MCP_`. The profile path and the store exclusion list can also be
//! given on the command line, which takes precedence.

use std::env;
use std::env::VarError;
use std::path::PathBuf;
use std::str::FromStr;

use crate::enumerate::WindowLimits;
use crate::errors::{AppError, AppResult};
use crate::stores::ExclusionList;

/// Separator for list-valued variables
const LIST_SEPARATOR: char = ';';

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub profile: Option<PathBuf>,
    /// Replaces `OUTLOOK_MCP_EXCLUDED_STORES` when non-empty
    pub excluded_stores: Vec<String>,
}

/// Server-wide configuration
///
/// Cloned into MCP tool handlers via `Arc` for shared access.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// JSON profile snapshot served by the in-process host
    pub profile_path: PathBuf,
    /// Store display names hidden from every operation
    pub excluded_stores: Vec<String>,
    /// Lookback applied when a caller omits `days_back` (0 = unbounded)
    pub default_lookback_days: u32,
    /// Upper clamp for lookbacks (0 = not enforced)
    pub max_lookback_days: u32,
    pub default_email_limit: usize,
    /// Hard maximum result cap for email enumeration
    pub max_result_cap: usize,
    pub default_contact_limit: usize,
    pub max_contact_limit: usize,
    pub max_event_limit: usize,
    /// Body preview truncation length in characters
    pub body_preview_chars: usize,
    /// Caller-side wait bound for a single host job
    pub call_timeout_ms: u64,
}

impl ServerConfig {
    /// Load all configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if required variables are missing, malformed,
    /// or out of range.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// OUTLOOK_MCP_PROFILE_PATH=/home/me/.outlook-mcp/profile.json
    /// OUTLOOK_MCP_EXCLUDED_STORES=Team Mailbox;Public Folders
    /// OUTLOOK_MCP_DEFAULT_LOOKBACK_DAYS=2
    /// OUTLOOK_MCP_MAX_RESULT_CAP=50
    /// ```
    pub fn load_from_env(overrides: CliOverrides) -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key), overrides)
    }

    fn from_lookup<F>(lookup: F, overrides: CliOverrides) -> AppResult<Self>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let profile_path = match overrides.profile {
            Some(path) => path,
            None => PathBuf::from(required_env(&lookup, "OUTLOOK_MCP_PROFILE_PATH")?),
        };
        let excluded_stores = if overrides.excluded_stores.is_empty() {
            match lookup("OUTLOOK_MCP_EXCLUDED_STORES") {
                Ok(v) => parse_list_value(&v),
                Err(VarError::NotPresent) => Vec::new(),
                Err(VarError::NotUnicode(_)) => {
                    return Err(non_unicode("OUTLOOK_MCP_EXCLUDED_STORES"));
                }
            }
        } else {
            overrides.excluded_stores
        };

        let config = Self {
            profile_path,
            excluded_stores,
            default_lookback_days: parse_env(&lookup, "OUTLOOK_MCP_DEFAULT_LOOKBACK_DAYS", 2)?,
            max_lookback_days: parse_env(&lookup, "OUTLOOK_MCP_MAX_LOOKBACK_DAYS", 0)?,
            default_email_limit: parse_env(&lookup, "OUTLOOK_MCP_DEFAULT_EMAIL_LIMIT", 5)?,
            max_result_cap: parse_env(&lookup, "OUTLOOK_MCP_MAX_RESULT_CAP", 50)?,
            default_contact_limit: parse_env(&lookup, "OUTLOOK_MCP_DEFAULT_CONTACT_LIMIT", 50)?,
            max_contact_limit: parse_env(&lookup, "OUTLOOK_MCP_MAX_CONTACT_LIMIT", 200)?,
            max_event_limit: parse_env(&lookup, "OUTLOOK_MCP_MAX_EVENT_LIMIT", 100)?,
            body_preview_chars: parse_env(&lookup, "OUTLOOK_MCP_BODY_PREVIEW_CHARS", 500)?,
            call_timeout_ms: parse_env(&lookup, "OUTLOOK_MCP_CALL_TIMEOUT_MS", 60_000)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        let positive = [
            ("OUTLOOK_MCP_DEFAULT_EMAIL_LIMIT", self.default_email_limit),
            ("OUTLOOK_MCP_MAX_RESULT_CAP", self.max_result_cap),
            ("OUTLOOK_MCP_DEFAULT_CONTACT_LIMIT", self.default_contact_limit),
            ("OUTLOOK_MCP_MAX_CONTACT_LIMIT", self.max_contact_limit),
            ("OUTLOOK_MCP_MAX_EVENT_LIMIT", self.max_event_limit),
        ];
        if let Some((key, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(AppError::InvalidInput(format!("{key} must be at least 1")));
        }
        if self.call_timeout_ms == 0 {
            return Err(AppError::InvalidInput(
                "OUTLOOK_MCP_CALL_TIMEOUT_MS must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn window_limits(&self) -> WindowLimits {
        WindowLimits {
            max_result_cap: self.max_result_cap,
            max_lookback_days: self.max_lookback_days,
        }
    }

    pub fn exclusions(&self) -> ExclusionList {
        ExclusionList::new(self.excluded_stores.iter().cloned())
    }
}

/// Read a required variable, returning error if missing or empty
fn required_env<F>(lookup: &F, key: &str) -> AppResult<String>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    match lookup(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::InvalidInput(format!(
            "missing required environment variable {key}"
        ))),
    }
}

/// Parse a numeric variable, returning `default` if unset
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set but does not parse.
fn parse_env<F, T>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Result<String, VarError>,
    T: FromStr,
{
    match lookup(key) {
        Ok(v) => v.trim().parse::<T>().map_err(|_| {
            AppError::InvalidInput(format!("invalid numeric environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(non_unicode(key)),
    }
}

fn non_unicode(key: &str) -> AppError {
    AppError::InvalidInput(format!(
        "environment variable {key} contains non-unicode data"
    ))
}

/// Split a `;`-separated list, trimming entries and dropping empty ones
fn parse_list_value(value: &str) -> Vec<String> {
    value
        .split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::env::VarError;
    use std::path::PathBuf;

    use super::{CliOverrides, ServerConfig, parse_list_value};
    use crate::errors::AppError;

    fn load(vars: &[(&str, &str)], overrides: CliOverrides) -> Result<ServerConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        ServerConfig::from_lookup(
            |key| vars.get(key).cloned().ok_or(VarError::NotPresent),
            overrides,
        )
    }

    #[test]
    fn parse_list_value_splits_and_trims() {
        assert_eq!(
            parse_list_value("Team Mailbox; Public Folders ;;"),
            vec!["Team Mailbox", "Public Folders"]
        );
        assert!(parse_list_value("").is_empty());
    }

    #[test]
    fn defaults_apply_when_only_profile_is_set() {
        let config = load(
            &[("OUTLOOK_MCP_PROFILE_PATH", "/tmp/profile.json")],
            CliOverrides::default(),
        )
        .expect("config loads");
        assert_eq!(config.profile_path, PathBuf::from("/tmp/profile.json"));
        assert_eq!(config.default_lookback_days, 2);
        assert_eq!(config.max_lookback_days, 0);
        assert_eq!(config.default_email_limit, 5);
        assert_eq!(config.max_result_cap, 50);
        assert_eq!(config.default_contact_limit, 50);
        assert_eq!(config.max_contact_limit, 200);
        assert_eq!(config.body_preview_chars, 500);
        assert_eq!(config.call_timeout_ms, 60_000);
        assert!(config.excluded_stores.is_empty());
    }

    #[test]
    fn missing_profile_is_rejected_unless_overridden() {
        let err = load(&[], CliOverrides::default()).expect_err("must fail");
        assert!(matches!(err, AppError::InvalidInput(_)));

        let config = load(
            &[("OUTLOOK_MCP_EXCLUDED_STORES", "Team Mailbox")],
            CliOverrides {
                profile: Some(PathBuf::from("cli.json")),
                excluded_stores: vec!["Archive".to_owned()],
            },
        )
        .expect("config loads");
        assert_eq!(config.profile_path, PathBuf::from("cli.json"));
        assert_eq!(config.excluded_stores, vec!["Archive"]);
    }

    #[test]
    fn malformed_and_zero_limits_are_rejected() {
        let err = load(
            &[
                ("OUTLOOK_MCP_PROFILE_PATH", "p.json"),
                ("OUTLOOK_MCP_MAX_RESULT_CAP", "lots"),
            ],
            CliOverrides::default(),
        )
        .expect_err("must fail");
        assert!(err.to_string().contains("OUTLOOK_MCP_MAX_RESULT_CAP"));

        let err = load(
            &[
                ("OUTLOOK_MCP_PROFILE_PATH", "p.json"),
                ("OUTLOOK_MCP_MAX_CONTACT_LIMIT", "0"),
            ],
            CliOverrides::default(),
        )
        .expect_err("must fail");
        assert!(err.to_string().contains("at least 1"));
    }
}
