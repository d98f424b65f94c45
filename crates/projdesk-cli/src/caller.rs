//! Caller identity resolution for CLI commands.
//!
//! Channel: `--channel` flag > `PROJDESK_CHANNEL` env.
//! Email: `--as` flag > `PROJDESK_ACTOR` env > `GIT_AUTHOR_EMAIL` env.
//! Every command needs both; access is decided from them by the desk.

use projdesk_core::desk::Caller;
use std::env;

pub const CHANNEL_ENV: &str = "PROJDESK_CHANNEL";
pub const ACTOR_ENV: &str = "PROJDESK_ACTOR";
const FALLBACK_ACTOR_ENV: &str = "GIT_AUTHOR_EMAIL";

/// Errors from caller resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerResolutionError {
    /// Human-readable description.
    pub message: String,
    /// Machine error code.
    pub code: &'static str,
}

impl std::fmt::Display for CallerResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CallerResolutionError {}

/// Environment reader trait for dependency injection in tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

fn first_of(flag: Option<&str>, env: &dyn EnvReader, keys: &[&str]) -> Option<String> {
    if let Some(value) = flag.map(str::trim).filter(|v| !v.is_empty()) {
        return Some(value.to_string());
    }
    keys.iter().find_map(|key| env.get(key))
}

fn resolve_caller_with(
    channel_flag: Option<&str>,
    as_flag: Option<&str>,
    env: &dyn EnvReader,
) -> Result<Caller, CallerResolutionError> {
    let channel = first_of(channel_flag, env, &[CHANNEL_ENV]).ok_or_else(|| {
        CallerResolutionError {
            message: format!("Channel required. Set --channel or {CHANNEL_ENV}."),
            code: "missing_channel",
        }
    })?;
    let email = first_of(as_flag, env, &[ACTOR_ENV, FALLBACK_ACTOR_ENV]).ok_or_else(|| {
        CallerResolutionError {
            message: format!("Caller email required. Set --as or {ACTOR_ENV}."),
            code: "missing_actor",
        }
    })?;
    Ok(Caller::new(channel, email))
}

/// Resolve who is running the command.
///
/// # Errors
///
/// Returns an error when the channel or the email cannot be resolved.
pub fn resolve_caller(
    channel_flag: Option<&str>,
    as_flag: Option<&str>,
) -> Result<Caller, CallerResolutionError> {
    resolve_caller_with(channel_flag, as_flag, &RealEnv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MockEnv {
        vars: HashMap<String, String>,
    }

    impl MockEnv {
        fn new() -> Self {
            Self {
                vars: HashMap::new(),
            }
        }

        fn var(mut self, key: &str, val: &str) -> Self {
            self.vars.insert(key.to_string(), val.to_string());
            self
        }
    }

    impl EnvReader for MockEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.vars.get(key).filter(|v| !v.trim().is_empty()).cloned()
        }
    }

    #[test]
    fn flags_win_over_env() {
        let env = MockEnv::new()
            .var(CHANNEL_ENV, "C-ENV")
            .var(ACTOR_ENV, "env@x.com");
        let caller =
            resolve_caller_with(Some("C-FLAG"), Some("flag@x.com"), &env).expect("caller");
        assert_eq!(caller, Caller::new("C-FLAG", "flag@x.com"));
    }

    #[test]
    fn env_fills_missing_flags() {
        let env = MockEnv::new()
            .var(CHANNEL_ENV, "C-ENV")
            .var(ACTOR_ENV, "env@x.com");
        let caller = resolve_caller_with(None, None, &env).expect("caller");
        assert_eq!(caller, Caller::new("C-ENV", "env@x.com"));
    }

    #[test]
    fn git_author_is_last_resort_for_email() {
        let env = MockEnv::new()
            .var(CHANNEL_ENV, "C-ENV")
            .var(FALLBACK_ACTOR_ENV, "git@x.com");
        let caller = resolve_caller_with(None, None, &env).expect("caller");
        assert_eq!(caller.email, "git@x.com");
    }

    #[test]
    fn blank_flag_falls_through() {
        let env = MockEnv::new().var(CHANNEL_ENV, "C-ENV");
        let caller = resolve_caller_with(Some("  "), Some("a@x.com"), &env).expect("caller");
        assert_eq!(caller.channel, "C-ENV");
    }

    #[test]
    fn missing_channel_is_reported() {
        let err = resolve_caller_with(None, Some("a@x.com"), &MockEnv::new())
            .expect_err("no channel");
        assert_eq!(err.code, "missing_channel");
    }

    #[test]
    fn missing_email_is_reported() {
        let err = resolve_caller_with(Some("C-1"), None, &MockEnv::new()).expect_err("no email");
        assert_eq!(err.code, "missing_actor");
        assert!(err.to_string().contains(ACTOR_ENV));
    }
}
