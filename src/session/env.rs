//! Environment resolution for the session: shell and config file path.

use std::collections::HashMap;
use std::path::PathBuf;

use super::SessionError;

/// Preferred shell for hotkey commands.
pub const SHELL_ENV: &str = "RHKD_SHELL";
/// Fallback shell variable.
pub const LOGIN_SHELL_ENV: &str = "SHELL";
pub const CONFIG_HOME_ENV: &str = "XDG_CONFIG_HOME";
pub const HOME_ENV: &str = "HOME";
/// Set in the environment of every command to the daemon's pid.
pub const PID_ENV: &str = "RHKD_PID";

/// Config file location relative to the config home.
pub const CONFIG_PATH: &str = "rhkd/rhkdrc";

/// Read access to environment variables.
pub trait Environment {
    fn var(&self, key: &str) -> Option<String>;

    /// The variable, treating an empty value as unset.
    fn non_empty(&self, key: &str) -> Option<String> {
        self.var(key).filter(|v| !v.is_empty())
    }
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Environment for HashMap<&str, &str> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.to_string())
    }
}

/// `$RHKD_SHELL`, else `$SHELL`.
pub fn resolve_shell(env: &impl Environment) -> Result<String, SessionError> {
    env.non_empty(SHELL_ENV)
        .or_else(|| env.non_empty(LOGIN_SHELL_ENV))
        .ok_or(SessionError::MissingShell(LOGIN_SHELL_ENV))
}

/// An explicit non-empty path verbatim, else `$XDG_CONFIG_HOME/rhkd/rhkdrc`,
/// else `$HOME/.config/rhkd/rhkdrc`.
pub fn resolve_config_path(
    explicit: Option<&str>,
    env: &impl Environment,
) -> Result<PathBuf, SessionError> {
    if let Some(path) = explicit.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    if let Some(config_home) = env.non_empty(CONFIG_HOME_ENV) {
        return Ok(PathBuf::from(config_home).join(CONFIG_PATH));
    }
    env.non_empty(HOME_ENV)
        .map(|home| PathBuf::from(home).join(".config").join(CONFIG_PATH))
        .ok_or(SessionError::NoConfigHome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_prefers_override() {
        let env = HashMap::from([(SHELL_ENV, "/bin/dash"), (LOGIN_SHELL_ENV, "/bin/zsh")]);
        assert_eq!(resolve_shell(&env).unwrap(), "/bin/dash");
    }

    #[test]
    fn shell_falls_back_to_login_shell() {
        let env = HashMap::from([(SHELL_ENV, ""), (LOGIN_SHELL_ENV, "/bin/zsh")]);
        assert_eq!(resolve_shell(&env).unwrap(), "/bin/zsh");
    }

    #[test]
    fn missing_shell() {
        let env: HashMap<&str, &str> = HashMap::new();
        assert!(matches!(
            resolve_shell(&env),
            Err(SessionError::MissingShell(_))
        ));
    }

    #[test]
    fn explicit_path_is_verbatim() {
        let env = HashMap::from([(CONFIG_HOME_ENV, "/xdg"), (HOME_ENV, "/home/u")]);
        assert_eq!(
            resolve_config_path(Some("relative/rc"), &env).unwrap(),
            PathBuf::from("relative/rc")
        );
    }

    #[test]
    fn empty_explicit_path_is_ignored() {
        let env = HashMap::from([(CONFIG_HOME_ENV, "/xdg")]);
        assert_eq!(
            resolve_config_path(Some(""), &env).unwrap(),
            PathBuf::from("/xdg/rhkd/rhkdrc")
        );
    }

    #[test]
    fn home_fallback() {
        let env = HashMap::from([(HOME_ENV, "/home/u")]);
        assert_eq!(
            resolve_config_path(None, &env).unwrap(),
            PathBuf::from("/home/u/.config/rhkd/rhkdrc")
        );
    }

    #[test]
    fn no_config_home() {
        let env = HashMap::from([(CONFIG_HOME_ENV, "")]);
        assert!(matches!(
            resolve_config_path(None, &env),
            Err(SessionError::NoConfigHome)
        ));
    }
}
