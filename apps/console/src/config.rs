use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;

pub const DEFAULT_CONFIG_FILE: &str = "console.toml";
pub const DEFAULT_PROMPT: &str = "\x1B[34m>> \x1B[0m";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub prompt: String,
    pub log_file: Option<PathBuf>,
    pub log_filter: String,
    pub engine_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.into(),
            log_file: default_log_file(),
            log_filter: "info".into(),
            engine_timeout_ms: 2000,
        }
    }
}

impl Settings {
    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms)
    }
}

fn default_log_file() -> Option<PathBuf> {
    dirs::data_local_dir().map(|base| base.join("jami-console").join("console.log"))
}

/// Defaults, then the config file, then the environment.
///
/// A missing `console.toml` in the working directory is not an error; a
/// missing file named explicitly with `--config` is.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (path, required) = match config_path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(&path) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?,
        Err(err) if required => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
        Err(_) => {}
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg = toml::from_str::<HashMap<String, String>>(raw)?;

    if let Some(v) = file_cfg.get("prompt") {
        settings.prompt = v.clone();
    }
    if let Some(v) = file_cfg.get("log_file") {
        settings.log_file = Some(PathBuf::from(v));
    }
    if let Some(v) = file_cfg.get("log_filter") {
        settings.log_filter = v.clone();
    }
    if let Some(v) = file_cfg.get("engine_timeout_ms") {
        settings.engine_timeout_ms = v
            .parse()
            .with_context(|| format!("invalid engine_timeout_ms '{v}'"))?;
    }
    Ok(())
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("CONSOLE_PROMPT") {
        settings.prompt = v;
    }
    if let Some(v) = var("APP__PROMPT") {
        settings.prompt = v;
    }

    if let Some(v) = var("CONSOLE_LOG_FILE") {
        settings.log_file = Some(PathBuf::from(v));
    }
    if let Some(v) = var("APP__LOG_FILE") {
        settings.log_file = Some(PathBuf::from(v));
    }

    if let Some(v) = var("APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    if let Some(v) = var("APP__ENGINE_TIMEOUT_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.engine_timeout_ms = parsed;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    #[test]
    fn file_values_override_defaults() {
        let mut settings = Settings::default();
        apply_file(
            &mut settings,
            "prompt = \"$ \"\nlog_file = \"/tmp/console.log\"\nengine_timeout_ms = \"500\"\n",
        )
        .expect("apply");

        assert_eq!(settings.prompt, "$ ");
        assert_eq!(settings.log_file, Some(PathBuf::from("/tmp/console.log")));
        assert_eq!(settings.log_filter, "info");
        assert_eq!(settings.engine_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn malformed_timeout_is_rejected() {
        let mut settings = Settings::default();
        assert!(apply_file(&mut settings, "engine_timeout_ms = \"soon\"").is_err());
    }

    #[test]
    fn app_prefixed_env_wins_over_legacy_name() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CONSOLE_PROMPT", "legacy> "),
            ("APP__PROMPT", "app> "),
            ("APP__LOG_FILTER", "debug"),
            ("APP__ENGINE_TIMEOUT_MS", "not-a-number"),
        ]);
        let mut settings = Settings::default();
        apply_env(&mut settings, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.prompt, "app> ");
        assert_eq!(settings.log_filter, "debug");
        assert_eq!(settings.engine_timeout_ms, 2000);
    }

    #[test]
    fn explicit_config_path_must_exist() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let missing = std::env::temp_dir().join(format!("jami_console_missing_{suffix}.toml"));

        let err = load_settings(Some(&missing)).expect_err("missing config");
        assert!(err.to_string().contains("failed to read config file"));
    }
}
