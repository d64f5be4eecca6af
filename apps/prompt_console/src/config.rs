use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;
use shared::domain::{Availability, Capability};
use worker_core::{HostProfile, SessionOptions, WorkerSettings};

pub const DEFAULT_CONFIG_FILE: &str = "prompt_console.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub log_filter: String,
    pub request_queue_capacity: usize,
    pub status_queue_capacity: usize,
    pub stream_responses: bool,
    pub system_prompt: String,
    pub expected_language: String,
    pub model_availability: Availability,
    pub download_steps: u32,
    pub step_delay_ms: u64,
    pub chunk_delay_ms: u64,
    pub fail_preparation: bool,
    pub inference_failure_marker: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_filter: "info".into(),
            request_queue_capacity: 16,
            status_queue_capacity: 256,
            stream_responses: true,
            system_prompt: "You are a helpful assistant. Answer concisely.".into(),
            expected_language: "en".into(),
            model_availability: Availability::Downloadable,
            download_steps: 10,
            step_delay_ms: 40,
            chunk_delay_ms: 20,
            fail_preparation: false,
            inference_failure_marker: None,
        }
    }
}

impl Settings {
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            stream_responses: self.stream_responses,
            session: SessionOptions {
                system_prompt: non_empty(&self.system_prompt),
                expected_language: non_empty(&self.expected_language),
            },
        }
    }

    pub fn host_profile(&self) -> HostProfile {
        let mut profile = HostProfile {
            download_steps: self.download_steps,
            step_delay: Duration::from_millis(self.step_delay_ms),
            chunk_delay: Duration::from_millis(self.chunk_delay_ms),
            inference_failure_marker: self.inference_failure_marker.clone(),
            ..HostProfile::default()
        }
        .with_availability(Capability::LanguageModel, self.model_availability);
        if self.fail_preparation {
            profile = profile.with_preparation_failure("simulated preparation failure");
        }
        profile
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    log_filter: Option<String>,
    request_queue_capacity: Option<usize>,
    status_queue_capacity: Option<usize>,
    stream_responses: Option<bool>,
    system_prompt: Option<String>,
    expected_language: Option<String>,
    model_availability: Option<Availability>,
    download_steps: Option<u32>,
    step_delay_ms: Option<u64>,
    chunk_delay_ms: Option<u64>,
    fail_preparation: Option<bool>,
    inference_failure_marker: Option<String>,
}

/// Defaults, then the TOML file, then `APP__*` environment variables. A
/// missing default file is fine; a missing explicit `path` is an error.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let file_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    match fs::read_to_string(&file_path) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid settings file '{}'", file_path.display()))?,
        Err(err) if err.kind() == io::ErrorKind::NotFound && path.is_none() => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read settings file '{}'", file_path.display()))
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

pub fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;

    if let Some(v) = file_cfg.log_filter {
        settings.log_filter = v;
    }
    if let Some(v) = file_cfg.request_queue_capacity {
        settings.request_queue_capacity = v;
    }
    if let Some(v) = file_cfg.status_queue_capacity {
        settings.status_queue_capacity = v;
    }
    if let Some(v) = file_cfg.stream_responses {
        settings.stream_responses = v;
    }
    if let Some(v) = file_cfg.system_prompt {
        settings.system_prompt = v;
    }
    if let Some(v) = file_cfg.expected_language {
        settings.expected_language = v;
    }
    if let Some(v) = file_cfg.model_availability {
        settings.model_availability = v;
    }
    if let Some(v) = file_cfg.download_steps {
        settings.download_steps = v;
    }
    if let Some(v) = file_cfg.step_delay_ms {
        settings.step_delay_ms = v;
    }
    if let Some(v) = file_cfg.chunk_delay_ms {
        settings.chunk_delay_ms = v;
    }
    if let Some(v) = file_cfg.fail_preparation {
        settings.fail_preparation = v;
    }
    if let Some(v) = file_cfg.inference_failure_marker {
        settings.inference_failure_marker = non_empty(&v);
    }

    Ok(())
}

/// Unparseable values are ignored and the previous value kept.
pub fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
    if let Some(v) = lookup("APP__REQUEST_QUEUE_CAPACITY").and_then(|v| v.parse().ok()) {
        settings.request_queue_capacity = v;
    }
    if let Some(v) = lookup("APP__STATUS_QUEUE_CAPACITY").and_then(|v| v.parse().ok()) {
        settings.status_queue_capacity = v;
    }
    if let Some(v) = lookup("APP__STREAM_RESPONSES").and_then(|v| parse_bool(&v)) {
        settings.stream_responses = v;
    }
    if let Some(v) = lookup("APP__SYSTEM_PROMPT") {
        settings.system_prompt = v;
    }
    if let Some(v) = lookup("APP__EXPECTED_LANGUAGE") {
        settings.expected_language = v;
    }
    if let Some(v) = lookup("APP__MODEL_AVAILABILITY").and_then(|v| v.parse().ok()) {
        settings.model_availability = v;
    }
    if let Some(v) = lookup("APP__DOWNLOAD_STEPS").and_then(|v| v.parse().ok()) {
        settings.download_steps = v;
    }
    if let Some(v) = lookup("APP__STEP_DELAY_MS").and_then(|v| v.parse().ok()) {
        settings.step_delay_ms = v;
    }
    if let Some(v) = lookup("APP__CHUNK_DELAY_MS").and_then(|v| v.parse().ok()) {
        settings.chunk_delay_ms = v;
    }
    if let Some(v) = lookup("APP__FAIL_PREPARATION").and_then(|v| parse_bool(&v)) {
        settings.fail_preparation = v;
    }
    if let Some(v) = lookup("APP__INFERENCE_FAILURE_MARKER") {
        settings.inference_failure_marker = non_empty(&v);
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    #[test]
    fn file_overrides_defaults() {
        let mut settings = Settings::default();
        apply_file(
            &mut settings,
            r##"
                log_filter = "debug"
                stream_responses = false
                model_availability = "available"
                download_steps = 3
                inference_failure_marker = "#fail"
            "##,
        )
        .expect("valid toml");

        assert_eq!(settings.log_filter, "debug");
        assert!(!settings.stream_responses);
        assert_eq!(settings.model_availability, Availability::Available);
        assert_eq!(settings.download_steps, 3);
        assert_eq!(settings.inference_failure_marker.as_deref(), Some("#fail"));
        assert_eq!(settings.status_queue_capacity, 256);
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let mut settings = Settings::default();
        assert!(apply_file(&mut settings, "bind_addr = \"127.0.0.1:8443\"").is_err());
    }

    #[test]
    fn env_overrides_and_ignores_garbage() {
        let env = HashMap::from([
            ("APP__DOWNLOAD_STEPS", "0"),
            ("APP__FAIL_PREPARATION", "yes"),
            ("APP__MODEL_AVAILABILITY", "unavailable"),
            ("APP__STEP_DELAY_MS", "soon"),
        ]);
        let mut settings = Settings::default();
        apply_env(&mut settings, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.download_steps, 0);
        assert!(settings.fail_preparation);
        assert_eq!(settings.model_availability, Availability::Unavailable);
        assert_eq!(settings.step_delay_ms, Settings::default().step_delay_ms);
    }

    #[test]
    fn host_profile_reflects_settings() {
        let settings = Settings {
            model_availability: Availability::Available,
            fail_preparation: true,
            step_delay_ms: 0,
            ..Settings::default()
        };
        let profile = settings.host_profile();
        assert_eq!(
            profile.availability.get(&Capability::LanguageModel),
            Some(&Availability::Available)
        );
        assert!(profile.preparation_failure.is_some());
        assert!(profile.step_delay.is_zero());

        let worker = Settings {
            system_prompt: "  ".into(),
            ..Settings::default()
        }
        .worker_settings();
        assert_eq!(worker.session.system_prompt, None);
        assert_eq!(worker.session.expected_language.as_deref(), Some("en"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let missing = env::temp_dir().join(format!("prompt_console_missing_{suffix}.toml"));
        assert!(load_settings(Some(&missing)).is_err());
    }

    #[test]
    fn explicit_file_is_loaded() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("prompt_console_settings_{suffix}.toml"));
        fs::write(&path, "chunk_delay_ms = 0\nexpected_language = \"es\"\n").expect("write");

        let settings = load_settings(Some(&path)).expect("load");
        assert_eq!(settings.chunk_delay_ms, 0);
        assert_eq!(settings.expected_language, "es");

        fs::remove_file(path).expect("cleanup");
    }
}
