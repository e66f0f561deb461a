use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HotkeyMode {
    /// One registered chord, control+backtick.
    Chord,
    /// Low-level hook tracking control up/down and the backtick press separately.
    Decomposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Send control+v after the clipboard write.
    Paste,
    /// Inject the translation as Unicode key events.
    Type,
}

impl std::str::FromStr for HotkeyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chord" => Ok(HotkeyMode::Chord),
            "decomposed" => Ok(HotkeyMode::Decomposed),
            other => Err(format!("unknown hotkey mode '{}'", other)),
        }
    }
}

impl std::str::FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paste" => Ok(OutputMode::Paste),
            "type" => Ok(OutputMode::Type),
            other => Err(format!("unknown output mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub hotkey_mode: HotkeyMode,
    pub source_lang: String,
    pub target_lang: String,
    pub endpoint: String,
    pub client_id: String,
    pub user_agent: String,
    /// Client-wide request timeout. 0 sets no override and leaves the
    /// transport default in place, so a hung request is never cut short.
    pub request_timeout_secs: u64,
    pub output_mode: OutputMode,
    pub paste_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkey_mode: HotkeyMode::Decomposed,
            source_lang: "ko".to_string(),
            target_lang: "en".to_string(),
            endpoint: "https://translate.googleapis.com/translate_a/single".to_string(),
            client_id: "gtx".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            request_timeout_secs: 30,
            output_mode: OutputMode::Paste,
            paste_delay_ms: 150,
        }
    }
}

pub fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Config {
    pub fn path() -> PathBuf {
        exe_dir().join("config.json")
    }

    /// Reads `config.json` next to the executable if present, then applies env overrides.
    /// The file is optional and never written back.
    pub fn load() -> Self {
        let path = Self::path();
        let mut cfg = match fs::read_to_string(&path) {
            Ok(s) => Self::from_json(&s).unwrap_or_else(|e| {
                warn!("Ignoring {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok());
        info!(
            "Config: {} -> {}, hotkey {:?}, output {:?}",
            cfg.source_lang, cfg.target_lang, cfg.hotkey_mode, cfg.output_mode
        );
        cfg
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Env vars still override file values when non-empty.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("KOTRANS_SOURCE_LANG") {
            self.source_lang = v;
        }
        if let Some(v) = get("KOTRANS_TARGET_LANG") {
            self.target_lang = v;
        }
        if let Some(v) = get("KOTRANS_HOTKEY_MODE") {
            match v.parse() {
                Ok(mode) => self.hotkey_mode = mode,
                Err(e) => warn!("KOTRANS_HOTKEY_MODE: {}", e),
            }
        }
        if let Some(v) = get("KOTRANS_OUTPUT_MODE") {
            match v.parse() {
                Ok(mode) => self.output_mode = mode,
                Err(e) => warn!("KOTRANS_OUTPUT_MODE: {}", e),
            }
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    pub fn paste_delay(&self) -> Duration {
        Duration::from_millis(self.paste_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_target_korean_to_english() {
        let cfg = Config::default();
        assert_eq!(cfg.source_lang, "ko");
        assert_eq!(cfg.target_lang, "en");
        assert_eq!(cfg.client_id, "gtx");
        assert_eq!(cfg.hotkey_mode, HotkeyMode::Decomposed);
        assert_eq!(cfg.output_mode, OutputMode::Paste);
        assert_eq!(cfg.request_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg = Config::from_json(r#"{ "hotkey_mode": "chord", "request_timeout_secs": 0 }"#).unwrap();
        assert_eq!(cfg.hotkey_mode, HotkeyMode::Chord);
        assert_eq!(cfg.request_timeout(), None);
        assert_eq!(cfg.target_lang, "en");
        assert_eq!(cfg.paste_delay(), Duration::from_millis(150));
    }

    #[test]
    fn unknown_mode_in_file_is_an_error() {
        assert!(Config::from_json(r#"{ "output_mode": "shout" }"#).is_err());
    }

    #[test]
    fn env_overrides_skip_empty_and_invalid_values() {
        let env: HashMap<&str, &str> = [
            ("KOTRANS_TARGET_LANG", "ja"),
            ("KOTRANS_SOURCE_LANG", "  "),
            ("KOTRANS_OUTPUT_MODE", "Type"),
            ("KOTRANS_HOTKEY_MODE", "sideways"),
        ]
        .into_iter()
        .collect();

        let mut cfg = Config::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.target_lang, "ja");
        assert_eq!(cfg.source_lang, "ko");
        assert_eq!(cfg.output_mode, OutputMode::Type);
        assert_eq!(cfg.hotkey_mode, HotkeyMode::Decomposed);
    }
}
