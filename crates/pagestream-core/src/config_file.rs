use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub endpoints: Option<EndpointsConfig>,
    pub processing: Option<ProcessingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointsConfig {
    pub stream_addr: Option<String>,
    pub batch_url: Option<String>,
    pub assist_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub prefer_streaming: Option<bool>,
    pub lang: Option<String>,
    pub batch_timeout_secs: Option<u64>,
}

/// Platform config directory path: `<config_dir>/pagestream/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pagestream").join("config.toml"))
}

/// Load config by cascading CWD `.pagestream.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(&PathBuf::from(".pagestream.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &PathBuf) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        endpoints: Some(EndpointsConfig {
            stream_addr: overlay
                .endpoints
                .as_ref()
                .and_then(|e| e.stream_addr.clone())
                .or_else(|| base.endpoints.as_ref().and_then(|e| e.stream_addr.clone())),
            batch_url: overlay
                .endpoints
                .as_ref()
                .and_then(|e| e.batch_url.clone())
                .or_else(|| base.endpoints.as_ref().and_then(|e| e.batch_url.clone())),
            assist_url: overlay
                .endpoints
                .as_ref()
                .and_then(|e| e.assist_url.clone())
                .or_else(|| base.endpoints.as_ref().and_then(|e| e.assist_url.clone())),
        }),
        processing: Some(ProcessingConfig {
            prefer_streaming: overlay
                .processing
                .as_ref()
                .and_then(|p| p.prefer_streaming)
                .or_else(|| base.processing.as_ref().and_then(|p| p.prefer_streaming)),
            lang: overlay
                .processing
                .as_ref()
                .and_then(|p| p.lang.clone())
                .or_else(|| base.processing.as_ref().and_then(|p| p.lang.clone())),
            batch_timeout_secs: overlay
                .processing
                .as_ref()
                .and_then(|p| p.batch_timeout_secs)
                .or_else(|| {
                    base.processing
                        .as_ref()
                        .and_then(|p| p.batch_timeout_secs)
                }),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    #[test]
    fn round_trip_toml() {
        let config = ConfigFile {
            endpoints: Some(EndpointsConfig {
                stream_addr: Some("ocr.internal:9001".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ConfigFile = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            parsed.endpoints.unwrap().stream_addr.unwrap(),
            "ocr.internal:9001"
        );
    }

    #[test]
    fn partial_file_parses_with_absent_sections() {
        let toml_str = "[processing]\nlang = \"deu\"\n";
        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        assert!(parsed.endpoints.is_none());
        assert_eq!(parsed.processing.unwrap().lang.unwrap(), "deu");
    }

    #[test]
    fn merge_overlay_wins() {
        let base = ConfigFile {
            endpoints: Some(EndpointsConfig {
                batch_url: Some("http://base/upload/".to_string()),
                assist_url: Some("http://base".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            endpoints: Some(EndpointsConfig {
                batch_url: Some("http://overlay/upload/".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        let endpoints = merged.endpoints.unwrap();
        assert_eq!(endpoints.batch_url.unwrap(), "http://overlay/upload/");
        // Base values survive where the overlay is silent.
        assert_eq!(endpoints.assist_url.unwrap(), "http://base");
    }

    #[test]
    fn load_from_missing_path_is_none() {
        assert!(load_from_path(&PathBuf::from("/nonexistent/pagestream.toml")).is_none());
    }

    #[test]
    fn load_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[endpoints]\nstream_addr = \"10.0.0.5:9001\"\n").unwrap();
        let parsed = load_from_path(&path).unwrap();
        assert_eq!(
            parsed.endpoints.unwrap().stream_addr.unwrap(),
            "10.0.0.5:9001"
        );
    }

    #[test]
    fn apply_file_overrides_defaults_only_where_set() {
        let mut config = Config::default();
        let file = ConfigFile {
            processing: Some(ProcessingConfig {
                prefer_streaming: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };
        config.apply_file(&file);
        assert!(!config.prefer_streaming);
        assert_eq!(config.lang, "eng");
        assert_eq!(config.batch_timeout_secs, 300);
    }
}
