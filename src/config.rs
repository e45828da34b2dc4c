//! Channel registry configuration

use crate::error::{EpgError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A locally declared channel and the URL of its guide feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_lang")]
    pub lang: String,
}

/// A complete upstream guide from which only allow-listed channels are taken
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraSource {
    pub url: String,
    #[serde(default)]
    pub channels: Vec<ExtraChannel>,
    #[serde(default = "default_lang")]
    pub lang: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraChannel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub logo: Option<String>,
}

fn default_lang() -> String { "en".to_string() }

/// Both accepted file layouts: a bare channel list, or channels plus extra guides
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConfigFile {
    Full {
        channels: Vec<ChannelSpec>,
        #[serde(default)]
        extra_epg: Vec<ExtraSource>,
    },
    Flat(Vec<ChannelSpec>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeConfig {
    pub channels: Vec<ChannelSpec>,
    pub extra_epg: Vec<ExtraSource>,
}

impl MergeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| EpgError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content).map_err(|source| EpgError::ConfigFormat {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        let file: ConfigFile = serde_json::from_str(content)?;
        Ok(match file {
            ConfigFile::Full { channels, extra_epg } => Self { channels, extra_epg },
            ConfigFile::Flat(channels) => Self { channels, extra_epg: Vec::new() },
        })
    }

    pub fn source_count(&self) -> usize {
        self.channels.len() + self.extra_epg.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flat_list() {
        let config = MergeConfig::from_json(
            r#"[{"name": "Test TV", "url": "http://x/feed", "logo": "http://x/logo.png"}]"#,
        )
        .unwrap();
        assert_eq!(config.channels.len(), 1);
        assert!(config.extra_epg.is_empty());
        assert_eq!(config.channels[0].lang, "en");
        assert_eq!(config.channels[0].logo.as_deref(), Some("http://x/logo.png"));
        assert_eq!(config.channels[0].id, None);
    }

    #[test]
    fn test_full_layout() {
        let config = MergeConfig::from_json(
            r#"{
                "channels": [{"name": "A", "url": "http://a", "id": "a.tv", "lang": "fr"}],
                "extra_epg": [{"url": "http://guide", "channels": [{"id": "b.tv", "name": "B"}]}]
            }"#,
        )
        .unwrap();
        assert_eq!(config.channels[0].id.as_deref(), Some("a.tv"));
        assert_eq!(config.channels[0].lang, "fr");
        assert_eq!(config.extra_epg.len(), 1);
        assert_eq!(config.extra_epg[0].channels[0].name, "B");
        assert_eq!(config.extra_epg[0].lang, "en");
        assert_eq!(config.source_count(), 2);
    }

    #[test]
    fn test_channels_key_without_extra() {
        let config = MergeConfig::from_json(r#"{"channels": []}"#).unwrap();
        assert_eq!(config, MergeConfig::default());
    }

    #[test]
    fn test_missing_name_rejected() {
        assert!(MergeConfig::from_json(r#"[{"url": "http://x"}]"#).is_err());
    }

    #[test]
    fn test_load_errors() {
        let missing = MergeConfig::load(Path::new("/nonexistent/channels.json")).unwrap_err();
        assert!(matches!(missing, EpgError::ConfigRead { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{not json").unwrap();
        let invalid = MergeConfig::load(file.path()).unwrap_err();
        assert!(matches!(invalid, EpgError::ConfigFormat { .. }));
        assert_eq!(invalid.exit_code(), 2);
    }
}
