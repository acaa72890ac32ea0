use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RestyleError, Result};
use crate::prompt::ChatTemplate;
use crate::style::StyleOrder;

pub const DEFAULT_MODEL: &str = "qwen2.5:0.5b-instruct";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub model_name: String,
    pub ollama_url: String,
    pub chat_template: ChatTemplate,
    pub style_order: StyleOrder,
    /// Replaces the built-in system message of the preamble.
    pub system_prompt: Option<String>,
    /// Mirror the generated stylesheet to this file.
    pub style_export_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL.to_string(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            chat_template: ChatTemplate::default(),
            style_order: StyleOrder::default(),
            system_prompt: None,
            style_export_path: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| RestyleError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Load the config, writing the defaults out on first run so there is a
    /// file to edit.
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_at(&Self::get_config_path()?)
    }

    pub fn load_or_create_at(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load_from(path);
        }

        let config = Self::default();
        config.save_to(path)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RestyleError::Config("Could not determine config directory".to_string()))?;

        Ok(config_dir.join("restyle").join("config.json"))
    }
}
