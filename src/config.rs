use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use geist_blocks::BlockRegistry;
use geist_history::HistoryConfig;
use geist_pattern::{GradientConfig, GradientRegistry};

/// Contents of `wedit.toml`.
#[derive(Clone, Debug, Deserialize)]
pub struct WeditConfig {
    /// Block palette, relative to the config file.
    #[serde(default = "default_blocks")]
    pub blocks: PathBuf,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub gradients: HashMap<String, GradientConfig>,
}

fn default_blocks() -> PathBuf {
    PathBuf::from("blocks.toml")
}

impl Default for WeditConfig {
    fn default() -> Self {
        Self {
            blocks: default_blocks(),
            history: HistoryConfig::default(),
            gradients: HashMap::new(),
        }
    }
}

impl WeditConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, Box<dyn Error>> {
        Ok(toml::from_str(s)?)
    }

    /// Load from `path`, resolving the palette path next to it.
    pub fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let s = fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
        let mut cfg = Self::from_toml_str(&s)?;
        if cfg.blocks.is_relative() {
            if let Some(dir) = path.parent() {
                cfg.blocks = dir.join(&cfg.blocks);
            }
        }
        Ok(cfg)
    }

    pub fn registry(&self) -> Result<BlockRegistry, Box<dyn Error>> {
        BlockRegistry::load_from_path(&self.blocks).map_err(|e| format!("{}: {e}", self.blocks.display()).into())
    }

    pub fn gradients(&self, registry: &BlockRegistry) -> Result<GradientRegistry, Box<dyn Error>> {
        Ok(GradientRegistry::from_configs(&self.gradients, registry)?)
    }
}
