use serde::{Deserialize, Serialize};

/// `[history]` table of `wedit.toml`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Committed points kept before the oldest is dropped.
    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,
    /// Most blocks a single point may track.
    #[serde(default = "default_change_limit")]
    pub change_limit: u64,
    /// Block operations a scheduler tick may spend on history work.
    #[serde(default = "default_blocks_per_tick")]
    pub blocks_per_tick: usize,
}

fn default_max_history_size() -> usize {
    25
}
fn default_change_limit() -> u64 {
    1_000_000
}
fn default_blocks_per_tick() -> usize {
    4096
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history_size: default_max_history_size(),
            change_limit: default_change_limit(),
            blocks_per_tick: default_blocks_per_tick(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: HistoryConfig = toml::from_str("change_limit = 500").unwrap();
        assert_eq!(cfg.change_limit, 500);
        assert_eq!(cfg.max_history_size, 25);
        assert_eq!(cfg.blocks_per_tick, 4096);
        let empty: HistoryConfig = toml::from_str("").unwrap();
        assert_eq!(empty, HistoryConfig::default());
    }
}
