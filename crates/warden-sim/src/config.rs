//! Harness configuration.
//!
//! One TOML file carries the run parameters under `[sim]` and the AI tunings
//! under `[ai]`. Missing sections fall back to defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{info, warn};

use warden_ai::AiConfig;

/// Run parameters of the arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    /// Simulated seconds to run
    pub duration: f32,
    /// AI ticks per second
    pub tick_rate: u32,
    /// Synthesized frame delta fed to the accumulator
    pub frame_dt: f32,
    /// Random seed (None = random)
    pub seed: Option<u64>,
    /// Half the side of the square arena
    pub arena_half_extent: f32,
    /// Number of rifle soldiers
    pub soldiers: u32,
    /// Number of melee warriors
    pub melee: u32,
    /// Radius of the player's detection sphere
    pub detection_radius: f32,
    /// Radius of the loop the player walks
    pub player_orbit_radius: f32,
    /// Player walking speed
    pub player_speed: f32,
    /// Seconds between the player's return shots (0 = never)
    pub return_fire_interval: f32,
    /// Damage of one return shot
    pub return_fire_damage: i32,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            duration: 30.0,
            tick_rate: 60,
            frame_dt: 1.0 / 30.0,
            seed: None,
            arena_half_extent: 25.0,
            soldiers: 3,
            melee: 2,
            detection_radius: 12.0,
            player_orbit_radius: 8.0,
            player_speed: 2.0,
            return_fire_interval: 1.5,
            return_fire_damage: 30,
        }
    }
}

impl SimSettings {
    /// Clamp values to sane ranges.
    pub fn validate(&mut self) {
        self.duration = self.duration.max(0.0);
        self.tick_rate = self.tick_rate.clamp(10, 240);
        self.frame_dt = self.frame_dt.clamp(0.001, 0.25);
        self.arena_half_extent = self.arena_half_extent.max(5.0);
        self.detection_radius = self.detection_radius.max(0.0);
        self.player_orbit_radius = self.player_orbit_radius.clamp(0.0, self.arena_half_extent);
        self.player_speed = self.player_speed.max(0.0);
        self.return_fire_interval = self.return_fire_interval.max(0.0);
        self.return_fire_damage = self.return_fire_damage.max(0);
    }
}

/// Full harness configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Run parameters
    pub sim: SimSettings,
    /// AI tunings
    pub ai: AiConfig,
}

impl SimConfig {
    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to read config file: {e}");
                return Self::default();
            },
        };

        match toml::from_str::<Self>(&contents) {
            Ok(mut config) => {
                config.validate();
                info!("Loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Failed to parse config file: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, contents)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Clamp every section to sane ranges.
    pub fn validate(&mut self) {
        self.sim.validate();
        self.ai.validate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();
        assert_eq!(config.sim.tick_rate, 60);
        assert_eq!(config.ai, AiConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: SimConfig = toml::from_str("[sim]\nsoldiers = 5\n").expect("parse");
        assert_eq!(config.sim.soldiers, 5);
        assert_eq!(config.sim.melee, SimSettings::default().melee);
        assert_eq!(config.ai, AiConfig::default());
    }

    #[test]
    fn test_validate_clamps() {
        let mut config = SimConfig::default();
        config.sim.tick_rate = 1;
        config.sim.player_orbit_radius = 500.0;
        config.validate();
        assert_eq!(config.sim.tick_rate, 10);
        assert_eq!(config.sim.player_orbit_radius, config.sim.arena_half_extent);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("warden.toml");

        let mut config = SimConfig::default();
        config.sim.seed = Some(42);
        config.sim.melee = 4;
        config.save_to(&path).expect("save");

        let loaded = SimConfig::load_from(&path);
        assert_eq!(loaded.sim.seed, Some(42));
        assert_eq!(loaded.sim.melee, 4);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let loaded = SimConfig::load_from("/nonexistent/warden.toml");
        assert_eq!(loaded, SimConfig::default());
    }
}
