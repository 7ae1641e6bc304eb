//! Behavior tuning.
//!
//! Every tunable of the NPC archetypes, the coordinator and the combat loop.
//! Configuration is plain TOML; missing keys take their defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::random::RandomSource;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    /// File is not valid TOML for [`AiConfig`]
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Closed-open range of seconds (or any scalar) sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpanRange {
    /// Lower bound (inclusive)
    pub min: f32,
    /// Upper bound (exclusive)
    pub max: f32,
}

impl SpanRange {
    /// Creates a range.
    #[must_use]
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Draws a value in `[min, max)`.
    pub fn sample(&self, rng: &mut dyn RandomSource) -> f32 {
        rng.range_f32(self.min, self.max)
    }

    /// Orders the bounds and clamps them to be non-negative.
    fn normalize(&mut self) {
        self.min = self.min.max(0.0);
        self.max = self.max.max(0.0);
        if self.max < self.min {
            std::mem::swap(&mut self.min, &mut self.max);
        }
    }
}

/// Ranged soldier archetype tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoldierTuning {
    /// Maximum sighting distance
    pub sight_distance: f32,
    /// Half-angle of the sight cone in degrees
    pub sight_half_angle: f32,
    /// Distance at which the soldier opens fire
    pub attack_distance: f32,
    /// Turn rate used when facing the player (slerp factor per second)
    pub turn_rate: f32,
    /// Patrol speed
    pub patrol_speed: f32,
    /// Wander speed
    pub wander_speed: f32,
    /// Radius around the soldier for random wander targets
    pub wander_radius: f32,
    /// Chase speed
    pub chase_speed: f32,
    /// Speed while running for cover
    pub cover_speed: f32,
    /// Extra clearance between an obstacle's edge and the hiding spot
    pub cover_offset: f32,
    /// Delay before leaving the hit reaction
    pub hit_return_delay: f32,
    /// Delay between leaving the death state and despawning
    pub corpse_delay: f32,
}

impl Default for SoldierTuning {
    fn default() -> Self {
        Self {
            sight_distance: 15.0,
            sight_half_angle: 70.0,
            attack_distance: 3.0,
            turn_rate: 1.5,
            patrol_speed: 1.5,
            wander_speed: 1.5,
            wander_radius: 7.0,
            chase_speed: 4.0,
            cover_speed: 2.5,
            cover_offset: 1.5,
            hit_return_delay: 0.0,
            corpse_delay: 5.0,
        }
    }
}

/// Melee warrior archetype tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeleeTuning {
    /// Half-angle of the sight cone in degrees
    pub sight_half_angle: f32,
    /// Turn rate used when facing the player
    pub turn_rate: f32,
    /// Time spent idling before wandering
    pub idle_time: SpanRange,
    /// Radius around the warrior for random wander targets
    pub wander_radius: f32,
    /// Distance from the player at which chasing stops
    pub chase_stop_distance: f32,
    /// Slack added to the stop distance
    pub stop_buffer: f32,
    /// Time spent circling before asking for the attack turn
    pub circling_time: SpanRange,
    /// Circling angular speed in degrees per second
    pub circling_speed: f32,
    /// Distance at which a strike is thrown
    pub attack_distance: f32,
    /// Reach added to the attack distance when checking for a strike
    pub strike_margin: f32,
    /// Normalized clip time at which a strike counts as finished
    pub strike_complete_at: f32,
    /// Pause before a scripted follow-up transition
    pub action_delay: f32,
    /// Speed while running for cover
    pub cover_speed: f32,
    /// Extra clearance between an obstacle's edge and the hiding spot
    pub cover_offset: f32,
    /// Blade damage per strike
    pub blade_damage: i32,
    /// Delay between leaving the death state and despawning
    pub corpse_delay: f32,
}

impl Default for MeleeTuning {
    fn default() -> Self {
        Self {
            sight_half_angle: 90.0,
            turn_rate: 2.0,
            idle_time: SpanRange::new(4.0, 6.0),
            wander_radius: 7.0,
            chase_stop_distance: 4.75,
            stop_buffer: 1.0,
            circling_time: SpanRange::new(5.0, 7.0),
            circling_speed: 30.0,
            attack_distance: 1.0,
            strike_margin: 0.25,
            strike_complete_at: 0.99,
            action_delay: 1.0,
            cover_speed: 2.5,
            cover_offset: 1.5,
            blade_damage: 10,
            corpse_delay: 3.0,
        }
    }
}

/// Attack-turn arbitration and alert tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorTuning {
    /// Radius of the alert broadcast
    pub alert_range: f32,
    /// Delay between attack turns
    pub attack_interval: SpanRange,
    /// Delay before the first attack turn
    pub initial_delay: f32,
}

impl Default for CoordinatorTuning {
    fn default() -> Self {
        Self {
            alert_range: 15.0,
            attack_interval: SpanRange::new(2.0, 4.0),
            initial_delay: 2.0,
        }
    }
}

/// Firearm tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponTuning {
    /// Minimum seconds between shots
    pub shot_interval: f32,
    /// Reload automatically when empty instead of dry firing
    pub auto_reload: bool,
    /// Magazine capacity
    pub magazine_capacity: u32,
    /// Seconds to refill a magazine
    pub reload_time: f32,
    /// Maximum hit distance
    pub fire_distance: f32,
    /// Damage of a head hit
    pub head_damage: i32,
    /// Damage of a body hit
    pub body_damage: i32,
    /// Height of the muzzle above the shooter's feet
    pub muzzle_height: f32,
    /// Seconds before an ejected casing returns to its pool
    pub casing_lifetime: f32,
}

impl Default for WeaponTuning {
    fn default() -> Self {
        Self {
            shot_interval: 2.0,
            auto_reload: true,
            magazine_capacity: 25,
            reload_time: 1.0,
            fire_distance: 100.0,
            head_damage: 100,
            body_damage: 20,
            muzzle_height: 1.5,
            casing_lifetime: 1.5,
        }
    }
}

/// Vitality tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthTuning {
    /// Health of a freshly spawned NPC
    pub npc_max_health: i32,
    /// Health of the player
    pub player_max_health: i32,
    /// Health fraction below which a damaged NPC runs for cover
    pub cover_threshold: f32,
}

impl Default for HealthTuning {
    fn default() -> Self {
        Self {
            npc_max_health: 100,
            player_max_health: 100,
            cover_threshold: 0.5,
        }
    }
}

/// Melee perception polling tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorTuning {
    /// Seconds between sight samples while the player is inside the trigger
    pub poll_interval: f32,
}

impl Default for DetectorTuning {
    fn default() -> Self {
        Self { poll_interval: 0.1 }
    }
}

/// Object pool tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolTuning {
    /// Objects pre-created per pool
    pub default_capacity: usize,
    /// Released objects retained per pool
    pub max_size: usize,
}

impl Default for PoolTuning {
    fn default() -> Self {
        Self {
            default_capacity: 10,
            max_size: 20,
        }
    }
}

/// Complete behavior configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Ranged soldier archetype
    pub soldier: SoldierTuning,
    /// Melee warrior archetype
    pub melee: MeleeTuning,
    /// Coordinator
    pub coordinator: CoordinatorTuning,
    /// Firearms
    pub weapon: WeaponTuning,
    /// Vitality
    pub health: HealthTuning,
    /// Melee perception polling
    pub detector: DetectorTuning,
    /// Object pools
    pub pool: PoolTuning,
}

impl AiConfig {
    /// Parses configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let mut config: Self = toml::from_str(contents)?;
        config.validate();
        Ok(config)
    }

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

        match Self::from_toml_str(&contents) {
            Ok(config) => {
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

        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        let s = &mut self.soldier;
        s.sight_distance = s.sight_distance.max(0.0);
        s.sight_half_angle = s.sight_half_angle.clamp(0.0, 180.0);
        s.attack_distance = s.attack_distance.max(0.0);
        s.turn_rate = s.turn_rate.max(0.0);
        s.patrol_speed = s.patrol_speed.max(0.0);
        s.wander_speed = s.wander_speed.max(0.0);
        s.wander_radius = s.wander_radius.max(0.0);
        s.chase_speed = s.chase_speed.max(0.0);
        s.cover_speed = s.cover_speed.max(0.0);
        s.cover_offset = s.cover_offset.max(0.0);
        s.hit_return_delay = s.hit_return_delay.max(0.0);
        s.corpse_delay = s.corpse_delay.max(0.0);

        let m = &mut self.melee;
        m.sight_half_angle = m.sight_half_angle.clamp(0.0, 180.0);
        m.turn_rate = m.turn_rate.max(0.0);
        m.idle_time.normalize();
        m.wander_radius = m.wander_radius.max(0.0);
        m.chase_stop_distance = m.chase_stop_distance.max(0.0);
        m.stop_buffer = m.stop_buffer.max(0.0);
        m.circling_time.normalize();
        m.attack_distance = m.attack_distance.max(0.0);
        m.strike_margin = m.strike_margin.max(0.0);
        m.strike_complete_at = m.strike_complete_at.clamp(0.0, 1.0);
        m.action_delay = m.action_delay.max(0.0);
        m.cover_speed = m.cover_speed.max(0.0);
        m.cover_offset = m.cover_offset.max(0.0);
        m.blade_damage = m.blade_damage.max(0);
        m.corpse_delay = m.corpse_delay.max(0.0);

        let c = &mut self.coordinator;
        c.alert_range = c.alert_range.max(0.0);
        c.attack_interval.normalize();
        c.initial_delay = c.initial_delay.max(0.0);

        let w = &mut self.weapon;
        w.shot_interval = w.shot_interval.max(0.0);
        w.magazine_capacity = w.magazine_capacity.max(1);
        w.reload_time = w.reload_time.max(0.0);
        w.fire_distance = w.fire_distance.max(0.0);
        w.head_damage = w.head_damage.max(0);
        w.body_damage = w.body_damage.max(0);
        w.casing_lifetime = w.casing_lifetime.max(0.0);

        let h = &mut self.health;
        h.npc_max_health = h.npc_max_health.max(1);
        h.player_max_health = h.player_max_health.max(1);
        h.cover_threshold = h.cover_threshold.clamp(0.0, 1.0);

        self.detector.poll_interval = self.detector.poll_interval.max(0.01);

        self.pool.max_size = self.pool.max_size.max(1);
        self.pool.default_capacity = self.pool.default_capacity.min(self.pool.max_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::ScriptedRandom;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AiConfig::default();
        assert!((config.soldier.sight_distance - 15.0).abs() < f32::EPSILON);
        assert!((config.soldier.sight_half_angle - 70.0).abs() < f32::EPSILON);
        assert!((config.melee.chase_stop_distance - 4.75).abs() < f32::EPSILON);
        assert_eq!(config.weapon.magazine_capacity, 25);
        assert_eq!(config.weapon.head_damage, 100);
        assert_eq!(config.melee.blade_damage, 10);
        assert!((config.detector.poll_interval - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_config_validation() {
        let mut config = AiConfig::default();
        config.soldier.chase_speed = -3.0;
        config.melee.circling_time = SpanRange::new(7.0, 5.0);
        config.health.cover_threshold = 1.5;
        config.weapon.magazine_capacity = 0;

        config.validate();

        assert!(config.soldier.chase_speed.abs() < f32::EPSILON);
        assert_eq!(config.melee.circling_time, SpanRange::new(5.0, 7.0));
        assert!((config.health.cover_threshold - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.weapon.magazine_capacity, 1);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AiConfig::from_toml_str(
            "[soldier]\nchase_speed = 6.0\n\n[coordinator]\nalert_range = 20.0\n",
        )
        .expect("valid toml");
        assert!((config.soldier.chase_speed - 6.0).abs() < f32::EPSILON);
        assert!((config.soldier.patrol_speed - 1.5).abs() < f32::EPSILON);
        assert!((config.coordinator.alert_range - 20.0).abs() < f32::EPSILON);
        assert_eq!(config.melee, MeleeTuning::default());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let result = AiConfig::from_toml_str("soldier = 4");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("warden.toml");

        let mut config = AiConfig::default();
        config.melee.circling_speed = 45.0;
        config.weapon.auto_reload = false;

        config.save_to(&config_path).expect("Failed to save config");

        let loaded = AiConfig::load_from(&config_path);
        assert!((loaded.melee.circling_speed - 45.0).abs() < f32::EPSILON);
        assert!(!loaded.weapon.auto_reload);
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = AiConfig::load_from("/nonexistent/path/warden.toml");
        assert_eq!(config, AiConfig::default());
    }

    #[test]
    fn test_span_sample() {
        let mut rng = ScriptedRandom::new().with_floats([0.25]);
        let span = SpanRange::new(4.0, 6.0);
        assert!((span.sample(&mut rng) - 4.5).abs() < 1e-6);
    }
}
