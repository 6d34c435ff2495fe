use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::{ChargeMode, PileType};
use crate::scheduler::{MAX_BATCH_SIZE, Strategy};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub station: StationConfig,
    pub tariff: TariffConfig,
    pub daemon: DaemonConfig,
    pub storage: StorageConfig,
}

/// Station policy: queue sizes, batch thresholds, strategy and pile power
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Vehicles a pile queue holds, including the one charging
    pub pile_queue_length: usize,
    /// Requests the holding area admits before rejecting submissions
    pub waiting_area_capacity: usize,
    pub fast_batch_threshold: usize,
    pub slow_batch_threshold: usize,
    pub schedule_strategy: Strategy,
    /// kW for newly added fast piles
    pub fast_power: f64,
    /// kW for newly added slow piles
    pub slow_power: f64,
    /// Undelivered energy below this is not worth re-queuing after a failure
    pub min_salvage_energy: f64,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            pile_queue_length: 2,
            waiting_area_capacity: 6,
            fast_batch_threshold: 2,
            slow_batch_threshold: 3,
            schedule_strategy: Strategy::Greedy,
            fast_power: 30.0,
            slow_power: 7.0,
            min_salvage_energy: 0.5,
        }
    }
}

impl StationConfig {
    /// Look up a setting by its key
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "pile_queue_length" => self.pile_queue_length.to_string(),
            "waiting_area_capacity" => self.waiting_area_capacity.to_string(),
            "fast_batch_threshold" => self.fast_batch_threshold.to_string(),
            "slow_batch_threshold" => self.slow_batch_threshold.to_string(),
            "schedule_strategy" => self.schedule_strategy.as_str().to_string(),
            "fast_power" => self.fast_power.to_string(),
            "slow_power" => self.slow_power.to_string(),
            "min_salvage_energy" => self.min_salvage_energy.to_string(),
            _ => return None,
        };
        Some(value)
    }

    /// Every key `get` understands
    pub fn keys() -> &'static [&'static str] {
        &[
            "pile_queue_length",
            "waiting_area_capacity",
            "fast_batch_threshold",
            "slow_batch_threshold",
            "schedule_strategy",
            "fast_power",
            "slow_power",
            "min_salvage_energy",
        ]
    }

    /// Batch size for single-batch scheduling of `mode`, clamped to what the
    /// optimizer can solve
    pub fn batch_threshold(&self, mode: ChargeMode) -> usize {
        let configured = match mode {
            ChargeMode::Fast => self.fast_batch_threshold,
            ChargeMode::Slow => self.slow_batch_threshold,
        };
        configured.clamp(1, MAX_BATCH_SIZE)
    }

    pub fn power_for(&self, pile_type: PileType) -> f64 {
        match pile_type {
            PileType::Fast => self.fast_power,
            PileType::Slow => self.slow_power,
        }
    }

    /// Describe settings that will be adjusted or make the station unusable
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.pile_queue_length == 0 {
            warnings.push("pile_queue_length is 0; no request can ever be assigned".to_string());
        }
        for (key, value) in [
            ("fast_batch_threshold", self.fast_batch_threshold),
            ("slow_batch_threshold", self.slow_batch_threshold),
        ] {
            if value > MAX_BATCH_SIZE {
                warnings.push(format!("{} = {} exceeds {}; clamped", key, value, MAX_BATCH_SIZE));
            }
            if value == 0 {
                warnings.push(format!("{} = 0; treated as 1", key));
            }
        }
        if self.fast_power <= 0.0 || self.slow_power <= 0.0 {
            warnings.push("pile power must be positive".to_string());
        }
        warnings
    }
}

/// Time-of-use tariff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TariffConfig {
    /// Price per kWh at 10-15h and 18-21h
    pub peak_price: f64,
    /// Price per kWh at 7-10h, 15-18h and 21-23h
    pub normal_price: f64,
    /// Price per kWh at 23-7h
    pub valley_price: f64,
    /// Service fee per kWh
    pub service_fee_rate: f64,
}

impl Default for TariffConfig {
    fn default() -> Self {
        Self {
            peak_price: 1.0,
            normal_price: 0.7,
            valley_price: 0.4,
            service_fee_rate: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub scheduler_interval_secs: u64,
    pub monitor_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            scheduler_interval_secs: 10,
            monitor_interval_secs: 5,
        }
    }
}

impl DaemonConfig {
    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_secs.max(1))
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub store_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("chargeq"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            station: StationConfig::default(),
            tariff: TariffConfig::default(),
            daemon: DaemonConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        for warning in config.station.warnings() {
            log::warn!("{}: {}", path.as_ref().display(), warning);
        }

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.station.pile_queue_length, 2);
        assert_eq!(config.station.fast_batch_threshold, 2);
        assert_eq!(config.station.slow_batch_threshold, 3);
        assert_eq!(config.station.schedule_strategy, Strategy::Greedy);
        assert_eq!(config.daemon.scheduler_interval(), Duration::from_secs(10));
        assert_eq!(config.daemon.monitor_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_partial_yaml_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("chargeq.yml");
        fs::write(
            &path,
            "station:\n  pile_queue_length: 3\n  schedule_strategy: SINGLE_BATCH_OPTIMAL\ntariff:\n  peak_price: 1.2\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.station.pile_queue_length, 3);
        assert_eq!(config.station.schedule_strategy, Strategy::SingleBatchOptimal);
        assert_eq!(config.station.waiting_area_capacity, 6);
        assert_eq!(config.tariff.peak_price, 1.2);
        assert_eq!(config.tariff.valley_price, 0.4);
    }

    #[test]
    fn test_legacy_strategy_name() {
        let station: StationConfig = serde_yaml::from_str("schedule_strategy: ORIGINAL\n").unwrap();
        assert_eq!(station.schedule_strategy, Strategy::Greedy);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nope.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_get_by_key() {
        let station = StationConfig::default();
        assert_eq!(station.get("pile_queue_length").as_deref(), Some("2"));
        assert_eq!(station.get("schedule_strategy").as_deref(), Some("GREEDY"));
        assert_eq!(station.get("unknown"), None);
        for key in StationConfig::keys() {
            assert!(station.get(key).is_some(), "missing key {}", key);
        }
    }

    #[test]
    fn test_batch_threshold_clamped() {
        let station = StationConfig {
            fast_batch_threshold: 100,
            slow_batch_threshold: 0,
            ..StationConfig::default()
        };
        assert_eq!(station.batch_threshold(ChargeMode::Fast), MAX_BATCH_SIZE);
        assert_eq!(station.batch_threshold(ChargeMode::Slow), 1);
        assert_eq!(station.warnings().len(), 2);
    }

    #[test]
    fn test_power_for() {
        let station = StationConfig::default();
        assert_eq!(station.power_for(PileType::Fast), 30.0);
        assert_eq!(station.power_for(PileType::Slow), 7.0);
    }
}
