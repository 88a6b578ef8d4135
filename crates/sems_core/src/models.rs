use serde::{Deserialize, Serialize};

/// Represents a charging station configuration.
///
/// Immutable after construction; shared read-only across the registry and
/// the allocator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationConfig {
    pub station_id: String,
    /// Grid import limit in kW
    pub grid_capacity: f64,
    pub chargers: Vec<ChargerConfig>,
    pub battery: Option<BatteryConfig>,
}

impl StationConfig {
    /// Look up a charger by id.
    pub fn charger(&self, charger_id: &str) -> Option<&ChargerConfig> {
        self.chargers.iter().find(|c| c.id == charger_id)
    }
}

/// Represents a charger point within the station.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargerConfig {
    pub id: String,
    /// Maximum power in kW (shared between connectors)
    pub max_power: f64,
    /// Number of connectors for this charger; connector ids are 1-based
    pub connectors: u32,
}

/// Represents the stationary battery system (BESS) of the station.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryConfig {
    /// Total energy capacity in kWh
    pub capacity: f64,
    /// Maximum charge and discharge power in kW (symmetric)
    pub power: f64,
}

/// Identifies one physical outlet on a charger.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorKey {
    pub charger_id: String,
    pub connector_id: u32,
}

impl std::fmt::Display for ConnectorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.charger_id, self.connector_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_config_serialization() {
        let config = StationConfig {
            station_id: "ELECTRA_PARIS_15".to_string(),
            grid_capacity: 400.0,
            chargers: vec![
                ChargerConfig {
                    id: "CP001".to_string(),
                    max_power: 200.0,
                    connectors: 2,
                },
                ChargerConfig {
                    id: "CP002".to_string(),
                    max_power: 200.0,
                    connectors: 2,
                },
                ChargerConfig {
                    id: "CP003".to_string(),
                    max_power: 300.0,
                    connectors: 2,
                },
            ],
            battery: Some(BatteryConfig {
                capacity: 200.0,
                power: 100.0,
            }),
        };

        let json = serde_json::to_string_pretty(&config).unwrap();
        let deserialized: StationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.station_id, deserialized.station_id);
        assert_eq!(config.grid_capacity, deserialized.grid_capacity);
        assert_eq!(config.chargers.len(), deserialized.chargers.len());
    }

    #[test]
    fn test_json_deserialization() {
        let json = r#"
        {
          "stationId": "ELECTRA_PARIS_15",
          "gridCapacity": 400,
          "chargers": [
            {"id": "CP001", "maxPower": 200, "connectors": 2},
            {"id": "CP002", "maxPower": 200, "connectors": 2},
            {"id": "CP003", "maxPower": 300, "connectors": 2}
          ],
          "battery": {
            "capacity": 200,
            "power": 100
          }
        }
        "#;

        let config: StationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.station_id, "ELECTRA_PARIS_15");
        assert_eq!(config.grid_capacity, 400.0);
        assert_eq!(config.chargers.len(), 3);
        let battery = config.battery.expect("battery should be configured");
        assert_eq!(battery.capacity, 200.0);
        assert_eq!(battery.power, 100.0);
    }

    #[test]
    fn test_battery_is_optional() {
        let json = r#"
        {
          "stationId": "NO_BATTERY",
          "gridCapacity": 400,
          "chargers": [{"id": "CP001", "maxPower": 200, "connectors": 2}]
        }
        "#;

        let config: StationConfig = serde_json::from_str(json).unwrap();
        assert!(config.battery.is_none());
        assert!(config.charger("CP001").is_some());
        assert!(config.charger("CP999").is_none());
    }
}
