use rand::Rng;
use serde::{Deserialize, Serialize};

/// Body published on `{namespace}/bins/{id}/telemetry`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_level: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<i32>,
}

/// One simulated bin
#[derive(Debug, Clone)]
pub struct SimulatedBin {
    pub id: String,
    fill: f64,
    battery: f64,
}

impl SimulatedBin {
    pub fn new(id: String, rng: &mut impl Rng) -> Self {
        Self {
            id,
            fill: rng.gen_range(0.0..60.0),
            battery: rng.gen_range(15.0..100.0),
        }
    }

    pub fn fill_level(&self) -> i32 {
        self.fill.round() as i32
    }

    pub fn battery_level(&self) -> i32 {
        self.battery.round() as i32
    }

    /// Advance one reading: fill creeps up, battery drains, and a full bin
    /// gets emptied.
    pub fn step(&mut self, rng: &mut impl Rng) {
        if self.fill >= 100.0 {
            self.fill = rng.gen_range(0.0..10.0);
        } else {
            self.fill = (self.fill + rng.gen_range(0.0..3.0)).min(100.0);
        }

        self.battery = (self.battery - rng.gen_range(0.0..0.2)).max(0.0);
        if self.battery <= 0.0 {
            // battery swap
            self.battery = 100.0;
        }
    }

    /// Current reading; 10% of readings carry a single field
    pub fn reading(&self, rng: &mut impl Rng) -> Telemetry {
        let fill_level = Some(self.fill_level());
        let battery_level = Some(self.battery_level());

        if rng.gen_bool(0.1) {
            if rng.gen_bool(0.5) {
                Telemetry {
                    fill_level,
                    battery_level: None,
                }
            } else {
                Telemetry {
                    fill_level: None,
                    battery_level,
                }
            }
        } else {
            Telemetry {
                fill_level,
                battery_level,
            }
        }
    }
}

pub fn telemetry_topic(namespace: &str, device_id: &str) -> String {
    format!("{}/bins/{}/telemetry", namespace, device_id)
}
