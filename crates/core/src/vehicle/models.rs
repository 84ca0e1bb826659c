//! Vehicle definitions loaded from the per-kind files.

use serde::{Deserialize, Serialize};

/// Common surface over the vehicle kinds held by a
/// [`VehicleRegistry`](crate::vehicle::VehicleRegistry).
pub trait Vehicle: Clone {
    /// Singular noun used in log lines and error messages.
    const KIND: &'static str;

    /// Unique user-facing identifier within this kind's registry.
    fn user_id(&self) -> &str;
}

/// A ship definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ship {
    /// Unique identifier.
    pub user_id: String,
    /// Display name shown in the GUI.
    #[serde(default)]
    pub name: Option<String>,
    /// Cruising speed in knots.
    pub max_speed: f64,
    /// Container capacity in TEU.
    pub container_capacity: i64,
    /// Fuel the ship burns, keyed into the fuel configuration sections.
    pub fuel_type: String,
    /// Fuel consumption per kilometre.
    #[serde(default)]
    pub fuel_consumption: f64,
}

impl Vehicle for Ship {
    const KIND: &'static str = "ship";

    fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// A train definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Train {
    /// Unique identifier.
    pub user_id: String,
    /// Display name shown in the GUI.
    #[serde(default)]
    pub name: Option<String>,
    /// Maximum speed in km/h.
    pub max_speed: f64,
    /// Number of locomotives.
    #[serde(default)]
    pub locomotive_count: i64,
    /// Number of cars.
    pub car_count: i64,
    /// Containers carried per car.
    #[serde(default)]
    pub containers_per_car: i64,
    /// Fuel the train burns, keyed into the fuel configuration sections.
    pub fuel_type: String,
}

impl Vehicle for Train {
    const KIND: &'static str = "train";

    fn user_id(&self) -> &str {
        &self.user_id
    }
}
