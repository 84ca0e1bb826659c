//! Scalar configuration values and the document they form.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

/// One typed configuration leaf.
///
/// The serialized form preserves the type: booleans as `true`/`false`,
/// integers in base 10, reals with fixed-point 6 decimals, strings verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// Boolean flag.
    Bool(bool),
    /// Whole number.
    Int(i64),
    /// Floating-point number, rendered with 6 decimals.
    Real(f64),
    /// Free-form text.
    Str(String),
}

impl ConfigValue {
    /// Infer a value from serialized text.
    ///
    /// `true`/`false` parse as booleans; digit-only text as integers; text
    /// parseable as a floating-point number as reals; everything else stays
    /// a string. The integer step keeps `load(save(doc)) == doc` for
    /// integer-typed leaves.
    pub fn infer(text: &str) -> ConfigValue {
        match text {
            "true" => return ConfigValue::Bool(true),
            "false" => return ConfigValue::Bool(false),
            _ => {}
        }
        let looks_integral = !text.contains(['.', 'e', 'E']);
        if looks_integral {
            if let Ok(int) = text.parse::<i64>() {
                return ConfigValue::Int(int);
            }
        }
        if let Ok(real) = text.parse::<f64>() {
            return ConfigValue::Real(real);
        }
        ConfigValue::Str(text.to_string())
    }

    /// The boolean payload, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// The integer payload, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric payload as `f64`; integers widen.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            ConfigValue::Real(value) => Some(*value),
            ConfigValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// The string payload, if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Convert into a JSON value, preserving the scalar type.
    pub fn to_json(&self) -> Value {
        match self {
            ConfigValue::Bool(value) => Value::Bool(*value),
            ConfigValue::Int(value) => Value::from(*value),
            ConfigValue::Real(value) => Value::from(*value),
            ConfigValue::Str(value) => Value::String(value.clone()),
        }
    }

    /// Reconstruct from a JSON value produced by [`ConfigValue::to_json`].
    pub fn from_json(value: &Value) -> Option<ConfigValue> {
        match value {
            Value::Bool(flag) => Some(ConfigValue::Bool(*flag)),
            Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Some(ConfigValue::Int(int))
                } else {
                    number.as_f64().map(ConfigValue::Real)
                }
            }
            Value::String(text) => Some(ConfigValue::Str(text.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(value) => write!(f, "{value}"),
            ConfigValue::Int(value) => write!(f, "{value}"),
            ConfigValue::Real(value) => write!(f, "{value:.6}"),
            ConfigValue::Str(value) => write!(f, "{value}"),
        }
    }
}

/// One flat section of the document.
pub type ConfigSection = BTreeMap<String, ConfigValue>;

/// The full configuration document with its fixed top-level sections.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    /// Global simulation parameters.
    pub simulation: ConfigSection,
    /// Fuel name → kWh per unit.
    pub fuel_energy: ConfigSection,
    /// Fuel name → kg CO₂ per unit.
    pub fuel_carbon_content: ConfigSection,
    /// Fuel name → price per unit.
    pub fuel_prices: ConfigSection,
    /// Carbon tax rate and per-mode multipliers.
    pub carbon_taxes: ConfigSection,
    /// Per-mode parameter submaps, keyed `ship` / `train` / `truck`.
    pub transport_modes: BTreeMap<String, ConfigSection>,
}

fn section(entries: &[(&str, ConfigValue)]) -> ConfigSection {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

impl Default for ConfigDocument {
    fn default() -> Self {
        use ConfigValue::{Bool, Int, Real, Str};

        let mut transport_modes = BTreeMap::new();
        transport_modes.insert(
            "ship".to_string(),
            section(&[
                ("average_speed", Real(20.0)),
                ("average_fuel_consumption", Real(0.2)),
                ("average_container_number", Int(5000)),
                ("risk_factor", Real(0.0015)),
                ("fuel_type", Str("HFO".to_string())),
            ]),
        );
        transport_modes.insert(
            "train".to_string(),
            section(&[
                ("average_speed", Real(60.0)),
                ("average_fuel_consumption", Real(0.05)),
                ("average_container_number", Int(200)),
                ("risk_factor", Real(0.002)),
                ("fuel_type", Str("diesel_1".to_string())),
                ("use_network", Bool(true)),
            ]),
        );
        transport_modes.insert(
            "truck".to_string(),
            section(&[
                ("average_speed", Real(80.0)),
                ("average_fuel_consumption", Real(0.3)),
                ("average_container_number", Int(1)),
                ("risk_factor", Real(0.0075)),
                ("fuel_type", Str("diesel_2".to_string())),
                ("use_network", Bool(true)),
            ]),
        );

        Self {
            simulation: section(&[
                ("time_step", Int(15)),
                ("time_value_of_money", Real(45.0)),
                ("shortest_paths", Int(3)),
            ]),
            fuel_energy: section(&[
                ("HFO", Real(11.1)),
                ("diesel_1", Real(10.7)),
                ("diesel_2", Real(10.0)),
            ]),
            fuel_carbon_content: section(&[
                ("HFO", Real(3.15)),
                ("diesel_1", Real(2.68)),
                ("diesel_2", Real(2.68)),
            ]),
            fuel_prices: section(&[
                ("HFO", Real(580.0)),
                ("diesel_1", Real(1.35)),
                ("diesel_2", Real(1.35)),
            ]),
            carbon_taxes: section(&[
                ("rate", Real(65.0)),
                ("ship_multiplier", Real(1.2)),
                ("truck_multiplier", Real(1.1)),
                ("train_multiplier", Real(1.1)),
            ]),
            transport_modes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_covers_all_scalar_kinds() {
        assert_eq!(ConfigValue::infer("true"), ConfigValue::Bool(true));
        assert_eq!(ConfigValue::infer("false"), ConfigValue::Bool(false));
        assert_eq!(ConfigValue::infer("15"), ConfigValue::Int(15));
        assert_eq!(ConfigValue::infer("-3"), ConfigValue::Int(-3));
        assert_eq!(ConfigValue::infer("45.000000"), ConfigValue::Real(45.0));
        assert_eq!(
            ConfigValue::infer("HFO"),
            ConfigValue::Str("HFO".to_string())
        );
    }

    #[test]
    fn display_preserves_declared_type() {
        assert_eq!(ConfigValue::Bool(true).to_string(), "true");
        assert_eq!(ConfigValue::Int(15).to_string(), "15");
        assert_eq!(ConfigValue::Real(11.1).to_string(), "11.100000");
        assert_eq!(ConfigValue::Str("verbatim".into()).to_string(), "verbatim");
    }

    #[test]
    fn display_then_infer_round_trips() {
        for value in [
            ConfigValue::Bool(false),
            ConfigValue::Int(42),
            ConfigValue::Real(1.35),
            ConfigValue::Str("diesel_1".into()),
        ] {
            assert_eq!(ConfigValue::infer(&value.to_string()), value);
        }
    }

    #[test]
    fn json_round_trip_preserves_types() {
        for value in [
            ConfigValue::Bool(true),
            ConfigValue::Int(-7),
            ConfigValue::Real(0.0015),
            ConfigValue::Str("x".into()),
        ] {
            assert_eq!(ConfigValue::from_json(&value.to_json()), Some(value));
        }
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let doc = ConfigDocument::default();
        assert_eq!(doc.simulation["time_step"], ConfigValue::Int(15));
        assert_eq!(
            doc.simulation["time_value_of_money"],
            ConfigValue::Real(45.0)
        );
        assert_eq!(doc.simulation["shortest_paths"], ConfigValue::Int(3));
        assert_eq!(doc.fuel_prices["HFO"], ConfigValue::Real(580.0));
        assert_eq!(doc.fuel_energy["diesel_2"], ConfigValue::Real(10.0));
        assert_eq!(doc.carbon_taxes["ship_multiplier"], ConfigValue::Real(1.2));
        assert_eq!(
            doc.transport_modes["truck"]["fuel_type"],
            ConfigValue::Str("diesel_2".into())
        );
        assert_eq!(
            doc.transport_modes["train"]["use_network"],
            ConfigValue::Bool(true)
        );
    }
}
