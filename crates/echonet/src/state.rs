//! Decoded property values handed to listeners.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Physical unit attached to a [`State::Quantity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Celsius,
    Percent,
    Watt,
    KilowattHour,
    Hour,
}

impl Unit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Celsius => "°C",
            Unit::Percent => "%",
            Unit::Watt => "W",
            Unit::KilowattHour => "kWh",
            Unit::Hour => "h",
        }
    }
}

/// A domain value for one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum State {
    OnOff(bool),
    /// One of a fixed set of named options.
    Option(String),
    Number(i64),
    Quantity { value: f64, unit: Unit },
    Text(String),
    /// The device reported a sentinel meaning "no reading available".
    Undefined,
}

impl State {
    pub fn on() -> Self {
        State::OnOff(true)
    }

    pub fn off() -> Self {
        State::OnOff(false)
    }

    pub fn option(name: impl Into<String>) -> Self {
        State::Option(name.into())
    }

    pub fn quantity(value: f64, unit: Unit) -> Self {
        State::Quantity { value, unit }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::OnOff(true) => write!(f, "ON"),
            State::OnOff(false) => write!(f, "OFF"),
            State::Option(name) => write!(f, "{}", name),
            State::Number(n) => write!(f, "{}", n),
            State::Quantity { value, unit } => write!(f, "{} {}", value, unit.symbol()),
            State::Text(s) => write!(f, "{}", s),
            State::Undefined => write!(f, "UNDEF"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_tagged() {
        let json = serde_json::to_string(&State::quantity(21.5, Unit::Celsius)).unwrap();
        assert!(json.contains("\"type\":\"quantity\""));
        assert!(json.contains("\"unit\":\"celsius\""));
    }

    #[test]
    fn test_display() {
        assert_eq!(State::on().to_string(), "ON");
        assert_eq!(State::quantity(24.0, Unit::Celsius).to_string(), "24 °C");
        assert_eq!(State::Undefined.to_string(), "UNDEF");
    }
}
