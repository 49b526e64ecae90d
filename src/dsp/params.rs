//! Parameter schemas
//!
//! Every effect kind declares a fixed table of `ParamSpec`s. All reads and
//! writes of unit parameters go through that table, so an unknown name or an
//! out-of-range value is rejected before anything changes.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{PedalboardError, Result};

/// Declared name, range and default of one effect parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamSpec {
    /// Parameter name as used by `set_parameter`
    pub name: &'static str,
    /// Inclusive lower bound
    pub min: f32,
    /// Inclusive upper bound
    pub max: f32,
    /// Value used when the parameter is not overridden
    pub default: f32,
    /// Display unit ("dB", "Hz", "ms", ...), empty for plain ratios
    pub unit: &'static str,
    /// Only whole numbers are accepted
    pub integral: bool,
}

impl ParamSpec {
    pub const fn new(
        name: &'static str,
        min: f32,
        max: f32,
        default: f32,
        unit: &'static str,
    ) -> Self {
        Self {
            name,
            min,
            max,
            default,
            unit,
            integral: false,
        }
    }

    /// Mark the parameter as accepting whole numbers only
    pub const fn integral(mut self) -> Self {
        self.integral = true;
        self
    }

    /// Human-readable description of the accepted range
    pub fn range_description(&self) -> String {
        let unit = if self.unit.is_empty() {
            String::new()
        } else {
            format!(" {}", self.unit)
        };
        let whole = if self.integral { " (whole numbers)" } else { "" };
        format!("{} to {}{}{}", self.min, self.max, unit, whole)
    }

    /// Check a candidate value against the declared range
    pub fn validate(&self, effect: &str, value: f32) -> Result<()> {
        let in_range = value.is_finite() && value >= self.min && value <= self.max;
        let whole = !self.integral || value.fract() == 0.0;
        if in_range && whole {
            Ok(())
        } else {
            Err(PedalboardError::invalid_parameter(
                effect,
                self.name,
                value,
                self.range_description(),
            ))
        }
    }
}

/// Current parameter values of one effect unit, in schema order
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    schema: &'static [ParamSpec],
    values: Vec<f32>,
}

impl Parameters {
    /// All parameters at their declared defaults
    pub fn defaults(schema: &'static [ParamSpec]) -> Self {
        Self {
            schema,
            values: schema.iter().map(|spec| spec.default).collect(),
        }
    }

    /// The schema these values follow
    pub fn schema(&self) -> &'static [ParamSpec] {
        self.schema
    }

    /// Look up a parameter value by name
    pub fn get(&self, name: &str) -> Option<f32> {
        self.position(name).map(|i| self.values[i])
    }

    /// Read a parameter the caller knows is in the schema
    ///
    /// Falls back to 0.0 for unknown names; effect implementations only ask
    /// for names from their own schema.
    pub(crate) fn value(&self, name: &str) -> f32 {
        self.get(name).unwrap_or(0.0)
    }

    /// Validate and store a value
    ///
    /// Leaves every value unchanged on error.
    pub fn set(&mut self, effect: &str, name: &str, value: f32) -> Result<()> {
        let index = self.position(name).ok_or_else(|| {
            PedalboardError::invalid_parameter(effect, name, value, self.known_names())
        })?;
        self.schema[index].validate(effect, value)?;
        self.values[index] = value;
        Ok(())
    }

    /// Iterate `(name, value)` pairs in schema order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f32)> + '_ {
        self.schema
            .iter()
            .zip(self.values.iter())
            .map(|(spec, &value)| (spec.name, value))
    }

    /// Copy the values into an owned map
    pub fn to_map(&self) -> BTreeMap<String, f32> {
        self.iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.schema.iter().position(|spec| spec.name == name)
    }

    fn known_names(&self) -> String {
        let names: Vec<&str> = self.schema.iter().map(|spec| spec.name).collect();
        format!("one of [{}]", names.join(", "))
    }
}
