// ABOUTME: Traffic split between the two fleets and the resolver that validates it.
// ABOUTME: An empty split means 100% to the active color; explicit splits must sum to exactly 100.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::types::Color;

/// Weights are percentages.
pub const TOTAL_WEIGHT: u32 = 100;

/// Why a split was refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidSplitError {
    #[error("weights must sum to exactly {TOTAL_WEIGHT}, got {sum}")]
    WeightSum { sum: u64 },

    #[error("color {0} appears more than once in the split")]
    DuplicateColor(Color),

    #[error("unknown color reference in split: '{0}'")]
    InvalidColorReference(String),

    #[error("malformed split entry '{0}' (expected color=weight)")]
    Malformed(String),
}

/// One color's share of default traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedColor {
    pub color: Color,
    pub weight: u32,
}

impl WeightedColor {
    pub fn new(color: Color, weight: u32) -> Self {
        Self { color, weight }
    }
}

/// Ordered color/weight pairs. Empty means "everything to the active color".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrafficSplit(Vec<WeightedColor>);

impl TrafficSplit {
    /// The "all traffic to the active color" split.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// An unvalidated split; pass it through [`resolve`] before use.
    pub fn new(entries: Vec<WeightedColor>) -> Self {
        Self(entries)
    }

    /// A two-color canary pairing.
    pub fn canary(active: Color, active_weight: u32, standby_weight: u32) -> Self {
        Self(vec![
            WeightedColor::new(active, active_weight),
            WeightedColor::new(active.other(), standby_weight),
        ])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> &[WeightedColor] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Sum of all weights, widened so oversized inputs cannot overflow.
    pub fn total(&self) -> u64 {
        self.0.iter().map(|e| u64::from(e.weight)).sum()
    }

    /// Effective share of `color`, treating the empty split as 100% active.
    pub fn weight_of(&self, color: Color, active: Color) -> u32 {
        if self.0.is_empty() {
            return if color == active { TOTAL_WEIGHT } else { 0 };
        }
        self.0
            .iter()
            .filter(|e| e.color == color)
            .map(|e| e.weight)
            .sum()
    }

    pub fn references(&self, color: Color) -> bool {
        self.0.iter().any(|e| e.color == color)
    }
}

impl fmt::Display for TrafficSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("(all to active)");
        }
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}={}", e.color, e.weight))
            .collect();
        f.write_str(&parts.join(","))
    }
}

/// Parses `blue=90,green=10`. Only syntax is checked here.
impl FromStr for TrafficSplit {
    type Err = InvalidSplitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entries = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (color, weight) = part
                .split_once('=')
                .ok_or_else(|| InvalidSplitError::Malformed(part.to_string()))?;
            let color = color
                .parse::<Color>()
                .map_err(|_| InvalidSplitError::InvalidColorReference(color.trim().to_string()))?;
            let weight = weight
                .trim()
                .parse::<u32>()
                .map_err(|_| InvalidSplitError::Malformed(part.to_string()))?;
            entries.push(WeightedColor::new(color, weight));
        }
        Ok(Self(entries))
    }
}

/// Compute the effective split for default (catch-all) traffic.
///
/// Empty input resolves to `[{active, 100}]`. Non-empty input is returned
/// unchanged if every color appears once and the weights sum to exactly 100;
/// nothing is rounded or normalized. Scoped target groups do not take part:
/// they always forward to the active color.
pub fn resolve(active: Color, explicit: &TrafficSplit) -> Result<TrafficSplit, InvalidSplitError> {
    if explicit.is_empty() {
        return Ok(TrafficSplit(vec![WeightedColor::new(active, TOTAL_WEIGHT)]));
    }

    let mut seen = Vec::with_capacity(2);
    for entry in explicit.entries() {
        if seen.contains(&entry.color) {
            return Err(InvalidSplitError::DuplicateColor(entry.color));
        }
        seen.push(entry.color);
    }

    let sum = explicit.total();
    if sum != u64::from(TOTAL_WEIGHT) {
        return Err(InvalidSplitError::WeightSum { sum });
    }

    Ok(explicit.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_split_resolves_to_active() {
        let resolved = resolve(Color::Green, &TrafficSplit::empty()).unwrap();
        assert_eq!(
            resolved.entries(),
            &[WeightedColor::new(Color::Green, 100)]
        );
    }

    #[test]
    fn near_miss_is_not_rounded() {
        let split = TrafficSplit::canary(Color::Blue, 90, 9);
        assert_eq!(
            resolve(Color::Blue, &split),
            Err(InvalidSplitError::WeightSum { sum: 99 })
        );
    }

    #[test]
    fn duplicate_colors_are_rejected() {
        let split = TrafficSplit::new(vec![
            WeightedColor::new(Color::Blue, 50),
            WeightedColor::new(Color::Blue, 50),
        ]);
        assert_eq!(
            resolve(Color::Blue, &split),
            Err(InvalidSplitError::DuplicateColor(Color::Blue))
        );
    }

    #[test]
    fn parses_operator_syntax() {
        let split: TrafficSplit = "blue=90, green=10".parse().unwrap();
        assert_eq!(split, TrafficSplit::canary(Color::Blue, 90, 10));
    }

    #[test]
    fn parse_reports_unknown_colors() {
        assert_eq!(
            "blue=50,red=50".parse::<TrafficSplit>(),
            Err(InvalidSplitError::InvalidColorReference("red".to_string()))
        );
    }

    #[test]
    fn weight_of_empty_split_favors_active() {
        let split = TrafficSplit::empty();
        assert_eq!(split.weight_of(Color::Blue, Color::Blue), 100);
        assert_eq!(split.weight_of(Color::Green, Color::Blue), 0);
    }
}
