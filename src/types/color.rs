// ABOUTME: Fleet color identity and a two-slot container keyed by color.
// ABOUTME: All cross-color logic (active/standby derivation) lives here as pure functions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown fleet color: '{0}' (expected 'blue' or 'green')")]
pub struct ParseColorError(pub String);

/// One of the two parallel fleets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Blue,
    Green,
}

impl Color {
    /// Both colors, in a fixed order.
    pub const ALL: [Color; 2] = [Color::Blue, Color::Green];

    /// The opposite color. If `self` is active, this is the standby color.
    pub fn other(self) -> Color {
        match self {
            Color::Blue => Color::Green,
            Color::Green => Color::Blue,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Color::Blue => "blue",
            Color::Green => "green",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blue" => Ok(Color::Blue),
            "green" => Ok(Color::Green),
            _ => Err(ParseColorError(s.to_string())),
        }
    }
}

/// A value held once per color.
///
/// Replaces duplicated blue/green fields with a single structure indexed by
/// [`Color`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerColor<T> {
    pub blue: T,
    pub green: T,
}

impl<T> PerColor<T> {
    pub fn new(blue: T, green: T) -> Self {
        Self { blue, green }
    }

    /// Build both slots from a function of the color.
    pub fn from_fn(mut f: impl FnMut(Color) -> T) -> Self {
        Self {
            blue: f(Color::Blue),
            green: f(Color::Green),
        }
    }

    pub fn get(&self, color: Color) -> &T {
        match color {
            Color::Blue => &self.blue,
            Color::Green => &self.green,
        }
    }

    pub fn get_mut(&mut self, color: Color) -> &mut T {
        match color {
            Color::Blue => &mut self.blue,
            Color::Green => &mut self.green,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(Color, T) -> U) -> PerColor<U> {
        PerColor {
            blue: f(Color::Blue, self.blue),
            green: f(Color::Green, self.green),
        }
    }

    /// Iterate `(color, value)` pairs, blue first.
    pub fn iter(&self) -> impl Iterator<Item = (Color, &T)> {
        [(Color::Blue, &self.blue), (Color::Green, &self.green)].into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_is_an_involution() {
        for color in Color::ALL {
            assert_ne!(color.other(), color);
            assert_eq!(color.other().other(), color);
        }
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Blue".parse::<Color>(), Ok(Color::Blue));
        assert_eq!(" green ".parse::<Color>(), Ok(Color::Green));
        assert!("red".parse::<Color>().is_err());
    }

    #[test]
    fn per_color_indexes_by_color() {
        let mut counts = PerColor::new(1, 2);
        *counts.get_mut(Color::Green) += 10;
        assert_eq!(*counts.get(Color::Blue), 1);
        assert_eq!(*counts.get(Color::Green), 12);

        let labels = counts.map(|color, n| format!("{color}:{n}"));
        assert_eq!(labels.blue, "blue:1");
        assert_eq!(labels.green, "green:12");
    }
}
