use super::document::PointKind;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Opacity of guide lines and general markers.
pub const LINE_OPACITY: f64 = 0.7;

/// Opacity of fair-value-gap zone lines.
pub const FVG_OPACITY: f64 = 0.3;

/// Marker colour when no semantic colour applies.
pub const FALLBACK_MARKER_COLOR: &str = "#FFA500";

/// Default W-signal marker colour.
pub const DEFAULT_SIGNAL_COLOR: &str = "#243EA8";

/// Chart colour theme.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

/// CSS `rgba()` colour.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: f64) -> Self {
        Self { r, g, b, a }
    }

    /// Parse a `#RRGGBB` hex colour with the provided alpha.
    pub fn from_hex(hex: &str, alpha: f64) -> Option<Self> {
        let digits = hex.trim().strip_prefix('#')?;
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }

        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
        Some(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?, alpha))
    }

    pub fn with_alpha(self, a: f64) -> Self {
        Self { a, ..self }
    }
}

impl Display for Rgba {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

/// Guide line colour by semantic type.
pub fn stroke_color(kind: &PointKind, alpha: f64) -> Rgba {
    let (r, g, b) = match kind {
        PointKind::SupplyPoi | PointKind::BearishFvg => (239, 68, 68),
        PointKind::DemandPoi | PointKind::BullishFvg => (34, 197, 94),
        PointKind::BuySideLiquidity => (59, 130, 246),
        PointKind::SellSideLiquidity => (249, 115, 22),
        PointKind::BullishBos | PointKind::BullishChoch => (16, 185, 129),
        PointKind::BearishBos | PointKind::BearishChoch => (220, 38, 38),
        PointKind::Equilibrium => (107, 114, 128),
        _ => (156, 163, 175),
    };
    Rgba::new(r, g, b, alpha)
}

pub fn fib_retracement_color(theme: Theme) -> Rgba {
    match theme {
        Theme::Dark => Rgba::new(96, 165, 250, LINE_OPACITY),
        Theme::Light => Rgba::new(59, 130, 246, LINE_OPACITY),
    }
}

pub fn fib_extension_color(theme: Theme) -> Rgba {
    match theme {
        Theme::Dark => Rgba::new(251, 146, 60, LINE_OPACITY),
        Theme::Light => Rgba::new(249, 115, 22, LINE_OPACITY),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba_from_hex() {
        struct TestCase {
            input: &'static str,
            expected: Option<&'static str>,
        }

        let tests = vec![
            TestCase {
                // TC0: uppercase hex
                input: "#243EA8",
                expected: Some("rgba(36, 62, 168, 0.7)"),
            },
            TestCase {
                // TC1: lowercase hex w/ whitespace
                input: " #ff0000 ",
                expected: Some("rgba(255, 0, 0, 0.7)"),
            },
            TestCase {
                // TC2: missing hash
                input: "243EA8",
                expected: None,
            },
            TestCase {
                // TC3: short form unsupported
                input: "#fff",
                expected: None,
            },
            TestCase {
                // TC4: invalid digits
                input: "#GG0000",
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = Rgba::from_hex(test.input, LINE_OPACITY).map(|rgba| rgba.to_string());
            assert_eq!(actual.as_deref(), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_stroke_color() {
        assert_eq!(
            stroke_color(&PointKind::BearishFvg, FVG_OPACITY).to_string(),
            "rgba(239, 68, 68, 0.3)"
        );
        assert_eq!(
            stroke_color(&PointKind::BuySideLiquidity, LINE_OPACITY).to_string(),
            "rgba(59, 130, 246, 0.7)"
        );
        assert_eq!(
            stroke_color(&PointKind::Other("nota".into()), 1.0).to_string(),
            "rgba(156, 163, 175, 1)"
        );
    }
}
