use std::collections::BTreeMap;
use std::str::FromStr;

use palette::{Hsl, IntoColor, Srgb};
use plotters::style::RGBColor;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<RGBColor> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.45);
            let rgb: Srgb = hsl.into_color();
            let rgb: Srgb<u8> = rgb.into_format();
            RGBColor(rgb.red, rgb.green, rgb.blue)
        })
        .collect()
}

/// Parse `#rrggbb` / `#rgb`.
pub fn parse_hex(hex: &str) -> Result<RGBColor, ConfigError> {
    let rgb = Srgb::<u8>::from_str(hex.trim())
        .map_err(|_| ConfigError::InvalidColor(hex.to_string()))?;
    Ok(RGBColor(rgb.red, rgb.green, rgb.blue))
}

// ---------------------------------------------------------------------------
// Color mapping: series key → RGBColor
// ---------------------------------------------------------------------------

/// Maps series keys (regime labels, group names) to distinct colours.
/// Keys with an explicit override keep it; the rest share an evenly spaced
/// palette in the order given.
#[derive(Debug, Clone)]
pub struct ColorMap {
    mapping: BTreeMap<String, RGBColor>,
    default_color: RGBColor,
}

impl ColorMap {
    pub fn new<'a>(
        keys: impl IntoIterator<Item = &'a str>,
        overrides: &BTreeMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let keys: Vec<&str> = keys.into_iter().collect();
        let free: Vec<&str> = keys
            .iter()
            .copied()
            .filter(|k| !overrides.contains_key(*k))
            .collect();
        let palette = generate_palette(free.len());

        let mut mapping: BTreeMap<String, RGBColor> = free
            .iter()
            .zip(palette)
            .map(|(k, c)| (k.to_string(), c))
            .collect();
        for key in keys.iter().filter(|k| overrides.contains_key(**k)) {
            let hex = &overrides[*key];
            mapping.insert(key.to_string(), parse_hex(hex)?);
        }

        Ok(ColorMap {
            mapping,
            default_color: RGBColor(128, 128, 128),
        })
    }

    /// Look up the colour for a given key.
    pub fn color_for(&self, key: &str) -> RGBColor {
        self.mapping.get(key).copied().unwrap_or(self.default_color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_has_distinct_colours() {
        let p = generate_palette(6);
        assert_eq!(p.len(), 6);
        for (i, a) in p.iter().enumerate() {
            for b in &p[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(generate_palette(0).is_empty());
    }

    #[test]
    fn hex_colours_parse() {
        assert_eq!(parse_hex("#0066CC").unwrap(), RGBColor(0x00, 0x66, 0xCC));
        assert_eq!(parse_hex("#f30").unwrap(), RGBColor(0xff, 0x33, 0x00));
        assert!(matches!(parse_hex("blue"), Err(ConfigError::InvalidColor(_))));
    }

    #[test]
    fn overrides_win_and_unknown_keys_are_grey() {
        let overrides = BTreeMap::from([("L4".to_string(), "#CC0000".to_string())]);
        let map = ColorMap::new(["C1", "L4", "L5"], &overrides).unwrap();
        assert_eq!(map.color_for("L4"), RGBColor(0xCC, 0, 0));
        assert_ne!(map.color_for("C1"), map.color_for("L5"));
        assert_eq!(map.color_for("nope"), RGBColor(128, 128, 128));
    }
}
