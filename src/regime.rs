use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::model::natural_cmp;
use crate::error::ConfigError;

/// Laser scan pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStrategy {
    /// Island ("chessboard") pattern.
    Chess,
    /// Parallel back-and-forth tracks.
    Linear,
}

impl fmt::Display for ScanStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStrategy::Chess => write!(f, "chess"),
            ScanStrategy::Linear => write!(f, "linear"),
        }
    }
}

/// Process parameters of one printing regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regime {
    pub power_w: f64,
    pub speed_mm_s: f64,
    pub hatch_um: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_um: Option<f64>,
    /// Hard-coded value from the source tables; wins over the computed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_density: Option<f64>,
    pub strategy: ScanStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Regime {
    fn new(power_w: f64, speed_mm_s: f64, hatch_um: f64, strategy: ScanStrategy) -> Self {
        Regime {
            power_w,
            speed_mm_s,
            hatch_um,
            layer_um: Some(50.0),
            energy_density: None,
            strategy,
            note: None,
        }
    }

    /// Volumetric energy density in J/mm³ (or J/mm² when the layer
    /// thickness is unknown).
    pub fn energy_density(&self) -> f64 {
        if let Some(e) = self.energy_density {
            return e;
        }
        let hatch_mm = self.hatch_um / 1000.0;
        let areal = self.power_w / (self.speed_mm_s * hatch_mm);
        match self.layer_um {
            Some(layer) if layer > 0.0 => areal / (layer / 1000.0),
            _ => areal,
        }
    }

    pub(crate) fn validate(&self, label: &str) -> Result<(), ConfigError> {
        let positive = [
            ("power_w", self.power_w),
            ("speed_mm_s", self.speed_mm_s),
            ("hatch_um", self.hatch_um),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidRegime(
                    label.to_string(),
                    format!("{name} must be a positive number, got {value}"),
                ));
            }
        }
        if let Some(layer) = self.layer_um {
            if !(layer.is_finite() && layer > 0.0) {
                return Err(ConfigError::InvalidRegime(
                    label.to_string(),
                    format!("layer_um must be positive, got {layer}"),
                ));
            }
        }
        Ok(())
    }
}

/// Every known regime, keyed by label. Loaded once per run and shared by
/// reference with all jobs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegimeTable {
    regimes: BTreeMap<String, Regime>,
}

impl RegimeTable {
    /// Regimes of the TiNbZrCu and TiTaNbZr print campaigns.
    pub fn builtin() -> Self {
        use ScanStrategy::*;
        let mut l2 = Regime::new(200.0, 1000.0, 100.0, Linear);
        l2.energy_density = Some(80.0);
        l2.note = Some("double scan".to_string());
        let mut l4 = Regime::new(250.0, 800.0, 80.0, Linear);
        l4.energy_density = Some(78.1);

        let regimes = BTreeMap::from([
            ("C1".to_string(), Regime::new(200.0, 800.0, 100.0, Chess)),
            ("C5".to_string(), Regime::new(200.0, 1000.0, 100.0, Chess)),
            ("L1".to_string(), Regime::new(200.0, 1000.0, 100.0, Linear)),
            ("L2".to_string(), l2),
            ("L3".to_string(), Regime::new(200.0, 800.0, 80.0, Linear)),
            ("L4".to_string(), l4),
            ("L5".to_string(), Regime::new(200.0, 1000.0, 80.0, Linear)),
        ]);
        RegimeTable { regimes }
    }

    /// Overlay `other` on this table; entries with the same label are replaced.
    pub fn merge(&mut self, other: RegimeTable) {
        self.regimes.extend(other.regimes);
    }

    pub fn get(&self, label: &str) -> Option<&Regime> {
        self.regimes.get(label)
    }

    pub fn energy_density(&self, label: &str) -> Option<f64> {
        self.get(label).map(Regime::energy_density)
    }

    pub fn len(&self) -> usize {
        self.regimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regimes.is_empty()
    }

    /// Labels in natural order (`C2` before `C10`).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Regime)> {
        let mut entries: Vec<_> = self.regimes.iter().map(|(k, v)| (k.as_str(), v)).collect();
        entries.sort_by(|a, b| natural_cmp(a.0, b.0));
        entries.into_iter()
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        self.regimes
            .iter()
            .try_for_each(|(label, regime)| regime.validate(label))
    }
}

impl FromIterator<(String, Regime)> for RegimeTable {
    fn from_iter<I: IntoIterator<Item = (String, Regime)>>(iter: I) -> Self {
        RegimeTable {
            regimes: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computed_energy_density_uses_layer_thickness() {
        let table = RegimeTable::builtin();
        // 200 W / (800 mm/s * 0.1 mm * 0.05 mm)
        let c1 = table.energy_density("C1").unwrap();
        assert!((c1 - 50.0).abs() < 1e-9);
        // 200 W / (800 mm/s * 0.08 mm * 0.05 mm)
        let l3 = table.energy_density("L3").unwrap();
        assert!((l3 - 62.5).abs() < 1e-9);
    }

    #[test]
    fn explicit_energy_density_wins() {
        let table = RegimeTable::builtin();
        assert_eq!(table.energy_density("L2"), Some(80.0));
        assert_eq!(table.energy_density("L4"), Some(78.1));
        assert_eq!(table.get("L2").unwrap().note.as_deref(), Some("double scan"));
    }

    #[test]
    fn unknown_layer_gives_areal_density() {
        let mut r = Regime::new(100.0, 1000.0, 100.0, ScanStrategy::Linear);
        r.layer_um = None;
        assert!((r.energy_density() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn merge_overrides_by_label() {
        let mut table = RegimeTable::builtin();
        let custom: RegimeTable = [(
            "C1".to_string(),
            Regime::new(300.0, 800.0, 100.0, ScanStrategy::Chess),
        )]
        .into_iter()
        .collect();
        table.merge(custom);
        assert_eq!(table.len(), 7);
        assert_eq!(table.get("C1").unwrap().power_w, 300.0);
    }

    #[test]
    fn zero_speed_is_rejected() {
        let table: RegimeTable = [(
            "X".to_string(),
            Regime::new(200.0, 0.0, 100.0, ScanStrategy::Linear),
        )]
        .into_iter()
        .collect();
        assert!(matches!(
            table.validate(),
            Err(ConfigError::InvalidRegime(label, _)) if label == "X"
        ));
    }

    #[test]
    fn iteration_is_natural_order() {
        let labels: Vec<_> = RegimeTable::builtin().iter().map(|(l, _)| l.to_string()).collect();
        assert_eq!(labels, vec!["C1", "C5", "L1", "L2", "L3", "L4", "L5"]);
    }
}
