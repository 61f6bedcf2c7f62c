//! Writes a demo dataset and a matching job file:
//!
//! * `density.csv`      – relative density per regime, semicolon/comma export
//! * `tensile.parquet`  – stress–strain replicates, one row per curve
//! * `xrd_*.xy`         – two diffraction patterns
//! * `dsc.txt`          – calorimeter export with a free-form preamble
//! * `job.json`         – jobs drawing all of the above
//!
//! Usage: `generate_sample [DIR]` (default `sample_data`).

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Builder, Int64Array, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use serde_json::json;

use alloy_plots::regime::RegimeTable;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// `1234.5` → `1234,5`
fn comma(v: f64, decimals: usize) -> String {
    format!("{v:.decimals$}").replace('.', ",")
}

// ---------------------------------------------------------------------------
// Density
// ---------------------------------------------------------------------------

fn write_density(dir: &Path, rng: &mut SimpleRng) -> Result<PathBuf> {
    let regimes = RegimeTable::builtin();
    let mut text = String::from("Regime;Density, %\n");
    for (label, regime) in regimes.iter() {
        // Porosity rises away from ~70 J/mm³ in either direction.
        let e = regime.energy_density();
        let base = 99.92 - 0.0004 * (e - 70.0).powi(2);
        for replicate in 0..3 {
            let value = (base + rng.gauss(0.0, 0.015)).min(99.99);
            let label = if replicate == 0 { label } else { "" };
            writeln!(text, "{label};{}", comma(value, 2))?;
        }
    }
    let path = dir.join("density.csv");
    fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Tensile
// ---------------------------------------------------------------------------

/// Strain in %, stress in MPa, with a fracture drop and a flat tail.
fn stress_strain(uts: f64, fracture: f64, rng: &mut SimpleRng) -> (Vec<f64>, Vec<f64>) {
    let step = 0.05;
    let necking = 0.85 * fracture;
    let mut x = Vec::new();
    let mut y = Vec::new();
    let mut strain = 0.02;
    while strain <= fracture {
        let hardening = uts * (strain / 1.2).tanh();
        let stress = if strain <= necking {
            hardening
        } else {
            uts * (necking / 1.2).tanh() - 40.0 * (strain - necking)
        };
        x.push(strain);
        y.push(stress + rng.gauss(0.0, 1.5));
        strain += step;
    }
    let last = y.last().copied().unwrap_or(uts);
    for factor in [0.5, 0.15] {
        x.push(strain);
        y.push(last * factor);
        strain += step;
    }
    for _ in 0..8 {
        x.push(strain);
        y.push(6.0 + rng.gauss(0.0, 0.5));
        strain += step;
    }
    (x, y)
}

fn write_tensile(dir: &Path, rng: &mut SimpleRng) -> Result<PathBuf> {
    // regime, UTS (MPa), elongation at fracture (%)
    let regimes = [("C1", 905.0, 12.0), ("L3", 950.0, 9.0), ("L4", 870.0, 14.0)];

    let mut x_builder = ListBuilder::new(Float64Builder::new());
    let mut y_builder = ListBuilder::new(Float64Builder::new());
    let mut labels: Vec<&str> = Vec::new();
    let mut replicates: Vec<i64> = Vec::new();

    for (label, uts, fracture) in regimes {
        for replicate in 1..=3 {
            let (x, y) = stress_strain(
                uts * (1.0 + rng.gauss(0.0, 0.015)),
                fracture * (1.0 + rng.gauss(0.0, 0.05)),
                rng,
            );
            x_builder.values().append_slice(&x);
            x_builder.append(true);
            y_builder.values().append_slice(&y);
            y_builder.append(true);
            labels.push(label);
            replicates.push(replicate);
        }
    }

    let item = || Arc::new(Field::new("item", DataType::Float64, true));
    let schema = Arc::new(Schema::new(vec![
        Field::new("x", DataType::List(item()), false),
        Field::new("y", DataType::List(item()), false),
        Field::new("regime", DataType::Utf8, false),
        Field::new("replicate", DataType::Int64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(x_builder.finish()),
            Arc::new(y_builder.finish()),
            Arc::new(StringArray::from(labels)),
            Arc::new(Int64Array::from(replicates)),
        ],
    )
    .context("building tensile record batch")?;

    let path = dir.join("tensile.parquet");
    let file = fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing tensile batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Diffraction and calorimetry
// ---------------------------------------------------------------------------

fn write_xrd(dir: &Path, name: &str, peaks: &[(f64, f64)], rng: &mut SimpleRng) -> Result<PathBuf> {
    let mut text = String::from("'Id: \"Scan\"\n'Range: 30-80 deg, step 0.02\n");
    for i in 0..=2500 {
        let two_theta = 30.0 + i as f64 * 0.02;
        let signal: f64 = peaks
            .iter()
            .map(|&(mu, amp)| gaussian(two_theta, mu, 0.12, amp))
            .sum();
        let counts = (40.0 + signal + rng.gauss(0.0, 4.0)).max(0.0);
        writeln!(text, "{two_theta:.2} {counts:.0}")?;
    }
    let path = dir.join(name);
    fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn write_dsc(dir: &Path, rng: &mut SimpleRng) -> Result<PathBuf> {
    let mut text = String::from(
        "#EXPORTTYPE:DATA ALL\n#SAMPLE:L4 as-built\n#SAMPLE MASS /mg:25,4\n#RANGE:25/10,0(K/min)/1000\n",
    );
    text.push_str("#Temp./°C;Time/min;DSC/(mW/mg)\n");
    for i in 0..=1950 {
        let t = 25.0 + i as f64 * 0.5;
        let time = (t - 25.0) / 10.0;
        let flow = -0.02 - 0.00008 * t + gaussian(t, 620.0, 12.0, -0.15) + rng.gauss(0.0, 0.003);
        writeln!(text, "{};{};{}", comma(t, 1), comma(time, 3), comma(flow, 5))?;
    }
    let path = dir.join("dsc.txt");
    fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Job file
// ---------------------------------------------------------------------------

fn job_file() -> serde_json::Value {
    let density_source = json!({
        "file": "density.csv",
        "layout": {
            "header": {"offset": 0},
            "delimiter": "semicolon",
            "decimal": "comma",
            "regime": "Regime",
            "value": 1,
            "fill_down": true
        }
    });
    json!({
        "output_dir": "charts",
        "jobs": [
            {
                "name": "density",
                "kind": "property",
                "source": density_source,
                "x_axis": "energy_density",
                "group_by": "hatch",
                "label_points": true,
                "export_summary": true,
                "colors": {"h = 100 µm": "#0066CC", "h = 80 µm": "#CC3300"},
                "chart": {
                    "title": "Relative density",
                    "y_label": "Relative density, %",
                    "legend": "lower_right",
                    "regions": [{"x": [65.0, 80.0], "label": "process window"}],
                    "formats": ["png", "svg"]
                }
            },
            {
                "name": "density-by-regime",
                "kind": "property",
                "source": density_source,
                "x_axis": "regime",
                "order": "energy_density",
                "connect": false,
                "series_name": "density",
                "chart": {"y_label": "Relative density, %", "legend": "none"}
            },
            {
                "name": "density-double",
                "kind": "panels",
                "columns": 2,
                "chart": {"title": "Density", "size": [14.0, 6.0], "dpi": 150},
                "panels": [
                    {
                        "kind": "property",
                        "source": density_source,
                        "group_by": "hatch",
                        "secondary": {
                            "source": {"inline": {"C1": [5.06, 5.07], "L3": [5.03], "L4": [5.08, 5.09]}},
                            "series_name": "weighed"
                        },
                        "chart": {
                            "y_label": "Relative density, %",
                            "y2_label": "Density, g/cm³",
                            "y2_range": [5.0, 5.1],
                            "legend": "lower_right"
                        }
                    },
                    {
                        "kind": "property",
                        "source": density_source,
                        "x_axis": "regime",
                        "connect": false,
                        "series_name": "density",
                        "chart": {"y_label": "Relative density, %", "legend": "none"}
                    }
                ]
            },
            {
                "name": "tensile",
                "kind": "curves",
                "preset": "tensile",
                "sources": [{"dataset": "tensile.parquet"}],
                "show_replicates": true,
                "cutoffs": {"L3": 9.0},
                "chart": {"title": "Tensile tests", "legend": "lower_right", "size": [8.0, 6.0], "dpi": 150}
            },
            {
                "name": "xrd",
                "kind": "diffraction",
                "patterns": [
                    {"file": "xrd_as_built.xy", "label": "as-built"},
                    {"file": "xrd_annealed.xy", "label": "annealed 700 °C"}
                ],
                "peaks": [
                    {"position": 38.5, "label": "β(110)"},
                    {"position": 55.6, "label": "β(200)"},
                    {"position": 69.7, "label": "β(211)"},
                    {"position": 35.3, "label": "α(100)", "side": "left"},
                    {"position": 40.4, "label": "α(101)", "side": "right"}
                ],
                "peak_lines": true,
                "chart": {"hide_y_labels": true, "x_range": [30.0, 80.0], "legend": "upper_right"}
            },
            {
                "name": "dsc",
                "kind": "curves",
                "preset": "dsc",
                "sources": [{"file": "dsc.txt", "regime": "L4"}],
                "resample": {"start": "overlap"},
                "smoothing": {"method": "savitzky_golay", "window": 51, "order": 3},
                "chart": {
                    "title": "DSC, 10 K/min",
                    "annotations": [{"x": 620.0, "y": -0.2, "text": "α → β", "offset": {"pixels": [20, -20]}}]
                }
            }
        ]
    })
}

fn main() -> Result<()> {
    let dir = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| "sample_data".to_string()));
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let mut rng = SimpleRng::new(42);

    let mut written = vec![
        write_density(&dir, &mut rng)?,
        write_tensile(&dir, &mut rng)?,
    ];
    let as_built = [(38.5, 900.0), (55.6, 140.0), (69.7, 260.0)];
    let annealed = [
        (38.5, 700.0),
        (55.6, 110.0),
        (69.7, 200.0),
        (35.3, 150.0),
        (38.3, 90.0),
        (40.4, 380.0),
    ];
    written.push(write_xrd(&dir, "xrd_as_built.xy", &as_built, &mut rng)?);
    written.push(write_xrd(&dir, "xrd_annealed.xy", &annealed, &mut rng)?);
    written.push(write_dsc(&dir, &mut rng)?);

    let job_path = dir.join("job.json");
    let job = serde_json::to_string_pretty(&job_file()).context("serialising job file")?;
    fs::write(&job_path, job).with_context(|| format!("writing {}", job_path.display()))?;
    written.push(job_path);

    for path in &written {
        println!("wrote {}", path.display());
    }
    println!("render with: alloy-plots run {}", dir.join("job.json").display());
    Ok(())
}
