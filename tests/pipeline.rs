use std::fs;
use std::path::Path;

use alloy_plots::config::{Config, JobKind};
use alloy_plots::pipeline::{prepare_job, run_all};
use alloy_plots::render::options::SeriesData;

fn write(dir: &Path, name: &str, text: &str) {
    fs::write(dir.join(name), text).unwrap();
}

fn write_job(dir: &Path, json: &str) -> Config {
    let path = dir.join("job.json");
    fs::write(&path, json).unwrap();
    Config::load(&path).unwrap()
}

#[test]
fn property_job_from_csv_skips_the_corrupt_row() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "density.csv",
        "Regime;Density\nC1;99,90\nL4;99,85\nL4;n/a\nL4;99,87\nL3;99,70\n",
    );
    let config = write_job(
        dir.path(),
        r#"{"jobs": [{
            "name": "density",
            "kind": "property",
            "source": {"file": "density.csv",
                       "layout": {"header": {"offset": 0}, "regime": "Regime", "value": "Density"}},
            "x_axis": "energy_density",
            "export_summary": true
        }]}"#,
    );

    let prepared = prepare_job(&config.jobs[0], &config.regimes).unwrap();
    assert_eq!(prepared.report.parsed, 4);
    assert_eq!(prepared.report.skipped.len(), 1);
    assert_eq!(prepared.report.skipped[0].row, 4);

    let summary = prepared.summary.unwrap();
    let labels: Vec<&str> = summary.iter().map(|(l, _)| l.as_str()).collect();
    assert_eq!(labels, vec!["C1", "L3", "L4"]);
    let l4 = &summary[2].1;
    assert!((l4.mean - 99.86).abs() < 1e-9);
    assert!((l4.std_dev - 0.01).abs() < 1e-9);
    assert_eq!(summary[0].1.std_dev, 0.0);

    let SeriesData::Points(points) = &prepared.series[0].data else {
        panic!("expected points");
    };
    let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
    assert_eq!(xs, vec![50.0, 62.5, 78.1]);
    assert_eq!(prepared.chart.x_label, "Energy density, J/mm³");
}

#[test]
fn cross_plot_takes_x_from_a_second_comma_separated_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "modulus.csv", "regime,E\nC1,91\nC1,101\nL4,91\n");
    write(dir.path(), "uts.csv", "regime,UTS\nC1,700\nC1,742\nL4,1450\nL5,307\n");
    let config = write_job(
        dir.path(),
        r#"{"jobs": [{
            "name": "e-uts",
            "kind": "property",
            "source": {"file": "uts.csv", "layout": {"header": {"offset": 0}, "regime": "regime", "value": "UTS"}},
            "x_axis": "measured",
            "x_source": {"file": "modulus.csv", "layout": {"header": {"offset": 0}, "regime": "regime", "value": "E"}},
            "connect": false,
            "chart": {"x_label": "Elastic modulus, GPa"}
        }]}"#,
    );

    let prepared = prepare_job(&config.jobs[0], &config.regimes).unwrap();
    assert_eq!(prepared.report.parsed, 7);
    assert!(prepared.report.skipped.is_empty());
    let SeriesData::Points(points) = &prepared.series[0].data else {
        panic!("expected points");
    };
    // L5 has no modulus and is left out.
    assert_eq!(points.len(), 2);
    assert_eq!((points[0].x, points[0].y), (91.0, 1450.0));
    assert_eq!(points[0].x_error, Some(0.0));
    assert_eq!((points[1].x, points[1].y), (96.0, 721.0));
    assert_eq!(points[1].x_error, Some(5.0));
    assert_eq!(points[1].error, Some(21.0));
    assert!(!prepared.series[0].connect);
    assert_eq!(prepared.chart.x_label, "Elastic modulus, GPa");
}

#[test]
fn curves_job_averages_replicates_on_the_shortest_grid() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "c1_1.csv", "strain;stress\n0;0\n1;100\n2;200\n3;300\n");
    write(dir.path(), "c1_2.csv", "strain;stress\n0;0\n1;120\n2;240\n");
    write(dir.path(), "l4_1.csv", "strain;stress\n0;0\n2;100\n4;150\n");
    let config = write_job(
        dir.path(),
        r#"{"jobs": [{
            "name": "curves",
            "kind": "curves",
            "sources": [
                {"file": "l4_1.csv", "regime": "L4", "layout": {"header": {"offset": 0}}},
                {"file": "c1_1.csv", "regime": "C1", "layout": {"header": {"offset": 0}}},
                {"file": "c1_2.csv", "regime": "C1", "layout": {"header": {"offset": 0}}}
            ],
            "resample": {"points": 3},
            "legend": {"C1": "C1 (chess)"}
        }]}"#,
    );

    let prepared = prepare_job(&config.jobs[0], &config.regimes).unwrap();
    assert_eq!(prepared.series.len(), 2);

    let c1 = &prepared.series[0];
    assert_eq!(c1.name, "C1 (chess)");
    let SeriesData::Line { x, y, band } = &c1.data else {
        panic!("expected a line");
    };
    assert_eq!(x, &vec![0.0, 1.0, 2.0]);
    assert_eq!(y, &vec![0.0, 110.0, 220.0]);
    assert_eq!(band.as_ref().unwrap(), &vec![0.0, 10.0, 20.0]);

    // A single replicate is drawn as loaded, without a band.
    let SeriesData::Line { x, band, .. } = &prepared.series[1].data else {
        panic!("expected a line");
    };
    assert_eq!(x, &vec![0.0, 2.0, 4.0]);
    assert!(band.is_none());
}

#[test]
fn dataset_filter_selects_regimes() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "curves.json",
        r#"[
            {"x": [0, 1, 2], "y": [0, 10, 20], "regime": "C1", "replicate": 1},
            {"x": [0, 1, 2], "y": [0, 30, 40], "regime": "C1", "replicate": 2},
            {"x": [0, 1, 2], "y": [0, 50, 60], "regime": "L4", "replicate": 1}
        ]"#,
    );
    let config = write_job(
        dir.path(),
        r#"{"jobs": [{
            "name": "filtered",
            "kind": "curves",
            "sources": [{"dataset": "curves.json", "filter": {"regime": ["C1"]}}],
            "resample": {"points": 3}
        }]}"#,
    );

    let prepared = prepare_job(&config.jobs[0], &config.regimes).unwrap();
    assert_eq!(prepared.series.len(), 1);
    assert_eq!(prepared.series[0].name, "C1");
    let SeriesData::Line { y, .. } = &prepared.series[0].data else {
        panic!("expected a line");
    };
    assert_eq!(y, &vec![0.0, 20.0, 30.0]);
}

#[test]
fn diffraction_job_stacks_and_labels_peaks() {
    let dir = tempfile::tempdir().unwrap();
    let pattern = |peak: f64| {
        let mut text = String::from("'header line\n");
        for i in 0..=100 {
            let x = 35.0 + i as f64 * 0.1;
            let y = if (x - peak).abs() < 0.05 { 1000.0 } else { 10.0 };
            text.push_str(&format!("{x:.1} {y}\n"));
        }
        text
    };
    write(dir.path(), "a.xy", &pattern(38.5));
    write(dir.path(), "b.xy", &pattern(40.4));
    let config = write_job(
        dir.path(),
        r#"{"jobs": [{
            "name": "xrd",
            "kind": "diffraction",
            "patterns": [{"file": "a.xy", "label": "as-built"}, {"file": "b.xy", "label": "annealed"}],
            "peaks": [{"position": 38.5, "label": "β(110)"}, {"position": 40.4, "label": "α(101)", "side": "right"}],
            "peak_lines": true
        }]}"#,
    );

    let prepared = prepare_job(&config.jobs[0], &config.regimes).unwrap();
    assert_eq!(prepared.series.len(), 2);
    let SeriesData::Line { y, .. } = &prepared.series[1].data else {
        panic!("expected a line");
    };
    let top = y.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    assert!((top - 220.0).abs() < 1e-9);

    // Only the peak actually present in each pattern is labelled.
    let texts: Vec<&str> = prepared.chart.annotations.iter().map(|a| a.text.as_str()).collect();
    assert_eq!(texts, vec!["β(110)", "α(101)"]);
    assert_eq!(prepared.chart.vlines.len(), 2);
    assert!(matches!(&config.jobs[0].kind, JobKind::Diffraction(_)));
}

#[test]
fn failing_jobs_do_not_stop_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_job(
        dir.path(),
        r#"{"jobs": [
            {"name": "missing", "kind": "property", "source": {"file": "nope.xlsx"}},
            {"name": "also-missing", "kind": "diffraction", "patterns": [{"file": "nope.xy", "label": "a"}]}
        ]}"#,
    );

    let results = run_all(&config, &[]);
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(_, r)| r.is_err()));
    let message = format!("{:#}", results[0].1.as_ref().unwrap_err());
    assert!(message.contains("nope.xlsx"), "{message}");

    let only = run_all(&config, &["also-missing".to_string()]);
    assert_eq!(only.len(), 1);
    assert_eq!(only[0].0, "also-missing");
}

#[test]
#[ignore = "needs system fonts"]
fn run_writes_charts_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_job(
        dir.path(),
        r#"{"output_dir": "out", "jobs": [{
            "name": "density",
            "kind": "property",
            "source": {"inline": {"C1": [99.9], "L4": [99.85, 99.87]}},
            "export_summary": true,
            "chart": {"formats": ["png", "svg"]}
        }]}"#,
    );

    let results = run_all(&config, &[]);
    let outcome = results[0].1.as_ref().unwrap();
    assert_eq!(outcome.outputs.len(), 2);
    assert!(dir.path().join("out/density.png").exists());
    assert!(dir.path().join("out/density.svg").exists());

    let summary = fs::read_to_string(dir.path().join("out/density-summary.csv")).unwrap();
    assert!(summary.contains("C1,99.9000,0.0000,1,50.00"));
    assert!(summary.contains("L4,99.8600,0.0100,2,78.10"));
}
