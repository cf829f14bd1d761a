use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use rusty_campbell::codec::fortran::RecordWriter;
use rusty_campbell::codec::record::Endian;
use rusty_campbell::data::filter::ModeFilter;
use rusty_campbell::data::model::TurbineComponent;
use rusty_campbell::error::{ImportError, SessionError};
use rusty_campbell::import::hawcstab2::AMP_SENSORS;
use rusty_campbell::import::{
    BladedOptions, HawcStab2Files, HawcStab2Options, ImportRequest, ImportWarning, Tool,
};
use rusty_campbell::state::AppState;

const WIND: [f64; 3] = [4.0, 6.0, 8.0];

fn write_cmb(path: &Path) {
    let mut text = String::from("# ws f1 f2 d1 d2 r1 r2\n");
    for (i, ws) in WIND.iter().enumerate() {
        let i = i as f64;
        writeln!(text, "{ws} {} {} {} {} -0.01 -0.02", 0.3 + 0.01 * i, 0.7 + 0.02 * i, 2.0, 0.5).unwrap();
    }
    fs::write(path, text).unwrap();
}

fn write_opt(path: &Path, rows: usize) {
    let mut text = format!("{rows}\n");
    for ws in &WIND[..rows] {
        writeln!(text, "{ws} 0 {} 1000 300", 5.0 + ws / 4.0).unwrap();
    }
    fs::write(path, text).unwrap();
}

/// Dominant sensors: tower fore-aft for mode 1, backward edge for mode 2.
fn write_amp(path: &Path) {
    let mut text = String::from("# 1\n# 2\n# 3\n# 4\n# 5\n");
    for ws in WIND {
        write!(text, "{ws}").unwrap();
        for dominant in [1, 7] {
            for sensor in 0..AMP_SENSORS.len() {
                let amp = if sensor == dominant { 1.0 } else { 0.05 };
                write!(text, " {amp} 0").unwrap();
            }
        }
        text.push('\n');
    }
    fs::write(path, text).unwrap();
}

/// One tower body with one element; `states` operating states, 2 modes.
fn write_bin(path: &Path, states: usize) {
    let mut w = RecordWriter::new(Endian::Little);
    w.ints32(&[1]).ints32(&[1]).ints32(&[1]).reals(&[0.0]);
    w.ints32(&[2, states as i32]);
    for ws in &WIND[..states] {
        w.reals(&[*ws]).reals(&[*ws, 0.0, 1.0e6]);
        for mode in 0..2 {
            let shape: Vec<f64> = (0..24).map(|k| (k + mode) as f64).collect();
            w.reals(&shape);
        }
    }
    fs::write(path, w.into_bytes()).unwrap();
}

fn hawcstab2_case(dir: &Path, with_amp: bool) -> HawcStab2Files {
    let files = HawcStab2Files {
        cmb: dir.join("case.cmb"),
        opt: dir.join("case.opt"),
        amp: with_amp.then(|| dir.join("case.amp")),
        bin: Some(dir.join("case.bin")),
    };
    write_cmb(&files.cmb);
    write_opt(&files.opt, 3);
    if let Some(amp) = &files.amp {
        write_amp(amp);
    }
    write_bin(files.bin.as_ref().unwrap(), 3);
    files
}

#[test]
fn complete_hawcstab2_case_imports_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let request = ImportRequest::HawcStab2 {
        files: hawcstab2_case(dir.path(), true),
        options: HawcStab2Options::default(),
    };

    let imported = request.run().unwrap();
    assert_eq!(imported.tool, Tool::HawcStab2);
    assert!(imported.warnings.is_empty());

    let ds = &imported.dataset;
    assert_eq!(ds.num_operating_points(), 3);
    assert_eq!(ds.num_modes(), 2);
    assert_eq!(ds.modes()[0].name, "TWR FA");
    assert_eq!(ds.modes()[1].name, "BW edge");
    assert_eq!(ds.num_participation_modes(), AMP_SENSORS.len());
    assert_eq!(ds.parameter_values("wind speed [m/s]").unwrap(), WIND.to_vec());
    assert_eq!(ds.attributes().get("modeshape_format").map(String::as_str), Some("Int32"));
    assert!(ds.attributes().contains_key("imported_at"));
}

#[test]
fn mode_shapes_supply_participation_without_amp() {
    let dir = tempfile::tempdir().unwrap();
    let (ds, warnings) = rusty_campbell::import::hawcstab2::import(
        &hawcstab2_case(dir.path(), false),
        &HawcStab2Options::default(),
    )
    .unwrap();

    assert!(warnings.is_empty());
    assert_eq!(ds.num_participation_modes(), 1);
    assert_eq!(ds.participation_modes()[0].name, "tower body 1");
    // A single component carries all of the mode energy.
    let amp = ds.participation_factors_amp().unwrap();
    assert!((amp.get(2, 0, 1).unwrap() - 1.0).abs() < 1e-12);
}

#[test]
fn missing_opt_row_keeps_the_common_operating_points() {
    let dir = tempfile::tempdir().unwrap();
    let files = hawcstab2_case(dir.path(), true);
    write_opt(&files.opt, 2);

    let (ds, warnings) = rusty_campbell::import::hawcstab2::import(&files, &HawcStab2Options::default()).unwrap();
    assert_eq!(ds.num_operating_points(), 2);
    assert_eq!(ds.frequency().shape(), [2, 2]);
    assert_eq!(ds.participation_factors_amp().unwrap().shape(), [2, AMP_SENSORS.len(), 2]);
    match warnings.as_slice() {
        [ImportWarning::PartialData { axis, kept, counts }] => {
            assert_eq!(*axis, "operating_point");
            assert_eq!(*kept, 2);
            assert!(counts.contains(&("opt".to_string(), 2)));
            assert!(counts.contains(&("bin".to_string(), 3)));
        }
        other => panic!("unexpected warnings: {other:?}"),
    }
}

#[test]
fn truncated_mode_shapes_fail_the_whole_import() {
    let dir = tempfile::tempdir().unwrap();
    let files = hawcstab2_case(dir.path(), true);
    let bin = files.bin.clone().unwrap();
    let bytes = fs::read(&bin).unwrap();
    fs::write(&bin, &bytes[..bytes.len() - 10]).unwrap();

    let mut state = AppState::new();
    let request = ImportRequest::HawcStab2 {
        files,
        options: HawcStab2Options::default(),
    };
    match state.import("case", &request) {
        Err(SessionError::Import(ImportError::Decode { path, .. })) => assert_eq!(path, bin),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(state.database.is_empty());
}

#[test]
fn both_tools_share_one_session() {
    let dir = tempfile::tempdir().unwrap();
    let summary = dir.path().join("lin.csv");
    fs::write(
        &summary,
        "# Project: scenario\n\
         operating_point,wind speed [m/s],mode,frequency,damping,participation\n\
         0,4,1st Twr FA,0.3,0.02,\"Tower fore-aft 100% 0d\"\n\
         0,4,1st BW edge,0.7,0.005,\"Blade 1 edge 100% 0d\"\n\
         1,6,1st Twr FA,0.31,0.02,\"Tower fore-aft 100% 0d\"\n\
         1,6,1st BW edge,-1,0,\n",
    )
    .unwrap();

    let mut state = AppState::new();
    let hs2 = ImportRequest::HawcStab2 {
        files: hawcstab2_case(dir.path(), true),
        options: HawcStab2Options::default(),
    };
    let bladed = ImportRequest::BladedLin {
        summary,
        options: BladedOptions::default(),
    };

    let first = state.import("turbine", &hs2).unwrap();
    let second = state.import("turbine", &bladed).unwrap();
    assert_eq!(first.key.tool, "HAWCStab2");
    assert_eq!(second.key.tool, "Bladed (lin.)");
    assert_eq!(second.key.name, "turbine (1)");
    assert!(second.renamed.is_some());

    let ds = state.selected_dataset().unwrap();
    assert!((ds.damping().get(0, 1).unwrap() - 0.5).abs() < 1e-12);
    assert!(ds.frequency().get(1, 1).unwrap().is_nan());

    state.set_mode_filter(ModeFilter {
        wt_component: Some(TurbineComponent::Tower),
        ..ModeFilter::default()
    });
    assert_eq!(state.visible_modes, vec![0]);
}
