use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use super::table::{read_table, Table};
use super::{import_timestamp, reconcile, ImportWarning};
use crate::codec::modeshape::{self, ModeShapeFile};
use crate::codec::record::Endian;
use crate::data::model::{AEMode, Array2, Array3, Dataset, DatasetBuilder};
use crate::error::ImportError;

/// Sensors of the `.amp` file, in column order. They become the
/// participation modes.
pub const AMP_SENSORS: [&str; 15] = [
    "TWR SS", "TWR FA", "TWR yaw", "SFT x", "SFT y", "SFT tor", "Sym edge", "BW edge", "FW edge",
    "Sym flap", "BW flap", "FW flap", "Sym tors", "BW tors", "FW tors",
];

/// Operating parameters of the `.opt` file, in column order.
pub const OPT_PARAMETERS: [&str; 5] = [
    "wind speed [m/s]",
    "pitch [deg]",
    "rot. speed [rpm]",
    "aero power [kw]",
    "aero thrust [kn]",
];

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How the columns of a `.cmb` file are split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CmbLayout {
    /// Aeroelastic when `(columns - 1) % 3 == 0`, else structural when even.
    #[default]
    Auto,
    /// Frequency and damping per mode.
    Structural,
    /// Frequency, damping and real part per mode.
    Aeroelastic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HawcStab2Options {
    pub skip_header_cmb: usize,
    pub skip_header_amp: usize,
    pub skip_header_opt: usize,
    pub cmb_layout: CmbLayout,
    /// Byte order of the `.bin` mode-shape file.
    pub endian: Endian,
}

impl Default for HawcStab2Options {
    fn default() -> Self {
        Self {
            skip_header_cmb: 1,
            skip_header_amp: 5,
            skip_header_opt: 1,
            cmb_layout: CmbLayout::Auto,
            endian: Endian::Little,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HawcStab2Files {
    pub cmb: PathBuf,
    pub opt: PathBuf,
    pub amp: Option<PathBuf>,
    pub bin: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Per-file readers
// ---------------------------------------------------------------------------

struct Campbell {
    frequency: Array2,
    damping: Array2,
    realpart: Option<Array2>,
}

impl Campbell {
    fn n_rows(&self) -> usize {
        self.frequency.rows()
    }

    fn n_modes(&self) -> usize {
        self.frequency.cols()
    }
}

fn split_cmb(table: &Table, layout: CmbLayout, path: &Path) -> Result<Campbell, ImportError> {
    let layout_error = |message: String| ImportError::Layout {
        path: path.to_path_buf(),
        message,
    };
    if table.n_rows() == 0 {
        return Err(layout_error("no data rows".to_string()));
    }
    let data_cols = table.n_cols().saturating_sub(1);
    if data_cols == 0 {
        return Err(layout_error("no mode columns".to_string()));
    }

    let aeroelastic = match layout {
        CmbLayout::Auto if data_cols % 3 == 0 => true,
        CmbLayout::Auto if data_cols % 2 == 0 => false,
        CmbLayout::Auto => {
            return Err(layout_error(format!(
                "{data_cols} data columns fit neither the structural nor the aeroelastic layout"
            )))
        }
        CmbLayout::Aeroelastic if data_cols % 3 == 0 => true,
        CmbLayout::Structural if data_cols % 2 == 0 => false,
        other => {
            return Err(layout_error(format!(
                "{data_cols} data columns do not fit the {other:?} layout"
            )))
        }
    };

    let n_modes = if aeroelastic { data_cols / 3 } else { data_cols / 2 };
    debug!(
        "{}: {} rows, {n_modes} modes ({})",
        path.display(),
        table.n_rows(),
        if aeroelastic { "aeroelastic" } else { "structural" }
    );
    Ok(Campbell {
        frequency: table.block(1, n_modes),
        damping: table.block(1 + n_modes, n_modes),
        realpart: aeroelastic.then(|| table.block(1 + 2 * n_modes, n_modes)),
    })
}

struct Amplitudes {
    amplitude: Array3,
    phase: Array3,
    mode_names: Vec<String>,
}

impl Amplitudes {
    fn n_rows(&self) -> usize {
        self.amplitude.shape()[0]
    }

    fn n_modes(&self) -> usize {
        self.amplitude.shape()[2]
    }
}

fn split_amp(table: &Table, path: &Path) -> Result<Amplitudes, ImportError> {
    let per_mode = 2 * AMP_SENSORS.len();
    let data_cols = table.n_cols().saturating_sub(1);
    if data_cols % per_mode != 0 {
        return Err(ImportError::Layout {
            path: path.to_path_buf(),
            message: format!("{data_cols} data columns are not a multiple of {per_mode}"),
        });
    }

    let n_rows = table.n_rows();
    let n_sensors = AMP_SENSORS.len();
    let n_modes = data_cols / per_mode;
    let mut amplitude = Array3::zeros([n_rows, n_sensors, n_modes]);
    let mut phase = Array3::zeros([n_rows, n_sensors, n_modes]);
    for op in 0..n_rows {
        for mode in 0..n_modes {
            for sensor in 0..n_sensors {
                let col = 1 + mode * per_mode + 2 * sensor;
                amplitude.set(op, sensor, mode, table.value(op, col));
                phase.set(op, sensor, mode, table.value(op, col + 1));
            }
        }
    }

    // Each mode is named after the sensor with the largest mean amplitude.
    let mut mode_names: Vec<String> = (0..n_modes)
        .map(|mode| {
            let mut best = (0, f64::NEG_INFINITY);
            for sensor in 0..n_sensors {
                let mean = (0..n_rows)
                    .map(|op| table.value(op, 1 + mode * per_mode + 2 * sensor))
                    .sum::<f64>()
                    / n_rows.max(1) as f64;
                if mean > best.1 {
                    best = (sensor, mean);
                }
            }
            AMP_SENSORS[best.0].to_string()
        })
        .collect();
    if mode_names.len() > 2 && mode_names[2] == AMP_SENSORS[0] {
        mode_names[1] = AMP_SENSORS[1].to_string();
    }

    Ok(Amplitudes {
        amplitude,
        phase,
        mode_names,
    })
}

fn operating_parameters(n_cols: usize) -> Vec<String> {
    (0..n_cols)
        .map(|k| match OPT_PARAMETERS.get(k) {
            Some(name) => name.to_string(),
            None => format!("column {}", k + 1),
        })
        .collect()
}

fn read_modeshapes(path: &Path, endian: Endian) -> Result<ModeShapeFile, ImportError> {
    let bytes = fs::read(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    modeshape::decode(&bytes, endian).map_err(|source| ImportError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Participation of every mode-shape component, `[state, component, mode]`.
fn derived_participation(shapes: &ModeShapeFile, n_op: usize, n_modes: usize) -> (Vec<AEMode>, Array3, Array3) {
    let n_components = shapes.components().len();
    let names = (0..n_components)
        .map(|c| AEMode::new(shapes.component_label(c).unwrap_or_else(|| format!("component {}", c + 1))))
        .collect();

    let mut amplitude = Array3::zeros([n_op, n_components, n_modes]);
    let mut phase = Array3::zeros([n_op, n_components, n_modes]);
    for state in 0..n_op {
        for mode in 0..n_modes {
            let Some(factors) = shapes.participation(state, mode) else {
                continue;
            };
            for (c, (amp, ph)) in factors.into_iter().enumerate() {
                amplitude.set(state, c, mode, amp);
                phase.set(state, c, mode, ph);
            }
        }
    }
    (names, amplitude, phase)
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// Read a HAWCStab2 result set. `.cmb` and `.opt` are required.
pub fn import(files: &HawcStab2Files, options: &HawcStab2Options) -> Result<(Dataset, Vec<ImportWarning>), ImportError> {
    let cmb = split_cmb(
        &read_table(&files.cmb, options.skip_header_cmb)?,
        options.cmb_layout,
        &files.cmb,
    )?;
    let opt = read_table(&files.opt, options.skip_header_opt)?;
    let amp = match &files.amp {
        Some(path) => Some(split_amp(&read_table(path, options.skip_header_amp)?, path)?),
        None => None,
    };
    let shapes = match &files.bin {
        Some(path) => Some(read_modeshapes(path, options.endian)?),
        None => None,
    };

    // Align the axes every source describes.
    let mut op_counts = vec![("cmb".to_string(), cmb.n_rows()), ("opt".to_string(), opt.n_rows())];
    let mut mode_counts = vec![("cmb".to_string(), cmb.n_modes())];
    if let Some(amp) = &amp {
        op_counts.push(("amp".to_string(), amp.n_rows()));
        mode_counts.push(("amp".to_string(), amp.n_modes()));
    }
    if let Some(shapes) = &shapes {
        op_counts.push(("bin".to_string(), shapes.num_states()));
        mode_counts.push(("bin".to_string(), shapes.num_modes()));
    }
    let (n_op, op_warning) = reconcile("operating_point", op_counts);
    let (n_modes, mode_warning) = reconcile("mode", mode_counts);
    let warnings: Vec<ImportWarning> = op_warning.into_iter().chain(mode_warning).collect();

    let mode_names: Vec<String> = match &amp {
        Some(amp) => amp.mode_names[..n_modes].to_vec(),
        None => (1..=n_modes).map(|k| format!("mode {k}")).collect(),
    };
    let opt_values = opt.block(0, opt.n_cols()).truncated(n_op, opt.n_cols());

    let mut builder = DatasetBuilder::new()
        .frequency(cmb.frequency.truncated(n_op, n_modes))
        .damping(cmb.damping.truncated(n_op, n_modes))
        .operating_points(operating_parameters(opt.n_cols()), opt_values)
        .modes(mode_names.into_iter().map(AEMode::new).collect())
        .attribute("filenamecmb", files.cmb.display().to_string())
        .attribute("filenameopt", files.opt.display().to_string())
        .attribute("imported_at", import_timestamp());
    if let Some(realpart) = &cmb.realpart {
        builder = builder.realpart(realpart.truncated(n_op, n_modes));
    }

    if let Some(amp) = &amp {
        builder = builder.participation(
            AMP_SENSORS.iter().map(|&s| AEMode::new(s)).collect(),
            amp.amplitude.truncated(n_op, AMP_SENSORS.len(), n_modes),
            amp.phase.truncated(n_op, AMP_SENSORS.len(), n_modes),
        );
    } else if let Some(shapes) = &shapes {
        let (names, amplitude, phase) = derived_participation(shapes, n_op, n_modes);
        builder = builder.participation(names, amplitude, phase);
    }
    if let Some(path) = &files.amp {
        builder = builder.attribute("filenameamp", path.display().to_string());
    }
    if let (Some(path), Some(shapes)) = (&files.bin, &shapes) {
        builder = builder
            .attribute("filenamebin", path.display().to_string())
            .attribute("modeshape_format", format!("{:?}", shapes.version()));
    }

    let dataset = builder.build().map_err(|source| ImportError::Schema {
        path: files.cmb.clone(),
        source,
    })?;
    Ok((dataset, warnings))
}
