use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{import_timestamp, ImportWarning};
use crate::data::model::{AEMode, Array2, Array3, Dataset, DatasetBuilder};
use crate::error::ImportError;

/// Marks an operating point at which a mode was not tracked.
const UNTRACKED_FREQUENCY: f64 = -1.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BladedOptions {
    /// Field separator of the summary export.
    pub delimiter: char,
    /// Damping is exported as a ratio; store it in percent.
    pub damping_is_ratio: bool,
}

impl Default for BladedOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            damping_is_ratio: true,
        }
    }
}

struct ModeRow {
    /// Index into the mode names, in first-seen order.
    mode: usize,
    frequency: f64,
    damping: f64,
    participation: Vec<(String, f64, f64)>,
}

struct OperatingRow {
    label: String,
    parameters: Vec<f64>,
    modes: Vec<ModeRow>,
}

/// Column positions resolved from the header row.
struct Columns {
    parameters: Vec<String>,
    mode: usize,
    frequency: usize,
    damping: usize,
    participation: Option<usize>,
}

fn resolve_columns(headers: &csv::StringRecord, path: &Path) -> Result<Columns, ImportError> {
    let layout_error = |message: String| ImportError::Layout {
        path: path.to_path_buf(),
        message,
    };
    let find = |name: &str| headers.iter().position(|h| h == name);
    let require = |name: &str| find(name).ok_or_else(|| layout_error(format!("missing '{name}' column")));

    if headers.get(0) != Some("operating_point") {
        return Err(layout_error("first column must be 'operating_point'".to_string()));
    }
    let mode = require("mode")?;
    let frequency = require("frequency")?;
    let damping = require("damping")?;
    let participation = find("participation");
    for (name, index) in [("frequency", Some(frequency)), ("damping", Some(damping)), ("participation", participation)] {
        if index.is_some_and(|i| i < mode) {
            return Err(layout_error(format!("'{name}' column must come after 'mode'")));
        }
    }

    Ok(Columns {
        parameters: headers.iter().take(mode).skip(1).map(str::to_string).collect(),
        mode,
        frequency,
        damping,
        participation,
    })
}

/// Split `"Tower fore-aft 90% 0d, Blade 1 flap 10% 45d"` into
/// `(name, amplitude, phase)` entries. Amplitudes are fractions.
fn parse_participation(cell: &str, path: &Path, line: usize) -> Result<Vec<(String, f64, f64)>, ImportError> {
    let parse_error = |message: String| ImportError::Parse {
        path: path.to_path_buf(),
        line,
        message,
    };

    let mut entries = Vec::new();
    for entry in cell.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let tokens: Vec<&str> = entry.split_whitespace().collect();
        let [name @ .., amp, phase] = tokens.as_slice() else {
            return Err(parse_error(format!("participation entry '{entry}' needs a name, an amplitude and a phase")));
        };
        if name.is_empty() {
            return Err(parse_error(format!("participation entry '{entry}' has no mode name")));
        }
        let amp: f64 = amp
            .trim_end_matches('%')
            .parse()
            .map_err(|_| parse_error(format!("bad amplitude '{amp}' in '{entry}'")))?;
        let phase: f64 = phase
            .trim_end_matches('d')
            .parse()
            .map_err(|_| parse_error(format!("bad phase '{phase}' in '{entry}'")))?;
        entries.push((name.join(" "), amp / 100.0, phase));
    }
    Ok(entries)
}

fn parse_number(field: &str, column: &str, path: &Path, line: usize) -> Result<f64, ImportError> {
    field.parse().map_err(|_| ImportError::Parse {
        path: path.to_path_buf(),
        line,
        message: format!("{column}: '{field}' is not a number"),
    })
}

/// Parse the text of a Bladed Campbell summary export.
pub fn parse_summary(
    text: &str,
    path: &Path,
    options: &BladedOptions,
) -> Result<(Dataset, Vec<ImportWarning>), ImportError> {
    // Leading `# key: value` lines carry run metadata.
    let mut attributes = BTreeMap::new();
    let mut body_start = 0;
    let mut skipped_lines = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        if let Some(meta) = trimmed.strip_prefix('#') {
            if let Some((key, value)) = meta.split_once(':') {
                attributes.insert(key.trim().to_string(), value.trim().to_string());
            }
        } else if !trimmed.is_empty() {
            break;
        }
        body_start += line.len();
        skipped_lines += 1;
    }

    if !options.delimiter.is_ascii() {
        return Err(ImportError::Layout {
            path: path.to_path_buf(),
            message: format!("delimiter '{}' is not an ASCII character", options.delimiter),
        });
    }
    let csv_error = |source| ImportError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter as u8)
        .trim(csv::Trim::All)
        .from_reader(text[body_start..].as_bytes());
    let columns = resolve_columns(reader.headers().map_err(csv_error)?, path)?;

    let mut points: Vec<OperatingRow> = Vec::new();
    let mut mode_names: Vec<String> = Vec::new();
    for result in reader.records() {
        let record = result.map_err(csv_error)?;
        let line = skipped_lines + record.position().map_or(0, |p| p.line() as usize);
        let field = |i: usize| record.get(i).unwrap_or("");

        let label = field(0).to_string();
        let index = match points.iter().position(|p| p.label == label) {
            Some(index) => index,
            None => {
                let parameters = (1..columns.mode)
                    .map(|i| parse_number(field(i), &columns.parameters[i - 1], path, line))
                    .collect::<Result<Vec<f64>, _>>()?;
                points.push(OperatingRow {
                    label,
                    parameters,
                    modes: Vec::new(),
                });
                points.len() - 1
            }
        };

        let participation = match columns.participation {
            Some(i) => parse_participation(field(i), path, line)?,
            None => Vec::new(),
        };
        let name = field(columns.mode);
        let mode = match mode_names.iter().position(|n| n == name) {
            Some(mode) => mode,
            None => {
                mode_names.push(name.to_string());
                mode_names.len() - 1
            }
        };
        if points[index].modes.iter().any(|m| m.mode == mode) {
            return Err(ImportError::Parse {
                path: path.to_path_buf(),
                line,
                message: format!("mode '{name}' appears twice at operating point {}", points[index].label),
            });
        }
        points[index].modes.push(ModeRow {
            mode,
            frequency: parse_number(field(columns.frequency), "frequency", path, line)?,
            damping: parse_number(field(columns.damping), "damping", path, line)?,
            participation,
        });
    }

    if points.is_empty() {
        return Err(ImportError::Layout {
            path: path.to_path_buf(),
            message: "no data rows".to_string(),
        });
    }

    // A point lacking one of the modes keeps NaN in that slot.
    let n_modes = mode_names.len();
    let counts: Vec<(String, usize)> = points
        .iter()
        .map(|p| (format!("operating point {}", p.label), p.modes.len()))
        .collect();
    let warning = counts
        .iter()
        .any(|(_, n)| *n != n_modes)
        .then_some(ImportWarning::PartialData {
            axis: "mode",
            kept: n_modes,
            counts,
        });

    let n_op = points.len();
    let damping_scale = if options.damping_is_ratio { 100.0 } else { 1.0 };

    let mut frequency = Array2::filled([n_op, n_modes], f64::NAN);
    let mut damping = Array2::filled([n_op, n_modes], f64::NAN);
    let mut participation_names: Vec<String> = Vec::new();
    for (op, point) in points.iter().enumerate() {
        for row in &point.modes {
            if row.frequency != UNTRACKED_FREQUENCY {
                frequency.set(op, row.mode, row.frequency);
                damping.set(op, row.mode, row.damping * damping_scale);
            }
            for (name, _, _) in &row.participation {
                if !participation_names.contains(name) {
                    participation_names.push(name.clone());
                }
            }
        }
    }

    let operating_rows: Vec<Vec<f64>> = points.iter().map(|p| p.parameters.clone()).collect();
    let mut builder = DatasetBuilder::new()
        .frequency(frequency)
        .damping(damping)
        .operating_points(
            columns.parameters.clone(),
            Array2::from_rows(&operating_rows, columns.parameters.len()).map_err(|source| ImportError::Schema {
                path: path.to_path_buf(),
                source,
            })?,
        )
        .modes(mode_names.iter().map(|n| AEMode::new(n.as_str())).collect())
        .attributes(attributes)
        .attribute("filename_summary", path.display().to_string())
        .attribute("imported_at", import_timestamp());

    if columns.participation.is_some() {
        let shape = [n_op, participation_names.len(), n_modes];
        let mut amplitude = Array3::zeros(shape);
        let mut phase = Array3::zeros(shape);
        for (op, point) in points.iter().enumerate() {
            for row in &point.modes {
                for (name, amp, ph) in &row.participation {
                    if let Some(p) = participation_names.iter().position(|n| n == name) {
                        amplitude.set(op, p, row.mode, *amp);
                        phase.set(op, p, row.mode, *ph);
                    }
                }
            }
        }
        builder = builder.participation(
            participation_names.iter().map(|n| AEMode::new(n.as_str())).collect(),
            amplitude,
            phase,
        );
    }

    let dataset = builder.build().map_err(|source| ImportError::Schema {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((dataset, warning.into_iter().collect()))
}

/// Read a Bladed linearisation summary file.
pub fn import(path: &Path, options: &BladedOptions) -> Result<(Dataset, Vec<ImportWarning>), ImportError> {
    let text = fs::read_to_string(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_summary(&text, path, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUMMARY: &str = "\
# ApplicationVersion: 4.9.0.1
# Project: demo

operating_point,wind speed [m/s],rot. speed [rpm],mode,frequency,damping,participation
0,4.0,6.0,1st Twr FA,0.2,0.01,\"Tower fore-aft 90% 0d, Blade 1 flap 10% 45d\"
0,4.0,6.0,1st BW edge,0.6,0.02,\"Blade 1 edge 100% 0d\"
1,6.0,6.5,1st Twr FA,0.21,0.011,\"Tower fore-aft 95% 0d\"
1,6.0,6.5,1st BW edge,-1,0.02,
";

    fn parse(text: &str) -> Result<(Dataset, Vec<ImportWarning>), ImportError> {
        parse_summary(text, Path::new("run.csv"), &BladedOptions::default())
    }

    #[test]
    fn summary_becomes_a_dataset() {
        let (ds, warnings) = parse(SUMMARY).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(ds.num_operating_points(), 2);
        assert_eq!(ds.num_modes(), 2);
        assert_eq!(ds.operating_parameters(), &["wind speed [m/s]", "rot. speed [rpm]"]);
        assert_eq!(ds.parameter_values("rot. speed [rpm]").unwrap(), vec![6.0, 6.5]);
        assert_eq!(ds.modes()[1].name, "1st BW edge");

        assert!((ds.damping().get(0, 0).unwrap() - 1.0).abs() < 1e-12);
        assert!(ds.frequency().get(1, 1).unwrap().is_nan());
        assert!(ds.damping().get(1, 1).unwrap().is_nan());

        let names: Vec<&str> = ds.participation_modes().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Tower fore-aft", "Blade 1 flap", "Blade 1 edge"]);
        let amp = ds.participation_factors_amp().unwrap();
        assert!((amp.get(0, 1, 0).unwrap() - 0.1).abs() < 1e-12);
        assert_eq!(ds.participation_factors_phase().unwrap().get(0, 1, 0), Some(45.0));
        assert_eq!(amp.get(1, 2, 1), Some(0.0));

        assert_eq!(ds.attributes()["ApplicationVersion"], "4.9.0.1");
    }

    #[test]
    fn untracked_point_is_nan_with_one_warning() {
        let text = SUMMARY.lines().take(7).collect::<Vec<_>>().join("\n");
        let (ds, warnings) = parse(&text).unwrap();
        assert_eq!(ds.num_modes(), 2);
        assert_eq!(ds.frequency().shape(), [2, 2]);
        assert_eq!(ds.mode_frequencies(0).unwrap(), vec![0.2, 0.21]);
        assert!(ds.frequency().get(1, 1).unwrap().is_nan());
        assert_eq!(warnings.len(), 1);
        assert!(matches!(&warnings[0], ImportWarning::PartialData { axis: "mode", kept: 2, .. }));
    }

    #[test]
    fn rows_are_placed_by_mode_name() {
        let text = "\
operating_point,wind speed [m/s],mode,frequency,damping
0,4,1st Twr FA,0.2,0.01
0,4,1st BW edge,0.6,0.02
1,6,1st BW edge,0.62,0.021
1,6,1st Twr FA,0.21,0.011
";
        let (ds, warnings) = parse(text).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(ds.modes()[0].name, "1st Twr FA");
        assert_eq!(ds.mode_frequencies(0).unwrap(), vec![0.2, 0.21]);
        assert_eq!(ds.mode_frequencies(1).unwrap(), vec![0.6, 0.62]);
    }

    #[test]
    fn missing_middle_mode_leaves_a_gap() {
        let text = "\
operating_point,wind speed [m/s],mode,frequency,damping,participation
0,4,1st Twr FA,0.2,0.01,\"Tower fore-aft 100% 0d\"
0,4,1st BW edge,0.6,0.02,\"Blade 1 edge 100% 0d\"
0,4,1st FW edge,0.8,0.02,\"Blade 1 edge 100% 10d\"
1,6,1st Twr FA,0.21,0.011,\"Tower fore-aft 100% 0d\"
1,6,1st FW edge,0.82,0.02,\"Blade 1 edge 100% 20d\"
";
        let (ds, warnings) = parse(text).unwrap();
        assert_eq!(ds.num_modes(), 3);
        assert_eq!(ds.mode_frequencies(0).unwrap(), vec![0.2, 0.21]);
        assert!(ds.frequency().get(1, 1).unwrap().is_nan());
        assert!(ds.damping().get(1, 1).unwrap().is_nan());
        assert_eq!(ds.mode_frequencies(2).unwrap(), vec![0.8, 0.82]);
        assert_eq!(ds.participation_factors_phase().unwrap().get(1, 1, 2), Some(20.0));
        assert_eq!(ds.participation_factors_amp().unwrap().get(1, 1, 1), Some(0.0));

        match warnings.as_slice() {
            [ImportWarning::PartialData { axis: "mode", kept: 3, counts }] => {
                assert_eq!(counts[1], ("operating point 1".to_string(), 2));
            }
            other => panic!("unexpected warnings: {other:?}"),
        }
    }

    #[test]
    fn mode_listed_twice_at_one_point_is_rejected() {
        let text = "operating_point,mode,frequency,damping\n0,Sym flap,0.7,0.05\n0,Sym flap,0.71,0.05\n";
        match parse(text) {
            Err(ImportError::Parse { line, message, .. }) => {
                assert_eq!(line, 3);
                assert!(message.contains("Sym flap"));
            }
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn result_columns_must_follow_the_mode_column() {
        let text = "operating_point,frequency,mode,damping\n0,0.7,Sym flap,0.05\n";
        match parse(text) {
            Err(ImportError::Layout { message, .. }) => assert!(message.contains("frequency")),
            other => panic!("expected a layout error, got {other:?}"),
        }
    }

    #[test]
    fn damping_can_be_taken_as_is() {
        let options = BladedOptions {
            damping_is_ratio: false,
            ..BladedOptions::default()
        };
        let (ds, _) = parse_summary(SUMMARY, Path::new("run.csv"), &options).unwrap();
        assert_eq!(ds.damping().get(0, 1), Some(0.02));
    }

    #[test]
    fn semicolon_exports_without_participation() {
        let text = "operating_point;wind speed [m/s];mode;frequency;damping\n0;5;Sym flap;0.7;0.05\n";
        let options = BladedOptions {
            delimiter: ';',
            ..BladedOptions::default()
        };
        let (ds, _) = parse_summary(text, Path::new("run.csv"), &options).unwrap();
        assert!(ds.participation().is_none());
        assert_eq!(ds.frequency().get(0, 0), Some(0.7));
    }

    #[test]
    fn malformed_input_is_reported_with_its_line() {
        let missing = "operating_point,wind speed [m/s],frequency,damping\n0,4,0.2,0.01\n";
        assert!(matches!(parse(missing), Err(ImportError::Layout { .. })));

        let bad_amp = SUMMARY.replace("10% 45d", "ten% 45d");
        match parse(&bad_amp) {
            Err(ImportError::Parse { line, message, .. }) => {
                assert_eq!(line, 5);
                assert!(message.contains("ten%"));
            }
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn participation_entries_keep_multi_word_names() {
        let entries = parse_participation("Blade 1 1st edge 12.5% -30d,", Path::new("x"), 1).unwrap();
        assert_eq!(entries, vec![("Blade 1 1st edge".to_string(), 0.125, -30.0)]);
        assert!(parse_participation("edge 10%", Path::new("x"), 1).is_err());
    }
}
