use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

// ---------------------------------------------------------------------------
// Mode classification labels
// ---------------------------------------------------------------------------

macro_rules! label_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = SchemaError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(SchemaError::InvalidLabel(format!(
                        "'{other}' is not a valid {}",
                        stringify!($name)
                    ))),
                }
            }
        }
    };
}

label_enum!(SymmetryType {
    Symmetric => "symmetric",
    Asymmetric => "asymmetric",
});

label_enum!(WhirlType {
    Forward => "FW",
    Backward => "BW",
});

label_enum!(TurbineComponent {
    Tower => "tower",
    Drivetrain => "drivetrain",
    Blade => "blade",
});

label_enum!(BladeModeType {
    Edge => "edge",
    Flap => "flap",
    Torsion => "torsion",
});

// ---------------------------------------------------------------------------
// AEMode – one aeroelastic mode descriptor
// ---------------------------------------------------------------------------

/// Aeroelastic mode: a label plus optional classification.
///
/// Its index is its position in the owning mode list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AEMode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symmetry_type: Option<SymmetryType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whirl_type: Option<WhirlType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wt_component: Option<TurbineComponent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blade_mode_type: Option<BladeModeType>,
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

impl AEMode {
    /// A mode with every unset label inferred from its name.
    pub fn new(name: impl Into<String>) -> Self {
        let mut mode = AEMode {
            name: name.into(),
            ..AEMode::default()
        };
        mode.categorize();
        mode
    }

    /// Fill the labels that are still unset from keywords in the name.
    pub fn categorize(&mut self) {
        let name = self.name.to_lowercase();

        if self.symmetry_type.is_none() {
            if contains_any(&name, &["sym", "symmetric", "collective"]) {
                self.symmetry_type = Some(SymmetryType::Symmetric);
            } else if contains_any(&name, &["fw", "bw", "forward whirl", "backward whirl", "cyclic"]) {
                self.symmetry_type = Some(SymmetryType::Asymmetric);
            }
        }

        if self.whirl_type.is_none() {
            if contains_any(&name, &["fw", "forward whirl"]) {
                self.whirl_type = Some(WhirlType::Forward);
            } else if contains_any(&name, &["bw", "backward whirl"]) {
                self.whirl_type = Some(WhirlType::Backward);
            }
        }

        if self.wt_component.is_none() {
            if contains_any(&name, &["twr", "tower"]) {
                self.wt_component = Some(TurbineComponent::Tower);
            } else if contains_any(&name, &["drivetrain", "drvtrn"]) {
                self.wt_component = Some(TurbineComponent::Drivetrain);
            } else if contains_any(
                &name,
                &[
                    "rotor", "blade", "bw", "fw", "backward whirl", "forward whirl", "edge", "flap",
                    "edgewise", "flapwise",
                ],
            ) {
                self.wt_component = Some(TurbineComponent::Blade);
            }
        }

        if self.blade_mode_type.is_none() {
            if name.contains("edge") {
                self.blade_mode_type = Some(BladeModeType::Edge);
            } else if name.contains("flap") {
                self.blade_mode_type = Some(BladeModeType::Flap);
            } else if name.contains("tors") {
                self.blade_mode_type = Some(BladeModeType::Torsion);
            }
        }
    }

    /// Multi-line description for tooltips.
    pub fn summary(&self) -> String {
        fn show<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map(ToString::to_string).unwrap_or_default()
        }
        format!(
            "Name: {}\nSymmetry type: {}\nWhirl type: {}\nWT component: {}\nBlade mode type: {}",
            self.name,
            show(&self.symmetry_type),
            show(&self.whirl_type),
            show(&self.wt_component),
            show(&self.blade_mode_type),
        )
    }
}

// ---------------------------------------------------------------------------
// Dense numeric arrays
// ---------------------------------------------------------------------------

fn bitwise_eq(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}

/// Row-major 2-D array.
///
/// Equality is bitwise so that NaN placeholders compare equal to themselves.
#[derive(Debug, Clone, Default)]
pub struct Array2 {
    shape: [usize; 2],
    data: Vec<f64>,
}

impl PartialEq for Array2 {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && bitwise_eq(&self.data, &other.data)
    }
}

impl Array2 {
    pub fn new(shape: [usize; 2], data: Vec<f64>) -> Result<Self, SchemaError> {
        let expected = shape[0] * shape[1];
        if data.len() != expected {
            return Err(SchemaError::DataLength {
                shape: shape.to_vec(),
                expected,
                found: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn filled(shape: [usize; 2], value: f64) -> Self {
        Self {
            shape,
            data: vec![value; shape[0] * shape[1]],
        }
    }

    /// Build from rows of equal length. `cols` is used when `rows` is empty.
    pub fn from_rows(rows: &[Vec<f64>], cols: usize) -> Result<Self, SchemaError> {
        let cols = rows.first().map_or(cols, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(SchemaError::DataLength {
                    shape: vec![rows.len(), cols],
                    expected: cols,
                    found: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            shape: [rows.len(), cols],
            data,
        })
    }

    pub fn shape(&self) -> [usize; 2] {
        self.shape
    }

    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    pub fn cols(&self) -> usize {
        self.shape[1]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.shape[0] || col >= self.shape[1] {
            return None;
        }
        Some(self.data[row * self.shape[1] + col])
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        let cols = self.shape[1];
        self.data[row * cols + col] = value;
    }

    pub fn row(&self, row: usize) -> Option<&[f64]> {
        if row >= self.shape[0] {
            return None;
        }
        let cols = self.shape[1];
        Some(&self.data[row * cols..(row + 1) * cols])
    }

    pub fn column(&self, col: usize) -> Option<Vec<f64>> {
        if col >= self.shape[1] {
            return None;
        }
        Some((0..self.shape[0]).map(|r| self.data[r * self.shape[1] + col]).collect())
    }

    /// Keep the first `rows` rows and `cols` columns.
    pub fn truncated(&self, rows: usize, cols: usize) -> Self {
        let rows = rows.min(self.shape[0]);
        let cols = cols.min(self.shape[1]);
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            data.extend_from_slice(&self.data[r * self.shape[1]..r * self.shape[1] + cols]);
        }
        Self {
            shape: [rows, cols],
            data,
        }
    }

    /// Keep only the listed columns, in the given order.
    pub fn select_columns(&self, keep: &[usize]) -> Self {
        let mut data = Vec::with_capacity(self.shape[0] * keep.len());
        for r in 0..self.shape[0] {
            for &c in keep {
                data.push(self.data[r * self.shape[1] + c]);
            }
        }
        Self {
            shape: [self.shape[0], keep.len()],
            data,
        }
    }
}

/// Row-major 3-D array, `[operating_point, participation_mode, mode]`.
#[derive(Debug, Clone, Default)]
pub struct Array3 {
    shape: [usize; 3],
    data: Vec<f64>,
}

impl PartialEq for Array3 {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && bitwise_eq(&self.data, &other.data)
    }
}

impl Array3 {
    pub fn new(shape: [usize; 3], data: Vec<f64>) -> Result<Self, SchemaError> {
        let expected = shape.iter().product();
        if data.len() != expected {
            return Err(SchemaError::DataLength {
                shape: shape.to_vec(),
                expected,
                found: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: [usize; 3]) -> Self {
        Self {
            shape,
            data: vec![0.0; shape.iter().product()],
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    fn offset(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.shape[1] + j) * self.shape[2] + k
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> Option<f64> {
        if i >= self.shape[0] || j >= self.shape[1] || k >= self.shape[2] {
            return None;
        }
        Some(self.data[self.offset(i, j, k)])
    }

    pub fn set(&mut self, i: usize, j: usize, k: usize, value: f64) {
        let at = self.offset(i, j, k);
        self.data[at] = value;
    }

    /// Keep the first `n0` × `n1` × `n2` block.
    pub fn truncated(&self, n0: usize, n1: usize, n2: usize) -> Self {
        let [n0, n1, n2] = [
            n0.min(self.shape[0]),
            n1.min(self.shape[1]),
            n2.min(self.shape[2]),
        ];
        let mut data = Vec::with_capacity(n0 * n1 * n2);
        for i in 0..n0 {
            for j in 0..n1 {
                let start = self.offset(i, j, 0);
                data.extend_from_slice(&self.data[start..start + n2]);
            }
        }
        Self {
            shape: [n0, n1, n2],
            data,
        }
    }

    /// Keep only the listed indices of the last axis.
    pub fn select_last(&self, keep: &[usize]) -> Self {
        let mut data = Vec::with_capacity(self.shape[0] * self.shape[1] * keep.len());
        for i in 0..self.shape[0] {
            for j in 0..self.shape[1] {
                for &k in keep {
                    data.push(self.data[self.offset(i, j, k)]);
                }
            }
        }
        Self {
            shape: [self.shape[0], self.shape[1], keep.len()],
            data,
        }
    }
}

// ---------------------------------------------------------------------------
// Participation block
// ---------------------------------------------------------------------------

/// Participation factors of the uncoupled modes in every coupled mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Participation {
    pub modes: Vec<AEMode>,
    pub amplitude: Array3,
    pub phase: Array3,
}

// ---------------------------------------------------------------------------
// OperatingPoint – borrowed row view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatingPoint<'a> {
    pub index: usize,
    pub values: &'a [f64],
    pub parameters: &'a [String],
}

impl<'a> OperatingPoint<'a> {
    pub fn value(&self, parameter: &str) -> Option<f64> {
        let col = self.parameters.iter().position(|p| p == parameter)?;
        self.values.get(col).copied()
    }
}

// ---------------------------------------------------------------------------
// Dataset – canonical, tool-agnostic result set
// ---------------------------------------------------------------------------

/// One imported simulation case. Only [`DatasetBuilder::build`] creates one,
/// so every `Dataset` satisfies the axis invariants.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    frequency: Array2,
    damping: Array2,
    realpart: Option<Array2>,
    participation: Option<Participation>,
    operating_points: Array2,
    operating_parameters: Vec<String>,
    modes: Vec<AEMode>,
    attributes: BTreeMap<String, String>,
}

impl Dataset {
    pub fn frequency(&self) -> &Array2 {
        &self.frequency
    }

    pub fn damping(&self) -> &Array2 {
        &self.damping
    }

    pub fn realpart(&self) -> Option<&Array2> {
        self.realpart.as_ref()
    }

    pub fn participation(&self) -> Option<&Participation> {
        self.participation.as_ref()
    }

    pub fn participation_factors_amp(&self) -> Option<&Array3> {
        self.participation.as_ref().map(|p| &p.amplitude)
    }

    pub fn participation_factors_phase(&self) -> Option<&Array3> {
        self.participation.as_ref().map(|p| &p.phase)
    }

    /// Empty when the dataset carries no participation data.
    pub fn participation_modes(&self) -> &[AEMode] {
        self.participation
            .as_ref()
            .map(|p| p.modes.as_slice())
            .unwrap_or(&[])
    }

    pub fn operating_points(&self) -> &Array2 {
        &self.operating_points
    }

    pub fn operating_parameters(&self) -> &[String] {
        &self.operating_parameters
    }

    pub fn modes(&self) -> &[AEMode] {
        &self.modes
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn num_operating_points(&self) -> usize {
        self.operating_points.rows()
    }

    pub fn num_modes(&self) -> usize {
        self.modes.len()
    }

    pub fn num_participation_modes(&self) -> usize {
        self.participation_modes().len()
    }

    pub fn operating_point(&self, index: usize) -> Option<OperatingPoint<'_>> {
        Some(OperatingPoint {
            index,
            values: self.operating_points.row(index)?,
            parameters: &self.operating_parameters,
        })
    }

    /// One column of the operating-point table, e.g. the Campbell x-axis.
    pub fn parameter_values(&self, parameter: &str) -> Option<Vec<f64>> {
        let col = self.operating_parameters.iter().position(|p| p == parameter)?;
        self.operating_points.column(col)
    }

    pub fn mode_frequencies(&self, mode: usize) -> Option<Vec<f64>> {
        self.frequency.column(mode)
    }

    pub fn mode_dampings(&self, mode: usize) -> Option<Vec<f64>> {
        self.damping.column(mode)
    }

    /// A copy without the given coupled modes; remaining modes are re-indexed.
    pub fn without_modes(&self, remove: &[usize]) -> Result<Dataset, SchemaError> {
        if let Some(&bad) = remove.iter().find(|&&m| m >= self.modes.len()) {
            return Err(SchemaError::ModeOutOfRange {
                index: bad,
                len: self.modes.len(),
            });
        }
        let keep: Vec<usize> = (0..self.modes.len()).filter(|m| !remove.contains(m)).collect();

        let mut builder = DatasetBuilder::new()
            .frequency(self.frequency.select_columns(&keep))
            .damping(self.damping.select_columns(&keep))
            .operating_points(self.operating_parameters.clone(), self.operating_points.clone())
            .modes(keep.iter().map(|&m| self.modes[m].clone()).collect())
            .attributes(self.attributes.clone());
        if let Some(realpart) = &self.realpart {
            builder = builder.realpart(realpart.select_columns(&keep));
        }
        if let Some(p) = &self.participation {
            builder = builder.participation(
                p.modes.clone(),
                p.amplitude.select_last(&keep),
                p.phase.select_last(&keep),
            );
        }
        builder.build()
    }

    pub fn into_builder(self) -> DatasetBuilder {
        let mut builder = DatasetBuilder {
            frequency: Some(self.frequency),
            damping: Some(self.damping),
            realpart: self.realpart,
            operating_points: Some((self.operating_parameters, self.operating_points)),
            modes: Some(self.modes),
            attributes: self.attributes,
            ..DatasetBuilder::default()
        };
        if let Some(p) = self.participation {
            builder.participation_modes = Some(p.modes);
            builder.participation_amp = Some(p.amplitude);
            builder.participation_phase = Some(p.phase);
        }
        builder
    }
}

// ---------------------------------------------------------------------------
// DatasetBuilder – partial population during import
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct DatasetBuilder {
    frequency: Option<Array2>,
    damping: Option<Array2>,
    realpart: Option<Array2>,
    participation_modes: Option<Vec<AEMode>>,
    participation_amp: Option<Array3>,
    participation_phase: Option<Array3>,
    operating_points: Option<(Vec<String>, Array2)>,
    modes: Option<Vec<AEMode>>,
    attributes: BTreeMap<String, String>,
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frequency(mut self, frequency: Array2) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn damping(mut self, damping: Array2) -> Self {
        self.damping = Some(damping);
        self
    }

    pub fn realpart(mut self, realpart: Array2) -> Self {
        self.realpart = Some(realpart);
        self
    }

    pub fn participation(mut self, modes: Vec<AEMode>, amplitude: Array3, phase: Array3) -> Self {
        self.participation_modes = Some(modes);
        self.participation_amp = Some(amplitude);
        self.participation_phase = Some(phase);
        self
    }

    pub fn participation_modes(mut self, modes: Vec<AEMode>) -> Self {
        self.participation_modes = Some(modes);
        self
    }

    pub fn participation_amp(mut self, amplitude: Array3) -> Self {
        self.participation_amp = Some(amplitude);
        self
    }

    pub fn participation_phase(mut self, phase: Array3) -> Self {
        self.participation_phase = Some(phase);
        self
    }

    pub fn operating_points(mut self, parameters: Vec<String>, values: Array2) -> Self {
        self.operating_points = Some((parameters, values));
        self
    }

    pub fn modes(mut self, modes: Vec<AEMode>) -> Self {
        self.modes = Some(modes);
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Validate the axes and produce the immutable dataset.
    pub fn build(self) -> Result<Dataset, SchemaError> {
        let frequency = self.frequency.ok_or(SchemaError::MissingArray("frequency"))?;
        let damping = self.damping.ok_or(SchemaError::MissingArray("damping"))?;
        let (operating_parameters, operating_points) = self
            .operating_points
            .ok_or(SchemaError::MissingArray("operating_points"))?;
        let modes = self.modes.ok_or(SchemaError::MissingArray("modes"))?;

        let n_op = operating_points.rows();
        let n_modes = modes.len();

        check_shape("operating_points", &operating_points.shape(), &[n_op, operating_parameters.len()])?;
        check_shape("frequency", &frequency.shape(), &[n_op, n_modes])?;
        check_shape("damping", &damping.shape(), &[n_op, n_modes])?;
        if let Some(realpart) = &self.realpart {
            check_shape("realpart", &realpart.shape(), &[n_op, n_modes])?;
        }

        let participation = match (
            self.participation_modes,
            self.participation_amp,
            self.participation_phase,
        ) {
            (None, None, None) => None,
            (Some(pmodes), Some(amplitude), Some(phase)) => {
                let expected = [n_op, pmodes.len(), n_modes];
                check_shape("participation_factors_amp", &amplitude.shape(), &expected)?;
                check_shape("participation_factors_phase", &phase.shape(), &expected)?;
                Some(Participation {
                    modes: pmodes,
                    amplitude,
                    phase,
                })
            }
            _ => return Err(SchemaError::IncompleteParticipation),
        };

        Ok(Dataset {
            frequency,
            damping,
            realpart: self.realpart,
            participation,
            operating_points,
            operating_parameters,
            modes,
            attributes: self.attributes,
        })
    }
}

fn check_shape(array: &'static str, found: &[usize], expected: &[usize]) -> Result<(), SchemaError> {
    if found != expected {
        return Err(SchemaError::ShapeMismatch {
            array,
            expected: expected.to_vec(),
            found: found.to_vec(),
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Three operating points, two modes, one participation mode.
    pub(crate) fn sample_dataset() -> Dataset {
        DatasetBuilder::new()
            .frequency(Array2::from_rows(&[vec![0.2, 0.6], vec![0.21, 0.62], vec![0.22, 0.65]], 2).unwrap())
            .damping(Array2::from_rows(&[vec![1.0, 2.0], vec![1.1, f64::NAN], vec![1.2, 2.2]], 2).unwrap())
            .operating_points(
                vec!["wind speed [m/s]".into(), "rot. speed [rpm]".into()],
                Array2::from_rows(&[vec![4.0, 5.0], vec![6.0, 6.5], vec![8.0, 7.5]], 2).unwrap(),
            )
            .modes(vec![AEMode::new("1st Twr FA"), AEMode::new("1st BW edge")])
            .participation(
                vec![AEMode::new("TWR FA")],
                Array3::new([3, 1, 2], vec![0.9, 0.1, 0.8, 0.2, 0.85, 0.15]).unwrap(),
                Array3::zeros([3, 1, 2]),
            )
            .attribute("source", "unit test")
            .build()
            .unwrap()
    }

    #[test]
    fn categorizes_modes_from_their_names() {
        let bw = AEMode::new("1st BW edge");
        assert_eq!(bw.symmetry_type, Some(SymmetryType::Asymmetric));
        assert_eq!(bw.whirl_type, Some(WhirlType::Backward));
        assert_eq!(bw.wt_component, Some(TurbineComponent::Blade));
        assert_eq!(bw.blade_mode_type, Some(BladeModeType::Edge));

        let tower = AEMode::new("TWR SS");
        assert_eq!(tower.wt_component, Some(TurbineComponent::Tower));
        assert_eq!(tower.symmetry_type, None);

        let sym = AEMode::new("Sym tors");
        assert_eq!(sym.symmetry_type, Some(SymmetryType::Symmetric));
        assert_eq!(sym.blade_mode_type, Some(BladeModeType::Torsion));
        assert_eq!(sym.wt_component, None);
    }

    #[test]
    fn explicit_labels_are_kept() {
        let mut mode = AEMode {
            name: "1st FW flap".into(),
            wt_component: Some(TurbineComponent::Drivetrain),
            ..AEMode::default()
        };
        mode.categorize();
        assert_eq!(mode.wt_component, Some(TurbineComponent::Drivetrain));
        assert_eq!(mode.whirl_type, Some(WhirlType::Forward));
        assert!(mode.summary().contains("WT component: drivetrain"));
    }

    #[test]
    fn builder_enforces_axis_lengths() {
        let err = DatasetBuilder::new()
            .frequency(Array2::filled([3, 2], 0.0))
            .damping(Array2::filled([2, 2], 0.0))
            .operating_points(vec!["ws".into()], Array2::filled([3, 1], 0.0))
            .modes(vec![AEMode::new("a"), AEMode::new("b")])
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::ShapeMismatch {
                array: "damping",
                expected: vec![3, 2],
                found: vec![2, 2],
            }
        );
    }

    #[test]
    fn builder_requires_complete_participation() {
        let err = sample_dataset()
            .into_builder()
            .participation_modes(vec![])
            .participation_amp(Array3::zeros([3, 0, 2]))
            .build()
            .unwrap_err();
        // Phase still has one participation mode.
        assert!(matches!(err, SchemaError::ShapeMismatch { array: "participation_factors_phase", .. }));

        let err = DatasetBuilder {
            participation_phase: None,
            ..sample_dataset().into_builder()
        }
        .build()
        .unwrap_err();
        assert_eq!(err, SchemaError::IncompleteParticipation);
    }

    #[test]
    fn missing_required_array_is_reported() {
        let err = DatasetBuilder::new().build().unwrap_err();
        assert_eq!(err, SchemaError::MissingArray("frequency"));
    }

    #[test]
    fn nan_placeholders_compare_equal() {
        assert_eq!(sample_dataset(), sample_dataset());
    }

    #[test]
    fn removing_modes_reindexes_every_axis() {
        let ds = sample_dataset();
        let reduced = ds.without_modes(&[0]).unwrap();

        assert_eq!(reduced.num_modes(), 1);
        assert_eq!(reduced.modes()[0].name, "1st BW edge");
        assert_eq!(reduced.frequency().shape(), [3, 1]);
        assert_eq!(reduced.mode_frequencies(0).unwrap(), vec![0.6, 0.62, 0.65]);
        assert_eq!(reduced.participation_factors_amp().unwrap().shape(), [3, 1, 1]);
        assert_eq!(reduced.participation_factors_amp().unwrap().get(1, 0, 0), Some(0.2));

        assert!(matches!(
            ds.without_modes(&[5]),
            Err(SchemaError::ModeOutOfRange { index: 5, len: 2 })
        ));
    }

    #[test]
    fn operating_point_views() {
        let ds = sample_dataset();
        let op = ds.operating_point(2).unwrap();
        assert_eq!(op.index, 2);
        assert_eq!(op.value("rot. speed [rpm]"), Some(7.5));
        assert!(ds.operating_point(3).is_none());
        assert_eq!(ds.parameter_values("wind speed [m/s]").unwrap(), vec![4.0, 6.0, 8.0]);
    }

    #[test]
    fn truncation_keeps_the_leading_block() {
        let a = Array2::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]], 3).unwrap();
        let t = a.truncated(1, 2);
        assert_eq!(t.shape(), [1, 2]);
        assert_eq!(t.as_slice(), &[1.0, 2.0]);

        let b = Array3::new([2, 2, 2], (0..8).map(|v| v as f64).collect()).unwrap();
        let t = b.truncated(1, 2, 1);
        assert_eq!(t.as_slice(), &[0.0, 2.0]);
    }
}
