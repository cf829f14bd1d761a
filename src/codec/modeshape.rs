//! HAWCStab2 binary mode-shape reader.
//!
//! Stream layout (every line is one Fortran record):
//! ```text
//!  n_substructures                        ← record length = format version tag
//!  per substructure:  n_bodies
//!    per body:        n_elements
//!                     s                   (n_elements single-real records)
//!  n_modes, n_states
//!  per state:         parameter
//!                     wind speed, pitch [rad], power
//!    per substructure → per mode → per body:
//!                     shape record(s)     (re, im) pairs, 6 DOFs per node
//! ```
//! The first two substructures (ground fixed, rotating axisymmetric) carry one
//! shape record per body; every later one is a three-bladed rotor in
//! multi-blade coordinates and carries three (`a0`, `a1`, `b1`).
//!
//! The decoded hierarchy lives in flat arenas linked by index.

use std::fmt;
use std::ops::Range;

use log::debug;

use super::fortran::RecordReader;
use super::record::Endian;
use crate::error::DecodeError;

/// Degrees of freedom per structural node: three translations, three rotations.
pub const DOFS_PER_NODE: usize = 6;

// ---------------------------------------------------------------------------
// Format version
// ---------------------------------------------------------------------------

/// Integer kind the file was written with.
///
/// HAWCStab2 writes no explicit version field: the length of the very first
/// record (the substructure count) identifies the layout of every later
/// integer record. Unknown lengths are rejected rather than guessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    Int32,
    Int64,
}

impl FormatVersion {
    pub fn from_tag(tag: i32) -> Result<Self, DecodeError> {
        match tag {
            4 => Ok(FormatVersion::Int32),
            8 => Ok(FormatVersion::Int64),
            other => Err(DecodeError::UnsupportedFormatVersion {
                tag: i64::from(other),
            }),
        }
    }

    pub fn tag(self) -> i32 {
        self.integer_width() as i32
    }

    pub fn integer_width(self) -> usize {
        match self {
            FormatVersion::Int32 => 4,
            FormatVersion::Int64 => 8,
        }
    }
}

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstructureKind {
    GroundFixed,
    RotatingAxisymmetric,
    RotatingThreeBladed,
}

impl SubstructureKind {
    /// The kind is implied by the substructure's position in the file.
    pub fn from_position(index: usize) -> Self {
        match index {
            0 => SubstructureKind::GroundFixed,
            1 => SubstructureKind::RotatingAxisymmetric,
            _ => SubstructureKind::RotatingThreeBladed,
        }
    }

    pub fn harmonics(self) -> &'static [Harmonic] {
        match self {
            SubstructureKind::GroundFixed | SubstructureKind::RotatingAxisymmetric => {
                &[Harmonic::A0]
            }
            SubstructureKind::RotatingThreeBladed => &[Harmonic::A0, Harmonic::A1, Harmonic::B1],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SubstructureKind::GroundFixed => "tower",
            SubstructureKind::RotatingAxisymmetric => "shaft",
            SubstructureKind::RotatingThreeBladed => "blade",
        }
    }
}

/// Multi-blade coordinate component of a shape record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Harmonic {
    /// Collective.
    A0,
    /// Cosine cyclic.
    A1,
    /// Sine cyclic.
    B1,
}

impl fmt::Display for Harmonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Harmonic::A0 => write!(f, "a0"),
            Harmonic::A1 => write!(f, "a1"),
            Harmonic::B1 => write!(f, "b1"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Substructure {
    pub kind: SubstructureKind,
    /// Index of the first body in [`ModeShapeFile::bodies`].
    pub first_body: usize,
    pub num_bodies: usize,
}

impl Substructure {
    pub fn body_range(&self) -> Range<usize> {
        self.first_body..self.first_body + self.num_bodies
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub substructure: usize,
    /// Position within the owning substructure.
    pub local_index: usize,
    /// Arc-length positions of the element end nodes.
    pub arc_positions: Vec<f64>,
}

impl Body {
    pub fn num_nodes(&self) -> usize {
        self.arc_positions.len() + 1
    }

    pub fn num_dofs(&self) -> usize {
        self.num_nodes() * DOFS_PER_NODE
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatingState {
    /// Driving parameter of the state (wind or rotor speed).
    pub parameter: f64,
    pub wind_speed: f64,
    pub pitch_deg: f64,
    pub power: f64,
}

/// One (body, harmonic) pair; the unit participation factors are computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    pub substructure: usize,
    pub body: usize,
    pub harmonic: Harmonic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ShapeBlock {
    /// Offset into the coefficient buffer, in reals.
    offset: usize,
    dofs: usize,
}

// ---------------------------------------------------------------------------
// Complex coefficients
// ---------------------------------------------------------------------------

/// One complex shape coefficient, always derived from the stored pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficient {
    pub re: f64,
    pub im: f64,
}

impl Coefficient {
    pub fn magnitude(self) -> f64 {
        self.re.hypot(self.im)
    }

    /// Phase in radians.
    pub fn phase(self) -> f64 {
        self.im.atan2(self.re)
    }

    pub fn phase_deg(self) -> f64 {
        self.phase().to_degrees()
    }

    pub fn norm_sqr(self) -> f64 {
        self.re * self.re + self.im * self.im
    }
}

/// Borrowed view on the coefficients of one body for one mode and state.
#[derive(Debug, Clone, Copy)]
pub struct ModeShape<'a> {
    pairs: &'a [f64],
}

impl<'a> ModeShape<'a> {
    pub fn num_dofs(&self) -> usize {
        self.pairs.len() / 2
    }

    pub fn coefficient(&self, dof: usize) -> Option<Coefficient> {
        let re = *self.pairs.get(2 * dof)?;
        let im = *self.pairs.get(2 * dof + 1)?;
        Some(Coefficient { re, im })
    }

    pub fn coefficients(&self) -> impl Iterator<Item = Coefficient> + 'a {
        self.pairs
            .chunks_exact(2)
            .map(|pair| Coefficient { re: pair[0], im: pair[1] })
    }

    pub fn magnitudes(&self) -> impl Iterator<Item = f64> + 'a {
        self.coefficients().map(Coefficient::magnitude)
    }

    pub fn phases(&self) -> impl Iterator<Item = f64> + 'a {
        self.coefficients().map(Coefficient::phase)
    }

    pub fn energy(&self) -> f64 {
        self.coefficients().map(Coefficient::norm_sqr).sum()
    }

    /// The coefficient with the largest magnitude.
    pub fn dominant(&self) -> Option<Coefficient> {
        self.coefficients()
            .max_by(|a, b| a.magnitude().total_cmp(&b.magnitude()))
    }
}

// ---------------------------------------------------------------------------
// ModeShapeFile – decoded arena
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ModeShapeFile {
    version: FormatVersion,
    substructures: Vec<Substructure>,
    bodies: Vec<Body>,
    components: Vec<Component>,
    states: Vec<OperatingState>,
    num_modes: usize,
    /// Indexed by `(state * num_modes + mode) * components.len() + component`.
    blocks: Vec<ShapeBlock>,
    /// Raw (re, im) pairs, sign convention already applied.
    coefficients: Vec<f64>,
}

impl ModeShapeFile {
    pub fn version(&self) -> FormatVersion {
        self.version
    }

    pub fn substructures(&self) -> &[Substructure] {
        &self.substructures
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn states(&self) -> &[OperatingState] {
        &self.states
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn num_modes(&self) -> usize {
        self.num_modes
    }

    pub fn shape(&self, state: usize, mode: usize, component: usize) -> Option<ModeShape<'_>> {
        if state >= self.states.len() || mode >= self.num_modes || component >= self.components.len() {
            return None;
        }
        let index = (state * self.num_modes + mode) * self.components.len() + component;
        let block = self.blocks.get(index)?;
        Some(ModeShape {
            pairs: &self.coefficients[block.offset..block.offset + 2 * block.dofs],
        })
    }

    /// Shape of a body addressed by its global index and harmonic.
    pub fn body_shape(
        &self,
        state: usize,
        mode: usize,
        body: usize,
        harmonic: Harmonic,
    ) -> Option<ModeShape<'_>> {
        let component = self
            .components
            .iter()
            .position(|c| c.body == body && c.harmonic == harmonic)?;
        self.shape(state, mode, component)
    }

    /// Human-readable name of a component, e.g. `blade body 2 a1`.
    pub fn component_label(&self, component: usize) -> Option<String> {
        let c = self.components.get(component)?;
        let sub = &self.substructures[c.substructure];
        let body = &self.bodies[c.body];
        let base = format!("{} body {}", sub.kind.label(), body.local_index + 1);
        Some(match sub.kind {
            SubstructureKind::RotatingThreeBladed => format!("{base} {}", c.harmonic),
            _ => base,
        })
    }

    /// Share of each component in one mode: `(amplitude, phase_deg)` per
    /// component, amplitude being the root of its fraction of the mode energy.
    pub fn participation(&self, state: usize, mode: usize) -> Option<Vec<(f64, f64)>> {
        let shapes: Vec<ModeShape<'_>> = (0..self.components.len())
            .map(|c| self.shape(state, mode, c))
            .collect::<Option<_>>()?;
        let energies: Vec<f64> = shapes.iter().map(ModeShape::energy).collect();
        let total: f64 = energies.iter().sum();

        Some(
            shapes
                .iter()
                .zip(&energies)
                .map(|(shape, &energy)| {
                    let amplitude = if total > 0.0 { (energy / total).sqrt() } else { 0.0 };
                    let phase = shape.dominant().map(Coefficient::phase_deg).unwrap_or(0.0);
                    (amplitude, phase)
                })
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a complete mode-shape stream.
///
/// Either the whole hierarchy is returned or an error; nothing partial.
pub fn decode(bytes: &[u8], endian: Endian) -> Result<ModeShapeFile, DecodeError> {
    let mut reader = RecordReader::new(bytes, endian);

    let version = FormatVersion::from_tag(reader.peek_marker()?)?;
    let int_width = version.integer_width();
    debug!("mode-shape stream: {} bytes, {version:?}", bytes.len());

    // ---- Turbine structure ----
    let num_substructures = to_count(
        reader.read_integers(1, int_width)?[0],
        "substructure count",
    )?;
    let mut substructures = Vec::new();
    let mut bodies = Vec::new();

    for isub in 0..num_substructures {
        ensure_more(&reader, "substructures", num_substructures, isub)?;
        let num_bodies = to_count(reader.read_integers(1, int_width)?[0], "body count")?;
        let first_body = bodies.len();

        for ibody in 0..num_bodies {
            ensure_more(&reader, "bodies", num_bodies, ibody)?;
            let num_elements = to_count(reader.read_integers(1, int_width)?[0], "element count")?;
            let mut arc_positions = Vec::new();
            for _ in 0..num_elements {
                reader.read_reals_into(1, &mut arc_positions)?;
            }
            bodies.push(Body {
                substructure: isub,
                local_index: ibody,
                arc_positions,
            });
        }

        substructures.push(Substructure {
            kind: SubstructureKind::from_position(isub),
            first_body,
            num_bodies,
        });
    }

    let components = build_components(&substructures);

    // ---- Operating states ----
    ensure_more(&reader, "mode/state header", 1, 0)?;
    let info = reader.read_integers(2, int_width)?;
    let num_modes = to_count(info[0], "mode count")?;
    let num_states = to_count(info[1], "operating state count")?;
    debug!(
        "{} substructures, {} bodies, {num_modes} modes, {num_states} states",
        substructures.len(),
        bodies.len()
    );

    let mut states = Vec::new();
    let mut coefficients = Vec::new();
    let mut placed: Vec<(usize, ShapeBlock)> = Vec::new();

    for istate in 0..num_states {
        ensure_more(&reader, "operating states", num_states, istate)?;
        let parameter = reader.read_reals(1)?[0];
        let op = reader.read_reals(3)?;
        states.push(OperatingState {
            parameter,
            wind_speed: op[0],
            pitch_deg: (-op[1]).to_degrees(),
            power: op[2],
        });

        let mut first_component = 0;
        for sub in &substructures {
            let harmonics = sub.kind.harmonics();
            for imode in 0..num_modes {
                for local in 0..sub.num_bodies {
                    let dofs = bodies[sub.first_body + local].num_dofs();
                    for ih in 0..harmonics.len() {
                        let offset = coefficients.len();
                        reader.read_reals_into(2 * dofs, &mut coefficients)?;
                        // HAWCStab2 writes shapes with the opposite sign.
                        for v in &mut coefficients[offset..] {
                            *v = -*v;
                        }
                        let component = first_component + local * harmonics.len() + ih;
                        let slot = (istate * num_modes + imode) * components.len() + component;
                        placed.push((slot, ShapeBlock { offset, dofs }));
                    }
                }
            }
            first_component += sub.num_bodies * harmonics.len();
        }
    }

    if !reader.is_at_end() {
        return Err(DecodeError::StructuralCountMismatch {
            context: "bytes after the last operating state",
            declared: 0,
            found: reader.remaining() as i64,
        });
    }

    // Every slot is read exactly once, so sorting by slot yields a dense table.
    placed.sort_by_key(|(slot, _)| *slot);
    let blocks = placed.into_iter().map(|(_, block)| block).collect();

    Ok(ModeShapeFile {
        version,
        substructures,
        bodies,
        components,
        states,
        num_modes,
        blocks,
        coefficients,
    })
}

fn build_components(substructures: &[Substructure]) -> Vec<Component> {
    let mut components = Vec::new();
    for (isub, sub) in substructures.iter().enumerate() {
        for body in sub.body_range() {
            for &harmonic in sub.kind.harmonics() {
                components.push(Component {
                    substructure: isub,
                    body,
                    harmonic,
                });
            }
        }
    }
    components
}

fn to_count(value: i64, context: &'static str) -> Result<usize, DecodeError> {
    usize::try_from(value).map_err(|_| DecodeError::StructuralCountMismatch {
        context,
        declared: value,
        found: 0,
    })
}

/// The stream ended cleanly between records while more items were declared.
fn ensure_more(
    reader: &RecordReader<'_>,
    context: &'static str,
    declared: usize,
    found: usize,
) -> Result<(), DecodeError> {
    if reader.is_at_end() {
        return Err(DecodeError::StructuralCountMismatch {
            context,
            declared: declared as i64,
            found: found as i64,
        });
    }
    Ok(())
}
