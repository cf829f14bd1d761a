use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use rusty_campbell::codec::fortran::RecordWriter;
use rusty_campbell::codec::modeshape::DOFS_PER_NODE;
use rusty_campbell::codec::record::Endian;
use rusty_campbell::import::hawcstab2::AMP_SENSORS;

/// Write a consistent HAWCStab2 case (.cmb/.opt/.amp/.bin) and a Bladed
/// linearisation summary for demos and manual testing.
#[derive(Parser)]
#[command(name = "generate-sample")]
struct Args {
    /// Output directory (created if missing)
    dir: PathBuf,

    /// Seed of the measurement noise
    #[arg(long, default_value_t = 42)]
    seed: u64,
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
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
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

// ---------------------------------------------------------------------------
// Synthetic turbine
// ---------------------------------------------------------------------------

struct Mode {
    name: &'static str,
    /// Natural frequency at standstill [Hz].
    base: f64,
    /// Multiple of the rotor frequency added to `base` (whirl).
    whirl: f64,
    /// Damping ratio [%].
    damping: f64,
    /// Index into `AMP_SENSORS` of the dominant sensor.
    sensor: usize,
}

const MODES: [Mode; 6] = [
    Mode { name: "1st Twr FA", base: 0.32, whirl: 0.0, damping: 4.0, sensor: 1 },
    Mode { name: "1st Twr SS", base: 0.33, whirl: 0.0, damping: 1.0, sensor: 0 },
    Mode { name: "1st BW flap", base: 0.70, whirl: -1.0, damping: 30.0, sensor: 10 },
    Mode { name: "1st Sym flap", base: 0.75, whirl: 0.0, damping: 35.0, sensor: 9 },
    Mode { name: "1st FW flap", base: 0.80, whirl: 1.0, damping: 28.0, sensor: 11 },
    Mode { name: "1st BW edge", base: 1.05, whirl: -1.0, damping: 0.8, sensor: 7 },
];

struct OperatingPoint {
    wind_speed: f64,
    pitch_deg: f64,
    rpm: f64,
    power_kw: f64,
    thrust_kn: f64,
}

fn operating_points() -> Vec<OperatingPoint> {
    (0..10)
        .map(|i| {
            let ws = 4.0 + 2.0 * i as f64;
            let rated = ws >= 11.0;
            OperatingPoint {
                wind_speed: ws,
                pitch_deg: if rated { 2.5 * (ws - 11.0) + 1.0 } else { 0.0 },
                rpm: (6.0 + 0.7 * (ws - 4.0)).min(12.1),
                power_kw: if rated { 5000.0 } else { 5000.0 * (ws / 11.0).powi(3) },
                thrust_kn: if rated { 800.0 - 20.0 * (ws - 11.0) } else { 800.0 * (ws / 11.0).powi(2) },
            }
        })
        .collect()
}

struct Results {
    frequency: Vec<Vec<f64>>,
    damping: Vec<Vec<f64>>,
}

fn campbell(ops: &[OperatingPoint], rng: &mut SimpleRng) -> Results {
    let mut frequency = Vec::new();
    let mut damping = Vec::new();
    for op in ops {
        let rotor_hz = op.rpm / 60.0;
        frequency.push(
            MODES
                .iter()
                .map(|m| m.base + m.whirl * rotor_hz + rng.gauss(0.0, 0.002))
                .collect(),
        );
        damping.push(
            MODES
                .iter()
                .map(|m| m.damping * (1.0 + 0.02 * op.wind_speed) + rng.gauss(0.0, 0.05))
                .collect(),
        );
    }
    Results { frequency, damping }
}

fn participation_amp(mode: &Mode, sensor: usize) -> f64 {
    if sensor == mode.sensor {
        1.0
    } else {
        0.05 + 0.01 * sensor as f64
    }
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

fn write_hawcstab2(dir: &Path, ops: &[OperatingPoint], res: &Results) -> Result<()> {
    let n = MODES.len();

    let mut cmb = String::from("# Wind speed [m/s]  Frequencies [Hz]  Damping ratios [%]  Real parts [1/s]\n");
    for (i, op) in ops.iter().enumerate() {
        write!(cmb, "{:12.5}", op.wind_speed)?;
        for f in &res.frequency[i] {
            write!(cmb, " {f:14.7e}")?;
        }
        for d in &res.damping[i] {
            write!(cmb, " {d:14.7e}")?;
        }
        for (f, d) in res.frequency[i].iter().zip(&res.damping[i]) {
            write!(cmb, " {:14.7e}", -d / 100.0 * 2.0 * std::f64::consts::PI * f)?;
        }
        cmb.push('\n');
    }
    fs::write(dir.join("sample.cmb"), cmb).context("writing sample.cmb")?;

    let mut opt = format!("{}\n", ops.len());
    for op in ops {
        writeln!(
            opt,
            "{:10.4} {:10.4} {:10.4} {:12.3} {:10.3}",
            op.wind_speed, op.pitch_deg, op.rpm, op.power_kw, op.thrust_kn
        )?;
    }
    fs::write(dir.join("sample.opt"), opt).context("writing sample.opt")?;

    let mut amp = String::new();
    for line in 0..5 {
        writeln!(amp, "# amplitude file header line {}", line + 1)?;
    }
    for op in ops {
        write!(amp, "{:10.4}", op.wind_speed)?;
        for mode in &MODES {
            for sensor in 0..AMP_SENSORS.len() {
                write!(amp, " {:10.5} {:8.2}", participation_amp(mode, sensor), 15.0 * sensor as f64)?;
            }
        }
        amp.push('\n');
    }
    fs::write(dir.join("sample.amp"), amp).context("writing sample.amp")?;

    fs::write(dir.join("sample.bin"), modeshape_stream(ops, n)).context("writing sample.bin")?;
    Ok(())
}

/// Tower, shaft and one three-bladed rotor body; element counts per body.
const BODIES: [(usize, usize); 3] = [(0, 4), (1, 1), (2, 5)];

fn modeshape_stream(ops: &[OperatingPoint], n_modes: usize) -> Vec<u8> {
    let mut w = RecordWriter::new(Endian::Little);
    w.ints32(&[BODIES.len() as i32]);
    for &(_, elements) in &BODIES {
        w.ints32(&[1]).ints32(&[elements as i32]);
        for e in 0..elements {
            w.reals(&[e as f64 / elements as f64]);
        }
    }
    w.ints32(&[n_modes as i32, ops.len() as i32]);

    for op in ops {
        w.reals(&[op.wind_speed]);
        w.reals(&[op.wind_speed, -op.pitch_deg.to_radians(), op.power_kw * 1e3]);
        for &(sub, elements) in &BODIES {
            let dofs = (elements + 1) * DOFS_PER_NODE;
            let harmonics = if sub < 2 { 1 } else { 3 };
            for (m, mode) in MODES.iter().enumerate().take(n_modes) {
                let on_tower = mode.sensor < 3;
                let weight = match (sub, on_tower) {
                    (0, true) | (2, false) => 1.0,
                    _ => 0.05,
                };
                for h in 0..harmonics {
                    let shape: Vec<f64> = (0..2 * dofs)
                        .map(|k| {
                            let along = ((k / 2) as f64 + 1.0) / dofs as f64;
                            let part = if k % 2 == 0 { 1.0 } else { 0.1 * (h + m) as f64 };
                            weight * along * part
                        })
                        .collect();
                    w.reals(&shape);
                }
            }
        }
    }
    w.into_bytes()
}

fn write_bladed(dir: &Path, ops: &[OperatingPoint], res: &Results) -> Result<()> {
    let mut text = String::from("# ApplicationVersion: 4.9.0.1\n# Project: generated sample\n");
    text.push_str("operating_point,wind speed [m/s],pitch [deg],rot. speed [rpm],mode,frequency,damping,participation\n");
    for (i, op) in ops.iter().enumerate() {
        for (m, mode) in MODES.iter().enumerate() {
            // The last mode is not tracked at the first operating point.
            let frequency = if i == 0 && m == MODES.len() - 1 { -1.0 } else { res.frequency[i][m] };
            let participation: Vec<String> = [(mode.sensor, 80.0), ((mode.sensor + 1) % AMP_SENSORS.len(), 20.0)]
                .iter()
                .map(|&(s, pct)| format!("{} {pct:.1}% {:.1}d", AMP_SENSORS[s], 10.0 * s as f64))
                .collect();
            writeln!(
                text,
                "{i},{:.3},{:.3},{:.3},{},{frequency:.6},{:.6},\"{}\"",
                op.wind_speed,
                op.pitch_deg,
                op.rpm,
                mode.name,
                res.damping[i][m] / 100.0,
                participation.join(", ")
            )?;
        }
    }
    fs::write(dir.join("sample_bladed.csv"), text).context("writing sample_bladed.csv")?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    fs::create_dir_all(&args.dir).with_context(|| format!("creating {}", args.dir.display()))?;

    let mut rng = SimpleRng::new(args.seed);
    let ops = operating_points();
    let results = campbell(&ops, &mut rng);

    write_hawcstab2(&args.dir, &ops, &results)?;
    write_bladed(&args.dir, &ops, &results)?;

    println!(
        "Wrote {} operating points x {} modes to {}",
        ops.len(),
        MODES.len(),
        args.dir.display()
    );
    Ok(())
}
