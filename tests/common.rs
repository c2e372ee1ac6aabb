/// Shared helpers: an in-memory EDF/BDF writer and deterministic signals.
use eegkit::{BackendKind, RuntimeConfig, Runtime, Session, SourceFormat};
use eegkit::job::Progress;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;

/// Left-aligned, space-padded ASCII field.
fn field(out: &mut Vec<u8>, text: &str, width: usize) {
    let mut b = text.as_bytes().to_vec();
    b.truncate(width);
    b.resize(width, b' ');
    out.extend(b);
}

/// Shortest decimal rendering of `v` that fits in 8 characters.
fn num8(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e7 {
        return format!("{}", v as i64);
    }
    for prec in (0..=6).rev() {
        let s = format!("{v:.prec$}");
        if s.len() <= 8 {
            return s;
        }
    }
    format!("{}", v.round() as i64)
}

#[allow(unused)]
pub struct EdfFile<'a> {
    pub format: SourceFormat,
    pub labels: &'a [&'a str],
    /// `[C, T]`, physical units.  `T` must be a multiple of `fs`.
    pub data: &'a Array2<f64>,
    pub fs: usize,
    /// `(onset, duration, text)`.  A non-empty list makes the file EDF+/BDF+.
    pub annotations: &'a [(f64, f64, &'a str)],
    pub patient_id: &'a str,
}

#[allow(unused)]
impl<'a> EdfFile<'a> {
    pub fn new(format: SourceFormat, labels: &'a [&'a str], data: &'a Array2<f64>, fs: usize) -> Self {
        Self { format, labels, data, fs, annotations: &[], patient_id: "X X X X" }
    }

    /// Encode as one-second data records.
    pub fn to_bytes(&self) -> Vec<u8> {
        let (n_ch, n_t) = self.data.dim();
        assert_eq!(n_ch, self.labels.len());
        assert_eq!(n_t % self.fs, 0, "sample count must fill whole records");
        let n_records = n_t / self.fs;
        let width = match self.format {
            SourceFormat::Edf => 2,
            SourceFormat::Bdf => 3,
        };
        let (dmin, dmax): (i64, i64) = match self.format {
            SourceFormat::Edf => (-32768, 32767),
            SourceFormat::Bdf => (-8_388_608, 8_388_607),
        };

        // Annotation record 0 carries every annotation; the rest only keep time.
        let tal_records: Vec<Vec<u8>> = (0..n_records)
            .map(|r| {
                let mut t = format!("+{r}\x14\x14\x00").into_bytes();
                if r == 0 {
                    for &(onset, dur, text) in self.annotations {
                        t.extend(format!("+{onset}\x15{dur}\x14{text}\x14\x00").into_bytes());
                    }
                }
                t
            })
            .collect();
        let has_tal = !self.annotations.is_empty();
        let tal_spr = if has_tal {
            let longest = tal_records.iter().map(Vec::len).max().unwrap_or(0);
            longest.div_ceil(width).max(8)
        } else {
            0
        };

        let ns = n_ch + usize::from(has_tal);
        let pmax: Vec<f64> = self
            .data
            .outer_iter()
            .map(|row| {
                let peak = row.iter().fold(0.0f64, |m, v| m.max(v.abs()));
                // Two decimals so the text fields round-trip exactly.
                if peak > 0.0 { (peak * 101.0).ceil() / 100.0 } else { 1.0 }
            })
            .collect();

        let mut out = Vec::new();
        match self.format {
            SourceFormat::Edf => field(&mut out, "0", 8),
            SourceFormat::Bdf => {
                out.push(0xFF);
                out.extend(b"BIOSEMI");
            }
        }
        field(&mut out, self.patient_id, 80);
        field(&mut out, "Startdate 01-FEB-2024 X X X", 80);
        field(&mut out, "01.02.24", 8);
        field(&mut out, "10.11.12", 8);
        field(&mut out, &(256 * (ns + 1)).to_string(), 8);
        let reserved = match (self.format, has_tal) {
            (SourceFormat::Edf, true) => "EDF+C",
            (SourceFormat::Bdf, true) => "BDF+C",
            (SourceFormat::Edf, false) => "",
            (SourceFormat::Bdf, false) => "24BIT",
        };
        field(&mut out, reserved, 44);
        field(&mut out, &n_records.to_string(), 8);
        field(&mut out, "1", 8);
        field(&mut out, &ns.to_string(), 4);

        let tal_label = match self.format {
            SourceFormat::Edf => "EDF Annotations",
            SourceFormat::Bdf => "BDF Annotations",
        };
        let cols = |out: &mut Vec<u8>, w: usize, f: &dyn Fn(usize) -> String, tal: &str| {
            for c in 0..n_ch {
                field(out, &f(c), w);
            }
            if has_tal {
                field(out, tal, w);
            }
        };
        cols(&mut out, 16, &|c: usize| self.labels[c].to_string(), tal_label);
        cols(&mut out, 80, &|_: usize| "AgAgCl electrode".to_string(), "");
        cols(&mut out, 8, &|_: usize| "uV".to_string(), "");
        cols(&mut out, 8, &|c: usize| num8(-pmax[c]), "-1");
        cols(&mut out, 8, &|c: usize| num8(pmax[c]), "1");
        cols(&mut out, 8, &|_: usize| dmin.to_string(), &dmin.to_string());
        cols(&mut out, 8, &|_: usize| dmax.to_string(), &dmax.to_string());
        cols(&mut out, 80, &|_: usize| "HP:0.1Hz".to_string(), "");
        cols(&mut out, 8, &|_: usize| self.fs.to_string(), &tal_spr.to_string());
        cols(&mut out, 32, &|_: usize| String::new(), "");
        assert_eq!(out.len(), 256 * (ns + 1));

        for r in 0..n_records {
            for c in 0..n_ch {
                let gain = 2.0 * pmax[c] / (dmax - dmin) as f64;
                let offset = pmax[c] - gain * dmax as f64;
                for k in 0..self.fs {
                    let v = self.data[[c, r * self.fs + k]];
                    let d = (((v - offset) / gain).round() as i64).clamp(dmin, dmax) as i32;
                    out.extend(&d.to_le_bytes()[..width]);
                }
            }
            if has_tal {
                let mut t = tal_records[r].clone();
                t.resize(tal_spr * width, 0);
                out.extend(t);
            }
        }
        out
    }
}

#[allow(unused)]
pub fn sine(fs: f64, freq: f64, amp: f64, n: usize) -> Array1<f64> {
    Array1::from_shape_fn(n, |i| amp * (2.0 * PI * freq * i as f64 / fs).sin())
}

#[allow(unused)]
/// Gaussian white noise, reproducible per `seed`.
pub fn noise(seed: u64, std: f64, n: usize) -> Array1<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let dist = Normal::new(0.0, std).unwrap();
    Array1::from_shape_fn(n, |_| dist.sample(&mut rng))
}

#[allow(unused)]
pub const LABELS: [&str; 4] = ["Ch1", "Ch2", "Ch3", "Ch4"];

#[allow(unused)]
/// 4 channels, 256 Hz, 60 s: a pure 10 Hz sine on `Ch1`, noise elsewhere.
pub fn ssvep_data() -> Array2<f64> {
    let (fs, n) = (256.0, 256 * 60);
    let mut data = Array2::zeros((4, n));
    data.row_mut(0).assign(&sine(fs, 10.0, 20.0, n));
    for c in 1..4 {
        data.row_mut(c).assign(&noise(c as u64, 10.0, n));
    }
    data
}

#[allow(unused)]
pub fn ssvep_edf() -> Vec<u8> {
    let data = ssvep_data();
    EdfFile::new(SourceFormat::Edf, &LABELS, &data, 256).to_bytes()
}

#[allow(unused)]
/// A session whose runtime only uses the built-in parser.
pub fn native_session() -> Session {
    let cfg = RuntimeConfig { backends: vec![BackendKind::Native], self_check: true };
    Session::from_bootstrap(Runtime::bootstrap(&cfg, &Progress::silent()))
}

#[allow(unused)]
pub fn max_abs_diff(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    assert_eq!(a.dim(), b.dim());
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
}
