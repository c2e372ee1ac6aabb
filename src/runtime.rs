//! Process-wide analysis runtime.
//!
//! Bootstrap steps:
//!   1. Run the numeric self-checks (FFT of a known tone, a symmetric
//!      eigen-decomposition) so a broken numeric stack fails loudly up front.
//!   2. Register the reader backends in priority order.
//!   3. Stamp the bootstrap time.
//!
//! [`Runtime::global`] performs this at most once per process and replays the
//! stored failure on every later call.  Sessions refuse to load or analyse
//! while their runtime is unavailable.
use chrono::{DateTime, Utc};
use nalgebra::{DMatrix, SymmetricEigen};
use std::f64::consts::PI;
use std::sync::{Arc, OnceLock};

use crate::config::RuntimeConfig;
use crate::edf::FormatReader;
use crate::error::{Error, Result};
use crate::job::Progress;
use crate::spectral::fft::RealFft;

static GLOBAL: OnceLock<std::result::Result<Runtime, String>> = OnceLock::new();

/// Shared, read-only services every session needs.
#[derive(Clone)]
pub struct Runtime {
    reader: Arc<FormatReader>,
    bootstrapped_at: DateTime<Utc>,
}

impl Runtime {
    /// Initialise a runtime, reporting each step through `progress`.
    ///
    /// # Errors
    ///
    /// [`Error::RuntimeBootstrap`] when a self-check fails or no backend is
    /// configured.
    pub fn bootstrap(config: &RuntimeConfig, progress: &Progress) -> Result<Self> {
        if config.self_check {
            progress.report("checking FFT");
            check_fft()?;
            progress.report("checking eigen-decomposition");
            check_eigen()?;
        }

        progress.report("registering reader backends");
        if config.backends.is_empty() {
            return Err(Error::RuntimeBootstrap("no reader backends configured".into()));
        }
        let reader = FormatReader::new(&config.backends);
        let runtime = Self { reader: Arc::new(reader), bootstrapped_at: Utc::now() };
        log::info!("runtime ready (backends: {})", runtime.reader.backend_names().join(", "));
        progress.report("ready");
        Ok(runtime)
    }

    /// The process-wide runtime, bootstrapped with defaults on first use.
    pub fn global() -> Result<&'static Runtime> {
        Self::global_with(&RuntimeConfig::default())
    }

    /// Like [`global`](Self::global); `config` only matters on the first call.
    pub fn global_with(config: &RuntimeConfig) -> Result<&'static Runtime> {
        GLOBAL
            .get_or_init(|| Self::bootstrap(config, &Progress::silent()).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|msg| Error::RuntimeBootstrap(msg.clone()))
    }

    pub fn reader(&self) -> &FormatReader {
        &self.reader
    }

    pub(crate) fn shared_reader(&self) -> Arc<FormatReader> {
        Arc::clone(&self.reader)
    }

    pub fn bootstrapped_at(&self) -> DateTime<Utc> {
        self.bootstrapped_at
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("backends", &self.reader.backend_names())
            .field("bootstrapped_at", &self.bootstrapped_at)
            .finish()
    }
}

// ── Self-checks ───────────────────────────────────────────────────────────

/// A 64-point cosine at bin 5 must peak at bin 5 with magnitude n/2.
fn check_fft() -> Result<()> {
    let n = 64;
    let mut fft = RealFft::new(n);
    let bins = fft.process((0..n).map(|i| (2.0 * PI * 5.0 * i as f64 / n as f64).cos()));
    let (peak, mag) = bins
        .iter()
        .enumerate()
        .map(|(k, c)| (k, c.norm()))
        .fold((0, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });
    if peak != 5 || (mag - n as f64 / 2.0).abs() > 1e-9 {
        return Err(Error::RuntimeBootstrap(format!(
            "FFT self-check failed: peak at bin {peak} with magnitude {mag}"
        )));
    }
    Ok(())
}

/// `[[2, 1], [1, 2]]` has eigenvalues 1 and 3.
fn check_eigen() -> Result<()> {
    let m = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 2.0]);
    let mut values: Vec<f64> = SymmetricEigen::new(m).eigenvalues.iter().copied().collect();
    values.sort_by(|a, b| a.total_cmp(b));
    if values.len() != 2 || (values[0] - 1.0).abs() > 1e-9 || (values[1] - 3.0).abs() > 1e-9 {
        return Err(Error::RuntimeBootstrap(format!("eigen self-check failed: {values:?}")));
    }
    Ok(())
}
