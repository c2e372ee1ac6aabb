use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use eegkit::{AnalysisParams, BdfReferencing, ExportOptions, Payload, ReaderOptions, ReportBundle, Session};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "eegkit", about = "EEG/EDF spectral analysis workbench")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print header, channels and annotations
    Info {
        file: PathBuf,

        #[command(flatten)]
        load: LoadArgs,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one analysis and write its payload and plot
    Analyze {
        file: PathBuf,

        #[command(flatten)]
        load: LoadArgs,

        #[command(flatten)]
        selection: SelectionArgs,

        /// JSON parameter record, e.g. {"analysisType":"PSD","fmin":1,"fmax":45}
        #[arg(long)]
        params: PathBuf,

        /// Extra files for ComparisonPSD and ExperimentSNR (repeatable)
        #[arg(long = "with")]
        with: Vec<PathBuf>,

        /// Payload JSON output path
        #[arg(long)]
        out_json: Option<PathBuf>,

        /// PNG output path
        #[arg(long)]
        out_png: Option<PathBuf>,
    },

    /// Run several analyses and write the report bundle
    Report {
        file: PathBuf,

        #[command(flatten)]
        load: LoadArgs,

        #[command(flatten)]
        selection: SelectionArgs,

        /// JSON parameter records, one analysis each (repeatable)
        #[arg(long, required = true)]
        params: Vec<PathBuf>,

        /// Exam date (YYYY-MM-DD)
        #[arg(long)]
        exam_date: Option<chrono::NaiveDate>,

        /// Bundle output path
        #[arg(long)]
        output: PathBuf,
    },

    /// Write the recording as EDF+ without Status/TimeStamp channels
    Export {
        file: PathBuf,

        #[command(flatten)]
        load: LoadArgs,

        /// Re-reference to the common average before writing
        #[arg(long)]
        average_reference: bool,

        /// Extra channel labels to leave out (comma-separated)
        #[arg(long, value_delimiter = ',')]
        drop: Vec<String>,

        /// EDF output path
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(clap::Args)]
struct LoadArgs {
    /// Offset handling for BDF files
    #[arg(long, value_enum, default_value_t = Referencing::Baseline)]
    referencing: Referencing,

    /// Annotation CSV (experiment,start_time,duration,label)
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Seconds added to every CSV onset
    #[arg(long, default_value_t = 0.0)]
    sync_offset: f64,
}

#[derive(clap::Args)]
struct SelectionArgs {
    /// Window start in seconds
    #[arg(long)]
    start: Option<f64>,

    /// Window end in seconds (default: end of recording)
    #[arg(long)]
    end: Option<f64>,

    /// Channel names (comma-separated; default: all)
    #[arg(long, value_delimiter = ',')]
    channels: Vec<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Referencing {
    Baseline,
    Average,
}

impl From<Referencing> for BdfReferencing {
    fn from(r: Referencing) -> Self {
        match r {
            Referencing::Baseline => BdfReferencing::Baseline,
            Referencing::Average => BdfReferencing::Average,
        }
    }
}

fn file_name(file: &Path) -> String {
    file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Load `extra` files, then `file`, which ends up active.
fn open(file: &Path, extra: &[PathBuf], load: &LoadArgs) -> Result<Session> {
    let mut session = Session::with_global_runtime();
    let opts = ReaderOptions { bdf_referencing: load.referencing.into() };
    for path in extra.iter().map(PathBuf::as_path).chain(std::iter::once(file)) {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        session.load(&file_name(path), &bytes, &opts)?;
    }

    if let Some(csv) = &load.csv {
        let text = std::fs::read_to_string(csv).with_context(|| format!("reading {}", csv.display()))?;
        let ids = session.import_csv_annotations(&text, load.sync_offset)?;
        log::info!("{} annotations from {}", ids.len(), csv.display());
    }
    Ok(session)
}

fn select(session: &mut Session, sel: &SelectionArgs) -> Result<()> {
    let duration = session.active_recording()?.duration_seconds();
    if sel.start.is_some() || sel.end.is_some() {
        session.set_window(sel.start.unwrap_or(0.0), sel.end.unwrap_or(duration))?;
    }
    if !sel.channels.is_empty() {
        session.set_channels(&sel.channels)?;
    }
    Ok(())
}

fn read_params(path: &Path) -> Result<AnalysisParams> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn summary(payload: &Payload) -> String {
    match payload {
        Payload::Psd(p) => format!("peak frequencies {:?} Hz", p.peak_frequencies),
        Payload::Snr(s) => format!("mean SNR {:?} dB", s.mean_snr_db),
        Payload::BandRatio(b) => format!("mean ratio {:?}", b.mean_ratio),
        Payload::TimeFrequency(m) => format!("{} × {} map", m.frequencies.len(), m.times.len()),
        Payload::SpectralParam(f) => format!("{} channel fits", f.channels.len()),
        Payload::Ssvep(s) => format!("detected={} best={:?}", s.detected, s.best_channel),
        Payload::RawPlot(t) => format!("{} × {} samples", t.data.nrows(), t.data.ncols()),
        Payload::ComparisonPsd(c) => {
            let peaks: Vec<String> =
                c.traces.iter().map(|t| format!("{}: {:.2} Hz", t.label, t.peak_frequency_hz)).collect();
            peaks.join(", ")
        }
        Payload::ExperimentSnr(e) => e
            .experiments
            .iter()
            .map(|x| {
                format!("{} ({} periods, above threshold: {:?})", x.label, x.n_periods, x.channels_above_threshold)
            })
            .collect::<Vec<_>>()
            .join("; "),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Command::Info { file, load, json } => {
            let session = open(&file, &[], &load)?;
            let rec = session.active_recording()?;
            let info = rec.info(session.active_filename().unwrap_or_default());
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
                return Ok(());
            }
            println!(
                "{}: {:?}, {} ch × {} samples @ {} Hz ({:.1} s)",
                info.filename, info.source_format, info.n_channels, info.n_samples, info.sampling_rate_hz,
                info.duration_seconds
            );
            println!("Channels: {}", info.channel_names.join(", "));
            for a in rec.annotations() {
                println!("  {:>10.3} s  +{:.3} s  {}", a.onset_seconds, a.duration_seconds, a.description);
            }
        }

        Command::Analyze { file, load, selection, params, with, out_json, out_png } => {
            let mut session = open(&file, &with, &load)?;
            select(&mut session, &selection)?;
            let result = session.analyze(read_params(&params)?)?;
            println!("{} ({}): {}", result.id, result.caption, summary(&result.payload));
            if let Some(path) = out_json {
                std::fs::write(&path, serde_json::to_string_pretty(&result.payload)?)?;
                println!("Written → {}", path.display());
            }
            if let Some(path) = out_png {
                std::fs::write(&path, &result.plot.png)?;
                println!("Written → {}", path.display());
            }
        }

        Command::Report { file, load, selection, params, exam_date, output } => {
            let mut session = open(&file, &[], &load)?;
            select(&mut session, &selection)?;
            let mut ids = Vec::with_capacity(params.len());
            for p in &params {
                let result = session.analyze(read_params(p)?)?;
                println!("{} ({}): {}", result.id, result.caption, summary(&result.payload));
                ids.push(result.id.clone());
            }
            let bundle = ReportBundle::from_session(&session, &ids, exam_date)?;
            bundle.write_json(&output)?;
            println!("Written → {}", output.display());
        }

        Command::Export { file, load, average_reference, drop, output } => {
            let session = open(&file, &[], &load)?;
            let mut options = ExportOptions { average_reference, ..ExportOptions::default() };
            options.drop_channels.extend(drop);
            let bytes = session.export_edf(&file_name(&file), &options)?;
            std::fs::write(&output, &bytes).with_context(|| format!("writing {}", output.display()))?;
            println!("Written → {} ({} bytes)", output.display(), bytes.len());
        }
    }

    Ok(())
}
