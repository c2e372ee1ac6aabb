use std::hint::black_box;
use criterion::{criterion_group, criterion_main, Criterion};
use eegkit::analysis::ssvep;
use eegkit::{compute_psd, slice, Channel, Recording, SourceFormat, SpectralSettings, SsvepParams};
use ndarray::Array2;
use std::f64::consts::PI;

const FS: f64 = 256.0;

/// 8 channels × 60 s: a 10 Hz tone on the first, deterministic clutter elsewhere.
fn recording() -> Recording {
    let n = FS as usize * 60;
    let data = Array2::from_shape_fn((8, n), |(c, t)| {
        let tt = t as f64 / FS;
        if c == 0 {
            20.0 * (2.0 * PI * 10.0 * tt).sin()
        } else {
            ((t * 7919 + c * 104_729) % 1000) as f64 / 50.0 - 10.0
        }
    });
    let chans = (0..8).map(|c| Channel::new(&format!("E{}", c + 1))).collect();
    Recording::new(chans, FS, data, SourceFormat::Edf).unwrap()
}

fn bench_welch(c: &mut Criterion) {
    let rec = recording();
    let settings = SpectralSettings::default();
    c.bench_function("welch [8×15360, 4 s Hann]", |b| {
        b.iter(|| {
            let s = compute_psd(black_box(rec.samples().view()), FS, &settings).unwrap();
            black_box(s.frequencies.len())
        })
    });
}

fn bench_slice_10s(c: &mut Criterion) {
    let rec = recording();
    let names = rec.channel_names();
    c.bench_function("slice 10 s × 8 channels", |b| {
        b.iter(|| {
            let s = slice(&rec, black_box(20.0), black_box(30.0), &names).unwrap();
            black_box(s.n_samples())
        })
    });
}

fn bench_ssvep(c: &mut Criterion) {
    let rec = recording();
    let names = rec.channel_names();
    let data = slice(&rec, 0.0, 60.0, &names).unwrap();
    let params = SsvepParams::default();
    c.bench_function("ssvep detect [8×15360]", |b| {
        b.iter(|| {
            let out = ssvep::analyze(black_box(&data), &params).unwrap();
            black_box(out.detected)
        })
    });
}

criterion_group!(benches, bench_welch, bench_slice_10s, bench_ssvep);
criterion_main!(benches);
