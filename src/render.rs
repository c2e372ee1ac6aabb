//! PNG plot rendering.
//!
//! Plots are drawn with the `plotters` bitmap backend into an in-memory RGB
//! buffer and encoded to PNG with `image`.  No text is drawn, so no font
//! stack is needed; axes, captions and legends belong to the UI.
//!
//! ```text
//! series ─► BitMapBackend (800×400 RGB) ─► RgbImage ─► PNG bytes ─► base64
//! ```
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ImageFormat, RgbImage};
use ndarray::{Array2, ArrayView1};
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use crate::error::{Error, Result};

pub const WIDTH: u32 = 800;
pub const HEIGHT: u32 = 400;
const MARGIN: u32 = 16;

/// An encoded plot image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedPlot {
    pub width: u32,
    pub height: u32,
    /// PNG bytes; base64 in JSON.
    #[serde(with = "base64_bytes")]
    pub png: Vec<u8>,
}

impl RenderedPlot {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.png)
    }

    /// `data:image/png;base64,…` for direct use in an `<img>` tag.
    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", self.to_base64())
    }
}

/// Serde adapter storing byte blobs as standard base64 strings.
pub(crate) mod base64_bytes {
    use super::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD.decode(text.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// Reference line drawn across the plot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Marker {
    /// At an x value, e.g. a target frequency.
    Vertical(f64),
    /// At a y value, e.g. a detection threshold.
    Horizontal(f64),
}

fn render_err<E: std::fmt::Debug>(e: E) -> Error {
    Error::Render(format!("{e:?}"))
}

/// Distinct stroke colour for series `i`.
fn palette(i: usize) -> HSLColor {
    HSLColor((i as f64 * 0.137).fract(), 0.7, 0.45)
}

/// `(min, max)` of finite values, widened when degenerate.
fn extent<I: IntoIterator<Item = f64>>(values: I) -> (f64, f64) {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    if hi - lo < 1e-12 {
        return (lo - 0.5, hi + 0.5);
    }
    let pad = 0.05 * (hi - lo);
    (lo - pad, hi + pad)
}

fn encode_png(buf: Vec<u8>) -> Result<RenderedPlot> {
    let img = RgbImage::from_raw(WIDTH, HEIGHT, buf).ok_or_else(|| Error::Render("buffer size mismatch".into()))?;
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).map_err(render_err)?;
    Ok(RenderedPlot { width: WIDTH, height: HEIGHT, png: out.into_inner() })
}

/// One line per series plus optional reference markers.
pub fn line_plot(series: &[Vec<(f64, f64)>], markers: &[Marker]) -> Result<RenderedPlot> {
    let (x0, x1) = extent(series.iter().flatten().map(|p| p.0));
    let (y0, y1) = extent(
        series
            .iter()
            .flatten()
            .map(|p| p.1)
            .chain(markers.iter().filter_map(|m| match m {
                Marker::Horizontal(y) => Some(*y),
                Marker::Vertical(_) => None,
            })),
    );

    let mut buf = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buf, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(MARGIN)
            .build_cartesian_2d(x0..x1, y0..y1)
            .map_err(render_err)?;

        for m in markers {
            let line = match *m {
                Marker::Vertical(x) => vec![(x, y0), (x, y1)],
                Marker::Horizontal(y) => vec![(x0, y), (x1, y)],
            };
            chart
                .draw_series(LineSeries::new(line, RGBColor(160, 160, 160).stroke_width(1)))
                .map_err(render_err)?;
        }
        for (i, s) in series.iter().enumerate() {
            chart
                .draw_series(LineSeries::new(
                    s.iter().copied().filter(|p| p.1.is_finite()),
                    palette(i).stroke_width(2),
                ))
                .map_err(render_err)?;
        }
        root.present().map_err(render_err)?;
    }
    encode_png(buf)
}

/// One bar per value, zero baseline.
pub fn bar_plot(values: &[f64], markers: &[Marker]) -> Result<RenderedPlot> {
    let n = values.len().max(1) as f64;
    let (y0, y1) = extent(values.iter().copied().chain([0.0]).chain(markers.iter().filter_map(|m| match m {
        Marker::Horizontal(y) => Some(*y),
        Marker::Vertical(_) => None,
    })));

    let mut buf = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buf, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(MARGIN)
            .build_cartesian_2d(0.0..n, y0..y1)
            .map_err(render_err)?;
        chart
            .draw_series(values.iter().enumerate().filter(|(_, v)| v.is_finite()).map(|(i, &v)| {
                let x = i as f64;
                Rectangle::new([(x + 0.15, 0.0), (x + 0.85, v)], palette(i).filled())
            }))
            .map_err(render_err)?;
        for m in markers {
            if let Marker::Horizontal(y) = *m {
                chart
                    .draw_series(LineSeries::new(vec![(0.0, y), (n, y)], RGBColor(200, 60, 60).stroke_width(1)))
                    .map_err(render_err)?;
            }
        }
        root.present().map_err(render_err)?;
    }
    encode_png(buf)
}

/// Colour map of `values` (`[y, x]`) on the grid `xs × ys`.  Non-finite
/// cells are left blank.
pub fn heatmap(xs: &[f64], ys: &[f64], values: &Array2<f64>) -> Result<RenderedPlot> {
    if values.dim() != (ys.len(), xs.len()) || xs.is_empty() || ys.is_empty() {
        return Err(Error::Render(format!(
            "heatmap grid {}×{} does not match values {:?}",
            ys.len(),
            xs.len(),
            values.dim()
        )));
    }
    let (v0, v1) = extent(values.iter().copied());
    let edges = |c: &[f64]| -> Vec<f64> {
        let step = if c.len() > 1 { c[1] - c[0] } else { 1.0 };
        let mut e: Vec<f64> = c.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        e.insert(0, c[0] - 0.5 * step);
        e.push(c[c.len() - 1] + 0.5 * (if c.len() > 1 { c[c.len() - 1] - c[c.len() - 2] } else { step }));
        e
    };
    let (xe, ye) = (edges(xs), edges(ys));

    let mut buf = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buf, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(MARGIN)
            .build_cartesian_2d(xe[0]..xe[xe.len() - 1], ye[0]..ye[ye.len() - 1])
            .map_err(render_err)?;
        chart
            .draw_series(values.indexed_iter().filter(|(_, v)| v.is_finite()).map(|((yi, xi), &v)| {
                let t = ((v - v0) / (v1 - v0)).clamp(0.0, 1.0);
                // Blue (low) through red (high).
                let color = HSLColor(0.66 * (1.0 - t), 0.85, 0.5);
                Rectangle::new([(xe[xi], ye[yi]), (xe[xi + 1], ye[yi + 1])], color.filled())
            }))
            .map_err(render_err)?;
        root.present().map_err(render_err)?;
    }
    encode_png(buf)
}

/// Min/max decimation of `x` to at most `max_points` `(index, value)` pairs.
///
/// Each bucket contributes its minimum and maximum in time order, so spikes
/// survive decimation.
pub fn decimate_min_max(x: ArrayView1<f64>, max_points: usize) -> Vec<(usize, f64)> {
    let n = x.len();
    if n <= max_points || max_points < 2 {
        return x.iter().copied().enumerate().collect();
    }
    let buckets = max_points / 2;
    let mut out = Vec::with_capacity(2 * buckets);
    for b in 0..buckets {
        let (s, e) = (b * n / buckets, ((b + 1) * n / buckets).max(b * n / buckets + 1));
        let (mut lo, mut hi) = ((s, x[s]), (s, x[s]));
        for i in s..e {
            if x[i] < lo.1 {
                lo = (i, x[i]);
            }
            if x[i] > hi.1 {
                hi = (i, x[i]);
            }
        }
        if lo.0 <= hi.0 {
            out.extend([lo, hi]);
        } else {
            out.extend([hi, lo]);
        }
    }
    out
}
