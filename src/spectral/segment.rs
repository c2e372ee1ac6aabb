//! Overlapping segmentation for Welch-type estimators.
//!
//! Segments of `nperseg` samples start every `nperseg - noverlap` samples;
//! a trailing partial segment is dropped.  The segment count is
//! `(n - noverlap) / (nperseg - noverlap)`, matching `scipy.signal.welch`.
use ndarray::{s, ArrayView1};

use crate::error::{Error, Result};

/// Start indices of every complete segment.
///
/// Fails with [`Error::SegmentTooLong`] when `n < nperseg`; the segment is
/// never shortened to fit.
pub fn segment_starts(n: usize, nperseg: usize, noverlap: usize) -> Result<Vec<usize>> {
    if nperseg < 2 {
        return Err(Error::param(format!("segment must span at least 2 samples, got {nperseg}")));
    }
    if n < nperseg {
        return Err(Error::SegmentTooLong { required: nperseg, available: n });
    }
    let step = nperseg - noverlap.min(nperseg - 1);
    Ok((0..=(n - nperseg) / step).map(|k| k * step).collect())
}

/// Iterate the segments of `x`.
pub fn segments<'a>(
    x: ArrayView1<'a, f64>,
    nperseg: usize,
    noverlap: usize,
) -> Result<impl Iterator<Item = ArrayView1<'a, f64>>> {
    let starts = segment_starts(x.len(), nperseg, noverlap)?;
    Ok(starts
        .into_iter()
        .map(move |i| x.clone().slice_move(s![i..i + nperseg])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn half_overlap_count() {
        // 60 s at 256 Hz, 4 s segments, 50 % overlap → 29 segments.
        let starts = segment_starts(15_360, 1024, 512).unwrap();
        assert_eq!(starts.len(), 29);
        assert_eq!(starts[1], 512);
        assert_eq!(*starts.last().unwrap(), 14_336);
    }

    #[test]
    fn trailing_samples_dropped() {
        let starts = segment_starts(1300, 1280, 0).unwrap();
        assert_eq!(starts, vec![0]);
    }

    #[test]
    fn too_short_is_error() {
        match segment_starts(1000, 1024, 512) {
            Err(Error::SegmentTooLong { required, available }) => {
                assert_eq!((required, available), (1024, 1000));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn segment_views() {
        let x = Array1::from_iter((0..10).map(|v| v as f64));
        let segs: Vec<_> = segments(x.view(), 4, 2).unwrap().collect();
        assert_eq!(segs.len(), 4);
        assert_eq!(segs[3][0], 6.0);
    }
}
