//! Masked normalized cross-correlation over circular angular shifts.

use super::strip::IrisStrip;
use crate::sampling::parabolic_offset;

/// Correlation of one strip against a reference over `±max_shift` bins.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationCurve {
    pub max_shift: usize,
    /// NCC per shift `-max_shift..=max_shift`; `None` where overlap was too small.
    pub scores: Vec<Option<f64>>,
    /// Overlapping valid cells at shift zero, as a fraction of all cells.
    pub overlap_at_zero: f64,
}

impl CorrelationCurve {
    pub fn shift_of(&self, idx: usize) -> isize {
        idx as isize - self.max_shift as isize
    }

    /// Index of the highest score.
    pub fn peak(&self) -> Option<usize> {
        self.scores
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.map(|v| (i, v)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Peak shift in bins, parabolically refined when both neighbours exist.
    pub fn subbin_peak(&self) -> Option<(f64, f64)> {
        let i = self.peak()?;
        let y0 = self.scores[i]?;
        let left = i.checked_sub(1).and_then(|j| self.scores[j]);
        let right = self.scores.get(i + 1).copied().flatten();
        let off = match (left, right) {
            (Some(l), Some(r)) => parabolic_offset(l, y0, r),
            _ => 0.0,
        };
        Some((self.shift_of(i) as f64 + off, y0))
    }

    /// Peak-to-sidelobe ratio, excluding `±guard` bins around the peak.
    pub fn psr(&self, guard: usize) -> f64 {
        let Some(p) = self.peak() else {
            return 0.0;
        };
        let Some(peak) = self.scores[p] else {
            return 0.0;
        };
        let side: Vec<f64> = self
            .scores
            .iter()
            .enumerate()
            .filter(|(i, _)| i.abs_diff(p) > guard)
            .filter_map(|(_, s)| *s)
            .collect();
        if side.len() < 2 {
            return 0.0;
        }
        let n = side.len() as f64;
        let mean = side.iter().sum::<f64>() / n;
        let var = side.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / n;
        let sd = var.sqrt().max(1e-6);
        (peak - mean) / sd
    }
}

/// NCC of `current` against `reference` for each circular shift `s`, pairing
/// `current[a]` with `reference[a - s]`. Only cells valid in both strips take
/// part; means and energies are recomputed over each overlap.
pub fn correlate(
    current: &IrisStrip,
    reference: &IrisStrip,
    max_shift: usize,
    min_overlap_fraction: f64,
) -> CorrelationCurve {
    debug_assert!(current.same_layout(reference));
    let n_a = current.n_angles;
    let total = current.len().max(1);
    let min_overlap = ((min_overlap_fraction * total as f64).ceil() as usize).max(2);
    let max_shift = max_shift.min(n_a / 2);

    let mut scores = Vec::with_capacity(2 * max_shift + 1);
    let mut overlap_at_zero = 0.0;
    for si in 0..=2 * max_shift {
        let s = si as isize - max_shift as isize;
        let (mut n, mut sc, mut sr, mut scc, mut srr, mut scr) =
            (0usize, 0.0f64, 0.0f64, 0.0f64, 0.0f64, 0.0f64);
        for ri in 0..current.n_radii {
            let (cv, cm) = current.row(ri);
            let (rv, rm) = reference.row(ri);
            for a in 0..n_a {
                if !cm[a] {
                    continue;
                }
                let b = (a as isize - s).rem_euclid(n_a as isize) as usize;
                if !rm[b] {
                    continue;
                }
                let c = cv[a] as f64;
                let r = rv[b] as f64;
                n += 1;
                sc += c;
                sr += r;
                scc += c * c;
                srr += r * r;
                scr += c * r;
            }
        }
        if s == 0 {
            overlap_at_zero = n as f64 / total as f64;
        }
        if n < min_overlap {
            scores.push(None);
            continue;
        }
        let nf = n as f64;
        let cov = scr - sc * sr / nf;
        let vc = scc - sc * sc / nf;
        let vr = srr - sr * sr / nf;
        let denom = (vc * vr).sqrt();
        scores.push((denom > 1e-12).then(|| (cov / denom).clamp(-1.0, 1.0)));
    }

    CorrelationCurve {
        max_shift,
        scores,
        overlap_at_zero,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn textured(n_a: usize, shift: isize) -> IrisStrip {
        let mut s = IrisStrip::new(2, n_a, 360.0 / n_a as f64);
        for ri in 0..2 {
            for a in 0..n_a {
                let src = (a as isize - shift).rem_euclid(n_a as isize) as f64;
                let phi = src * std::f64::consts::TAU / n_a as f64;
                let v = (3.0 * phi + ri as f64).sin() + 0.5 * (11.0 * phi).cos();
                s.set(ri, a, Some(v as f32));
            }
        }
        s
    }

    #[test]
    fn integer_shift_is_found() {
        let reference = textured(360, 0);
        for shift in [-7isize, 0, 4, 12] {
            let cur = textured(360, shift);
            let curve = correlate(&cur, &reference, 20, 0.1);
            let i = curve.peak().unwrap();
            assert_eq!(curve.shift_of(i), shift);
            assert_abs_diff_eq!(curve.scores[i].unwrap(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn self_correlation_is_centered() {
        let reference = textured(360, 0);
        let curve = correlate(&reference, &reference, 20, 0.1);
        let (shift, peak) = curve.subbin_peak().unwrap();
        assert_abs_diff_eq!(shift, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(peak, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(curve.overlap_at_zero, 1.0);
        assert!(curve.psr(2) > 1.0);
    }

    #[test]
    fn empty_overlap_has_no_scores() {
        let reference = textured(90, 0);
        let empty = IrisStrip::new(2, 90, 4.0);
        let curve = correlate(&empty, &reference, 10, 0.1);
        assert!(curve.scores.iter().all(|s| s.is_none()));
        assert!(curve.subbin_peak().is_none());
        assert_eq!(curve.psr(2), 0.0);
    }
}
