//! Banded Gotoh (affine-gap) alignment used by the POA engine's realignment
//! pass (§4.4): each read is re-aligned against the graph's current
//! consensus, restricted to a band around its original diagonal so the cost
//! stays bounded on long chunks.

use crate::params::PoaParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Match { read_idx: usize, ref_idx: usize },
    Ins { read_idx: usize },
    Del { ref_idx: usize },
}

const NEG_INF: f64 = f64::MIN / 2.0;

/// Banded global (Needleman-Wunsch/Gotoh) alignment of `read` against
/// `reference`, returning the traceback as an ordered list of [`Step`]s.
///
/// The band is `band_width` columns wide on either side of the natural
/// diagonal `j = i * (m / n)`, so runtime is `O(n * band_width)` rather than
/// `O(n * m)`.
pub fn banded_align(read: &[u8], reference: &[u8], band_width: usize, params: &PoaParams) -> Vec<Step> {
    let n = read.len();
    let m = reference.len();

    if n == 0 {
        return (0..m).map(|j| Step::Del { ref_idx: j }).collect();
    }
    if m == 0 {
        return (0..n).map(|i| Step::Ins { read_idx: i }).collect();
    }

    let slope = m as f64 / n as f64;
    let lo = |i: usize| -> usize {
        let center = (i as f64 * slope).round() as i64;
        (center - band_width as i64).max(0) as usize
    };
    let hi = |i: usize| -> usize {
        let center = (i as f64 * slope).round() as i64;
        ((center + band_width as i64).max(0) as usize).min(m)
    };

    // Three banded matrices (match/read-gap/ref-gap), stored dense per row
    // restricted to [lo(i), hi(i)].
    let mut m_mat: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    let mut x_mat: Vec<Vec<f64>> = Vec::with_capacity(n + 1); // gap in reference (insertion)
    let mut y_mat: Vec<Vec<f64>> = Vec::with_capacity(n + 1); // gap in read (deletion)
    let mut bounds: Vec<(usize, usize)> = Vec::with_capacity(n + 1);

    for i in 0..=n {
        let (l, h) = (lo(i.min(n)), hi(i.min(n)).max(lo(i.min(n))));
        let width = h - l + 1;
        m_mat.push(vec![NEG_INF; width]);
        x_mat.push(vec![NEG_INF; width]);
        y_mat.push(vec![NEG_INF; width]);
        bounds.push((l, h));
    }

    m_mat[0][0] = 0.0;
    for i in 1..=n {
        let (l, _) = bounds[i];
        if l == 0 {
            x_mat[i][0] = params.gap_open_score + (i as f64 - 1.0) * params.gap_extend_score;
        }
    }
    {
        let (l0, h0) = bounds[0];
        for j in l0..=h0 {
            y_mat[0][j - l0] = params.gap_open_score + (j as f64 - 1.0) * params.gap_extend_score;
        }
        if l0 == 0 {
            y_mat[0][0] = 0.0;
        }
    }

    let idx = |i: usize, j: usize| -> Option<usize> {
        let (l, h) = bounds[i];
        if j >= l && j <= h {
            Some(j - l)
        } else {
            None
        }
    };

    for i in 1..=n {
        let (l, h) = bounds[i];
        for j in l..=h {
            let score = if read[i - 1].eq_ignore_ascii_case(&reference[j - 1]) {
                params.match_score
            } else {
                params.mismatch_score
            };

            let diag = idx(i - 1, j - 1).map(|k| {
                let prev = &bounds[i - 1];
                let _ = prev;
                m_mat[i - 1][k].max(x_mat[i - 1][k]).max(y_mat[i - 1][k])
            });
            let m_val = diag.map(|d| d + score).unwrap_or(NEG_INF);

            let cur = j - l;
            let x_val = if cur > 0 {
                (m_mat[i][cur - 1] + params.gap_open_score)
                    .max(x_mat[i][cur - 1] + params.gap_extend_score)
            } else {
                NEG_INF
            };

            let y_val = idx(i - 1, j)
                .map(|k| {
                    (m_mat[i - 1][k] + params.gap_open_score).max(y_mat[i - 1][k] + params.gap_extend_score)
                })
                .unwrap_or(NEG_INF);

            m_mat[i][cur] = m_val;
            x_mat[i][cur] = x_val;
            y_mat[i][cur] = y_val;
        }
    }

    // Traceback from (n, m) preferring Match > Del(Y) > Ins(X) on ties, for
    // determinism.
    let mut steps = Vec::new();
    let mut i = n;
    let mut j = m;
    while i > 0 || j > 0 {
        if i == 0 {
            j -= 1;
            steps.push(Step::Del { ref_idx: j });
            continue;
        }
        if j == 0 {
            i -= 1;
            steps.push(Step::Ins { read_idx: i });
            continue;
        }
        let cur = idx(i, j);
        let (m_here, x_here, y_here) = match cur {
            Some(k) => (m_mat[i][k], x_mat[i][k], y_mat[i][k]),
            None => (NEG_INF, NEG_INF, NEG_INF),
        };
        let best = m_here.max(x_here).max(y_here);
        if best == m_here && m_here > NEG_INF {
            i -= 1;
            j -= 1;
            steps.push(Step::Match { read_idx: i, ref_idx: j });
        } else if best == y_here && y_here > NEG_INF {
            j -= 1;
            steps.push(Step::Del { ref_idx: j });
        } else {
            i -= 1;
            steps.push(Step::Ins { read_idx: i });
        }
    }
    steps.reverse();
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_sequences_align_as_matches_only() {
        let params = PoaParams::default();
        let steps = banded_align(b"ACGTACGT", b"ACGTACGT", 5, &params);
        assert!(steps.iter().all(|s| matches!(s, Step::Match { .. })));
        assert_eq!(steps.len(), 8);
    }

    #[test]
    fn insertion_past_reference_end_is_detected() {
        let params = PoaParams::default();
        let steps = banded_align(b"AAAACCCCA", b"AAAACCCC", 5, &params);
        let ins_count = steps.iter().filter(|s| matches!(s, Step::Ins { .. })).count();
        assert_eq!(ins_count, 1);
    }

    #[test]
    fn deletion_is_detected() {
        let params = PoaParams::default();
        let steps = banded_align(b"ACGACGT", b"ACGTACGT", 5, &params);
        let del_count = steps.iter().filter(|s| matches!(s, Step::Del { .. })).count();
        assert_eq!(del_count, 1);
    }
}
