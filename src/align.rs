//! Smith-Waterman local alignment over character sequences.
//!
//! This is the HOT PATH - every term is aligned against every dictionary
//! synonym, so the matrix fill must stay tight.
//!
//! Beyond the single best trace, the engine extracts additional co-optimal
//! alignments, drops contained ones and stitches adjacent overlapping ones
//! into a single combined alignment (permuted word order).

use crate::models::{Alignment, ScoringParams, TracePair};

const DIAG: u8 = 1;
const UP: u8 = 2;
const LEFT: u8 = 4;
const VISITED: u8 = 8;

/// Case-insensitive character equality.
#[inline]
fn chars_match(a: char, b: char) -> bool {
    a == b || a.to_uppercase().eq(b.to_uppercase())
}

/// Letters, digits and hyphens belong to a token; everything else separates.
#[inline]
pub(crate) fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-'
}

/// Align two sequences, returning all retained alignments ranked by raw
/// score (descending), ties broken by trace length (descending).
///
/// Empty input on either side yields an empty list.
pub fn align(seq_i: &str, seq_j: &str, params: &ScoringParams) -> Vec<Alignment> {
    let ci: Vec<char> = seq_i.chars().collect();
    let cj: Vec<char> = seq_j.chars().collect();
    let n = ci.len();
    let m = cj.len();

    if n == 0 || m == 0 {
        return Vec::new();
    }

    // DP matrix and direction bitmask - flat Vecs for cache efficiency.
    // h[i][j] = h[i * (m+1) + j]
    let width = m + 1;
    let mut h = vec![0i32; (n + 1) * width];
    let mut path = vec![0u8; (n + 1) * width];

    for i in 1..=n {
        let a = ci[i - 1];
        let row = i * width;
        let prev = (i - 1) * width;

        for j in 1..=m {
            let b = cj[j - 1];
            let s1 = h[prev + (j - 1)]
                + if chars_match(a, b) {
                    params.match_score
                } else {
                    params.mismatch_penalty
                };
            let s2 = h[prev + j] + params.gap_penalty;
            let s3 = h[row + (j - 1)] + params.gap_penalty;

            let best = 0.max(s1).max(s2).max(s3);
            let mut bits = 0u8;
            if best == s1 {
                bits |= DIAG;
            }
            if best == s2 {
                bits |= UP;
            }
            if best == s3 {
                bits |= LEFT;
            }

            h[row + j] = best;
            path[row + j] = bits;
        }
    }

    // Primary alignment: trace back from the globally maximal cell.
    let mut max = 0;
    let mut pi = n;
    let mut pj = m;
    for i in (1..=n).rev() {
        for j in (1..=m).rev() {
            if h[i * width + j] > max {
                max = h[i * width + j];
                pi = i;
                pj = j;
            }
        }
    }

    let tr = traceback(pi, pj, width, &h, &mut path);
    // Start of the most recently merged-into alignment; the adjacency test
    // below compares against it.
    let mut start = tr.first().copied().unwrap_or(TracePair::new(-1, -1));
    let mut alignments = vec![build_alignment(&ci, &cj, tr, params)];

    // Remaining alignments: every unvisited cell reached only by a diagonal
    // move is a candidate start of an alternative local optimum.
    for i in (1..=n).rev() {
        for j in (1..=m).rev() {
            if path[i * width + j] != DIAG {
                continue;
            }
            let tr = traceback(i, j, width, &h, &mut path);
            if tr.len() <= 1 {
                continue;
            }
            let end = tr[tr.len() - 1];
            let aln = build_alignment(&ci, &cj, tr.clone(), params);
            if aln.score <= 0 {
                continue;
            }

            let Some(last) = alignments.last() else {
                alignments.push(aln);
                continue;
            };
            if contained(&aln.extent_i, &last.extent_i)
                || contained(&aln.extent_j, &last.extent_j)
                || contained(&last.extent_i, &aln.extent_i)
                || contained(&last.extent_j, &aln.extent_j)
            {
                // Pure containment, adds nothing new.
                continue;
            }

            if (start.i - end.i).abs() <= 1 && (start.j - end.j).abs() <= 1 {
                // Adjacent endpoints, e.g.
                // 'testosterone undecanoate' vs 'TESTOSTERONE DECANOATE':
                // stitch the two traces into one combined alignment.
                let new_start = tr[0];
                let merged = merge_traces(&tr, &last.trace, n, m);
                let combined = build_alignment(&ci, &cj, merged, params);
                if combined.score > 0 {
                    alignments.pop();
                    alignments.push(combined);
                    start = new_start;
                }
                continue;
            }

            alignments.push(aln);
        }
    }

    // Raw-score order, not the candidate-quality order.
    alignments.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.trace.len().cmp(&a.trace.len()))
    });

    alignments
}

/// Walk back from (i, j) following the recorded directions, preferring
/// diagonal over up over left, until a zero-valued predecessor, a visited
/// cell or the matrix boundary. Visited cells are claimed so later walks do
/// not re-trace them. Repeated indices between consecutive steps (gap moves)
/// are marked negative.
fn traceback(mut i: usize, mut j: usize, width: usize, h: &[i32], path: &mut [u8]) -> Vec<TracePair> {
    let mut trace = Vec::new();
    let mut prev: Option<TracePair> = None;

    while i > 0 && j > 0 {
        let idx = i * width + j;
        let bits = path[idx];
        if bits & VISITED != 0 {
            break;
        }

        let mut p = TracePair::new((i - 1) as i32, (j - 1) as i32);
        if let Some(q) = prev {
            if p.i == q.i {
                p.i = -p.i;
            }
            if p.j == q.j {
                p.j = -p.j;
            }
        }
        trace.push(p);
        path[idx] = VISITED;
        prev = Some(p);

        if bits & DIAG != 0 {
            i -= 1;
            j -= 1;
        } else if bits & UP != 0 {
            i -= 1;
        } else if bits & LEFT != 0 {
            j -= 1;
        } else {
            break;
        }

        if h[i * width + j] == 0 {
            break;
        }
    }

    trace.reverse();
    trace
}

/// Concatenate a newly found trace with the previous alignment's trace and
/// mark the second occurrence of any revisited sequence position negative,
/// so it scores as a gap rather than a double match.
pub(crate) fn merge_traces(
    new_trace: &[TracePair],
    prev_trace: &[TracePair],
    n: usize,
    m: usize,
) -> Vec<TracePair> {
    let mut merged: Vec<TracePair> = Vec::with_capacity(new_trace.len() + prev_trace.len());
    merged.extend_from_slice(new_trace);
    merged.extend_from_slice(prev_trace);

    let mut seen_i = vec![false; n];
    let mut seen_j = vec![false; m];
    for p in merged.iter_mut().rev() {
        if p.i >= 0 {
            if seen_i[p.i as usize] {
                p.i = -p.i;
            } else {
                seen_i[p.i as usize] = true;
            }
        }
        if p.j >= 0 {
            if seen_j[p.j as usize] {
                p.j = -p.j;
            } else {
                seen_j[p.j as usize] = true;
            }
        }
    }

    merged
}

/// True when every covered position of `a` is also covered by `b`.
fn contained(a: &[bool], b: &[bool]) -> bool {
    a.iter().zip(b.iter()).all(|(&x, &y)| !x || y)
}

/// Score a traced path and derive the similarity metrics.
pub(crate) fn build_alignment(
    ci: &[char],
    cj: &[char],
    trace: Vec<TracePair>,
    params: &ScoringParams,
) -> Alignment {
    let n = ci.len();
    let m = cj.len();
    let mut extent_i = vec![false; n];
    let mut extent_j = vec![false; m];
    let mut matches = 0usize;
    let mut score = 0i32;

    let mut row_i = String::new();
    let mut row_mark = String::new();
    let mut row_j = String::new();

    for p in &trace {
        if p.i < 0 && p.j < 0 {
            break;
        }
        if p.i >= 0 && p.j >= 0 {
            let a = ci[p.i as usize];
            let b = cj[p.j as usize];
            row_i.push(a);
            row_j.push(b);
            let matched = chars_match(a, b);
            row_mark.push(if matched { '|' } else { ' ' });
            if matched {
                matches += 1;
            } else {
                score += params.mismatch_penalty;
            }
            extent_i[p.i as usize] = true;
            extent_j[p.j as usize] = true;
        } else if p.i >= 0 {
            row_i.push(ci[p.i as usize]);
            row_j.push('-');
            row_mark.push(' ');
            extent_i[p.i as usize] = true;
            score += params.gap_penalty;
        } else if p.j >= 0 {
            row_i.push('-');
            row_j.push(cj[p.j as usize]);
            row_mark.push(' ');
            extent_j[p.j as usize] = true;
            score += params.gap_penalty;
        }
    }

    let max = params.match_score * matches as i32;
    score += max;

    // Penalize token characters flanking the aligned window, so a shared
    // trailing word scores the same as a shared leading word:
    //   "curdlan sulfate" vs "uranyl sulfate"
    //   "curdlan sulfate" vs "sulfate uranyl"
    // both count the unmatched word against the score.
    if let Some(first) = trace.first() {
        if first.i >= 0 {
            score += flank_penalty_before(first.i as usize, ci, params);
        }
        if first.j >= 0 {
            score += flank_penalty_before(first.j as usize, cj, params);
        }
    }
    if let Some(last) = trace.last() {
        if last.i >= 0 {
            score += flank_penalty_after(last.i as usize, ci, params);
        }
        if last.j >= 0 {
            score += flank_penalty_after(last.j as usize, cj, params);
        }
    }

    if score < 0 {
        score = 0;
    }

    let global_sim = score as f64 / (n + m) as f64;
    let (local_sim, similarity) = if max > 0 {
        let local = score as f64 / max as f64;
        let r = matches as f64 / n.max(m) as f64;
        (local, r * local + (1.0 - r) * global_sim)
    } else {
        (0.0, 0.0)
    };

    let token_i = token_extent(trace.iter().map(|p| p.i), ci);
    let token_j = token_extent(trace.iter().map(|p| p.j), cj);
    let rendered = format!(
        "{} [{}]\n{}\n{} [{}]",
        row_i, token_i, row_mark, row_j, token_j
    );

    Alignment {
        trace,
        score,
        matches,
        global_sim,
        local_sim,
        similarity,
        extent_i,
        extent_j,
        token_i,
        token_j,
        rendered,
    }
}

/// Mismatch penalty for every token character between the start of the
/// aligned window and the preceding token boundary.
fn flank_penalty_before(start: usize, seq: &[char], params: &ScoringParams) -> i32 {
    let mut i = start;
    while i < seq.len() && seq[i].is_whitespace() {
        i += 1;
    }
    let mut penalty = 0;
    while i > 0 && is_token_char(seq[i - 1]) {
        penalty += params.mismatch_penalty;
        i -= 1;
    }
    penalty
}

/// Mismatch penalty for every token character between the end of the
/// aligned window and the following token boundary.
fn flank_penalty_after(end: usize, seq: &[char], params: &ScoringParams) -> i32 {
    let mut i = end;
    while i > 0 && seq[i].is_whitespace() {
        i -= 1;
    }
    let mut penalty = 0;
    let mut k = i + 1;
    while k < seq.len() && is_token_char(seq[k]) {
        penalty += params.mismatch_penalty;
        k += 1;
    }
    penalty
}

/// Substring of `seq` spanned by the aligned indices, extended outward to
/// the surrounding token boundaries.
fn token_extent(indices: impl Iterator<Item = i32> + Clone, seq: &[char]) -> String {
    let mut i = match indices.clone().find(|&v| v >= 0) {
        Some(v) => v as usize,
        None => return String::new(),
    };
    let mut j = match indices.collect::<Vec<_>>().iter().rev().find(|&&v| v >= 0) {
        Some(&v) => v as usize,
        None => return String::new(),
    };

    while i > 0 && is_token_char(seq[i]) {
        i -= 1;
    }
    while i < seq.len() && !is_token_char(seq[i]) {
        i += 1;
    }
    while j < seq.len() && is_token_char(seq[j]) {
        j += 1;
    }

    if i >= j {
        return String::new();
    }
    seq[i..j].iter().collect()
}
