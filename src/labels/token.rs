use tracing::trace;

use crate::collab::LabelInterpreter;
use crate::config::LabelConfig;

use super::{Glyph, LabelToken};

/// Concatenations that are two labels, not one, whenever both halves read
/// as labels by themselves.
const EXCEPTIONS: [(&str, &str); 9] = [
    ("O", "O"),
    ("S", "S"),
    ("N", "N"),
    ("F", "F"),
    ("I", "I"),
    ("Cl", "Cl"),
    ("Br", "Br"),
    ("OH", "HO"),
    ("HO", "OH"),
];

fn may_link(
    left: &Glyph,
    right: &Glyph,
    max_dist: f64,
    cfg: &LabelConfig,
) -> Option<f64> {
    let (lb, rb) = (left.shape.bounds(), right.shape.bounds());
    let (lc, rc) = (lb.center(), rb.center());
    let dx = rc.x - lc.x;
    if dx <= 0.0 {
        return None;
    }
    let dist = lc.distance(rc);
    if dist > max_dist {
        return None;
    }
    let min_overlap = if left.ch() == 'S' || right.ch() == 'S' {
        cfg.relaxed_vertical_overlap
    } else {
        cfg.min_vertical_overlap
    };
    if lb.vertical_overlap(&rb) < min_overlap {
        return None;
    }
    if (rc.y - lc.y).abs() / dx > cfg.max_token_slope {
        return None;
    }
    Some(dist)
}

/// Splits a chain where an exception pair meets and both halves interpret.
fn split_exceptions<'g>(
    chain: Vec<&'g Glyph>,
    interpreter: &dyn LabelInterpreter,
) -> Vec<Vec<&'g Glyph>> {
    let text: Vec<char> = chain.iter().map(|g| g.ch()).collect();
    for k in 1..chain.len() {
        let left: String = text[..k].iter().collect();
        let right: String = text[k..].iter().collect();
        let listed = EXCEPTIONS.iter().any(|&(l, r)| l == left && r == right);
        if listed && interpreter.interpret(&left).is_some() && interpreter.interpret(&right).is_some() {
            trace!(%left, %right, "kept labels apart");
            let mut chain = chain;
            let tail = chain.split_off(k);
            let mut out = vec![chain];
            out.extend(split_exceptions(tail, interpreter));
            return out;
        }
    }
    vec![chain]
}

/// Groups text glyphs into left-to-right tokens.
///
/// Each glyph links to its nearest compatible right neighbour. A hyphen
/// breaks the token unless it follows a lone "t" (as in "t-Bu").
pub fn group_tokens(
    glyphs: &[&Glyph],
    scale: f64,
    cfg: &LabelConfig,
    interpreter: &dyn LabelInterpreter,
) -> Vec<LabelToken> {
    let n = glyphs.len();
    if n == 0 {
        return Vec::new();
    }
    let mean_width = glyphs
        .iter()
        .map(|g| g.shape.bounds().width() + 1.0)
        .sum::<f64>()
        / n as f64;
    let max_dist = (scale * cfg.spacing_ratio).max(mean_width);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        glyphs[a]
            .shape
            .bounds()
            .min_x
            .total_cmp(&glyphs[b].shape.bounds().min_x)
    });

    let mut left: Vec<Option<usize>> = vec![None; n];
    let mut right: Vec<Option<usize>> = vec![None; n];
    let lone_t = |i: usize, left: &[Option<usize>]| glyphs[i].ch() == 't' && left[i].is_none();

    for &i in &order {
        if glyphs[i].ch() == '-' {
            match left[i] {
                Some(t) if lone_t(t, &left) => {}
                _ => continue,
            }
        }
        let mut best: Option<(f64, usize)> = None;
        for &j in &order {
            if j == i || left[j].is_some() {
                continue;
            }
            if glyphs[j].ch() == '-' && !lone_t(i, &left) {
                continue;
            }
            if let Some(d) = may_link(glyphs[i], glyphs[j], max_dist, cfg) {
                if best.map_or(true, |(bd, _)| d < bd) {
                    best = Some((d, j));
                }
            }
        }
        if let Some((_, j)) = best {
            right[i] = Some(j);
            left[j] = Some(i);
        }
    }

    let mut tokens = Vec::new();
    for &start in &order {
        if left[start].is_some() {
            continue;
        }
        let mut chain = vec![glyphs[start]];
        let mut cur = start;
        while let Some(next) = right[cur] {
            chain.push(glyphs[next]);
            cur = next;
        }
        for part in split_exceptions(chain, interpreter) {
            tokens.extend(LabelToken::from_glyphs(&part));
        }
    }
    tokens
}
