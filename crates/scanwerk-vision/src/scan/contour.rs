// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Closed-contour simplification (Douglas-Peucker) and the epsilon ladder used
// to reduce a traced border to four corners.

use scanwerk_core::geometry::Point2D;

/// Arc length of a closed polyline.
pub(crate) fn perimeter(points: &[Point2D]) -> f64 {
    let n = points.len();
    if n < 2 {
        return 0.0;
    }
    (0..n).map(|i| points[i].distance(&points[(i + 1) % n])).sum()
}

/// Try each tolerance on the ladder `[min, max]` (as fractions of the
/// perimeter) and return the first simplification with exactly four vertices.
pub(crate) fn approximate_quad(
    points: &[Point2D],
    epsilon_min: f64,
    epsilon_max: f64,
    epsilon_step: f64,
) -> Option<[Point2D; 4]> {
    let length = perimeter(points);
    if length <= 0.0 {
        return None;
    }
    let steps = ((epsilon_max - epsilon_min) / epsilon_step + 1e-9).floor() as usize;
    (0..=steps).find_map(|i| {
        let epsilon = (epsilon_min + i as f64 * epsilon_step) * length;
        let simplified = approximate_closed(points, epsilon);
        <[Point2D; 4]>::try_from(simplified).ok()
    })
}

/// Douglas-Peucker on a closed polyline.
///
/// The loop is split at two mutually distant anchors, both halves are
/// simplified as open chains, and vertices left within `epsilon` of the chord
/// through their neighbours are dropped.
pub(crate) fn approximate_closed(points: &[Point2D], epsilon: f64) -> Vec<Point2D> {
    let n = points.len();
    if n <= 3 {
        return points.to_vec();
    }

    let b = farthest_from(points, &points[0]);
    let a = farthest_from(points, &points[b]);
    if a == b {
        return vec![points[a]];
    }

    let forward: Vec<Point2D> = walk(points, a, b);
    let backward: Vec<Point2D> = walk(points, b, a);

    let mut result = simplify_open(&forward, epsilon);
    let mut tail = simplify_open(&backward, epsilon);
    // Both chains share their end points.
    result.pop();
    tail.pop();
    result.append(&mut tail);

    prune_flat_vertices(result, epsilon)
}

fn farthest_from(points: &[Point2D], origin: &Point2D) -> usize {
    points
        .iter()
        .enumerate()
        .max_by(|(_, p), (_, q)| origin.distance(p).total_cmp(&origin.distance(q)))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Indices `from..=to` walking forward around the loop.
fn walk(points: &[Point2D], from: usize, to: usize) -> Vec<Point2D> {
    let n = points.len();
    let len = (to + n - from) % n + 1;
    (0..len).map(|k| points[(from + k) % n]).collect()
}

/// Classic open-chain Douglas-Peucker, iterative.
fn simplify_open(chain: &[Point2D], epsilon: f64) -> Vec<Point2D> {
    let n = chain.len();
    if n <= 2 {
        return chain.to_vec();
    }
    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut stack = vec![(0usize, n - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let (mut best, mut best_dist) = (start, 0.0f64);
        for i in start + 1..end {
            let d = segment_distance(&chain[i], &chain[start], &chain[end]);
            if d > best_dist {
                best = i;
                best_dist = d;
            }
        }
        if best_dist > epsilon {
            keep[best] = true;
            stack.push((start, best));
            stack.push((best, end));
        }
    }

    chain
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

/// Remove vertices that sit within `epsilon` of the segment joining their
/// neighbours, until none remain or only a triangle is left.
fn prune_flat_vertices(mut points: Vec<Point2D>, epsilon: f64) -> Vec<Point2D> {
    loop {
        let n = points.len();
        if n <= 3 {
            return points;
        }
        let flattest = (0..n)
            .map(|i| {
                let d = segment_distance(&points[i], &points[(i + n - 1) % n], &points[(i + 1) % n]);
                (i, d)
            })
            .min_by(|x, y| x.1.total_cmp(&y.1));
        match flattest {
            Some((i, d)) if d <= epsilon => {
                points.remove(i);
            }
            _ => return points,
        }
    }
}

/// Distance from `p` to the segment `ab`.
fn segment_distance(p: &Point2D, a: &Point2D, b: &Point2D) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f64::EPSILON {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance(&Point2D::new(a.x + t * dx, a.y + t * dy))
}
