// triangles are index triples into the landmark set, so one mesh serves every frame

use std::collections::HashMap;

use log::debug;

use crate::face::{LandmarkSet, Point, Triangle, TriangleMesh};

const DUPLICATE_EPSILON: f64 = 1e-9;

/// Triangulates `landmarks` and maps every triangle back to landmark indices.
///
/// A vertex resolves to the nearest landmark closer than `tolerance` pixels on
/// both axes. Triangles with an unresolved vertex, a repeated index or zero
/// area are dropped.
pub fn triangulate(landmarks: &LandmarkSet, tolerance: f32) -> TriangleMesh {
    let grid = LandmarkGrid::new(landmarks, tolerance);

    let mut triangles = Vec::new();
    let mut discarded = 0;
    for corners in delaunay(landmarks.points()) {
        let resolved = (
            grid.resolve(corners[0]),
            grid.resolve(corners[1]),
            grid.resolve(corners[2]),
        );
        let triangle = match resolved {
            (Some(i), Some(j), Some(k)) => Triangle::new([i, j, k], landmarks),
            _ => None,
        };
        match triangle {
            Some(triangle) => triangles.push(triangle),
            None => discarded += 1,
        }
    }

    debug!(
        "triangulated {} landmarks into {} triangles ({} discarded)",
        landmarks.len(),
        triangles.len(),
        discarded
    );

    TriangleMesh::new(triangles)
}

/// Incremental (Bowyer-Watson) Delaunay triangulation over a bounding
/// super-rectangle. Returns triangles as coordinate triples, counter-clockwise.
pub fn delaunay(points: &[Point]) -> Vec<[Point; 3]> {
    let finite: Vec<[f64; 2]> = points
        .iter()
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .map(|p| [p.x as f64, p.y as f64])
        .collect();

    if finite.len() < 3 {
        return Vec::new();
    }

    let mut mesh = Subdivision::new(&finite);
    for point in finite {
        if mesh.contains_vertex(point) {
            continue;
        }
        if !mesh.insert(point) {
            debug!("skipped landmark ({}, {}) during triangulation", point[0], point[1]);
        }
    }

    mesh.into_triangles()
}

// ccw > 0
fn orient(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

// > 0 when d lies strictly inside the circumcircle of the ccw triangle abc
fn in_circle(a: [f64; 2], b: [f64; 2], c: [f64; 2], d: [f64; 2]) -> f64 {
    let (adx, ady) = (a[0] - d[0], a[1] - d[1]);
    let (bdx, bdy) = (b[0] - d[0], b[1] - d[1]);
    let (cdx, cdy) = (c[0] - d[0], c[1] - d[1]);

    (adx * adx + ady * ady) * (bdx * cdy - cdx * bdy)
        + (bdx * bdx + bdy * bdy) * (cdx * ady - adx * cdy)
        + (cdx * cdx + cdy * cdy) * (adx * bdy - bdx * ady)
}

fn edges(t: [usize; 3]) -> [(usize, usize); 3] {
    [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])]
}

struct Subdivision {
    vertices: Vec<[f64; 2]>,
    // ccw vertex indices, the first four vertices are the super-rectangle
    triangles: Vec<[usize; 3]>,
}

impl Subdivision {
    fn new(points: &[[f64; 2]]) -> Self {
        let (mut min_x, mut min_y) = (f64::MAX, f64::MAX);
        let (mut max_x, mut max_y) = (f64::MIN, f64::MIN);
        for p in points {
            min_x = min_x.min(p[0]);
            min_y = min_y.min(p[1]);
            max_x = max_x.max(p[0]);
            max_y = max_y.max(p[1]);
        }

        let span = (max_x - min_x).max(max_y - min_y).max(1.0);
        let margin = span * 100.0;

        let vertices = vec![
            [min_x - margin, min_y - margin],
            [max_x + margin, min_y - margin],
            [max_x + margin, max_y + margin],
            [min_x - margin, max_y + margin],
        ];

        Self {
            vertices,
            triangles: vec![[0, 1, 2], [0, 2, 3]],
        }
    }

    fn contains_vertex(&self, point: [f64; 2]) -> bool {
        self.vertices[4..].iter().any(|v| {
            (v[0] - point[0]).abs() <= DUPLICATE_EPSILON
                && (v[1] - point[1]).abs() <= DUPLICATE_EPSILON
        })
    }

    fn locate(&self, p: [f64; 2]) -> Option<usize> {
        self.triangles.iter().position(|&t| {
            edges(t)
                .iter()
                .all(|&(a, b)| orient(self.vertices[a], self.vertices[b], p) >= 0.0)
        })
    }

    // triangle on the other side of the directed edge a -> b
    fn across(&self, (a, b): (usize, usize)) -> Option<usize> {
        self.triangles
            .iter()
            .position(|&t| edges(t).contains(&(b, a)))
    }

    fn circumcircle_contains(&self, t: usize, p: [f64; 2]) -> bool {
        let [a, b, c] = self.triangles[t];
        in_circle(self.vertices[a], self.vertices[b], self.vertices[c], p) > 0.0
    }

    fn boundary(&self, cavity: &[usize]) -> Vec<(usize, usize)> {
        let cavity_edges: Vec<(usize, usize)> = cavity
            .iter()
            .flat_map(|&t| edges(self.triangles[t]))
            .collect();

        cavity_edges
            .iter()
            .copied()
            .filter(|&(a, b)| !cavity_edges.contains(&(b, a)))
            .collect()
    }

    fn insert(&mut self, p: [f64; 2]) -> bool {
        let Some(start) = self.locate(p) else {
            return false;
        };

        // grow the cavity through neighbours whose circumcircle holds p
        let mut cavity = vec![start];
        let mut stack = vec![start];
        while let Some(t) = stack.pop() {
            for edge in edges(self.triangles[t]) {
                if let Some(n) = self.across(edge) {
                    if !cavity.contains(&n) && self.circumcircle_contains(n, p) {
                        cavity.push(n);
                        stack.push(n);
                    }
                }
            }
        }

        // the cavity must be star-shaped around p
        let boundary = loop {
            let boundary = self.boundary(&cavity);
            let hidden = boundary
                .iter()
                .copied()
                .find(|&(a, b)| orient(self.vertices[a], self.vertices[b], p) <= 0.0);

            match hidden {
                None => break boundary,
                Some(edge) => match self.across(edge) {
                    Some(n) if !cavity.contains(&n) => cavity.push(n),
                    _ => return false,
                },
            }
        };

        let index = self.vertices.len();
        self.vertices.push(p);

        cavity.sort_unstable_by(|a, b| b.cmp(a));
        for t in cavity {
            self.triangles.swap_remove(t);
        }
        for (a, b) in boundary {
            self.triangles.push([a, b, index]);
        }

        true
    }

    fn into_triangles(self) -> Vec<[Point; 3]> {
        let to_point = |i: usize| Point::new(self.vertices[i][0] as f32, self.vertices[i][1] as f32);

        self.triangles
            .iter()
            .filter(|t| t.iter().all(|&i| i >= 4))
            .map(|t| [to_point(t[0]), to_point(t[1]), to_point(t[2])])
            .collect()
    }
}

/// Uniform grid over a landmark set for nearest-landmark lookups.
pub struct LandmarkGrid<'a> {
    landmarks: &'a LandmarkSet,
    cell_size: f32,
    cells: HashMap<(i64, i64), Vec<usize>>,
}

impl<'a> LandmarkGrid<'a> {
    pub fn new(landmarks: &'a LandmarkSet, tolerance: f32) -> Self {
        let cell_size = tolerance.max(1e-3);
        let mut cells: HashMap<(i64, i64), Vec<usize>> = HashMap::new();

        for (i, p) in landmarks.points().iter().enumerate() {
            if p.x.is_finite() && p.y.is_finite() {
                cells.entry(Self::cell(*p, cell_size)).or_default().push(i);
            }
        }

        Self {
            landmarks,
            cell_size,
            cells,
        }
    }

    fn cell(p: Point, cell_size: f32) -> (i64, i64) {
        (
            (p.x / cell_size).floor() as i64,
            (p.y / cell_size).floor() as i64,
        )
    }

    /// Index of the landmark nearest to `p`, if one lies within the tolerance
    /// on both axes. Ties go to the lower index.
    pub fn resolve(&self, p: Point) -> Option<usize> {
        let (cx, cy) = Self::cell(p, self.cell_size);
        let mut best: Option<(f32, usize)> = None;

        for dx in -1..=1 {
            for dy in -1..=1 {
                let Some(candidates) = self.cells.get(&(cx + dx, cy + dy)) else {
                    continue;
                };
                for &i in candidates {
                    let q = self.landmarks.points()[i];
                    let (ex, ey) = ((q.x - p.x).abs(), (q.y - p.y).abs());
                    if ex >= self.cell_size || ey >= self.cell_size {
                        continue;
                    }
                    let d = ex * ex + ey * ey;
                    let better = match best {
                        None => true,
                        Some((bd, bi)) => d < bd || (d == bd && i < bi),
                    };
                    if better {
                        best = Some((d, i));
                    }
                }
            }
        }

        best.map(|(_, i)| i)
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;
    use crate::face::signed_area;

    fn circle_face(n: usize, radius: f32, center: (f32, f32)) -> LandmarkSet {
        let mut points = Vec::new();
        for i in 0..n {
            let a = 2.0 * PI * i as f32 / n as f32;
            points.push(Point::new(
                center.0 + radius * a.cos(),
                center.1 + radius * a.sin(),
            ));
        }
        // interior features
        for &(dx, dy) in &[(0.0, 0.0), (-20.0, -15.0), (20.0, -15.0), (0.0, 10.0), (-12.0, 25.0), (12.0, 25.0)] {
            points.push(Point::new(center.0 + dx, center.1 + dy));
        }
        LandmarkSet::new(points)
    }

    fn polygon_area(n: usize, radius: f32) -> f64 {
        let r = radius as f64;
        0.5 * n as f64 * r * r * (2.0 * std::f64::consts::PI / n as f64).sin()
    }

    #[test]
    fn square_with_center_gives_four_triangles() {
        let landmarks =
            LandmarkSet::from_flat(&[0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0, 5.0, 5.0]);
        let mesh = triangulate(&landmarks, 1.0);
        assert_eq!(mesh.len(), 4);
        assert!((mesh.area(&landmarks) - 100.0).abs() < 1e-6);
        assert!(mesh.covered_indices(5).iter().all(|&c| c));
    }

    #[test]
    fn mesh_covers_convex_hull() {
        let landmarks = circle_face(32, 80.0, (320.0, 240.0));
        let mesh = triangulate(&landmarks, 1.0);

        let hull = polygon_area(32, 80.0);
        let area = mesh.area(&landmarks);
        assert!((area - hull).abs() / hull < 1e-3, "mesh area {area} vs hull {hull}");
        assert!(mesh.covered_indices(landmarks.len()).iter().all(|&c| c));
    }

    #[test]
    fn delaunay_triangles_are_ccw_and_empty_circled() {
        let landmarks = circle_face(16, 50.0, (100.0, 100.0));
        let triangles = delaunay(landmarks.points());
        assert!(!triangles.is_empty());

        for [a, b, c] in &triangles {
            assert!(signed_area(*a, *b, *c) > 0.0);
            let abc = [
                [a.x as f64, a.y as f64],
                [b.x as f64, b.y as f64],
                [c.x as f64, c.y as f64],
            ];
            for p in landmarks.points() {
                let d = in_circle(abc[0], abc[1], abc[2], [p.x as f64, p.y as f64]);
                assert!(d < 1e-3, "point inside circumcircle by {d}");
            }
        }
    }

    #[test]
    fn duplicate_landmarks_do_not_break_the_mesh() {
        let landmarks = LandmarkSet::from_flat(&[
            0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0, 10.0, 10.0,
        ]);
        let mesh = triangulate(&landmarks, 1.0);
        assert_eq!(mesh.len(), 2);
        assert!((mesh.area(&landmarks) - 100.0).abs() < 1e-6);
    }

    #[test]
    fn collinear_points_have_no_triangles() {
        let landmarks = LandmarkSet::from_flat(&[0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
        assert!(triangulate(&landmarks, 1.0).is_empty());
    }

    #[test]
    fn grid_resolves_within_tolerance_only() {
        let landmarks = LandmarkSet::from_flat(&[10.0, 10.0, 10.6, 10.0, 50.0, 50.0]);
        let grid = LandmarkGrid::new(&landmarks, 1.0);

        assert_eq!(grid.resolve(Point::new(10.1, 10.0)), Some(0));
        assert_eq!(grid.resolve(Point::new(10.5, 10.0)), Some(1));
        assert_eq!(grid.resolve(Point::new(50.9, 49.2)), Some(2));
        assert_eq!(grid.resolve(Point::new(52.0, 50.0)), None);
    }
}
