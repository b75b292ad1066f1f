use image::RgbImage;
use nalgebra::Point2;

use crate::error::{Error, Result};
use crate::triangulation;

pub type Point = Point2<f32>;

// ordered 2D face landmarks in pixel coordinates. Index i refers to the same
// facial feature in every set produced by the same detector.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Point>,
}

// construct from 1D vector of 2D points (flattened [x0, y0, x1, y1, ...])

impl LandmarkSet {
    pub fn new(points: Vec<Point>) -> LandmarkSet {
        LandmarkSet { points }
    }

    pub fn from_flat(values: &[f32]) -> LandmarkSet {
        let mut landmarks = LandmarkSet { points: Vec::new() };
        for i in 0..values.len() / 2 {
            landmarks
                .points
                .push(Point::new(values[i * 2], values[i * 2 + 1]));
        }
        landmarks
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<Point> {
        self.points.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_finite(&self) -> bool {
        self.points.iter().all(|p| p.x.is_finite() && p.y.is_finite())
    }

    /// Resolves the three indices of `triangle` against this set.
    ///
    /// Returns `None` when an index is out of range, which happens when the set
    /// comes from a detector with a different topology.
    pub fn triangle_points(&self, triangle: &Triangle) -> Option<[Point; 3]> {
        let [i, j, k] = triangle.indices();
        Some([self.get(i)?, self.get(j)?, self.get(k)?])
    }
}

/// Twice the signed area of the triangle `abc`, positive when counter-clockwise
/// in a y-up frame.
pub fn signed_area(a: Point, b: Point, c: Point) -> f64 {
    let (ax, ay) = (a.x as f64, a.y as f64);
    let (bx, by) = (b.x as f64, b.y as f64);
    let (cx, cy) = (c.x as f64, c.y as f64);
    (bx - ax) * (cy - ay) - (by - ay) * (cx - ax)
}

// index triple into a landmark set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Triangle([usize; 3]);

impl Triangle {
    /// Builds a triangle from three landmark indices, rejecting repeated
    /// indices and triangles with zero area in `landmarks`. The indices are
    /// reordered so the triangle has positive signed area in `landmarks`.
    pub fn new(indices: [usize; 3], landmarks: &LandmarkSet) -> Option<Triangle> {
        let [i, j, k] = indices;
        if i == j || j == k || i == k {
            return None;
        }

        let area = signed_area(landmarks.get(i)?, landmarks.get(j)?, landmarks.get(k)?);
        if area.abs() <= f64::EPSILON {
            return None;
        }

        if area > 0.0 {
            Some(Triangle([i, j, k]))
        } else {
            Some(Triangle([i, k, j]))
        }
    }

    pub fn indices(&self) -> [usize; 3] {
        self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    triangles: Vec<Triangle>,
}

impl TriangleMesh {
    pub fn new(triangles: Vec<Triangle>) -> TriangleMesh {
        TriangleMesh { triangles }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Triangle> {
        self.triangles.iter()
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Total unsigned area of the mesh evaluated over `landmarks`.
    pub fn area(&self, landmarks: &LandmarkSet) -> f64 {
        self.triangles
            .iter()
            .filter_map(|t| landmarks.triangle_points(t))
            .map(|[a, b, c]| signed_area(a, b, c).abs() / 2.0)
            .sum()
    }

    /// Returns, for every landmark index below `len`, whether some triangle
    /// uses it.
    pub fn covered_indices(&self, len: usize) -> Vec<bool> {
        let mut covered = vec![false; len];
        for index in self.triangles.iter().flat_map(|t| t.indices()) {
            if let Some(slot) = covered.get_mut(index) {
                *slot = true;
            }
        }
        covered
    }
}

/// The cached source face: texture, its landmarks and the mesh triangulated
/// from them. Never mutated once built, a new target face means a new bundle.
#[derive(Debug, Clone)]
pub struct FaceBundle {
    texture: RgbImage,
    landmarks: LandmarkSet,
    mesh: TriangleMesh,
}

impl FaceBundle {
    pub fn new(texture: RgbImage, landmarks: LandmarkSet, tolerance: f32) -> Result<FaceBundle> {
        if landmarks.len() < 3 {
            return Err(Error::InvalidLandmarks(format!(
                "need at least 3 landmarks, got {}",
                landmarks.len()
            )));
        }
        if !landmarks.is_finite() {
            return Err(Error::InvalidLandmarks(
                "landmarks contain non-finite coordinates".to_string(),
            ));
        }

        let mesh = triangulation::triangulate(&landmarks, tolerance);
        if mesh.is_empty() {
            return Err(Error::InvalidLandmarks(
                "landmarks do not span a triangle".to_string(),
            ));
        }

        Ok(FaceBundle {
            texture,
            landmarks,
            mesh,
        })
    }

    pub fn texture(&self) -> &RgbImage {
        &self.texture
    }

    pub fn landmarks(&self) -> &LandmarkSet {
        &self.landmarks
    }

    pub fn mesh(&self) -> &TriangleMesh {
        &self.mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> LandmarkSet {
        LandmarkSet::from_flat(&[0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0])
    }

    #[test]
    fn from_flat_pairs_coordinates() {
        let landmarks = LandmarkSet::from_flat(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(landmarks.len(), 2);
        assert_eq!(landmarks.get(1), Some(Point::new(3.0, 4.0)));
        assert_eq!(landmarks.get(2), None);
    }

    #[test]
    fn triangle_rejects_repeated_and_collinear() {
        let landmarks = LandmarkSet::from_flat(&[0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 0.0, 5.0]);
        assert!(Triangle::new([0, 0, 1], &landmarks).is_none());
        assert!(Triangle::new([0, 1, 2], &landmarks).is_none());
        assert!(Triangle::new([0, 1, 9], &landmarks).is_none());
        assert!(Triangle::new([0, 1, 3], &landmarks).is_some());
    }

    #[test]
    fn triangle_is_reordered_to_positive_area() {
        let landmarks = square();
        let t = Triangle::new([0, 3, 1], &landmarks).unwrap();
        let [a, b, c] = landmarks.triangle_points(&t).unwrap();
        assert!(signed_area(a, b, c) > 0.0);
    }

    #[test]
    fn mesh_area_and_coverage() {
        let landmarks = square();
        let mesh = TriangleMesh::new(vec![
            Triangle::new([0, 1, 2], &landmarks).unwrap(),
            Triangle::new([0, 2, 3], &landmarks).unwrap(),
        ]);
        assert!((mesh.area(&landmarks) - 100.0).abs() < 1e-9);
        assert!(mesh.covered_indices(4).iter().all(|&c| c));
    }

    #[test]
    fn bundle_rejects_bad_landmarks() {
        let texture = RgbImage::new(16, 16);
        let few = LandmarkSet::from_flat(&[0.0, 0.0, 1.0, 1.0]);
        assert!(FaceBundle::new(texture.clone(), few, 1.0).is_err());

        let nan = LandmarkSet::from_flat(&[0.0, 0.0, 1.0, f32::NAN, 4.0, 4.0]);
        assert!(FaceBundle::new(texture.clone(), nan, 1.0).is_err());

        let line = LandmarkSet::from_flat(&[0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
        assert!(FaceBundle::new(texture.clone(), line, 1.0).is_err());

        let bundle = FaceBundle::new(texture, square(), 1.0).unwrap();
        assert_eq!(bundle.mesh().len(), 2);
    }
}
