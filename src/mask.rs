use image::{GrayImage, Luma};
use imageproc::drawing::draw_polygon_mut;
use imageproc::geometry::convex_hull as hull_of;
use imageproc::point::Point;

use crate::face::{self, LandmarkSet};
use crate::warp::BoundingRect;

// landmarks rounded to the pixel grid
fn pixel_points(landmarks: &LandmarkSet) -> Vec<Point<i32>> {
    landmarks
        .points()
        .iter()
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .map(|p| Point::new(p.x.round() as i32, p.y.round() as i32))
        .collect()
}

/// Convex hull of the landmark set in pixel coordinates.
pub fn convex_hull(landmarks: &LandmarkSet) -> Vec<Point<i32>> {
    let points = pixel_points(landmarks);
    if points.is_empty() {
        return Vec::new();
    }
    hull_of(&points)
}

/// Rasterizes the filled convex hull of `landmarks` into a `width x height`
/// mask, 255 inside and 0 outside. A hull with fewer than three corners
/// yields an empty mask.
pub fn build_mask(size: (u32, u32), landmarks: &LandmarkSet) -> GrayImage {
    let (width, height) = size;
    let mut mask = GrayImage::new(width, height);

    let hull = convex_hull(landmarks);
    if hull.len() >= 3 {
        draw_polygon_mut(&mut mask, &hull, Luma([255u8]));
    }

    mask
}

/// Centre of the bounding box of the landmarks' convex hull, used as the
/// seamless-blend anchor.
pub fn hull_center(landmarks: &LandmarkSet) -> Option<(i64, i64)> {
    let hull: Vec<face::Point> = convex_hull(landmarks)
        .iter()
        .map(|p| face::Point::new(p.x as f32, p.y as f32))
        .collect();

    let rect = BoundingRect::from_points(&hull);
    if rect.is_empty() {
        None
    } else {
        Some(rect.center())
    }
}

/// Bounding box of the non-zero pixels of `mask`.
pub fn mask_bounds(mask: &GrayImage) -> Option<BoundingRect> {
    let mut x_min = u32::MAX;
    let mut y_min = u32::MAX;
    let mut x_max = 0;
    let mut y_max = 0;
    let mut any = false;

    for (x, y, p) in mask.enumerate_pixels() {
        if p[0] == 0 {
            continue;
        }
        any = true;
        x_min = x_min.min(x);
        y_min = y_min.min(y);
        x_max = x_max.max(x);
        y_max = y_max.max(y);
    }

    any.then(|| BoundingRect {
        x: x_min as i64,
        y: y_min as i64,
        width: x_max - x_min + 1,
        height: y_max - y_min + 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> LandmarkSet {
        LandmarkSet::from_flat(&[
            50.0, 10.0, 90.0, 50.0, 50.0, 90.0, 10.0, 50.0, 50.0, 50.0, 40.0, 45.0,
        ])
    }

    #[test]
    fn hull_drops_interior_points() {
        let hull = convex_hull(&diamond());
        assert_eq!(hull.len(), 4);
        assert!(!hull.contains(&Point::new(50, 50)));
    }

    #[test]
    fn mask_is_filled_hull() {
        let mask = build_mask((100, 100), &diamond());
        assert_eq!(mask.dimensions(), (100, 100));
        assert_eq!(mask.get_pixel(50, 50)[0], 255);
        assert_eq!(mask.get_pixel(50, 12)[0], 255);
        assert_eq!(mask.get_pixel(15, 15)[0], 0);
        assert_eq!(mask.get_pixel(95, 95)[0], 0);
        assert!(mask.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn degenerate_hull_gives_empty_mask() {
        let line = LandmarkSet::from_flat(&[1.0, 1.0, 5.0, 5.0, 9.0, 9.0]);
        let mask = build_mask((16, 16), &line);
        assert!(mask.pixels().all(|p| p[0] == 0));
        assert!(mask_bounds(&mask).is_none());
    }

    #[test]
    fn center_matches_mask_bounds() {
        let landmarks = diamond();
        let mask = build_mask((100, 100), &landmarks);
        let bounds = mask_bounds(&mask).unwrap();

        assert_eq!(bounds, BoundingRect { x: 10, y: 10, width: 81, height: 81 });
        assert_eq!(hull_center(&landmarks), Some(bounds.center()));
        assert_eq!(hull_center(&LandmarkSet::new(Vec::new())), None);
    }
}
