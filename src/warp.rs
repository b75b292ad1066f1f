use image::{imageops, GrayImage, Luma, Rgb, RgbImage};
use log::debug;
use nalgebra::Matrix3;

use crate::face::{LandmarkSet, Point, TriangleMesh};
use crate::utils::clamp;

const MIN_DETERMINANT: f64 = 1e-9;
const EDGE_TOLERANCE: f64 = 1e-6;

// homogeneous 3x3, last row 0 0 1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    matrix: Matrix3<f64>,
}

impl AffineTransform {
    /// The affine map taking `src[i]` to `dst[i]`, `None` for a degenerate
    /// source triangle.
    pub fn from_triangles(src: [Point; 3], dst: [Point; 3]) -> Option<Self> {
        let homogeneous = |p: [Point; 3]| {
            Matrix3::new(
                p[0].x as f64, p[1].x as f64, p[2].x as f64,
                p[0].y as f64, p[1].y as f64, p[2].y as f64,
                1.0, 1.0, 1.0,
            )
        };

        let s = homogeneous(src);
        if s.determinant().abs() < MIN_DETERMINANT {
            return None;
        }
        let s_inverse = s.try_inverse()?;

        Some(Self {
            matrix: homogeneous(dst) * s_inverse,
        })
    }

    pub fn inverse(&self) -> Option<Self> {
        if self.matrix.determinant().abs() < MIN_DETERMINANT {
            return None;
        }
        self.matrix.try_inverse().map(|matrix| Self { matrix })
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.matrix;
        (
            m[(0, 0)] * x + m[(0, 1)] * y + m[(0, 2)],
            m[(1, 0)] * x + m[(1, 1)] * y + m[(1, 2)],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingRect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl BoundingRect {
    pub fn from_points(points: &[Point]) -> Self {
        let mut x_min = f32::MAX;
        let mut y_min = f32::MAX;
        let mut x_max = f32::MIN;
        let mut y_max = f32::MIN;

        for p in points.iter() {
            x_min = x_min.min(p.x);
            y_min = y_min.min(p.y);
            x_max = x_max.max(p.x);
            y_max = y_max.max(p.y);
        }

        if points.is_empty() || !(x_min.is_finite() && y_max.is_finite()) {
            return Self { x: 0, y: 0, width: 0, height: 0 };
        }

        let x = x_min.floor() as i64;
        let y = y_min.floor() as i64;
        Self {
            x,
            y,
            width: (x_max.floor() as i64 - x + 1) as u32,
            height: (y_max.floor() as i64 - y + 1) as u32,
        }
    }

    pub fn clip(&self, width: u32, height: u32) -> Self {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = (self.x + self.width as i64).min(width as i64);
        let y1 = (self.y + self.height as i64).min(height as i64);

        Self {
            x: x0,
            y: y0,
            width: (x1 - x0).max(0) as u32,
            height: (y1 - y0).max(0) as u32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn center(&self) -> (i64, i64) {
        (
            self.x + (self.width / 2) as i64,
            self.y + (self.height / 2) as i64,
        )
    }
}

// BORDER_REFLECT_101: gfedcb|abcdefgh|gfedcba
fn reflect_101(i: i64, len: u32) -> u32 {
    let len = len as i64;
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let i = i.rem_euclid(period);
    (if i >= len { period - i } else { i }) as u32
}

fn sample_bilinear(image: &RgbImage, x: f64, y: f64) -> [f64; 3] {
    let (width, height) = image.dimensions();
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let xs = [reflect_101(x0 as i64, width), reflect_101(x0 as i64 + 1, width)];
    let ys = [reflect_101(y0 as i64, height), reflect_101(y0 as i64 + 1, height)];
    let taps = [(xs[0], ys[0]), (xs[1], ys[0]), (xs[0], ys[1]), (xs[1], ys[1])];
    let weights = [
        (1.0 - fx) * (1.0 - fy),
        fx * (1.0 - fy),
        (1.0 - fx) * fy,
        fx * fy,
    ];

    let mut out = [0.0; 3];
    for (weight, (px, py)) in weights.iter().zip(taps) {
        if *weight == 0.0 {
            continue;
        }
        let pixel = image.get_pixel(px, py);
        for c in 0..3 {
            out[c] += weight * pixel[c] as f64;
        }
    }
    out
}

// closed triangle, pixels on an edge count as inside
pub fn fill_triangle(mask: &mut GrayImage, tri: [(f64, f64); 3]) {
    let orient = |a: (f64, f64), b: (f64, f64), p: (f64, f64)| {
        (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
    };

    let area = orient(tri[0], tri[1], tri[2]);
    if area == 0.0 {
        return;
    }
    let sign = area.signum();

    for (x, y, pixel) in mask.enumerate_pixels_mut() {
        let p = (x as f64, y as f64);
        let inside = (0..3).all(|i| sign * orient(tri[i], tri[(i + 1) % 3], p) >= -EDGE_TOLERANCE);
        if inside {
            *pixel = Luma([255]);
        }
    }
}

/// Warps the texture under `src_tri` in `source` into the shape of `dst_tri`
/// on `canvas`. Only pixels inside the destination triangle are written, and
/// they overwrite whatever an earlier triangle put there.
pub fn warp_triangle(
    source: &RgbImage,
    canvas: &mut RgbImage,
    src_tri: [Point; 3],
    dst_tri: [Point; 3],
) {
    let src_rect = BoundingRect::from_points(&src_tri).clip(source.width(), source.height());
    let dst_rect = BoundingRect::from_points(&dst_tri);

    if src_rect.is_empty() || dst_rect.is_empty() {
        return;
    }
    let dst_clip = dst_rect.clip(canvas.width(), canvas.height());
    if dst_clip.is_empty() {
        return;
    }

    let local = |tri: [Point; 3], rect: &BoundingRect| {
        tri.map(|p| Point::new(p.x - rect.x as f32, p.y - rect.y as f32))
    };
    let src_local = local(src_tri, &src_rect);
    let dst_local = local(dst_tri, &dst_rect);

    // destination-local -> source-local, so every written pixel is sampled once
    let Some(inverse) =
        AffineTransform::from_triangles(src_local, dst_local).and_then(|t| t.inverse())
    else {
        debug!("skipping degenerate triangle {:?} -> {:?}", src_tri, dst_tri);
        return;
    };

    let patch = imageops::crop_imm(
        source,
        src_rect.x as u32,
        src_rect.y as u32,
        src_rect.width,
        src_rect.height,
    )
    .to_image();

    // the mask only spans the part of the rectangle that lands on the canvas
    let (ox, oy) = (dst_clip.x - dst_rect.x, dst_clip.y - dst_rect.y);
    let mut mask = GrayImage::new(dst_clip.width, dst_clip.height);
    fill_triangle(
        &mut mask,
        dst_local.map(|p| (p.x as f64 - ox as f64, p.y as f64 - oy as f64)),
    );

    for (mx, my, m) in mask.enumerate_pixels() {
        if m[0] == 0 {
            continue;
        }

        let lx = (ox + mx as i64) as f64;
        let ly = (oy + my as i64) as f64;
        let (sx, sy) = inverse.apply(lx, ly);
        let value = sample_bilinear(&patch, sx, sy);
        canvas.put_pixel(
            dst_clip.x as u32 + mx,
            dst_clip.y as u32 + my,
            Rgb([clamp(value[0]), clamp(value[1]), clamp(value[2])]),
        );
    }
}

// returns the number of triangles warped
pub fn warp_mesh(
    texture: &RgbImage,
    src: &LandmarkSet,
    dst: &LandmarkSet,
    mesh: &TriangleMesh,
    canvas: &mut RgbImage,
) -> usize {
    let mut warped = 0;
    for triangle in mesh.iter() {
        let (Some(src_tri), Some(dst_tri)) = (src.triangle_points(triangle), dst.triangle_points(triangle)) else {
            continue;
        };
        warp_triangle(texture, canvas, src_tri, dst_tri);
        warped += 1;
    }
    warped
}
