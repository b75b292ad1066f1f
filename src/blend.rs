use image::{GrayImage, Rgb, RgbImage};
use log::debug;
use ndarray::Array1;
use rayon::prelude::*;
use serde::Deserialize;

use crate::error::BlendError;
use crate::mask::mask_bounds;
use crate::utils::clamp;

const NONE: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub max_iterations: usize,
    // RMS residual, in channel units
    pub tolerance: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: 1e-5,
        }
    }
}

// one row per unknown pixel
struct PoissonSystem {
    pixels: Vec<(u32, u32)>,
    // unknown index of the left, right, up and down neighbour, or NONE
    neighbors: Vec<[usize; 4]>,
}

impl PoissonSystem {
    fn len(&self) -> usize {
        self.pixels.len()
    }

    // A x with A = 4 I - adjacency
    fn apply(&self, x: &Array1<f64>) -> Array1<f64> {
        let mut out = Array1::zeros(x.len());
        for (i, nbrs) in self.neighbors.iter().enumerate() {
            let mut v = 4.0 * x[i];
            for &j in nbrs {
                if j != NONE {
                    v -= x[j];
                }
            }
            out[i] = v;
        }
        out
    }
}

fn conjugate_gradient(
    system: &PoissonSystem,
    b: &Array1<f64>,
    mut x: Array1<f64>,
    settings: &SolverSettings,
) -> Result<Array1<f64>, BlendError> {
    let n = system.len() as f64;
    let mut r = b - &system.apply(&x);
    let mut p = r.clone();
    let mut rs = r.dot(&r);

    for iteration in 0..settings.max_iterations {
        if (rs / n).sqrt() <= settings.tolerance {
            debug!("poisson solve converged after {} iterations", iteration);
            return Ok(x);
        }

        let ap = system.apply(&p);
        let curvature = p.dot(&ap);
        if curvature <= 0.0 || !curvature.is_finite() {
            break;
        }

        let alpha = rs / curvature;
        x.scaled_add(alpha, &p);
        r.scaled_add(-alpha, &ap);

        let rs_next = r.dot(&r);
        let beta = rs_next / rs;
        p.mapv_inplace(|v| v * beta);
        p += &r;
        rs = rs_next;
    }

    let residual = (rs / n).sqrt();
    if residual <= settings.tolerance && x.iter().all(|v| v.is_finite()) {
        Ok(x)
    } else {
        Err(BlendError::NotConverged {
            iterations: settings.max_iterations,
            residual,
        })
    }
}

/// Poisson blend of `source` into `destination` inside `mask`. `source` and
/// `mask` share a size and are moved so the centre of the mask's bounding box
/// lands on `center`.
pub fn seamless_blend(
    destination: &RgbImage,
    source: &RgbImage,
    mask: &GrayImage,
    center: (i64, i64),
    settings: &SolverSettings,
) -> Result<RgbImage, BlendError> {
    if source.dimensions() != mask.dimensions() {
        return Err(BlendError::SizeMismatch {
            patch: source.dimensions(),
            mask: mask.dimensions(),
        });
    }

    let bounds = mask_bounds(mask).ok_or(BlendError::EmptyMask)?;
    let (cx, cy) = bounds.center();
    let (dx, dy) = (center.0 - cx, center.1 - cy);

    let (width, height) = destination.dimensions();
    let (x0, y0) = (bounds.x + dx, bounds.y + dy);
    if x0 < 0
        || y0 < 0
        || x0 + bounds.width as i64 > width as i64
        || y0 + bounds.height as i64 > height as i64
    {
        return Err(BlendError::OutOfBounds {
            x: x0,
            y: y0,
            width: bounds.width,
            height: bounds.height,
        });
    }

    // number the unknowns over the translated bounding box
    let (bw, bh) = (bounds.width as usize, bounds.height as usize);
    let mut index = vec![NONE; bw * bh];
    let mut pixels = Vec::new();
    for by in 0..bh {
        for bx in 0..bw {
            let (mx, my) = (bounds.x as u32 + bx as u32, bounds.y as u32 + by as u32);
            if mask.get_pixel(mx, my)[0] == 0 {
                continue;
            }
            let (x, y) = ((x0 + bx as i64) as u32, (y0 + by as i64) as u32);
            if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
                continue;
            }
            index[by * bw + bx] = pixels.len();
            pixels.push((x, y));
        }
    }

    if pixels.is_empty() {
        return Ok(destination.clone());
    }

    let lookup = |x: i64, y: i64| -> usize {
        let (bx, by) = (x - x0, y - y0);
        if bx < 0 || by < 0 || bx >= bw as i64 || by >= bh as i64 {
            NONE
        } else {
            index[by as usize * bw + bx as usize]
        }
    };

    const OFFSETS: [(i64, i64); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

    let neighbors: Vec<[usize; 4]> = pixels
        .iter()
        .map(|&(x, y)| OFFSETS.map(|(ox, oy)| lookup(x as i64 + ox, y as i64 + oy)))
        .collect();

    let system = PoissonSystem { pixels, neighbors };

    // source value at a destination position, if the patch covers it
    let source_at = |x: i64, y: i64, c: usize| -> Option<f64> {
        let (sx, sy) = (x - dx, y - dy);
        if sx < 0 || sy < 0 || sx >= source.width() as i64 || sy >= source.height() as i64 {
            None
        } else {
            Some(source.get_pixel(sx as u32, sy as u32)[c] as f64)
        }
    };

    let solutions: Vec<Result<Array1<f64>, BlendError>> = (0..3usize)
        .into_par_iter()
        .map(|c| {
            let mut b = Array1::zeros(system.len());
            let mut x = Array1::zeros(system.len());

            for (i, (&(px, py), nbrs)) in system.pixels.iter().zip(&system.neighbors).enumerate() {
                let (px, py) = (px as i64, py as i64);
                let sp = source_at(px, py, c).unwrap_or(0.0);
                x[i] = sp;

                let mut rhs = 0.0;
                for (k, &(ox, oy)) in OFFSETS.iter().enumerate() {
                    let (qx, qy) = (px + ox, py + oy);
                    if nbrs[k] == NONE {
                        rhs += destination.get_pixel(qx as u32, qy as u32)[c] as f64;
                    }
                    // guidance field: source gradient, zero where the patch ends
                    if let Some(sq) = source_at(qx, qy, c) {
                        rhs += sp - sq;
                    }
                }
                b[i] = rhs;
            }

            conjugate_gradient(&system, &b, x, settings)
        })
        .collect();

    let mut output = destination.clone();
    let mut channels = Vec::with_capacity(3);
    for solution in solutions {
        channels.push(solution?);
    }

    for (i, &(x, y)) in system.pixels.iter().enumerate() {
        output.put_pixel(
            x,
            y,
            Rgb([
                clamp(channels[0][i]),
                clamp(channels[1][i]),
                clamp(channels[2][i]),
            ]),
        );
    }

    Ok(output)
}

/// Linear interpolation between `destination` and `blended` by `ratio`
/// (0 keeps the destination, 1 keeps the blend).
pub fn mix(destination: &RgbImage, blended: &RgbImage, ratio: f32) -> RgbImage {
    let ratio = ratio.clamp(0.0, 1.0);
    if ratio >= 1.0 || destination.dimensions() != blended.dimensions() {
        return blended.clone();
    }
    if ratio <= 0.0 {
        return destination.clone();
    }

    let mut out = destination.clone();
    for (o, b) in out.pixels_mut().zip(blended.pixels()) {
        for c in 0..3 {
            let v = o[c] as f32 * (1.0 - ratio) + b[c] as f32 * ratio;
            o[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}
