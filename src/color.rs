// Colour transfer between images in CIE L*a*b* space. Lab values use the
// 8-bit scaling common to image libraries: L in [0, 255] (L* * 255 / 100),
// a and b offset by 128.

use image::{Rgb, RgbImage};
use ndarray::{Array1, Array2, Axis};
use palette::{FromColor, IntoColor, Lab, LinSrgb, Srgb};
use rayon::prelude::*;

use crate::utils::clamp;

const EPSILON: f64 = 1e-5;

pub fn rgb_to_lab(pixel: Rgb<u8>) -> [f64; 3] {
    let srgb: Srgb<f32> = Srgb::new(
        pixel[0] as f32 / 255.0,
        pixel[1] as f32 / 255.0,
        pixel[2] as f32 / 255.0,
    );
    let lin: LinSrgb<f32> = srgb.into_linear();
    let lab: Lab = Lab::from_color(lin);

    [
        lab.l as f64 * 255.0 / 100.0,
        lab.a as f64 + 128.0,
        lab.b as f64 + 128.0,
    ]
}

// out-of-gamut colours are clamped to the displayable range
pub fn lab_to_rgb(lab: [f64; 3]) -> Rgb<u8> {
    let lab = Lab::new(
        (lab[0] * 100.0 / 255.0) as f32,
        (lab[1] - 128.0) as f32,
        (lab[2] - 128.0) as f32,
    );
    let lin: LinSrgb<f32> = lab.into_color();
    let srgb: Srgb<f32> = Srgb::from_linear(lin);

    Rgb([
        clamp(srgb.red.clamp(0.0, 1.0) as f64 * 255.0),
        clamp(srgb.green.clamp(0.0, 1.0) as f64 * 255.0),
        clamp(srgb.blue.clamp(0.0, 1.0) as f64 * 255.0),
    ])
}

// `(pixels, 3)` Lab array
pub fn to_lab(image: &RgbImage) -> Array2<f64> {
    let lab: Vec<f64> = image
        .as_raw()
        .par_chunks_exact(3)
        .flat_map_iter(|px| rgb_to_lab(Rgb([px[0], px[1], px[2]])))
        .collect();

    let n = lab.len() / 3;
    Array2::from_shape_vec((n, 3), lab).unwrap_or_else(|_| Array2::zeros((0, 3)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStats {
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
}

impl ChannelStats {
    pub fn of(lab: &Array2<f64>) -> Option<ChannelStats> {
        let mean = lab.mean_axis(Axis(0))?;
        let std = lab.std_axis(Axis(0), 0.0);
        Some(ChannelStats { mean, std })
    }
}

/// Shifts and scales the Lab statistics of `source` to those of `target`:
/// `(x - mean_s) * std_t / (std_s + eps) + mean_t` per channel, clamped to
/// the 8-bit Lab range. Pure; an empty image on either side returns `source`
/// unchanged.
pub fn match_color(source: &RgbImage, target: &RgbImage) -> RgbImage {
    let source_lab = to_lab(source);
    let target_lab = to_lab(target);

    let (Some(s), Some(t)) = (ChannelStats::of(&source_lab), ChannelStats::of(&target_lab)) else {
        return source.clone();
    };

    let scale = &t.std / &(&s.std + EPSILON);

    let mut out = RgbImage::new(source.width(), source.height());
    out.par_chunks_exact_mut(3)
        .enumerate()
        .for_each(|(i, px)| {
            let mut shifted = [0.0; 3];
            for c in 0..3 {
                shifted[c] =
                    ((source_lab[[i, c]] - s.mean[c]) * scale[c] + t.mean[c]).clamp(0.0, 255.0);
            }
            let rgb = lab_to_rgb(shifted);
            px.copy_from_slice(&rgb.0);
        });

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_channel_diff(a: &RgbImage, b: &RgbImage) -> u8 {
        a.pixels()
            .zip(b.pixels())
            .flat_map(|(p, q)| (0..3).map(move |c| p[c].abs_diff(q[c])))
            .max()
            .unwrap_or(0)
    }

    fn mid_tones(width: u32, height: u32, base: [u8; 3]) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                base[0] + ((x * 3 + y) % 40) as u8,
                base[1] + ((x + y * 2) % 30) as u8,
                base[2] + ((x * y) % 25) as u8,
            ])
        })
    }

    #[test]
    fn lab_round_trip() {
        for &rgb in &[
            [0u8, 0, 0],
            [255, 255, 255],
            [255, 0, 0],
            [0, 255, 0],
            [0, 0, 255],
            [12, 200, 77],
            [128, 128, 128],
            [3, 4, 5],
        ] {
            let back = lab_to_rgb(rgb_to_lab(Rgb(rgb)));
            for c in 0..3 {
                assert!(back[c].abs_diff(rgb[c]) <= 1, "{rgb:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn lab_of_reference_colors() {
        let white = rgb_to_lab(Rgb([255, 255, 255]));
        assert!((white[0] - 255.0).abs() < 0.5);
        assert!((white[1] - 128.0).abs() < 0.5);
        assert!((white[2] - 128.0).abs() < 0.5);

        let black = rgb_to_lab(Rgb([0, 0, 0]));
        assert!(black[0].abs() < 1e-3);
    }

    #[test]
    fn matching_an_image_to_itself_is_identity() {
        let image = mid_tones(40, 30, [60, 90, 120]);
        let matched = match_color(&image, &image);
        assert!(max_channel_diff(&image, &matched) <= 1);
    }

    #[test]
    fn matching_is_idempotent_for_a_fixed_target() {
        let source = mid_tones(40, 30, [70, 80, 90]);
        let target = mid_tones(50, 20, [120, 110, 100]);

        let once = match_color(&source, &target);
        let twice = match_color(&once, &target);
        assert!(max_channel_diff(&once, &twice) <= 2);
    }

    #[test]
    fn matched_statistics_follow_the_target() {
        let source = mid_tones(40, 30, [40, 50, 60]);
        let target = mid_tones(40, 30, [140, 120, 100]);

        let matched = ChannelStats::of(&to_lab(&match_color(&source, &target))).unwrap();
        let wanted = ChannelStats::of(&to_lab(&target)).unwrap();
        for c in 0..3 {
            assert!((matched.mean[c] - wanted.mean[c]).abs() < 1.0);
            assert!((matched.std[c] - wanted.std[c]).abs() < 1.0);
        }
    }

    #[test]
    fn flat_source_takes_target_mean() {
        let source = RgbImage::from_pixel(8, 8, Rgb([10, 200, 30]));
        let target = RgbImage::from_pixel(8, 8, Rgb([100, 100, 100]));
        let matched = match_color(&source, &target);
        for p in matched.pixels() {
            for c in 0..3 {
                assert!(p[c].abs_diff(100) <= 1);
            }
        }
    }

    #[test]
    fn empty_images_are_passed_through() {
        let source = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        let empty = RgbImage::new(0, 0);
        assert_eq!(match_color(&source, &empty), source);
        assert_eq!(match_color(&empty, &source).dimensions(), (0, 0));
    }
}
