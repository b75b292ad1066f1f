// replays landmark sets precomputed by an external detector

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::RgbImage;
use log::{debug, info};
use ndarray::prelude::*;
use ndarray_npy::{ReadNpyError, ReadNpyExt};

use crate::error::{Error, Result};
use crate::face::{LandmarkSet, Point};
use crate::face_landmarks::FaceLandmarksModel;

// accepts f64 and f32 element types
fn read_array(path: &Path) -> Result<ArrayD<f64>> {
    let bytes = std::fs::read(path)?;

    match ArrayD::<f64>::read_npy(Cursor::new(&bytes)) {
        Ok(array) => Ok(array),
        Err(ReadNpyError::WrongDescriptor(_)) => {
            let array = ArrayD::<f32>::read_npy(Cursor::new(&bytes))?;
            Ok(array.mapv(|v| v as f64))
        }
        Err(e) => Err(e.into()),
    }
}

fn to_landmarks(points: ArrayView2<f64>) -> LandmarkSet {
    LandmarkSet::new(
        points
            .outer_iter()
            .map(|p| Point::new(p[0] as f32, p[1] as f32))
            .collect(),
    )
}

fn check_points(shape: &[usize], path: &Path) -> Result<()> {
    match shape.last() {
        Some(2) => Ok(()),
        _ => Err(Error::InvalidLandmarks(format!(
            "{}: expected points of shape (.., 2), got {:?}",
            path.display(),
            shape
        ))),
    }
}

/// Reads a single `(N, 2)` landmark set.
pub fn read_landmarks(path: &Path) -> Result<LandmarkSet> {
    let array = read_array(path)?;
    check_points(array.shape(), path)?;

    let points = array
        .into_dimensionality::<Ix2>()
        .map_err(|_| Error::InvalidLandmarks(format!("{}: expected an (N, 2) array", path.display())))?;

    Ok(to_landmarks(points.view()))
}

pub struct NpyLandmarksModel {
    frames: Vec<Option<LandmarkSet>>,
    // a single set is returned for every image
    repeat: bool,
    cursor: AtomicUsize,
}

impl NpyLandmarksModel {
    /// Loads either a single `(N, 2)` set or a per-frame `(F, N, 2)` sequence.
    pub fn new(path: &Path) -> Result<NpyLandmarksModel> {
        let array = read_array(path)?;
        check_points(array.shape(), path)?;

        let model = match array.ndim() {
            2 => {
                let points = array
                    .into_dimensionality::<Ix2>()
                    .map_err(|_| Error::InvalidLandmarks(path.display().to_string()))?;
                NpyLandmarksModel::single(to_landmarks(points.view()))
            }
            3 => {
                let frames = array
                    .into_dimensionality::<Ix3>()
                    .map_err(|_| Error::InvalidLandmarks(path.display().to_string()))?;
                NpyLandmarksModel::sequence(
                    frames
                        .outer_iter()
                        .map(|frame| {
                            let all_nan = frame.iter().all(|v| v.is_nan());
                            (!all_nan).then(|| to_landmarks(frame))
                        })
                        .collect(),
                )
            }
            n => {
                return Err(Error::InvalidLandmarks(format!(
                    "{}: expected 2 or 3 dimensions, got {}",
                    path.display(),
                    n
                )))
            }
        };

        info!(
            "loaded {} landmark set(s) from {}",
            model.frames.len(),
            path.display()
        );
        Ok(model)
    }

    pub fn single(landmarks: LandmarkSet) -> NpyLandmarksModel {
        NpyLandmarksModel {
            frames: vec![Some(landmarks)],
            repeat: true,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn sequence(frames: Vec<Option<LandmarkSet>>) -> NpyLandmarksModel {
        NpyLandmarksModel {
            frames,
            repeat: false,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FaceLandmarksModel for NpyLandmarksModel {
    fn run(&self, _image: &RgbImage) -> Option<LandmarkSet> {
        let index = if self.repeat {
            0
        } else {
            self.cursor.fetch_add(1, Ordering::SeqCst)
        };

        let landmarks = self.frames.get(index)?.clone();
        if landmarks.is_none() {
            debug!("no landmarks recorded for frame {}", index);
        }
        landmarks.filter(|l| l.is_finite())
    }
}
