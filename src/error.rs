use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Landmark file error: {0}")]
    Npy(#[from] ndarray_npy::ReadNpyError),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Input not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Invalid landmarks: {0}")]
    InvalidLandmarks(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("No face detected in {}", .0.display())]
    NoFaceDetected(PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a seamless blend could not be computed. None of these are fatal to
/// the frame loop, the compositor falls back to the untouched frame.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlendError {
    #[error("mask has no set pixels")]
    EmptyMask,

    #[error("source patch is {patch:?} but mask is {mask:?}")]
    SizeMismatch { patch: (u32, u32), mask: (u32, u32) },

    #[error("translated mask ({x}, {y}, {width}x{height}) does not fit the destination")]
    OutOfBounds {
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    },

    #[error("poisson solve did not converge after {iterations} iterations (residual {residual})")]
    NotConverged { iterations: usize, residual: f64 },
}
