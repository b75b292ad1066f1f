pub mod blend;
pub mod color;
pub mod compositor;
pub mod config;
pub mod error;
pub mod face;
pub mod face_landmarks;
pub mod frames;
pub mod mask;
pub mod triangulation;
pub mod utils;
pub mod warp;

pub use compositor::{BundleSlot, CompositeOutcome, Composition, Compositor, CompositorConfig};
pub use config::Config;
pub use error::{BlendError, Error, Result};
pub use face::{FaceBundle, LandmarkSet, Point, Triangle, TriangleMesh};
pub use face_landmarks::FaceLandmarksModel;
