use std::borrow::Cow;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use image::RgbImage;
use log::{debug, info, warn};

use crate::blend::{mix, seamless_blend, SolverSettings};
use crate::color::match_color;
use crate::config::Config;
use crate::error::{BlendError, Error, Result};
use crate::face::{FaceBundle, LandmarkSet};
use crate::face_landmarks::FaceLandmarksModel;
use crate::mask::{build_mask, hull_center};
use crate::warp::warp_mesh;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositorConfig {
    pub color_correction: bool,
    pub blend_ratio: f32,
    /// Pixel tolerance used to map triangulation vertices back to landmarks.
    pub match_tolerance: f32,
    pub solver: SolverSettings,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            color_correction: true,
            blend_ratio: 1.0,
            match_tolerance: 1.0,
            solver: SolverSettings::default(),
        }
    }
}

impl From<&Config> for CompositorConfig {
    fn from(config: &Config) -> Self {
        Self {
            color_correction: config.color_correction,
            blend_ratio: config.blend_ratio,
            match_tolerance: config.match_tolerance,
            solver: config.solver,
        }
    }
}

// the target face, swapped whole; a frame keeps the Arc it started with
#[derive(Debug, Clone, Default)]
pub struct BundleSlot {
    inner: Arc<RwLock<Option<Arc<FaceBundle>>>>,
}

impl BundleSlot {
    pub fn new() -> BundleSlot {
        BundleSlot::default()
    }

    /// Installs `bundle`, returning the one it replaces.
    pub fn store(&self, bundle: FaceBundle) -> Option<Arc<FaceBundle>> {
        let bundle = Arc::new(bundle);
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.replace(bundle)
    }

    pub fn clear(&self) -> Option<Arc<FaceBundle>> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.take()
    }

    pub fn current(&self) -> Option<Arc<FaceBundle>> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.clone()
    }
}

/// Which path a frame took through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositeOutcome {
    /// The face was replaced using a mesh of `triangles` triangles.
    Composited { triangles: usize },
    NoTarget,
    NoFace,
    BlendFailed(BlendError),
}

#[derive(Debug, Clone)]
pub struct Composition {
    pub image: RgbImage,
    pub outcome: CompositeOutcome,
}

impl Composition {
    fn unchanged(frame: &RgbImage, outcome: CompositeOutcome) -> Composition {
        Composition {
            image: frame.clone(),
            outcome,
        }
    }
}

pub struct Compositor {
    config: CompositorConfig,
    detector: Box<dyn FaceLandmarksModel>,
    bundle: BundleSlot,
}

impl Compositor {
    pub fn new(config: CompositorConfig, detector: Box<dyn FaceLandmarksModel>) -> Compositor {
        Compositor {
            config,
            detector,
            bundle: BundleSlot::new(),
        }
    }

    /// A handle to the target face slot, for reloading from other threads.
    pub fn bundle_slot(&self) -> BundleSlot {
        self.bundle.clone()
    }

    /// Builds a bundle from a texture and its landmarks and makes it current.
    /// On error the previous bundle stays in place.
    pub fn set_target(&self, texture: RgbImage, landmarks: LandmarkSet) -> Result<()> {
        let bundle = FaceBundle::new(texture, landmarks, self.config.match_tolerance)?;
        info!(
            "target face loaded: {} landmarks, {} triangles",
            bundle.landmarks().len(),
            bundle.mesh().len()
        );
        self.bundle.store(bundle);
        Ok(())
    }

    /// Loads the image at `path` as the target face, using the detector to
    /// find its landmarks.
    pub fn load_target(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(Error::InputNotFound(path.to_path_buf()));
        }
        let texture = image::open(path)?.to_rgb8();
        let landmarks = self
            .detector
            .run(&texture)
            .ok_or_else(|| Error::NoFaceDetected(path.to_path_buf()))?;
        self.set_target(texture, landmarks)
    }

    /// Composites the target face onto `frame`. Every failure yields `frame`
    /// unchanged.
    pub fn compose(&self, frame: &RgbImage) -> RgbImage {
        self.compose_frame(frame).image
    }

    pub fn compose_frame(&self, frame: &RgbImage) -> Composition {
        // the detector sees every frame so its own temporal state stays in step
        let landmarks = self.detector.run(frame);
        self.compose_with_landmarks(frame, landmarks.as_ref())
    }

    /// Same as [`Compositor::compose_frame`] with the frame's landmarks
    /// supplied by the caller instead of the detector.
    pub fn compose_with_landmarks(
        &self,
        frame: &RgbImage,
        landmarks: Option<&LandmarkSet>,
    ) -> Composition {
        let Some(bundle) = self.bundle.current() else {
            return Composition::unchanged(frame, CompositeOutcome::NoTarget);
        };

        let Some(landmarks) = landmarks else {
            debug!("no face in frame");
            return Composition::unchanged(frame, CompositeOutcome::NoFace);
        };

        if landmarks.len() != bundle.landmarks().len() || !landmarks.is_finite() {
            warn!(
                "frame landmarks unusable ({} points, target has {})",
                landmarks.len(),
                bundle.landmarks().len()
            );
            return Composition::unchanged(frame, CompositeOutcome::NoFace);
        }

        match self.composite(&bundle, frame, landmarks) {
            Ok((image, triangles)) => Composition {
                image,
                outcome: CompositeOutcome::Composited { triangles },
            },
            Err(e) => {
                warn!("seamless blend failed: {}", e);
                Composition::unchanged(frame, CompositeOutcome::BlendFailed(e))
            }
        }
    }

    fn composite(
        &self,
        bundle: &FaceBundle,
        frame: &RgbImage,
        landmarks: &LandmarkSet,
    ) -> std::result::Result<(RgbImage, usize), BlendError> {
        let texture = if self.config.color_correction {
            Cow::Owned(match_color(bundle.texture(), frame))
        } else {
            Cow::Borrowed(bundle.texture())
        };

        let mut canvas = RgbImage::new(frame.width(), frame.height());
        let triangles = warp_mesh(
            &texture,
            bundle.landmarks(),
            landmarks,
            bundle.mesh(),
            &mut canvas,
        );

        let mask = build_mask(frame.dimensions(), landmarks);
        let center = hull_center(landmarks).ok_or(BlendError::EmptyMask)?;

        let blended = seamless_blend(frame, &canvas, &mask, center, &self.config.solver)?;
        debug!("composited {} triangles around {:?}", triangles, center);

        Ok((mix(frame, &blended, self.config.blend_ratio), triangles))
    }
}
