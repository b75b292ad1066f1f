pub mod model_npy;

use image::RgbImage;

use crate::face::LandmarkSet;

// define FaceLandmarksModel trait
//
// A model may keep its own temporal state between calls, and it must return
// sets with the same length and index order on every call.
pub trait FaceLandmarksModel: Send + Sync {
    fn run(&self, image: &RgbImage) -> Option<LandmarkSet>;
}

impl<F> FaceLandmarksModel for F
where
    F: Fn(&RgbImage) -> Option<LandmarkSet> + Send + Sync,
{
    fn run(&self, image: &RgbImage) -> Option<LandmarkSet> {
        self(image)
    }
}
