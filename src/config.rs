use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;

use crate::blend::SolverSettings;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Still image or directory of frames to process.
    pub input_source: Option<PathBuf>,
    /// Image holding the face to paste onto every frame.
    pub target_face: Option<PathBuf>,
    /// `(N, 2)` landmarks of `target_face`.
    pub target_landmarks: Option<PathBuf>,
    /// `(N, 2)` or `(F, N, 2)` landmarks of the input frames.
    pub landmarks: Option<PathBuf>,
    pub output_path: PathBuf,
    pub color_correction: bool,
    /// 0 keeps the frame, 1 keeps the seamless blend.
    pub blend_ratio: f32,
    pub match_tolerance: f32,
    pub solver: SolverSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_source: None,
            target_face: None,
            target_landmarks: None,
            landmarks: None,
            output_path: PathBuf::from("output"),
            color_correction: true,
            blend_ratio: 1.0,
            match_tolerance: 1.0,
            solver: SolverSettings::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(Error::InputNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let config = Config::parse(&text)?;
        info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Config> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.blend_ratio) {
            return Err(Error::InvalidConfig(format!(
                "blend_ratio must lie in [0, 1], got {}",
                self.blend_ratio
            )));
        }
        if !(self.match_tolerance > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "match_tolerance must be positive, got {}",
                self.match_tolerance
            )));
        }
        if !(self.solver.tolerance > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "solver.tolerance must be positive, got {}",
                self.solver.tolerance
            )));
        }
        if self.solver.max_iterations == 0 {
            return Err(Error::InvalidConfig(
                "solver.max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.color_correction);
        assert_eq!(config.solver.max_iterations, 10_000);
    }

    #[test]
    fn fields_are_read() {
        let config = Config::parse(
            r#"
            input_source = "frames"
            target_face = "face.png"
            target_landmarks = "face.npy"
            landmarks = "frames.npy"
            output_path = "out"
            color_correction = false
            blend_ratio = 0.25

            [solver]
            max_iterations = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.input_source, Some(PathBuf::from("frames")));
        assert_eq!(config.output_path, PathBuf::from("out"));
        assert!(!config.color_correction);
        assert_eq!(config.blend_ratio, 0.25);
        assert_eq!(config.solver.max_iterations, 500);
        assert_eq!(config.solver.tolerance, 1e-5);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for text in [
            "blend_ratio = 1.5",
            "blend_ratio = -0.1",
            "match_tolerance = 0.0",
            "[solver]\ntolerance = 0.0",
            "[solver]\nmax_iterations = 0",
        ] {
            assert!(
                matches!(Config::parse(text), Err(Error::InvalidConfig(_))),
                "{text}"
            );
        }
        assert!(matches!(Config::parse("blend_ratio = \"x\""), Err(Error::Toml(_))));
        assert!(matches!(Config::parse("unknown = 1"), Err(Error::Toml(_))));
    }

    #[test]
    fn missing_file_is_reported() {
        assert!(matches!(
            Config::load(Path::new("/nonexistent/faceswap.toml")),
            Err(Error::InputNotFound(_))
        ));
    }
}
