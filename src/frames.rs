use std::path::{Path, PathBuf};

use image::RgbImage;
use log::{debug, info};

use crate::error::{Error, Result};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Debug, Clone)]
pub struct Frame {
    pub name: String,
    pub image: RgbImage,
}

pub trait FrameSource: Send {
    /// Returns the next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

pub trait FrameSink: Send {
    fn write(&mut self, frame: &Frame) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    File(PathBuf),
    Directory(PathBuf),
}

impl InputSource {
    pub fn from_path(path: &Path) -> Result<InputSource> {
        if path.is_dir() {
            Ok(InputSource::Directory(path.to_path_buf()))
        } else if path.is_file() {
            Ok(InputSource::File(path.to_path_buf()))
        } else {
            Err(Error::InputNotFound(path.to_path_buf()))
        }
    }

    pub fn open(&self) -> Result<Box<dyn FrameSource>> {
        match self {
            InputSource::File(path) => Ok(Box::new(ImageFileSource::new(path)?)),
            InputSource::Directory(path) => Ok(Box::new(ImageDirSource::new(path)?)),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frame.png".to_string())
}

fn read_frame(path: &Path) -> Result<Frame> {
    let image = image::open(path)?.to_rgb8();
    debug!("read {} ({}x{})", path.display(), image.width(), image.height());
    Ok(Frame {
        name: file_name(path),
        image,
    })
}

pub struct ImageFileSource {
    path: Option<PathBuf>,
}

impl ImageFileSource {
    pub fn new(path: &Path) -> Result<ImageFileSource> {
        if !path.is_file() {
            return Err(Error::InputNotFound(path.to_path_buf()));
        }
        Ok(ImageFileSource {
            path: Some(path.to_path_buf()),
        })
    }
}

impl FrameSource for ImageFileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.path.take() {
            Some(path) => read_frame(&path).map(Some),
            None => Ok(None),
        }
    }
}

/// The images of a directory, in file name order.
pub struct ImageDirSource {
    paths: std::vec::IntoIter<PathBuf>,
}

impl ImageDirSource {
    pub fn new(dir: &Path) -> Result<ImageDirSource> {
        if !dir.is_dir() {
            return Err(Error::InputNotFound(dir.to_path_buf()));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if path.is_file() && is_image {
                paths.push(path);
            }
        }
        paths.sort();

        info!("found {} frames in {}", paths.len(), dir.display());
        Ok(ImageDirSource {
            paths: paths.into_iter(),
        })
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.paths.next() {
            Some(path) => read_frame(&path).map(Some),
            None => Ok(None),
        }
    }
}

/// Writes every frame as `output_<name>` into a directory.
pub struct ImageDirSink {
    dir: PathBuf,
    written: usize,
}

impl ImageDirSink {
    pub fn new(dir: &Path) -> Result<ImageDirSink> {
        std::fs::create_dir_all(dir)?;
        Ok(ImageDirSink {
            dir: dir.to_path_buf(),
            written: 0,
        })
    }

    pub fn path_for(&self, frame: &Frame) -> PathBuf {
        self.dir.join(format!("output_{}", frame.name))
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl FrameSink for ImageDirSink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        let path = self.path_for(frame);
        frame.image.save(&path)?;
        self.written += 1;
        debug!("wrote {}", path.display());
        Ok(())
    }
}
