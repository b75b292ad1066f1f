use std::path::Path;

use image::{Rgb, RgbImage};

use faceswap::frames::{Frame, FrameSink, FrameSource, ImageDirSink, ImageDirSource, InputSource};
use faceswap::Error;

fn write_image(path: &Path, value: u8) {
    RgbImage::from_pixel(8, 6, Rgb([value, value / 2, 255 - value]))
        .save(path)
        .unwrap();
}

#[test]
fn directory_frames_are_read_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    write_image(&dir.path().join("frame_002.png"), 20);
    write_image(&dir.path().join("frame_001.png"), 10);
    write_image(&dir.path().join("frame_003.BMP"), 30);
    std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

    let source = InputSource::from_path(dir.path()).unwrap();
    assert_eq!(source, InputSource::Directory(dir.path().to_path_buf()));

    let mut frames = source.open().unwrap();
    let mut names = Vec::new();
    while let Some(frame) = frames.next_frame().unwrap() {
        assert_eq!(frame.image.dimensions(), (8, 6));
        names.push((frame.name, frame.image.get_pixel(0, 0)[0]));
    }

    assert_eq!(
        names,
        vec![
            ("frame_001.png".to_string(), 10),
            ("frame_002.png".to_string(), 20),
            ("frame_003.BMP".to_string(), 30),
        ]
    );
}

#[test]
fn single_file_is_read_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("still.png");
    write_image(&path, 77);

    let source = InputSource::from_path(&path).unwrap();
    assert_eq!(source, InputSource::File(path.clone()));

    let mut frames = source.open().unwrap();
    let frame = frames.next_frame().unwrap().unwrap();
    assert_eq!(frame.name, "still.png");
    assert!(frames.next_frame().unwrap().is_none());
}

#[test]
fn missing_input_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nothing_here");

    assert!(matches!(
        InputSource::from_path(&missing),
        Err(Error::InputNotFound(p)) if p == missing
    ));
    assert!(matches!(
        ImageDirSource::new(&missing),
        Err(Error::InputNotFound(_))
    ));
    assert!(matches!(
        InputSource::File(missing.clone()).open(),
        Err(Error::InputNotFound(_))
    ));
}

#[test]
fn sink_prefixes_output_names() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");

    let mut sink = ImageDirSink::new(&out).unwrap();
    let frame = Frame {
        name: "frame_001.png".to_string(),
        image: RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])),
    };
    sink.write(&frame).unwrap();

    let written = out.join("output_frame_001.png");
    assert_eq!(sink.path_for(&frame), written);
    assert_eq!(sink.written(), 1);
    assert_eq!(image::open(&written).unwrap().to_rgb8(), frame.image);
}
