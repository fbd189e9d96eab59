use std::fmt;
use std::path::Path;

use image::ImageFormat;
use tracing::info;

use crate::capture::{still_frame, Frame, VideoSurface};
use crate::video::FfmpegVideo;

/// What the user handed us to turn into a prompt.
pub(crate) enum MediaInput {
    Video(Box<dyn VideoSurface>),
    Image(Frame),
    Text(String),
}

impl MediaInput {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            MediaInput::Video(_) => "video",
            MediaInput::Image(_) => "image",
            MediaInput::Text(_) => "text",
        }
    }
}

impl fmt::Debug for MediaInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaInput::Video(video) => f
                .debug_struct("Video")
                .field("duration", &video.duration())
                .field("dimensions", &video.dimensions())
                .finish(),
            MediaInput::Image(frame) => f
                .debug_struct("Image")
                .field("mime_type", &frame.mime_type)
                .field("len", &frame.data.len())
                .finish(),
            MediaInput::Text(keyword) => f.debug_tuple("Text").field(keyword).finish(),
        }
    }
}

/// Opens `path` as a still when its extension names an image format, as a video otherwise.
pub(crate) fn load(path: &Path) -> anyhow::Result<MediaInput> {
    let input = if ImageFormat::from_path(path).is_ok() {
        MediaInput::Image(still_frame(path)?)
    } else {
        MediaInput::Video(Box::new(FfmpegVideo::open(path)?))
    };
    info!(path = %path.display(), kind = input.kind(), "loaded input");
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn image_extensions_load_as_stills() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.jpg");
        RgbImage::from_pixel(4, 4, Rgb([9, 9, 9])).save(&path).unwrap();

        match load(&path).unwrap() {
            MediaInput::Image(frame) => assert_eq!(frame.mime_type, "image/jpeg"),
            other => panic!("expected a still, got {other:?}"),
        }
    }

    #[test]
    fn missing_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("absent.png")).is_err());
    }
}
