use std::path::Path;
use std::time::Duration;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use image::codecs::jpeg;
use image::{GenericImage, ImageFormat, RgbImage};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Offsets used when the surface reports no usable duration.
pub(crate) const FALLBACK_DURATION_SECS: f64 = 10.0;
/// Keeps seeks away from end-of-media.
pub(crate) const END_OF_MEDIA_MARGIN_SECS: f64 = 0.1;
const SAMPLE_FRACTIONS: [f64; 3] = [0.1, 0.5, 0.9];

pub(crate) type FrameSet = Vec<Frame>;

/// One encoded still, ready to be sent as inline data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Frame {
    pub(crate) mime_type: String,
    pub(crate) data: String,
}

impl Frame {
    pub(crate) fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: BASE64_STANDARD.encode(bytes),
        }
    }

    pub(crate) fn decode(&self) -> anyhow::Result<Vec<u8>> {
        Ok(BASE64_STANDARD.decode(&self.data)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ListenerId(pub(crate) u64);

/// A playable video with a single displayed frame, seekable in seconds.
///
/// Every call to `set_current_time` completes with exactly one notification to
/// the seek listeners registered at that moment. Implementations may notify
/// synchronously from inside `set_current_time`.
pub(crate) trait VideoSurface {
    /// Intrinsic duration in seconds, `None` when unknown.
    fn duration(&self) -> Option<f64>;
    /// Native pixel dimensions as `(width, height)`.
    fn dimensions(&self) -> (u32, u32);
    fn current_time(&self) -> f64;
    fn is_paused(&self) -> bool;
    fn pause(&mut self);
    fn play(&mut self);
    fn add_seeked_listener(&mut self, listener: oneshot::Sender<()>) -> ListenerId;
    fn remove_seeked_listener(&mut self, id: ListenerId);
    fn set_current_time(&mut self, time: f64);
    /// Draws the currently displayed frame into `canvas`, which matches `dimensions`.
    fn draw_image(&self, canvas: &mut RgbImage) -> anyhow::Result<()>;
}

#[derive(Debug, Error)]
pub(crate) enum CaptureError {
    #[error("video did not finish seeking to {time:.2}s within {timeout:?}")]
    SeekTimeout { time: f64, timeout: Duration },
    #[error("video dropped the seek listener for {time:.2}s")]
    SeekAbandoned { time: f64 },
    #[error("could not draw the video frame at {time:.2}s: {source}")]
    Draw {
        time: f64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("could not encode the captured frame: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Clone)]
pub(crate) struct SamplerSettings {
    pub(crate) seek_timeout: Duration,
    pub(crate) jpeg_quality: u8,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            seek_timeout: Duration::from_secs(5),
            jpeg_quality: 80,
        }
    }
}

/// Sample points at 10%, 50% and 90% of the duration, kept clear of the end.
pub(crate) fn sample_offsets(duration: Option<f64>) -> [f64; 3] {
    let duration = match duration {
        Some(d) if d.is_finite() && d > 0.0 => d,
        _ => FALLBACK_DURATION_SECS,
    };
    let room = duration - END_OF_MEDIA_MARGIN_SECS;
    if room > duration * SAMPLE_FRACTIONS[1] {
        SAMPLE_FRACTIONS.map(|fraction| (duration * fraction).min(room))
    } else if room > 0.0 {
        // Clamping would collapse the later points together; spread them over the room left.
        SAMPLE_FRACTIONS.map(|fraction| room * fraction)
    } else {
        SAMPLE_FRACTIONS.map(|fraction| duration * fraction)
    }
}

struct SeekListener<'a, V: VideoSurface + ?Sized> {
    video: &'a mut V,
    id: ListenerId,
}

impl<V: VideoSurface + ?Sized> Drop for SeekListener<'_, V> {
    fn drop(&mut self) {
        self.video.remove_seeked_listener(self.id);
    }
}

/// Seeks `video` to `time` and waits for its completion notification.
///
/// The listener is unregistered on every exit path, including when the
/// returned future is dropped mid-wait.
pub(crate) async fn wait_for_seek<V: VideoSurface + ?Sized>(
    video: &mut V,
    time: f64,
    timeout: Duration,
) -> Result<(), CaptureError> {
    let (tx, rx) = oneshot::channel();
    let id = video.add_seeked_listener(tx);
    let listener = SeekListener { video, id };
    listener.video.set_current_time(time);

    let waited = tokio::time::timeout(timeout, rx).await;
    drop(listener);
    match waited {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(CaptureError::SeekAbandoned { time }),
        Err(_) => Err(CaptureError::SeekTimeout { time, timeout }),
    }
}

struct PlaybackRestore<'a, V: VideoSurface + ?Sized> {
    video: &'a mut V,
    position: f64,
    was_paused: bool,
}

impl<'a, V: VideoSurface + ?Sized> PlaybackRestore<'a, V> {
    fn save(video: &'a mut V) -> Self {
        let position = video.current_time();
        let was_paused = video.is_paused();
        if !was_paused {
            video.pause();
        }
        Self {
            video,
            position,
            was_paused,
        }
    }
}

impl<V: VideoSurface + ?Sized> Drop for PlaybackRestore<'_, V> {
    fn drop(&mut self) {
        self.video.set_current_time(self.position);
        if !self.was_paused {
            self.video.play();
        }
    }
}

/// Captures three JPEG frames from `video` without disturbing its playback.
pub(crate) async fn sample_frames<V: VideoSurface + ?Sized>(
    video: &mut V,
    settings: &SamplerSettings,
) -> Result<FrameSet, CaptureError> {
    let offsets = sample_offsets(video.duration());
    let (width, height) = video.dimensions();
    let mut canvas = RgbImage::new(width, height);

    let playback = PlaybackRestore::save(video);
    let mut frames = Vec::with_capacity(offsets.len());
    for time in offsets {
        wait_for_seek(&mut *playback.video, time, settings.seek_timeout).await?;
        playback
            .video
            .draw_image(&mut canvas)
            .map_err(|err| CaptureError::Draw {
                time,
                source: err.into(),
            })?;
        frames.push(encode_jpeg(&canvas, settings.jpeg_quality)?);
        debug!(time, width, height, "captured frame");
    }
    Ok(frames)
}

fn encode_jpeg(canvas: &RgbImage, quality: u8) -> Result<Frame, CaptureError> {
    let mut jpeg_data = Vec::new();
    let mut encoder = jpeg::JpegEncoder::new_with_quality(&mut jpeg_data, quality);
    encoder.encode(
        canvas,
        canvas.width(),
        canvas.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(Frame::from_bytes("image/jpeg", &jpeg_data))
}

/// Loads an image file as a single still, untouched.
pub(crate) fn still_frame(path: &Path) -> anyhow::Result<Frame> {
    let bytes = std::fs::read(path)?;
    let mime_type = match image::guess_format(&bytes) {
        Ok(format) => format.to_mime_type(),
        Err(err) => {
            warn!(path = %path.display(), %err, "unrecognised image content, sending as jpeg");
            ImageFormat::Jpeg.to_mime_type()
        }
    };
    Ok(Frame::from_bytes(mime_type, &bytes))
}

/// Copies `frame` over the top-left of `canvas`.
pub(crate) fn blit(canvas: &mut RgbImage, frame: &RgbImage) -> anyhow::Result<()> {
    canvas.copy_from(frame, 0, 0)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Rgb;

    /// In-memory surface whose frame colour encodes the current time.
    pub(crate) struct FakeVideo {
        pub(crate) duration: Option<f64>,
        pub(crate) time: f64,
        pub(crate) paused: bool,
        pub(crate) stall_seeks: bool,
        pub(crate) fail_draw_after: Option<usize>,
        pub(crate) seeks: Vec<f64>,
        pub(crate) draws: std::cell::Cell<usize>,
        listeners: Vec<(ListenerId, oneshot::Sender<()>)>,
        next_id: u64,
    }

    impl FakeVideo {
        pub(crate) fn new(duration: Option<f64>) -> Self {
            Self {
                duration,
                time: 0.0,
                paused: true,
                stall_seeks: false,
                fail_draw_after: None,
                seeks: Vec::new(),
                draws: std::cell::Cell::new(0),
                listeners: Vec::new(),
                next_id: 0,
            }
        }

        pub(crate) fn listener_count(&self) -> usize {
            self.listeners.len()
        }
    }

    impl VideoSurface for FakeVideo {
        fn duration(&self) -> Option<f64> {
            self.duration
        }

        fn dimensions(&self) -> (u32, u32) {
            (8, 4)
        }

        fn current_time(&self) -> f64 {
            self.time
        }

        fn is_paused(&self) -> bool {
            self.paused
        }

        fn pause(&mut self) {
            self.paused = true;
        }

        fn play(&mut self) {
            self.paused = false;
        }

        fn add_seeked_listener(&mut self, listener: oneshot::Sender<()>) -> ListenerId {
            self.next_id += 1;
            let id = ListenerId(self.next_id);
            self.listeners.push((id, listener));
            id
        }

        fn remove_seeked_listener(&mut self, id: ListenerId) {
            self.listeners.retain(|(existing, _)| *existing != id);
        }

        fn set_current_time(&mut self, time: f64) {
            self.time = time;
            self.seeks.push(time);
            if self.stall_seeks {
                return;
            }
            for (_, listener) in self.listeners.drain(..) {
                let _ = listener.send(());
            }
        }

        fn draw_image(&self, canvas: &mut RgbImage) -> anyhow::Result<()> {
            let draws = self.draws.get();
            if self.fail_draw_after.is_some_and(|limit| draws >= limit) {
                anyhow::bail!("decoder gave up");
            }
            self.draws.set(draws + 1);
            let shade = (self.time * 10.0) as u8;
            let frame = RgbImage::from_pixel(8, 4, Rgb([shade, 0, 0]));
            blit(canvas, &frame)
        }
    }

    fn assert_ordered_within(offsets: [f64; 3], duration: f64) {
        let [t1, t2, t3] = offsets;
        assert!(0.0 < t1, "{offsets:?} for {duration}");
        assert!(t1 < t2, "{offsets:?} for {duration}");
        assert!(t2 < t3, "{offsets:?} for {duration}");
        assert!(t3 < duration, "{offsets:?} for {duration}");
    }

    #[test]
    fn offsets_are_ordered_and_clear_of_the_end() {
        for duration in [0.25, 0.5, 0.9, 1.0, 1.05, 3.0, 12.5, 60.0, 7200.0] {
            let offsets = sample_offsets(Some(duration));
            assert_ordered_within(offsets, duration);
            for t in offsets {
                assert!(t <= duration - END_OF_MEDIA_MARGIN_SECS + 1e-9);
            }
        }
    }

    #[test]
    fn offsets_for_a_long_clip_are_plain_fractions() {
        assert_eq!(sample_offsets(Some(100.0)), [10.0, 50.0, 90.0]);
    }

    #[test]
    fn offsets_for_a_short_clip_clamp_the_last_point() {
        let [_, _, last] = sample_offsets(Some(0.5));
        assert!((last - 0.4).abs() < 1e-9);
    }

    #[test]
    fn very_short_clips_stay_ordered() {
        for duration in [0.01, 0.05, 0.1] {
            assert_ordered_within(sample_offsets(Some(duration)), duration);
        }
    }

    #[test]
    fn clips_just_over_the_margin_stay_clear_of_the_end() {
        for duration in [0.101, 0.12, 0.15, 0.18, 0.2] {
            let offsets = sample_offsets(Some(duration));
            assert_ordered_within(offsets, duration);
            for t in offsets {
                assert!(
                    t <= duration - END_OF_MEDIA_MARGIN_SECS + 1e-12,
                    "{offsets:?} for {duration}"
                );
            }
        }
        let [t1, t2, t3] = sample_offsets(Some(0.15));
        assert!((t1 - 0.005).abs() < 1e-9);
        assert!((t2 - 0.025).abs() < 1e-9);
        assert!((t3 - 0.045).abs() < 1e-9);
    }

    #[test]
    fn unknown_duration_falls_back_to_ten_seconds() {
        for duration in [None, Some(0.0), Some(-3.0), Some(f64::NAN), Some(f64::INFINITY)] {
            let offsets = sample_offsets(duration);
            assert_eq!(offsets, [1.0, 5.0, 9.0]);
            assert_ordered_within(offsets, FALLBACK_DURATION_SECS);
        }
    }

    #[tokio::test]
    async fn samples_three_frames_at_the_offsets() {
        let mut video = FakeVideo::new(Some(20.0));
        let frames = sample_frames(&mut video, &SamplerSettings::default())
            .await
            .unwrap();

        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.mime_type == "image/jpeg"));
        assert_eq!(&video.seeks[..3], &[2.0, 10.0, 18.0]);
        let decoded = image::load_from_memory(&frames[0].decode().unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 4));
        assert_eq!(video.listener_count(), 0);
    }

    #[tokio::test]
    async fn restores_position_and_playing_state() {
        let mut video = FakeVideo::new(Some(30.0));
        video.time = 7.5;
        video.paused = false;

        sample_frames(&mut video, &SamplerSettings::default())
            .await
            .unwrap();

        assert_eq!(video.time, 7.5);
        assert!(!video.paused);
    }

    #[tokio::test]
    async fn restores_playback_after_a_draw_failure() {
        let mut video = FakeVideo::new(Some(30.0));
        video.time = 4.0;
        video.paused = false;
        video.fail_draw_after = Some(1);

        let err = sample_frames(&mut video, &SamplerSettings::default())
            .await
            .unwrap_err();

        assert!(matches!(err, CaptureError::Draw { .. }));
        assert_eq!(video.time, 4.0);
        assert!(!video.paused);
    }

    #[tokio::test]
    async fn stalled_seek_times_out_and_unregisters() {
        let mut video = FakeVideo::new(Some(30.0));
        video.time = 1.25;
        video.stall_seeks = true;
        let settings = SamplerSettings {
            seek_timeout: Duration::from_millis(20),
            ..SamplerSettings::default()
        };

        let err = sample_frames(&mut video, &settings).await.unwrap_err();

        assert!(matches!(err, CaptureError::SeekTimeout { .. }));
        assert_eq!(video.listener_count(), 0);
        assert_eq!(video.time, 1.25);
        assert!(video.paused);
    }

    #[tokio::test]
    async fn dropped_wait_removes_its_listener() {
        let mut video = FakeVideo::new(Some(30.0));
        video.stall_seeks = true;
        {
            let wait = wait_for_seek(&mut video, 3.0, Duration::from_secs(60));
            let _ = tokio::time::timeout(Duration::from_millis(10), wait).await;
        }
        assert_eq!(video.listener_count(), 0);
    }

    #[test]
    fn still_frame_keeps_the_file_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("still.png");
        RgbImage::from_pixel(3, 3, Rgb([1, 2, 3])).save(&path).unwrap();

        let frame = still_frame(&path).unwrap();

        assert_eq!(frame.mime_type, "image/png");
        assert_eq!(frame.decode().unwrap(), std::fs::read(&path).unwrap());
    }
}
