use std::path::Path;
use std::sync::OnceLock;

use ffmpeg::util::frame::video::Video;
use ffmpeg_next::{self as ffmpeg, codec, decoder, format, media, rescale, software, Error};
use image::RgbImage;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::capture::{blit, ListenerId, VideoSurface};

static INIT: OnceLock<Result<(), Error>> = OnceLock::new();

const NO_PTS: i64 = i64::MIN;

pub(crate) fn init() -> anyhow::Result<()> {
    INIT.get_or_init(ffmpeg::init).clone()?;
    Ok(())
}

/// A video file opened for random-access frame grabs.
///
/// Behaves like a paused player: seeking decodes forward to the first frame at
/// or after the target and keeps it as the displayed frame.
pub(crate) struct FfmpegVideo {
    input: format::context::Input,
    stream_index: usize,
    time_base: f64,
    /// Presentation start of the video stream, in seconds.
    start: f64,
    decoder: decoder::Video,
    scaler: software::scaling::Context,
    duration: Option<f64>,
    current_time: f64,
    paused: bool,
    displayed: Option<RgbImage>,
    seeked_listeners: Vec<(ListenerId, oneshot::Sender<()>)>,
    next_listener: u64,
}

impl FfmpegVideo {
    pub(crate) fn open(path: &Path) -> anyhow::Result<Self> {
        init()?;
        let input = format::input(&path)?;
        let video_stream = input
            .streams()
            .best(media::Type::Video)
            .ok_or(anyhow::anyhow!(Error::StreamNotFound))?;
        let stream_index = video_stream.index();
        let time_base: f64 = video_stream.time_base().into();
        let start = match video_stream.start_time() {
            NO_PTS => 0.0,
            pts => pts as f64 * time_base,
        };
        let decoder = codec::context::Context::from_parameters(video_stream.parameters())?
            .decoder()
            .video()?;

        let scaler = software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            software::scaling::Flags::BILINEAR,
        )?;

        let duration = match input.duration() {
            d if d > 0 => Some(d as f64 * f64::from(rescale::TIME_BASE)),
            _ => None,
        };
        debug!(
            path = %path.display(),
            width = decoder.width(),
            height = decoder.height(),
            ?duration,
            start,
            "opened video"
        );

        Ok(Self {
            input,
            stream_index,
            time_base,
            start,
            decoder,
            scaler,
            duration,
            current_time: 0.0,
            paused: true,
            displayed: None,
            seeked_listeners: Vec::new(),
            next_listener: 0,
        })
    }

    fn render_at(&mut self, time: f64) -> anyhow::Result<RgbImage> {
        let (position, target_pts) = seek_targets(time, self.start, self.time_base);
        self.input.seek(position, ..position)?;
        self.decoder.flush();

        let mut decoded = Video::empty();
        let mut latest = None;
        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder.send_packet(&packet)?;
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let frame = to_rgb(&mut self.scaler, &decoded)?;
                if decoded.timestamp().is_some_and(|pts| pts >= target_pts) {
                    return Ok(frame);
                }
                latest = Some(frame);
            }
        }

        // Ran out of packets before the target; show the last frame instead.
        self.decoder.send_eof()?;
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            latest = Some(to_rgb(&mut self.scaler, &decoded)?);
        }
        latest.ok_or(anyhow::anyhow!("No frame decoded at {time:.2}s"))
    }

    fn notify_seeked(&mut self) {
        for (_, listener) in self.seeked_listeners.drain(..) {
            let _ = listener.send(());
        }
    }
}

/// Container seek position (`AV_TIME_BASE`) and stream pts for `time`
/// seconds after the stream's presentation start.
fn seek_targets(time: f64, start: f64, time_base: f64) -> (i64, i64) {
    let absolute = start + time.max(0.0);
    let position = (absolute / f64::from(rescale::TIME_BASE)).round() as i64;
    let target_pts = (absolute / time_base).round() as i64;
    (position, target_pts)
}

fn to_rgb(scaler: &mut software::scaling::Context, decoded: &Video) -> anyhow::Result<RgbImage> {
    let mut frame = Video::empty();
    scaler.run(decoded, &mut frame)?;

    let (width, height) = (frame.width(), frame.height());
    let stride = frame.stride(0);
    let row_len = width as usize * 3;
    let data = frame.data(0);
    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in 0..height as usize {
        pixels.extend_from_slice(&data[row * stride..row * stride + row_len]);
    }
    RgbImage::from_raw(width, height, pixels)
        .ok_or(anyhow::anyhow!("Failed to create image buffer"))
}

impl VideoSurface for FfmpegVideo {
    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.decoder.width(), self.decoder.height())
    }

    fn current_time(&self) -> f64 {
        self.current_time
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
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        self.seeked_listeners.push((id, listener));
        id
    }

    fn remove_seeked_listener(&mut self, id: ListenerId) {
        self.seeked_listeners.retain(|(existing, _)| *existing != id);
    }

    fn set_current_time(&mut self, time: f64) {
        self.current_time = time;
        self.displayed = match self.render_at(time) {
            Ok(frame) => Some(frame),
            Err(err) => {
                warn!(time, %err, "seek did not produce a frame");
                None
            }
        };
        self.notify_seeked();
    }

    fn draw_image(&self, canvas: &mut RgbImage) -> anyhow::Result<()> {
        let frame = self
            .displayed
            .as_ref()
            .ok_or(anyhow::anyhow!("No frame at {:.2}s", self.current_time))?;
        blit(canvas, frame)
    }
}
