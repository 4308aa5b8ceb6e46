use crate::capture::domain::source_descriptor::SourceDescriptor;
use crate::capture::domain::video_source::{DecodedFrame, SourceInfo, VideoSource};
use crate::shared::frame::Frame;

/// Decodes camera streams and recordings via ffmpeg-next.
///
/// Network streams are opened over TCP. Each decoded frame is converted to
/// RGB24 and stamped with its presentation time in milliseconds.
pub struct FfmpegSource {
    input_ctx: Option<ffmpeg_next::format::context::Input>,
    video_stream_index: usize,
}

// Safety: FfmpegSource is owned by exactly one capture thread.
// The raw pointers inside ffmpeg types are never shared across threads.
unsafe impl Send for FfmpegSource {}

impl FfmpegSource {
    pub fn new() -> Self {
        Self {
            input_ctx: None,
            video_stream_index: 0,
        }
    }
}

impl Default for FfmpegSource {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSource for FfmpegSource {
    fn open(
        &mut self,
        descriptor: &SourceDescriptor,
    ) -> Result<SourceInfo, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let ictx = match descriptor {
            SourceDescriptor::Live(url) => {
                let mut options = ffmpeg_next::Dictionary::new();
                options.set("rtsp_transport", "tcp");
                ffmpeg_next::format::input_with_dictionary(url, options)?
            }
            SourceDescriptor::File(path) => ffmpeg_next::format::input(path)?,
        };

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;

        let video_stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let info = SourceInfo {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
        };

        self.video_stream_index = video_stream_index;
        self.input_ctx = Some(ictx);

        Ok(info)
    }

    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<DecodedFrame, Box<dyn std::error::Error>>> + '_> {
        let video_stream_index = self.video_stream_index;
        let Some(ictx) = self.input_ctx.as_mut() else {
            return Box::new(std::iter::once(Err("FfmpegSource: not opened".into())));
        };

        match FfmpegFrameIter::new(ictx, video_stream_index) {
            Ok(iter) => Box::new(iter),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn close(&mut self) {
        self.input_ctx = None;
    }
}

/// Lazily decodes one frame at a time.
struct FfmpegFrameIter<'a> {
    ictx: &'a mut ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    video_stream_index: usize,
    time_base: (i32, i32),
    last_position_ms: i64,
    flushing: bool,
    done: bool,
}

impl<'a> FfmpegFrameIter<'a> {
    fn new(
        ictx: &'a mut ffmpeg_next::format::context::Input,
        video_stream_index: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = ictx
            .stream(video_stream_index)
            .ok_or("video stream disappeared")?;
        let tb = stream.time_base();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let width = decoder.width();
        let height = decoder.height();

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        Ok(Self {
            ictx,
            decoder,
            scaler,
            width,
            height,
            video_stream_index,
            time_base: (tb.numerator(), tb.denominator()),
            last_position_ms: 0,
            flushing: false,
            done: false,
        })
    }

    fn try_receive(&mut self) -> Option<Result<DecodedFrame, Box<dyn std::error::Error>>> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return None;
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        if let Err(e) = self.scaler.run(&decoded, &mut rgb_frame) {
            return Some(Err(Box::new(e)));
        }

        let position_ms = decoded
            .timestamp()
            .map(|pts| pts_to_ms(pts, self.time_base))
            .unwrap_or(self.last_position_ms);
        self.last_position_ms = position_ms;

        let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
        Some(Ok(DecodedFrame {
            frame: Frame::new(pixels, self.width, self.height, 3),
            position_ms,
        }))
    }
}

impl Iterator for FfmpegFrameIter<'_> {
    type Item = Result<DecodedFrame, Box<dyn std::error::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if let Some(result) = self.try_receive() {
            return Some(result);
        }

        if self.flushing {
            self.done = true;
            return None;
        }

        loop {
            let Some((stream, packet)) = self.ictx.packets().next() else {
                let _ = self.decoder.send_eof();
                self.flushing = true;
                if let Some(result) = self.try_receive() {
                    return Some(result);
                }
                self.done = true;
                return None;
            };

            if stream.index() != self.video_stream_index {
                continue;
            }

            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }

            if let Some(result) = self.try_receive() {
                return Some(result);
            }
        }
    }
}

/// Converts a presentation timestamp in stream time-base units to ms.
fn pts_to_ms(pts: i64, time_base: (i32, i32)) -> i64 {
    let (num, den) = time_base;
    if den == 0 {
        return 0;
    }
    (pts as i128 * num as i128 * 1000 / den as i128) as i64
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// dropping any per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
