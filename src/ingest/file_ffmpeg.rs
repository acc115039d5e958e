//! FFmpeg-backed local file decoding.
//!
//! Wraps an FFmpeg demuxer/decoder pair and yields packed RGB24 frames in
//! stream order. Stream metadata is truncated to integers at open time; end
//! of stream drains the decoder before reporting `Ok(None)`.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;

use crate::frame::{Frame, StreamInfo};
use crate::SourceOpenError;

pub(crate) struct FfmpegFileSource {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    info: StreamInfo,
    frames_read: u64,
    sent_eof: bool,
    finished: bool,
}

impl FfmpegFileSource {
    pub(crate) fn open(path: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .map_err(|err| SourceOpenError::new(path, format!("ffmpeg open failed: {err}")))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| SourceOpenError::new(path, "file has no video track"))?;
        let stream_index = input_stream.index();

        // Truncate the container's rational frame rate to an integer.
        let rate = f64::from(input_stream.avg_frame_rate());
        let fps = if rate.is_finite() && rate > 0.0 {
            rate as u32
        } else {
            0
        };

        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|err| SourceOpenError::new(path, format!("no usable decoder: {err}")))?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        let info = StreamInfo {
            width: decoder.width(),
            height: decoder.height(),
            fps,
        };

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            info,
            frames_read: 0,
            sent_eof: false,
            finished: false,
        })
    }

    pub(crate) fn stream_info(&self) -> StreamInfo {
        self.info
    }

    pub(crate) fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        loop {
            if let Some(frame) = self.receive_decoded()? {
                return Ok(Some(frame));
            }
            if self.sent_eof {
                self.finished = true;
                return Ok(None);
            }

            // Feed the decoder one packet from our video stream.
            let mut fed = false;
            for (stream, packet) in self.input.packets() {
                if stream.index() != self.stream_index {
                    continue;
                }
                self.decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?;
                fed = true;
                break;
            }

            if !fed {
                // Demuxer exhausted; drain whatever the decoder still holds.
                self.decoder
                    .send_eof()
                    .context("signal end of stream to ffmpeg decoder")?;
                self.sent_eof = true;
            }
        }
    }

    fn receive_decoded(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;

        let frame = Frame::new(pixels, width, height, self.frames_read)?;
        self.frames_read += 1;
        Ok(Some(frame))
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
