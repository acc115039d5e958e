//! FFmpeg-backed video file encoding.
//!
//! Mirrors the decode side: packed RGB24 frames are scaled to YUV420P and
//! encoded into a container chosen by the output path, with the codec chosen
//! by the four-character tag. Geometry and rate come from the input's
//! `StreamInfo`; pts is the frame index in a 1/fps time base.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use crate::frame::{Frame, StreamInfo};
use crate::sink::FrameSink;

pub(crate) struct FfmpegFileSink {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    stream_index: usize,
    info: StreamInfo,
    frames_written: u64,
    finished: bool,
}

impl FfmpegFileSink {
    pub(crate) fn create(path: &str, info: StreamInfo, codec_tag: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;

        let codec_id = codec_for_tag(codec_tag)?;
        let codec = ffmpeg::encoder::find(codec_id)
            .ok_or_else(|| anyhow!("no encoder available for codec tag '{codec_tag}'"))?;

        let mut output = ffmpeg::format::output(&path)
            .with_context(|| format!("failed to create output file '{path}'"))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let encoder_time_base = ffmpeg::Rational(1, info.fps as i32);
        let (stream_index, encoder) = {
            let mut stream = output.add_stream(codec).context("add output stream")?;
            let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                .context("build encoder context")?;
            let mut encoder = context.encoder().video().context("open video encoder")?;
            encoder.set_width(info.width);
            encoder.set_height(info.height);
            encoder.set_format(ffmpeg::util::format::pixel::Pixel::YUV420P);
            encoder.set_time_base(encoder_time_base);
            encoder.set_frame_rate(Some(ffmpeg::Rational(info.fps as i32, 1)));
            if global_header {
                encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
            }
            let encoder = encoder.open_as(codec).context("open encoder for codec")?;
            stream.set_parameters(&encoder);
            stream.set_time_base(encoder_time_base);
            (stream.index(), encoder)
        };

        output.write_header().context("write container header")?;
        let stream_time_base = output
            .stream(stream_index)
            .ok_or_else(|| anyhow!("output stream disappeared"))?
            .time_base();

        let scaler = ffmpeg::software::scaling::context::Context::get(
            ffmpeg::util::format::pixel::Pixel::RGB24,
            info.width,
            info.height,
            ffmpeg::util::format::pixel::Pixel::YUV420P,
            info.width,
            info.height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            output,
            encoder,
            scaler,
            encoder_time_base,
            stream_time_base,
            stream_index,
            info,
            frames_written: 0,
            finished: false,
        })
    }

    fn drain_packets(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .context("write encoded packet")?;
        }
        Ok(())
    }
}

impl FrameSink for FfmpegFileSink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.finished {
            return Err(anyhow!("write after finish"));
        }
        if frame.width() != self.info.width || frame.height() != self.info.height {
            return Err(anyhow!(
                "frame size {}x{} does not match output {}x{}",
                frame.width(),
                frame.height(),
                self.info.width,
                self.info.height
            ));
        }

        let mut rgb = ffmpeg::frame::Video::new(
            ffmpeg::util::format::pixel::Pixel::RGB24,
            self.info.width,
            self.info.height,
        );
        let row_bytes = (self.info.width as usize) * 3;
        let stride = rgb.stride(0);
        let data = rgb.data_mut(0);
        for (row, chunk) in frame.pixels().chunks_exact(row_bytes).enumerate() {
            let start = row * stride;
            data[start..start + row_bytes].copy_from_slice(chunk);
        }

        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb, &mut yuv)
            .context("scale frame to YUV420P")?;
        yuv.set_pts(Some(frame.index() as i64));

        self.encoder
            .send_frame(&yuv)
            .context("send frame to encoder")?;
        self.drain_packets()?;
        self.frames_written += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.encoder.send_eof().context("flush encoder")?;
        self.drain_packets()?;
        self.output.write_trailer().context("write container trailer")?;
        Ok(())
    }
}

fn codec_for_tag(tag: &str) -> Result<ffmpeg::codec::Id> {
    match tag.to_ascii_lowercase().as_str() {
        "mp4v" | "xvid" | "divx" => Ok(ffmpeg::codec::Id::MPEG4),
        "avc1" | "h264" => Ok(ffmpeg::codec::Id::H264),
        "mjpg" => Ok(ffmpeg::codec::Id::MJPEG),
        other => Err(anyhow!("unsupported codec tag '{other}'")),
    }
}
