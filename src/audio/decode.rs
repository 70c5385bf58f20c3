use std::io::Cursor;

use symphonia::core::audio::SampleBuffer as PacketBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::buffer::SampleBuffer;
use crate::error::{RenderError, RenderResult};

/// Per-channel PCM produced by an [`AudioDecoder`].
#[derive(Clone, Debug)]
pub struct DecodedAudio {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration(&self) -> f64 {
        let frames = self.channels.first().map_or(0, Vec::len);
        if self.sample_rate == 0 {
            0.0
        } else {
            frames as f64 / self.sample_rate as f64
        }
    }

    /// The render consumes channel 0 only.
    pub fn into_first_channel(self) -> RenderResult<SampleBuffer> {
        let sample_rate = self.sample_rate;
        let samples = self
            .channels
            .into_iter()
            .next()
            .ok_or_else(|| RenderError::decode("decoded audio has no channels"))?;
        Ok(SampleBuffer::new(samples, sample_rate))
    }
}

/// Turns encoded audio bytes into raw samples.
pub trait AudioDecoder {
    /// `extension` is a format hint such as `"mp3"`; it may be absent.
    fn decode(&self, bytes: &[u8], extension: Option<&str>) -> RenderResult<DecodedAudio>;
}

pub struct SymphoniaDecoder;

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, bytes: &[u8], extension: Option<&str>) -> RenderResult<DecodedAudio> {
        decode_audio(bytes, extension)
    }
}

pub fn decode_audio(bytes: &[u8], extension: Option<&str>) -> RenderResult<DecodedAudio> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| RenderError::decode(format!("failed to probe audio format: {e}")))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| RenderError::decode("no audio tracks found"))?;

    let track_id = track.id;
    let channel_count = track.codec_params.channels.map_or(1, |c| c.count()).max(1);
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| RenderError::decode("unknown sample rate"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| RenderError::decode(format!("failed to create audio decoder: {e}")))?;

    let mut channels: Vec<Vec<f32>> = vec![Vec::new(); channel_count];

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(RenderError::decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(msg)) => {
                log::debug!("Skipping undecodable packet: {}", msg);
                continue;
            }
            Err(e) => return Err(RenderError::decode(e.to_string())),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();
        let packet_channels = spec.channels.count().max(1);

        let mut sample_buf = PacketBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        for frame in sample_buf.samples().chunks(packet_channels) {
            for (ch, &sample) in frame.iter().enumerate().take(channel_count) {
                channels[ch].push(sample);
            }
        }
    }

    if channels[0].is_empty() {
        return Err(RenderError::decode("audio stream contained no samples"));
    }

    let audio = DecodedAudio {
        channels,
        sample_rate,
    };

    log::info!(
        "Decoded audio: {} channel(s), {} samples, {}Hz, {:.1}s",
        audio.channels.len(),
        audio.channels[0].len(),
        sample_rate,
        audio.duration()
    );

    Ok(audio)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal 16-bit PCM RIFF/WAVE file.
    fn wav_bytes(channels: u16, sample_rate: u32, interleaved: &[i16]) -> Vec<u8> {
        let data_len = (interleaved.len() * 2) as u32;
        let block_align = channels * 2;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in interleaved {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    #[test]
    fn decodes_stereo_wav_into_separate_channels() {
        let mut interleaved = Vec::new();
        for _ in 0..800 {
            interleaved.push(16384i16);
            interleaved.push(-16384i16);
        }
        let bytes = wav_bytes(2, 8000, &interleaved);

        let audio = decode_audio(&bytes, Some("wav")).unwrap();
        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.channels.len(), 2);
        assert_eq!(audio.channels[0].len(), 800);
        assert!((audio.channels[0][10] - 0.5).abs() < 1e-3);
        assert!((audio.channels[1][10] + 0.5).abs() < 1e-3);
        assert!((audio.duration() - 0.1).abs() < 1e-9);

        let track = audio.into_first_channel().unwrap();
        assert_eq!(track.len(), 800);
        assert!(track.samples().iter().all(|s| *s > 0.0));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = decode_audio(b"definitely not audio", None).unwrap_err();
        assert!(matches!(err, RenderError::Decode(_)));
    }
}
