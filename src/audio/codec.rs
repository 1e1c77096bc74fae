//! Audio codec bridge: base64 transcoding, data-URL payload extraction,
//! raw PCM decoding, and WAV encoding for the transcription upload.
//!
//! The speech API returns header-less little-endian signed 16-bit PCM, not a
//! container format, so `decode_raw_audio` is a raw decoder rather than a
//! parser: it trusts the caller's sample rate and channel count.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Sample rate of synthesized speech returned by the TTS API.
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;

/// Channel count of synthesized speech.
pub const SPEECH_CHANNELS: usize = 1;

/// Decoded PCM audio ready for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    /// One sample vector per channel, deinterleaved.
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl PcmBuffer {
    /// Frames per channel.
    pub fn frame_count(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }
}

/// Encode bytes as standard base64.
pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode standard base64 back into bytes.
pub fn decode_base64(text: &str) -> anyhow::Result<Vec<u8>> {
    BASE64
        .decode(text)
        .map_err(|e| anyhow::anyhow!("invalid base64 payload: {e}"))
}

/// Extract the base64 payload of a data URL, stripping the
/// `data:<mime>;base64,` header before the first comma.
pub fn data_url_payload(url: &str) -> anyhow::Result<&str> {
    url.split_once(',')
        .map(|(_, payload)| payload)
        .ok_or_else(|| anyhow::anyhow!("not a data URL: missing ',' separator"))
}

/// Extract the mime type of a data URL (the part between `data:` and the
/// first `;` or `,`). Returns `None` for non-data-URL input.
pub fn data_url_mime(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("data:")?;
    let end = rest.find([';', ','])?;
    Some(&rest[..end])
}

/// Decode header-less little-endian i16 PCM into per-channel f32 samples
/// normalized to [-1.0, 1.0) by dividing by 32768.
///
/// Frame count is `sample_count / channels`; remainder samples (and any odd
/// trailing byte) are silently dropped.
pub fn decode_raw_audio(
    bytes: &[u8],
    sample_rate: u32,
    channels: usize,
) -> anyhow::Result<PcmBuffer> {
    if channels == 0 {
        anyhow::bail!("channel count must be non-zero");
    }

    let samples: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();

    let frames = samples.len() / channels;
    let mut out = Vec::with_capacity(channels);
    for ch in 0..channels {
        let mut channel = Vec::with_capacity(frames);
        for frame in 0..frames {
            channel.push(samples[frame * channels + ch]);
        }
        out.push(channel);
    }

    Ok(PcmBuffer {
        channels: out,
        sample_rate,
    })
}

/// Encode f32 audio samples as 16-bit mono PCM WAV bytes.
pub fn encode_wav(audio: &[f32], sample_rate: u32) -> Vec<u8> {
    let num_samples = audio.len() as u32;
    let bytes_per_sample: u16 = 2; // 16-bit
    let num_channels: u16 = 1;
    let data_size = num_samples * bytes_per_sample as u32;
    let file_size = 36 + data_size; // RIFF header is 44 bytes total, minus 8 for RIFF+size

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt sub-chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // sub-chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    buf.extend_from_slice(&num_channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    let byte_rate = sample_rate * num_channels as u32 * bytes_per_sample as u32;
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    let block_align = num_channels * bytes_per_sample;
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&(bytes_per_sample * 8).to_le_bytes()); // bits per sample

    // data sub-chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in audio {
        let clamped = sample.clamp(-1.0, 1.0);
        let pcm = (clamped * 32767.0) as i16;
        buf.extend_from_slice(&pcm.to_le_bytes());
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_round_trip() {
        let cases: Vec<Vec<u8>> = vec![
            vec![],
            vec![0],
            vec![0xff, 0x00, 0x7f, 0x80],
            (0..=255u8).collect(),
            vec![1, 2, 3, 4, 5, 6, 7],
        ];
        for bytes in cases {
            let encoded = encode_base64(&bytes);
            assert_eq!(decode_base64(&encoded).unwrap(), bytes);
        }
    }

    #[test]
    fn test_decode_base64_rejects_garbage() {
        assert!(decode_base64("not!!base64??").is_err());
    }

    #[test]
    fn test_data_url_payload_strips_header() {
        let url = "data:audio/ogg;base64,SGVsbG8=";
        assert_eq!(data_url_payload(url).unwrap(), "SGVsbG8=");
        assert_eq!(data_url_mime(url), Some("audio/ogg"));
    }

    #[test]
    fn test_data_url_payload_requires_comma() {
        assert!(data_url_payload("data:audio/ogg;base64").is_err());
        assert_eq!(data_url_mime("plain text"), None);
    }

    #[test]
    fn test_decode_raw_audio_mono() {
        // 0, 16384, -32768 as LE i16
        let bytes = [0u8, 0, 0, 64, 0, 128];
        let buf = decode_raw_audio(&bytes, 24_000, 1).unwrap();
        assert_eq!(buf.sample_rate, 24_000);
        assert_eq!(buf.channels.len(), 1);
        assert_eq!(buf.frame_count(), 3);
        assert_eq!(buf.channels[0], vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn test_decode_raw_audio_deinterleaves_stereo() {
        // Interleaved L/R: (100, -100), (200, -200)
        let mut bytes = Vec::new();
        for s in [100i16, -100, 200, -200] {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        let buf = decode_raw_audio(&bytes, 48_000, 2).unwrap();
        assert_eq!(buf.frame_count(), 2);
        assert_eq!(buf.channels[0], vec![100.0 / 32768.0, 200.0 / 32768.0]);
        assert_eq!(buf.channels[1], vec![-100.0 / 32768.0, -200.0 / 32768.0]);
    }

    #[test]
    fn test_decode_raw_audio_drops_remainder() {
        // 3 samples, 2 channels: one full frame, one dangling sample.
        // Plus an odd trailing byte that can't form an i16.
        let mut bytes = Vec::new();
        for s in [1i16, 2, 3] {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        bytes.push(0xab);
        let buf = decode_raw_audio(&bytes, 24_000, 2).unwrap();
        assert_eq!(buf.frame_count(), 1);
        assert_eq!(buf.channels[0].len(), 1);
        assert_eq!(buf.channels[1].len(), 1);
    }

    #[test]
    fn test_decode_raw_audio_range() {
        let mut bytes = Vec::new();
        for s in [i16::MIN, -1, 0, 1, i16::MAX] {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        let buf = decode_raw_audio(&bytes, 24_000, 1).unwrap();
        for &v in &buf.channels[0] {
            assert!((-1.0..1.0).contains(&v), "sample {v} out of range");
        }
        assert_eq!(buf.channels[0][0], -1.0);
        assert_eq!(buf.channels[0][4], 32767.0 / 32768.0);
    }

    #[test]
    fn test_decode_raw_audio_zero_channels() {
        assert!(decode_raw_audio(&[0, 0], 24_000, 0).is_err());
    }

    #[test]
    fn test_encode_wav_header() {
        let wav = encode_wav(&[0.0, 0.5, -0.5, 1.0], 16_000);
        assert_eq!(wav.len(), 44 + 8);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[36..40], b"data");
        // data size field
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 8);
        // sample rate field
        assert_eq!(
            u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]),
            16_000
        );
        // full-scale sample clamps to i16::MAX
        assert_eq!(i16::from_le_bytes([wav[50], wav[51]]), i16::MAX);
    }
}
