//! WAV decoding and encoding.
//!
//! Pure functions with no I/O and no async runtime. The decoder reads the fixed
//! canonical header offsets the synthesis engine writes, then walks the chunk
//! list for `data`. Only 8-bit unsigned and 16-bit signed PCM are accepted.

use crate::error::DecodeError;
use crate::types::Waveform;

/// Smallest buffer that can hold a canonical RIFF/WAVE header.
pub const MIN_HEADER_LEN: usize = 44;

/// Offset of the first chunk header after `RIFF <size> WAVE`.
const FIRST_CHUNK_OFFSET: usize = 12;

/// Header fields needed to turn the data chunk into samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavHeader {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Byte offset in the buffer where raw PCM data begins.
    pub data_offset: usize,
    /// Length of the PCM payload, clamped to the bytes actually present.
    pub data_len: usize,
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// Parse a WAV header from a byte buffer.
///
/// Channel count, sample rate and bit depth come from the canonical offsets
/// 22, 24 and 34. The `data` chunk is located by scanning chunk headers from
/// offset 12. A declared data size larger than the buffer (including the
/// `0xFFFFFFFF` sentinel streaming writers use) is clamped to what is there.
pub fn parse_wav_header(buf: &[u8]) -> Result<WavHeader, DecodeError> {
    if buf.len() < MIN_HEADER_LEN {
        return Err(DecodeError::TooShort(buf.len()));
    }

    let channels = read_u16(buf, 22);
    let sample_rate = read_u32(buf, 24);
    let bits_per_sample = read_u16(buf, 34);
    if sample_rate == 0 {
        return Err(DecodeError::ZeroSampleRate);
    }

    let mut pos = FIRST_CHUNK_OFFSET;
    while pos + 8 <= buf.len() {
        let chunk_id = &buf[pos..pos + 4];
        let chunk_size = read_u32(buf, pos + 4) as usize;

        if chunk_id == b"data" {
            let data_offset = pos + 8;
            let available = buf.len() - data_offset;
            return Ok(WavHeader {
                channels,
                sample_rate,
                bits_per_sample,
                data_offset,
                data_len: chunk_size.min(available),
            });
        }

        pos = match pos.checked_add(8 + chunk_size) {
            Some(next) => next,
            None => break,
        };
    }

    Err(DecodeError::DataChunkNotFound)
}

/// Decode a WAV buffer into normalized float samples in `[-1, 1)`.
///
/// 16-bit samples are divided by 32768; 8-bit samples are offset by -128 and
/// divided by 128. Deterministic: identical input always yields identical
/// output.
pub fn decode_wav(buf: &[u8]) -> Result<Waveform, DecodeError> {
    let header = parse_wav_header(buf)?;
    if header.channels == 0 {
        return Err(DecodeError::NoChannels);
    }

    let data = &buf[header.data_offset..header.data_offset + header.data_len];
    let samples: Vec<f32> = match header.bits_per_sample {
        16 => data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
            .collect(),
        8 => data
            .iter()
            .map(|&byte| (byte as i16 - 128) as f32 / 128.0)
            .collect(),
        other => return Err(DecodeError::UnsupportedBitDepth(other)),
    };
    if samples.is_empty() {
        return Err(DecodeError::NoSamples);
    }

    Ok(Waveform {
        channels: header.channels,
        sample_rate: header.sample_rate,
        samples,
    })
}

/// Quantize a normalized float sample to 16-bit PCM.
pub fn quantize_i16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Encode interleaved 16-bit samples as a canonical PCM WAV file.
pub fn write_wav(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
    const BITS: u16 = 16;
    let block_align = channels * (BITS / 8);
    let byte_rate = sample_rate * u32::from(block_align);
    let data_len = (samples.len() * 2) as u32;

    let mut fmt: Vec<u8> = Vec::with_capacity(16);
    fmt.extend(1u16.to_le_bytes());
    fmt.extend(channels.to_le_bytes());
    fmt.extend(sample_rate.to_le_bytes());
    fmt.extend(byte_rate.to_le_bytes());
    fmt.extend(block_align.to_le_bytes());
    fmt.extend(BITS.to_le_bytes());

    let mut out = Vec::with_capacity(MIN_HEADER_LEN + data_len as usize);
    out.extend(*b"RIFF");
    // "WAVE" plus both chunks with their headers
    let riff_len = 4 + (8 + fmt.len() as u32) + (8 + data_len);
    out.extend(riff_len.to_le_bytes());
    out.extend(*b"WAVE");
    push_chunk_header(&mut out, b"fmt ", fmt.len() as u32);
    out.extend(fmt);
    push_chunk_header(&mut out, b"data", data_len);
    out.extend(samples.iter().flat_map(|s| s.to_le_bytes()));
    out
}

fn push_chunk_header(out: &mut Vec<u8>, id: &[u8; 4], len: u32) {
    out.extend(id);
    out.extend(len.to_le_bytes());
}
