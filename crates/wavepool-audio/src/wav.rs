//! RIFF/WAVE header parsing for in-memory PCM assets.
//!
//! Only the canonical layout is understood: a RIFF header, a `fmt ` chunk
//! and then a `data` chunk running to the end of the buffer. A `fmt ` body
//! larger than 16 bytes is assumed to carry just the 2-byte extension size
//! field, which is skipped.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Header bytes counted by the RIFF chunk size: form type, `fmt ` chunk, `data` chunk header.
const RIFF_SIZE_OVERHEAD: u32 = 36;
/// Body length of a plain PCM `fmt ` chunk.
const PCM_FMT_BODY_LEN: u32 = 16;
/// Bytes skipped after an extended `fmt ` chunk.
const FMT_EXTENSION_LEN: u64 = 2;
/// WAVE_FORMAT_PCM
const FORMAT_TAG_PCM: u16 = 1;

/// Sample layouts a buffer can be uploaded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmFormat {
    Mono8,
    Mono16,
    Stereo8,
    Stereo16,
}

impl PcmFormat {
    /// Pick the format for a channel count and sample width. Anything other
    /// than mono/stereo at 8/16 bits has no format.
    pub fn from_layout(channels: u16, bits_per_sample: u16) -> Option<Self> {
        match (channels, bits_per_sample) {
            (1, 8) => Some(PcmFormat::Mono8),
            (1, 16) => Some(PcmFormat::Mono16),
            (2, 8) => Some(PcmFormat::Stereo8),
            (2, 16) => Some(PcmFormat::Stereo16),
            _ => None,
        }
    }

    pub fn channels(self) -> u16 {
        match self {
            PcmFormat::Mono8 | PcmFormat::Mono16 => 1,
            PcmFormat::Stereo8 | PcmFormat::Stereo16 => 2,
        }
    }

    pub fn bits_per_sample(self) -> u16 {
        match self {
            PcmFormat::Mono8 | PcmFormat::Stereo8 => 8,
            PcmFormat::Mono16 | PcmFormat::Stereo16 => 16,
        }
    }

    /// Bytes per sample frame (one sample for every channel).
    pub fn frame_size(self) -> usize {
        usize::from(self.channels()) * usize::from(self.bits_per_sample() / 8)
    }
}

/// Reasons a byte buffer is not an acceptable WAV asset.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WavError {
    #[error("Invalid RIFF or WAVE Header")]
    InvalidRiffHeader,

    #[error("Invalid Wave Format")]
    InvalidFormatChunk,

    #[error("Invalid data header")]
    InvalidDataChunk,

    #[error("header ends early: needed more than {0} bytes")]
    Truncated(usize),

    #[error("buffer is {actual} bytes but the header describes {declared}")]
    SizeMismatch { declared: u64, actual: usize },

    #[error("unsupported PCM layout: {channels} channel(s) at {bits_per_sample} bits")]
    UnsupportedFormat { channels: u16, bits_per_sample: u16 },
}

/// The fields of a parsed WAV header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavHeader {
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub format: PcmFormat,
    /// Offset of the first sample byte.
    pub data_offset: usize,
    /// Length of the sample data in bytes, as declared by the `data` chunk.
    pub data_len: usize,
}

impl WavHeader {
    /// Parse and validate the header at the start of `bytes`.
    ///
    /// The declared data length plus the header length must equal the
    /// length of `bytes` exactly; trailing chunks are not supported.
    pub fn parse(bytes: &[u8]) -> Result<Self, WavError> {
        let mut cursor = Cursor::new(bytes);

        let chunk_id = read_tag(&mut cursor)?;
        let _chunk_size = read_u32(&mut cursor)?;
        let form_type = read_tag(&mut cursor)?;
        if &chunk_id != b"RIFF" || &form_type != b"WAVE" {
            return Err(WavError::InvalidRiffHeader);
        }

        if &read_tag(&mut cursor)? != b"fmt " {
            return Err(WavError::InvalidFormatChunk);
        }
        let fmt_len = read_u32(&mut cursor)?;
        let audio_format = read_u16(&mut cursor)?;
        let channels = read_u16(&mut cursor)?;
        let sample_rate = read_u32(&mut cursor)?;
        let byte_rate = read_u32(&mut cursor)?;
        let block_align = read_u16(&mut cursor)?;
        let bits_per_sample = read_u16(&mut cursor)?;
        if fmt_len > PCM_FMT_BODY_LEN {
            cursor.set_position(cursor.position() + FMT_EXTENSION_LEN);
        }

        if &read_tag(&mut cursor)? != b"data" {
            return Err(WavError::InvalidDataChunk);
        }
        let data_len = read_u32(&mut cursor)?;

        let data_offset = cursor.position();
        let declared = u64::from(data_len) + data_offset;
        if declared != bytes.len() as u64 {
            return Err(WavError::SizeMismatch {
                declared,
                actual: bytes.len(),
            });
        }

        let format = PcmFormat::from_layout(channels, bits_per_sample).ok_or(
            WavError::UnsupportedFormat {
                channels,
                bits_per_sample,
            },
        )?;

        Ok(Self {
            audio_format,
            channels,
            sample_rate,
            byte_rate,
            block_align,
            bits_per_sample,
            format,
            data_offset: data_offset as usize,
            data_len: data_len as usize,
        })
    }

    /// The sample bytes this header describes within `bytes`.
    pub fn samples<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        &bytes[self.data_offset..self.data_offset + self.data_len]
    }
}

fn read_tag(cursor: &mut Cursor<&[u8]>) -> Result<[u8; 4], WavError> {
    let mut tag = [0u8; 4];
    cursor
        .read_exact(&mut tag)
        .map_err(|_| WavError::Truncated(cursor.position() as usize))?;
    Ok(tag)
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, WavError> {
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| WavError::Truncated(cursor.position() as usize))
}

fn read_u16(cursor: &mut Cursor<&[u8]>) -> Result<u16, WavError> {
    cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| WavError::Truncated(cursor.position() as usize))
}

/// Wrap raw samples in a canonical 44-byte PCM WAV header.
pub fn encode_wav(format: PcmFormat, sample_rate: u32, samples: &[u8]) -> Vec<u8> {
    let channels = format.channels();
    let bits = format.bits_per_sample();
    let block_align = channels * (bits / 8);
    let byte_rate = sample_rate * u32::from(block_align);
    let data_len = samples.len() as u32;

    let mut out = Vec::with_capacity(44 + samples.len());
    // Writes into a Vec cannot fail.
    let _ = write_header(
        &mut out,
        channels,
        sample_rate,
        byte_rate,
        block_align,
        bits,
        data_len,
    );
    out.extend_from_slice(samples);
    out
}

fn write_header(
    out: &mut Vec<u8>,
    channels: u16,
    sample_rate: u32,
    byte_rate: u32,
    block_align: u16,
    bits: u16,
    data_len: u32,
) -> std::io::Result<()> {
    out.extend_from_slice(b"RIFF");
    out.write_u32::<LittleEndian>(RIFF_SIZE_OVERHEAD + data_len)?;
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.write_u32::<LittleEndian>(PCM_FMT_BODY_LEN)?;
    out.write_u16::<LittleEndian>(FORMAT_TAG_PCM)?;
    out.write_u16::<LittleEndian>(channels)?;
    out.write_u32::<LittleEndian>(sample_rate)?;
    out.write_u32::<LittleEndian>(byte_rate)?;
    out.write_u16::<LittleEndian>(block_align)?;
    out.write_u16::<LittleEndian>(bits)?;
    out.extend_from_slice(b"data");
    out.write_u32::<LittleEndian>(data_len)?;
    Ok(())
}
