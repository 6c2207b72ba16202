//! WAV encoding, decoding and resampling helpers

use std::io::Cursor;
use std::path::Path;

use super::chunk::f32_to_i16;
use crate::{Error, Result};

/// Block size fed to the resampler
const RESAMPLE_CHUNK: usize = 1024;

fn mono_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Wrap 16-bit little-endian mono PCM in a WAV container
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, mono_spec(sample_rate))?;
        for pair in pcm.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Encode normalized f32 samples as a 16-bit mono WAV
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, mono_spec(sample_rate))?;
        for &sample in samples {
            writer.write_sample(f32_to_i16(sample))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Read a WAV file as normalized mono samples, mixing down extra channels
///
/// # Errors
///
/// Returns error if the file cannot be read or uses an unsupported format
pub fn read_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let reader = hound::WavReader::open(path)?;
    decode(reader)
}

/// Decode in-memory WAV bytes as normalized mono samples
///
/// # Errors
///
/// Returns error if the bytes are not a supported WAV stream
pub fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    decode(reader)
}

#[allow(clippy::cast_precision_loss)]
fn decode<R: std::io::Read>(reader: hound::WavReader<R>) -> Result<(Vec<f32>, u32)> {
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            if spec.bits_per_sample > 32 || spec.bits_per_sample == 0 {
                return Err(Error::Audio(format!(
                    "unsupported bit depth: {}",
                    spec.bits_per_sample
                )));
            }
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    tracing::debug!(
        samples = samples.len(),
        sample_rate = spec.sample_rate,
        channels,
        "decoded wav"
    );

    Ok((samples, spec.sample_rate))
}

/// Resample mono audio with rubato
///
/// A trailing partial block is zero-padded so no input is lost.
///
/// # Errors
///
/// Returns error if the resampler cannot be built or fails
#[allow(clippy::cast_possible_truncation)]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from_rate == 0 || to_rate == 0 {
        return Err(Error::Audio(format!(
            "cannot resample from {from_rate} Hz to {to_rate} Hz"
        )));
    }

    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, RESAMPLE_CHUNK, 2, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let mut output = Vec::with_capacity(input.len() * to_rate as usize / from_rate as usize + 1);

    for block in input.chunks(RESAMPLE_CHUNK) {
        let mut block = block.to_vec();
        block.resize(RESAMPLE_CHUNK, 0.0);
        let result = resampler
            .process(&[block], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    let expected = (input.len() as u64 * u64::from(to_rate) / u64::from(from_rate)) as usize;
    output.truncate(expected.min(output.len()));

    Ok(output.iter().map(|&s| s as f32).collect())
}
