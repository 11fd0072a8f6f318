//! PCM helpers shared by the HTTP endpoint and the capture pipeline:
//! WAV decoding, mono downmix, and sample-rate conversion.

use anyhow::{anyhow, Context, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::io::Cursor;

/// Decoded mono audio ready for transcription
#[derive(Debug, Clone)]
pub struct PcmAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmAudio {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Decode a WAV payload into normalized mono f32 samples.
///
/// Accepts integer (any bit depth hound supports) and float sample formats;
/// multi-channel audio is averaged down to mono.
pub fn decode_wav(data: &[u8]) -> Result<PcmAudio> {
    let mut reader =
        hound::WavReader::new(Cursor::new(data)).context("Failed to parse WAV data")?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read float samples")?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read integer samples")?
        }
    };

    if spec.channels == 0 {
        return Err(anyhow!("WAV reports zero channels"));
    }

    let samples = if spec.channels == 1 {
        interleaved
    } else {
        average_channels(&interleaved, spec.channels as usize)
    };

    Ok(PcmAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Average interleaved multi-channel samples into a mono track
pub fn average_channels(interleaved: &[f32], channels: usize) -> Vec<f32> {
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resample mono audio to the target rate
pub fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || input.is_empty() {
        return Ok(input.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        to_rate as f64 / from_rate as f64,
        2.0,
        params,
        input.len(),
        1,
    )
    .context("Failed to build resampler")?;

    let waves_in = vec![input.to_vec()];
    let waves_out = resampler
        .process(&waves_in, None)
        .context("Resampling failed")?;

    waves_out
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Resampler produced no output"))
}

/// Resample to the target rate, returning the input unchanged when the rates
/// already match
pub fn to_rate(audio: PcmAudio, target_rate: u32) -> Result<PcmAudio> {
    if audio.sample_rate == target_rate {
        return Ok(audio);
    }
    let samples = resample(&audio.samples, audio.sample_rate, target_rate)?;
    Ok(PcmAudio {
        samples,
        sample_rate: target_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(spec: hound::WavSpec, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_mono_i16() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let bytes = wav_bytes(spec, &[0, i16::MAX, i16::MIN]);
        let audio = decode_wav(&bytes).unwrap();

        assert_eq!(audio.sample_rate, 16000);
        assert_eq!(audio.samples.len(), 3);
        assert!(audio.samples[0].abs() < 1e-6);
        assert!((audio.samples[1] - (i16::MAX as f32 / 32768.0)).abs() < 1e-6);
        assert!((audio.samples[2] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn downmixes_stereo() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        // L=16384, R=-16384 averages to 0; L=8192, R=8192 averages to 8192
        let bytes = wav_bytes(spec, &[16384, -16384, 8192, 8192]);
        let audio = decode_wav(&bytes).unwrap();

        assert_eq!(audio.samples.len(), 2);
        assert!(audio.samples[0].abs() < 1e-6);
        assert!((audio.samples[1] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_wav(b"definitely not a wav").is_err());
    }

    #[test]
    fn resample_identity() {
        let input = vec![0.1, 0.2, 0.3];
        let out = resample(&input, 16000, 16000).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn resample_halves_length() {
        let input: Vec<f32> = (0..32000)
            .map(|i| (i as f32 * 0.01).sin() * 0.5)
            .collect();
        let out = resample(&input, 32000, 16000).unwrap();

        // Sinc resamplers have edge effects, so allow some slack around N/2
        let expected = input.len() / 2;
        let tolerance = expected / 10;
        assert!(
            out.len().abs_diff(expected) <= tolerance,
            "unexpected output length {} (expected about {})",
            out.len(),
            expected
        );
    }

    #[test]
    fn duration_reflects_rate() {
        let audio = PcmAudio {
            samples: vec![0.0; 16000],
            sample_rate: 16000,
        };
        assert!((audio.duration_secs() - 1.0).abs() < 1e-6);
    }
}
