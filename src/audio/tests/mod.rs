//! Shared fixtures for audio tests: synthesized WAV sources.

use std::io::Cursor;
use std::path::{Path, PathBuf};


/// Encode interleaved 16-bit samples as an in-memory WAV file
pub fn wav_bytes(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Write a WAV file into `dir` and return its path
pub fn write_wav(dir: &Path, name: &str, samples: &[i16], channels: u16, sample_rate: u32) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, wav_bytes(samples, channels, sample_rate)).unwrap();
    path
}

/// Mono source holding one value for `frames` frames
pub fn constant_wav(dir: &Path, name: &str, value: i16, frames: usize, sample_rate: u32) -> PathBuf {
    write_wav(dir, name, &vec![value; frames], 1, sample_rate)
}
