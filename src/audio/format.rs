//! # Audio Format Handling
//!
//! Декодирование синтезированной речи в моно PCM (f32) и запись WAV.
//!
//! - WAV читается через hound (8/16/24/32 бит, float)
//! - MP3, AAC, FLAC, OGG и прочее декодируется через Symphonia
//! - многоканальное аудио сводится в моно

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::errors::{AppError, Result};

/// Длительность в секундах по количеству семплов и частоте дискретизации.
///
/// ```rust
/// use narration_batch::audio::duration_in_seconds;
/// assert_eq!(duration_in_seconds(88200, 44100), 2.0);
/// ```
pub fn duration_in_seconds(sample_count: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    sample_count as f64 / sample_rate as f64
}

/// Максимальная абсолютная амплитуда
pub fn peak_amplitude(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()))
}

/// Декодирует аудиофайл в моно PCM. WAV идет через hound, остальное через Symphonia.
pub fn decode_audio_file<P: AsRef<Path>>(file_path: P) -> Result<(Vec<f32>, u32)> {
    let file_path = file_path.as_ref();
    let extension = file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    if extension == "wav" {
        return decode_wav_file(file_path);
    }

    let data = std::fs::read(file_path)?;
    let (samples, sample_rate) = decode_bytes(data, Some(&extension))?;
    debug!(
        "Decoded {} samples from {} at {} Hz",
        samples.len(),
        file_path.display(),
        sample_rate
    );
    Ok((samples, sample_rate))
}

/// Декодирует сжатое аудио из памяти
pub fn decode_bytes(data: Vec<u8>, extension: Option<&str>) -> Result<(Vec<f32>, u32)> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension.filter(|e| !e.is_empty()) {
        hint.with_extension(ext);
    }

    let format_opts = FormatOptions {
        enable_gapless: false,
        ..Default::default()
    };

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &MetadataOptions::default())
        .map_err(|e| AppError::Audio(format!("Unrecognized audio format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AppError::Audio("No audio track found".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AppError::Audio(format!("Failed to create decoder: {}", e)))?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1).max(1);

    let mut pcm_data = Vec::new();

    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
                sample_buf.copy_interleaved_ref(decoded);

                if channels > 1 {
                    for frame in sample_buf.samples().chunks(channels) {
                        pcm_data.push(frame.iter().sum::<f32>() / channels as f32);
                    }
                } else {
                    pcm_data.extend_from_slice(sample_buf.samples());
                }
            }
            Err(e) => {
                // Пропускаем битый пакет
                warn!("Failed to decode packet: {}", e);
                continue;
            }
        }
    }

    Ok((pcm_data, sample_rate))
}

/// Декодирует WAV-файл в моно PCM
pub fn decode_wav_file<P: AsRef<Path>>(file_path: P) -> Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(file_path.as_ref())?;

    let spec = reader.spec();
    let sample_rate = spec.sample_rate;

    let pcm_data: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| v as f32 / 128.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8388608.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2147483648.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        _ => {
            return Err(AppError::Audio(format!(
                "Unsupported WAV format: {:?}, {} bits",
                spec.sample_format, spec.bits_per_sample
            )));
        }
    };

    let channels = spec.channels as usize;
    if channels > 1 {
        let mono = pcm_data
            .chunks(channels)
            .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
            .collect();
        Ok((mono, sample_rate))
    } else {
        Ok((pcm_data, sample_rate))
    }
}

/// Записывает моно PCM в 16-битный WAV
pub fn encode_wav<P: AsRef<Path>>(pcm_data: &[f32], sample_rate: u32, output_path: P) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(output_path.as_ref(), spec)?;
    for &sample in pcm_data {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value)?;
    }
    writer.finalize()?;

    debug!(
        "Wrote WAV {} ({} samples, {} Hz)",
        output_path.as_ref().display(),
        pcm_data.len(),
        sample_rate
    );
    Ok(())
}
