//! Decoding fetched bytes into an [`AudioBuffer`].
//!
//! The container is sniffed from the first bytes: `OggS` goes to lewton,
//! `RIFF....WAVE` to hound, ID3 tags or an MPEG frame sync to minimp3.

use std::io::Cursor;

use lewton::inside_ogg::OggStreamReader;
use tracing::trace;

use crate::buffer::AudioBuffer;
use crate::error::DecodeError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Container {
    Ogg,
    Wav,
    Mp3,
}

fn sniff(bytes: &[u8]) -> Option<Container> {
    if bytes.starts_with(b"OggS") {
        Some(Container::Ogg)
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        Some(Container::Wav)
    } else if bytes.starts_with(b"ID3") || (bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0) {
        Some(Container::Mp3)
    } else {
        None
    }
}

/// Decodes an Ogg Vorbis, WAV or MP3 byte stream.
pub fn decode(bytes: &[u8]) -> Result<AudioBuffer, DecodeError> {
    let container = sniff(bytes).ok_or(DecodeError::UnsupportedFormat)?;
    trace!(?container, len = bytes.len(), "decoding");

    let buffer = match container {
        Container::Ogg => decode_ogg(bytes)?,
        Container::Wav => decode_wav(bytes)?,
        Container::Mp3 => decode_mp3(bytes)?,
    };

    if buffer.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(buffer)
}

fn decode_ogg(bytes: &[u8]) -> Result<AudioBuffer, DecodeError> {
    let mut srr = OggStreamReader::new(Cursor::new(bytes))?;
    let channels = srr.ident_hdr.audio_channels as usize;
    let sample_rate = srr.ident_hdr.audio_sample_rate;

    let mut interleaved = Vec::new();
    while let Some(packet) = srr.read_dec_packet_itl()? {
        interleaved.extend(packet.iter().map(|&s| s as f32 / 32768.0));
    }

    Ok(AudioBuffer::from_interleaved(&interleaved, channels, sample_rate))
}

fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer, DecodeError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let max = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<_, _>>()?
        }
    };

    Ok(AudioBuffer::from_interleaved(
        &interleaved,
        spec.channels as usize,
        spec.sample_rate,
    ))
}

fn decode_mp3(bytes: &[u8]) -> Result<AudioBuffer, DecodeError> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(bytes));
    let mut interleaved = Vec::new();
    let mut format: Option<(usize, u32)> = None;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                let channels = frame.channels.max(1);
                let rate = frame.sample_rate.max(0) as u32;
                match format {
                    None => format = Some((channels, rate)),
                    // mid-stream format changes are not supported; keep the first
                    Some((c, _)) if c != channels => continue,
                    Some(_) => {}
                }
                interleaved.extend(frame.data.iter().map(|&s| s as f32 / 32768.0));
            }
            Err(minimp3::Error::Eof) => break,
            Err(minimp3::Error::SkippedData) => continue,
            Err(e) => return Err(DecodeError::Mp3(format!("{e:?}"))),
        }
    }

    let (channels, sample_rate) = format.ok_or(DecodeError::Empty)?;
    Ok(AudioBuffer::from_interleaved(&interleaved, channels, sample_rate))
}
