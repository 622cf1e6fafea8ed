//! WAV export of DAC traces: one 16-bit PCM channel per output.

use std::io::Write;

use bb_ir::OUTPUT_CHANNELS;

use crate::DacFrame;

/// Shift from 12-bit DAC codes to full-scale 16-bit PCM.
const CODE_SHIFT: u32 = 4;

pub fn write_wav(w: &mut impl Write, frames: &[DacFrame], sample_rate: u32) -> std::io::Result<()> {
    let num_channels = OUTPUT_CHANNELS as u16;
    let bits_per_sample: u16 = 16;
    let block_align = num_channels * (bits_per_sample / 8);
    let data_size = frames.len() as u32 * block_align as u32;

    write_riff_header(w, data_size)?;
    write_fmt_chunk(w, num_channels, sample_rate, block_align, bits_per_sample)?;
    write_data_chunk(w, frames, data_size)
}

pub fn frames_to_wav(frames: &[DacFrame], sample_rate: u32) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(44 + frames.len() * OUTPUT_CHANNELS * 2);
    write_wav(&mut buf, frames, sample_rate)?;
    Ok(buf)
}

fn write_riff_header(w: &mut impl Write, data_size: u32) -> std::io::Result<()> {
    w.write_all(b"RIFF")?;
    w.write_all(&(36 + data_size).to_le_bytes())?;
    w.write_all(b"WAVE")
}

fn write_fmt_chunk(
    w: &mut impl Write,
    num_channels: u16,
    sample_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
) -> std::io::Result<()> {
    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?;
    w.write_all(&1u16.to_le_bytes())?;
    w.write_all(&num_channels.to_le_bytes())?;
    w.write_all(&sample_rate.to_le_bytes())?;
    w.write_all(&(sample_rate * block_align as u32).to_le_bytes())?;
    w.write_all(&block_align.to_le_bytes())?;
    w.write_all(&bits_per_sample.to_le_bytes())
}

fn write_data_chunk(w: &mut impl Write, frames: &[DacFrame], data_size: u32) -> std::io::Result<()> {
    w.write_all(b"data")?;
    w.write_all(&data_size.to_le_bytes())?;
    for frame in frames {
        for code in frame {
            let pcm = code.saturating_mul(1 << CODE_SHIFT);
            w.write_all(&pcm.to_le_bytes())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_describes_four_channels() {
        let wav = frames_to_wav(&[[0; OUTPUT_CHANNELS]; 10], 48_000).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 4);
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 48_000);
        assert_eq!(u16::from_le_bytes([wav[32], wav[33]]), 8);
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 80);
        assert_eq!(wav.len(), 44 + 80);
    }

    #[test]
    fn codes_scale_to_sixteen_bits() {
        let wav = frames_to_wav(&[[2047, -2048, 1, 0]], 48_000).unwrap();
        let sample = |i: usize| i16::from_le_bytes([wav[44 + 2 * i], wav[45 + 2 * i]]);
        assert_eq!(sample(0), 32752);
        assert_eq!(sample(1), i16::MIN);
        assert_eq!(sample(2), 16);
        assert_eq!(sample(3), 0);
    }
}
