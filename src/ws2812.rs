//! NRZ bitstream encoding for the WS281x/SK6812 family.
//!
//! The PWM serializer clocks at three times the LED bit rate, so every data
//! bit becomes a 3-bit symbol: `110` for a one and `100` for a zero. A frame
//! ends with at least [`RESET_US`] of low bits so the strip latches it.

use fugit::HertzU32;

use crate::color::{self, Color};
use crate::config::{ChannelConfig, StripType};
use crate::pixels::PixelBuffer;

const SYMBOL_HIGH: u32 = 0b110;
const SYMBOL_LOW: u32 = 0b100;
const SYMBOL_BITS: usize = 3;
const BYTE_SYMBOL_BITS: usize = 8 * SYMBOL_BITS;

pub const RESET_US: u32 = 55;

#[derive(Debug, PartialEq, Eq)]
pub enum DecodeError {
    InvalidSymbol { bit: usize },
    Truncated,
}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DecodeError::InvalidSymbol { bit } => write!(f, "Invalid symbol at bit {bit}"),
            DecodeError::Truncated => write!(f, "Bitstream ends mid pixel"),
        }
    }
}

impl core::error::Error for DecodeError {}

/// PWM bit clock for a given LED bit rate.
pub fn symbol_rate(frequency: HertzU32) -> u32 {
    frequency.to_Hz() * SYMBOL_BITS as u32
}

pub fn reset_bits(frequency: HertzU32) -> usize {
    (RESET_US as u64 * symbol_rate(frequency) as u64 / 1_000_000) as usize
}

pub fn frame_bits(pixel_count: usize, strip_type: StripType, frequency: HertzU32) -> usize {
    pixel_count * strip_type.bytes_per_pixel() * BYTE_SYMBOL_BITS + reset_bits(frequency)
}

/// 32-bit PWM words needed for one channel's frame.
pub fn frame_words(config: &ChannelConfig) -> usize {
    frame_bits(config.pixel_count, config.strip_type, config.frequency).div_ceil(32)
}

/// One channel's encoded PWM words, most significant bit first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedFrame {
    words: Vec<u32>,
}

impl EncodedFrame {
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn into_words(self) -> Vec<u32> {
        self.words
    }
}

impl From<Vec<u32>> for EncodedFrame {
    fn from(words: Vec<u32>) -> Self {
        Self { words }
    }
}

struct BitWriter {
    words: Vec<u32>,
    pos: usize,
}

impl BitWriter {
    fn new(n_words: usize) -> Self {
        Self {
            words: vec![0; n_words],
            pos: 0,
        }
    }

    /// Appends the low `n_bits` of `bits`, MSB first.
    fn push(&mut self, bits: u32, n_bits: usize) {
        for i in (0..n_bits).rev() {
            if bits & (1 << i) != 0 {
                self.words[self.pos / 32] |= 1 << (31 - self.pos % 32);
            }
            self.pos += 1;
        }
    }
}

fn encode_byte(mut data: u8) -> u32 {
    let mut encoded = 0u32;
    for _ in 0..8 {
        encoded <<= SYMBOL_BITS;
        if (data & 0x80) == 0 {
            encoded |= SYMBOL_LOW;
        } else {
            encoded |= SYMBOL_HIGH;
        }
        data <<= 1;
    }
    encoded
}

/// Encodes a channel's LEDs, brightness applied, followed by the reset code.
/// The frame is sized for `pixels`, whatever `config.pixel_count` says.
pub fn encode(pixels: &PixelBuffer, config: &ChannelConfig) -> EncodedFrame {
    let shifts = config.strip_type.shifts();
    let n_bytes = config.strip_type.bytes_per_pixel();
    let bits = frame_bits(pixels.len(), config.strip_type, config.frequency);
    let mut writer = BitWriter::new(bits.div_ceil(32));

    for &led in pixels.as_slice() {
        for shift in &shifts[..n_bytes] {
            let byte = color::scale((led >> shift) as u8, config.brightness);
            writer.push(encode_byte(byte), BYTE_SYMBOL_BITS);
        }
    }

    EncodedFrame {
        words: writer.words,
    }
}

struct SymbolReader<'a> {
    words: &'a [u32],
    pos: usize,
}

impl SymbolReader<'_> {
    fn bits_left(&self) -> usize {
        self.words.len() * 32 - self.pos
    }

    fn symbol(&mut self) -> Option<u32> {
        if self.bits_left() < SYMBOL_BITS {
            return None;
        }
        let mut symbol = 0;
        for _ in 0..SYMBOL_BITS {
            let bit = (self.words[self.pos / 32] >> (31 - self.pos % 32)) & 1;
            symbol = symbol << 1 | bit;
            self.pos += 1;
        }
        Some(symbol)
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        let mut data = 0u8;
        for _ in 0..8 {
            let at = self.pos;
            data = match self.symbol().ok_or(DecodeError::Truncated)? {
                SYMBOL_HIGH => data << 1 | 1,
                SYMBOL_LOW => data << 1,
                _ => return Err(DecodeError::InvalidSymbol { bit: at }),
            };
        }
        Ok(data)
    }
}

/// Recovers the wire colors of a frame, stopping at the reset code. The
/// result carries brightness scaling; components land back in `0xWWRRGGBB`.
pub fn decode(words: &[u32], strip_type: StripType) -> Result<Vec<Color>, DecodeError> {
    let shifts = strip_type.shifts();
    let n_bytes = strip_type.bytes_per_pixel();
    let mut reader = SymbolReader { words, pos: 0 };
    let mut leds = Vec::new();

    loop {
        let start = reader.pos;
        match reader.symbol() {
            None | Some(0) => break,
            Some(_) => reader.pos = start,
        }
        let mut led: Color = 0;
        for shift in &shifts[..n_bytes] {
            led |= (reader.byte()? as u32) << shift;
        }
        leds.push(led);
    }

    Ok(leds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_symbols() {
        assert_eq!(encode_byte(0x00), 0o444_444_44);
        assert_eq!(encode_byte(0xff), 0o666_666_66);
        assert_eq!(encode_byte(0x80), 0o644_444_44);
        assert_eq!(encode_byte(0x01), 0o444_444_46);
    }

    #[test]
    fn frame_size() {
        let config = ChannelConfig::new(18, 16);
        // 16 LEDs * 24 bits * 3 symbols + 55us at 2.4MHz
        assert_eq!(reset_bits(config.frequency), 132);
        assert_eq!(frame_bits(16, StripType::Grb, config.frequency), 1152 + 132);
        assert_eq!(frame_words(&config), 41);

        let slow = config.with_frequency(HertzU32::from_raw(400_000));
        assert_eq!(reset_bits(slow.frequency), 66);
        let rgbw = config.with_strip_type(StripType::Grbw);
        assert_eq!(frame_words(&rgbw), (1536 + 132usize).div_ceil(32));
    }

    #[test]
    fn single_grb_led_on_wire() {
        let config = ChannelConfig::new(18, 1);
        let mut pixels = PixelBuffer::new(1);
        pixels.set(0, 0x00ff_0000).unwrap();
        let frame = encode(&pixels, &config);

        // green 0x00, then red 0xff, then blue 0x00
        let mut expected = BitWriter::new(frame_words(&config));
        expected.push(encode_byte(0x00), 24);
        expected.push(encode_byte(0xff), 24);
        expected.push(encode_byte(0x00), 24);
        assert_eq!(frame.words(), &expected.words[..]);
        assert_eq!(frame.words()[0], 0b1001_0010_0100_1001_0010_0100_1101_1011);
    }

    #[test]
    fn reset_code_is_low() {
        let config = ChannelConfig::new(18, 2);
        let mut pixels = PixelBuffer::new(2);
        pixels.fill(0xffff_ffff);
        let frame = encode(&pixels, &config);
        let data_bits = 2 * 3 * BYTE_SYMBOL_BITS;
        let words = frame.words();
        assert_eq!(words.len(), frame_words(&config));
        // first reset bit onwards is all zero
        assert_eq!(words[data_bits / 32] << (data_bits % 32), 0);
        assert!(words[data_bits / 32 + 1..].iter().all(|w| *w == 0));
    }

    #[test]
    fn round_trip_modulo_brightness() {
        for strip_type in [
            StripType::Rgb,
            StripType::Grb,
            StripType::Bgr,
            StripType::Gbr,
            StripType::Grbw,
            StripType::Bgrw,
        ] {
            let config = ChannelConfig::new(18, 3)
                .with_strip_type(strip_type)
                .with_brightness(128);
            let mut pixels = PixelBuffer::new(3);
            pixels.copy_from(&[0x80ff_4020, 0x0000_00ff, 0]).unwrap();

            let frame = encode(&pixels, &config);
            let leds = decode(frame.words(), strip_type).unwrap();
            let mask = if strip_type.has_white() {
                0xffff_ffff
            } else {
                0x00ff_ffff
            };
            let expected: Vec<Color> = (0..3)
                .map(|i| pixels.scaled(i, 128).unwrap() & mask)
                .collect();
            assert_eq!(leds, expected, "{strip_type:?}");
        }
    }

    #[test]
    fn buffer_longer_than_config() {
        let config = ChannelConfig::new(18, 1);
        let mut pixels = PixelBuffer::new(8);
        pixels.set(7, 0x0000_ff00).unwrap();
        let frame = encode(&pixels, &config);

        assert_eq!(
            frame.words().len(),
            frame_bits(8, StripType::Grb, config.frequency).div_ceil(32)
        );
        let leds = decode(frame.words(), StripType::Grb).unwrap();
        assert_eq!(leds.len(), 8);
        assert_eq!(leds[7], 0x0000_ff00);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert_eq!(
            decode(&[0xffff_ffff, 0], StripType::Rgb),
            Err(DecodeError::InvalidSymbol { bit: 0 })
        );
        // a pixel cut short by low bits
        assert_eq!(
            decode(&[0b110 << 29], StripType::Rgb),
            Err(DecodeError::InvalidSymbol { bit: 3 })
        );
    }
}
