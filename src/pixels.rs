use crate::color::{self, Color, BLACK};
use crate::error::{Error, Result};

/// LED colors of one channel, indexed by physical position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    leds: Vec<Color>,
}

impl PixelBuffer {
    pub fn new(len: usize) -> Self {
        Self {
            leds: vec![BLACK; len],
        }
    }

    pub fn len(&self) -> usize {
        self.leds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leds.is_empty()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.leds.len() {
            Err(Error::Index {
                index,
                len: self.leds.len(),
            })
        } else {
            Ok(())
        }
    }

    pub fn get(&self, index: usize) -> Result<Color> {
        self.check_index(index)?;
        Ok(self.leds[index])
    }

    pub fn set(&mut self, index: usize, color: Color) -> Result<()> {
        self.check_index(index)?;
        self.leds[index] = color;
        Ok(())
    }

    /// Replaces every LED. Leaves the buffer untouched on a length mismatch.
    pub fn copy_from(&mut self, colors: &[Color]) -> Result<()> {
        if colors.len() != self.leds.len() {
            return Err(Error::LengthMismatch {
                expected: self.leds.len(),
                actual: colors.len(),
            });
        }
        self.leds.copy_from_slice(colors);
        Ok(())
    }

    pub fn fill(&mut self, color: Color) {
        self.leds.fill(color);
    }

    /// The color as it goes out on the wire, every component scaled.
    pub fn scaled(&self, index: usize, brightness: u8) -> Result<Color> {
        let (r, g, b, w) = color::unpack(self.get(index)?);
        Ok(color::pack_rgbw(
            color::scale(r, brightness),
            color::scale(g, brightness),
            color::scale(b, brightness),
            color::scale(w, brightness),
        ))
    }

    pub fn as_slice(&self) -> &[Color] {
        &self.leds
    }
}
