use core::marker::PhantomData;

use byteorder::ByteOrder;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Eof,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Eof => write!(f, "End of buffer reached"),
        }
    }
}

impl core::error::Error for Error {}

type Result<T> = core::result::Result<T, Error>;

pub struct ReadBuffer<'a, ENDIAN: ByteOrder> {
    data: &'a [u8],
    pos: usize,
    phantom: PhantomData<ENDIAN>,
}

impl<'a, ENDIAN: ByteOrder> ReadBuffer<'a, ENDIAN> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            phantom: PhantomData,
        }
    }

    /// Starts reading at `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> Result<Self> {
        let mut buf = Self::new(data);
        buf.ensure_space(pos)?;
        buf.pos = pos;
        Ok(buf)
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    fn ensure_space(&self, n_bytes: usize) -> Result<()> {
        if (self.pos + n_bytes) > self.data.len() {
            Err(Error::Eof)
        } else {
            Ok(())
        }
    }

    pub fn take(&mut self, n_bytes: usize) -> Result<&'a [u8]> {
        self.ensure_space(n_bytes)?;
        let data = &self.data[self.pos..(self.pos + n_bytes)];
        self.pos += n_bytes;
        Ok(data)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let data = self.take(4)?;
        Ok(ENDIAN::read_u32(data))
    }

    pub fn read_words(&mut self, words: &mut [u32]) -> Result<()> {
        let data = self.take(words.len() * 4)?;
        ENDIAN::read_u32_into(data, words);
        Ok(())
    }
}

pub struct MutBuffer<'a, ENDIAN: ByteOrder> {
    data: &'a mut [u8],
    pos: usize,
    phantom: PhantomData<ENDIAN>,
}

impl<'a, ENDIAN: ByteOrder> MutBuffer<'a, ENDIAN> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self {
            data,
            pos: 0,
            phantom: PhantomData,
        }
    }

    /// Starts writing at `pos`.
    pub fn at(data: &'a mut [u8], pos: usize) -> Result<Self> {
        let mut buf = Self::new(data);
        buf.ensure_space(pos)?;
        buf.pos = pos;
        Ok(buf)
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    fn ensure_space(&self, n_bytes: usize) -> Result<()> {
        if (self.pos + n_bytes) > self.data.len() {
            Err(Error::Eof)
        } else {
            Ok(())
        }
    }

    pub fn take_mut(&mut self, n_bytes: usize) -> Result<&mut [u8]> {
        self.ensure_space(n_bytes)?;
        let data = &mut self.data[self.pos..(self.pos + n_bytes)];
        self.pos += n_bytes;
        Ok(data)
    }

    pub fn write_u32(&mut self, val: u32) -> Result<()> {
        let data = self.take_mut(4)?;
        ENDIAN::write_u32(data, val);
        Ok(())
    }

    pub fn write_words(&mut self, words: &[u32]) -> Result<()> {
        let data = self.take_mut(words.len() * 4)?;
        ENDIAN::write_u32_into(words, data);
        Ok(())
    }

    pub fn fill(&mut self, n_bytes: usize, val: u8) -> Result<()> {
        self.take_mut(n_bytes)?.fill(val);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use byteorder::LittleEndian;

    use super::*;

    #[test]
    fn write_then_read_words() {
        let mut mem = [0u8; 16];
        let mut w = MutBuffer::<LittleEndian>::at(&mut mem, 4).unwrap();
        w.write_u32(0x0403_0201).unwrap();
        w.write_words(&[5, 6]).unwrap();
        assert_eq!(w.pos(), 16);
        assert_eq!(w.write_u32(7), Err(Error::Eof));
        assert_eq!(&mem[4..8], &[1, 2, 3, 4]);

        let mut r = ReadBuffer::<LittleEndian>::at(&mem, 8).unwrap();
        let mut words = [0u32; 2];
        r.read_words(&mut words).unwrap();
        assert_eq!(words, [5, 6]);
        assert_eq!(r.read_u32(), Err(Error::Eof));
    }

    #[test]
    fn at_past_end() {
        let mut mem = [0u8; 4];
        assert!(MutBuffer::<LittleEndian>::at(&mut mem, 5).is_err());
        assert!(ReadBuffer::<LittleEndian>::at(&mem, 4).is_ok());
    }

    #[test]
    fn fill_bytes() {
        let mut mem = [0xffu8; 6];
        MutBuffer::<LittleEndian>::at(&mut mem, 1)
            .unwrap()
            .fill(4, 0)
            .unwrap();
        assert_eq!(mem, [0xff, 0, 0, 0, 0, 0xff]);
    }
}
