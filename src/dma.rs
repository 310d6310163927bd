//! DMA arena layout and control-block chains.
//!
//! The arena is one physically contiguous, uncached region shared with the
//! DMA engine:
//!
//! ```text
//! 0x000  control blocks, 32 bytes each
//! 0x080  completion flag word
//! 0x084  zero word copied over the flag by the terminal block
//! 0x100  PWM words, channel 0 and 1 interleaved
//! ```
//!
//! Control blocks reference each other by index; bus addresses only appear
//! when a chain is written into the arena.

use byteorder::LittleEndian;

use crate::buffer::{MutBuffer, ReadBuffer};
use crate::error::{Error, ResourceKind, Result};
use crate::regs;
use crate::ws2812::EncodedFrame;

pub const PAGE_SIZE: usize = 4096;
pub const CB_SIZE: usize = 32;
pub const MAX_CONTROL_BLOCKS: usize = 4;
/// The PWM FIFO alternates between its two channels word by word.
pub const LANES: usize = 2;

const FLAG_OFFSET: usize = MAX_CONTROL_BLOCKS * CB_SIZE;
const CLEAR_WORD_OFFSET: usize = FLAG_OFFSET + 4;
const DATA_OFFSET: usize = 0x100;

pub const FLAG_PENDING: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CbIndex(pub usize);

/// A DMA source or destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Address {
    /// Byte offset into the arena.
    Arena(usize),
    /// Fixed bus address, such as a peripheral FIFO.
    Bus(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlBlock {
    pub ti: u32,
    pub source: Address,
    pub dest: Address,
    pub len: u32,
    pub next: Option<CbIndex>,
}

/// A control block as the DMA engine sees it in memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawControlBlock {
    pub ti: u32,
    pub source_ad: u32,
    pub dest_ad: u32,
    pub txfr_len: u32,
    pub stride: u32,
    pub nextconbk: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaLayout {
    pub words_per_lane: usize,
}

impl ArenaLayout {
    pub const fn new(words_per_lane: usize) -> Self {
        Self { words_per_lane }
    }

    pub const fn data_offset(&self) -> usize {
        DATA_OFFSET
    }

    pub const fn data_len(&self) -> usize {
        self.words_per_lane * LANES * 4
    }

    /// Whole pages, which also keeps the first control block 256-byte aligned.
    pub const fn size(&self) -> usize {
        (DATA_OFFSET + self.data_len()).next_multiple_of(PAGE_SIZE)
    }
}

/// The chain for one frame: stream the data region into the PWM FIFO, then
/// clear the completion flag.
pub fn frame_chain(layout: &ArenaLayout, fifo_bus_addr: u32) -> [ControlBlock; 2] {
    [
        ControlBlock {
            ti: regs::pwm_fifo_ti().into(),
            source: Address::Arena(layout.data_offset()),
            dest: Address::Bus(fifo_bus_addr),
            len: layout.data_len() as u32,
            next: Some(CbIndex(1)),
        },
        ControlBlock {
            ti: regs::mem_copy_ti().into(),
            source: Address::Arena(CLEAR_WORD_OFFSET),
            dest: Address::Arena(FLAG_OFFSET),
            len: 4,
            next: None,
        },
    ]
}

pub struct DmaArena<T> {
    mem: T,
    bus_base: u32,
    layout: ArenaLayout,
}

impl<T> DmaArena<T>
where
    T: AsRef<[u8]> + AsMut<[u8]>,
{
    /// Takes over `mem`, which the DMA engine sees at `bus_base`.
    pub fn new(mut mem: T, bus_base: u32, layout: ArenaLayout) -> Result<Self> {
        if mem.as_ref().len() < layout.size() {
            return Err(Error::resource(ResourceKind::MapMem));
        }
        mem.as_mut()[..layout.size()].fill(0);
        Ok(Self {
            mem,
            bus_base,
            layout,
        })
    }

    pub fn layout(&self) -> &ArenaLayout {
        &self.layout
    }

    pub fn bus_addr(&self, offset: usize) -> u32 {
        self.bus_base + offset as u32
    }

    /// Arena offset of a bus address, if it falls inside the arena.
    pub fn offset_of(&self, bus_addr: u32) -> Option<usize> {
        let offset = bus_addr.checked_sub(self.bus_base)? as usize;
        (offset < self.layout.size()).then_some(offset)
    }

    pub fn cb_bus_addr(&self, index: CbIndex) -> u32 {
        self.bus_addr(index.0 * CB_SIZE)
    }

    fn resolve(&self, address: Address) -> u32 {
        match address {
            Address::Arena(offset) => self.bus_addr(offset),
            Address::Bus(bus) => bus,
        }
    }

    /// Copies each frame into its lane, zero-filling the rest of the data
    /// region. Lanes not named keep no data.
    pub fn load_frames<'a, I>(&mut self, frames: I) -> Result<()>
    where
        I: IntoIterator<Item = (usize, &'a EncodedFrame)>,
    {
        let words_per_lane = self.layout.words_per_lane;
        let mut interleaved = vec![0u32; words_per_lane * LANES];
        for (lane, frame) in frames {
            if lane >= LANES {
                return Err(Error::Index {
                    index: lane,
                    len: LANES,
                });
            }
            if frame.words().len() > words_per_lane {
                return Err(Error::LengthMismatch {
                    expected: words_per_lane,
                    actual: frame.words().len(),
                });
            }
            for (i, word) in frame.words().iter().enumerate() {
                interleaved[i * LANES + lane] = *word;
            }
        }

        let mut buf = MutBuffer::<LittleEndian>::at(self.mem.as_mut(), DATA_OFFSET)?;
        buf.write_words(&interleaved)?;
        Ok(())
    }

    pub fn write_chain(&mut self, chain: &[ControlBlock]) -> Result<()> {
        if chain.len() > MAX_CONTROL_BLOCKS {
            return Err(Error::LengthMismatch {
                expected: MAX_CONTROL_BLOCKS,
                actual: chain.len(),
            });
        }
        let raw: Vec<RawControlBlock> = chain
            .iter()
            .map(|cb| RawControlBlock {
                ti: cb.ti,
                source_ad: self.resolve(cb.source),
                dest_ad: self.resolve(cb.dest),
                txfr_len: cb.len,
                stride: 0,
                nextconbk: cb.next.map_or(0, |next| self.cb_bus_addr(next)),
            })
            .collect();

        let mut buf = MutBuffer::<LittleEndian>::new(self.mem.as_mut());
        for cb in raw {
            buf.write_u32(cb.ti)?;
            buf.write_u32(cb.source_ad)?;
            buf.write_u32(cb.dest_ad)?;
            buf.write_u32(cb.txfr_len)?;
            buf.write_u32(cb.stride)?;
            buf.write_u32(cb.nextconbk)?;
            buf.fill(8, 0)?;
        }
        Ok(())
    }

    pub fn read_cb(&self, bus_addr: u32) -> Result<RawControlBlock> {
        let offset = self
            .offset_of(bus_addr)
            .ok_or(Error::resource(ResourceKind::MapMem))?;
        let mut buf = ReadBuffer::<LittleEndian>::at(self.mem.as_ref(), offset)?;
        Ok(RawControlBlock {
            ti: buf.read_u32()?,
            source_ad: buf.read_u32()?,
            dest_ad: buf.read_u32()?,
            txfr_len: buf.read_u32()?,
            stride: buf.read_u32()?,
            nextconbk: buf.read_u32()?,
        })
    }

    pub fn read_words(&self, offset: usize, words: &mut [u32]) -> Result<()> {
        ReadBuffer::<LittleEndian>::at(self.mem.as_ref(), offset)?.read_words(words)?;
        Ok(())
    }

    pub fn write_words(&mut self, offset: usize, words: &[u32]) -> Result<()> {
        MutBuffer::<LittleEndian>::at(self.mem.as_mut(), offset)?.write_words(words)?;
        Ok(())
    }

    pub fn mark_pending(&mut self) -> Result<()> {
        self.write_words(CLEAR_WORD_OFFSET, &[0])?;
        self.write_words(FLAG_OFFSET, &[FLAG_PENDING])
    }

    pub fn is_complete(&self) -> Result<bool> {
        let mut flag = [0u32];
        self.read_words(FLAG_OFFSET, &mut flag)?;
        Ok(flag[0] == 0)
    }

    /// Lane `lane` of the data region, de-interleaved.
    pub fn lane_words(&self, lane: usize) -> Result<Vec<u32>> {
        let mut all = vec![0u32; self.layout.words_per_lane * LANES];
        self.read_words(DATA_OFFSET, &mut all)?;
        Ok(all.into_iter().skip(lane).step_by(LANES).collect())
    }
}
