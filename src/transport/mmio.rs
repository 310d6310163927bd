use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;

use memmap2::{MmapMut, MmapOptions};

use crate::dma::PAGE_SIZE;
use crate::error::{Error, ResourceKind, Result};

const DEV_MEM: &str = "/dev/mem";

pub fn open_dev_mem() -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_SYNC)
        .open(DEV_MEM)
        .map_err(|e| ResourceKind::MapRegisters.with_io(e))
}

/// A block of peripheral registers mapped from `/dev/mem`.
pub struct RegisterWindow {
    map: MmapMut,
    /// Offset of the first register inside the mapping.
    start: usize,
    len: usize,
}

impl RegisterWindow {
    /// Maps `len` bytes of registers at physical address `phys`.
    pub fn map(dev_mem: &File, phys: u32, len: usize) -> Result<Self> {
        let page = phys as usize & !(PAGE_SIZE - 1);
        let start = phys as usize - page;
        // SAFETY: device registers are only accessed through volatile reads
        // and writes inside `len`.
        let map = unsafe {
            MmapOptions::new()
                .offset(page as u64)
                .len(start + len)
                .map_mut(dev_mem)
        }
        .map_err(|e| ResourceKind::MapRegisters.with_io(e))?;
        Ok(Self { map, start, len })
    }

    fn index(&self, offset: u32) -> Result<usize> {
        let offset = offset as usize;
        if offset % 4 != 0 || offset + 4 > self.len {
            return Err(Error::resource(ResourceKind::MapRegisters));
        }
        Ok(self.start + offset)
    }

    pub fn read(&self, offset: u32) -> Result<u32> {
        let index = self.index(offset)?;
        // SAFETY: `index` is an aligned register inside the mapping.
        Ok(unsafe { (self.map.as_ptr().add(index) as *const u32).read_volatile() })
    }

    pub fn write(&mut self, offset: u32, value: u32) -> Result<()> {
        let index = self.index(offset)?;
        // SAFETY: `index` is an aligned register inside the mapping.
        unsafe { (self.map.as_mut_ptr().add(index) as *mut u32).write_volatile(value) };
        Ok(())
    }

    /// Read-modify-write of the bits in `mask`.
    pub fn modify(&mut self, offset: u32, mask: u32, value: u32) -> Result<()> {
        let old = self.read(offset)?;
        self.write(offset, (old & !mask) | (value & mask))
    }
}
