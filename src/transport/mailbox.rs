//! VideoCore property mailbox, used to get physically contiguous uncached
//! memory the DMA engine can read.

use std::fs::File;
use std::os::fd::AsRawFd;

use log::{debug, warn};
use memmap2::{MmapMut, MmapOptions};

use crate::board;
use crate::dma;
use crate::error::{Error, ResourceKind, Result};

const DEVICE: &str = "/dev/vcio";

const IOCTL_MBOX_PROPERTY: u32 =
    (3 << 30) | ((core::mem::size_of::<*mut libc::c_char>() as u32) << 16) | (100 << 8);

const RESPONSE_OK: u32 = 0x8000_0000;

#[derive(Clone, Copy, Debug)]
#[repr(u32)]
enum Tag {
    Alloc = 0x3000c,
    Lock = 0x3000d,
    Unlock = 0x3000e,
    Free = 0x3000f,
}

pub struct Mailbox {
    file: File,
}

impl Mailbox {
    pub fn open() -> Result<Self> {
        let file = File::open(DEVICE).map_err(|e| ResourceKind::MailboxOpen.with_io(e))?;
        Ok(Self { file })
    }

    /// Sends a single-tag property request and returns the first response word.
    fn property(&self, tag: Tag, args: &[u32]) -> Option<u32> {
        let mut msg = [0u32; 32];
        let valbuf = args.len().max(1) * 4;
        let total = 6 + args.len().max(1);
        msg[0] = (total * 4) as u32;
        msg[1] = 0;
        msg[2] = tag as u32;
        msg[3] = valbuf as u32;
        msg[4] = (args.len() * 4) as u32;
        msg[5..5 + args.len()].copy_from_slice(args);
        msg[total - 1] = 0;

        // SAFETY: the driver reads and writes at most msg[0] bytes of msg.
        let ret = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                IOCTL_MBOX_PROPERTY as _,
                msg.as_mut_ptr(),
            )
        };
        if ret < 0 {
            warn!(
                "mailbox {tag:?} failed: {}",
                std::io::Error::last_os_error()
            );
            return None;
        }
        (msg[1] == RESPONSE_OK).then_some(msg[5])
    }

    /// Allocates, locks and maps `size` bytes of VideoCore memory.
    pub fn alloc(self, size: usize, flags: u32) -> Result<VcMemory> {
        let handle = self
            .property(Tag::Alloc, &[size as u32, dma::PAGE_SIZE as u32, flags])
            .filter(|h| *h != 0)
            .ok_or(Error::resource(ResourceKind::MailboxAlloc))?;

        let mut mem = VcMemory {
            mailbox: self,
            handle,
            bus_addr: 0,
            map: None,
        };

        mem.bus_addr = mem
            .mailbox
            .property(Tag::Lock, &[handle])
            .filter(|a| *a != 0)
            .ok_or(Error::resource(ResourceKind::MailboxLock))?;

        let phys = board::bus_to_phys(mem.bus_addr);
        let dev_mem = super::mmio::open_dev_mem()?;
        // SAFETY: the region is locked VideoCore memory owned by this mapping.
        let map = unsafe {
            MmapOptions::new()
                .offset(phys as u64)
                .len(size)
                .map_mut(&dev_mem)
        }
        .map_err(|e| ResourceKind::MapMem.with_io(e))?;
        mem.map = Some(map);

        debug!(
            "mailbox memory: handle {handle}, bus {:08x}, {size} bytes",
            mem.bus_addr
        );
        Ok(mem)
    }
}

/// Locked VideoCore memory mapped into this process. Unmapped, unlocked and
/// freed on drop.
///
/// Writes through the mapping must be volatile or fenced before the DMA
/// engine is started.
pub struct VcMemory {
    mailbox: Mailbox,
    handle: u32,
    bus_addr: u32,
    map: Option<MmapMut>,
}

impl VcMemory {
    pub fn bus_addr(&self) -> u32 {
        self.bus_addr
    }
}

impl AsRef<[u8]> for VcMemory {
    fn as_ref(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }
}

impl AsMut<[u8]> for VcMemory {
    fn as_mut(&mut self) -> &mut [u8] {
        self.map.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for VcMemory {
    fn drop(&mut self) {
        self.map = None;
        if self.bus_addr != 0 && self.mailbox.property(Tag::Unlock, &[self.handle]).is_none() {
            warn!("failed to unlock mailbox memory {}", self.handle);
        }
        if self.mailbox.property(Tag::Free, &[self.handle]).is_none() {
            warn!("failed to free mailbox memory {}", self.handle);
        }
    }
}
