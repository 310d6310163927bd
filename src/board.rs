//! Raspberry Pi board detection from the device tree.

use byteorder::{BigEndian, ByteOrder};
use fugit::HertzU32;
use log::debug;

use crate::error::{Error, ResourceKind, Result};

const COMPATIBLE_PATH: &str = "/proc/device-tree/compatible";
const RANGES_PATH: &str = "/proc/device-tree/soc/ranges";

const OSC_FREQ: HertzU32 = HertzU32::from_raw(19_200_000);
const OSC_FREQ_2711: HertzU32 = HertzU32::from_raw(54_000_000);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Soc {
    Bcm2835,
    Bcm2836,
    Bcm2837,
    Bcm2711,
}

impl Soc {
    const fn default_peripheral_base(self) -> u32 {
        match self {
            Soc::Bcm2835 => 0x2000_0000,
            Soc::Bcm2836 | Soc::Bcm2837 => 0x3f00_0000,
            Soc::Bcm2711 => 0xfe00_0000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoardInfo {
    pub soc: Soc,
    /// CPU physical address of the peripheral block.
    pub peripheral_base: u32,
    /// Bus alias the VideoCore uses for uncached SDRAM.
    pub sdram_alias: u32,
    pub oscillator: HertzU32,
}

impl BoardInfo {
    pub fn detect() -> Result<Self> {
        let compatible = std::fs::read(COMPATIBLE_PATH)
            .map_err(|e| ResourceKind::HwDetect.with_io(e))?;
        let ranges = std::fs::read(RANGES_PATH).ok();
        let info = Self::from_device_tree(&compatible, ranges.as_deref())?;
        debug!("detected {info:?}");
        Ok(info)
    }

    /// `compatible` is the NUL separated compatible list of the root node,
    /// `ranges` the raw `soc/ranges` property.
    pub fn from_device_tree(compatible: &[u8], ranges: Option<&[u8]>) -> Result<Self> {
        let soc = compatible
            .split(|b| *b == 0)
            .find_map(soc_from_compatible)
            .ok_or(Error::resource(ResourceKind::HwDetect))?;

        let peripheral_base = ranges
            .and_then(peripheral_base_from_ranges)
            .unwrap_or(soc.default_peripheral_base());

        let (sdram_alias, oscillator) = match soc {
            Soc::Bcm2835 => (0x4000_0000, OSC_FREQ),
            Soc::Bcm2836 | Soc::Bcm2837 => (0xc000_0000, OSC_FREQ),
            Soc::Bcm2711 => (0xc000_0000, OSC_FREQ_2711),
        };

        Ok(Self {
            soc,
            peripheral_base,
            sdram_alias,
            oscillator,
        })
    }

    /// VideoCore mailbox allocation flags for the DMA arena.
    pub const fn mem_flags(&self) -> u32 {
        if self.sdram_alias == 0x4000_0000 {
            0xc
        } else {
            0x4
        }
    }

    /// Integer clock divisor giving three PWM bits per WS2812 bit.
    pub fn clock_divisor(&self, frequency: HertzU32) -> Result<u32> {
        let rate = frequency.to_Hz().saturating_mul(3);
        if rate == 0 {
            return Err(Error::resource(ResourceKind::SetupPwm));
        }
        match self.oscillator.to_Hz() / rate {
            divi @ 1..=4095 => Ok(divi),
            _ => Err(Error::resource(ResourceKind::SetupPwm)),
        }
    }
}

/// Strips the VideoCore cache alias from a bus address.
pub const fn bus_to_phys(addr: u32) -> u32 {
    addr & !0xc000_0000
}

fn soc_from_compatible(entry: &[u8]) -> Option<Soc> {
    match entry {
        b"brcm,bcm2835" | b"brcm,bcm2708" => Some(Soc::Bcm2835),
        b"brcm,bcm2836" | b"brcm,bcm2709" => Some(Soc::Bcm2836),
        b"brcm,bcm2837" | b"brcm,bcm2710" => Some(Soc::Bcm2837),
        b"brcm,bcm2711" => Some(Soc::Bcm2711),
        _ => None,
    }
}

/// The first range maps the bus address at offset 0 to the CPU address at
/// offset 4. Boards with 64-bit parent addresses put the low word at offset 8.
fn peripheral_base_from_ranges(ranges: &[u8]) -> Option<u32> {
    let base = BigEndian::read_u32(ranges.get(4..8)?);
    match base {
        0 => Some(BigEndian::read_u32(ranges.get(8..12)?)),
        u32::MAX => None,
        base => Some(base),
    }
}
