//! BCM283x/BCM2711 register layouts for the DMA, PWM, clock manager and GPIO
//! blocks. Offsets are relative to the peripheral base.

use bitfield_struct::bitfield;

pub const DMA_OFFSET: u32 = 0x0000_7000;
pub const DMA_CHANNEL_STRIDE: u32 = 0x100;
pub const PWM_OFFSET: u32 = 0x0020_c000;
pub const GPIO_OFFSET: u32 = 0x0020_0000;
pub const CM_PWM_OFFSET: u32 = 0x0010_10a0;

/// Where the peripherals sit as seen from the DMA engine.
pub const PERIPHERAL_BUS_BASE: u32 = 0x7e00_0000;

pub const DMA_WINDOW_LEN: usize = 0x24;
pub const PWM_WINDOW_LEN: usize = 0x28;
pub const GPIO_WINDOW_LEN: usize = 0xb4;
pub const CM_WINDOW_LEN: usize = 0x08;

pub const CM_PASSWORD: u8 = 0x5a;
pub const CM_SRC_OSC: u8 = 1;
pub const DMA_PERMAP_PWM: u8 = 5;

pub const fn dma_channel_offset(channel: u8) -> u32 {
    DMA_OFFSET + channel as u32 * DMA_CHANNEL_STRIDE
}

pub const fn pwm_fifo_bus_addr() -> u32 {
    PERIPHERAL_BUS_BASE + PWM_OFFSET + PwmRegister::Fif1 as u32
}

#[derive(Clone, Copy, Debug)]
#[repr(u32)]
#[allow(unused)]
pub enum DmaRegister {
    Cs = 0x00,
    ConblkAd = 0x04,
    Ti = 0x08,
    SourceAd = 0x0c,
    DestAd = 0x10,
    TxfrLen = 0x14,
    Stride = 0x18,
    NextConbk = 0x1c,
    Debug = 0x20,
}

#[derive(Clone, Copy, Debug)]
#[repr(u32)]
#[allow(unused)]
pub enum PwmRegister {
    Ctl = 0x00,
    Sta = 0x04,
    Dmac = 0x08,
    Rng1 = 0x10,
    Dat1 = 0x14,
    Fif1 = 0x18,
    Rng2 = 0x20,
    Dat2 = 0x24,
}

#[derive(Clone, Copy, Debug)]
#[repr(u32)]
pub enum ClockRegister {
    Ctl = 0x00,
    Div = 0x04,
}

/// GPFSEL register holding the function select bits for `pin`, and the bit shift.
pub const fn gpio_fsel(pin: u8) -> (u32, u32) {
    ((pin as u32 / 10) * 4, (pin as u32 % 10) * 3)
}

#[bitfield(u32)]
pub struct DmaCs {
    pub active: bool,
    pub end: bool,
    pub int: bool,
    pub dreq: bool,
    pub paused: bool,
    pub dreq_stops_dma: bool,
    pub waiting_for_outstanding_writes: bool,
    _reserved0: bool,
    pub error: bool,
    #[bits(7)]
    _reserved1: u8,
    #[bits(4)]
    pub priority: u8,
    #[bits(4)]
    pub panic_priority: u8,
    #[bits(4)]
    _reserved2: u8,
    pub wait_for_outstanding_writes: bool,
    pub disdebug: bool,
    pub abort: bool,
    pub reset: bool,
}

#[bitfield(u32)]
pub struct DmaTi {
    pub inten: bool,
    pub tdmode: bool,
    _reserved0: bool,
    pub wait_resp: bool,
    pub dest_inc: bool,
    pub dest_width: bool,
    pub dest_dreq: bool,
    pub dest_ignore: bool,
    pub src_inc: bool,
    pub src_width: bool,
    pub src_dreq: bool,
    pub src_ignore: bool,
    #[bits(4)]
    pub burst_length: u8,
    #[bits(5)]
    pub permap: u8,
    #[bits(5)]
    pub waits: u8,
    pub no_wide_bursts: bool,
    #[bits(5)]
    _reserved1: u8,
}

#[bitfield(u32)]
pub struct PwmCtl {
    pub pwen1: bool,
    pub mode1: bool,
    pub rptl1: bool,
    pub sbit1: bool,
    pub pola1: bool,
    pub usef1: bool,
    pub clrf1: bool,
    pub msen1: bool,
    pub pwen2: bool,
    pub mode2: bool,
    pub rptl2: bool,
    pub sbit2: bool,
    pub pola2: bool,
    pub usef2: bool,
    _reserved0: bool,
    pub msen2: bool,
    #[bits(16)]
    _reserved1: u16,
}

#[bitfield(u32)]
pub struct PwmDmac {
    #[bits(8)]
    pub dreq: u8,
    #[bits(8)]
    pub panic: u8,
    #[bits(15)]
    _reserved: u16,
    pub enab: bool,
}

#[bitfield(u32)]
pub struct CmCtl {
    #[bits(4)]
    pub src: u8,
    pub enab: bool,
    pub kill: bool,
    _reserved0: bool,
    pub busy: bool,
    pub flip: bool,
    #[bits(2)]
    pub mash: u8,
    #[bits(13)]
    _reserved1: u16,
    #[bits(8)]
    pub passwd: u8,
}

#[bitfield(u32)]
pub struct CmDiv {
    #[bits(12)]
    pub divf: u16,
    #[bits(12)]
    pub divi: u16,
    #[bits(8)]
    pub passwd: u8,
}

/// Transfer info for the data control block: 32-bit words from memory into
/// the PWM FIFO, paced by the PWM DREQ.
pub fn pwm_fifo_ti() -> DmaTi {
    DmaTi::new()
        .with_no_wide_bursts(true)
        .with_wait_resp(true)
        .with_dest_dreq(true)
        .with_permap(DMA_PERMAP_PWM)
        .with_src_inc(true)
}

/// Transfer info for a plain memory to memory copy.
pub fn mem_copy_ti() -> DmaTi {
    DmaTi::new().with_wait_resp(true).with_src_inc(true).with_dest_inc(true)
}
