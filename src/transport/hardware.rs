//! PWM/DMA transport for the BCM283x family, driven through `/dev/mem` and
//! the VideoCore mailbox. Needs root.

use std::sync::atomic::{fence, AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use fugit::HertzU32;
use log::{debug, error, info, warn};

use super::mailbox::{Mailbox, VcMemory};
use super::mmio::{self, RegisterWindow};
use super::{Completion, Lane, Peripheral, Transport, TransportLayout};
use crate::board::BoardInfo;
use crate::config::MAX_CHANNELS;
use crate::dma::{self, CbIndex, DmaArena};
use crate::error::{Error, ResourceKind, Result, TransmissionFault};
use crate::regs::{
    self, ClockRegister, CmCtl, CmDiv, DmaCs, DmaRegister, PwmCtl, PwmDmac, PwmRegister,
    CM_PASSWORD, CM_SRC_OSC,
};
use crate::ws2812::EncodedFrame;

/// One PWM/DMA user per process.
static CLAIMED: AtomicBool = AtomicBool::new(false);

const PWM_RANGE: u32 = 32;
/// Upper bound on clock manager busy polls, one microsecond apart.
const CLOCK_BUSY_POLLS: usize = 10_000;
const DMA_DEBUG_CLEAR: u32 = 0x7;

struct ClaimGuard;

impl ClaimGuard {
    fn acquire() -> Result<Self> {
        CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::HardwareBusy)?;
        Ok(ClaimGuard)
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        CLAIMED.store(false, Ordering::Release);
    }
}

/// The PWM/DMA block of a Raspberry Pi up to the Pi 4.
#[derive(Clone, Copy, Debug, Default)]
pub struct Bcm283x {
    board: Option<BoardInfo>,
}

impl Bcm283x {
    /// Detects the board from the device tree at claim time.
    pub const fn new() -> Self {
        Self { board: None }
    }

    pub const fn with_board(board: BoardInfo) -> Self {
        Self { board: Some(board) }
    }
}

impl Peripheral for Bcm283x {
    type Transport = Bcm283xTransport;

    fn claim(&self, layout: &TransportLayout) -> Result<Bcm283xTransport> {
        let claim = ClaimGuard::acquire()?;
        let board = match self.board {
            Some(board) => board,
            None => BoardInfo::detect()?,
        };

        let dev_mem = mmio::open_dev_mem()?;
        let base = board.peripheral_base;
        let dma = RegisterWindow::map(
            &dev_mem,
            base + regs::dma_channel_offset(layout.dma_channel),
            regs::DMA_WINDOW_LEN,
        )?;
        let pwm = RegisterWindow::map(&dev_mem, base + regs::PWM_OFFSET, regs::PWM_WINDOW_LEN)?;
        let gpio = RegisterWindow::map(&dev_mem, base + regs::GPIO_OFFSET, regs::GPIO_WINDOW_LEN)?;
        let cm = RegisterWindow::map(&dev_mem, base + regs::CM_PWM_OFFSET, regs::CM_WINDOW_LEN)?;

        if DmaCs::from(dma.read(DmaRegister::Cs as u32)?).active() {
            warn!("DMA channel {} is already running", layout.dma_channel);
            return Err(Error::HardwareBusy);
        }

        let mem = Mailbox::open()?.alloc(layout.arena.size(), board.mem_flags())?;
        let bus_base = mem.bus_addr();
        let arena = DmaArena::new(mem, bus_base, layout.arena)?;

        let mut transport = Bcm283xTransport {
            board,
            frequency: layout.frequency,
            lanes: layout.lanes.clone(),
            dma,
            pwm,
            gpio,
            cm,
            arena,
            armed: false,
            _claim: claim,
        };
        transport.gpio_init()?;
        transport.setup_pwm()?;

        info!(
            "PWM/DMA claimed: {:?}, DMA {}, {} Hz, {} bytes of DMA memory at bus {:08x}",
            board.soc,
            layout.dma_channel,
            layout.frequency.to_Hz(),
            layout.arena.size(),
            bus_base
        );
        Ok(transport)
    }
}

pub struct Bcm283xTransport {
    board: BoardInfo,
    frequency: HertzU32,
    lanes: heapless::Vec<Lane, MAX_CHANNELS>,
    dma: RegisterWindow,
    pwm: RegisterWindow,
    gpio: RegisterWindow,
    cm: RegisterWindow,
    arena: DmaArena<VcMemory>,
    armed: bool,
    _claim: ClaimGuard,
}

impl Bcm283xTransport {
    fn dma_read(&self, reg: DmaRegister) -> Result<u32> {
        self.dma.read(reg as u32)
    }

    fn dma_write(&mut self, reg: DmaRegister, value: u32) -> Result<()> {
        self.dma.write(reg as u32, value)
    }

    fn pwm_write(&mut self, reg: PwmRegister, value: u32) -> Result<()> {
        self.pwm.write(reg as u32, value)
    }

    fn cm_write(&mut self, reg: ClockRegister, value: u32) -> Result<()> {
        self.cm.write(reg as u32, value)
    }

    fn gpio_init(&mut self) -> Result<()> {
        for lane in &self.lanes {
            let (reg, shift) = regs::gpio_fsel(lane.gpio_pin);
            self.gpio
                .modify(reg, 0b111 << shift, (lane.alt as u32) << shift)
                .map_err(|_| Error::resource(ResourceKind::GpioInit))?;
            debug!("GPIO {} -> PWM{} ({:?})", lane.gpio_pin, lane.pwm, lane.alt);
        }
        Ok(())
    }

    /// Waits for the clock manager busy bit to read `busy`.
    fn wait_clock(&self, busy: bool) -> Result<()> {
        for _ in 0..CLOCK_BUSY_POLLS {
            if CmCtl::from(self.cm.read(ClockRegister::Ctl as u32)?).busy() == busy {
                return Ok(());
            }
            thread::sleep(Duration::from_micros(1));
        }
        Err(Error::resource(ResourceKind::SetupPwm))
    }

    fn stop_pwm(&mut self) -> Result<()> {
        self.pwm_write(PwmRegister::Ctl, 0)?;
        thread::sleep(Duration::from_micros(10));

        let kill = CmCtl::new().with_passwd(CM_PASSWORD).with_kill(true);
        self.cm_write(ClockRegister::Ctl, kill.into())?;
        thread::sleep(Duration::from_micros(10));
        self.wait_clock(false)
    }

    fn setup_pwm(&mut self) -> Result<()> {
        self.stop_pwm()?;

        let divi = self.board.clock_divisor(self.frequency)?;
        let div = CmDiv::new().with_passwd(CM_PASSWORD).with_divi(divi as u16);
        self.cm_write(ClockRegister::Div, div.into())?;
        let ctl = CmCtl::new().with_passwd(CM_PASSWORD).with_src(CM_SRC_OSC);
        self.cm_write(ClockRegister::Ctl, ctl.into())?;
        self.cm_write(ClockRegister::Ctl, ctl.with_enab(true).into())?;
        thread::sleep(Duration::from_micros(10));
        self.wait_clock(true)?;
        debug!(
            "PWM clock {} Hz / {divi}",
            self.board.oscillator.to_Hz()
        );

        self.pwm_write(PwmRegister::Rng1, PWM_RANGE)?;
        thread::sleep(Duration::from_micros(10));
        self.pwm_write(PwmRegister::Rng2, PWM_RANGE)?;
        thread::sleep(Duration::from_micros(10));
        self.pwm_write(PwmRegister::Ctl, PwmCtl::new().with_clrf1(true).into())?;
        thread::sleep(Duration::from_micros(10));
        let dmac = PwmDmac::new().with_enab(true).with_panic(7).with_dreq(3);
        self.pwm_write(PwmRegister::Dmac, dmac.into())?;
        thread::sleep(Duration::from_micros(10));

        let invert = |pwm: usize| self.lanes.iter().any(|l| l.pwm == pwm && l.invert);
        let ctl = PwmCtl::new()
            .with_usef1(true)
            .with_mode1(true)
            .with_pola1(invert(0))
            .with_usef2(true)
            .with_mode2(true)
            .with_pola2(invert(1));
        self.pwm_write(PwmRegister::Ctl, ctl.into())?;
        thread::sleep(Duration::from_micros(10));
        self.pwm_write(PwmRegister::Ctl, ctl.with_pwen1(true).with_pwen2(true).into())
    }

    fn dma_start(&mut self) -> Result<()> {
        let first = self.arena.cb_bus_addr(CbIndex(0));
        self.dma_write(DmaRegister::Cs, DmaCs::new().with_reset(true).into())?;
        thread::sleep(Duration::from_micros(10));
        self.dma_write(DmaRegister::Cs, DmaCs::new().with_int(true).with_end(true).into())?;
        thread::sleep(Duration::from_micros(10));
        self.dma_write(DmaRegister::ConblkAd, first)?;
        self.dma_write(DmaRegister::Debug, DMA_DEBUG_CLEAR)?;
        let cs = DmaCs::new()
            .with_wait_for_outstanding_writes(true)
            .with_panic_priority(15)
            .with_priority(15)
            .with_active(true);
        self.dma_write(DmaRegister::Cs, cs.into())
    }

    fn dma_fault(&self) -> Error {
        let debug = self.dma_read(DmaRegister::Debug).unwrap_or(0);
        error!("DMA error, debug {debug:08x}");
        TransmissionFault::Dma { debug }.into()
    }
}

impl Transport for Bcm283xTransport {
    fn arm(&mut self, frames: &[EncodedFrame]) -> Result<()> {
        if DmaCs::from(self.dma_read(DmaRegister::Cs)?).active() {
            return Err(TransmissionFault::FrameInFlight.into());
        }

        let chain = dma::frame_chain(self.arena.layout(), regs::pwm_fifo_bus_addr());
        self.arena.write_chain(&chain)?;
        let lanes = self.lanes.iter().map(|lane| lane.pwm);
        self.arena.load_frames(lanes.zip(frames))?;
        self.arena.mark_pending()?;
        fence(Ordering::SeqCst);

        self.dma_start()?;
        self.armed = true;
        Ok(())
    }

    fn poll_completion(&mut self) -> Result<Completion> {
        let cs = DmaCs::from(self.dma_read(DmaRegister::Cs)?);
        if cs.error() {
            self.armed = false;
            return Err(self.dma_fault());
        }
        if cs.active() {
            return Ok(Completion::Pending);
        }
        if !self.armed {
            return Ok(Completion::Done);
        }

        self.armed = false;
        fence(Ordering::SeqCst);
        if self.arena.is_complete()? {
            Ok(Completion::Done)
        } else {
            Err(self.dma_fault())
        }
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.stop_pwm() {
            warn!("PWM stop: {e}");
        }
        if let Err(e) = self.dma_write(DmaRegister::Cs, DmaCs::new().with_reset(true).into()) {
            warn!("DMA reset: {e}");
        }
        self.armed = false;
        thread::sleep(Duration::from_micros(10));
        debug!("PWM/DMA stopped");
    }
}

impl Drop for Bcm283xTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}
