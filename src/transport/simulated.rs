//! A software stand-in for the PWM/DMA block. It walks the control-block
//! chain the same way the DMA engine does and records what reached the PWM
//! FIFO, so rendering can be checked without hardware.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::debug;

use super::{Completion, Peripheral, Transport, TransportLayout};
use crate::color::Color;
use crate::config::StripType;
use crate::dma::{self, DmaArena, LANES};
use crate::error::{Error, ResourceKind, Result, TransmissionFault};
use crate::regs;
use crate::ws2812::{self, DecodeError, EncodedFrame};

/// Where the simulated arena sits on the bus.
const SIM_BUS_BASE: u32 = 0xc800_0000;
/// Runaway guard for chains that loop back on themselves.
const MAX_CHAIN_STEPS: usize = 64;

#[derive(Default)]
struct SimState {
    claimed: bool,
    claims: usize,
    transfer_time: Option<Duration>,
    stalled: bool,
    fail_claim: Option<ResourceKind>,
    fail_transfer: Option<u32>,
    layout: Option<TransportLayout>,
    lanes: [Vec<u32>; LANES],
    frames_sent: usize,
    enabled: bool,
}

/// Cloneable handle on one simulated peripheral; clones share state.
#[derive(Clone, Default)]
pub struct SimulatedPeripheral {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedPeripheral {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed wire time per frame instead of the one derived from its length.
    pub fn with_transfer_time(self, transfer_time: Duration) -> Self {
        self.lock().transfer_time = Some(transfer_time);
        self
    }

    /// Transfers never complete.
    pub fn stalled(self) -> Self {
        self.lock().stalled = true;
        self
    }

    /// The next claim fails at `kind`.
    pub fn fail_next_claim(&self, kind: ResourceKind) {
        self.lock().fail_claim = Some(kind);
    }

    /// The next transfer to finish reports a DMA error with `debug` as the
    /// DEBUG register value, and delivers nothing.
    pub fn fail_next_transfer(&self, debug: u32) {
        self.lock().fail_transfer = Some(debug);
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_claimed(&self) -> bool {
        self.lock().claimed
    }

    /// Successful claims so far.
    pub fn claims(&self) -> usize {
        self.lock().claims
    }

    /// Whether the PWM output is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    pub fn frames_sent(&self) -> usize {
        self.lock().frames_sent
    }

    pub fn layout(&self) -> Option<TransportLayout> {
        self.lock().layout.clone()
    }

    /// PWM words of the last completed frame on PWM channel `lane`.
    pub fn lane_words(&self, lane: usize) -> Vec<u32> {
        self.lock().lanes.get(lane).cloned().unwrap_or_default()
    }

    /// LED colors of the last completed frame on PWM channel `lane`.
    pub fn decoded(
        &self,
        lane: usize,
        strip_type: StripType,
    ) -> core::result::Result<Vec<Color>, DecodeError> {
        ws2812::decode(&self.lane_words(lane), strip_type)
    }
}

impl Peripheral for SimulatedPeripheral {
    type Transport = SimulatedTransport;

    fn claim(&self, layout: &TransportLayout) -> Result<SimulatedTransport> {
        let mut state = self.lock();
        if state.claimed {
            return Err(Error::HardwareBusy);
        }
        if let Some(kind) = state.fail_claim.take() {
            return Err(Error::resource(kind));
        }

        let arena = DmaArena::new(vec![0u8; layout.arena.size()], SIM_BUS_BASE, layout.arena)?;
        state.claimed = true;
        state.claims += 1;
        state.enabled = true;
        state.layout = Some(layout.clone());
        state.lanes = Default::default();
        debug!(
            "simulated PWM claimed: {} lane(s), {} words per lane",
            layout.lanes.len(),
            layout.arena.words_per_lane
        );

        Ok(SimulatedTransport {
            shared: Arc::clone(&self.state),
            arena,
            symbol_rate: ws2812::symbol_rate(layout.frequency),
            layout: layout.clone(),
            in_flight: None,
        })
    }
}

pub struct SimulatedTransport {
    shared: Arc<Mutex<SimState>>,
    arena: DmaArena<Vec<u8>>,
    symbol_rate: u32,
    layout: TransportLayout,
    in_flight: Option<(Instant, Duration)>,
}

impl SimulatedTransport {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wire_time(&self) -> Duration {
        let bits = self.arena.layout().words_per_lane as u64 * 32;
        Duration::from_nanos(bits * 1_000_000_000 / self.symbol_rate as u64)
    }

    /// Runs the chain from the first control block, returning the words
    /// delivered to the PWM FIFO.
    fn run_chain(&mut self) -> Result<Vec<u32>> {
        let fifo = regs::pwm_fifo_bus_addr();
        let mut fifo_words = Vec::new();
        let mut next = self.arena.cb_bus_addr(dma::CbIndex(0));

        for _ in 0..MAX_CHAIN_STEPS {
            if next == 0 {
                return Ok(fifo_words);
            }
            let cb = self.arena.read_cb(next)?;
            let fault = TransmissionFault::Dma { debug: next };
            let source = self.arena.offset_of(cb.source_ad).ok_or(fault)?;
            let mut words = vec![0u32; cb.txfr_len as usize / 4];
            self.arena.read_words(source, &mut words)?;

            if cb.dest_ad == fifo {
                fifo_words.extend_from_slice(&words);
            } else {
                let dest = self.arena.offset_of(cb.dest_ad).ok_or(fault)?;
                self.arena.write_words(dest, &words)?;
            }
            next = cb.nextconbk;
        }

        Err(TransmissionFault::Dma { debug: next }.into())
    }
}

impl Transport for SimulatedTransport {
    fn arm(&mut self, frames: &[EncodedFrame]) -> Result<()> {
        if self.in_flight.is_some() {
            return Err(TransmissionFault::FrameInFlight.into());
        }
        let chain = dma::frame_chain(self.arena.layout(), regs::pwm_fifo_bus_addr());
        self.arena.load_frames(self.layout.lane_frames(frames))?;
        self.arena.write_chain(&chain)?;
        self.arena.mark_pending()?;

        let duration = self.lock().transfer_time.unwrap_or_else(|| self.wire_time());
        self.in_flight = Some((Instant::now(), duration));
        Ok(())
    }

    fn poll_completion(&mut self) -> Result<Completion> {
        let Some((started, duration)) = self.in_flight else {
            return Ok(Completion::Done);
        };
        if self.lock().stalled || started.elapsed() < duration {
            return Ok(Completion::Pending);
        }

        self.in_flight = None;
        if let Some(debug) = self.lock().fail_transfer.take() {
            debug!("simulated DMA fault, debug {debug:08x}");
            return Err(TransmissionFault::Dma { debug }.into());
        }
        let fifo_words = self.run_chain()?;
        if !self.arena.is_complete()? {
            return Err(TransmissionFault::Dma { debug: 0 }.into());
        }

        let mut state = self.lock();
        for (lane, words) in state.lanes.iter_mut().enumerate() {
            *words = fifo_words.iter().skip(lane).step_by(LANES).copied().collect();
        }
        state.frames_sent += 1;
        Ok(Completion::Done)
    }

    fn shutdown(&mut self) {
        self.in_flight = None;
        self.lock().enabled = false;
    }
}

impl Drop for SimulatedTransport {
    fn drop(&mut self) {
        let mut state = self.lock();
        state.claimed = false;
        state.enabled = false;
    }
}
