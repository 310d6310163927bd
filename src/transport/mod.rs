use fugit::HertzU32;

use crate::config::{self, AltFunction, ChannelConfig, MAX_CHANNELS};
use crate::dma::ArenaLayout;
use crate::error::{ConfigError, Result};
use crate::ws2812::{self, EncodedFrame};

#[cfg(target_os = "linux")]
mod hardware;
#[cfg(target_os = "linux")]
mod mailbox;
#[cfg(target_os = "linux")]
mod mmio;
mod simulated;

#[cfg(target_os = "linux")]
pub use hardware::{Bcm283x, Bcm283xTransport};
pub use simulated::{SimulatedPeripheral, SimulatedTransport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    Pending,
    Done,
}

/// Per-channel wiring the transport needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lane {
    pub gpio_pin: u8,
    /// PWM channel the pin is wired to, which is also its DMA lane.
    pub pwm: usize,
    pub alt: AltFunction,
    pub invert: bool,
}

/// Everything a transport sizes and programs at claim time.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportLayout {
    pub dma_channel: u8,
    pub frequency: HertzU32,
    pub lanes: heapless::Vec<Lane, MAX_CHANNELS>,
    pub arena: ArenaLayout,
}

impl TransportLayout {
    /// Routes each channel to the PWM channel of its pin and sizes the arena
    /// for the longest one.
    pub fn new(
        dma_channel: u8,
        frequency: HertzU32,
        channels: &[ChannelConfig],
    ) -> core::result::Result<Self, ConfigError> {
        let mut lanes = heapless::Vec::new();
        for (channel, c) in channels.iter().enumerate() {
            let (pwm, alt) = config::pwm_pin(c.gpio_pin).ok_or(ConfigError::UnsupportedPin {
                channel,
                pin: c.gpio_pin,
            })?;
            lanes
                .push(Lane {
                    gpio_pin: c.gpio_pin,
                    pwm,
                    alt,
                    invert: c.invert,
                })
                .map_err(|_| ConfigError::TooManyChannels)?;
        }
        let words = channels.iter().map(ws2812::frame_words).max().unwrap_or(0);
        Ok(Self {
            dma_channel,
            frequency,
            lanes,
            arena: ArenaLayout::new(words),
        })
    }

    /// Pairs frames, given in channel order, with their DMA lane.
    pub fn lane_frames<'a>(
        &'a self,
        frames: &'a [EncodedFrame],
    ) -> impl Iterator<Item = (usize, &'a EncodedFrame)> + 'a {
        self.lanes.iter().map(|lane| lane.pwm).zip(frames)
    }
}

/// Something that can hand out the PWM/DMA hardware, once at a time.
pub trait Peripheral {
    type Transport: Transport;

    /// Claims the hardware and programs it for `layout`. Fails with
    /// `HardwareBusy` while another claim is alive.
    fn claim(&self, layout: &TransportLayout) -> Result<Self::Transport>;
}

/// A claimed PWM/DMA engine. Dropping it releases the claim.
pub trait Transport {
    /// Loads the frames, one per channel in configuration order, into DMA
    /// memory and starts the transfer. The previous transfer must have
    /// completed.
    fn arm(&mut self, frames: &[EncodedFrame]) -> Result<()>;

    fn poll_completion(&mut self) -> Result<Completion>;

    /// Stops the output.
    fn shutdown(&mut self);
}
