use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::color::{Color, BLACK};
use crate::config::{self, ChannelConfig, DeviceConfig, MAX_CHANNELS};
use crate::error::{ConfigError, Error, Result, TransmissionFault};
use crate::pixels::PixelBuffer;
use crate::transport::{Completion, Peripheral, Transport, TransportLayout};
use crate::ws2812::{self, EncodedFrame};

const POLL_INTERVAL: Duration = Duration::from_micros(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Rendering,
}

struct Channel {
    config: ChannelConfig,
    pixels: PixelBuffer,
}

/// Drives up to two LED channels through one claimed PWM/DMA transport.
///
/// Constructing the controller claims the hardware; [`fini`](Self::fini) or
/// dropping it releases it.
pub struct StripController<T: Transport> {
    channels: heapless::Vec<Channel, MAX_CHANNELS>,
    device: DeviceConfig,
    transport: Option<T>,
    phase: Phase,
}

impl<T: Transport> StripController<T> {
    pub fn init<P>(peripheral: &P, device: DeviceConfig, channels: &[ChannelConfig]) -> Result<Self>
    where
        P: Peripheral<Transport = T>,
    {
        let frequency = config::validate(&device, channels)?;
        let layout = TransportLayout::new(device.dma_channel, frequency, channels)?;
        let transport = peripheral.claim(&layout)?;

        let mut owned = heapless::Vec::new();
        for config in channels {
            owned
                .push(Channel {
                    config: *config,
                    pixels: PixelBuffer::new(config.pixel_count),
                })
                .map_err(|_| ConfigError::TooManyChannels)?;
        }

        info!(
            "initialized {} channel(s) at {} Hz on DMA {}, {} bytes of DMA memory",
            owned.len(),
            frequency.to_Hz(),
            device.dma_channel,
            layout.arena.size()
        );
        for (i, c) in owned.iter().enumerate() {
            info!(
                "  channel {i}: GPIO {}, {} LEDs, {:?}, brightness {}{}",
                c.config.gpio_pin,
                c.config.pixel_count,
                c.config.strip_type,
                c.config.brightness,
                if c.config.invert { ", inverted" } else { "" }
            );
        }

        Ok(Self {
            channels: owned,
            device,
            transport: Some(transport),
            phase: Phase::Idle,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel_config(&self, channel: usize) -> Result<&ChannelConfig> {
        Ok(&self.channel(channel)?.config)
    }

    pub fn pixels(&self, channel: usize) -> Result<&[Color]> {
        Ok(self.channel(channel)?.pixels.as_slice())
    }

    fn channel(&self, channel: usize) -> Result<&Channel> {
        self.channels
            .get(channel)
            .ok_or(ConfigError::NoSuchChannel { channel }.into())
    }

    fn channel_mut(&mut self, channel: usize) -> Result<&mut Channel> {
        self.channels
            .get_mut(channel)
            .ok_or(ConfigError::NoSuchChannel { channel }.into())
    }

    pub fn set_pixel(&mut self, channel: usize, index: usize, color: Color) -> Result<()> {
        self.channel_mut(channel)?.pixels.set(index, color)
    }

    pub fn pixel(&self, channel: usize, index: usize) -> Result<Color> {
        self.channel(channel)?.pixels.get(index)
    }

    /// Replaces every pixel of `channel`. The buffer is left untouched if
    /// `colors` has the wrong length.
    pub fn set_bitmap(&mut self, channel: usize, colors: &[Color]) -> Result<()> {
        self.channel_mut(channel)?.pixels.copy_from(colors)
    }

    /// Blacks out `channel` and renders.
    pub fn clear(&mut self, channel: usize) -> Result<()> {
        self.channel_mut(channel)?.pixels.fill(BLACK);
        self.render()
    }

    /// Encodes every channel and starts the transfer. Returns once the frame
    /// is queued; call [`wait`](Self::wait) before the next render.
    pub fn render(&mut self) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(Error::NotInitialized)?;

        if self.phase == Phase::Rendering {
            match transport.poll_completion() {
                Ok(Completion::Pending) => return Err(TransmissionFault::FrameInFlight.into()),
                Ok(Completion::Done) => self.phase = Phase::Idle,
                Err(e) => {
                    self.phase = Phase::Idle;
                    return Err(e);
                }
            }
        }

        let frames: heapless::Vec<EncodedFrame, MAX_CHANNELS> = self
            .channels
            .iter()
            .map(|c| ws2812::encode(&c.pixels, &c.config))
            .collect();
        transport.arm(&frames)?;
        self.phase = Phase::Rendering;

        debug!(
            "armed frame: {:?} words",
            frames.iter().map(|f| f.words().len()).collect::<heapless::Vec<_, MAX_CHANNELS>>()
        );
        Ok(())
    }

    /// Blocks until the frame in flight has been sent, or the wait timeout
    /// passes.
    pub fn wait(&mut self) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(Error::NotInitialized)?;
        if self.phase == Phase::Idle {
            return Ok(());
        }

        let result = wait_for(transport, self.device.wait_timeout);
        if !matches!(result, Err(Error::Timeout { .. })) {
            self.phase = Phase::Idle;
        }
        result
    }

    /// Waits for the frame in flight, stops the output and releases the
    /// hardware. Safe to call more than once.
    pub fn fini(&mut self) {
        let Some(mut transport) = self.transport.take() else {
            return;
        };

        if self.phase == Phase::Rendering {
            if let Err(e) = wait_for(&mut transport, self.device.wait_timeout) {
                warn!("last frame did not complete: {e}");
            }
            self.phase = Phase::Idle;
        }
        transport.shutdown();
        drop(transport);
        info!("released PWM/DMA");
    }
}

impl<T: Transport> Drop for StripController<T> {
    fn drop(&mut self) {
        self.fini();
    }
}

fn wait_for<T: Transport>(transport: &mut T, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    loop {
        if transport.poll_completion()? == Completion::Done {
            return Ok(());
        }
        let waited = start.elapsed();
        if waited >= timeout {
            return Err(Error::Timeout { waited });
        }
        thread::sleep(POLL_INTERVAL);
    }
}
