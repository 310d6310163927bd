//! WS2811/WS2812 LED strip driver for the Raspberry Pi PWM block.
//!
//! Pixels are encoded into a PWM bitstream and streamed out by DMA, so the
//! CPU is free while a frame is on the wire. [`Strip`] is the single-channel
//! handle; [`StripController`] drives both PWM channels.

pub mod board;
pub mod buffer;
pub mod color;
pub mod config;
pub mod controller;
pub mod dma;
pub mod error;
pub mod pixels;
pub mod regs;
pub mod strip;
pub mod transport;
pub mod ws2812;

pub use color::Color;
pub use config::{ChannelConfig, DeviceConfig, StripType};
pub use controller::StripController;
pub use error::{ConfigError, Error, ResourceKind, Result, TransmissionFault};
pub use strip::Strip;
