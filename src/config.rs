use core::time::Duration;

use fugit::HertzU32;
use num_derive::{FromPrimitive, ToPrimitive};

use crate::error::ConfigError;

pub const MAX_CHANNELS: usize = 2;
pub const DEFAULT_FREQUENCY: HertzU32 = HertzU32::from_raw(800_000);
pub const DEFAULT_DMA_CHANNEL: u8 = 10;
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(1);

const MIN_FREQUENCY_HZ: u32 = 400_000;
const MAX_FREQUENCY_HZ: u32 = 800_000;

/// Color order on the wire. The value packs the source bit shift of each
/// transmitted byte: bits 24..32 for the fourth (white) byte, then the first,
/// second and third bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum StripType {
    Rgb = 0x0010_0800,
    Rbg = 0x0010_0008,
    #[default]
    Grb = 0x0008_1000,
    Gbr = 0x0008_0010,
    Brg = 0x0000_1008,
    Bgr = 0x0000_0810,
    Rgbw = 0x1810_0800,
    Rbgw = 0x1810_0008,
    Grbw = 0x1808_1000,
    Gbrw = 0x1808_0010,
    Brgw = 0x1800_1008,
    Bgrw = 0x1800_0810,
}

const WHITE_SHIFT_MASK: u32 = 0xf000_0000;

impl StripType {
    pub const WS2812: Self = Self::Grb;
    pub const SK6812: Self = Self::Grb;
    pub const SK6812W: Self = Self::Grbw;

    pub const fn has_white(self) -> bool {
        self as u32 & WHITE_SHIFT_MASK != 0
    }

    pub const fn bytes_per_pixel(self) -> usize {
        if self.has_white() {
            4
        } else {
            3
        }
    }

    /// Bit shifts into a packed color for each transmitted byte, in wire order.
    pub const fn shifts(self) -> [u32; 4] {
        let raw = self as u32;
        [
            (raw >> 16) & 0xff,
            (raw >> 8) & 0xff,
            raw & 0xff,
            (raw >> 24) & 0xff,
        ]
    }
}

/// Pins carrying PWM channel 0 and 1, with their GPIO alternate function.
const PWM_PINS: [&[(u8, AltFunction)]; MAX_CHANNELS] = [
    &[
        (12, AltFunction::Alt0),
        (18, AltFunction::Alt5),
        (40, AltFunction::Alt0),
        (52, AltFunction::Alt1),
    ],
    &[
        (13, AltFunction::Alt0),
        (19, AltFunction::Alt5),
        (41, AltFunction::Alt0),
        (45, AltFunction::Alt0),
        (53, AltFunction::Alt1),
    ],
];

/// GPFSEL encodings of the alternate functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AltFunction {
    Alt0 = 0b100,
    Alt1 = 0b101,
    Alt5 = 0b010,
}

/// PWM channel a pin is wired to, and the alternate function that routes it.
pub fn pwm_pin(pin: u8) -> Option<(usize, AltFunction)> {
    PWM_PINS.iter().enumerate().find_map(|(pwm, pins)| {
        pins.iter()
            .find(|(p, _)| *p == pin)
            .map(|(_, alt)| (pwm, *alt))
    })
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelConfig {
    pub gpio_pin: u8,
    pub pixel_count: usize,
    pub brightness: u8,
    pub invert: bool,
    pub strip_type: StripType,
    pub frequency: HertzU32,
}

impl ChannelConfig {
    pub const fn new(gpio_pin: u8, pixel_count: usize) -> Self {
        Self {
            gpio_pin,
            pixel_count,
            brightness: 255,
            invert: false,
            strip_type: StripType::WS2812,
            frequency: DEFAULT_FREQUENCY,
        }
    }

    pub const fn with_brightness(mut self, brightness: u8) -> Self {
        self.brightness = brightness;
        self
    }

    pub const fn with_invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    pub const fn with_strip_type(mut self, strip_type: StripType) -> Self {
        self.strip_type = strip_type;
        self
    }

    pub const fn with_frequency(mut self, frequency: HertzU32) -> Self {
        self.frequency = frequency;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeviceConfig {
    pub dma_channel: u8,
    pub wait_timeout: Duration,
}

impl DeviceConfig {
    pub const fn new() -> Self {
        Self {
            dma_channel: DEFAULT_DMA_CHANNEL,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    pub const fn with_dma_channel(mut self, dma_channel: u8) -> Self {
        self.dma_channel = dma_channel;
        self
    }

    pub const fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks a channel set against what the PWM block can drive. Returns the
/// shared bit frequency.
pub fn validate(
    device: &DeviceConfig,
    channels: &[ChannelConfig],
) -> Result<HertzU32, ConfigError> {
    // DMA 15 sits in a separate register block.
    if device.dma_channel > 14 {
        return Err(ConfigError::InvalidDmaChannel {
            dma: device.dma_channel,
        });
    }

    let first = channels.first().ok_or(ConfigError::NoChannels)?;
    if channels.len() > MAX_CHANNELS {
        return Err(ConfigError::TooManyChannels);
    }

    let hz = first.frequency.to_Hz();
    if !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&hz) {
        return Err(ConfigError::UnsupportedFrequency { hz });
    }

    for (channel, config) in channels.iter().enumerate() {
        if config.pixel_count == 0 {
            return Err(ConfigError::ZeroPixels { channel });
        }
        if channels[..channel]
            .iter()
            .any(|other| other.gpio_pin == config.gpio_pin)
        {
            return Err(ConfigError::DuplicatePin {
                pin: config.gpio_pin,
            });
        }
        let (pwm, _) = pwm_pin(config.gpio_pin).ok_or(ConfigError::UnsupportedPin {
            channel,
            pin: config.gpio_pin,
        })?;
        if channels[..channel]
            .iter()
            .any(|other| pwm_pin(other.gpio_pin).is_some_and(|(p, _)| p == pwm))
        {
            return Err(ConfigError::SharedPwmChannel {
                pin: config.gpio_pin,
                pwm,
            });
        }
        if config.frequency != first.frequency {
            return Err(ConfigError::MixedFrequencies);
        }
    }

    Ok(first.frequency)
}

#[cfg(test)]
mod tests {
    use num_traits::{FromPrimitive, ToPrimitive};

    use super::*;

    #[test]
    fn strip_type_shifts() {
        assert_eq!(StripType::Rgb.shifts(), [16, 8, 0, 0]);
        assert_eq!(StripType::Grb.shifts(), [8, 16, 0, 0]);
        assert_eq!(StripType::Bgr.shifts(), [0, 8, 16, 0]);
        assert_eq!(StripType::Grbw.shifts(), [8, 16, 0, 24]);
        assert!(!StripType::Grb.has_white());
        assert!(StripType::Rgbw.has_white());
        assert_eq!(StripType::Brgw.bytes_per_pixel(), 4);
    }

    #[test]
    fn strip_type_from_raw() {
        assert_eq!(StripType::from_u32(0x0008_1000), Some(StripType::Grb));
        assert_eq!(StripType::from_u32(0x1234), None);
        assert_eq!(StripType::Gbrw.to_u32(), Some(0x1808_0010));
    }

    #[test]
    fn pin_table() {
        assert_eq!(pwm_pin(18), Some((0, AltFunction::Alt5)));
        assert_eq!(pwm_pin(12), Some((0, AltFunction::Alt0)));
        assert_eq!(pwm_pin(13), Some((1, AltFunction::Alt0)));
        assert_eq!(pwm_pin(19), Some((1, AltFunction::Alt5)));
        assert_eq!(pwm_pin(53), Some((1, AltFunction::Alt1)));
        assert_eq!(pwm_pin(17), None);
    }

    #[test]
    fn default_strip_type_is_grb() {
        assert_eq!(StripType::default(), StripType::WS2812);
        assert_eq!(ChannelConfig::new(18, 1).strip_type, StripType::Grb);
    }

    #[test]
    fn validate_accepts_two_channels() {
        let channels = [ChannelConfig::new(18, 10), ChannelConfig::new(13, 4)];
        let hz = validate(&DeviceConfig::default(), &channels).unwrap();
        assert_eq!(hz.to_Hz(), 800_000);
    }

    #[test]
    fn channel_order_does_not_pick_the_pwm_channel() {
        let device = DeviceConfig::default();
        assert!(validate(&device, &[ChannelConfig::new(13, 4)]).is_ok());
        assert!(validate(&device, &[ChannelConfig::new(19, 4)]).is_ok());
        assert!(validate(&device, &[ChannelConfig::new(13, 4), ChannelConfig::new(18, 4)]).is_ok());
        assert_eq!(
            validate(&device, &[ChannelConfig::new(12, 4), ChannelConfig::new(18, 4)]),
            Err(ConfigError::SharedPwmChannel { pin: 18, pwm: 0 })
        );
    }

    #[test]
    fn validate_rejects() {
        let device = DeviceConfig::default();
        assert_eq!(validate(&device, &[]), Err(ConfigError::NoChannels));
        assert_eq!(
            validate(&device, &[ChannelConfig::new(18, 0)]),
            Err(ConfigError::ZeroPixels { channel: 0 })
        );
        assert_eq!(
            validate(&device, &[ChannelConfig::new(4, 1)]),
            Err(ConfigError::UnsupportedPin { channel: 0, pin: 4 })
        );
        assert_eq!(
            validate(
                &device,
                &[
                    ChannelConfig::new(18, 1),
                    ChannelConfig::new(19, 1).with_frequency(HertzU32::from_raw(400_000)),
                ]
            ),
            Err(ConfigError::MixedFrequencies)
        );
        assert_eq!(
            validate(
                &device,
                &[ChannelConfig::new(18, 1).with_frequency(HertzU32::from_raw(2_000_000))]
            ),
            Err(ConfigError::UnsupportedFrequency { hz: 2_000_000 })
        );
        assert_eq!(
            validate(&device, &[ChannelConfig::new(18, 1), ChannelConfig::new(18, 1)]),
            Err(ConfigError::DuplicatePin { pin: 18 })
        );
        assert_eq!(
            validate(
                &device,
                &[
                    ChannelConfig::new(18, 1),
                    ChannelConfig::new(19, 1),
                    ChannelConfig::new(13, 1),
                ]
            ),
            Err(ConfigError::TooManyChannels)
        );
        assert_eq!(
            validate(&device.with_dma_channel(15), &[ChannelConfig::new(18, 1)]),
            Err(ConfigError::InvalidDmaChannel { dma: 15 })
        );
    }
}
