//! Single-channel strip handle with an explicit init/fini lifecycle.

use smart_leds::{SmartLedsWrite, RGB8};

use crate::color::{self, Color, BLACK};
use crate::config::{ChannelConfig, DeviceConfig};
use crate::controller::StripController;
use crate::error::{Error, Result};
use crate::transport::Peripheral;

pub struct Strip<P: Peripheral> {
    peripheral: P,
    device: DeviceConfig,
    controller: Option<StripController<P::Transport>>,
}

impl<P: Peripheral> Strip<P> {
    pub fn new(peripheral: P) -> Self {
        Self::with_device_config(peripheral, DeviceConfig::default())
    }

    pub fn with_device_config(peripheral: P, device: DeviceConfig) -> Self {
        Self {
            peripheral,
            device,
            controller: None,
        }
    }

    /// Claims the hardware for `led_count` GRB LEDs at 800 kHz on
    /// `gpio_pin`.
    pub fn init(&mut self, gpio_pin: u8, led_count: usize, brightness: u8) -> Result<()> {
        let config = ChannelConfig::new(gpio_pin, led_count).with_brightness(brightness);
        self.init_with(config)
    }

    /// Like [`init`](Self::init) with a full channel description.
    pub fn init_with(&mut self, config: ChannelConfig) -> Result<()> {
        let controller = StripController::init(&self.peripheral, self.device, &[config])?;
        // Only reachable if the peripheral allows a second claim.
        if let Some(mut old) = self.controller.replace(controller) {
            old.fini();
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.controller.is_some()
    }

    pub fn fini(&mut self) {
        if let Some(mut controller) = self.controller.take() {
            controller.fini();
        }
    }

    fn controller(&self) -> Result<&StripController<P::Transport>> {
        self.controller.as_ref().ok_or(Error::NotInitialized)
    }

    fn controller_mut(&mut self) -> Result<&mut StripController<P::Transport>> {
        self.controller.as_mut().ok_or(Error::NotInitialized)
    }

    pub fn len(&self) -> usize {
        self.controller()
            .and_then(|c| c.pixels(0))
            .map_or(0, <[Color]>::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_led(&mut self, index: usize, color: Color) -> Result<()> {
        self.controller_mut()?.set_pixel(0, index, color)
    }

    pub fn led(&self, index: usize) -> Result<Color> {
        self.controller()?.pixel(0, index)
    }

    pub fn set_bitmap(&mut self, colors: &[Color]) -> Result<()> {
        self.controller_mut()?.set_bitmap(0, colors)
    }

    pub fn render(&mut self) -> Result<()> {
        self.controller_mut()?.render()
    }

    pub fn wait(&mut self) -> Result<()> {
        self.controller_mut()?.wait()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.controller_mut()?.clear(0)
    }

    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }
}

impl<P: Peripheral> SmartLedsWrite for Strip<P> {
    type Error = Error;
    type Color = RGB8;

    /// Waits for the previous frame, then renders `iterator`. LEDs past its
    /// end are switched off; extra items are ignored.
    fn write<T, I>(&mut self, iterator: T) -> Result<()>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        let controller = self.controller_mut()?;
        controller.wait()?;

        let len = controller.pixels(0)?.len();
        let mut colors = vec![BLACK; len];
        for (slot, item) in colors.iter_mut().zip(iterator) {
            *slot = color::from_rgb8(item.into());
        }
        controller.set_bitmap(0, &colors)?;
        controller.render()
    }
}
