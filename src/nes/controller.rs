use std::any::Any;

use anyhow::{Result, bail};
use bitflags::bitflags;

use super::ppu::Ppu;

/// Open-bus bits the controller ports leave set on every read.
const PORT_OPEN_BUS: u8 = 0x40;
const DEVICES_PER_PORT: usize = 2;

bitflags! {
    /// Standard joypad buttons in the order they are shifted out.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Buttons: u8 {
        const A = 0x01;
        const B = 0x02;
        const SELECT = 0x04;
        const START = 0x08;
        const UP = 0x10;
        const DOWN = 0x20;
        const LEFT = 0x40;
        const RIGHT = 0x80;
    }
}

/// Anything that can observe the rendered picture, for light guns.
pub trait LightSense {
    fn light_sensed(&self, x: i16, y: i16) -> bool;
}

impl LightSense for Ppu {
    fn light_sensed(&self, x: i16, y: i16) -> bool {
        Ppu::light_sensed(self, x, y)
    }
}

/// A peripheral plugged into one of the controller ports.
///
/// Serial devices answer reads one bit at a time through `read_serial`. Parallel
/// devices report fixed bits through `port_value` instead.
pub trait InputDevice: Any {
    fn is_serial(&self) -> bool;

    /// Level of the strobe line, written through $4016 bit 0.
    fn strobe(&mut self, high: bool);

    /// Next bit on the data line, in bit 0.
    fn read_serial(&mut self) -> u8;

    fn port_value(&self, _screen: &dyn LightSense) -> u8 {
        0
    }

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[derive(Debug, Default, Clone)]
pub struct Joypad {
    buttons: Buttons,
    shift: u8,
    strobe: bool,
}

impl Joypad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buttons(&self) -> Buttons {
        self.buttons
    }

    pub fn set_buttons(&mut self, buttons: Buttons) {
        self.buttons = buttons;
        if self.strobe {
            self.shift = buttons.bits();
        }
    }
}

impl InputDevice for Joypad {
    fn is_serial(&self) -> bool {
        true
    }

    fn strobe(&mut self, high: bool) {
        self.strobe = high;
        if high {
            self.shift = self.buttons.bits();
        }
    }

    fn read_serial(&mut self) -> u8 {
        if self.strobe {
            return self.buttons.bits() & 0x01;
        }
        // Once all eight buttons are out the register reads back ones.
        let bit = self.shift & 0x01;
        self.shift = (self.shift >> 1) | 0x80;
        bit
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Light gun: trigger on bit 4, bit 3 low while the aimed spot is bright.
#[derive(Debug, Clone)]
pub struct Zapper {
    pub x: i16,
    pub y: i16,
    pub trigger: bool,
}

impl Default for Zapper {
    fn default() -> Self {
        Self {
            x: -1,
            y: -1,
            trigger: false,
        }
    }
}

impl Zapper {
    pub fn aim(&mut self, x: i16, y: i16, trigger: bool) {
        self.x = x;
        self.y = y;
        self.trigger = trigger;
    }
}

impl InputDevice for Zapper {
    fn is_serial(&self) -> bool {
        false
    }

    fn strobe(&mut self, _high: bool) {}

    fn read_serial(&mut self) -> u8 {
        0
    }

    fn port_value(&self, screen: &dyn LightSense) -> u8 {
        let dark = !screen.light_sensed(self.x, self.y);
        (u8::from(dark) << 3) | (u8::from(self.trigger) << 4)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// One controller port. Serial devices drive data bits 0 and 1 in connection order;
/// parallel devices OR their bits into the same read.
#[derive(Default)]
pub struct ControllerMultiplexor {
    devices: Vec<Box<dyn InputDevice>>,
}

impl ControllerMultiplexor {
    pub fn new() -> Self {
        Self::default()
    }

    /// A port with `device` already plugged in.
    pub fn with_device(device: Box<dyn InputDevice>) -> Self {
        Self {
            devices: vec![device],
        }
    }

    pub fn connect(&mut self, device: Box<dyn InputDevice>) -> Result<()> {
        if self.devices.len() >= DEVICES_PER_PORT {
            bail!("controller port already has {DEVICES_PER_PORT} devices connected");
        }
        self.devices.push(device);
        Ok(())
    }

    pub fn disconnect_all(&mut self) {
        self.devices.clear();
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn write_strobe(&mut self, value: u8) {
        let high = value & 0x01 != 0;
        for device in &mut self.devices {
            device.strobe(high);
        }
    }

    pub fn read(&mut self, screen: &dyn LightSense) -> u8 {
        let mut value = PORT_OPEN_BUS;
        let mut serial_line = 0;
        for device in &mut self.devices {
            if device.is_serial() {
                value |= (device.read_serial() & 0x01) << serial_line;
                serial_line += 1;
            } else {
                value |= device.port_value(screen);
            }
        }
        value
    }

    /// First connected device of type `T`.
    pub fn device_mut<T: InputDevice>(&mut self) -> Option<&mut T> {
        self.devices
            .iter_mut()
            .find_map(|device| device.as_any_mut().downcast_mut::<T>())
    }
}
