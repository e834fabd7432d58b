//! Controller ports: two joypads, the light phaser, the Game Gear start
//! button and the I/O control register that drives the TH/TR pins.

use serde::{Deserialize, Serialize};

/// Buttons on a control pad (plus the console's Start/Pause).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Button1,
    Button2,
    Start,
}

impl Key {
    fn bit(self) -> u8 {
        match self {
            Key::Up => 0x01,
            Key::Down => 0x02,
            Key::Left => 0x04,
            Key::Right => 0x08,
            Key::Button1 => 0x10,
            Key::Button2 => 0x20,
            Key::Start => 0x40,
        }
    }
}

/// Light phaser state for port A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Phaser {
    pub x: i32,
    pub y: i32,
    pub trigger: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Input {
    /// Held keys per player, one bit per [`Key`]
    pads: [u8; 2],
    /// Port 0x3F
    io_control: u8,
    phaser: Option<Phaser>,
    #[serde(skip)]
    allow_up_down: bool,
}

impl Input {
    pub fn new(allow_up_down: bool) -> Self {
        Self {
            // All pins inputs
            io_control: 0xFF,
            allow_up_down,
            ..Self::default()
        }
    }

    /// The console resets; keys the host is holding stay held.
    pub fn reset(&mut self) {
        self.io_control = 0xFF;
    }

    pub fn set_allow_up_down(&mut self, allow: bool) {
        self.allow_up_down = allow;
    }

    /// Returns `true` when the key was not already held.
    pub fn press(&mut self, player: usize, key: Key) -> bool {
        let Some(pad) = self.pads.get_mut(player) else {
            return false;
        };
        let was_held = *pad & key.bit() != 0;
        *pad |= key.bit();
        !was_held
    }

    pub fn release(&mut self, player: usize, key: Key) {
        if let Some(pad) = self.pads.get_mut(player) {
            *pad &= !key.bit();
        }
    }

    pub fn is_pressed(&self, player: usize, key: Key) -> bool {
        self.pads.get(player).is_some_and(|pad| pad & key.bit() != 0)
    }

    pub fn set_phaser(&mut self, phaser: Option<Phaser>) {
        self.phaser = phaser;
    }

    pub fn phaser(&self) -> Option<Phaser> {
        self.phaser
    }

    /// Held directions and buttons for `player` (active high, bits 0-5),
    /// with opposite directions cancelled unless allowed.
    fn pad_bits(&self, player: usize) -> u8 {
        let mut bits = self.pads[player] & 0x3F;
        if !self.allow_up_down {
            if bits & 0x03 == 0x03 {
                bits &= !0x03;
            }
            if bits & 0x0C == 0x0C {
                bits &= !0x0C;
            }
        }
        bits
    }

    /// Port 0xDC: player 1 and the first half of player 2.
    pub fn read_port_a(&self) -> u8 {
        let p1 = match self.phaser {
            Some(phaser) => {
                if phaser.trigger {
                    0x10
                } else {
                    0
                }
            }
            None => self.pad_bits(0),
        };
        let p2 = self.pad_bits(1);
        !(p1 | ((p2 & 0x03) << 6))
    }

    /// Port 0xDD: rest of player 2, reset button, and the TH pins.
    ///
    /// `light` is the phaser photodiode (pulls TH-A low). On Japanese
    /// consoles TH output levels read back inverted, which is how games
    /// tell the regions apart.
    pub fn read_port_b(&self, light: bool, japan: bool) -> u8 {
        let p2 = self.pad_bits(1);
        let mut value = !((p2 >> 2) & 0x0F) & 0x0F;
        // Reset button released, CONT high
        value |= 0x30;

        let th_a = self.th_level(0x02, 0x20, japan) && !(light && self.phaser.is_some());
        let th_b = self.th_level(0x08, 0x80, japan);
        if th_a {
            value |= 0x40;
        }
        if th_b {
            value |= 0x80;
        }
        value
    }

    fn th_level(&self, direction: u8, level: u8, japan: bool) -> bool {
        if self.io_control & direction != 0 {
            // Input, pulled high
            true
        } else {
            (self.io_control & level != 0) != japan
        }
    }

    fn th_pins(&self) -> (bool, bool) {
        (
            self.th_level(0x02, 0x20, false),
            self.th_level(0x08, 0x80, false),
        )
    }

    /// Port 0x3F. Returns `true` when a TH pin went high, which latches the
    /// VDP H counter.
    pub fn write_io_control(&mut self, value: u8) -> bool {
        let (a_before, b_before) = self.th_pins();
        self.io_control = value;
        let (a_after, b_after) = self.th_pins();
        (!a_before && a_after) || (!b_before && b_after)
    }

    /// Game Gear port 0x00: start button (active low) and region bits.
    pub fn read_gg_port(&self, japan: bool, pal: bool) -> u8 {
        let mut value = 0x1F;
        if !self.is_pressed(0, Key::Start) {
            value |= 0x80;
        }
        if !japan {
            value |= 0x40;
        }
        if pal {
            value |= 0x20;
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_keeps_held_keys() {
        let mut input = Input::new(false);
        input.press(0, Key::Button1);
        input.write_io_control(0x00);
        input.reset();
        assert!(input.is_pressed(0, Key::Button1));
        assert_eq!(input.read_port_a() & 0x10, 0);
        // Still held, so no new press.
        assert!(!input.press(0, Key::Button1));
    }

    #[test]
    fn test_idle_ports() {
        let input = Input::new(false);
        assert_eq!(input.read_port_a(), 0xFF);
        assert_eq!(input.read_port_b(false, false), 0xFF);
    }

    #[test]
    fn test_player_bits() {
        let mut input = Input::new(false);
        assert!(input.press(0, Key::Button1));
        assert!(!input.press(0, Key::Button1));
        input.press(1, Key::Down);
        input.press(1, Key::Button2);
        assert_eq!(input.read_port_a(), !0x90);
        assert_eq!(input.read_port_b(false, false), !0x08);
        input.release(0, Key::Button1);
        assert_eq!(input.read_port_a(), !0x80);
        // Out of range players are ignored.
        assert!(!input.press(2, Key::Up));
    }

    #[test]
    fn test_opposite_directions() {
        let mut input = Input::new(false);
        input.press(0, Key::Up);
        input.press(0, Key::Down);
        input.press(0, Key::Left);
        assert_eq!(input.read_port_a(), !0x04);

        input.set_allow_up_down(true);
        assert_eq!(input.read_port_a(), !0x07);
    }

    #[test]
    fn test_th_region_detection() {
        let mut input = Input::new(false);
        // Both TH pins as outputs driven high
        input.write_io_control(0xF5);
        assert_eq!(input.read_port_b(false, false) & 0xC0, 0xC0);
        assert_eq!(input.read_port_b(false, true) & 0xC0, 0x00);
        input.write_io_control(0x55);
        assert_eq!(input.read_port_b(false, false) & 0xC0, 0x00);
    }

    #[test]
    fn test_th_rising_edge() {
        let mut input = Input::new(false);
        assert!(!input.write_io_control(0xDD));
        assert!(input.write_io_control(0xFD));
        assert!(!input.write_io_control(0xFD));
    }

    #[test]
    fn test_phaser() {
        let mut input = Input::new(false);
        input.set_phaser(Some(Phaser { x: 10, y: 10, trigger: true }));
        assert_eq!(input.read_port_a(), !0x10);
        assert_eq!(input.read_port_b(true, false) & 0x40, 0);
        assert_eq!(input.read_port_b(false, false) & 0x40, 0x40);
    }

    #[test]
    fn test_gg_start_port() {
        let mut input = Input::new(false);
        assert_eq!(input.read_gg_port(false, false), 0xDF);
        input.press(0, Key::Start);
        assert_eq!(input.read_gg_port(true, false), 0x1F);
    }
}
