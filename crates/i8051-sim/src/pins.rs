//! Digital I/O pins P0.0 through P3.7.
//!
//! The core only ever drives pins high through [`PinBus`]; peripheral models
//! read levels through the same trait and have no way back into the CPU.

use std::fmt;

use tracing::debug;

/// A single port pin, `P<port>.<bit>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PinId {
    port: u8,
    bit: u8,
}

impl PinId {
    pub const PORTS: u8 = 4;

    /// Returns `None` unless `port < 4` and `bit < 8`.
    pub const fn new(port: u8, bit: u8) -> Option<Self> {
        if port < Self::PORTS && bit < 8 {
            Some(Self { port, bit })
        } else {
            None
        }
    }

    pub fn port(self) -> u8 {
        self.port
    }

    pub fn bit(self) -> u8 {
        self.bit
    }

    /// Every pin, P0.0 first.
    pub fn all() -> impl Iterator<Item = PinId> {
        (0..Self::PORTS).flat_map(|port| (0..8).map(move |bit| PinId { port, bit }))
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}.{}", self.port, self.bit)
    }
}

/// A capability to drive and sense pin levels.
pub trait PinBus {
    fn set_level(&mut self, pin: PinId, high: bool);
    fn level(&self, pin: PinId) -> bool;

    fn set_high(&mut self, pin: PinId) {
        self.set_level(pin, true);
    }

    fn is_high(&self, pin: PinId) -> bool {
        self.level(pin)
    }
}

/// A bus with nothing attached: writes vanish and every pin reads low.
impl PinBus for () {
    fn set_level(&mut self, _pin: PinId, _high: bool) {}
    fn level(&self, _pin: PinId) -> bool {
        false
    }
}

/// The stock 32-pin bus. One latch byte per port, all low at power-up.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Pins {
    ports: [u8; PinId::PORTS as usize],
}

impl Pins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive every pin low.
    pub fn reset(&mut self) {
        self.ports = [0; PinId::PORTS as usize];
        debug!("all pins reset to LOW");
    }

    /// Latched byte for a whole port, bit 0 being `Px.0`.
    pub fn port(&self, port: u8) -> Option<u8> {
        self.ports.get(port as usize).copied()
    }

    /// Pins currently driven high.
    pub fn high(&self) -> impl Iterator<Item = PinId> + '_ {
        PinId::all().filter(|pin| self.level(*pin))
    }
}

impl PinBus for Pins {
    fn set_level(&mut self, pin: PinId, high: bool) {
        let latch = &mut self.ports[pin.port as usize];
        if high {
            *latch |= 1 << pin.bit;
        } else {
            *latch &= !(1 << pin.bit);
        }
        debug!(%pin, level = if high { "HIGH" } else { "LOW" }, "pin driven");
    }

    fn level(&self, pin: PinId) -> bool {
        self.ports[pin.port as usize] & (1 << pin.bit) != 0
    }
}

impl fmt::Display for Pins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (port, latch) in self.ports.iter().enumerate() {
            if port != 0 {
                write!(f, "  ")?;
            }
            write!(f, "P{port}={latch:08b}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_id_range() {
        assert!(PinId::new(3, 7).is_some());
        assert!(PinId::new(4, 0).is_none());
        assert!(PinId::new(0, 8).is_none());
        assert_eq!(PinId::all().count(), 32);
        assert_eq!(PinId::new(2, 5).unwrap().to_string(), "P2.5");
    }

    #[test]
    fn set_and_reset() {
        let mut pins = Pins::new();
        let p13 = PinId::new(1, 3).unwrap();
        pins.set_high(p13);
        assert!(pins.is_high(p13));
        assert_eq!(pins.port(1), Some(0b0000_1000));
        assert_eq!(pins.high().collect::<Vec<_>>(), vec![p13]);
        assert_eq!(
            pins.to_string(),
            "P0=00000000  P1=00001000  P2=00000000  P3=00000000"
        );
        pins.reset();
        assert!(!pins.is_high(p13));
        assert_eq!(pins.high().count(), 0);
    }

    #[test]
    fn unit_bus_reads_low() {
        let mut bus = ();
        let pin = PinId::new(0, 0).unwrap();
        bus.set_high(pin);
        assert!(!bus.is_high(pin));
    }
}
