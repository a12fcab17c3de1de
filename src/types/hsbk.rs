//! Color as carried on the wire.

use serde::{Deserialize, Serialize};

/// Hue, saturation, brightness and kelvin, each as the raw 16-bit wire value.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hsbk {
    pub hue: u16,
    pub saturation: u16,
    pub brightness: u16,
    pub kelvin: u16,
}

impl Hsbk {
    pub const KELVIN_MIN: u16 = 2500;
    pub const KELVIN_MAX: u16 = 9000;

    /// Returns None if kelvin is outside the range lights accept.
    pub fn create(hue: u16, saturation: u16, brightness: u16, kelvin: u16) -> Option<Self> {
        if (Self::KELVIN_MIN..=Self::KELVIN_MAX).contains(&kelvin) {
            Some(Hsbk {
                hue,
                saturation,
                brightness,
                kelvin,
            })
        } else {
            None
        }
    }
}
