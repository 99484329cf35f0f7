//! The unit graph: ports, links, units, the instrument that owns them and the
//! sink that compiles and runs them.
//!
//! Units live in an arena inside [`Instrument`](instrument::Instrument) and
//! refer to each other by [`UnitId`]. Ports are owned inline by their unit;
//! links are plain `(unit, port) → (unit, port)` keys. The
//! [`Sink`](sink::Sink) holds ids only and is recompiled after every
//! topology change.

/// Typed in/out endpoints, voice adapters and per-voice modulation buffers.
pub mod port;
/// Directed, modulatable connections between ports.
pub mod link;
/// The unit contract: lifecycle, parameters and the bound entry point.
pub mod unit;
/// Unit arena and graph mutation API.
pub mod instrument;
/// Graph compiler and per-sample executor.
pub mod sink;
/// In-memory instrument descriptions.
pub mod preset;

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Small integer id, unique within one instrument.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(pub u16);

/// Id reserved for the master unit.
pub const MASTER_ID: UnitId = UnitId(0);

impl UnitId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a unit keeps one state per voice or a single shared state.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Voicing {
    Mono,
    Poly,
}

/// Signal carried by a port.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    /// A value every sample; inputs sum all incoming connections.
    Audio,
    /// A value at discrete moments; inputs keep the latest one.
    Event,
}

macro_rules! bitmask {
    ($(#[$meta:meta])* $name:ident { $($(#[$flag_meta:meta])* $flag:ident = $bit:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name(u8);

        impl $name {
            pub const NONE: Self = Self(0);
            $($(#[$flag_meta])* pub const $flag: Self = Self($bit);)+

            #[inline]
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            #[inline]
            pub const fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            #[inline]
            pub const fn union(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }

            pub const fn bits(self) -> u8 {
                self.0
            }
        }

        impl core::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                self.union(rhs)
            }
        }
    };
}

bitmask! {
    /// Which of the three processing loops a unit takes part in.
    Processing {
        /// Runs every sample.
        AUDIO = 1,
        /// Produces or consumes events; runs every sample in graph order.
        EVENT = 2,
        /// Runs once per control tick.
        CONTROL = 4,
    }
}

impl Processing {
    /// Units the sink places in the per-sample execution list.
    pub const fn is_executable(self) -> bool {
        self.intersects(Self::AUDIO.union(Self::EVENT))
    }
}

bitmask! {
    /// Polyphony broadcasts a unit body wants to hear about.
    Subscriptions {
        NOTE = 1,
        PITCH = 2,
        GATE = 4,
        PITCHBEND = 8,
        AFTERTOUCH = 16,
        CONTROLLER = 32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_masks() {
        let envelope = Processing::AUDIO | Processing::CONTROL;
        assert!(envelope.contains(Processing::CONTROL));
        assert!(envelope.is_executable());
        assert!(!Processing::CONTROL.is_executable());
        assert!(Processing::EVENT.is_executable());
    }

    #[test]
    fn unit_ids_display_with_hash() {
        assert_eq!(UnitId(7).to_string(), "#7");
        assert_eq!(MASTER_ID.index(), 0);
    }
}
