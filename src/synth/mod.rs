// Purpose: Voice management, polyphony, MIDI handling
// This layer sits between the host's events and the unit graph

pub mod message;
pub mod monitor;
pub mod poly;
pub mod voice;

pub use poly::{PolySettings, Polyphony, VoiceListener};
pub use voice::{Voice, VoiceState};
