pub mod catalog; // Unit descriptors: ports, parameters, processing flags
pub mod config;
pub mod dsp; // Sample-level building blocks
pub mod engine; // Audio-thread facade, event scheduling
pub mod error;
pub mod graph; // Units, links, the instrument and its compiled sink
pub mod io; // MIDI parsing, output buffers
pub mod param;
pub mod synth; // Voice management and polyphony
pub mod units; // Concrete unit kinds

pub use config::EngineConfig;
pub use engine::{Engine, EngineHandle};
pub use error::{Error, Result};

/// Upper bound on the voice pool.
pub const MAX_VOICES: usize = 128;
