use thiserror::Error;

use crate::graph::link::LinkKey;
use crate::graph::UnitId;
use crate::units::UnitKind;

/// Errors raised by graph construction, configuration and the host boundary.
///
/// Numeric degeneracies (NaN parameters, out-of-range controller values) are
/// clamped where they occur and never show up here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("unknown unit kind `{0}`")]
    UnknownKind(String),

    #[error("catalog has no descriptor for unit kind `{0}`")]
    MissingDescriptor(UnitKind),

    #[error("catalog layout for `{kind}` does not match the unit ({detail})")]
    CatalogMismatch { kind: UnitKind, detail: &'static str },

    #[error("instrument already has a master unit")]
    DuplicateMaster,

    #[error("unit id {0} is already in use")]
    UnitIdInUse(UnitId),

    #[error("unit {0} does not exist")]
    NoSuchUnit(UnitId),

    #[error("link {0} does not exist")]
    NoSuchLink(LinkKey),

    #[error("link {0} already exists")]
    DuplicateLink(LinkKey),

    #[error("link {key} has no {side} port at that index")]
    InvalidEndpoint { key: LinkKey, side: &'static str },

    #[error("link {0} connects ports of different kinds")]
    PortKindMismatch(LinkKey),

    #[error("voice count {0} is outside 1..={max}", max = crate::MAX_VOICES)]
    VoiceCount(usize),

    #[error("voice {voice} is out of range for {num_voices} voices")]
    VoiceOutOfRange { voice: usize, num_voices: usize },

    #[error("unit {unit} has no parameter {param}")]
    NoSuchParameter { unit: UnitId, param: u16 },

    #[error("unit {unit} has no parameter named `{name}`")]
    UnknownParameter { unit: UnitId, name: String },

    #[error("unit {0} is not initialized")]
    NotInitialized(UnitId),

    #[error("malformed MIDI message {0:02x?}")]
    MalformedMidi(Vec<u8>),

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("engine lock poisoned")]
    Poisoned,
}

pub type Result<T> = core::result::Result<T, Error>;
