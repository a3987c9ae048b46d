pub mod chord;
pub mod key;
pub mod meter;
pub mod piece;
pub mod pitch;
pub mod range;
pub mod timeline;

pub use chord::{inversion_from_figbass, ChordLabel, ChordType, ChordVocabulary, RelativeKey};
pub use key::{KeyLabel, KeyMode, KeyVocabulary};
pub use meter::{Meter, OnsetLevel};
pub use piece::{AnnotatedChord, AnnotatedKey, ChordRecord, KeyRecord, Piece, PieceRecord};
pub use pitch::PitchType;
pub use range::{check_tiling, ChordRange};
pub use timeline::{Frame, Rational, Timeline};

/// Errors from label, timeline and piece operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("piece {piece} has no {what}")]
    EmptyPiece { piece: String, what: &'static str },

    #[error("malformed annotation in piece {piece}: {detail}")]
    MalformedAnnotation { piece: String, detail: String },

    #[error("invalid pitch string {0:?}")]
    InvalidPitch(String),

    #[error("pitch {pitch} transposed by {interval} leaves the {pitch_type} range")]
    PitchOutOfRange {
        pitch: i32,
        interval: i32,
        pitch_type: PitchType,
    },

    #[error("invalid chord type string {0:?}")]
    InvalidChordType(String),

    #[error("invalid figured bass {0:?}")]
    InvalidFiguredBass(String),

    #[error("label {label} is not representable in this vocabulary: {reason}")]
    OutOfVocabulary { label: String, reason: String },

    #[error("one-hot index {index} out of range for vocabulary of size {size}")]
    IndexOutOfRange { index: usize, size: usize },

    #[error("invalid chord range [{start}, {end})")]
    InvalidRange { start: usize, end: usize },

    #[error("ranges do not tile [0, {frames}): {detail}")]
    Tiling { frames: usize, detail: String },

    #[error("timeline is malformed at frame {frame}: {detail}")]
    Timeline { frame: usize, detail: String },
}

pub type Result<T> = std::result::Result<T, Error>;
