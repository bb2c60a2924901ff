//! Device telemetry vocabulary: header decoding and line framing.

pub mod decode;
pub mod line_ending;

pub use decode::{decode_line, DecodedMessage};
pub use line_ending::{LineEnding, ParseLineEndingError};
