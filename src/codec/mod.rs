//! PCM framing
//!
//! Converts between captured f32 sample blocks and the 16-bit PCM wire
//! chunks carried over the session channel. The frame format is fixed by
//! the remote protocol; there is no negotiation.

pub mod decoder;
pub mod encoder;

pub use decoder::{DecodedAudio, PcmDecoder};
pub use encoder::PcmEncoder;
