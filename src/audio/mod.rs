//! Shared microphone audio for the encoded outputs
//!
//! One capture per running session feeds every output that has the
//! microphone connected:
//! - `clock`: presentation timestamps shared by audio and video
//! - `feed`: cpal microphone (or synthetic tone) fanned out to subscribers
//! - `encoder`: Opus encoding for MP4 muxing

mod clock;
mod encoder;
mod feed;

pub use clock::PTSClock;
pub use encoder::{EncodedAudio, OpusEncoder, OPUS_SAMPLE_RATE};
pub use feed::{AudioFeed, AudioFrame, AudioSourceKind, AudioSubscription};
