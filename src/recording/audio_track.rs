//! Opus track fed from the shared microphone

use super::recorder::MovieWriter;
use crate::audio::{AudioFeed, AudioSubscription, OpusEncoder};
use crate::errors::BackendError;
use std::sync::{Arc, Mutex};

/// Feed opened by the backend while the session runs
pub(crate) type SharedAudio = Arc<Mutex<Option<AudioFeed>>>;

/// One writer's view of the microphone
pub(crate) struct AudioTrack {
    subscription: AudioSubscription,
    encoder: OpusEncoder,
    packets: u64,
}

impl AudioTrack {
    /// Subscribe to the running feed, if any
    pub fn attach(shared: &SharedAudio, bitrate: u32) -> Result<Option<Self>, BackendError> {
        let feed = shared.lock().unwrap_or_else(|e| e.into_inner());
        let Some(feed) = feed.as_ref() else {
            return Ok(None);
        };
        Ok(Some(Self {
            encoder: OpusEncoder::new(feed.channels(), bitrate)?,
            subscription: feed.subscribe(),
            packets: 0,
        }))
    }

    pub fn channels(&self) -> u16 {
        self.encoder.channels()
    }

    /// Encode and mux everything captured so far
    pub fn pump(&mut self, writer: &mut MovieWriter) -> Result<(), BackendError> {
        for frame in self.subscription.drain() {
            for packet in self.encoder.encode(&frame)? {
                writer.write_audio(packet.timestamp, &packet.data)?;
                self.packets += 1;
            }
        }
        Ok(())
    }

    /// Mux the tail and report how many packets went into the file
    pub fn finish(mut self, writer: &mut MovieWriter) -> Result<u64, BackendError> {
        self.pump(writer)?;
        for packet in self.encoder.flush()? {
            writer.write_audio(packet.timestamp, &packet.data)?;
            self.packets += 1;
        }
        Ok(self.packets)
    }
}
