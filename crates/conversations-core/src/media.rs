//! Local media and audio output routing
//!
//! Capture and rendering live in the native engine. This layer only carries
//! a [`LocalMedia`] description into session calls and passes audio output
//! selection through to an [`AudioRouter`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Local media offered to a conversation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalMedia {
    id: Uuid,
    audio: bool,
    video: bool,
}

impl LocalMedia {
    /// Audio-only local media
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            audio: true,
            video: false,
        }
    }

    /// Enable or disable the microphone track
    pub fn with_audio(mut self, enabled: bool) -> Self {
        self.audio = enabled;
        self
    }

    /// Enable or disable the camera track
    pub fn with_video(mut self, enabled: bool) -> Self {
        self.video = enabled;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn has_audio(&self) -> bool {
        self.audio
    }

    pub fn has_video(&self) -> bool {
        self.video
    }
}

impl Default for LocalMedia {
    fn default() -> Self {
        Self::new()
    }
}

/// Where call audio is played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioOutput {
    Speakerphone,
    Headset,
}

impl fmt::Display for AudioOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioOutput::Speakerphone => write!(f, "Speakerphone"),
            AudioOutput::Headset => write!(f, "Headset"),
        }
    }
}

/// Platform audio routing
///
/// Implemented by the host platform; the client only toggles the
/// speakerphone flag.
pub trait AudioRouter: Send + Sync {
    fn set_speakerphone_on(&self, on: bool);

    fn is_speakerphone_on(&self) -> bool;
}

/// Router that only remembers the last selection
#[derive(Debug, Default)]
pub struct InMemoryAudioRouter {
    speakerphone: AtomicBool,
}

impl InMemoryAudioRouter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioRouter for InMemoryAudioRouter {
    fn set_speakerphone_on(&self, on: bool) {
        self.speakerphone.store(on, Ordering::SeqCst);
    }

    fn is_speakerphone_on(&self) -> bool {
        self.speakerphone.load(Ordering::SeqCst)
    }
}
