//! Announcement variants raised by the host and how each becomes a request.
//!
//! Every variant reduces to a `(topic, body)` pair plus routing (speaker,
//! class, position). The speech pipeline only ever sees the resulting
//! [`SpeechRequest`].

use serde::{Deserialize, Serialize};

use crate::text_prep::compose_message;
use crate::types::{MessageClass, SpatialTarget, SpeechRequest};
use crate::voice::{DEFAULT_VOICE_KEY, voice_key_for};

/// How a chat line was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    #[default]
    Normal,
    Shout,
    Whisper,
    Ping,
}

impl ChatKind {
    pub fn verb(self) -> &'static str {
        match self {
            ChatKind::Normal => "said",
            ChatKind::Shout => "shouted",
            ChatKind::Whisper => "whispered",
            ChatKind::Ping => "pinged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Announcement {
    /// Center-screen message; the only debounced class.
    Center { text: String },
    /// Rune stones, intro texts and raven tutorials.
    TextViewer {
        #[serde(default)]
        topic: String,
        body: String,
    },
    /// A line spoken by a character in the world.
    Npc {
        speaker: String,
        #[serde(default)]
        topic: String,
        body: String,
        position: [f32; 3],
    },
    Chat {
        user: String,
        #[serde(default)]
        kind: ChatKind,
        text: String,
    },
    Dream { text: String },
}

/// Host-side facts needed to route announcements.
#[derive(Debug, Clone, Default)]
pub struct AnnounceContext {
    pub local_player: Option<String>,
    pub skip_self: bool,
}

impl Announcement {
    /// The `(topic, body)` pair this announcement reads out.
    pub fn parts(&self) -> (String, String) {
        match self {
            Announcement::Center { text } | Announcement::Dream { text } => {
                (String::new(), text.clone())
            }
            Announcement::TextViewer { topic, body } | Announcement::Npc { topic, body, .. } => {
                (topic.clone(), body.clone())
            }
            Announcement::Chat { user, kind, text } => {
                (String::new(), format!("{user} {} in chat: {text}", kind.verb()))
            }
        }
    }

    /// Turn the announcement into a speech request, or `None` when it should
    /// not be spoken (the local player's own chat line with skip-self on).
    pub fn into_request(self, ctx: &AnnounceContext) -> Option<SpeechRequest> {
        if let Announcement::Chat { user, .. } = &self {
            if ctx.skip_self && ctx.local_player.as_deref() == Some(user.as_str()) {
                return None;
            }
        }

        let (topic, body) = self.parts();
        let text = compose_message(&topic, &body);

        let request = match self {
            Announcement::Center { .. } => SpeechRequest {
                text,
                speaker: DEFAULT_VOICE_KEY.into(),
                class: MessageClass::CenterAnnouncement,
                target: None,
            },
            Announcement::Npc {
                speaker, position, ..
            } => SpeechRequest {
                text,
                speaker: voice_key_for(&speaker).to_string(),
                class: MessageClass::Normal,
                target: Some(SpatialTarget { position }),
            },
            Announcement::TextViewer { .. }
            | Announcement::Chat { .. }
            | Announcement::Dream { .. } => SpeechRequest::new(text, DEFAULT_VOICE_KEY),
        };
        Some(request)
    }
}
