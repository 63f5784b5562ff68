use std::fmt::Display;
use std::path::Path;

use base64::prelude::*;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::gateway::{GuideReply, TurnRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let role = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        write!(f, "{role}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoiCategory {
    Police,
    Hospital,
    School,
    Food,
    Bank,
    Park,
    Shop,
    #[default]
    #[serde(other)]
    Default,
}

/// One pin on the map, as the model emits it inside a `<<<LOC>>>` block.
/// Unknown category strings deserialize to `Default` rather than failing.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Poi {
    pub lat: f64,
    pub lng: f64,
    pub title: String,
    #[serde(default)]
    pub category: PoiCategory,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Citation {
    Web { uri: String, title: String },
    Maps { uri: String, title: String },
}

impl Citation {
    pub fn uri(&self) -> &str {
        match self {
            Citation::Web { uri, .. } | Citation::Maps { uri, .. } => uri,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Citation::Web { title, .. } | Citation::Maps { title, .. } => title,
        }
    }
}

/// A photo as a data-URI string; the raw base64 payload and mime type are
/// recovered from the prefix when the request goes out.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    pub data_uri: String,
}

impl ImageAttachment {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("image file `{}`: {e}", path.display()))?;
        let mime = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("png") => "image/png",
            Some("webp") => "image/webp",
            Some("gif") => "image/gif",
            _ => "image/jpeg",
        };
        Ok(Self {
            data_uri: format!("data:{mime};base64,{}", BASE64_STANDARD.encode(bytes)),
        })
    }

    pub fn mime_type(&self) -> &str {
        self.data_uri
            .strip_prefix("data:")
            .and_then(|rest| rest.split(';').next())
            .filter(|mime| !mime.is_empty())
            .unwrap_or("image/jpeg")
    }

    /// Base64 payload with any data-URI prefix stripped.
    pub fn payload(&self) -> &str {
        match self.data_uri.split_once(',') {
            Some((_, payload)) => payload,
            None => &self.data_uri,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub image: Option<ImageAttachment>,
    pub citations: Vec<Citation>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn user(text: String, image: Option<ImageAttachment>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            text,
            image,
            citations: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    fn assistant(text: String, citations: Vec<Citation>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            text,
            image: None,
            citations,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum LocationUpdate {
    Replaced(Coordinates),
    Denied,
    Superseded,
}

/// All session-visible state, owned by the event loop. Widgets read through
/// the accessor views; workers only ever see copies carried by requests.
pub struct Session {
    messages: Vec<ChatMessage>,
    pending_image: Option<ImageAttachment>,
    awaiting_response: bool,
    active_pois: Vec<Poi>,
    location: Option<Coordinates>,
    location_generation: u64,
    locating: bool,
}

impl Session {
    pub fn new(greeting: &str) -> Self {
        let mut greeting = ChatMessage::assistant(greeting.to_string(), Vec::new());
        greeting.id = "init".to_string();
        Self {
            messages: vec![greeting],
            pending_image: None,
            awaiting_response: false,
            active_pois: Vec::new(),
            location: None,
            location_generation: 0,
            locating: false,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn active_pois(&self) -> &[Poi] {
        &self.active_pois
    }

    pub fn location(&self) -> Option<Coordinates> {
        self.location
    }

    pub fn is_awaiting(&self) -> bool {
        self.awaiting_response
    }

    pub fn is_locating(&self) -> bool {
        self.locating
    }

    pub fn pending_image(&self) -> Option<&ImageAttachment> {
        self.pending_image.as_ref()
    }

    pub fn attach_image(&mut self, image: ImageAttachment) {
        self.pending_image = Some(image);
    }

    /// Starts a turn. Returns the request for the gateway worker, or `None`
    /// when the submission is rejected: nothing to send, or a turn is already
    /// in flight (single-flight; later submissions are dropped, not queued).
    /// The user message is committed before the model is called, so a retry
    /// after a failed turn goes out as a brand-new turn.
    pub fn submit_turn(&mut self, text: String) -> Option<TurnRequest> {
        if text.trim().is_empty() && self.pending_image.is_none() {
            log::debug!("empty submission ignored");
            return None;
        }
        if self.awaiting_response {
            log::debug!("submission ignored, turn already in flight");
            return None;
        }

        let image = self.pending_image.take();
        self.messages
            .push(ChatMessage::user(text.clone(), image.clone()));
        self.awaiting_response = true;

        Some(TurnRequest {
            prompt: text,
            image,
            location: self.location,
        })
    }

    /// Finishes a turn with the gateway's reply. Returns true when the reply
    /// carried pins and the map view should be preferred. A reply without
    /// pins leaves the previous set on the map.
    pub fn complete_turn(&mut self, reply: GuideReply) -> bool {
        self.messages
            .push(ChatMessage::assistant(reply.display_text, reply.citations));
        self.awaiting_response = false;

        if reply.pois.is_empty() {
            false
        } else {
            self.active_pois = reply.pois;
            true
        }
    }

    /// Gateway-external failure (the worker died). The user message stays
    /// committed; no assistant message is appended.
    pub fn fail_turn(&mut self, diagnostic: &str) {
        self.awaiting_response = false;
        log::error!("turn abandoned: {diagnostic}");
    }

    /// Starts a location fetch and supersedes any still-pending one.
    pub fn request_location(&mut self) -> u64 {
        self.locating = true;
        self.location_generation += 1;
        self.location_generation
    }

    pub fn apply_location(
        &mut self,
        generation: u64,
        outcome: Result<Coordinates, String>,
    ) -> LocationUpdate {
        if generation != self.location_generation {
            log::debug!("stale location result dropped (generation {generation})");
            return LocationUpdate::Superseded;
        }
        self.locating = false;
        match outcome {
            Ok(coordinates) => {
                self.location = Some(coordinates);
                LocationUpdate::Replaced(coordinates)
            }
            Err(diagnostic) => {
                // prior coordinates stay valid
                log::warn!("location fetch failed: {diagnostic}");
                LocationUpdate::Denied
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GuideReply;

    fn reply_with_pois(pois: Vec<Poi>) -> GuideReply {
        GuideReply {
            display_text: "answer".to_string(),
            citations: Vec::new(),
            pois,
        }
    }

    fn poi(title: &str) -> Poi {
        Poi {
            lat: 31.5,
            lng: 74.3,
            title: title.to_string(),
            category: PoiCategory::Default,
        }
    }

    #[test]
    fn greeting_seeds_the_log() {
        let session = Session::new("hello");
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].id, "init");
        assert_eq!(session.messages()[0].role, Role::Assistant);
    }

    #[test]
    fn log_grows_by_one_per_side_of_a_turn() {
        let mut session = Session::new("hi");
        let request = session.submit_turn("where is anarkali?".to_string());
        assert!(request.is_some());
        assert_eq!(session.messages().len(), 2);

        session.complete_turn(reply_with_pois(Vec::new()));
        assert_eq!(session.messages().len(), 3);
        assert!(!session.is_awaiting());
    }

    #[test]
    fn failed_turn_keeps_the_user_message_only() {
        let mut session = Session::new("hi");
        session.submit_turn("lahore fort".to_string()).unwrap();
        session.fail_turn("worker gone");
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1].role, Role::User);
        assert!(!session.is_awaiting());
    }

    #[test]
    fn empty_submission_is_a_no_op() {
        let mut session = Session::new("hi");
        assert!(session.submit_turn("   ".to_string()).is_none());
        assert_eq!(session.messages().len(), 1);
        assert!(!session.is_awaiting());
    }

    #[test]
    fn image_only_submission_is_accepted() {
        let mut session = Session::new("hi");
        session.attach_image(ImageAttachment {
            data_uri: "data:image/png;base64,QUJD".to_string(),
        });
        let request = session.submit_turn(String::new()).unwrap();
        assert!(request.image.is_some());
        assert!(session.pending_image().is_none());
        assert_eq!(session.messages().len(), 2);
    }

    #[test]
    fn second_submission_while_awaiting_is_dropped() {
        let mut session = Session::new("hi");
        assert!(session.submit_turn("first".to_string()).is_some());
        assert!(session.submit_turn("second".to_string()).is_none());
        assert_eq!(session.messages().len(), 2);
    }

    #[test]
    fn pois_replace_wholesale_and_survive_empty_replies() {
        let mut session = Session::new("hi");
        session.submit_turn("banks".to_string()).unwrap();
        assert!(session.complete_turn(reply_with_pois(vec![poi("HBL"), poi("UBL")])));
        assert_eq!(session.active_pois().len(), 2);

        session.submit_turn("tell me more".to_string()).unwrap();
        assert!(!session.complete_turn(reply_with_pois(Vec::new())));
        assert_eq!(session.active_pois().len(), 2);

        session.submit_turn("parks".to_string()).unwrap();
        assert!(session.complete_turn(reply_with_pois(vec![poi("Racecourse Park")])));
        assert_eq!(session.active_pois().len(), 1);
    }

    #[test]
    fn turn_request_carries_the_current_location() {
        let mut session = Session::new("hi");
        let generation = session.request_location();
        session.apply_location(
            generation,
            Ok(Coordinates {
                latitude: 31.52,
                longitude: 74.35,
            }),
        );
        let request = session.submit_turn("near me".to_string()).unwrap();
        assert_eq!(
            request.location,
            Some(Coordinates {
                latitude: 31.52,
                longitude: 74.35,
            })
        );
    }

    #[test]
    fn stale_location_results_are_superseded() {
        let mut session = Session::new("hi");
        let first = session.request_location();
        let second = session.request_location();

        let stale = session.apply_location(
            first,
            Ok(Coordinates {
                latitude: 0.0,
                longitude: 0.0,
            }),
        );
        assert_eq!(stale, LocationUpdate::Superseded);
        assert!(session.location().is_none());
        assert!(session.is_locating());

        session.apply_location(
            second,
            Ok(Coordinates {
                latitude: 24.86,
                longitude: 67.0,
            }),
        );
        assert_eq!(
            session.location(),
            Some(Coordinates {
                latitude: 24.86,
                longitude: 67.0,
            })
        );
        assert!(!session.is_locating());
    }

    #[test]
    fn denied_location_keeps_the_previous_fix() {
        let mut session = Session::new("hi");
        let generation = session.request_location();
        session.apply_location(
            generation,
            Ok(Coordinates {
                latitude: 31.52,
                longitude: 74.35,
            }),
        );

        let generation = session.request_location();
        let update = session.apply_location(generation, Err("denied".to_string()));
        assert_eq!(update, LocationUpdate::Denied);
        assert_eq!(
            session.location(),
            Some(Coordinates {
                latitude: 31.52,
                longitude: 74.35,
            })
        );
    }

    #[test]
    fn data_uri_prefix_is_recoverable() {
        let image = ImageAttachment {
            data_uri: "data:image/png;base64,QUJD".to_string(),
        };
        assert_eq!(image.mime_type(), "image/png");
        assert_eq!(image.payload(), "QUJD");

        let bare = ImageAttachment {
            data_uri: "QUJD".to_string(),
        };
        assert_eq!(bare.mime_type(), "image/jpeg");
        assert_eq!(bare.payload(), "QUJD");
    }
}
