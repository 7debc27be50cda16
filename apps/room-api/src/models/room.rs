use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Language a freshly created room's editor starts in.
pub const DEFAULT_LANGUAGE: &str = "javascript";

/// Editor theme a freshly created room starts with.
pub const DEFAULT_THEME: &str = "vs-dark";

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub code: String,
    pub name: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub language: String,
    pub theme: String,
    pub content: String,
}

impl Room {
    pub fn new(id: String, code: String, name: String, is_public: bool) -> Self {
        Self {
            id,
            code,
            name,
            is_public,
            created_at: Utc::now(),
            language: DEFAULT_LANGUAGE.to_string(),
            theme: DEFAULT_THEME.to_string(),
            content: String::new(),
        }
    }

    /// Overwrite the fields present in `patch`.
    pub fn apply(&mut self, patch: RoomPatch) {
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(language) = patch.language {
            self.language = language;
        }
        if let Some(theme) = patch.theme {
            self.theme = theme;
        }
    }
}

/// Replacement values for a room's mutable editor state. `None` keeps the
/// current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomPatch {
    pub content: Option<String>,
    pub language: Option<String>,
    pub theme: Option<String>,
}

impl RoomPatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn language(language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            ..Self::default()
        }
    }

    pub fn theme(theme: impl Into<String>) -> Self {
        Self {
            theme: Some(theme.into()),
            ..Self::default()
        }
    }
}

/// A room as returned by the HTTP API, with the ids of the connections
/// currently present in it.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoomResponse {
    #[serde(flatten)]
    pub room: Room,
    pub users: Vec<String>,
}
