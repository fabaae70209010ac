use serde::{Deserialize, Serialize};

/// One presentation unit. Replaced wholesale on edit, never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    /// Markdown shown on the slide.
    pub content: String,
    /// Keyword used to look up the background image (e.g. "dog").
    pub background_query: String,
    /// Speaker's notes.
    pub notes: String,
}

impl Slide {
    pub fn new(
        content: impl Into<String>,
        background_query: impl Into<String>,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            background_query: background_query.into(),
            notes: notes.into(),
        }
    }

    /// The slide every new deck starts with.
    pub fn welcome() -> Self {
        Self::new("# Welcome to our presentation!", "hello", "")
    }

    /// Empty slide inserted by the user's "new slide" control.
    pub fn blank() -> Self {
        Self::new("", "random", "")
    }
}

/// Serializable copy of the deck handed to agents as readable context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckSnapshot {
    pub slides: Vec<Slide>,
    pub current_index: usize,
}

impl DeckSnapshot {
    pub fn current(&self) -> Option<&Slide> {
        self.slides.get(self.current_index)
    }
}
