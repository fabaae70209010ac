use slide_common::Slide;

use crate::deck::SlideDeck;

/// Scratch copy of one slide's fields. No validation; any string is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditBuffer {
    pub content: String,
    pub background_query: String,
    pub notes: String,
}

impl EditBuffer {
    pub fn from_slide(slide: &Slide) -> Self {
        Self {
            content: slide.content.clone(),
            background_query: slide.background_query.clone(),
            notes: slide.notes.clone(),
        }
    }

    pub fn to_slide(&self) -> Slide {
        Slide::new(
            self.content.clone(),
            self.background_query.clone(),
            self.notes.clone(),
        )
    }
}

/// Transient editor mirroring the deck's current slide.
///
/// While hidden the buffer follows the deck: every deck revision change
/// re-seeds it, so opening the overlay never shows edits made against a
/// different slide.
#[derive(Debug, Default)]
pub struct EditorOverlay {
    buffer: EditBuffer,
    visible: bool,
    seeded_revision: Option<u64>,
}

impl EditorOverlay {
    pub fn new(deck: &SlideDeck) -> Self {
        let mut overlay = Self::default();
        overlay.seed(deck);
        overlay
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn buffer(&self) -> &EditBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut EditBuffer {
        &mut self.buffer
    }

    pub fn open(&mut self, deck: &SlideDeck) {
        self.seed(deck);
        self.visible = true;
    }

    /// Open when hidden, cancel when visible.
    pub fn toggle(&mut self, deck: &SlideDeck) {
        if self.visible {
            self.cancel();
        } else {
            self.open(deck);
        }
    }

    /// Follow the deck while hidden. Returns whether the buffer was re-seeded.
    pub fn sync(&mut self, deck: &SlideDeck) -> bool {
        if self.visible || self.seeded_revision == Some(deck.revision()) {
            return false;
        }
        self.seed(deck);
        true
    }

    pub fn cancel(&mut self) {
        self.buffer = EditBuffer::default();
        self.seeded_revision = None;
        self.visible = false;
    }

    /// Commit the buffer into the deck's current slide and hide the overlay.
    pub fn save(&mut self, deck: &mut SlideDeck) {
        deck.update_current(self.buffer.to_slide());
        self.visible = false;
        self.seed(deck);
    }

    fn seed(&mut self, deck: &SlideDeck) {
        self.buffer = EditBuffer::from_slide(deck.current());
        self.seeded_revision = Some(deck.revision());
    }
}
