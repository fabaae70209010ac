use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use slide_common::{DeckSnapshot, Slide};

/// Deck shared between the gateway, the presenter and the view.
pub type SharedDeck = Arc<Mutex<SlideDeck>>;

pub fn shared(deck: SlideDeck) -> SharedDeck {
    Arc::new(Mutex::new(deck))
}

/// Lock the shared deck. Every deck operation is total, so a poisoned lock
/// still guards a valid deck.
pub fn lock(deck: &SharedDeck) -> MutexGuard<'_, SlideDeck> {
    deck.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ordered slides plus the current-position cursor.
///
/// Invariants: the deck is never empty and `current < slides.len()`.
#[derive(Debug, Clone)]
pub struct SlideDeck {
    slides: Vec<Slide>,
    current: usize,
    revision: u64,
}

impl Default for SlideDeck {
    fn default() -> Self {
        Self::new()
    }
}

impl SlideDeck {
    /// A deck holding only the welcome slide.
    pub fn new() -> Self {
        Self::with_slide(Slide::welcome())
    }

    pub fn with_slide(slide: Slide) -> Self {
        Self {
            slides: vec![slide],
            current: 0,
            revision: 0,
        }
    }

    /// Returns `None` for an empty slide list.
    pub fn from_slides(slides: Vec<Slide>) -> Option<Self> {
        if slides.is_empty() {
            return None;
        }
        Some(Self {
            slides,
            current: 0,
            revision: 0,
        })
    }

    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &Slide {
        &self.slides[self.current]
    }

    /// Bumped on every state change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn can_delete(&self) -> bool {
        self.slides.len() > 1
    }

    pub fn can_move_prev(&self) -> bool {
        self.current > 0
    }

    pub fn can_move_next(&self) -> bool {
        self.current + 1 < self.slides.len()
    }

    /// Insert right after the cursor and move the cursor onto the new slide.
    pub fn insert_after_current(&mut self, slide: Slide) {
        self.slides.insert(self.current + 1, slide);
        self.current += 1;
        self.touch();
    }

    pub fn update_current(&mut self, slide: Slide) {
        self.slides[self.current] = slide;
        self.touch();
    }

    /// Remove the current slide and rewind the cursor to the first slide.
    ///
    /// Refused on a single-slide deck; returns whether anything was removed.
    pub fn delete_current(&mut self) -> bool {
        if !self.can_delete() {
            return false;
        }
        self.slides.remove(self.current);
        self.go_to(0);
        self.touch();
        true
    }

    pub fn move_prev(&mut self) -> bool {
        if !self.can_move_prev() {
            return false;
        }
        self.current -= 1;
        self.touch();
        true
    }

    pub fn move_next(&mut self) -> bool {
        if !self.can_move_next() {
            return false;
        }
        self.current += 1;
        self.touch();
        true
    }

    /// Move the cursor to `index`, clamped to the last slide.
    pub fn go_to(&mut self, index: usize) {
        let clamped = index.min(self.slides.len() - 1);
        if clamped != self.current {
            self.current = clamped;
            self.touch();
        }
    }

    pub fn snapshot(&self) -> DeckSnapshot {
        DeckSnapshot {
            slides: self.slides.clone(),
            current_index: self.current,
        }
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slide(content: &str) -> Slide {
        Slide::new(content, "", "")
    }

    fn deck_of(contents: &[&str]) -> SlideDeck {
        SlideDeck::from_slides(contents.iter().map(|c| slide(c)).collect()).unwrap()
    }

    fn contents(deck: &SlideDeck) -> Vec<&str> {
        deck.slides().iter().map(|s| s.content.as_str()).collect()
    }

    fn assert_invariants(deck: &SlideDeck) {
        assert!(!deck.slides().is_empty());
        assert!(deck.current_index() < deck.len());
    }

    #[test]
    fn new_deck_has_welcome_slide() {
        let deck = SlideDeck::new();
        assert_eq!(deck.len(), 1);
        assert_eq!(deck.current_index(), 0);
        assert_eq!(deck.current().content, "# Welcome to our presentation!");
    }

    #[test]
    fn from_slides_rejects_empty() {
        assert!(SlideDeck::from_slides(Vec::new()).is_none());
    }

    #[test]
    fn insert_lands_after_cursor() {
        let mut deck = deck_of(&["a", "b", "c"]);
        deck.move_next();
        deck.insert_after_current(slide("x"));

        assert_eq!(contents(&deck), vec!["a", "b", "x", "c"]);
        assert_eq!(deck.current_index(), 2);
        assert_eq!(deck.current().content, "x");
    }

    #[test]
    fn add_slide_to_welcome_deck() {
        let mut deck = SlideDeck::with_slide(slide("# Welcome"));
        deck.insert_after_current(Slide::new("# Point 1", "dog", "notes1"));

        assert_eq!(deck.len(), 2);
        assert_eq!(deck.current_index(), 1);
        assert_eq!(deck.slides()[1].content, "# Point 1");
    }

    #[test]
    fn update_replaces_only_current() {
        let mut deck = deck_of(&["a", "b"]);
        deck.move_next();
        deck.update_current(Slide::new("B", "cat", "n"));
        assert_eq!(contents(&deck), vec!["a", "B"]);
        assert_eq!(deck.current().background_query, "cat");
    }

    #[test]
    fn delete_last_of_two_resets_cursor() {
        let mut deck = deck_of(&["a", "b"]);
        deck.move_next();
        assert!(deck.delete_current());
        assert_eq!(deck.len(), 1);
        assert_eq!(deck.current_index(), 0);
        assert_eq!(contents(&deck), vec!["a"]);
    }

    #[test]
    fn delete_on_single_slide_is_refused() {
        let mut deck = SlideDeck::new();
        let before = deck.snapshot();
        let revision = deck.revision();

        assert!(!deck.delete_current());
        assert_eq!(deck.snapshot(), before);
        assert_eq!(deck.revision(), revision);
    }

    #[test]
    fn delete_from_middle_goes_to_first() {
        let mut deck = deck_of(&["a", "b", "c", "d"]);
        deck.go_to(2);
        assert!(deck.delete_current());
        assert_eq!(contents(&deck), vec!["a", "b", "d"]);
        assert_eq!(deck.current_index(), 0);
    }

    #[test]
    fn navigation_clamps_at_ends() {
        let mut deck = deck_of(&["a", "b"]);
        assert!(!deck.move_prev());
        assert_eq!(deck.current_index(), 0);
        assert!(deck.move_next());
        assert!(!deck.move_next());
        assert_eq!(deck.current_index(), 1);
        assert!(deck.move_prev());
        assert_eq!(deck.current_index(), 0);
    }

    #[test]
    fn go_to_clamps() {
        let mut deck = deck_of(&["a", "b", "c"]);
        deck.go_to(42);
        assert_eq!(deck.current_index(), 2);
        deck.go_to(0);
        assert_eq!(deck.current_index(), 0);
    }

    #[test]
    fn revision_tracks_changes() {
        let mut deck = deck_of(&["a", "b"]);
        let r0 = deck.revision();
        deck.move_prev();
        assert_eq!(deck.revision(), r0);
        deck.move_next();
        assert!(deck.revision() > r0);
    }

    #[test]
    fn invariants_hold_under_mixed_operations() {
        let mut deck = SlideDeck::new();
        // deterministic pseudo-random walk over all operations
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        for step in 0..2_000 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let len_before = deck.len();
            let cursor_before = deck.current_index();
            match seed % 6 {
                0 => {
                    deck.insert_after_current(slide(&format!("s{step}")));
                    assert_eq!(deck.len(), len_before + 1);
                    assert_eq!(deck.current_index(), cursor_before + 1);
                }
                1 => deck.update_current(slide("u")),
                2 => {
                    let removed = deck.delete_current();
                    if len_before == 1 {
                        assert!(!removed);
                        assert_eq!(deck.len(), 1);
                    } else {
                        assert_eq!(deck.len(), len_before - 1);
                    }
                }
                3 => {
                    deck.move_prev();
                }
                4 => {
                    deck.move_next();
                }
                _ => deck.go_to((seed >> 8) as usize % (len_before + 3)),
            }
            assert_invariants(&deck);
        }
    }

    #[test]
    fn shared_lock_round_trips() {
        let deck = shared(SlideDeck::new());
        lock(&deck).insert_after_current(slide("x"));
        assert_eq!(lock(&deck).len(), 2);
    }
}
