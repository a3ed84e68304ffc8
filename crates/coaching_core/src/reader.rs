//! crates/coaching_core/src/reader.rs
//!
//! The e-book reader: a fixed, ordered chapter list, one chapter at a time.
//! Chapter 1 is free; every other chapter needs an active subscription. The
//! position is mirrored into a `chapter` query parameter after each move.

use serde::Serialize;

/// Name of the query parameter carrying the current chapter.
pub const CHAPTER_PARAM: &str = "chapter";

pub const MIN_ZOOM: f32 = 0.5;
pub const MAX_ZOOM: f32 = 2.0;
pub const ZOOM_STEP: f32 = 0.1;

/// A user-visible reason a move did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum ReaderNotice {
    /// The chapter exists but needs a subscription.
    Locked { chapter: u32 },
    /// Already at the first or last chapter.
    OutOfBounds { chapter: u32 },
}

impl ReaderNotice {
    pub fn message(&self) -> String {
        match self {
            ReaderNotice::Locked { chapter } => format!(
                "Chapter {} is available to subscribers. Subscribe to keep reading.",
                chapter
            ),
            ReaderNotice::OutOfBounds { .. } => "There are no more chapters in that direction.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Moved(u32),
    Refused(ReaderNotice),
}

/// One title in the book.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chapter {
    pub number: u32,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reader {
    chapter: u32,
    chapter_count: u32,
    subscribed: bool,
    zoom: f32,
    controls_visible: bool,
}

impl Reader {
    /// Opens the reader at the chapter named in `query` (e.g. `"chapter=3&x=1"`).
    ///
    /// Missing, malformed or out-of-range values open chapter 1. A locked
    /// chapter also opens chapter 1, together with a `Locked` notice.
    pub fn open(chapter_count: u32, subscribed: bool, query: Option<&str>) -> (Self, Option<ReaderNotice>) {
        let mut reader = Self {
            chapter: 1,
            chapter_count: chapter_count.max(1),
            subscribed,
            zoom: 1.0,
            controls_visible: true,
        };

        let requested = query.and_then(parse_chapter_param);
        let notice = match requested {
            Some(n) if n >= 1 && n <= reader.chapter_count => {
                if reader.accessible(n) {
                    reader.chapter = n;
                    None
                } else {
                    Some(ReaderNotice::Locked { chapter: n })
                }
            }
            _ => None,
        };
        (reader, notice)
    }

    pub fn chapter(&self) -> u32 {
        self.chapter
    }

    pub fn chapter_count(&self) -> u32 {
        self.chapter_count
    }

    pub fn accessible(&self, chapter: u32) -> bool {
        chapter == 1 || self.subscribed
    }

    /// Subscription changes take effect on the next move.
    pub fn set_subscribed(&mut self, subscribed: bool) {
        self.subscribed = subscribed;
    }

    pub fn next(&mut self) -> Navigation {
        self.jump(self.chapter.saturating_add(1))
    }

    pub fn prev(&mut self) -> Navigation {
        if self.chapter <= 1 {
            return Navigation::Refused(ReaderNotice::OutOfBounds { chapter: 0 });
        }
        self.jump(self.chapter - 1)
    }

    /// Bounds are checked before access.
    pub fn jump(&mut self, chapter: u32) -> Navigation {
        if chapter < 1 || chapter > self.chapter_count {
            return Navigation::Refused(ReaderNotice::OutOfBounds { chapter });
        }
        if !self.accessible(chapter) {
            return Navigation::Refused(ReaderNotice::Locked { chapter });
        }
        self.chapter = chapter;
        Navigation::Moved(chapter)
    }

    /// The query string to write back into the URL.
    pub fn query(&self) -> String {
        format!("{}={}", CHAPTER_PARAM, self.chapter)
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn zoom_in(&mut self) -> f32 {
        self.set_zoom(self.zoom + ZOOM_STEP)
    }

    pub fn zoom_out(&mut self) -> f32 {
        self.set_zoom(self.zoom - ZOOM_STEP)
    }

    pub fn set_zoom(&mut self, zoom: f32) -> f32 {
        // Round to one decimal so repeated steps do not drift.
        self.zoom = ((zoom.clamp(MIN_ZOOM, MAX_ZOOM)) * 10.0).round() / 10.0;
        self.zoom
    }

    pub fn controls_visible(&self) -> bool {
        self.controls_visible
    }

    pub fn toggle_controls(&mut self) -> bool {
        self.controls_visible = !self.controls_visible;
        self.controls_visible
    }
}

/// Reads the `chapter` value from a raw query string.
pub fn parse_chapter_param(query: &str) -> Option<u32> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query.trim_start_matches('?')).ok()?;
    pairs
        .into_iter()
        .find(|(key, _)| key == CHAPTER_PARAM)
        .and_then(|(_, value)| value.trim().parse().ok())
}
