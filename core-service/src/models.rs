//! Domain models for feed streams
//!
//! Every model is cached as JSON and keyed by its remote id, so all of them
//! implement [`Identifiable`] and serde.

use chrono::{DateTime, Utc};
use core_cache::Identifiable;
use serde::{Deserialize, Serialize};

// =============================================================================
// Track
// =============================================================================

/// Where a track is streamed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    YouTube,
    SoundCloud,
    Custom,
}

/// A playable track linked from a feed entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub provider: Provider,
    /// Provider-specific identifier, e.g. a video id
    pub identifier: String,
    pub title: String,
    pub artist: Option<String>,
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration_secs: Option<u32>,
    pub liked: bool,
}

impl Track {
    pub fn new(
        provider: Provider,
        identifier: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let identifier = identifier.into();
        Self {
            id: Self::make_id(provider, &identifier),
            provider,
            identifier,
            title: title.into(),
            artist: None,
            url: None,
            thumbnail_url: None,
            duration_secs: None,
            liked: false,
        }
    }

    /// Stable id shared by every entry that links the same media.
    pub fn make_id(provider: Provider, identifier: &str) -> String {
        let prefix = match provider {
            Provider::YouTube => "youtube",
            Provider::SoundCloud => "soundcloud",
            Provider::Custom => "custom",
        };
        format!("{}:{}", prefix, identifier)
    }
}

impl Identifiable for Track {
    fn id(&self) -> &str {
        &self.id
    }
}

// =============================================================================
// Album
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub title: String,
    pub artist: Option<String>,
    pub thumbnail_url: Option<String>,
    pub tracks: Vec<Track>,
    pub liked: bool,
}

impl Identifiable for Album {
    fn id(&self) -> &str {
        &self.id
    }
}

// =============================================================================
// Playlist
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub tracks: Vec<Track>,
}

impl Playlist {
    /// Playlist assembled from the tracks an entry links to.
    pub fn for_entry(entry: &Entry, tracks: Vec<Track>) -> Self {
        Self {
            id: format!("entry:{}", entry.id),
            title: entry.title.clone(),
            thumbnail_url: entry.visual_url.clone(),
            tracks,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl Identifiable for Playlist {
    fn id(&self) -> &str {
        &self.id
    }
}

// =============================================================================
// Entry
// =============================================================================

/// A feed entry. Its playable content is resolved separately into a
/// [`Playlist`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub origin_title: Option<String>,
    pub visual_url: Option<String>,
    pub published: DateTime<Utc>,
    pub unread: bool,
    pub saved: bool,
}

impl Entry {
    pub fn new(id: impl Into<String>, title: impl Into<String>, published: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: None,
            origin_title: None,
            visual_url: None,
            published,
            unread: true,
            saved: false,
        }
    }

    /// Copy of this entry marked as read, ready to publish as a change.
    pub fn marked_read(&self) -> Self {
        Self {
            unread: false,
            ..self.clone()
        }
    }
}

impl Identifiable for Entry {
    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_id_is_stable_per_provider() {
        let a = Track::new(Provider::YouTube, "abc", "First");
        let b = Track::new(Provider::YouTube, "abc", "Renamed");
        let c = Track::new(Provider::SoundCloud, "abc", "First");

        assert_eq!(a.id(), "youtube:abc");
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_playlist_for_entry() {
        let entry = Entry::new("e1", "Weekly picks", Utc::now());
        let playlist = Playlist::for_entry(&entry, vec![Track::new(Provider::Custom, "x", "X")]);

        assert_eq!(playlist.id(), "entry:e1");
        assert_eq!(playlist.title, "Weekly picks");
        assert!(!playlist.is_empty());
    }

    #[test]
    fn test_marked_read_keeps_identity() {
        let entry = Entry::new("e1", "Title", Utc::now());
        let read = entry.marked_read();

        assert_eq!(read.id(), entry.id());
        assert!(entry.unread);
        assert!(!read.unread);
    }
}
