use std::fmt::Display;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::RoomError;

lazy_static! {
    static ref YOUTUBE_ID_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap();
    static ref FILE_REGEX: Regex =
        Regex::new(r"^file://([a-zA-Z0-9_/\\:-]+\.[a-zA-Z0-9_]+)$").unwrap();
    static ref URL_SCHEME_REGEX: Regex = Regex::new(r"^([a-zA-Z][a-zA-Z0-9+.-]*://)?").unwrap();
}

/// A reference to playable media that every client can resolve on its own.
///
/// Parsing is lenient with input (bare video ids, URLs without a scheme), but
/// the [Display] form is canonical, so two refs pointing at the same media
/// compare equal after a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MediaRef {
    YouTube(String),
    Remote(Url),
    File(String),
}

impl MediaRef {
    pub fn parse(input: &str) -> Result<Self, RoomError> {
        let input = input.trim();
        let invalid = || RoomError::InvalidMediaRef(input.to_string());

        if input.is_empty() {
            return Err(invalid());
        }

        if let Some(id) = input.strip_prefix("youtube:") {
            return youtube_id(id).ok_or_else(invalid);
        }

        if let Some(id) = youtube_id(input) {
            return Ok(id);
        }

        if let Some(path) = FILE_REGEX
            .captures(input)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
        {
            return Ok(Self::File(path.to_string()));
        }

        let has_scheme = URL_SCHEME_REGEX
            .find(input)
            .is_some_and(|m| !m.as_str().is_empty());

        let normalized = if has_scheme {
            input.to_string()
        } else {
            format!("https://{}", input)
        };

        let url = Url::parse(&normalized).map_err(|_| invalid())?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid());
        }

        // Without a scheme, a bare word would otherwise pass as a host
        let host_ok = match url.host() {
            Some(Host::Domain(domain)) => has_scheme || is_qualified(domain),
            Some(Host::Ipv4(_) | Host::Ipv6(_)) => true,
            None => false,
        };

        if !host_ok {
            return Err(invalid());
        }

        match youtube_id_from_url(&url) {
            Some(id) => Ok(id),
            None if is_youtube_host(&url) => Err(invalid()),
            None => Ok(Self::Remote(url)),
        }
    }

    /// The YouTube video id, if this refers to one
    pub fn youtube_id(&self) -> Option<&str> {
        match self {
            Self::YouTube(id) => Some(id),
            _ => None,
        }
    }
}

fn youtube_id(id: &str) -> Option<MediaRef> {
    YOUTUBE_ID_REGEX
        .is_match(id)
        .then(|| MediaRef::YouTube(id.to_string()))
}

fn is_qualified(domain: &str) -> bool {
    domain == "localhost" || domain.trim_end_matches('.').contains('.')
}

fn is_youtube_host(url: &Url) -> bool {
    url.host_str()
        .is_some_and(|h| h.ends_with("youtube.com") || h == "youtu.be")
}

fn youtube_id_from_url(url: &Url) -> Option<MediaRef> {
    let host = url.host_str()?;

    if host.ends_with("youtube.com") {
        // /watch?v=...
        if url.path().starts_with("/watch") {
            return url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .and_then(|(_, v)| youtube_id(&v));
        }

        // /v/... and /embed/...
        return url
            .path()
            .strip_prefix("/v/")
            .or_else(|| url.path().strip_prefix("/embed/"))
            .and_then(youtube_id);
    }

    if host == "youtu.be" {
        return youtube_id(url.path().trim_start_matches('/'));
    }

    None
}

impl Display for MediaRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::YouTube(id) => write!(f, "youtube:{}", id),
            Self::Remote(url) => write!(f, "{}", url),
            Self::File(path) => write!(f, "file://{}", path),
        }
    }
}

impl FromStr for MediaRef {
    type Err = RoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MediaRef {
    type Error = RoomError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MediaRef> for String {
    fn from(value: MediaRef) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yt(id: &str) -> MediaRef {
        MediaRef::YouTube(id.to_string())
    }

    #[test]
    fn parses_youtube_forms() {
        let id = "z09GolEktUw";

        assert_eq!(MediaRef::parse(id), Ok(yt(id)));
        assert_eq!(MediaRef::parse("youtube:z09GolEktUw"), Ok(yt(id)));
        assert_eq!(
            MediaRef::parse("https://www.youtube.com/watch?v=z09GolEktUw&feature=youtu.be"),
            Ok(yt(id))
        );
        assert_eq!(
            MediaRef::parse("www.youtube.com/watch?v=z09GolEktUw"),
            Ok(yt(id))
        );
        assert_eq!(MediaRef::parse("https://youtube.com/v/z09GolEktUw"), Ok(yt(id)));
        assert_eq!(MediaRef::parse("youtu.be/z09GolEktUw"), Ok(yt(id)));
    }

    #[test]
    fn parses_other_sources() {
        assert_eq!(
            MediaRef::parse("file://music/song.mp3"),
            Ok(MediaRef::File("music/song.mp3".to_string()))
        );

        let remote = MediaRef::parse("https://cdn.example.com/a.ogg").unwrap();
        assert_eq!(remote.to_string(), "https://cdn.example.com/a.ogg");
        assert!(remote.youtube_id().is_none());

        let bare = MediaRef::parse("cdn.example.com/b.ogg").unwrap();
        assert_eq!(bare.to_string(), "https://cdn.example.com/b.ogg");
        assert!(MediaRef::parse("localhost:8080/c.ogg").is_ok());
        assert!(MediaRef::parse("http://mediabox/d.ogg").is_ok());
    }

    #[test]
    fn bare_words_are_not_hosts() {
        for input in ["hello", "x", "song", "hello/world.mp3"] {
            assert_eq!(
                MediaRef::parse(input),
                Err(RoomError::InvalidMediaRef(input.to_string())),
                "{} should be rejected",
                input
            );
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(MediaRef::parse("").is_err());
        assert!(MediaRef::parse("   ").is_err());
        assert!(MediaRef::parse("not a url at all").is_err());
        assert!(MediaRef::parse("https://www.youtube.com/").is_err());
        assert!(MediaRef::parse("https://www.youtube.com/watch?v=short").is_err());
        assert!(MediaRef::parse("ftp://example.com/a.mp3").is_err());
        assert_eq!(
            MediaRef::parse("youtube:nope").unwrap_err().kind(),
            crate::ErrorKind::Validation
        );
    }

    #[test]
    fn serializes_canonically() {
        let parsed: MediaRef =
            serde_json::from_str("\"https://youtu.be/z09GolEktUw\"").unwrap();

        assert_eq!(
            serde_json::to_string(&parsed).unwrap(),
            "\"youtube:z09GolEktUw\""
        );
    }
}
