use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of a user, issued by the identity provider.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps a raw identifier without validation.
    ///
    /// Blank ids are representable so callers can report them as missing.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// Identifier of a video in the course catalog.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    /// Wraps a raw identifier without validation.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// Identifier of a course.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(String);

impl CourseId {
    /// Wraps a raw identifier without validation.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Debug for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VideoId({})", self.0)
    }
}

impl fmt::Debug for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CourseId({})", self.0)
    }
}

// ─── Display Implementations ───────────────────────────────────────────────────

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── FromStr Implementations ───────────────────────────────────────────────────

/// Error returned when parsing a blank identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} must not be blank")]
pub struct IdError {
    kind: &'static str,
}

impl IdError {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

fn parse_non_blank(s: &str, kind: &'static str) -> Result<String, IdError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(IdError { kind });
    }
    Ok(trimmed.to_owned())
}

impl FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_non_blank(s, "UserId").map(UserId)
    }
}

impl FromStr for VideoId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_non_blank(s, "VideoId").map(VideoId)
    }
}

impl FromStr for CourseId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_non_blank(s, "CourseId").map(CourseId)
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_whitespace() {
        let id: VideoId = "  vid-1 ".parse().unwrap();
        assert_eq!(id, VideoId::new("vid-1"));
        assert_eq!(id.to_string(), "vid-1");
    }

    #[test]
    fn parse_rejects_blank() {
        let err = "   ".parse::<UserId>().unwrap_err();
        assert_eq!(err.kind(), "UserId");
        assert_eq!(err.to_string(), "UserId must not be blank");
    }

    #[test]
    fn new_keeps_blank_for_precondition_checks() {
        assert!(UserId::new("").is_blank());
        assert!(!CourseId::new("c1").is_blank());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&CourseId::new("c-9")).unwrap();
        assert_eq!(json, "\"c-9\"");
    }
}
