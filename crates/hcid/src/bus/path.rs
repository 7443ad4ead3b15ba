//! Validated hierarchical object paths.

use std::fmt;

use thiserror::Error;

/// Errors raised when a string is not a well-formed object path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid object path '{path}': {reason}")]
pub struct PathError {
    path: String,
    reason: &'static str,
}

impl PathError {
    fn new(path: &str, reason: &'static str) -> Self {
        Self {
            path: path.to_owned(),
            reason,
        }
    }
}

/// A slash-separated path naming an endpoint on the bus.
///
/// Paths start with `/`, contain no empty segments, and use only ASCII
/// alphanumerics and `_` inside segments. The root path is `/`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Parses and validates a path.
    pub fn parse(input: &str) -> Result<Self, PathError> {
        validate(input)?;
        Ok(Self(input.to_owned()))
    }

    /// Builds a path from a literal known to be well formed.
    pub(crate) fn from_static(path: &'static str) -> Self {
        debug_assert!(validate(path).is_ok(), "malformed static path {path}");
        Self(path.to_owned())
    }

    /// The root path `/`.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_owned())
    }

    /// Borrows the path text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for `/`.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Iterates the path segments from the root downwards.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }

    /// Final segment, or `None` for the root.
    #[must_use]
    pub fn last_segment(&self) -> Option<&str> {
        self.segments().last()
    }

    /// Number of segments below the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Parent path, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(index) => self.0.get(..index).map(|parent| Self(parent.to_owned())),
            None => None,
        }
    }

    /// Appends exactly one segment.
    ///
    /// `segment` must be non-empty and free of `/`.
    pub fn child(&self, segment: &str) -> Result<Self, PathError> {
        if segment.is_empty() || segment.contains('/') {
            return Err(PathError::new(
                &format!("{}/{segment}", self.0.trim_end_matches('/')),
                "child must be a single segment",
            ));
        }
        let joined = if self.is_root() {
            format!("/{segment}")
        } else {
            format!("{}/{segment}", self.0)
        };
        Self::parse(&joined)
    }

    /// Returns `true` when `other` lies strictly below `self`.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.relative_segments(other).is_some_and(|mut rest| rest.next().is_some())
    }

    /// First segment of `descendant` below `self`.
    #[must_use]
    pub fn next_segment_toward<'a>(&self, descendant: &'a Self) -> Option<&'a str> {
        self.relative_segments(descendant)?.next()
    }

    fn relative_segments<'a>(&self, other: &'a Self) -> Option<impl Iterator<Item = &'a str>> {
        let rest = if self.is_root() {
            other.0.strip_prefix('/')?
        } else {
            let tail = other.0.strip_prefix(self.0.as_str())?;
            if tail.is_empty() {
                tail
            } else {
                tail.strip_prefix('/')?
            }
        };
        Some(rest.split('/').filter(|segment| !segment.is_empty()))
    }
}

fn validate(input: &str) -> Result<(), PathError> {
    if !input.starts_with('/') {
        return Err(PathError::new(input, "must start with '/'"));
    }
    if input == "/" {
        return Ok(());
    }
    if input.ends_with('/') {
        return Err(PathError::new(input, "trailing '/' is not allowed"));
    }
    for segment in input.split('/').skip(1) {
        if segment.is_empty() {
            return Err(PathError::new(input, "empty segment"));
        }
        if !segment
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        {
            return Err(PathError::new(input, "segments use [A-Za-z0-9_] only"));
        }
    }
    Ok(())
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}
