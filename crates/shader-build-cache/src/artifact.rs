//! Names of tracked shader sources.

use core::{borrow::Borrow, fmt, str::FromStr};

/// Character separating the name from the timestamp in the cache file.
pub const RECORD_SEPARATOR: char = ',';

/// Name of a tracked artifact: the file name of a shader source, without any directories.
///
/// A name is guaranteed to survive a trip through the cache file unchanged,
/// so it is never empty and never contains the [record separator](RECORD_SEPARATOR),
/// line breaks, path separators or surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[expect(clippy::module_name_repetitions, reason = "this is intended")]
pub struct ArtifactName(String);

impl ArtifactName {
    /// Validates the given string as an artifact name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name could not be stored in the cache file as is.
    #[inline]
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidArtifactNameError> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some(InvalidReason::Empty)
        } else if name.contains(RECORD_SEPARATOR) {
            Some(InvalidReason::Separator)
        } else if name.contains(['\n', '\r']) {
            Some(InvalidReason::LineBreak)
        } else if name.contains(['/', '\\']) {
            Some(InvalidReason::PathSeparator)
        } else if name.trim() != name {
            Some(InvalidReason::SurroundingWhitespace)
        } else {
            None
        };

        match reason {
            Some(reason) => Err(InvalidArtifactNameError { name, reason }),
            None => Ok(Self(name)),
        }
    }

    /// Returns the name as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self, returning the inner string.
    #[inline]
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ArtifactName {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArtifactName {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ArtifactName {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for ArtifactName {
    type Err = InvalidArtifactNameError;

    #[inline]
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::new(name)
    }
}

impl TryFrom<String> for ArtifactName {
    type Error = InvalidArtifactNameError;

    #[inline]
    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

impl TryFrom<&str> for ArtifactName {
    type Error = InvalidArtifactNameError;

    #[inline]
    fn try_from(name: &str) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

/// An error indicating that a string is not a valid [`ArtifactName`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid artifact name {name:?}: {reason}")]
pub struct InvalidArtifactNameError {
    /// The rejected name.
    name: String,
    /// Why it was rejected.
    reason: InvalidReason,
}

impl InvalidArtifactNameError {
    /// Returns the rejected name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Why an [`ArtifactName`] was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
enum InvalidReason {
    #[error("name is empty")]
    Empty,
    #[error("name contains the record separator `{RECORD_SEPARATOR}`")]
    Separator,
    #[error("name contains a line break")]
    LineBreak,
    #[error("name contains a path separator")]
    PathSeparator,
    #[error("name starts or ends with whitespace")]
    SurroundingWhitespace,
}
