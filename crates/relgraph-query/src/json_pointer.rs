//! RFC 6901 JSON pointers over property payloads.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed JSON pointer, stored as unescaped segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JsonPointer {
    segments: Vec<String>,
}

impl JsonPointer {
    /// The root pointer (`""`), addressing the whole document.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse `/a/b~1c` style pointers.
    pub fn parse(pointer: &str) -> Result<Self, ConfigError> {
        if pointer.is_empty() {
            return Ok(Self::root());
        }
        let Some(rest) = pointer.strip_prefix('/') else {
            return Err(ConfigError::InvalidJsonPointer {
                pointer: pointer.to_string(),
                reason: "pointer must be empty or start with '/'",
            });
        };

        let mut segments = Vec::new();
        for raw in rest.split('/') {
            segments.push(unescape_segment(raw).ok_or_else(|| {
                ConfigError::InvalidJsonPointer {
                    pointer: pointer.to_string(),
                    reason: "'~' must be followed by '0' or '1'",
                }
            })?);
        }
        Ok(Self { segments })
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append the segments of `other` to this pointer.
    pub fn join(&self, other: &JsonPointer) -> JsonPointer {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        JsonPointer { segments }
    }

    /// Last segment, used to name extracted columns.
    pub fn leaf(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }
}

impl fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{}", segment.replace('~', "~0").replace('/', "~1"))?;
        }
        Ok(())
    }
}

impl TryFrom<String> for JsonPointer {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JsonPointer> for String {
    fn from(value: JsonPointer) -> Self {
        value.to_string()
    }
}

fn unescape_segment(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// True when a segment addresses an array element.
pub fn is_array_index(segment: &str) -> bool {
    !segment.is_empty()
        && segment.chars().all(|c| c.is_ascii_digit())
        && (segment == "0" || !segment.starts_with('0'))
}
