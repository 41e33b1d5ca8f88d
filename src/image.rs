//! Container image references.
//!
//! An `ImageRef` is `[domain/]path[:tag]`. Parsing is deliberately
//! lenient about what a path may contain; it only rejects strings that
//! cannot be split into those parts.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ImageError;

/// A first path element counts as a registry host when it is `localhost`,
/// has a dot in it, or carries a port.
static DOMAIN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:localhost|[^/:]+\.[^/:]+|[^/:]+:[0-9]+)$").unwrap()
});

/// Repository part of an image reference: optional registry host plus path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ImageName {
    pub domain: Option<String>,
    pub image: String,
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.domain {
            Some(domain) => write!(f, "{}/{}", domain, self.image),
            None => write!(f, "{}", self.image),
        }
    }
}

/// A parsed image reference. An empty tag renders without the `:tag` suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ImageRef {
    pub name: ImageName,
    pub tag: String,
}

impl ImageRef {
    /// Parse `[domain/]path[:tag]`.
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        if s.is_empty() {
            return Err(ImageError::Blank);
        }
        if s.starts_with('/') || s.ends_with('/') {
            return Err(ImageError::Malformed(s.to_string()));
        }

        let elements: Vec<&str> = s.split('/').collect();
        let (domain, path) = match elements.len() {
            1 => (None, s),
            2 if DOMAIN_REGEX.is_match(elements[0]) => (Some(elements[0]), elements[1]),
            2 => (None, s),
            _ => {
                let (domain, rest) = s.split_once('/').unwrap_or(("", s));
                (Some(domain), rest)
            }
        };

        let parts: Vec<&str> = path.split(':').collect();
        let (image, tag) = match parts.as_slice() {
            [image] => (*image, ""),
            [image, tag] if !image.is_empty() && !tag.is_empty() => (*image, *tag),
            _ => return Err(ImageError::Malformed(s.to_string())),
        };

        Ok(Self {
            name: ImageName {
                domain: domain.map(str::to_string),
                image: image.to_string(),
            },
            tag: tag.to_string(),
        })
    }

    /// Same repository, different tag.
    pub fn with_new_tag(&self, tag: impl Into<String>) -> Self {
        Self {
            name: self.name.clone(),
            tag: tag.into(),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tag.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.name, self.tag)
        }
    }
}

impl FromStr for ImageRef {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ImageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ImageRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
