use std::fmt::{self, Write};

use chrono::{DateTime, Datelike, Utc};

/// Object that carries the persisted cursor as metadata.
pub const LATEST_KEY: &str = "latest.jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Original,
    Transcoded,
}

impl ArtifactFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactFormat::Original => "jpg",
            ArtifactFormat::Transcoded => "webp",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ArtifactFormat::Original => "image/jpeg",
            ArtifactFormat::Transcoded => "image/webp",
        }
    }
}

/// Date-partitioned object key: `YYYY/MM/DD/<id>.<ext>`, using the UTC date.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn new(created_at: &DateTime<Utc>, id: u64, format: ArtifactFormat) -> Self {
        // "YYYY/MM/DD/" + up to 20 digits + ".webp"
        let mut key = String::with_capacity(36);
        let _ = write!(
            key,
            "{:04}/{:02}/{:02}/{}.{}",
            created_at.year(),
            created_at.month(),
            created_at.day(),
            id,
            format.extension()
        );
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
