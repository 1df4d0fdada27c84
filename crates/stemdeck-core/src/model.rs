use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

/// Name fragments that classify a stem, in precedence order.
pub const STEM_TYPE_KEYWORDS: [(&str, StemType); 3] = [
    ("drum", StemType::Drums),
    ("vocal", StemType::Vocals),
    ("bass", StemType::Bass),
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StemType {
    Drums,
    Vocals,
    Bass,
    Other,
}

impl StemType {
    pub const ALL: [Self; 4] = [Self::Drums, Self::Vocals, Self::Bass, Self::Other];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Drums => "drums",
            Self::Vocals => "vocals",
            Self::Bass => "bass",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for StemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[must_use]
pub fn detect_stem_type(name: &str) -> StemType {
    let lowered = name.to_lowercase();
    STEM_TYPE_KEYWORDS
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map_or(StemType::Other, |(_, kind)| *kind)
}

/// One isolated audio layer. Immutable once created; `kind` is derived from
/// the name at construction, including when deserialized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "WireStem")]
pub struct Stem {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: StemType,
}

impl Stem {
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        let name = name.into();
        let kind = detect_stem_type(&name);
        Self {
            name,
            path: path.into(),
            kind,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn kind(&self) -> StemType {
        self.kind
    }
}

/// Serialized stem shape. Any `type` field is ignored.
#[derive(Deserialize)]
struct WireStem {
    name: String,
    path: String,
}

impl From<WireStem> for Stem {
    fn from(wire: WireStem) -> Self {
        Self::new(wire.name, wire.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StemFilter {
    #[default]
    All,
    Only(StemType),
}

impl StemFilter {
    #[must_use]
    pub fn matches(self, stem: &Stem) -> bool {
        match self {
            Self::All => true,
            Self::Only(kind) => stem.kind() == kind,
        }
    }
}

impl FromStr for StemFilter {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.trim().to_ascii_lowercase();
        if lowered == "all" {
            return Ok(Self::All);
        }
        StemType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lowered)
            .map(Self::Only)
            .ok_or_else(|| format!("unknown stem filter '{value}'"))
    }
}

impl fmt::Display for StemFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(kind) => kind.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceFile {
    /// Server-assigned name; the only name used in later requests.
    pub server_name: String,
    /// Display only.
    pub original_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
}

/// A local file picked for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("upload")
            .to_string();
        Ok(Self { name, bytes })
    }

    #[must_use]
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|value| value.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// Style tags in selection order. Toggling a tag twice leaves the set unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SelectedStyles(Vec<String>);

impl SelectedStyles {
    /// Returns whether the tag is selected after the toggle.
    pub fn toggle(&mut self, tag: &str) -> bool {
        if let Some(index) = self.0.iter().position(|existing| existing == tag) {
            self.0.remove(index);
            false
        } else {
            self.0.push(tag.to_string());
            true
        }
    }

    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|existing| existing == tag)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}
