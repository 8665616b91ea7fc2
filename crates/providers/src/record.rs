//! The record shape of Gemini's `streamGenerateContent` responses.
//!
//! Every field is optional. Text is taken from the first part of the first
//! candidate's content; anything missing along that path yields `""`.

use serde::Deserialize;
use tracing::trace;

/// One streamed response record.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct GenerationRecord {
    #[serde(default)]
    pub candidates: Option<Vec<Candidate>>,

    /// Present when the service reports a failure inside the stream.
    #[serde(default)]
    pub error: Option<RecordError>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Option<Vec<Part>>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct RecordError {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl GenerationRecord {
    /// Parse one raw JSON record. Unparseable input degrades to an empty record.
    pub fn parse(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|e| {
            trace!(data = %raw, error = %e, "Unparseable generation record");
            Self::default()
        })
    }

    /// `candidates[0].content.parts[0].text`, or `""` if any link is absent.
    pub fn text(&self) -> &str {
        self.candidates
            .as_deref()
            .and_then(|c| c.first())
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.as_deref())
            .and_then(|p| p.first())
            .and_then(|p| p.text.as_deref())
            .unwrap_or("")
    }
}
