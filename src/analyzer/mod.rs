//! Text analysis: polarity scoring and entity extraction.
//!
//! Modules:
//! - lexicon: word-level sentiment scores with negation and intensifiers
//! - entities: regex-based DATE/TIME/MONEY/PERCENT/EMAIL/ORG extraction
//!
//! `TextAnalyzer::analyze` is a pure function of its input. Decoding a raw
//! message body (HTML or bytes) into text is the only fallible step.

pub mod entities;
pub mod lexicon;

use unicode_normalization::UnicodeNormalization;

use crate::types::{Entity, MessageBody};

use entities::EntityExtractor;

/// Column width handed to the HTML renderer. Wide enough that it never wraps prose.
const HTML_RENDER_WIDTH: usize = 400;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("Body looks like binary data ({0} NUL bytes)")]
    BinaryPayload(usize),
    #[error("HTML conversion failed: {0}")]
    HtmlConversion(String),
}

/// Output of a single analysis pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// Sentiment in [-1, 1]; 0.0 for text with no scored words.
    pub polarity: f64,
    pub entities: Vec<Entity>,
}

/// Loaded once per process and shared by the pipeline.
#[derive(Default)]
pub struct TextAnalyzer {
    extractor: EntityExtractor,
}

impl TextAnalyzer {
    pub fn new() -> Self {
        Self {
            extractor: EntityExtractor::new(),
        }
    }

    /// Score polarity and extract entities from already-decoded text.
    pub fn analyze(&self, text: &str) -> Analysis {
        let text = normalize(text);
        Analysis {
            polarity: lexicon::polarity(&text),
            entities: self.extractor.extract(&text),
        }
    }

    /// Turn a message body into the plain text that gets stored.
    ///
    /// Text bodies come back unchanged. Normalization only applies to the
    /// copy that is analyzed and classified.
    pub fn decode(&self, body: &MessageBody) -> Result<String, AnalysisError> {
        match body {
            MessageBody::Text(text) => Ok(text.clone()),
            MessageBody::Html(html) => html_to_text(html),
            MessageBody::Raw(bytes) => decode_bytes(bytes.clone()),
        }
    }
}

/// NFKC-normalize and fold typographic apostrophes so "don’t" tokenizes like "don't".
pub fn normalize(text: &str) -> String {
    text.nfkc()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect()
}

fn decode_bytes(bytes: Vec<u8>) -> Result<String, AnalysisError> {
    let nul_count = bytes.iter().filter(|&&b| b == 0).count();
    if nul_count > 0 {
        return Err(AnalysisError::BinaryPayload(nul_count));
    }
    Ok(String::from_utf8(bytes)?)
}

fn html_to_text(html: &str) -> Result<String, AnalysisError> {
    let text = html2text::from_read(html.as_bytes(), HTML_RENDER_WIDTH)
        .map_err(|e| AnalysisError::HtmlConversion(e.to_string()))?;
    Ok(text.trim().to_string())
}
