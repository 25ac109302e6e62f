//! Language detection by script

use serde::{Deserialize, Serialize};

/// Languages the keyword tables and templates cover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Korean,
}

impl Language {
    /// Korean if any Hangul code point appears, English otherwise
    pub fn detect(text: &str) -> Self {
        if text.chars().any(is_hangul) {
            Language::Korean
        } else {
            Language::English
        }
    }

    /// Detect over title plus optional description
    pub fn detect_task(title: &str, description: Option<&str>) -> Self {
        match Self::detect(title) {
            Language::Korean => Language::Korean,
            Language::English => description.map(Self::detect).unwrap_or(Language::English),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Korean => "ko",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

fn is_hangul(c: char) -> bool {
    matches!(c, '\u{1100}'..='\u{11FF}' | '\u{3130}'..='\u{318F}' | '\u{AC00}'..='\u{D7A3}')
}
