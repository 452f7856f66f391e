use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Conversation languages the assistant can answer in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    Fr,
    En,
    Es,
    Ar,
    /// Moroccan Arabic (Darija).
    Ary,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unsupported language `{0}` (expected fr|en|es|ar|ary)")]
pub struct LanguageParseError(pub String);

impl Language {
    pub const ALL: [Language; 5] =
        [Language::Fr, Language::En, Language::Es, Language::Ar, Language::Ary];

    pub fn code(self) -> &'static str {
        match self {
            Self::Fr => "fr",
            Self::En => "en",
            Self::Es => "es",
            Self::Ar => "ar",
            Self::Ary => "ary",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = LanguageParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fr" | "fr-fr" => Ok(Self::Fr),
            "en" | "en-us" | "en-gb" => Ok(Self::En),
            "es" | "es-es" => Ok(Self::Es),
            "ar" => Ok(Self::Ar),
            "ary" | "darija" | "ar-ma" => Ok(Self::Ary),
            other => Err(LanguageParseError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Language;

    #[test]
    fn parses_codes_case_insensitively() {
        assert_eq!("FR".parse::<Language>(), Ok(Language::Fr));
        assert_eq!(" en ".parse::<Language>(), Ok(Language::En));
        assert_eq!("Darija".parse::<Language>(), Ok(Language::Ary));
        assert_eq!("ar-MA".parse::<Language>(), Ok(Language::Ary));
    }

    #[test]
    fn rejects_unknown_codes() {
        let error = "de".parse::<Language>().unwrap_err();
        assert!(error.to_string().contains("`de`"));
    }

    #[test]
    fn display_matches_code() {
        for language in Language::ALL {
            assert_eq!(language.to_string(), language.code());
        }
    }
}
