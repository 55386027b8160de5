//! Fixed class catalog and the code → display name mapping.
//!
//! Corpus files are named `<code>_embeddings.<ext>` and the code is taken
//! from the text before the first `_`, so `Lung_Opacity_embeddings.json`
//! yields the code `Lung`. The display table is keyed on those short codes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassLabel {
    Covid,
    LungOpacity,
    Normal,
    ViralPneumonia,
}

impl ClassLabel {
    pub const ALL: [ClassLabel; 4] = [
        ClassLabel::Covid,
        ClassLabel::LungOpacity,
        ClassLabel::Normal,
        ClassLabel::ViralPneumonia,
    ];

    /// Internal code, as derived from corpus file names.
    pub fn code(self) -> &'static str {
        match self {
            ClassLabel::Covid => "COVID",
            ClassLabel::LungOpacity => "Lung",
            ClassLabel::Normal => "Normal",
            ClassLabel::ViralPneumonia => "Viral",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ClassLabel::Covid => "COVID-19",
            ClassLabel::LungOpacity => "Lung Opacity",
            ClassLabel::Normal => "Normal",
            ClassLabel::ViralPneumonia => "Viral Pneumonia",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|label| label.code() == code)
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ClassLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| format!("unknown class code: \"{s}\""))
    }
}

/// Human-readable name for a class code. Unknown codes are echoed back.
pub fn display_name(code: &str) -> &str {
    match ClassLabel::from_code(code) {
        Some(label) => label.display_name(),
        None => code,
    }
}

/// Display names of every supported class, in catalog order.
pub fn supported_classes() -> Vec<&'static str> {
    ClassLabel::ALL.iter().map(|l| l.display_name()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_to_pretty_names() {
        assert_eq!(display_name("COVID"), "COVID-19");
        assert_eq!(display_name("Lung"), "Lung Opacity");
        assert_eq!(display_name("Normal"), "Normal");
        assert_eq!(display_name("Viral"), "Viral Pneumonia");
    }

    #[test]
    fn unknown_code_passes_through_unchanged() {
        assert_eq!(display_name("Tuberculosis"), "Tuberculosis");
        assert_eq!(display_name(""), "");
        // Codes are case-sensitive, matching the corpus file names.
        assert_eq!(display_name("covid"), "covid");
    }

    #[test]
    fn code_round_trips_through_from_str() {
        for label in ClassLabel::ALL {
            assert_eq!(label.code().parse::<ClassLabel>().unwrap(), label);
        }
        assert!("Lung_Opacity".parse::<ClassLabel>().is_err());
    }

    #[test]
    fn supported_classes_lists_all_four() {
        assert_eq!(
            supported_classes(),
            vec!["COVID-19", "Lung Opacity", "Normal", "Viral Pneumonia"]
        );
    }
}
