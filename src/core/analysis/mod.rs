//! Keyword-based theme detection and intensity scoring for stories.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ThemeCategory {
    Psychological,
    Supernatural,
    Cosmic,
    Gore,
    BodyHorror,
    Folk,
    Survival,
    Technological,
}

impl ThemeCategory {
    pub const ALL: [ThemeCategory; 8] = [
        ThemeCategory::Psychological,
        ThemeCategory::Supernatural,
        ThemeCategory::Cosmic,
        ThemeCategory::Gore,
        ThemeCategory::BodyHorror,
        ThemeCategory::Folk,
        ThemeCategory::Survival,
        ThemeCategory::Technological,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Psychological => "psychological",
            Self::Supernatural => "supernatural",
            Self::Cosmic => "cosmic",
            Self::Gore => "gore",
            Self::BodyHorror => "body-horror",
            Self::Folk => "folk",
            Self::Survival => "survival",
            Self::Technological => "technological",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|theme| theme.as_str() == value.trim().to_lowercase())
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Psychological => &[
                "paranoia", "madness", "insane", "insanity", "hallucination", "delusion",
                "obsession", "nightmare", "memory", "whisper", "voices", "sanity",
            ],
            Self::Supernatural => &[
                "ghost", "spirit", "haunted", "haunting", "demon", "possessed", "possession",
                "curse", "cursed", "poltergeist", "apparition", "witch", "exorcism",
            ],
            Self::Cosmic => &[
                "void", "abyss", "eldritch", "stars", "ancient", "unknowable", "cosmos",
                "tentacle", "dimension", "cult", "incomprehensible",
            ],
            Self::Gore => &[
                "blood", "bloody", "gore", "entrails", "severed", "butcher", "carcass",
                "dismembered", "slaughter", "corpse", "flesh",
            ],
            Self::BodyHorror => &[
                "mutation", "mutated", "parasite", "skin", "bones", "infection", "rot",
                "rotting", "transformation", "teeth", "swelling",
            ],
            Self::Folk => &[
                "village", "ritual", "harvest", "woods", "forest", "pagan", "festival",
                "sacrifice", "folklore", "elders", "scarecrow",
            ],
            Self::Survival => &[
                "hunted", "escape", "trapped", "survive", "survival", "wilderness",
                "starving", "predator", "chase", "hiding",
            ],
            Self::Technological => &[
                "machine", "signal", "static", "screen", "computer", "algorithm", "network",
                "broadcast", "glitch", "transmission", "android",
            ],
        }
    }

    fn weight(&self) -> f32 {
        match self {
            Self::Gore | Self::BodyHorror => 1.5,
            Self::Survival | Self::Supernatural => 1.2,
            _ => 1.0,
        }
    }
}

impl fmt::Display for ThemeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentAnalysis {
    pub theme: Option<ThemeCategory>,
    /// 0 (no horror vocabulary) to 10.
    pub intensity: u8,
    pub matched_keywords: Vec<String>,
}

/// Scores plain text against each theme's vocabulary.
pub fn analyze(text: &str) -> ContentAnalysis {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric() && c != '\'' && c != '-')
        .filter(|word| !word.is_empty())
        .map(|word| word.trim_matches(|c| c == '\'' || c == '-').to_lowercase())
        .filter(|word| !word.is_empty())
        .collect();
    if words.is_empty() {
        return ContentAnalysis {
            theme: None,
            intensity: 0,
            matched_keywords: Vec::new(),
        };
    }

    let mut hits: HashMap<ThemeCategory, usize> = HashMap::new();
    let mut matched_keywords = Vec::new();
    let mut weighted_hits = 0.0_f32;
    for word in &words {
        for theme in ThemeCategory::ALL {
            if theme.keywords().contains(&word.as_str()) {
                *hits.entry(theme).or_default() += 1;
                weighted_hits += theme.weight();
                if !matched_keywords.contains(word) {
                    matched_keywords.push(word.clone());
                }
            }
        }
    }

    let mut theme = None;
    let mut best = 0_usize;
    for candidate in ThemeCategory::ALL {
        let count = hits.get(&candidate).copied().unwrap_or_default();
        if count > best {
            best = count;
            theme = Some(candidate);
        }
    }

    let density = weighted_hits * 100.0 / words.len() as f32;
    let intensity = (density * 2.0).round().clamp(0.0, 10.0) as u8;
    let intensity = if theme.is_some() { intensity.max(1) } else { 0 };

    ContentAnalysis {
        theme,
        intensity,
        matched_keywords,
    }
}
