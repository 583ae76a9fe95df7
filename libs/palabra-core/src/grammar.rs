//! Grammar rules and the short tips shown alongside cards and lessons.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Explanation length of a tip shown for a single card.
pub const CARD_TIP_MAX_LEN: usize = 200;
/// Explanation length of a tip shown before a lesson.
pub const LESSON_TIP_MAX_LEN: usize = 150;
pub const LESSON_TIP_MAX_EXAMPLES: usize = 2;
pub const MAX_LESSON_TIPS: usize = 2;

pub const FALLBACK_TIP_TITLE: &str = "Grammar";
pub const FALLBACK_TIP_TEXT: &str = "Grammar information not available for this card.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarExample {
    pub spanish: String,
    pub english: String,
}

/// A stored grammar rule, unique by `rule_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarRule {
    pub id: i64,
    pub rule_key: String,
    pub title: String,
    pub explanation: String,
    pub examples: Vec<GrammarExample>,
    pub difficulty: i64,
    pub created_at: DateTime<Utc>,
}

fn default_difficulty() -> i64 {
    1
}

/// A rule as generated, before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGrammarRule {
    pub rule_key: String,
    pub title: String,
    pub explanation: String,
    #[serde(default)]
    pub examples: Vec<GrammarExample>,
    #[serde(default = "default_difficulty")]
    pub difficulty: i64,
}

impl NewGrammarRule {
    pub fn is_well_formed(&self) -> bool {
        !normalize_rule_key(&self.rule_key).is_empty()
            && !self.title.trim().is_empty()
            && !self.explanation.trim().is_empty()
    }

    /// Same rule with its key normalized and difficulty clamped to 1..=5.
    pub fn normalized(mut self) -> Self {
        self.rule_key = normalize_rule_key(&self.rule_key);
        self.title = self.title.trim().to_string();
        self.explanation = self.explanation.trim().to_string();
        self.difficulty = self.difficulty.clamp(1, 5);
        self
    }
}

/// Lowercase snake_case key, e.g. `Present Tense AR` becomes `present_tense_ar`.
pub fn normalize_rule_key(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// A short explanation for display next to a card or before a lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarTip {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_key: Option<String>,
    pub title: String,
    pub short_explanation: String,
    pub examples: Vec<GrammarExample>,
}

impl GrammarTip {
    pub fn from_rule(rule: &GrammarRule, max_len: usize, max_examples: usize) -> Self {
        Self {
            rule_key: Some(rule.rule_key.clone()),
            title: rule.title.clone(),
            short_explanation: truncate(&rule.explanation, max_len),
            examples: rule.examples.iter().take(max_examples).cloned().collect(),
        }
    }

    /// Shown when a card has no rule and none could be generated.
    pub fn fallback() -> Self {
        Self {
            rule_key: None,
            title: FALLBACK_TIP_TITLE.to_string(),
            short_explanation: FALLBACK_TIP_TEXT.to_string(),
            examples: Vec::new(),
        }
    }
}

/// Tips for the rules linked to a lesson's cards, in card order, one per
/// rule key and at most [`MAX_LESSON_TIPS`].
pub fn lesson_tips<'a, I>(rules: I) -> Vec<GrammarTip>
where
    I: IntoIterator<Item = &'a GrammarRule>,
{
    let mut seen = HashSet::new();
    rules
        .into_iter()
        .filter(|rule| seen.insert(rule.rule_key.clone()))
        .take(MAX_LESSON_TIPS)
        .map(|rule| GrammarTip::from_rule(rule, LESSON_TIP_MAX_LEN, LESSON_TIP_MAX_EXAMPLES))
        .collect()
}

/// Rules of one difficulty level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrammarLevel {
    pub difficulty: i64,
    pub rules: Vec<GrammarRule>,
}

/// Group rules by difficulty, easiest first. Order within a level is kept.
pub fn group_by_difficulty(rules: Vec<GrammarRule>) -> Vec<GrammarLevel> {
    let mut levels: Vec<GrammarLevel> = Vec::new();
    for rule in rules {
        match levels.iter_mut().find(|level| level.difficulty == rule.difficulty) {
            Some(level) => level.rules.push(rule),
            None => levels.push(GrammarLevel {
                difficulty: rule.difficulty,
                rules: vec![rule],
            }),
        }
    }
    levels.sort_by_key(|level| level.difficulty);
    levels
}

/// Cut `text` to at most `max_chars` characters, ending in `...` when cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rule(id: i64, key: &str, difficulty: i64) -> GrammarRule {
        GrammarRule {
            id,
            rule_key: key.to_string(),
            title: format!("Rule {}", key),
            explanation: "x".repeat(180),
            examples: (0..3)
                .map(|i| GrammarExample {
                    spanish: format!("Ejemplo {}", i),
                    english: format!("Example {}", i),
                })
                .collect(),
            difficulty,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate("corto", 10), "corto");
        assert_eq!(truncate("canción bonita", 10), "canción...");
        assert_eq!(truncate("ñññññ", 5), "ñññññ");
    }

    #[test]
    fn card_tip_keeps_every_example() {
        let tip = GrammarTip::from_rule(&rule(1, "ser_estar", 1), CARD_TIP_MAX_LEN, usize::MAX);
        assert_eq!(tip.short_explanation.chars().count(), 180);
        assert_eq!(tip.examples.len(), 3);
        assert_eq!(tip.rule_key.as_deref(), Some("ser_estar"));
    }

    #[test]
    fn lesson_tips_dedupe_and_cap() {
        let rules = vec![
            rule(1, "ser_estar", 1),
            rule(1, "ser_estar", 1),
            rule(2, "gender", 1),
            rule(3, "preterite", 2),
        ];
        let tips = lesson_tips(&rules);
        let keys: Vec<_> = tips.iter().filter_map(|t| t.rule_key.as_deref()).collect();
        assert_eq!(keys, vec!["ser_estar", "gender"]);
        assert!(tips.iter().all(|t| t.examples.len() == 2));
        assert_eq!(tips[0].short_explanation.chars().count(), 150);
        assert!(tips[0].short_explanation.ends_with("..."));
    }

    #[test]
    fn fallback_tip_has_no_rule() {
        let tip = GrammarTip::fallback();
        assert_eq!(tip.rule_key, None);
        assert_eq!(tip.title, "Grammar");
        assert_eq!(tip.short_explanation, "Grammar information not available for this card.");
    }

    #[test]
    fn rules_group_by_difficulty() {
        let levels = group_by_difficulty(vec![rule(1, "b", 2), rule(2, "a", 1), rule(3, "c", 2)]);
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].difficulty, 1);
        let keys: Vec<_> = levels[1].rules.iter().map(|r| r.rule_key.as_str()).collect();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[test]
    fn generated_rules_are_normalized() {
        let raw: NewGrammarRule = serde_json::from_str(
            r#"{"rule_key": " Present Tense-AR ", "title": "Present", "explanation": "Drop -ar.", "difficulty": 9}"#,
        )
        .unwrap();
        assert!(raw.is_well_formed());
        let rule = raw.normalized();
        assert_eq!(rule.rule_key, "present_tense_ar");
        assert_eq!(rule.difficulty, 5);
        assert!(rule.examples.is_empty());
    }
}
