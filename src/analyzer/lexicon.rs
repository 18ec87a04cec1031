//! Word-level sentiment lexicon.
//!
//! Polarity is the mean of the scored words in a text, each in [-1, 1].
//! A negator within the three preceding tokens flips a word and halves it
//! ("not good" scores -0.35). An intensifier directly before a word scales
//! it up before clamping.

use std::collections::HashMap;
use std::sync::OnceLock;

const WORDS: &[(&str, f64)] = &[
    // negative
    ("angry", -0.5),
    ("annoyed", -0.4),
    ("annoying", -0.5),
    ("awful", -1.0),
    ("bad", -0.7),
    ("broken", -0.4),
    ("complaint", -0.4),
    ("crash", -0.5),
    ("crashed", -0.5),
    ("delayed", -0.3),
    ("disappointed", -0.75),
    ("disappointing", -0.6),
    ("disaster", -0.9),
    ("dissatisfied", -0.6),
    ("error", -0.3),
    ("fail", -0.5),
    ("failed", -0.5),
    ("failing", -0.5),
    ("failure", -0.6),
    ("frustrated", -0.7),
    ("frustrating", -0.7),
    ("furious", -0.9),
    ("hate", -0.8),
    ("horrible", -1.0),
    ("late", -0.3),
    ("lost", -0.4),
    ("outage", -0.6),
    ("poor", -0.4),
    ("problem", -0.3),
    ("ridiculous", -0.6),
    ("slow", -0.3),
    ("terrible", -1.0),
    ("unacceptable", -0.8),
    ("unhappy", -0.6),
    ("unusable", -0.7),
    ("upset", -0.6),
    ("useless", -0.7),
    ("worse", -0.6),
    ("worst", -1.0),
    ("wrong", -0.5),
    // positive
    ("amazing", 0.6),
    ("appreciate", 0.4),
    ("appreciated", 0.4),
    ("awesome", 1.0),
    ("excellent", 1.0),
    ("fantastic", 0.8),
    ("fine", 0.4),
    ("glad", 0.5),
    ("good", 0.7),
    ("grateful", 0.6),
    ("great", 0.8),
    ("happy", 0.8),
    ("helpful", 0.5),
    ("love", 0.5),
    ("nice", 0.6),
    ("perfect", 1.0),
    ("pleased", 0.5),
    ("resolved", 0.3),
    ("satisfied", 0.5),
    ("thank", 0.2),
    ("thanks", 0.2),
    ("wonderful", 1.0),
    ("working", 0.2),
];

const NEGATORS: &[&str] = &[
    "not", "no", "never", "nothing", "hardly", "cannot", "isn't", "wasn't", "aren't",
    "don't", "doesn't", "didn't", "can't", "won't", "couldn't", "shouldn't",
];

const INTENSIFIERS: &[(&str, f64)] = &[
    ("absolutely", 1.4),
    ("completely", 1.4),
    ("extremely", 1.5),
    ("really", 1.3),
    ("so", 1.2),
    ("totally", 1.3),
    ("very", 1.3),
];

/// How many tokens a negator reaches forward.
const NEGATION_WINDOW: usize = 3;

/// Factor applied to a negated word.
const NEGATION_FACTOR: f64 = -0.5;

fn word_table() -> &'static HashMap<&'static str, f64> {
    static TABLE: OnceLock<HashMap<&'static str, f64>> = OnceLock::new();
    TABLE.get_or_init(|| WORDS.iter().copied().collect())
}

/// Lowercased word tokens. Apostrophes stay inside words so "don't" survives.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\'').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Mean polarity of the scored words in `text`, 0.0 when none are scored.
pub fn polarity(text: &str) -> f64 {
    let table = word_table();
    let tokens = tokenize(text);

    let mut scores = Vec::new();
    let mut negated_until: Option<usize> = None;
    let mut intensity = 1.0;

    for (i, token) in tokens.iter().enumerate() {
        if NEGATORS.contains(&token.as_str()) {
            negated_until = Some(i + NEGATION_WINDOW);
            intensity = 1.0;
            continue;
        }

        if let Some(&(_, factor)) = INTENSIFIERS.iter().find(|(w, _)| *w == token.as_str()) {
            intensity = factor;
            continue;
        }

        if let Some(&value) = table.get(token.as_str()) {
            let mut score = (value * intensity).clamp(-1.0, 1.0);
            if negated_until.is_some_and(|end| i <= end) {
                score *= NEGATION_FACTOR;
                negated_until = None;
            }
            scores.push(score);
        }
        intensity = 1.0;
    }

    if scores.is_empty() {
        return 0.0;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    mean.clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_text_scores_zero() {
        assert_eq!(polarity(""), 0.0);
        assert_eq!(polarity("This is an urgent issue!"), 0.0);
    }

    #[test]
    fn thanks_is_mildly_positive() {
        let p = polarity("Thanks for your help");
        assert!(p > 0.0 && p < 0.5, "got {p}");
    }

    #[test]
    fn strongly_negative_mail_crosses_threshold() {
        let p = polarity("This is the worst service, absolutely terrible.");
        assert!(p < -0.5, "got {p}");
    }

    #[test]
    fn negation_flips_and_softens() {
        let p = polarity("The fix is not good");
        assert!((p - (-0.35)).abs() < 1e-9, "got {p}");
        let p = polarity("I'm not at all unhappy");
        assert!(p > 0.0, "got {p}");
    }

    #[test]
    fn negation_window_expires() {
        // "no" is too far back to reach "great"
        let p = polarity("no reply came from the team, great");
        assert!(p > 0.0, "got {p}");
    }

    #[test]
    fn intensifier_scales_next_word_only() {
        let plain = polarity("bad");
        let intense = polarity("very bad");
        assert!(intense < plain);
        assert!(intense >= -1.0);
        assert_eq!(polarity("very much bad"), plain);
    }

    #[test]
    fn tokenizer_keeps_contractions() {
        assert_eq!(tokenize("Don't WAIT, 'please'"), vec!["don't", "wait", "please"]);
    }
}
