//! Pattern-based named entity extraction.
//!
//! Labels follow the usual NER tag names (DATE, TIME, MONEY, PERCENT, ORG)
//! plus EMAIL. Matches are ordered by position; where two patterns overlap
//! the earlier match wins, then the longer one, then the label listed first.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::Entity;

fn re_email() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap())
}

fn re_money() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)[$€£]\s?\d[\d,]*(?:\.\d+)?(?:\s?(?:k|m|million|billion|thousand)\b)?|\b\d[\d,]*(?:\.\d+)?\s?(?:dollars|usd|eur|euros|gbp|pounds)\b",
        )
        .unwrap()
    })
}

fn re_percent() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b\d+(?:\.\d+)?(?:%|\s?percent\b)").unwrap())
}

fn re_time() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:(?:[01]?\d|2[0-3]):[0-5]\d(?:\s?[ap]m)?|(?:1[0-2]|0?[1-9])\s?[ap]m)\b")
            .unwrap()
    })
}

fn re_date() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?ix)\b(?:
                \d{4}-\d{2}-\d{2}
              | \d{1,2}/\d{1,2}/\d{2,4}
              | (?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?
                  |sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+\d{1,2}(?:st|nd|rd|th)?(?:,?\s+\d{4})?
              | (?:next|last|this)\s+(?:week|month|quarter|year|monday|tuesday|wednesday|thursday|friday|saturday|sunday)
              | today|tomorrow|yesterday|tonight
              | monday|tuesday|wednesday|thursday|friday|saturday|sunday
            )\b",
        )
        .unwrap()
    })
}

fn re_org() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(?:[A-Z][\w&'-]*\s+){0,4}[A-Z][\w&'-]*\s+(?:Inc|LLC|Ltd|Corp|Corporation|Company|Co|GmbH|Group|Technologies|Systems|Bank)\b\.?",
        )
        .unwrap()
    })
}

struct Candidate {
    start: usize,
    end: usize,
    rank: usize,
    label: &'static str,
}

/// Compiled entity patterns, in tie-break order.
pub struct EntityExtractor {
    patterns: Vec<(&'static str, &'static Regex)>,
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityExtractor {
    pub fn new() -> Self {
        Self {
            patterns: vec![
                ("EMAIL", re_email()),
                ("MONEY", re_money()),
                ("PERCENT", re_percent()),
                ("DATE", re_date()),
                ("TIME", re_time()),
                ("ORG", re_org()),
            ],
        }
    }

    /// Extract non-overlapping entities in order of appearance.
    pub fn extract(&self, text: &str) -> Vec<Entity> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut candidates: Vec<Candidate> = self
            .patterns
            .iter()
            .enumerate()
            .flat_map(|(rank, &(label, re))| {
                re.find_iter(text).map(move |m| Candidate {
                    start: m.start(),
                    end: m.end(),
                    rank,
                    label,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then((b.end - b.start).cmp(&(a.end - a.start)))
                .then(a.rank.cmp(&b.rank))
        });

        let mut entities = Vec::new();
        let mut cursor = 0;
        for c in candidates {
            if c.start < cursor {
                continue;
            }
            let span = text[c.start..c.end].trim_end_matches('.').trim();
            if !span.is_empty() {
                entities.push(Entity::new(span, c.label));
            }
            cursor = c.end;
        }
        entities
    }
}
