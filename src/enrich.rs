//! Text analysis: language, industries, key phrases and named entities.
//!
//! The pipeline only depends on the [`Enricher`] trait. The bundled
//! [`KeywordEnricher`] is deterministic: industries, technologies and the
//! other entity kinds are matched against configurable vocabularies on word
//! boundaries, so the same text always yields the same tags.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};

use crate::config::Config;
use crate::error::EnrichmentError;
use crate::models::{preview, quick_overview, Classification, Enrichment, Entities};

/// Analyses extracted text. Implementations must be safe to share across workers.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, text: &str, page_count: u32) -> Result<Enrichment, EnrichmentError>;
}

/// A vocabulary term and the pattern that finds it.
struct Term {
    name: String,
    pattern: Regex,
}

struct Vocabulary {
    industries: Vec<Term>,
    technologies: Vec<Term>,
    clients: Vec<Term>,
    partners: Vec<Term>,
    products: Vec<Term>,
    summary_chars: usize,
    max_domain_phrases: usize,
}

/// Vocabulary-driven enricher; analysis runs on the blocking thread pool.
#[derive(Clone)]
pub struct KeywordEnricher {
    vocab: Arc<Vocabulary>,
}

impl KeywordEnricher {
    pub fn from_config(config: &Config) -> Result<Self, EnrichmentError> {
        let e = &config.enrichment;
        let industries = e
            .industries
            .iter()
            .map(|(industry, keywords)| term_any(industry, keywords))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            vocab: Arc::new(Vocabulary {
                industries,
                technologies: terms(&e.technologies)?,
                clients: terms(&e.clients)?,
                partners: terms(&e.partners)?,
                products: terms(&e.products)?,
                summary_chars: config.pipeline.summary_chars,
                max_domain_phrases: config.pipeline.max_domain_phrases,
            }),
        })
    }

    /// Synchronous analysis, used by the async wrapper and by tests.
    pub fn analyze(&self, text: &str, page_count: u32) -> Enrichment {
        let v = &self.vocab;
        let collapsed = quick_overview(text, usize::MAX);
        let summary = if collapsed.chars().count() > v.summary_chars {
            format!("{}...", preview(&collapsed, v.summary_chars))
        } else {
            collapsed
        };

        Enrichment {
            language: detect_language(text),
            summary,
            word_count: text.split_whitespace().count(),
            page_count,
            classification: Classification::default(),
            industries: matching(&v.industries, text),
            domain_phrases: domain_phrases(text, v.max_domain_phrases),
            entities: Entities {
                clients: matching(&v.clients, text),
                products: matching(&v.products, text),
                technologies: matching(&v.technologies, text),
                partners: matching(&v.partners, text),
            },
        }
    }
}

#[async_trait]
impl Enricher for KeywordEnricher {
    async fn enrich(&self, text: &str, page_count: u32) -> Result<Enrichment, EnrichmentError> {
        let this = self.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || this.analyze(&text, page_count))
            .await
            .map_err(|e| EnrichmentError::Task(e.to_string()))
    }
}

fn word_pattern(alternatives: &[&str]) -> Result<Regex, EnrichmentError> {
    let body = alternatives
        .iter()
        .map(|w| regex::escape(w.trim()))
        .collect::<Vec<_>>()
        .join("|");
    Ok(RegexBuilder::new(&format!(r"\b(?:{})\b", body))
        .case_insensitive(true)
        .build()?)
}

fn term_any(name: &str, keywords: &[String]) -> Result<Term, EnrichmentError> {
    let words: Vec<&str> = keywords
        .iter()
        .map(|k| k.as_str())
        .filter(|k| !k.trim().is_empty())
        .collect();
    if words.is_empty() {
        return Err(EnrichmentError::EmptyTerm(name.to_string()));
    }
    Ok(Term {
        name: name.to_string(),
        pattern: word_pattern(&words)?,
    })
}

fn terms(names: &[String]) -> Result<Vec<Term>, EnrichmentError> {
    names
        .iter()
        .filter(|n| !n.trim().is_empty())
        .map(|n| term_any(n.trim(), std::slice::from_ref(n)))
        .collect()
}

fn matching(terms: &[Term], text: &str) -> BTreeSet<String> {
    dedup_names(
        terms
            .iter()
            .filter(|t| t.pattern.is_match(text))
            .map(|t| t.name.clone()),
    )
}

/// Exact-match set of names; blank entries are dropped.
pub fn dedup_names<I, S>(names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|n| n.as_ref().trim().to_string())
        .filter(|n| !n.is_empty())
        .collect()
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "for", "from", "has",
    "have", "in", "into", "is", "it", "its", "of", "on", "or", "our", "that", "the", "their",
    "this", "to", "was", "we", "were", "which", "will", "with", "you", "your",
];

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '-')
        .map(|w| w.trim_matches('-').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn is_content_word(w: &str) -> bool {
    w.chars().count() >= 3 && !STOPWORDS.contains(&w) && !w.chars().all(|c| c.is_numeric())
}

/// Top-K most frequent content words and adjacent content-word pairs.
/// Ties break alphabetically so the output is stable.
pub fn domain_phrases(text: &str, k: usize) -> Vec<String> {
    let words = tokens(text);
    let mut counts: HashMap<String, usize> = HashMap::new();
    for (i, w) in words.iter().enumerate() {
        if !is_content_word(w) {
            continue;
        }
        *counts.entry(w.clone()).or_default() += 1;
        if let Some(next) = words.get(i + 1).filter(|n| is_content_word(n)) {
            *counts.entry(format!("{} {}", w, next)).or_default() += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(k).map(|(p, _)| p).collect()
}

const LANGUAGE_MARKERS: &[(&str, &[&str])] = &[
    ("en", &["the", "and", "of", "to", "is", "that", "with", "for"]),
    ("es", &["el", "la", "de", "que", "y", "los", "las", "para"]),
    ("fr", &["le", "la", "les", "et", "des", "est", "pour", "une"]),
    ("de", &["der", "die", "und", "das", "ist", "nicht", "mit", "ein"]),
    ("it", &["il", "di", "che", "per", "non", "una", "gli", "sono"]),
    ("pt", &["o", "os", "que", "não", "uma", "para", "com", "são"]),
];

/// Stopword-frequency language guess; `"unknown"` when the signal is too weak.
pub fn detect_language(text: &str) -> String {
    let words = tokens(text);
    let best = LANGUAGE_MARKERS
        .iter()
        .map(|(lang, markers)| {
            let hits = words.iter().filter(|w| markers.contains(&w.as_str())).count();
            (*lang, hits)
        })
        .max_by_key(|(_, hits)| *hits);
    match best {
        Some((lang, hits)) if hits >= 2 => lang.to_string(),
        _ => "unknown".to_string(),
    }
}
