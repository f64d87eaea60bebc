// src/strategy/web_strategies.rs
//
// Representative web-family heuristics, run over a page's extracted
// allText (spec §4.2).

use aho_corasick::AhoCorasick;

use crate::data::Category;
use crate::strategy::{Strategy, StrategyHit, Subject};

fn as_text<'a>(subject: &Subject<'a>) -> Option<&'a str> {
    match subject {
        Subject::Page(t) => Some(t),
        _ => None,
    }
}

/// Stock transitional phrases ("In conclusion", "It's important to note")
/// that LLMs reach for disproportionately often relative to human copy.
pub struct BoilerplateTransitions {
    matcher: AhoCorasick,
}

const TRANSITION_PHRASES: &[&str] = &[
    "in conclusion",
    "it's important to note",
    "it is important to note",
    "overall, ",
    "in summary",
    "as an ai language model",
    "i cannot provide",
    "i don't have access to real-time",
    "let's dive in",
    "in today's fast-paced world",
];

impl Default for BoilerplateTransitions {
    fn default() -> Self {
        Self {
            matcher: AhoCorasick::new(TRANSITION_PHRASES).expect("static pattern set"),
        }
    }
}

impl Strategy for BoilerplateTransitions {
    fn name(&self) -> &str {
        "boilerplate_transitions"
    }
    fn category(&self) -> Category {
        Category::Linguistic
    }
    fn confidence(&self) -> f64 {
        0.55
    }
    fn description(&self) -> &str {
        "Page text contains stock LLM transition phrases"
    }
    fn source_types(&self) -> Vec<String> {
        vec!["web".to_string()]
    }

    fn detect(&self, subject: &Subject) -> StrategyHit {
        let Some(text) = as_text(subject) else {
            return StrategyHit {
                triggered: false,
                reason: String::new(),
            };
        };
        let lower = text.to_lowercase();
        let hits: Vec<&str> = self
            .matcher
            .find_iter(&lower)
            .map(|m| &TRANSITION_PHRASES[m.pattern().as_usize()])
            .copied()
            .collect();
        StrategyHit {
            triggered: !hits.is_empty(),
            reason: format!("phrases={}", hits.join(",")),
        }
    }
}

/// Heavy use of markdown-style bullet/numbered lists — a structural tic
/// of LLM output that plain prose rarely falls into this often.
pub struct ListHeavyStructure {
    pub min_ratio: f64,
}

impl Default for ListHeavyStructure {
    fn default() -> Self {
        Self { min_ratio: 0.15 }
    }
}

impl Strategy for ListHeavyStructure {
    fn name(&self) -> &str {
        "list_heavy_structure"
    }
    fn category(&self) -> Category {
        Category::Structural
    }
    fn confidence(&self) -> f64 {
        0.4
    }
    fn description(&self) -> &str {
        "A large fraction of lines are bullet or numbered list items"
    }
    fn source_types(&self) -> Vec<String> {
        vec!["web".to_string()]
    }

    fn detect(&self, subject: &Subject) -> StrategyHit {
        let Some(text) = as_text(subject) else {
            return StrategyHit {
                triggered: false,
                reason: String::new(),
            };
        };
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.is_empty() {
            return StrategyHit {
                triggered: false,
                reason: "no lines".to_string(),
            };
        }
        let list_lines = lines
            .iter()
            .filter(|l| {
                let t = l.trim_start();
                t.starts_with("- ") || t.starts_with("* ") || t.starts_with(|c: char| c.is_ascii_digit())
            })
            .count();
        let ratio = list_lines as f64 / lines.len() as f64;
        StrategyHit {
            triggered: ratio >= self.min_ratio,
            reason: format!("ratio={:.2}", ratio),
        }
    }
}

/// Uniform sentence length — human writing varies sentence length a lot
/// more than typical LLM prose.
pub struct UniformSentenceLength {
    pub max_variance_ratio: f64,
    pub min_sentences: usize,
}

impl Default for UniformSentenceLength {
    fn default() -> Self {
        Self {
            max_variance_ratio: 0.15,
            min_sentences: 8,
        }
    }
}

impl Strategy for UniformSentenceLength {
    fn name(&self) -> &str {
        "uniform_sentence_length"
    }
    fn category(&self) -> Category {
        Category::Statistical
    }
    fn confidence(&self) -> f64 {
        0.45
    }
    fn description(&self) -> &str {
        "Sentence lengths cluster unusually tightly around the mean"
    }
    fn source_types(&self) -> Vec<String> {
        vec!["web".to_string()]
    }

    fn detect(&self, subject: &Subject) -> StrategyHit {
        let Some(text) = as_text(subject) else {
            return StrategyHit {
                triggered: false,
                reason: String::new(),
            };
        };
        let lengths: Vec<f64> = text
            .split(['.', '!', '?'])
            .map(|s| s.split_whitespace().count() as f64)
            .filter(|&n| n > 0.0)
            .collect();
        if lengths.len() < self.min_sentences {
            return StrategyHit {
                triggered: false,
                reason: format!("sentences={}", lengths.len()),
            };
        }
        let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
        let variance = lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / lengths.len() as f64;
        let stddev = variance.sqrt();
        let ratio = if mean > 0.0 { stddev / mean } else { 1.0 };
        StrategyHit {
            triggered: ratio <= self.max_variance_ratio,
            reason: format!("mean={mean:.1} stddev_ratio={ratio:.2}"),
        }
    }
}

/// Repeated bigrams far beyond what topical repetition explains — a
/// crude stand-in for the phrase-level self-similarity LLM text exhibits.
pub struct RepetitivePhrasing {
    pub min_repeat_ratio: f64,
}

impl Default for RepetitivePhrasing {
    fn default() -> Self {
        Self {
            min_repeat_ratio: 0.08,
        }
    }
}

impl Strategy for RepetitivePhrasing {
    fn name(&self) -> &str {
        "repetitive_phrasing"
    }
    fn category(&self) -> Category {
        Category::Statistical
    }
    fn confidence(&self) -> f64 {
        0.4
    }
    fn description(&self) -> &str {
        "Word bigrams repeat at a rate beyond ordinary topical repetition"
    }
    fn source_types(&self) -> Vec<String> {
        vec!["web".to_string()]
    }

    fn detect(&self, subject: &Subject) -> StrategyHit {
        let Some(text) = as_text(subject) else {
            return StrategyHit {
                triggered: false,
                reason: String::new(),
            };
        };
        let words: Vec<String> = text.split_whitespace().map(|w| w.to_lowercase()).collect();
        if words.len() < 20 {
            return StrategyHit {
                triggered: false,
                reason: format!("words={}", words.len()),
            };
        }
        let mut counts = std::collections::HashMap::new();
        for pair in words.windows(2) {
            *counts.entry((pair[0].clone(), pair[1].clone())).or_insert(0u64) += 1;
        }
        let total = (words.len() - 1) as f64;
        let repeats: u64 = counts.values().filter(|&&c| c > 1).map(|&c| c - 1).sum();
        let ratio = repeats as f64 / total;
        StrategyHit {
            triggered: ratio >= self.min_repeat_ratio,
            reason: format!("repeat_ratio={ratio:.3}"),
        }
    }
}

/// Headings that read as generic section templates ("Introduction",
/// "Key Takeaways", "Conclusion") rather than content-specific titles.
pub struct TemplatedHeadings {
    matcher: AhoCorasick,
}

const TEMPLATE_HEADINGS: &[&str] = &[
    "introduction",
    "key takeaways",
    "conclusion",
    "final thoughts",
    "frequently asked questions",
    "overview",
];

impl Default for TemplatedHeadings {
    fn default() -> Self {
        Self {
            matcher: AhoCorasick::new(TEMPLATE_HEADINGS).expect("static pattern set"),
        }
    }
}

impl Strategy for TemplatedHeadings {
    fn name(&self) -> &str {
        "templated_headings"
    }
    fn category(&self) -> Category {
        Category::Pattern
    }
    fn confidence(&self) -> f64 {
        0.35
    }
    fn description(&self) -> &str {
        "Heading text matches generic template section names"
    }
    fn source_types(&self) -> Vec<String> {
        vec!["web".to_string()]
    }

    fn detect(&self, subject: &Subject) -> StrategyHit {
        let Some(text) = as_text(subject) else {
            return StrategyHit {
                triggered: false,
                reason: String::new(),
            };
        };
        let lower = text.to_lowercase();
        let matched = self.matcher.find_iter(&lower).count();
        StrategyHit {
            triggered: matched >= 2,
            reason: format!("matches={matched}"),
        }
    }
}

/// Builds the default web strategy set.
pub fn default_strategies() -> Vec<Box<dyn Strategy>> {
    vec![
        Box::new(BoilerplateTransitions::default()),
        Box::new(ListHeavyStructure::default()),
        Box::new(UniformSentenceLength::default()),
        Box::new(RepetitivePhrasing::default()),
        Box::new(TemplatedHeadings::default()),
    ]
}
