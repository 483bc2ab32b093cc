use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One article as returned by discovery. Immutable once created.
/// Uniqueness key within a run: `(title, source_link)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleCandidate {
    pub title: String,
    /// Aggregator redirect URL as listed in the news feed.
    pub source_link: String,
    pub published_date: NaiveDate,
}

/// The join of a candidate with its resolved link and extracted content.
/// Only exists for records where every stage succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedArticle {
    pub title: String,
    pub source_link: String,
    pub resolved_link: String,
    pub published_date: NaiveDate,
    pub content: String,
}

/// Answer to one due-diligence question: a categorical verdict plus an
/// optional short justification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub categorical: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl QuestionAnswer {
    /// True unless the model marked the question as not answerable.
    pub fn is_answered(&self) -> bool {
        !self.categorical.trim().starts_with("N/A")
    }
}

impl fmt::Display for QuestionAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.text.as_deref().filter(|t| !t.trim().is_empty() && *t != "N/A") {
            Some(text) => write!(f, "{}\n{}", self.categorical, text),
            None => write!(f, "{}", self.categorical),
        }
    }
}

/// Structured analysis of one article: sentiment scores, red flag score,
/// tags, a cross-article incident id, and the twelve-question panel.
/// `date` and `link` are joined back in after the model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedArticle {
    pub headline: String,
    pub positive_sentiment: f64,
    pub negative_sentiment: f64,
    pub neutral_sentiment: f64,
    pub red_flag_score: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Articles covering the same incident share a unique_id.
    pub unique_id: i64,
    #[serde(rename = "Q1")]
    pub q1: QuestionAnswer,
    #[serde(rename = "Q2")]
    pub q2: QuestionAnswer,
    #[serde(rename = "Q3")]
    pub q3: QuestionAnswer,
    #[serde(rename = "Q4")]
    pub q4: QuestionAnswer,
    #[serde(rename = "Q5")]
    pub q5: QuestionAnswer,
    #[serde(rename = "Q6")]
    pub q6: QuestionAnswer,
    #[serde(rename = "Q7")]
    pub q7: QuestionAnswer,
    #[serde(rename = "Q8")]
    pub q8: QuestionAnswer,
    #[serde(rename = "Q9")]
    pub q9: QuestionAnswer,
    #[serde(rename = "Q10")]
    pub q10: QuestionAnswer,
    #[serde(rename = "Q11")]
    pub q11: QuestionAnswer,
    #[serde(rename = "Q12")]
    pub q12: QuestionAnswer,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub link: Option<String>,
}

impl AnalyzedArticle {
    /// The question panel in fixed order, for flattening into report input.
    pub fn answers(&self) -> [&QuestionAnswer; 12] {
        [
            &self.q1, &self.q2, &self.q3, &self.q4, &self.q5, &self.q6, &self.q7, &self.q8,
            &self.q9, &self.q10, &self.q11, &self.q12,
        ]
    }
}

/// The subset of surviving articles sharing one publish date, which is the
/// unit of work handed to analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateGroup {
    pub date: NaiveDate,
    pub articles: Vec<EnrichedArticle>,
}

/// Look-back window for a pipeline run, parsed from strings like `"30d"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub days: u32,
}

impl TimeWindow {
    pub fn new(days: u32) -> Self {
        Self { days }
    }

    /// Inclusive range of exactly `days` days ending at `end`.
    pub fn date_range(&self, end: NaiveDate) -> (NaiveDate, NaiveDate) {
        (end - chrono::Duration::days(self.days as i64 - 1), end)
    }
}

impl FromStr for TimeWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let days = s
            .strip_suffix('d')
            .ok_or_else(|| format!("invalid period {s:?}, expected e.g. \"30d\""))?
            .parse::<u32>()
            .map_err(|e| format!("invalid period {s:?}: {e}"))?;
        if days == 0 {
            return Err("period must be at least one day".to_string());
        }
        Ok(Self { days })
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d", self.days)
    }
}
