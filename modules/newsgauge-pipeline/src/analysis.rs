//! Analysis stage: structured financial sentiment and due-diligence scoring
//! of each surviving article via Gemini.
//!
//! One chat session per date-group keeps prompt context bounded to a single
//! day's articles while letting the model assign shared incident ids within
//! the group. Groups run concurrently; articles within a group run serially
//! through the group's session.

use anyhow::Result;
use futures::future::join_all;
use serde_json::json;
use tracing::{info, warn};

use gemini_client::{GeminiClient, GenerationConfig};
use newsgauge_common::{AnalyzedArticle, DateGroup, EnrichedArticle};

/// The fixed due-diligence question panel, in `Q1..Q12` order.
pub const QUESTIONS: [&str; 12] = [
    "Are there any regulatory or legal issues faced by the Company or its subsidiaries?",
    "Are there any legal issues faced by the promoters of the Company?",
    "Has the Company faced employee attrition in the past and has the key management team changed in the past 2 years?",
    "Is the industry in which Company operates facing a slowdown?",
    "Is the Company overvalued as compared to its peers?",
    "Are there any significant upcoming events or product launches that could impact the company's performance?",
    "Has the Company's revenues, operating profit margins, net profit margins grown year on year for past 3 years and are these better than industry growth rate?",
    "Has the Company's debt increased or decreased over past 3 years?",
    "Has the Company capacity utilization increased or decreased over past 3 years and how much capacity has the Company added in past 3 years?",
    "Has the promoter stake in the Company increased or decreased in the past?",
    "Has the institution stake in the Company increased or decreased in the past?",
    "How many analysts are tracking the Company's stock and what is the percentage upside on target price given by the analysts?",
];

const YES_NO: &[&str] = &["Yes", "No", "N/A"];
const INCREASED_DECREASED: &[&str] = &["Increased", "Decreased", "N/A"];
const UPSIDE: &[&str] = &["Upside", "No Upside", "N/A"];

fn question_options(index: usize) -> &'static [&'static str] {
    match index {
        7..=10 => INCREASED_DECREASED,
        11 => UPSIDE,
        _ => YES_NO,
    }
}

fn question_schema(description: &str, options: &[&str]) -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "description": description,
        "required": ["categorical"],
        "properties": {
            "categorical": {"type": "STRING", "enum": options},
            "text": {"type": "STRING"}
        }
    })
}

/// JSON response schema constraining the model to the analysis record shape.
pub(crate) fn response_schema() -> serde_json::Value {
    let mut required = vec![
        "headline".to_string(),
        "positive_sentiment".to_string(),
        "negative_sentiment".to_string(),
        "neutral_sentiment".to_string(),
        "red_flag_score".to_string(),
        "tags".to_string(),
        "unique_id".to_string(),
    ];
    let mut properties = json!({
        "headline": {"type": "STRING"},
        "positive_sentiment": {"type": "NUMBER"},
        "negative_sentiment": {"type": "NUMBER"},
        "neutral_sentiment": {"type": "NUMBER"},
        "red_flag_score": {"type": "NUMBER"},
        "tags": {"type": "ARRAY", "items": {"type": "STRING"}},
        "unique_id": {"type": "NUMBER"}
    });
    for (i, text) in QUESTIONS.iter().enumerate() {
        let key = format!("Q{}", i + 1);
        properties[&key] = question_schema(text, question_options(i));
        required.push(key);
    }

    json!({
        "type": "OBJECT",
        "description": "Financial sentiment, red flag scoring and due-diligence answers for one news article.",
        "required": required,
        "properties": properties
    })
}

fn system_instruction(company: &str) -> String {
    format!(
        "You are a financial expert with the skillset of a professional quantitative trader \
and investment analyst responsible for analysing\nCompany_name: {company}\n\
Your task is to analyze the news articles with content relevant to {company} and assign \
financial sentiment scores (positive, negative, and neutral) and a red flag score (all on \
a scale of 0-100). Red flag scores should be based on events or information that are \
significantly detrimental for the company (a drop in stock price is not a red flag but \
mostly an after effect of the red flag event; give higher red flag scores to the event \
itself). If an article's content is not relevant to {company}, assign a full neutral score \
and set the other scores to 0. Scoring must be strictly based on information from news \
articles relevant to {company}, reflecting the potential financial impact on stock price \
and investment decisions. Assign relevant tags (no more than 3) to each article. Assign \
the same unique_id to articles that deal with the same incident by comparing headlines; \
each unique story receives exactly one unique id.\n\n\
Additionally, evaluate the following questions using the categorical options given in the \
response schema plus a short contextual justification (\"N/A\" if no relevant \
information):\n\n{questions}\n\n\
Answers must be specifically relevant to {company} and based on the article content. \
Include a one line justification with each answer.",
        company = company,
        questions = QUESTIONS.join("\n"),
    )
}

fn article_prompt(article: &EnrichedArticle) -> String {
    format!(
        "headline:{}\ncontent: {}",
        article.title, article.content
    )
}

pub struct GeminiAnalyzer {
    client: GeminiClient,
    model: String,
}

impl GeminiAnalyzer {
    pub fn new(client: GeminiClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    /// Analyze every date-group concurrently. Per-article failures are
    /// dropped with a warning; output preserves group order and in-group
    /// order.
    pub async fn analyze_groups(
        &self,
        company: &str,
        groups: &[DateGroup],
    ) -> Result<Vec<AnalyzedArticle>> {
        let runs = join_all(groups.iter().map(|g| self.analyze_group(company, g))).await;

        let mut analyzed = Vec::new();
        let mut prompt_tokens = 0u64;
        let mut output_tokens = 0u64;
        for (articles, inp, out) in runs {
            analyzed.extend(articles);
            prompt_tokens += inp;
            output_tokens += out;
        }

        info!(
            company,
            articles = analyzed.len(),
            prompt_tokens,
            output_tokens,
            "Analysis complete"
        );
        Ok(analyzed)
    }

    async fn analyze_group(
        &self,
        company: &str,
        group: &DateGroup,
    ) -> (Vec<AnalyzedArticle>, u64, u64) {
        info!(date = %group.date, articles = group.articles.len(), "Analyzing date group");

        let mut session = self.client.chat(
            &self.model,
            system_instruction(company),
            GenerationConfig::json(response_schema()),
        );

        let mut results = Vec::new();
        let mut prompt_tokens = 0u64;
        let mut output_tokens = 0u64;

        for article in &group.articles {
            let reply = match session.send(article_prompt(article)).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(title = %article.title, error = %e, "Analysis call failed, dropping article");
                    continue;
                }
            };
            prompt_tokens += reply.prompt_tokens;
            output_tokens += reply.output_tokens;

            match serde_json::from_str::<AnalyzedArticle>(&reply.text) {
                Ok(mut analyzed) => {
                    analyzed.date = Some(article.published_date);
                    analyzed.link = Some(article.resolved_link.clone());
                    results.push(analyzed);
                }
                Err(e) => {
                    warn!(title = %article.title, error = %e, "Unparseable analysis output, dropping article");
                }
            }
        }

        info!(
            date = %group.date,
            analyzed = results.len(),
            tokens = prompt_tokens + output_tokens,
            "Date group complete"
        );
        (results, prompt_tokens, output_tokens)
    }
}
