//! Report generation: flatten the question panel across all analyzed
//! articles, hand it to the report model, and render the returned markdown
//! as a styled standalone HTML document.

use anyhow::Result;
use chrono::NaiveDate;
use pulldown_cmark::{html, Parser};
use tracing::info;

use gemini_client::{GeminiClient, GenerationConfig};
use newsgauge_common::AnalyzedArticle;

use crate::analysis::QUESTIONS;

/// One dated, sourced answer contributing to a question's findings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub date: Option<NaiveDate>,
    pub link: Option<String>,
    pub answer: String,
}

/// All findings for one panel question, in article order.
#[derive(Debug, Clone)]
pub struct QuestionFindings {
    pub question: &'static str,
    pub findings: Vec<Finding>,
}

/// Flatten the `Q1..Q12` panel across all analyzed articles. Unanswered
/// (`N/A`) entries are skipped; questions keep their fixed order even when
/// they end up with no findings.
pub fn flatten_answers(articles: &[AnalyzedArticle]) -> Vec<QuestionFindings> {
    QUESTIONS
        .iter()
        .enumerate()
        .map(|(i, question)| {
            let findings = articles
                .iter()
                .filter_map(|article| {
                    let answer = article.answers()[i];
                    answer.is_answered().then(|| Finding {
                        date: article.date,
                        link: article.link.clone(),
                        answer: answer.to_string(),
                    })
                })
                .collect();
            QuestionFindings {
                question,
                findings,
            }
        })
        .collect()
}

/// Serialize the flattened panel as the report model's input.
fn panel_to_prompt(panel: &[QuestionFindings]) -> String {
    let mut out = String::new();
    for (i, entry) in panel.iter().enumerate() {
        out.push_str(&format!("Question {}: {}\n", i + 1, entry.question));
        if entry.findings.is_empty() {
            out.push_str("- No relevant information available.\n");
        }
        for finding in &entry.findings {
            let date = finding
                .date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "undated".to_string());
            let link = finding.link.as_deref().unwrap_or("no link");
            out.push_str(&format!("- [{date}] ({link}) {}\n", finding.answer.replace('\n', ": ")));
        }
        out.push('\n');
    }
    out
}

fn report_instruction(company: &str) -> String {
    format!(
        "You are an expert financial analyst generating a concise, standardized financial \
analysis report for {company} from extracted question/answer data. The input lists twelve \
due-diligence questions, each with dated, sourced findings.\n\n\
Output structure (markdown):\n\
- Title: \"# {company} Financial Analysis Report\" followed by a one-paragraph italic \
overview of the company's financial health, market valuation and stakeholder dynamics.\n\
- One section per question with: a short heading summarizing the topic (e.g. *Legal and \
Regulatory Issues*, *Key Management Changes*); a summary of at most 5 sentences; and 3-4 \
bullet-point key findings, each citing its source as [Source - date](url).\n\
- Where a question has no findings, state exactly: \"No relevant information available.\"\n\
Base every statement strictly on the provided findings for {company}.",
    )
}

pub struct ReportGenerator {
    client: GeminiClient,
    model: String,
}

impl ReportGenerator {
    pub fn new(client: GeminiClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    /// Generate the narrative report in markdown from a previously produced
    /// analysis record set.
    pub async fn generate(&self, company: &str, articles: &[AnalyzedArticle]) -> Result<String> {
        let panel = flatten_answers(articles);
        let findings: usize = panel.iter().map(|q| q.findings.len()).sum();
        info!(company, articles = articles.len(), findings, "Generating report");

        let mut session = self.client.chat(
            &self.model,
            report_instruction(company),
            GenerationConfig::text(),
        );
        let reply = session.send(panel_to_prompt(&panel)).await?;

        info!(
            company,
            prompt_tokens = reply.prompt_tokens,
            output_tokens = reply.output_tokens,
            "Report generated"
        );
        Ok(reply.text)
    }
}

const HTML_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Report</title>
  <style>
    body { font-family: Arial, sans-serif; margin: 0; padding: 10px; background-color: #f4f4f4; color: #333; }
    h1 { text-align: center; margin-bottom: 20px; color: #2c3e50; font-size: 32px; font-weight: bold; }
    h2 { margin-top: 30px; margin-bottom: 15px; font-size: 24px; color: #2980b9; border-bottom: 2px solid #2980b9; padding-bottom: 5px; }
    p { margin-left: 20px; margin-bottom: 20px; font-size: 18px; line-height: 1.6; }
    ul { list-style-type: disc; padding-left: 20px; margin: 0; }
    li { margin-left: 20px; margin-bottom: 10px; font-size: 16px; line-height: 1.5; }
    a { text-decoration: none; color: #477ee4; }
    a:hover { color: #23527c; text-decoration: underline; }
    hr { border: none; height: 1px; background-color: #ccc; margin: 20px 0; }
    .container { max-width: 900px; margin: 40px auto; padding: 30px; background-color: #fff; border: 1px solid #ddd; border-radius: 8px; box-shadow: 0 4px 12px rgba(0, 0, 0, 0.1); }
    p strong { color: #2c3e50; }
    p em { font-style: italic; color: #7f8c8d; }
  </style>
</head>
<body>
  <div class="container">"#;

const HTML_TAIL: &str = "</div></body></html>";

/// Render report markdown as a styled standalone HTML document.
pub fn render_html(markdown: &str) -> String {
    let mut body = String::new();
    html::push_html(&mut body, Parser::new(markdown));
    format!("{HTML_HEAD}{body}{HTML_TAIL}")
}
