use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::Local;
use regex::Regex;

use crate::error::{BrainError, Result};
use crate::llm::prompts::{grounded_question, grounding_search_query, snowman_system_prompt};
use crate::llm::{LlmProvider, PriorExchange};
use crate::web::ContentClient;

/// The Canadian gift-shopping assistant.
///
/// Answers one question at a time. When a content client is attached, a web
/// search runs first and any page linked in the question is fetched; both
/// ride along with the question. A failed search or fetch is logged and the
/// answer proceeds without it.
#[derive(Clone)]
pub struct SnowmanAgent {
    llm: LlmProvider,
    content: Option<ContentClient>,
}

impl SnowmanAgent {
    pub fn new(llm: LlmProvider, content: Option<ContentClient>) -> Self {
        Self { llm, content }
    }

    pub fn has_web_search(&self) -> bool {
        self.content.is_some()
    }

    pub async fn answer(&self, question: &str, history: &[PriorExchange]) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(BrainError::Validation("Question cannot be empty".to_string()));
        }

        let system_prompt = snowman_system_prompt(&Local::now().format("%Y-%m-%d").to_string());
        let prompt = match self.web_context(question).await {
            Some(results) => grounded_question(question, &results),
            None => question.to_string(),
        };

        self.llm
            .complete_conversation(&system_prompt, history, &prompt)
            .await
    }

    async fn web_context(&self, question: &str) -> Option<String> {
        let content = self.content.as_ref()?;
        let urls = referenced_urls(question);

        let search_query = grounding_search_query(question);
        let (search, pages) = tokio::join!(
            content.search(&search_query),
            async {
                if urls.is_empty() {
                    HashMap::new()
                } else {
                    content.fetch_urls(&urls).await
                }
            }
        );

        let mut sections = Vec::new();
        for url in &urls {
            match pages.get(url) {
                Some(text) if !text.trim().is_empty() => {
                    sections.push(format!("Page {url}:\n{text}"));
                }
                _ => tracing::debug!(url = %url, "Linked page gave no content"),
            }
        }

        match search {
            Ok(results) if !results.trim().is_empty() => sections.push(content.truncate(&results)),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Web search failed, answering without it"),
        }

        if sections.is_empty() {
            None
        } else {
            Some(sections.join("\n\n"))
        }
    }
}

/// `http(s)://` links in a question, in order, without trailing punctuation.
fn referenced_urls(text: &str) -> Vec<String> {
    static URL: OnceLock<Regex> = OnceLock::new();
    let url = URL.get_or_init(|| {
        Regex::new(r#"https?://[^\s<>"'()\[\]]+"#).expect("url regex is valid")
    });

    let mut urls: Vec<String> = Vec::new();
    for found in url.find_iter(text) {
        let link = found.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']);
        if !urls.iter().any(|seen| seen == link) {
            urls.push(link.to_string());
        }
    }
    urls
}
