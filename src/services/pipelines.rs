//! Content processing pipelines run by the worker tasks.
//!
//! The indexer and the wiki generator are seams: the worker only depends on
//! the traits, and the markdown implementations here are what ships.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::markdown::{demote_headings, extract_headings, render_toc};
use crate::db::KnowledgeSection;
use crate::models::RepositoryIdentity;
use crate::Result;

/// Summary of an indexing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub documents: i64,
    pub sections: i64,
    pub characters: i64,
}

/// Stores source text for later retrieval.
#[async_trait]
pub trait ContentIndexer: Send + Sync {
    async fn index(
        &self,
        identity: &RepositoryIdentity,
        text: &str,
        metadata: &serde_json::Value,
    ) -> Result<IndexSummary>;
}

/// Turns source text into wiki markdown.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, identity: &RepositoryIdentity, source_text: &str) -> Result<String>;
}

/// Passage an answer was drawn from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub text: String,
    pub file: Option<String>,
    pub url: Option<String>,
}

/// Answer to a question about a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub answer: String,
    pub sources: Vec<SourceDocument>,
}

/// Answers questions from a repository's indexed sections.
#[async_trait]
pub trait ContentQuerier: Send + Sync {
    async fn answer(
        &self,
        identity: &RepositoryIdentity,
        question: &str,
        sections: &[KnowledgeSection],
    ) -> Result<QueryAnswer>;
}

/// Indexes markdown documents, one document per non-empty text.
#[derive(Debug, Clone, Default)]
pub struct MarkdownIndexer;

#[async_trait]
impl ContentIndexer for MarkdownIndexer {
    async fn index(
        &self,
        identity: &RepositoryIdentity,
        text: &str,
        metadata: &serde_json::Value,
    ) -> Result<IndexSummary> {
        if text.trim().is_empty() {
            return Ok(IndexSummary::default());
        }

        let summary = IndexSummary {
            documents: 1,
            sections: extract_headings(text).len() as i64,
            characters: text.chars().count() as i64,
        };

        debug!(
            repo = %identity,
            sections = summary.sections,
            source = %metadata.get("source").and_then(|s| s.as_str()).unwrap_or("unknown"),
            "Indexed document"
        );

        Ok(summary)
    }
}

/// Builds a single wiki page from a README.
#[derive(Debug, Clone)]
pub struct MarkdownWikiGenerator {
    /// Deepest heading level listed in the table of contents
    pub toc_depth: usize,
}

impl Default for MarkdownWikiGenerator {
    fn default() -> Self {
        Self { toc_depth: 3 }
    }
}

#[async_trait]
impl ContentGenerator for MarkdownWikiGenerator {
    async fn generate(&self, identity: &RepositoryIdentity, source_text: &str) -> Result<String> {
        let source = source_text.trim();
        if source.is_empty() {
            return Ok(String::new());
        }

        let headings = extract_headings(source);
        let mut page = format!("# {} Wiki\n\n", identity.full_name());

        if !headings.is_empty() {
            page.push_str("## Contents\n\n");
            page.push_str(&render_toc(&headings, self.toc_depth));
            page.push_str("\n\n");
        }

        // Source headings nest under the overview heading.
        page.push_str("## Overview\n\n");
        page.push_str(&demote_headings(source, 2));
        page.push_str("\n\n---\n\n");
        page.push_str(&format!("Source: [{}]({})\n", identity.full_name(), identity.url()));

        Ok(page)
    }
}

const ANSWER_EXCERPT_CHARS: usize = 300;
const SOURCE_EXCERPT_CHARS: usize = 200;

/// Ranks README sections by how often the question's words appear in them.
#[derive(Debug, Clone)]
pub struct SectionQuerier {
    /// Most sources returned with an answer
    pub max_sources: usize,
}

impl Default for SectionQuerier {
    fn default() -> Self {
        Self { max_sources: 3 }
    }
}

impl SectionQuerier {
    /// Title hits count double.
    fn score(terms: &[String], section: &KnowledgeSection) -> usize {
        let title = section.title.to_lowercase();
        let content = section.content.to_lowercase();
        terms
            .iter()
            .map(|term| 2 * title.matches(term.as_str()).count() + content.matches(term.as_str()).count())
            .sum()
    }
}

#[async_trait]
impl ContentQuerier for SectionQuerier {
    async fn answer(
        &self,
        identity: &RepositoryIdentity,
        question: &str,
        sections: &[KnowledgeSection],
    ) -> Result<QueryAnswer> {
        let terms = query_terms(question);

        let mut ranked: Vec<(usize, &KnowledgeSection)> = sections
            .iter()
            .map(|section| (Self::score(&terms, section), section))
            .filter(|(score, _)| *score > 0)
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.position.cmp(&b.1.position)));
        ranked.truncate(self.max_sources);

        debug!(repo = %identity, terms = terms.len(), matches = ranked.len(), "Answered query");

        let Some((_, best)) = ranked.first() else {
            return Ok(QueryAnswer {
                answer: format!(
                    "No indexed content of {} matches \"{}\".",
                    identity.full_name(),
                    question.trim()
                ),
                sources: Vec::new(),
            });
        };

        let answer = format!(
            "The most relevant part of the {} README is \"{}\": {}",
            identity.full_name(),
            best.title,
            excerpt(&best.content, ANSWER_EXCERPT_CHARS)
        );
        let sources = ranked
            .iter()
            .map(|(_, section)| SourceDocument {
                text: excerpt(&section.content, SOURCE_EXCERPT_CHARS),
                file: Some("README.md".to_string()),
                url: Some(format!("{}#{}", identity.url(), section.anchor)),
            })
            .collect();

        Ok(QueryAnswer { answer, sources })
    }
}

/// Lowercase words of three or more characters.
fn query_terms(question: &str) -> Vec<String> {
    let mut terms: Vec<String> = question
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
