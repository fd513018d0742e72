//! Markdown helpers shared by the indexing and wiki pipelines.
//!
//! Heading extraction, slug ids, table of contents and navigation trees,
//! and splitting a document into heading sections.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// ATX heading with an optional explicit `{#id}` suffix.
static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+?)(?:\s+\{#([^}]+)\})?\s*$").unwrap());

static NON_SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static DASHES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").unwrap());

/// A markdown heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: usize,
    pub text: String,
    pub id: String,
}

/// Text under one heading, up to the next heading of any level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub id: String,
    pub body: String,
}

/// Entry of a wiki navigation tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationItem {
    pub title: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NavigationItem>,
}

/// Title of the section holding text that precedes the first heading.
const PREAMBLE_TITLE: &str = "Introduction";

/// Tracks fenced code blocks while scanning lines.
#[derive(Default)]
struct FenceState {
    open: bool,
}

impl FenceState {
    /// Whether `line` is a fence marker or sits inside a fence.
    fn skip(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            self.open = !self.open;
            return true;
        }
        self.open
    }
}

fn parse_heading(line: &str) -> Option<Heading> {
    let caps = HEADING_RE.captures(line)?;
    let level = caps[1].len();
    let text = caps[2].trim().trim_end_matches('#').trim().to_string();
    if text.is_empty() {
        return None;
    }
    let id = caps
        .get(3)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| slugify(&text));
    Some(Heading { level, text, id })
}

/// Extract ATX headings, skipping fenced code blocks.
pub fn extract_headings(markdown: &str) -> Vec<Heading> {
    let mut fence = FenceState::default();

    markdown
        .lines()
        .filter(|line| !fence.skip(line))
        .filter_map(parse_heading)
        .collect()
}

/// Split a document into heading sections.
///
/// Text before the first heading becomes an "Introduction" section. Sections
/// with neither a heading nor body text are dropped.
pub fn split_sections(markdown: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut fence = FenceState::default();
    let mut current = Section {
        title: PREAMBLE_TITLE.to_string(),
        id: slugify(PREAMBLE_TITLE),
        body: String::new(),
    };
    let mut has_heading = false;

    for line in markdown.lines() {
        let heading = if fence.skip(line) { None } else { parse_heading(line) };

        match heading {
            Some(heading) => {
                let finished = std::mem::replace(
                    &mut current,
                    Section {
                        title: heading.text,
                        id: heading.id,
                        body: String::new(),
                    },
                );
                if has_heading || !finished.body.trim().is_empty() {
                    sections.push(trim_body(finished));
                }
                has_heading = true;
            }
            None => {
                current.body.push_str(line);
                current.body.push('\n');
            }
        }
    }

    if has_heading || !current.body.trim().is_empty() {
        sections.push(trim_body(current));
    }

    sections
}

fn trim_body(mut section: Section) -> Section {
    section.body = section.body.trim().to_string();
    section
}

/// Nest headings into a navigation tree by level.
pub fn build_navigation(headings: &[Heading]) -> Vec<NavigationItem> {
    let mut index = 0;
    nest_headings(headings, &mut index, 0)
}

fn nest_headings(headings: &[Heading], index: &mut usize, parent_level: usize) -> Vec<NavigationItem> {
    let mut items = Vec::new();

    while let Some(heading) = headings.get(*index) {
        if heading.level <= parent_level {
            break;
        }
        *index += 1;
        let children = nest_headings(headings, index, heading.level);
        items.push(NavigationItem {
            title: heading.text.clone(),
            id: heading.id.clone(),
            children,
        });
    }

    items
}

/// Push every heading `by` levels deeper, capped at level 6.
pub fn demote_headings(markdown: &str, by: usize) -> String {
    let mut fence = FenceState::default();

    markdown
        .lines()
        .map(|line| {
            if fence.skip(line) || parse_heading(line).is_none() {
                return line.to_string();
            }
            let hashes = line.chars().take_while(|c| *c == '#').count();
            let level = (hashes + by).min(6);
            format!("{}{}", "#".repeat(level), &line[hashes..])
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Anchor id for a heading: lowercase, punctuation dropped, whitespace to `-`.
pub fn slugify(text: &str) -> String {
    let lower = text.to_lowercase();
    let stripped = NON_SLUG_RE.replace_all(&lower, "");
    let dashed = WHITESPACE_RE.replace_all(&stripped, "-");
    let collapsed = DASHES_RE.replace_all(&dashed, "-");
    collapsed.trim_matches('-').to_string()
}

/// Render a nested bullet list of links for headings up to `max_level`.
pub fn render_toc(headings: &[Heading], max_level: usize) -> String {
    headings
        .iter()
        .filter(|h| h.level <= max_level)
        .map(|h| format!("{}- [{}](#{})", "  ".repeat(h.level - 1), h.text, h.id))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Getting Started"), "getting-started");
        assert_eq!(slugify("  API: v2 (beta)!  "), "api-v2-beta");
        assert_eq!(slugify("a -- b"), "a-b");
    }

    #[test]
    fn test_extract_headings() {
        let md = "# Widgets\nintro\n## Install {#setup}\n```\n# not a heading\n```\n### Usage ##\n";
        let headings = extract_headings(md);
        assert_eq!(headings.len(), 3);
        assert_eq!(headings[0], Heading { level: 1, text: "Widgets".into(), id: "widgets".into() });
        assert_eq!(headings[1].id, "setup");
        assert_eq!(headings[2].text, "Usage");
    }

    #[test]
    fn test_split_sections() {
        let md = "Badges here\n# Widgets\nA widget library.\n## Install\n```\n# cargo install\n```\n## Usage\n";
        let sections = split_sections(md);

        assert_eq!(sections.len(), 4);
        assert_eq!(sections[0].title, "Introduction");
        assert_eq!(sections[0].body, "Badges here");
        assert_eq!(sections[1].id, "widgets");
        assert_eq!(sections[1].body, "A widget library.");
        assert!(sections[2].body.contains("# cargo install"));
        assert_eq!(sections[3].title, "Usage");
        assert!(sections[3].body.is_empty());
    }

    #[test]
    fn test_split_sections_without_preamble() {
        let sections = split_sections("# Widgets\nA widget library.");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "Widgets");
        assert!(split_sections("  \n").is_empty());
    }

    #[test]
    fn test_build_navigation_nests_by_level() {
        let headings = extract_headings("# A\n## B\n### C\n## D\n# E\n");
        let nav = build_navigation(&headings);

        assert_eq!(nav.len(), 2);
        assert_eq!(nav[0].title, "A");
        assert_eq!(nav[0].children.len(), 2);
        assert_eq!(nav[0].children[0].children[0].id, "c");
        assert_eq!(nav[0].children[1].title, "D");
        assert!(nav[1].children.is_empty());
    }

    #[test]
    fn test_demote_headings() {
        let md = "# Widgets\ntext\n```\n# comment\n```\n##### Deep";
        assert_eq!(
            demote_headings(md, 2),
            "### Widgets\ntext\n```\n# comment\n```\n###### Deep"
        );
    }

    #[test]
    fn test_render_toc_respects_max_level() {
        let headings = extract_headings("# A\n## B\n#### Deep\n");
        assert_eq!(render_toc(&headings, 3), "- [A](#a)\n  - [B](#b)");
    }
}
