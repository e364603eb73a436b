use anyhow::{Context, Result};
use regex::Regex;

use crate::model::Section;

/// A header line found while scanning a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLine<'a> {
    /// Zero-based.
    pub index: usize,
    pub level: usize,
    pub title: &'a str,
}

#[derive(Debug, Clone)]
pub struct MarkdownParser {
    section_header: Regex,
    any_header: Regex,
}

impl MarkdownParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            section_header: Regex::new(r"^(#{2,6})\s+(.+)$")
                .context("failed to compile section header regex")?,
            any_header: Regex::new(r"^(#{1,6})\s+(.+)$")
                .context("failed to compile header regex")?,
        })
    }

    /// Level and trimmed title of a level 1-6 header line.
    pub fn parse_header<'a>(&self, line: &'a str) -> Option<(usize, &'a str)> {
        capture_header(&self.any_header, line)
    }

    pub fn headers<'a>(&self, text: &'a str) -> Vec<HeaderLine<'a>> {
        text.split('\n')
            .enumerate()
            .filter_map(|(index, line)| {
                self.parse_header(line).map(|(level, title)| HeaderLine {
                    index,
                    level,
                    title,
                })
            })
            .collect()
    }

    pub fn count_headers_at_level(&self, text: &str, level: usize) -> usize {
        self.headers(text)
            .iter()
            .filter(|header| header.level == level)
            .count()
    }

    /// Splits `text` into level 2-6 sections. Lines before the first such
    /// header belong to no section. Each section runs until the line before
    /// the next section header of any level, or the end of the document.
    pub fn parse_sections(&self, text: &str) -> Vec<Section> {
        let lines = text.split('\n').collect::<Vec<&str>>();
        let mut sections = Vec::new();
        let mut current: Option<(usize, String, usize)> = None;

        for (index, line) in lines.iter().enumerate() {
            let Some((level, title)) = capture_header(&self.section_header, line) else {
                continue;
            };

            if let Some((open_level, open_title, start)) = current.take() {
                sections.push(build_section(&lines, open_level, open_title, start, index - 1));
            }
            current = Some((level, title.to_string(), index));
        }

        if let Some((level, title, start)) = current {
            sections.push(build_section(&lines, level, title, start, lines.len() - 1));
        }

        sections
    }
}

fn capture_header<'a>(pattern: &Regex, line: &'a str) -> Option<(usize, &'a str)> {
    let captures = pattern.captures(line)?;
    let level = captures.get(1)?.as_str().len();
    let title = captures.get(2)?.as_str().trim();
    Some((level, title))
}

fn build_section(lines: &[&str], level: usize, title: String, start: usize, end: usize) -> Section {
    Section {
        level,
        title,
        content: lines[start..=end].join("\n"),
        line_start: start,
        line_end: end,
    }
}
