use std::fmt;
use thiserror::Error;

use crate::feed::{Entry, FeedSource};

/// Template used when neither the feed nor the global config sets one.
pub const DEFAULT_FORMAT: &str = "[{feed.name}] {entry.title} {entry.link}";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unknown placeholder {{{0}}} in format template")]
    UnknownPlaceholder(String),

    #[error("Unclosed '{{' in format template")]
    Unclosed,

    #[error("Unmatched '}}' in format template")]
    UnmatchedClose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    FeedName,
    FeedChannels,
    EntryTitle,
    EntryLink,
    EntryUpdated,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "name" | "feed.name" => Some(Field::FeedName),
            "feed.channels" => Some(Field::FeedChannels),
            "entry.title" => Some(Field::EntryTitle),
            "entry.link" => Some(Field::EntryLink),
            "entry.updated" => Some(Field::EntryUpdated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// A message template such as `[{feed.name}] {entry.title} - {entry.link}`.
///
/// Placeholders are validated when the template is parsed, so rendering
/// cannot fail. `{{` and `}}` produce literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => name.push(c),
                            None => return Err(TemplateError::Unclosed),
                        }
                    }
                    let field = Field::from_name(&name)
                        .ok_or_else(|| TemplateError::UnknownPlaceholder(name.clone()))?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                }
                '}' => return Err(TemplateError::UnmatchedClose),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Substitute feed and entry fields into the template.
    pub fn render(&self, feed: &FeedSource, entry: &Entry) -> String {
        let mut out = String::with_capacity(self.raw.len() + entry.title.len() + entry.link.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(Field::FeedName) => out.push_str(&feed.name),
                Segment::Field(Field::FeedChannels) => out.push_str(&feed.channels.join(",")),
                Segment::Field(Field::EntryTitle) => out.push_str(&entry.title),
                Segment::Field(Field::EntryLink) => out.push_str(&entry.link),
                Segment::Field(Field::EntryUpdated) => out.push_str(&entry.updated),
            }
        }
        out
    }
}

impl Default for Template {
    fn default() -> Self {
        Self {
            raw: DEFAULT_FORMAT.to_string(),
            segments: vec![
                Segment::Literal("[".to_string()),
                Segment::Field(Field::FeedName),
                Segment::Literal("] ".to_string()),
                Segment::Field(Field::EntryTitle),
                Segment::Literal(" ".to_string()),
                Segment::Field(Field::EntryLink),
            ],
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
