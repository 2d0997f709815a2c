//! Normalized document model shared by every document reader and writer.
//!
//! A document is a flat list of blocks (headings and paragraphs), each made
//! of styled text runs. Tabs and line breaks live inside run text as `'\t'`
//! and `'\n'`; writers translate them into their own markup.

/// A span of text with uniform character styling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Run {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
}

impl Run {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: false,
            italic: false,
        }
    }

    pub fn styled(text: impl Into<String>, bold: bool, italic: bool) -> Self {
        Self {
            text: text.into(),
            bold,
            italic,
        }
    }
}

/// One block-level element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Heading level 1..=6.
    Heading { level: u8, runs: Vec<Run> },
    Paragraph(Vec<Run>),
}

impl Block {
    pub fn heading(level: u8, runs: Vec<Run>) -> Self {
        Block::Heading {
            level: level.clamp(1, 6),
            runs,
        }
    }

    pub fn runs(&self) -> &[Run] {
        match self {
            Block::Heading { runs, .. } | Block::Paragraph(runs) => runs,
        }
    }

    /// Heading level, or `None` for a paragraph.
    pub fn level(&self) -> Option<u8> {
        match self {
            Block::Heading { level, .. } => Some(*level),
            Block::Paragraph(_) => None,
        }
    }

    /// Concatenated run text with styling dropped.
    pub fn text(&self) -> String {
        self.runs().iter().map(|r| r.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    /// One paragraph per line.
    pub fn from_plain_text(text: &str) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let blocks = text
            .lines()
            .map(|line| {
                if line.is_empty() {
                    Block::Paragraph(Vec::new())
                } else {
                    Block::Paragraph(vec![Run::plain(line)])
                }
            })
            .collect();
        Self { blocks }
    }

    /// Markup-free text, one line per block.
    pub fn to_plain_text(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            out.push_str(&block.text());
            out.push('\n');
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| b.runs().iter().all(|r| r.text.is_empty()))
    }
}

/// Append text to `runs`, merging with the last run when the style matches.
pub fn push_text(runs: &mut Vec<Run>, text: &str, bold: bool, italic: bool) {
    if text.is_empty() {
        return;
    }
    if let Some(last) = runs.last_mut() {
        if last.bold == bold && last.italic == italic {
            last.text.push_str(text);
            return;
        }
    }
    runs.push(Run::styled(text, bold, italic));
}

/// Split run text into plain segments, tabs and line breaks.
#[derive(Debug, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Tab,
    Break,
}

pub fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        let special = match ch {
            '\t' => Some(Segment::Tab),
            '\n' => Some(Segment::Break),
            _ => None,
        };
        if let Some(seg) = special {
            if start < idx {
                out.push(Segment::Text(&text[start..idx]));
            }
            out.push(seg);
            start = idx + 1;
        }
    }
    if start < text.len() {
        out.push(Segment::Text(&text[start..]));
    }
    out
}
