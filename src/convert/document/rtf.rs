//! RTF reader and writer.
//!
//! The reader understands the subset word processors actually emit for
//! running text: paragraphs, bold/italic toggles, outline levels, hex and
//! unicode escapes. Font tables, pictures, fields and every other
//! destination are skipped.

use cf_core::{Error, Result};

use super::model::{push_text, segments, Block, Document, Segment};

/// Destinations whose contents are not document text.
const SKIPPED_DESTINATIONS: &[&str] = &[
    "fonttbl",
    "colortbl",
    "stylesheet",
    "info",
    "pict",
    "header",
    "headerl",
    "headerr",
    "footer",
    "footerl",
    "footerr",
    "footnote",
    "fldinst",
    "themedata",
    "colorschememapping",
    "datastore",
    "latentstyles",
    "listtable",
    "listoverridetable",
    "rsidtbl",
    "generator",
    "object",
    "xmlnstbl",
    "filetbl",
    "revtbl",
];

/// Whether `bytes` look like an RTF document.
pub fn is_rtf(bytes: &[u8]) -> bool {
    let trimmed = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|i| &bytes[i..])
        .unwrap_or(&[]);
    trimmed.starts_with(b"{\\rtf")
}

#[derive(Debug, Clone, Copy)]
struct GroupState {
    bold: bool,
    italic: bool,
    skip: bool,
    /// Fallback characters to drop after `\uN`.
    uc: usize,
}

impl Default for GroupState {
    fn default() -> Self {
        Self {
            bold: false,
            italic: false,
            skip: false,
            uc: 1,
        }
    }
}

struct RtfReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    stack: Vec<GroupState>,
    cur: GroupState,
    doc: Document,
    runs: Vec<super::model::Run>,
    heading: Option<u8>,
    /// Fallback characters still to drop after a `\uN`.
    pending_skip: usize,
    high_surrogate: Option<u16>,
}

/// Parse an RTF document.
pub fn read(bytes: &[u8]) -> Result<Document> {
    if !is_rtf(bytes) {
        return Err(Error::conversion("read rtf", "missing {\\rtf header"));
    }
    let mut reader = RtfReader {
        bytes,
        pos: 0,
        stack: Vec::new(),
        cur: GroupState::default(),
        doc: Document::default(),
        runs: Vec::new(),
        heading: None,
        pending_skip: 0,
        high_surrogate: None,
    };
    reader.run();
    Ok(reader.doc)
}

impl RtfReader<'_> {
    fn run(&mut self) {
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            self.pos += 1;
            match b {
                b'{' => {
                    self.stack.push(self.cur);
                    self.pending_skip = 0;
                }
                b'}' => {
                    if let Some(prev) = self.stack.pop() {
                        self.cur = prev;
                    }
                    self.pending_skip = 0;
                }
                b'\\' => self.control(),
                b'\r' | b'\n' => {}
                _ => self.emit_char(b as char),
            }
        }
        self.end_paragraph(false);
    }

    fn control(&mut self) {
        let Some(&next) = self.bytes.get(self.pos) else {
            return;
        };
        if !next.is_ascii_alphabetic() {
            self.pos += 1;
            match next {
                b'\\' | b'{' | b'}' => self.emit_char(next as char),
                b'\'' => {
                    let hex = self.bytes.get(self.pos..self.pos + 2);
                    self.pos += 2;
                    if let Some(value) = hex
                        .and_then(|h| std::str::from_utf8(h).ok())
                        .and_then(|h| u8::from_str_radix(h, 16).ok())
                    {
                        self.emit_char(cp1252(value));
                    }
                }
                b'*' => self.cur.skip = true,
                b'~' => self.emit_char('\u{a0}'),
                b'_' => self.emit_char('-'),
                b'\r' | b'\n' => self.end_paragraph(true),
                b'\t' => self.emit_text("\t"),
                _ => {}
            }
            return;
        }

        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_alphabetic() {
            self.pos += 1;
        }
        let word = String::from_utf8_lossy(&self.bytes[start..self.pos]).to_string();

        let num_start = self.pos;
        if self.bytes.get(self.pos) == Some(&b'-') {
            self.pos += 1;
        }
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        let param: Option<i32> = std::str::from_utf8(&self.bytes[num_start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok());
        if self.bytes.get(self.pos) == Some(&b' ') {
            self.pos += 1;
        }

        self.control_word(&word, param);
    }

    fn control_word(&mut self, word: &str, param: Option<i32>) {
        if SKIPPED_DESTINATIONS.contains(&word) {
            self.cur.skip = true;
            return;
        }
        let on = param.map_or(true, |p| p != 0);
        match word {
            "par" | "sect" | "page" | "row" => self.end_paragraph(true),
            "pard" => self.heading = None,
            "plain" => {
                self.cur.bold = false;
                self.cur.italic = false;
            }
            "b" => self.cur.bold = on,
            "i" => self.cur.italic = on,
            "outlinelevel" => {
                let level = param.unwrap_or(0).clamp(0, 5) as u8;
                self.heading = Some(level + 1);
            }
            "line" => self.emit_text("\n"),
            "tab" | "cell" => self.emit_text("\t"),
            "uc" => self.cur.uc = param.unwrap_or(1).max(0) as usize,
            "u" => {
                if let Some(p) = param {
                    let unit = if p < 0 { (p + 65536) as u16 } else { p as u16 };
                    self.emit_utf16(unit);
                    self.pending_skip = self.cur.uc;
                }
            }
            "emdash" => self.emit_char('\u{2014}'),
            "endash" => self.emit_char('\u{2013}'),
            "bullet" => self.emit_char('\u{2022}'),
            "lquote" => self.emit_char('\u{2018}'),
            "rquote" => self.emit_char('\u{2019}'),
            "ldblquote" => self.emit_char('\u{201c}'),
            "rdblquote" => self.emit_char('\u{201d}'),
            _ => {}
        }
    }

    fn emit_utf16(&mut self, unit: u16) {
        match unit {
            0xD800..=0xDBFF => self.high_surrogate = Some(unit),
            0xDC00..=0xDFFF => {
                if let Some(high) = self.high_surrogate.take() {
                    let decoded = char::decode_utf16([high, unit]).next();
                    if let Some(Ok(ch)) = decoded {
                        self.write_char(ch);
                    }
                }
            }
            _ => {
                self.high_surrogate = None;
                if let Some(ch) = char::from_u32(u32::from(unit)) {
                    self.write_char(ch);
                }
            }
        }
    }

    /// Literal character from the input stream; counts against pending
    /// `\uN` fallbacks.
    fn emit_char(&mut self, ch: char) {
        if self.pending_skip > 0 {
            self.pending_skip -= 1;
            return;
        }
        self.write_char(ch);
    }

    fn emit_text(&mut self, text: &str) {
        self.pending_skip = 0;
        if !self.cur.skip {
            push_text(&mut self.runs, text, self.cur.bold, self.cur.italic);
        }
    }

    fn write_char(&mut self, ch: char) {
        if self.cur.skip {
            return;
        }
        let mut buf = [0u8; 4];
        push_text(
            &mut self.runs,
            ch.encode_utf8(&mut buf),
            self.cur.bold,
            self.cur.italic,
        );
    }

    /// Close the current paragraph. At end of input an empty trailing
    /// paragraph is dropped.
    fn end_paragraph(&mut self, explicit: bool) {
        if self.cur.skip && explicit {
            return;
        }
        if !explicit && self.runs.is_empty() {
            return;
        }
        let runs = std::mem::take(&mut self.runs);
        let block = match self.heading {
            Some(level) => Block::heading(level, runs),
            None => Block::Paragraph(runs),
        };
        self.doc.blocks.push(block);
    }
}

/// Windows-1252 byte to char.
fn cp1252(byte: u8) -> char {
    const HIGH: [char; 32] = [
        '\u{20ac}', '\u{81}', '\u{201a}', '\u{192}', '\u{201e}', '\u{2026}', '\u{2020}',
        '\u{2021}', '\u{2c6}', '\u{2030}', '\u{160}', '\u{2039}', '\u{152}', '\u{8d}',
        '\u{17d}', '\u{8f}', '\u{90}', '\u{2018}', '\u{2019}', '\u{201c}', '\u{201d}',
        '\u{2022}', '\u{2013}', '\u{2014}', '\u{2dc}', '\u{2122}', '\u{161}', '\u{203a}',
        '\u{153}', '\u{9d}', '\u{17e}', '\u{178}',
    ];
    match byte {
        0x80..=0x9F => HIGH[(byte - 0x80) as usize],
        _ => byte as char,
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Half-point font size for a heading level.
fn heading_size(level: u8) -> u32 {
    match level {
        1 => 36,
        2 => 32,
        3 => 28,
        4 => 26,
        _ => 24,
    }
}

/// Serialize a document as RTF.
pub fn write(doc: &Document) -> Vec<u8> {
    let mut out = String::from(
        "{\\rtf1\\ansi\\ansicpg1252\\deff0{\\fonttbl{\\f0\\fswiss Helvetica;}}\n\\f0\\fs24\n",
    );
    for block in &doc.blocks {
        match block.level() {
            Some(level) => out.push_str(&format!(
                "{{\\pard\\outlinelevel{}\\fs{} ",
                level - 1,
                heading_size(level)
            )),
            None => out.push_str("{\\pard "),
        }
        for run in block.runs() {
            out.push('{');
            if run.bold {
                out.push_str("\\b");
            }
            if run.italic {
                out.push_str("\\i");
            }
            if run.bold || run.italic {
                out.push(' ');
            }
            for seg in segments(&run.text) {
                match seg {
                    Segment::Text(t) => escape_into(&mut out, t),
                    Segment::Tab => out.push_str("\\tab "),
                    Segment::Break => out.push_str("\\line "),
                }
            }
            out.push('}');
        }
        out.push_str("\\par}\n");
    }
    out.push('}');
    out.into_bytes()
}

fn escape_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '\\' | '{' | '}' => {
                out.push('\\');
                out.push(ch);
            }
            c if c.is_ascii() => out.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{}?", *unit as i16));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::document::model::Run;

    #[test]
    fn reads_styles_and_paragraphs() {
        let rtf = br"{\rtf1\ansi{\fonttbl{\f0 Arial;}}\f0 Hello {\b bold} and \i italic\i0 .\par Second\par}";
        let doc = read(rtf).unwrap();
        assert_eq!(doc.blocks.len(), 2);
        assert_eq!(
            doc.blocks[0].runs(),
            &[
                Run::plain("Hello "),
                Run::styled("bold", true, false),
                Run::plain(" and "),
                Run::styled("italic", false, true),
                Run::plain("."),
            ]
        );
        assert_eq!(doc.blocks[1].text(), "Second");
    }

    #[test]
    fn skips_destinations() {
        let rtf = br"{\rtf1{\info{\title Secret}}{\*\generator Foo;}Body\par}";
        let doc = read(rtf).unwrap();
        assert_eq!(doc.to_plain_text(), "Body\n");
    }

    #[test]
    fn decodes_escapes() {
        let rtf = br"{\rtf1 caf\'e9 \u8364? \{x\}\par}";
        let doc = read(rtf).unwrap();
        assert_eq!(doc.blocks[0].text(), "caf\u{e9} \u{20ac} {x}");
    }

    #[test]
    fn rejects_non_rtf() {
        let err = read(b"plain text").unwrap_err();
        assert_eq!(err.kind(), cf_core::ErrorKind::ConversionFailure);
    }

    #[test]
    fn write_then_read_preserves_structure() {
        let doc = Document {
            blocks: vec![
                Block::heading(2, vec![Run::plain("Title")]),
                Block::Paragraph(vec![
                    Run::plain("a\tb "),
                    Run::styled("c{d}", true, true),
                    Run::plain("\u{1F600} \u{e9}"),
                ]),
                Block::Paragraph(Vec::new()),
                Block::Paragraph(vec![Run::plain("line1\nline2")]),
            ],
        };
        let bytes = write(&doc);
        assert!(is_rtf(&bytes));
        let back = read(&bytes).unwrap();
        assert_eq!(back, doc);
    }
}
