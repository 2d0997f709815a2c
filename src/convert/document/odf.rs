//! OpenDocument text (`.odt`) reader and writer.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use cf_core::{Error, Result};

use super::model::{push_text, segments, Block, Document, Run, Segment};
use crate::convert::container::{xml_text, ContainerReader, ContainerWriter};

const MIMETYPE: &str = "application/vnd.oasis.opendocument.text";

pub fn read(bytes: &[u8]) -> Result<Document> {
    let mut container = ContainerReader::open(bytes, "odt")?;
    let xml = container.read_string("content.xml")?;
    parse_content_xml(&xml)
}

fn attr(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

#[derive(Debug, Clone, Copy, Default)]
struct TextStyle {
    bold: bool,
    italic: bool,
}

fn parse_content_xml(xml: &str) -> Result<Document> {
    let mut reader = Reader::from_str(xml);

    // Automatic styles: name -> character style.
    let mut styles: HashMap<String, TextStyle> = HashMap::new();
    let mut defining: Option<String> = None;

    let mut doc = Document::default();
    let mut runs: Vec<Run> = Vec::new();
    let mut heading: Option<u8> = None;
    let mut depth = 0usize;
    // Style stack for nested text:span elements.
    let mut span_stack: Vec<TextStyle> = Vec::new();

    loop {
        let event = reader.read_event().map_err(|e| {
            Error::conversion(
                "read odt",
                format!("XML error at {}: {e}", reader.buffer_position()),
            )
        })?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"style" => defining = attr(&e, b"name"),
                b"h" | b"p" => {
                    if depth == 0 {
                        runs.clear();
                        heading = if e.local_name().as_ref() == b"h" {
                            Some(
                                attr(&e, b"outline-level")
                                    .and_then(|v| v.parse::<u8>().ok())
                                    .unwrap_or(1),
                            )
                        } else {
                            None
                        };
                    }
                    depth += 1;
                    let style = attr(&e, b"style-name")
                        .and_then(|n| styles.get(&n).copied())
                        .unwrap_or_default();
                    span_stack.push(style);
                }
                b"span" => {
                    let parent = span_stack.last().copied().unwrap_or_default();
                    let own = attr(&e, b"style-name").and_then(|n| styles.get(&n).copied());
                    span_stack.push(match own {
                        Some(s) => TextStyle {
                            bold: parent.bold || s.bold,
                            italic: parent.italic || s.italic,
                        },
                        None => parent,
                    });
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"text-properties" => {
                    if let Some(ref name) = defining {
                        let bold = attr(&e, b"font-weight").is_some_and(|w| w == "bold");
                        let italic = attr(&e, b"font-style").is_some_and(|s| s == "italic");
                        styles.insert(name.clone(), TextStyle { bold, italic });
                    }
                }
                b"h" | b"p" if depth == 0 => doc.blocks.push(Block::Paragraph(Vec::new())),
                b"s" if depth > 0 => {
                    let count = attr(&e, b"c")
                        .and_then(|c| c.parse::<usize>().ok())
                        .unwrap_or(1);
                    let style = span_stack.last().copied().unwrap_or_default();
                    push_text(&mut runs, &" ".repeat(count), style.bold, style.italic);
                }
                b"tab" if depth > 0 => {
                    let style = span_stack.last().copied().unwrap_or_default();
                    push_text(&mut runs, "\t", style.bold, style.italic);
                }
                b"line-break" if depth > 0 => {
                    let style = span_stack.last().copied().unwrap_or_default();
                    push_text(&mut runs, "\n", style.bold, style.italic);
                }
                _ => {}
            },
            Event::Text(e) if depth > 0 => {
                let text = e.unescape().map_err(|e| Error::conversion("read odt", e))?;
                let style = span_stack.last().copied().unwrap_or_default();
                push_text(&mut runs, &text, style.bold, style.italic);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"style" => defining = None,
                b"span" => {
                    span_stack.pop();
                }
                b"h" | b"p" => {
                    span_stack.pop();
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        let taken = std::mem::take(&mut runs);
                        doc.blocks.push(match heading.take() {
                            Some(level) => Block::heading(level, taken),
                            None => Block::Paragraph(taken),
                        });
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(doc)
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0" manifest:version="1.2"><manifest:file-entry manifest:full-path="/" manifest:media-type="application/vnd.oasis.opendocument.text"/><manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/></manifest:manifest>"#;

const CONTENT_HEAD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:style="urn:oasis:names:tc:opendocument:xmlns:style:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0" xmlns:fo="urn:oasis:names:tc:opendocument:xmlns:xsl-fo-compatible:1.0" office:version="1.2"><office:automatic-styles><style:style style:name="B" style:family="text"><style:text-properties fo:font-weight="bold"/></style:style><style:style style:name="I" style:family="text"><style:text-properties fo:font-style="italic"/></style:style><style:style style:name="BI" style:family="text"><style:text-properties fo:font-weight="bold" fo:font-style="italic"/></style:style></office:automatic-styles><office:body><office:text>"#;

const CONTENT_TAIL: &str = "</office:text></office:body></office:document-content>";

fn span_style(run: &Run) -> Option<&'static str> {
    match (run.bold, run.italic) {
        (true, true) => Some("BI"),
        (true, false) => Some("B"),
        (false, true) => Some("I"),
        (false, false) => None,
    }
}

fn push_run_text(xml: &mut String, text: &str) {
    for seg in segments(text) {
        match seg {
            Segment::Text(t) => push_spaced(xml, t),
            Segment::Tab => xml.push_str("<text:tab/>"),
            Segment::Break => xml.push_str("<text:line-break/>"),
        }
    }
}

/// ODF collapses runs of spaces; encode the extras as `<text:s/>`.
fn push_spaced(xml: &mut String, text: &str) {
    let mut spaces = 0usize;
    let mut pending = String::new();
    let flush_spaces = |xml: &mut String, spaces: usize| match spaces {
        0 => {}
        1 => xml.push(' '),
        n => {
            xml.push(' ');
            xml.push_str(&format!(r#"<text:s text:c="{}"/>"#, n - 1));
        }
    };
    for ch in text.chars() {
        if ch == ' ' {
            if !pending.is_empty() {
                xml.push_str(&xml_text(pending.as_str()));
                pending.clear();
            }
            spaces += 1;
        } else {
            flush_spaces(xml, spaces);
            spaces = 0;
            pending.push(ch);
        }
    }
    if !pending.is_empty() {
        xml.push_str(&xml_text(pending.as_str()));
    }
    flush_spaces(xml, spaces);
}

fn content_xml(doc: &Document) -> String {
    let mut xml = String::from(CONTENT_HEAD);
    for block in &doc.blocks {
        match block.level() {
            Some(level) => xml.push_str(&format!(r#"<text:h text:outline-level="{level}">"#)),
            None => xml.push_str("<text:p>"),
        }
        for run in block.runs() {
            match span_style(run) {
                Some(style) => {
                    xml.push_str(&format!(r#"<text:span text:style-name="{style}">"#));
                    push_run_text(&mut xml, &run.text);
                    xml.push_str("</text:span>");
                }
                None => push_run_text(&mut xml, &run.text),
            }
        }
        xml.push_str(if block.level().is_some() {
            "</text:h>"
        } else {
            "</text:p>"
        });
    }
    xml.push_str(CONTENT_TAIL);
    xml
}

/// Serialize as ODT. The `mimetype` entry is always first and stored.
pub fn write(doc: &Document, compress: bool) -> Result<Vec<u8>> {
    let mut container = ContainerWriter::new(compress);
    container.add_stored("mimetype", MIMETYPE.as_bytes())?;
    container.add("META-INF/manifest.xml", MANIFEST.as_bytes())?;
    container.add("content.xml", content_xml(doc).as_bytes())?;
    container.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_preserves_structure() {
        let doc = Document {
            blocks: vec![
                Block::heading(1, vec![Run::plain("Chapter")]),
                Block::Paragraph(vec![
                    Run::plain("a  b   "),
                    Run::styled("strong", true, false),
                    Run::styled("both", true, true),
                ]),
                Block::Paragraph(vec![Run::plain("x\ty\nz <&>")]),
                Block::Paragraph(Vec::new()),
            ],
        };
        let bytes = write(&doc, false).unwrap();
        assert_eq!(read(&bytes).unwrap(), doc);
    }

    #[test]
    fn control_characters_never_reach_content_xml() {
        let doc = Document::from_plain_text("page one\u{000C}page two\u{0001}\n");
        let xml = content_xml(&doc);
        assert!(!xml
            .chars()
            .any(|c| c < ' ' && !matches!(c, '\t' | '\n' | '\r')));
        assert!(xml.contains("onepage"));
        assert!(xml.contains("two"));
    }

    #[test]
    fn mimetype_is_first_entry() {
        let bytes = write(&Document::default(), true).unwrap();
        // Local file header name starts at offset 30.
        assert_eq!(&bytes[30..38], b"mimetype");
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.as_slice())).unwrap();
        let first = archive.by_index(0).unwrap();
        assert_eq!(first.compression(), zip::CompressionMethod::Stored);
    }

    #[test]
    fn reads_nested_spans_and_named_styles() {
        let xml = r#"<office:document-content xmlns:office="o" xmlns:style="s" xmlns:text="t" xmlns:fo="f">
            <office:automatic-styles>
              <style:style style:name="T1" style:family="text"><style:text-properties fo:font-style="italic"/></style:style>
              <style:style style:name="T2" style:family="text"><style:text-properties fo:font-weight="bold"/></style:style>
            </office:automatic-styles>
            <office:body><office:text>
              <text:h text:outline-level="2">Sub</text:h>
              <text:p>go <text:span text:style-name="T1">lean<text:span text:style-name="T2">er</text:span></text:span><text:s text:c="2"/>!</text:p>
            </office:text></office:body></office:document-content>"#;
        let doc = parse_content_xml(xml).unwrap();
        assert_eq!(doc.blocks.len(), 2);
        assert_eq!(doc.blocks[0], Block::heading(2, vec![Run::plain("Sub")]));
        assert_eq!(
            doc.blocks[1].runs(),
            &[
                Run::plain("go "),
                Run::styled("lean", false, true),
                Run::styled("er", true, true),
                Run::plain("  !"),
            ]
        );
    }
}
