//! WordprocessingML (`.docx`) reader and writer.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use cf_core::{Error, Result};

use super::model::{push_text, segments, Block, Document, Run, Segment};
use crate::convert::container::{xml_text, ContainerReader, ContainerWriter};

const DOCUMENT_PART: &str = "word/document.xml";

/// Whether `bytes` are a zip container holding a WordprocessingML body.
pub fn is_docx(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK")
        && ContainerReader::open(bytes, "docx")
            .map(|c| c.has(DOCUMENT_PART))
            .unwrap_or(false)
}

pub fn read(bytes: &[u8]) -> Result<Document> {
    let mut container = ContainerReader::open(bytes, "docx")?;
    let xml = container.read_string(DOCUMENT_PART)?;
    parse_document_xml(&xml)
}

/// Heading level from a paragraph style id ("Heading1", "heading 2", "Title").
fn heading_from_style(style: &str) -> Option<u8> {
    let lower = style.to_ascii_lowercase().replace(' ', "");
    if lower == "title" {
        return Some(1);
    }
    lower
        .strip_prefix("heading")
        .and_then(|n| n.parse::<u8>().ok())
        .filter(|n| (1..=6).contains(n))
}

/// Value of a `w:val` attribute, if present.
fn val_attr(e: &BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == b"val")
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

/// Toggle properties (`<w:b/>`, `<w:b w:val="0"/>`).
fn toggle_on(e: &BytesStart<'_>) -> bool {
    !matches!(
        val_attr(e).as_deref(),
        Some("0") | Some("false") | Some("off")
    )
}

fn parse_document_xml(xml: &str) -> Result<Document> {
    let mut reader = Reader::from_str(xml);

    let mut doc = Document::default();
    let mut runs: Vec<Run> = Vec::new();
    let mut heading: Option<u8> = None;
    let mut in_paragraph = false;
    let mut in_ppr = false;
    let mut in_text = false;
    let mut bold = false;
    let mut italic = false;

    loop {
        let event = reader.read_event().map_err(|e| {
            Error::conversion(
                "read docx",
                format!("XML error at {}: {e}", reader.buffer_position()),
            )
        })?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => {
                    in_paragraph = true;
                    runs.clear();
                    heading = None;
                }
                b"pPr" => in_ppr = true,
                b"r" => {
                    bold = false;
                    italic = false;
                }
                b"t" => in_text = true,
                b"b" if !in_ppr => bold = toggle_on(&e),
                b"i" if !in_ppr => italic = toggle_on(&e),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"p" => doc.blocks.push(Block::Paragraph(Vec::new())),
                b"pStyle" if in_ppr => {
                    if let Some(level) = val_attr(&e).as_deref().and_then(heading_from_style) {
                        heading = Some(level);
                    }
                }
                b"outlineLvl" if in_ppr => {
                    if let Some(lvl) = val_attr(&e).and_then(|v| v.parse::<u8>().ok()) {
                        if lvl < 6 {
                            heading = Some(lvl + 1);
                        }
                    }
                }
                b"b" if !in_ppr => bold = toggle_on(&e),
                b"i" if !in_ppr => italic = toggle_on(&e),
                b"tab" if !in_ppr && in_paragraph => push_text(&mut runs, "\t", bold, italic),
                b"br" | b"cr" if in_paragraph => push_text(&mut runs, "\n", bold, italic),
                _ => {}
            },
            Event::Text(e) if in_text => {
                let text = e
                    .unescape()
                    .map_err(|e| Error::conversion("read docx", e))?;
                push_text(&mut runs, &text, bold, italic);
            }
            Event::CData(e) if in_text => {
                let text = String::from_utf8_lossy(&e).to_string();
                push_text(&mut runs, &text, bold, italic);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"pPr" => in_ppr = false,
                b"p" => {
                    let taken = std::mem::take(&mut runs);
                    doc.blocks.push(match heading.take() {
                        Some(level) => Block::heading(level, taken),
                        None => Block::Paragraph(taken),
                    });
                    in_paragraph = false;
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

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

fn styles_xml() -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="{W_NS}"><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:rPr><w:sz w:val="24"/></w:rPr></w:style>"#
    );
    for level in 1..=6u8 {
        let size = match level {
            1 => 36,
            2 => 32,
            3 => 28,
            4 => 26,
            _ => 24,
        };
        xml.push_str(&format!(
            r#"<w:style w:type="paragraph" w:styleId="Heading{level}"><w:name w:val="heading {level}"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:pPr><w:keepNext/><w:outlineLvl w:val="{}"/></w:pPr><w:rPr><w:b/><w:sz w:val="{size}"/></w:rPr></w:style>"#,
            level - 1
        ));
    }
    xml.push_str("</w:styles>");
    xml
}

fn document_xml(doc: &Document) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="{W_NS}"><w:body>"#
    );
    for block in &doc.blocks {
        xml.push_str("<w:p>");
        if let Some(level) = block.level() {
            xml.push_str(&format!(r#"<w:pPr><w:pStyle w:val="Heading{level}"/></w:pPr>"#));
        }
        for run in block.runs() {
            xml.push_str("<w:r>");
            if run.bold || run.italic {
                xml.push_str("<w:rPr>");
                if run.bold {
                    xml.push_str("<w:b/>");
                }
                if run.italic {
                    xml.push_str("<w:i/>");
                }
                xml.push_str("</w:rPr>");
            }
            for seg in segments(&run.text) {
                match seg {
                    Segment::Text(t) => {
                        xml.push_str(r#"<w:t xml:space="preserve">"#);
                        xml.push_str(&xml_text(t));
                        xml.push_str("</w:t>");
                    }
                    Segment::Tab => xml.push_str("<w:tab/>"),
                    Segment::Break => xml.push_str("<w:br/>"),
                }
            }
            xml.push_str("</w:r>");
        }
        xml.push_str("</w:p>");
    }
    xml.push_str(r#"<w:sectPr/></w:body></w:document>"#);
    xml
}

pub fn write(doc: &Document, compress: bool) -> Result<Vec<u8>> {
    let mut container = ContainerWriter::new(compress);
    container.add("[Content_Types].xml", CONTENT_TYPES.as_bytes())?;
    container.add("_rels/.rels", PACKAGE_RELS.as_bytes())?;
    container.add(DOCUMENT_PART, document_xml(doc).as_bytes())?;
    container.add("word/_rels/document.xml.rels", DOCUMENT_RELS.as_bytes())?;
    container.add("word/styles.xml", styles_xml().as_bytes())?;
    container.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document {
            blocks: vec![
                Block::heading(1, vec![Run::plain("Report")]),
                Block::Paragraph(vec![
                    Run::plain("Tom & Jerry "),
                    Run::styled("<bold>", true, false),
                    Run::styled(" slanted", false, true),
                ]),
                Block::Paragraph(Vec::new()),
                Block::Paragraph(vec![Run::plain("col1\tcol2\nnext line")]),
            ],
        }
    }

    #[test]
    fn write_then_read_preserves_structure() {
        let doc = sample();
        let bytes = write(&doc, true).unwrap();
        assert!(is_docx(&bytes));
        assert_eq!(read(&bytes).unwrap(), doc);
    }

    #[test]
    fn reads_word_style_markup() {
        let xml = r#"<w:document xmlns:w="x"><w:body>
            <w:p><w:pPr><w:pStyle w:val="Heading2"/><w:rPr><w:b/></w:rPr></w:pPr><w:r><w:t>Intro</w:t></w:r></w:p>
            <w:p><w:r><w:rPr><w:b w:val="0"/><w:i/></w:rPr><w:t xml:space="preserve">soft </w:t></w:r><w:r><w:t>plain</w:t></w:r></w:p>
            </w:body></w:document>"#;
        let doc = parse_document_xml(xml).unwrap();
        assert_eq!(doc.blocks.len(), 2);
        assert_eq!(doc.blocks[0], Block::heading(2, vec![Run::plain("Intro")]));
        assert_eq!(
            doc.blocks[1].runs(),
            &[Run::styled("soft ", false, true), Run::plain("plain")]
        );
    }

    #[test]
    fn style_names_map_to_levels() {
        assert_eq!(heading_from_style("Heading3"), Some(3));
        assert_eq!(heading_from_style("heading 1"), Some(1));
        assert_eq!(heading_from_style("Title"), Some(1));
        assert_eq!(heading_from_style("Heading9"), None);
        assert_eq!(heading_from_style("BodyText"), None);
    }

    #[test]
    fn control_characters_never_reach_document_xml() {
        let doc = Document::from_plain_text("page one\u{000C}page two\u{0001}\n");
        let xml = document_xml(&doc);
        assert!(!xml
            .chars()
            .any(|c| c < ' ' && !matches!(c, '\t' | '\n' | '\r')));
        assert!(xml.contains("page onepage two"));

        let bytes = write(&doc, false).unwrap();
        let text: String = read(&bytes).unwrap().blocks[0]
            .runs()
            .iter()
            .map(|r| r.text.as_str())
            .collect();
        assert_eq!(text, "page onepage two");
    }

    #[test]
    fn rejects_non_zip() {
        assert!(!is_docx(b"{\\rtf1}"));
        assert!(read(b"garbage").is_err());
    }
}
