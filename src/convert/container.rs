//! Zip containers shared by the OOXML and ODF writers and readers.

use std::borrow::Cow;
use std::io::{Cursor, Read, Write};

use quick_xml::escape::escape;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use cf_core::{Error, Result};

/// Deflate level used for container entries when compression is on.
const DEFLATE_LEVEL: i64 = 6;

/// Whether `ch` is allowed in XML 1.0 character data.
fn is_xml_char(ch: char) -> bool {
    matches!(
        ch,
        '\t' | '\n' | '\r'
            | '\u{20}'..='\u{D7FF}'
            | '\u{E000}'..='\u{FFFD}'
            | '\u{10000}'..='\u{10FFFF}'
    )
}

/// Escape `text` for element content or attribute values. Characters XML 1.0
/// forbids (C0 controls other than tab and newlines, lone surrogates, U+FFFE
/// and U+FFFF) are dropped.
pub(crate) fn xml_text(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_xml_char) {
        return escape(text);
    }
    let clean: String = text.chars().filter(|&ch| is_xml_char(ch)).collect();
    Cow::Owned(escape(clean.as_str()).into_owned())
}

/// In-memory zip writer.
pub(crate) struct ContainerWriter {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
}

impl ContainerWriter {
    /// Entries are deflated when `compress` is set, stored otherwise.
    pub fn new(compress: bool) -> Self {
        let options = if compress {
            SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(DEFLATE_LEVEL))
        } else {
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
        };
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            options,
        }
    }

    pub fn add(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.zip
            .start_file(name, self.options)
            .map_err(|e| Error::conversion("write container", e))?;
        self.zip.write_all(data)?;
        Ok(())
    }

    /// Add an uncompressed entry regardless of the compression setting.
    pub fn add_stored(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        self.zip
            .start_file(name, options)
            .map_err(|e| Error::conversion("write container", e))?;
        self.zip.write_all(data)?;
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        let cursor = self
            .zip
            .finish()
            .map_err(|e| Error::conversion("write container", e))?;
        Ok(cursor.into_inner())
    }
}

/// Read-only view over a zip container.
pub(crate) struct ContainerReader<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
    kind: &'static str,
}

impl<'a> ContainerReader<'a> {
    /// `kind` names the container in error messages ("docx", "odt").
    pub fn open(bytes: &'a [u8], kind: &'static str) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| Error::conversion(format!("read {kind}"), e))?;
        Ok(Self { archive, kind })
    }

    pub fn has(&self, name: &str) -> bool {
        self.archive.index_for_name(name).is_some()
    }

    /// Read an entry as UTF-8 text.
    pub fn read_string(&mut self, name: &str) -> Result<String> {
        let kind = self.kind;
        let mut file = self
            .archive
            .by_name(name)
            .map_err(|e| Error::conversion(format!("read {kind}"), format!("{name}: {e}")))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|e| Error::conversion(format!("read {kind}"), format!("{name}: {e}")))?;
        Ok(content)
    }
}
