//! Document family: txt, rtf, docx, odt, doc.
//!
//! Every input is read into a [`model::Document`] and every output is
//! written from one, so any pair of document formats converts through the
//! same intermediate form. `.doc` is sniffed: RTF or OOXML content under a
//! `.doc` name is read as such; a genuine binary Word file is rejected.
//! `.doc` output is RTF.

pub mod model;
pub mod odf;
pub mod ooxml;
pub mod rtf;

use async_trait::async_trait;

use cf_core::{Error, Format, Result};

use self::model::Document;
use super::{blocking, ConversionContext, ConversionRequest, FormatConverter};

/// Converter for the document family.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentConverter;

/// Read `bytes` as `source` into the normalized model.
pub fn read(bytes: &[u8], source: Format) -> Result<Document> {
    match source {
        Format::Txt => Ok(Document::from_plain_text(&String::from_utf8_lossy(bytes))),
        Format::Rtf => rtf::read(bytes),
        Format::Docx => ooxml::read(bytes),
        Format::Odt => odf::read(bytes),
        Format::Doc => {
            if rtf::is_rtf(bytes) {
                rtf::read(bytes)
            } else if ooxml::is_docx(bytes) {
                ooxml::read(bytes)
            } else {
                Err(Error::conversion(
                    "read doc",
                    "binary Word documents are not supported; save as .docx or .rtf",
                ))
            }
        }
        other => Err(Error::UnsupportedFormat(format!(
            "{other} is not a document format"
        ))),
    }
}

/// Serialize the model as `target`.
pub fn write(doc: &Document, target: Format, compress: bool) -> Result<Vec<u8>> {
    match target {
        Format::Txt => Ok(doc.to_plain_text().into_bytes()),
        Format::Rtf | Format::Doc => Ok(rtf::write(doc)),
        Format::Docx => ooxml::write(doc, compress),
        Format::Odt => odf::write(doc, compress),
        other => Err(Error::unsupported_target("document", other)),
    }
}

#[async_trait]
impl FormatConverter for DocumentConverter {
    fn name(&self) -> &'static str {
        "document"
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
        ctx: &ConversionContext<'_>,
    ) -> Result<Vec<u8>> {
        let source = request.source;
        let target = request.target;
        let compress = request.settings.document().compress;

        if !matches!(
            target,
            Format::Txt | Format::Rtf | Format::Doc | Format::Docx | Format::Odt
        ) {
            return Err(Error::unsupported_target(source, target));
        }

        let bytes = request.bytes.clone();
        let doc = blocking(move || read(&bytes, source)).await?;
        ctx.progress.report(40);
        tracing::debug!(job = %ctx.job_id, blocks = doc.blocks.len(), "document parsed");

        let out = blocking(move || write(&doc, target, compress)).await?;
        ctx.progress.report(90);
        Ok(out)
    }
}
