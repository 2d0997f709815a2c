//! Spreadsheet family: csv, xlsx, xls.
//!
//! Inputs are read into a [`Workbook`] of typed cells. CSV yields a single
//! sheet; workbooks are read with calamine. A workbook with no sheets is
//! [`Error::EmptyInput`]. Output is either an xlsx package with one
//! worksheet per sheet, or CSV from the first sheet. Legacy binary `.xls`
//! cannot be written.

use std::collections::HashSet;
use std::io::Cursor;

use async_trait::async_trait;
use calamine::{open_workbook_auto_from_rs, Data, Reader};

use cf_core::{Error, Format, Result};

use super::container::{xml_text, ContainerWriter};
use super::{blocking, stage, ConversionContext, ConversionRequest, FormatConverter};

/// Excel's sheet name limit.
const MAX_SHEET_NAME: usize = 31;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    /// Display form used for CSV output.
    pub fn to_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => format_number(*n),
            Cell::Bool(true) => "TRUE".to_string(),
            Cell::Bool(false) => "FALSE".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

/// Shortest decimal form; integral values print without a fraction.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// A CSV field becomes a number only when printing the number reproduces
/// the field exactly, so `007` or `1.50` stay text.
fn parse_csv_cell(field: &str) -> Cell {
    if field.is_empty() {
        return Cell::Empty;
    }
    match field.parse::<f64>() {
        Ok(n) if n.is_finite() && format_number(n) == field => Cell::Number(n),
        _ => Cell::Text(field.to_string()),
    }
}

fn trim_row(mut row: Vec<Cell>) -> Vec<Cell> {
    while row.last() == Some(&Cell::Empty) {
        row.pop();
    }
    row
}

fn trim_rows(mut rows: Vec<Vec<Cell>>) -> Vec<Vec<Cell>> {
    while rows.last().is_some_and(|r| r.is_empty()) {
        rows.pop();
    }
    rows
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

pub fn read_csv(bytes: &[u8]) -> Result<Workbook> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(stage("read csv"))?;
        rows.push(trim_row(record.iter().map(parse_csv_cell).collect()));
    }

    Ok(Workbook {
        sheets: vec![Sheet {
            name: "Sheet1".to_string(),
            rows: trim_rows(rows),
        }],
    })
}

fn from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(e.to_string()),
    }
}

/// Read an xlsx or xls workbook.
pub fn read_workbook(bytes: &[u8]) -> Result<Workbook> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(stage("read workbook"))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| Error::conversion("read workbook", format!("sheet '{name}': {e}")))?;

        let (row_offset, col_offset) = range
            .start()
            .map(|(r, c)| (r as usize, c as usize))
            .unwrap_or((0, 0));

        let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); row_offset];
        for data_row in range.rows() {
            let mut row = vec![Cell::Empty; col_offset];
            row.extend(data_row.iter().map(from_data));
            rows.push(trim_row(row));
        }
        sheets.push(Sheet {
            name,
            rows: trim_rows(rows),
        });
    }

    if sheets.is_empty() {
        return Err(Error::EmptyInput("workbook has no sheets".into()));
    }
    Ok(Workbook { sheets })
}

pub fn read(bytes: &[u8], source: Format) -> Result<Workbook> {
    match source {
        Format::Csv => read_csv(bytes),
        Format::Xlsx | Format::Xls => read_workbook(bytes),
        other => Err(Error::UnsupportedFormat(format!(
            "{other} is not a spreadsheet format"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// CSV from the first sheet.
pub fn write_csv(workbook: &Workbook) -> Result<Vec<u8>> {
    let sheet = workbook
        .sheets
        .first()
        .ok_or_else(|| Error::EmptyInput("workbook has no sheets".into()))?;

    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in &sheet.rows {
        if row.is_empty() {
            // A zero-field record would be written as nothing at all.
            writer.write_record([""]).map_err(stage("write csv"))?;
        } else {
            writer
                .write_record(row.iter().map(Cell::to_text))
                .map_err(stage("write csv"))?;
        }
    }
    writer.into_inner().map_err(stage("write csv"))
}

/// `0 -> A`, `25 -> Z`, `26 -> AA`.
pub fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).to_string()
}

/// Excel-legal, unique sheet names in input order.
fn sheet_names(workbook: &Workbook) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(workbook.sheets.len());
    for (i, sheet) in workbook.sheets.iter().enumerate() {
        let cleaned: String = sheet
            .name
            .chars()
            .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
            .collect();
        let cleaned = cleaned.trim().trim_matches('\'').to_string();
        let base: String = if cleaned.is_empty() {
            format!("Sheet{}", i + 1)
        } else {
            cleaned.chars().take(MAX_SHEET_NAME).collect()
        };

        let mut candidate = base.clone();
        let mut n = 2;
        while seen.contains(&candidate.to_lowercase()) {
            let suffix = format!(" ({n})");
            let keep = MAX_SHEET_NAME.saturating_sub(suffix.chars().count());
            candidate = base.chars().take(keep).collect::<String>() + &suffix;
            n += 1;
        }
        seen.insert(candidate.to_lowercase());
        names.push(candidate);
    }
    names
}

fn worksheet_xml(sheet: &Sheet) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in sheet.rows.iter().enumerate() {
        let row_num = r + 1;
        xml.push_str(&format!(r#"<row r="{row_num}">"#));
        for (c, cell) in row.iter().enumerate() {
            let cell_ref = format!("{}{row_num}", column_letters(c));
            match cell {
                Cell::Empty => {}
                Cell::Number(n) if n.is_finite() => {
                    xml.push_str(&format!(
                        r#"<c r="{cell_ref}"><v>{}</v></c>"#,
                        format_number(*n)
                    ));
                }
                Cell::Bool(b) => {
                    xml.push_str(&format!(
                        r#"<c r="{cell_ref}" t="b"><v>{}</v></c>"#,
                        u8::from(*b)
                    ));
                }
                other => {
                    xml.push_str(&format!(
                        r#"<c r="{cell_ref}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                        xml_text(other.to_text().as_str())
                    ));
                }
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="1"><fill><patternFill patternType="none"/></fill></fills><borders count="1"><border/></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs></styleSheet>"#;

/// xlsx package with one worksheet per sheet.
pub fn write_xlsx(workbook: &Workbook, compress: bool) -> Result<Vec<u8>> {
    if workbook.sheets.is_empty() {
        return Err(Error::EmptyInput("workbook has no sheets".into()));
    }
    let names = sheet_names(workbook);
    let count = workbook.sheets.len();

    let mut content_types = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
    );
    let mut workbook_xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
    );
    let mut workbook_rels = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );

    for (i, name) in names.iter().enumerate() {
        let n = i + 1;
        content_types.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
        workbook_xml.push_str(&format!(
            r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
            xml_text(name.as_str())
        ));
        workbook_rels.push_str(&format!(
            r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{n}.xml"/>"#
        ));
    }
    content_types.push_str("</Types>");
    workbook_xml.push_str("</sheets></workbook>");
    workbook_rels.push_str(&format!(
        r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#,
        count + 1
    ));

    let mut container = ContainerWriter::new(compress);
    container.add("[Content_Types].xml", content_types.as_bytes())?;
    container.add("_rels/.rels", PACKAGE_RELS.as_bytes())?;
    container.add("xl/workbook.xml", workbook_xml.as_bytes())?;
    container.add("xl/_rels/workbook.xml.rels", workbook_rels.as_bytes())?;
    container.add("xl/styles.xml", STYLES.as_bytes())?;
    for (i, sheet) in workbook.sheets.iter().enumerate() {
        container.add(
            &format!("xl/worksheets/sheet{}.xml", i + 1),
            worksheet_xml(sheet).as_bytes(),
        )?;
    }
    container.finish()
}

pub fn write(workbook: &Workbook, target: Format, compress: bool) -> Result<Vec<u8>> {
    match target {
        Format::Csv => write_csv(workbook),
        Format::Xlsx => write_xlsx(workbook, compress),
        other => Err(Error::unsupported_target("spreadsheet", other)),
    }
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Converter for the spreadsheet family.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpreadsheetConverter;

#[async_trait]
impl FormatConverter for SpreadsheetConverter {
    fn name(&self) -> &'static str {
        "spreadsheet"
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
        ctx: &ConversionContext<'_>,
    ) -> Result<Vec<u8>> {
        let source = request.source;
        let target = request.target;
        if !matches!(target, Format::Csv | Format::Xlsx) {
            return Err(Error::unsupported_target(source, target));
        }
        let compress = request.settings.document().compress;

        let bytes = request.bytes.clone();
        let workbook = blocking(move || read(&bytes, source)).await?;
        ctx.progress.report(40);
        tracing::debug!(
            job = %ctx.job_id,
            sheets = workbook.sheets.len(),
            "workbook parsed"
        );
        if target == Format::Csv && workbook.sheets.len() > 1 {
            tracing::info!(
                job = %ctx.job_id,
                dropped = workbook.sheets.len() - 1,
                "csv output keeps only the first sheet"
            );
        }

        let out = blocking(move || write(&workbook, target, compress)).await?;
        ctx.progress.report(90);
        Ok(out)
    }
}
