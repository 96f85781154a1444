//! The master workbook as a zip package of parts.
//!
//! Parts are kept byte for byte in their original order. Export replaces the
//! few parts it edits and copies the rest, so anything this crate does not
//! model (themes, drawings, comments, validation, defined names) survives.

use crate::error::{RollCallError, RollCallResult};
use crate::excel::xml::{attr, local_name, XmlResult};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const OFFICE_DOCUMENT_REL: &str = "/officeDocument";
const WORKSHEET_REL: &str = "/worksheet";
const STYLES_REL: &str = "/styles";

#[derive(Debug, Clone, PartialEq)]
struct Part {
    name: String,
    data: Vec<u8>,
    is_dir: bool,
}

/// A worksheet entry of `xl/workbook.xml` with its resolved part name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetPart {
    pub name: String,
    pub part: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct XlsxPackage {
    parts: Vec<Part>,
    sheets: Vec<SheetPart>,
    active_sheet: usize,
    styles_part: Option<String>,
}

impl XlsxPackage {
    /// Read every part of an .xlsx archive and resolve the workbook layout.
    pub fn from_bytes(bytes: &[u8]) -> RollCallResult<Self> {
        let read_err = |e: zip::result::ZipError| RollCallError::MasterRead(e.to_string());
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(read_err)?;

        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).map_err(read_err)?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            parts.push(Part {
                name: file.name().to_string(),
                is_dir: file.is_dir(),
                data,
            });
        }

        let mut package = Self {
            parts,
            sheets: Vec::new(),
            active_sheet: 0,
            styles_part: None,
        };
        package.resolve_layout()?;
        debug!(
            parts = package.parts.len(),
            sheets = package.sheets.len(),
            active = package.active_sheet,
            "read xlsx package"
        );
        Ok(package)
    }

    fn resolve_layout(&mut self) -> RollCallResult<()> {
        let root_rels = self.relationships("_rels/.rels")?;
        let workbook_part = root_rels
            .iter()
            .find(|r| r.kind.ends_with(OFFICE_DOCUMENT_REL))
            .map(|r| resolve_target("", &r.target))
            .unwrap_or_else(|| "xl/workbook.xml".to_string());

        let workbook_xml = self.part(&workbook_part).ok_or_else(|| {
            RollCallError::MasterRead(format!("missing workbook part {}", workbook_part))
        })?;
        let (entries, active) = parse_workbook(workbook_xml)
            .map_err(|e| RollCallError::MasterRead(format!("{}: {}", workbook_part, e)))?;

        let rels = self.relationships(&rels_path_for(&workbook_part))?;
        let base = parent_dir(&workbook_part);
        let by_id: HashMap<&str, &Relationship> = rels.iter().map(|r| (r.id.as_str(), r)).collect();

        let mut sheets = Vec::new();
        for (name, rel_id) in entries {
            // Chart sheets and dialog sheets carry no cells
            match by_id.get(rel_id.as_str()) {
                Some(rel) if rel.kind.ends_with(WORKSHEET_REL) => sheets.push(SheetPart {
                    name,
                    part: resolve_target(base, &rel.target),
                }),
                _ => debug!(sheet = %name, "skipping non-worksheet tab"),
            }
        }
        if sheets.is_empty() {
            return Err(RollCallError::MasterRead(
                "workbook has no worksheets".to_string(),
            ));
        }

        self.active_sheet = active.min(sheets.len() - 1);
        self.styles_part = rels
            .iter()
            .find(|r| r.kind.ends_with(STYLES_REL))
            .map(|r| resolve_target(base, &r.target));
        self.sheets = sheets;
        Ok(())
    }

    fn relationships(&self, part: &str) -> RollCallResult<Vec<Relationship>> {
        match self.part(part) {
            Some(xml) => parse_relationships(xml)
                .map_err(|e| RollCallError::MasterRead(format!("{}: {}", part, e))),
            None => Ok(Vec::new()),
        }
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|p| !p.is_dir && p.name == name)
            .map(|p| p.data.as_slice())
    }

    /// Replace the bytes of an existing part.
    pub fn replace_part(&mut self, name: &str, data: Vec<u8>) -> RollCallResult<()> {
        let part = self
            .parts
            .iter_mut()
            .find(|p| !p.is_dir && p.name == name)
            .ok_or_else(|| RollCallError::Serialization(format!("no part named {}", name)))?;
        part.data = data;
        Ok(())
    }

    /// Worksheets in tab order.
    pub fn sheets(&self) -> &[SheetPart] {
        &self.sheets
    }

    /// Worksheet index of the tab selected when the file was saved.
    pub fn active_sheet(&self) -> usize {
        self.active_sheet
    }

    pub fn styles_part(&self) -> Option<&str> {
        self.styles_part.as_deref()
    }

    /// Write the package back out as a zip archive.
    pub fn to_bytes(&self) -> RollCallResult<Vec<u8>> {
        let write_err = |e: zip::result::ZipError| {
            RollCallError::Serialization(format!("Failed to write workbook: {}", e))
        };
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for part in &self.parts {
            if part.is_dir {
                zip.add_directory(part.name.as_str(), options)
                    .map_err(write_err)?;
            } else {
                zip.start_file(part.name.as_str(), options)
                    .map_err(write_err)?;
                zip.write_all(&part.data)?;
            }
        }
        Ok(zip.finish().map_err(write_err)?.into_inner())
    }
}

#[derive(Debug)]
struct Relationship {
    id: String,
    kind: String,
    target: String,
}

fn parse_relationships(xml: &[u8]) -> XmlResult<Vec<Relationship>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"Relationship" => {
                // External targets (hyperlinks) never name a part
                if attr(&e, b"TargetMode").as_deref() == Some("External") {
                    continue;
                }
                if let (Some(id), Some(kind), Some(target)) =
                    (attr(&e, b"Id"), attr(&e, b"Type"), attr(&e, b"Target"))
                {
                    out.push(Relationship { id, kind, target });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// `(sheet name, relationship id)` per tab, plus the active tab index.
fn parse_workbook(xml: &[u8]) -> XmlResult<(Vec<(String, String)>, usize)> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    let mut active = None;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match local_name(e.name().as_ref()) {
                b"sheet" => {
                    if let (Some(name), Some(id)) = (attr(&e, b"name"), attr(&e, b"id")) {
                        sheets.push((name, id));
                    }
                }
                b"workbookView" if active.is_none() => {
                    active = Some(
                        attr(&e, b"activeTab")
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(0),
                    );
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok((sheets, active.unwrap_or(0)))
}

fn parent_dir(part: &str) -> &str {
    part.rfind('/').map(|i| &part[..i]).unwrap_or("")
}

/// `xl/workbook.xml` → `xl/_rels/workbook.xml.rels`
fn rels_path_for(part: &str) -> String {
    let file = part.rsplit('/').next().unwrap_or(part);
    match parent_dir(part) {
        "" => format!("_rels/{}.rels", file),
        dir => format!("{}/_rels/{}.rels", dir, file),
    }
}

/// Part name for a relationship target relative to `base`.
fn resolve_target(base: &str, target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None if base.is_empty() => target.to_string(),
        None => format!("{}/{}", base, target),
    };
    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}
