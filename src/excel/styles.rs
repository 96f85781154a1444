//! Cell format records of `xl/styles.xml`.
//!
//! A cell with number-format or alignment overrides is written with a
//! format record derived from its original one: same font, fill, border and
//! protection, new `numFmtId` and `<alignment>`. Derived records are appended
//! to `cellXfs`; existing records are never changed.

use crate::excel::model::{CellStyle, HAlign, VAlign};
use crate::excel::xml::{attr, attrs, element, local_name, rewrite, set_pair, XmlResult};
use quick_xml::events::{BytesEnd, Event};
use quick_xml::{Reader, Writer};
use std::collections::{BTreeMap, HashMap};

/// First id available to custom number formats.
const FIRST_CUSTOM_NUM_FMT: u32 = 164;

/// Built-in number formats this crate may ask for.
const BUILTIN_NUM_FMTS: &[(u32, &str)] = &[
    (0, "General"),
    (1, "0"),
    (2, "0.00"),
    (9, "0%"),
    (10, "0.00%"),
    (14, "mm-dd-yy"),
    (15, "d-mmm-yy"),
    (16, "d-mmm"),
    (17, "mmm-yy"),
    (22, "m/d/yy h:mm"),
];

#[derive(Debug, Clone, PartialEq, Default)]
struct Xf {
    attrs: Vec<(String, String)>,
    alignment: Option<Vec<(String, String)>>,
    protection: Option<Vec<(String, String)>>,
}

impl Xf {
    fn fallback() -> Self {
        let attrs = ["numFmtId", "fontId", "fillId", "borderId", "xfId"]
            .iter()
            .map(|k| (k.to_string(), "0".to_string()))
            .collect();
        Self {
            attrs,
            ..Self::default()
        }
    }

    fn set_alignment(&mut self, key: &str, value: &str) {
        set_pair(self.alignment.get_or_insert_with(Vec::new), key, value);
        set_pair(&mut self.attrs, "applyAlignment", "1");
    }
}

#[derive(Debug, Default)]
pub(crate) struct StyleTable {
    custom_formats: BTreeMap<u32, String>,
    added_formats: Vec<u32>,
    xfs: Vec<Xf>,
    original_xfs: usize,
    resolved: HashMap<CellStyle, u32>,
}

impl StyleTable {
    pub(crate) fn parse(xml: &[u8]) -> XmlResult<Self> {
        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();
        let mut table = Self::default();
        let mut in_cell_xfs = false;
        let mut in_xf = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => match local_name(e.name().as_ref()) {
                    b"cellXfs" => in_cell_xfs = true,
                    b"xf" if in_cell_xfs => {
                        table.xfs.push(Xf {
                            attrs: attrs(&e)?,
                            ..Xf::default()
                        });
                        in_xf = true;
                    }
                    _ => {}
                },
                Event::Empty(e) => match local_name(e.name().as_ref()) {
                    b"numFmt" => {
                        let id = attr(&e, b"numFmtId").and_then(|v| v.parse().ok());
                        if let (Some(id), Some(code)) = (id, attr(&e, b"formatCode")) {
                            table.custom_formats.insert(id, code);
                        }
                    }
                    b"xf" if in_cell_xfs => table.xfs.push(Xf {
                        attrs: attrs(&e)?,
                        ..Xf::default()
                    }),
                    b"alignment" if in_xf => {
                        if let Some(xf) = table.xfs.last_mut() {
                            xf.alignment = Some(attrs(&e)?);
                        }
                    }
                    b"protection" if in_xf => {
                        if let Some(xf) = table.xfs.last_mut() {
                            xf.protection = Some(attrs(&e)?);
                        }
                    }
                    _ => {}
                },
                Event::End(e) => match local_name(e.name().as_ref()) {
                    b"cellXfs" => in_cell_xfs = false,
                    b"xf" => in_xf = false,
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        table.original_xfs = table.xfs.len();
        Ok(table)
    }

    /// Format record index to write for `style`.
    pub(crate) fn resolve(&mut self, style: &CellStyle) -> u32 {
        if !style.has_overrides() {
            return style.xf;
        }
        if let Some(&index) = self.resolved.get(style) {
            return index;
        }

        let base = self
            .xfs
            .get(style.xf as usize)
            .cloned()
            .unwrap_or_else(Xf::fallback);
        let mut xf = base.clone();
        if let Some(code) = &style.num_format {
            let id = self.num_format_id(code).to_string();
            set_pair(&mut xf.attrs, "numFmtId", &id);
            set_pair(&mut xf.attrs, "applyNumberFormat", "1");
        }
        if let Some(h) = style.h_align {
            xf.set_alignment("horizontal", h_align_name(h));
        }
        if let Some(v) = style.v_align {
            xf.set_alignment("vertical", v_align_name(v));
        }

        let index = if xf == base && (style.xf as usize) < self.xfs.len() {
            style.xf
        } else if let Some(existing) = self.xfs.iter().position(|x| *x == xf) {
            existing as u32
        } else {
            self.xfs.push(xf);
            (self.xfs.len() - 1) as u32
        };
        self.resolved.insert(style.clone(), index);
        index
    }

    fn num_format_id(&mut self, code: &str) -> u32 {
        if let Some((id, _)) = BUILTIN_NUM_FMTS.iter().find(|(_, c)| *c == code) {
            return *id;
        }
        if let Some((id, _)) = self.custom_formats.iter().find(|(_, c)| c.as_str() == code) {
            return *id;
        }
        let id = self
            .custom_formats
            .keys()
            .next_back()
            .map_or(FIRST_CUSTOM_NUM_FMT, |last| (last + 1).max(FIRST_CUSTOM_NUM_FMT));
        self.custom_formats.insert(id, code.to_string());
        self.added_formats.push(id);
        id
    }

    pub(crate) fn is_modified(&self) -> bool {
        self.xfs.len() > self.original_xfs || !self.added_formats.is_empty()
    }

    /// `original` with the added number formats and format records spliced in.
    pub(crate) fn render(&self, original: &[u8]) -> XmlResult<Vec<u8>> {
        let mut reader = Reader::from_reader(original);
        let mut writer = Writer::new(Vec::with_capacity(original.len() + 256));
        let mut buf = Vec::new();
        let mut saw_num_fmts = false;
        let num_fmt_count = self.custom_formats.len().to_string();
        let xf_count = self.xfs.len().to_string();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if local_name(e.name().as_ref()) == b"numFmts" => {
                    saw_num_fmts = true;
                    writer.write_event(Event::Start(rewrite(&e, &[("count", &num_fmt_count)], &[])?))?;
                }
                Event::Empty(e) if local_name(e.name().as_ref()) == b"numFmts" => {
                    saw_num_fmts = true;
                    self.write_num_fmts(&mut writer)?;
                }
                Event::End(e) if local_name(e.name().as_ref()) == b"numFmts" => {
                    self.write_added_formats(&mut writer)?;
                    writer.write_event(Event::End(e))?;
                }
                // <numFmts> must come first in <styleSheet>
                Event::Start(e) if !saw_num_fmts && local_name(e.name().as_ref()) == b"fonts" => {
                    saw_num_fmts = true;
                    self.write_num_fmts_if_added(&mut writer)?;
                    writer.write_event(Event::Start(e))?;
                }
                Event::Empty(e) if !saw_num_fmts && local_name(e.name().as_ref()) == b"fonts" => {
                    saw_num_fmts = true;
                    self.write_num_fmts_if_added(&mut writer)?;
                    writer.write_event(Event::Empty(e))?;
                }
                Event::Start(e) if local_name(e.name().as_ref()) == b"cellXfs" => {
                    writer.write_event(Event::Start(rewrite(&e, &[("count", &xf_count)], &[])?))?;
                }
                Event::End(e) if local_name(e.name().as_ref()) == b"cellXfs" => {
                    for xf in &self.xfs[self.original_xfs..] {
                        write_xf(&mut writer, xf)?;
                    }
                    writer.write_event(Event::End(e))?;
                }
                Event::Eof => break,
                ev => writer.write_event(ev)?,
            }
            buf.clear();
        }
        Ok(writer.into_inner())
    }

    fn write_num_fmts(&self, writer: &mut Writer<Vec<u8>>) -> XmlResult<()> {
        let count = self.custom_formats.len().to_string();
        let start = element("numFmts", &[("count".to_string(), count)]);
        writer.write_event(Event::Start(start))?;
        self.write_added_formats(writer)?;
        writer.write_event(Event::End(BytesEnd::new("numFmts")))?;
        Ok(())
    }

    fn write_num_fmts_if_added(&self, writer: &mut Writer<Vec<u8>>) -> XmlResult<()> {
        if self.added_formats.is_empty() {
            return Ok(());
        }
        self.write_num_fmts(writer)
    }

    fn write_added_formats(&self, writer: &mut Writer<Vec<u8>>) -> XmlResult<()> {
        for id in &self.added_formats {
            let code = self.custom_formats.get(id).cloned().unwrap_or_default();
            let e = element(
                "numFmt",
                &[("numFmtId".to_string(), id.to_string()), ("formatCode".to_string(), code)],
            );
            writer.write_event(Event::Empty(e))?;
        }
        Ok(())
    }
}

fn write_xf(writer: &mut Writer<Vec<u8>>, xf: &Xf) -> XmlResult<()> {
    let start = element("xf", &xf.attrs);
    if xf.alignment.is_none() && xf.protection.is_none() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    if let Some(alignment) = &xf.alignment {
        writer.write_event(Event::Empty(element("alignment", alignment)))?;
    }
    if let Some(protection) = &xf.protection {
        writer.write_event(Event::Empty(element("protection", protection)))?;
    }
    writer.write_event(Event::End(BytesEnd::new("xf")))?;
    Ok(())
}

fn h_align_name(h: HAlign) -> &'static str {
    match h {
        HAlign::Left => "left",
        HAlign::Center => "center",
        HAlign::Right => "right",
    }
}

fn v_align_name(v: VAlign) -> &'static str {
    match v {
        VAlign::Top => "top",
        VAlign::Center => "center",
        VAlign::Bottom => "bottom",
    }
}
