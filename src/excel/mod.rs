//! Excel import/export for roster workbooks
//!
//! - Import: .xlsx bytes → `Workbook` model (calamine values, format indexes
//!   from the sheet XML)
//! - Export: edited `Workbook` → the source package with edited cells,
//!   widths and formats patched in (zip + quick-xml)

mod exporter;
mod importer;
pub mod model;
mod package;
mod styles;
mod xml;

pub use exporter::ExcelExporter;
pub use importer::ExcelImporter;
pub use model::{Cell, CellStyle, CellValue, Sheet, Workbook};
pub use package::{SheetPart, XlsxPackage};
