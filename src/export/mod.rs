//! Export of stored visits

pub mod csv;

pub use self::csv::{export_visits, render_csv, write_file, ExportError, HEADER};
