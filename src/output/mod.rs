//! Output formatting for CLI results

use serde::Serialize;

use frcpm_offline::error::Result;

pub mod display;
pub mod json;
pub mod table;

/// Print data wrapped in the JSON envelope
pub fn print_json<T: Serialize + ?Sized>(data: &T) -> Result<()> {
    println!("{}", json::format_json(data)?);
    Ok(())
}

/// Print rows as a table
pub fn print_table<T: tabled::Tabled>(rows: &[T]) {
    println!("{}", table::format_table(rows));
}
