use std::fs::File;
use std::io::{BufWriter, Write};

use crate::table::ResultTable;

pub(crate) fn write_table(table: &ResultTable, file: File) -> Result<(), serde_json::Error> {
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, table)?;
    writer.flush().map_err(serde_json::Error::io)
}
