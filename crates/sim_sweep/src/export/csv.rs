use std::fs::File;

use crate::parameters::format_float;
use crate::table::ResultTable;

/// Header row, then one record per row. Absent metrics are empty fields.
pub(crate) fn write_table(table: &ResultTable, file: File) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record(table.header())?;

    for row in table.rows() {
        let mut record: Vec<String> = row.parameters.iter().map(ToString::to_string).collect();
        record.extend(
            row.metrics
                .iter()
                .map(|value| value.map(format_float).unwrap_or_default()),
        );
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Header plus raw records with their 1-based line numbers.
pub(crate) fn read_records(file: File) -> Result<(Vec<String>, Vec<(u64, csv::StringRecord)>), csv::Error> {
    let mut rdr = csv::Reader::from_reader(file);
    let header = rdr.headers()?.iter().map(str::to_string).collect();

    let mut records = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let line = record.position().map(|position| position.line()).unwrap_or_default();
        records.push((line, record));
    }
    Ok((header, records))
}
