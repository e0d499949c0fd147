use iso8211::*;
use itertools::Itertools;
use std::{env, process::ExitCode, time::Instant};

pub fn main() -> ExitCode {
    let Some(path) = env::args().nth(1) else {
        eprintln!("Usage: iso8211-dump <file>");
        return ExitCode::from(2);
    };
    match dump(&path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error reading {path}: {e}");
            ExitCode::FAILURE
        }
    }
}

fn dump(path: &str) -> Result<()> {
    let start = Instant::now();
    let mut reader = Iso8211Reader::open(path)?;
    let lead = reader.lead_record();
    println!("Field types:");
    for field_type in lead
        .field_types
        .values()
        .sorted_by(|a, b| a.position.cmp(&b.position))
    {
        println!(
            "  {} {:?}/{:?} '{}' [{}] {}",
            field_type.tag,
            field_type.controls.data_structure_code,
            field_type.controls.data_type_code,
            field_type.name,
            field_type.array_descriptor,
            field_type.format_controls
        );
    }
    if let Some(tree) = lead.field_tree()? {
        println!("Field tree:\n{tree}");
    }

    let mut num_records = 0usize;
    for record in reader.records() {
        let record = record?;
        num_records += 1;
        println!("Record {num_records}:");
        for field in record.fields.iter() {
            let values = field
                .labelled_subfields()
                .into_iter()
                .map(|(label, value)| {
                    if label.is_empty() {
                        value.to_string()
                    } else {
                        format!("{label}={value}")
                    }
                })
                .join(", ");
            println!("  {}: {values}", field.tag);
        }
    }
    println!(
        "Read {num_records} records in {:.3}s",
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
