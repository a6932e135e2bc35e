use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use netvar_frame::{hex, FrameHeader, FrameReport, IntegrityProblem, Value};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ChangeOutput<'a> {
    event: &'static str,
    list_id: u16,
    name: &'a str,
    kind: &'static str,
    value: &'a Value,
    timestamp: String,
}

/// One variable changed by an inbound frame.
pub fn print_change(list_id: u16, name: &str, value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ChangeOutput {
                event: "change",
                list_id,
                name,
                kind: value.kind().type_name(),
                value,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["LIST", "NAME", "KIND", "VALUE"]);
            table.add_row(vec![
                list_id.to_string(),
                name.to_string(),
                value.kind().to_string(),
                value.to_string(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("list={list_id} {name} ({}) = {value}", value.kind());
        }
        OutputFormat::Raw => println!("{name}={value}"),
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    event: &'static str,
    header: &'a FrameHeader,
    payload: String,
    timestamp: String,
}

/// A frame received for a list without a declaration.
pub fn print_frame(header: &FrameHeader, payload: &[u8], format: OutputFormat) {
    let payload_hex = hex::to_hex(payload);
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                event: "frame",
                header,
                payload: payload_hex,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["LIST", "VAR", "ITEMS", "LENGTH", "COUNTER", "PAYLOAD"]);
            table.add_row(vec![
                header.list_id.to_string(),
                var_label(header),
                header.item_count.to_string(),
                header.total_length.to_string(),
                header.counter.to_string(),
                payload_hex,
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "list={} var={} items={} length={} counter={} payload={}",
                header.list_id,
                var_label(header),
                header.item_count,
                header.total_length,
                header.counter,
                payload_hex
            );
        }
        OutputFormat::Raw => println!("{payload_hex}"),
    }
}

/// Result of an integrity inspection.
pub fn print_report(report: &FrameReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            if let Some(header) = &report.header {
                let mut table = new_table(vec!["LIST", "VAR", "ITEMS", "LENGTH", "COUNTER"]);
                table.add_row(vec![
                    header.list_id.to_string(),
                    var_label(header),
                    header.item_count.to_string(),
                    header.total_length.to_string(),
                    header.counter.to_string(),
                ]);
                println!("{table}");
            }
            if !report.fields.is_empty() {
                let mut table = new_table(vec!["NAME", "KIND", "VALUE"]);
                for (name, value) in &report.fields {
                    table.add_row(vec![name.clone(), value.kind().to_string(), value.to_string()]);
                }
                println!("{table}");
            }
            let mut table = new_table(vec!["PROBLEM"]);
            for problem in &report.problems {
                table.add_row(vec![describe(problem)]);
            }
            if report.problems.is_empty() {
                table.add_row(vec!["none".to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            if let Some(header) = &report.header {
                println!(
                    "list={} var={} items={} length={} counter={}",
                    header.list_id,
                    var_label(header),
                    header.item_count,
                    header.total_length,
                    header.counter
                );
            }
            for (name, value) in &report.fields {
                println!("  {name} = {value}");
            }
            for problem in &report.problems {
                println!("problem: {}", describe(problem));
            }
        }
    }
}

#[derive(Serialize)]
struct SentOutput<'a> {
    event: &'static str,
    list_id: u16,
    values: Vec<(&'a str, &'a Value)>,
}

/// Values handed to the list by `set`.
pub fn print_sent(list_id: u16, values: &[(String, Value)], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = SentOutput {
                event: "sent",
                list_id,
                values: values.iter().map(|(n, v)| (n.as_str(), v)).collect(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["NAME", "KIND", "VALUE"]);
            for (name, value) in values {
                table.add_row(vec![name.clone(), value.kind().to_string(), value.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for (name, value) in values {
                println!("{name}={value}");
            }
        }
    }
}

fn describe(problem: &IntegrityProblem) -> String {
    match problem {
        IntegrityProblem::Runt { len } => format!("runt datagram ({len} bytes)"),
        IntegrityProblem::IdentityMismatch { found } => {
            format!("identity mismatch (found {})", hex::to_hex(found))
        }
        IntegrityProblem::LengthMismatch { header, actual } => {
            format!("length field says {header}, datagram is {actual}")
        }
        IntegrityProblem::UnknownVariable { var_id } => format!("undeclared var id {var_id}"),
        IntegrityProblem::FieldDecode { name, error } => format!("field {name}: {error}"),
        IntegrityProblem::PayloadOverrun { parsed, length } => {
            format!("layout needs {parsed} bytes, length field says {length}")
        }
    }
}

fn var_label(header: &FrameHeader) -> String {
    if header.is_packed() {
        "packed".to_string()
    } else {
        header.var_id.to_string()
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
