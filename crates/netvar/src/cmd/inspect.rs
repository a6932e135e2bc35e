use netvar_frame::{hex, inspect_frame, FieldLayout, IntegrityProblem};

use crate::cmd::{load_declaration, InspectArgs};
use crate::exit::{CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_report, OutputFormat};

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let cleaned: String = args.hex.chars().filter(|c| *c != ':').collect();
    let datagram = hex::from_hex(&cleaned)
        .ok_or_else(|| CliError::new(USAGE, "frame must be an even number of hex digits"))?;

    let layout: Vec<FieldLayout> = match &args.decl {
        Some(path) => load_declaration(path)?
            .entries()
            .iter()
            .map(|(name, slot)| FieldLayout::new(name.clone(), slot.idx(), slot.kind()))
            .collect(),
        None => Vec::new(),
    };

    let mut report = inspect_frame(&datagram, &layout);
    if args.decl.is_none() {
        // Without a layout only the header can be judged.
        report
            .problems
            .retain(|problem| !matches!(problem, IntegrityProblem::UnknownVariable { .. }));
    }

    print_report(&report, format);
    Ok(if report.is_valid() {
        SUCCESS
    } else {
        DATA_INVALID
    })
}
