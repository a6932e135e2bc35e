use netvar_frame::Value;
use netvar_list::{Declaration, NetvarClient};
use tracing::info;

use crate::cmd::SetArgs;
use crate::exit::{list_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_sent, OutputFormat};

pub fn run(args: SetArgs, format: OutputFormat) -> CliResult<i32> {
    let declaration = args.list.declaration()?;
    let options = args.list.options()?;
    let updates = parse_assignments(&declaration, &args.vars)?;

    let client = NetvarClient::bind(args.net.client_config())
        .map_err(|err| list_error("bind failed", err))?;
    let list = client
        .open_list_with_options(args.list.list_id, declaration, options, None)
        .map_err(|err| list_error("open list failed", err))?;

    list.set_more(updates.iter().map(|(name, value)| (name.as_str(), value.clone())))
        .map_err(|err| list_error("set failed", err))?;
    info!(
        list_id = args.list.list_id,
        destination = %client.destination(),
        count = updates.len(),
        "variables sent"
    );

    print_sent(args.list.list_id, &updates, format);
    list.dispose();
    client.shutdown();
    Ok(SUCCESS)
}

/// Parse `NAME=VALUE` pairs against the declared kinds.
fn parse_assignments(declaration: &Declaration, vars: &[String]) -> CliResult<Vec<(String, Value)>> {
    vars.iter()
        .map(|assignment| {
            let (name, text) = assignment.split_once('=').ok_or_else(|| {
                CliError::new(USAGE, format!("expected NAME=VALUE, got {assignment:?}"))
            })?;
            let name = name.trim();
            let kind = declaration
                .entries()
                .iter()
                .find(|(declared, _)| declared == name)
                .map(|(_, slot)| slot.kind())
                .ok_or_else(|| CliError::new(USAGE, format!("variable {name:?} is not declared")))?;
            let value = Value::parse(kind, text)
                .map_err(|err| CliError::new(DATA_INVALID, format!("{name}: {err}")))?;
            Ok((name.to_string(), value))
        })
        .collect()
}
