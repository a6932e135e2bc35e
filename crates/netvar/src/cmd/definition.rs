use netvar_frame::FieldLayout;
use netvar_list::{render_gvl, GvlSettings};

use crate::cmd::DefinitionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: DefinitionArgs) -> CliResult<i32> {
    let declaration = args.list.declaration()?;
    let options = args.list.options()?;

    let mut layout: Vec<FieldLayout> = declaration
        .entries()
        .iter()
        .map(|(name, slot)| FieldLayout::new(name.clone(), slot.idx(), slot.kind()))
        .collect();
    layout.sort_by_key(|field| field.idx);

    let settings = GvlSettings {
        list_id: args.list.list_id,
        packed: options.packed,
        cyclic: options.cyclic,
        cycle_interval_ms: options.cycle_interval_ms,
        endpoint: args.endpoint,
        port: args.port,
    };
    println!("{}", render_gvl(&settings, &layout));
    Ok(SUCCESS)
}
