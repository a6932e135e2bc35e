//! GVL (global variable list) definitions for the controller project.

use std::fmt::Write as _;

use netvar_frame::FieldLayout;

/// Interval written when the list has no configured cycle interval, or 0.
pub const FALLBACK_INTERVAL_MS: u64 = 9_000_000;

/// Network settings rendered into a GVL definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GvlSettings {
    pub list_id: u16,
    pub packed: bool,
    pub cyclic: bool,
    pub cycle_interval_ms: Option<u64>,
    /// Broadcast or unicast address the controller sends to.
    pub endpoint: String,
    pub port: u16,
}

/// Render the GVL XML a controller imports to exchange `fields` with us.
///
/// Declarations are emitted in the order given; callers pass them sorted by
/// idx so the controller assigns the same indices.
pub fn render_gvl(settings: &GvlSettings, fields: &[FieldLayout]) -> String {
    let mut out = String::new();
    out.push_str("<GVL>\n  <Declarations><![CDATA[VAR_GLOBAL\n");
    for field in fields {
        let _ = writeln!(out, "        {}: {};", field.name, field.kind.type_name());
    }
    out.push_str("END_VAR]]></Declarations>\n");
    out.push_str("  <NetvarSettings Protocol=\"UDP\">\n");
    let _ = writeln!(
        out,
        "    <ListIdentifier>{}</ListIdentifier>",
        settings.list_id
    );
    let _ = writeln!(out, "    <Pack>{}</Pack>", flag(settings.packed));
    out.push_str("    <Checksum>False</Checksum>\n");
    out.push_str("    <Acknowledge>False</Acknowledge>\n");
    let _ = writeln!(
        out,
        "    <CyclicTransmission>{}</CyclicTransmission>",
        flag(settings.cyclic)
    );
    out.push_str("    <TransmissionOnChange>True</TransmissionOnChange>\n");
    out.push_str("    <TransmissionOnEvent>False</TransmissionOnEvent>\n");
    let _ = writeln!(
        out,
        "    <Interval>T#{}ms</Interval>",
        settings
            .cycle_interval_ms
            .filter(|&ms| ms > 0)
            .unwrap_or(FALLBACK_INTERVAL_MS)
    );
    out.push_str("    <MinGap>T#1ms</MinGap>\n");
    out.push_str("    <EventVariable>\n    </EventVariable>\n");
    out.push_str("    <ProtocolSettings>\n");
    let _ = writeln!(
        out,
        "      <ProtocolSetting Name=\"Broadcast Adr.\" Value=\"{}\"/>",
        escape_attr(&settings.endpoint)
    );
    let _ = writeln!(
        out,
        "      <ProtocolSetting Name=\"Port\" Value=\"{}\"/>",
        settings.port
    );
    out.push_str("    </ProtocolSettings>\n  </NetvarSettings>\n</GVL>");
    out
}

fn flag(on: bool) -> &'static str {
    if on {
        "True"
    } else {
        "False"
    }
}

fn escape_attr(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
