//! Human and JSON output for each command.

use anyhow::Error;
use hid_8bitdo_protocol::ControlState;
use openpad_link::{Axis, map_state};
use serde::Serialize;
use serde_json::json;

use crate::capture::format_hex_bytes;
use crate::replay::ReplaySummary;

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("Failed to format output as JSON: {e}"),
    }
}

pub fn print_error_json(error: &Error) {
    print_json(&json!({
        "success": false,
        "error": {
            "message": error.to_string(),
            "chain": error.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
        }
    }));
}

pub fn print_error_human(error: &Error) {
    eprintln!("Error: {error}");
    for cause in error.chain().skip(1) {
        eprintln!("  Caused by: {cause}");
    }
}

/// One line per decoded report: pressed keys, hat and sticks.
pub fn describe_state(state: &ControlState) -> String {
    let frame = map_state(state);
    let pressed = frame
        .pressed()
        .iter()
        .map(|key| format!("{key:?}"))
        .collect::<Vec<_>>();
    let axis = |axis: Axis| frame.axis(axis).unwrap_or_default();
    format!(
        "keys=[{}] hat=({},{}) left=({},{}) right=({},{}) triggers=({},{})",
        pressed.join(","),
        axis(Axis::Hat0X),
        axis(Axis::Hat0Y),
        axis(Axis::LeftX),
        axis(Axis::LeftY),
        axis(Axis::RightX),
        axis(Axis::RightY),
        state.trigger_left,
        state.trigger_right,
    )
}

pub fn print_decoded(state: Option<&ControlState>, tag: u8, json: bool) {
    match (state, json) {
        (Some(state), true) => print_json(&json!({
            "success": true,
            "applicable": true,
            "state": state,
            "frame": map_state(state),
        })),
        (None, true) => print_json(&json!({
            "success": true,
            "applicable": false,
            "tag": tag,
        })),
        (Some(state), false) => println!("{}", describe_state(state)),
        (None, false) => println!("Report tag 0x{tag:02X} is not a state report; ignored."),
    }
}

pub fn print_report(name: &str, bytes: &[u8], json: bool) {
    if json {
        print_json(&json!({
            "success": true,
            "report": name,
            "bytes": bytes,
            "hex": format_hex_bytes(bytes),
        }));
    } else {
        println!("{name}: {}", format_hex_bytes(bytes));
    }
}

pub fn print_replay(summary: &ReplaySummary, json: bool) {
    if json {
        print_json(&json!({ "success": true, "replay": summary }));
        return;
    }
    println!("Device:      {}", summary.device);
    println!(
        "Captures:    {} over {}us ({} delivered, {} skipped)",
        summary.captures, summary.duration_us, summary.delivered, summary.skipped
    );
    println!(
        "Reports:     {} decoded, {} ignored",
        summary.counters.reports_decoded, summary.counters.reports_ignored
    );
    println!("Frames:      {}", summary.frames);
    println!("Heartbeats:  {}", summary.heartbeats);
    for write in &summary.writes {
        println!("Sent:        {write}");
    }
    println!("Final state: {}", describe_state(&summary.final_state));
    println!(
        "Teardown:    {} (forced {}, synthesized {})",
        if summary.teardown.graceful {
            "graceful"
        } else {
            "forced"
        },
        summary.teardown.forced,
        summary.teardown.synthesized
    );
}
