//! The asc command line: reads a definition graph as JSON from stdin and
//! either evaluates or analyzes every top-level identifier.

use std::collections::BTreeSet;
use std::io::Read;

use asc_analyze::{NoFormTypes, analyze_all};
use asc_def::{Ident, Layer, decode_layer};
use asc_eval::{EvalOptions, NoFormValues, evaluate};
use asc_types::display_signature;

fn main() {
    if let Err(message) = run() {
        eprintln!("{message}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args = std::env::args().collect::<Vec<_>>();
    let mode = parse_cli(&args)?;

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .map_err(|err| format!("failed to read stdin: {err}"))?;
    let value: serde_json::Value =
        serde_json::from_str(&input).map_err(|err| format!("failed to parse JSON: {err}"))?;
    let layer = decode_layer(&value).map_err(|err| err.to_string())?;

    let output = match mode {
        Mode::Evaluate => evaluate_output(&layer),
        Mode::Analyze => analyze_output(&layer),
    };
    print!("{output}");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Evaluate,
    Analyze,
}

fn parse_cli(args: &[String]) -> Result<Mode, String> {
    match args.get(1).map(String::as_str) {
        None | Some("evaluate") => Ok(Mode::Evaluate),
        Some("analyze") => Ok(Mode::Analyze),
        Some(unknown) => Err(format!("unknown command `{unknown}`\n{}", usage())),
    }
}

fn usage() -> String {
    "usage:\n  asc [evaluate] < graph.json\n  asc analyze < graph.json".to_string()
}

fn sorted_ids(layer: &Layer) -> Vec<Ident> {
    let mut ids: Vec<Ident> = layer.ids().cloned().collect();
    ids.sort();
    ids
}

/// `id -> value` per top-level id; failures are reported in place and the
/// remaining ids still evaluate.
fn evaluate_output(layer: &Layer) -> String {
    let layers = [layer.clone()];
    let mut out = String::new();
    for id in sorted_ids(layer) {
        match evaluate(&layers, &id, &NoFormValues, EvalOptions::default()) {
            Ok(value) => out.push_str(&format!("{id} -> {value}\n")),
            Err(err) => out.push_str(&format!("{id} -> {err}\n")),
        }
    }
    out
}

/// `id :: signature` per top-level id, then the union of used node tags and
/// stdlib names.
fn analyze_output(layer: &Layer) -> String {
    let layers = [layer.clone()];
    let mut out = String::new();
    let mut tags = BTreeSet::new();
    let mut stdlib = BTreeSet::new();
    for (id, result) in analyze_all(&layers, &NoFormTypes) {
        match result {
            Ok(report) => {
                out.push_str(&format!("{id} :: {}\n", display_signature(&report.ty)));
                tags.extend(report.def_types.iter().copied());
                stdlib.extend(report.std_usage.iter().cloned());
            }
            Err(err) => out.push_str(&format!("{id} :: {err}\n")),
        }
    }
    let tags = tags.iter().map(|t| t.as_str()).collect::<Vec<_>>();
    out.push_str(&format!("tags: {}\n", tags.join(", ")));
    out.push_str(&format!("stdlib: {}\n", stdlib.into_iter().collect::<Vec<_>>().join(", ")));
    out
}
