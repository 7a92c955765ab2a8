//! CLI command implementations.

pub(crate) mod audit;
pub(crate) mod check;
pub(crate) mod config;
pub(crate) mod policy;
pub(crate) mod serve;
pub(crate) mod shadow;

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

/// Read `path`, or stdin when it is `None` or `-`.
pub(crate) fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(p) if p != Path::new("-") => {
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))
        },
        _ => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("reading stdin")?;
            Ok(raw)
        },
    }
}

/// Print a value as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
