//! Command-line entry point for grimoire.
//!
//! Parses flags, resolves configuration, and wires the loader, snapshot
//! store, and sync service together. All behavior lives in the library
//! crates.

mod app;
mod cli;

fn main() -> anyhow::Result<()> {
    app::run()
}
