//! Laughter-pipeline CLI entry point.

#![allow(clippy::print_stderr)]

fn main() {
    std::process::exit(laughter_pipeline::run());
}
