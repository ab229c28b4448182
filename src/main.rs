//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Entry point and main functions of the `registest` executable.
//!

mod align;
mod args;
mod compare;
mod error;
mod generator;
mod ledger;
mod logging;
mod output;
mod params;
mod pipeline;
mod render;
mod utils;
mod volume;

use args::ModeOfOperation;
use error::Result;
use output::OutputTree;
use params::Parameters;
use pipeline::Pipeline;
use volume::ReferenceImage;

const VERSION_STRING: &'static str = include_str!(concat!(env!("OUT_DIR"), "/version"));

fn print_header() {
    println!(r#"
_________________

   {}
   Accuracy test harness for 3D image registration

   Copyright © 2020 Filip Szczerek <ga.software@yahoo.com>

   This program is licensed under MIT license (see LICENSE.txt for details).

_________________
"#,
        VERSION_STRING
    );
}

/// Returns true if every target was processed successfully.
fn mode_run(config: &args::Configuration) -> Result<bool> {
    let params = Parameters::load(config.parameters())?;
    let tree = OutputTree::new(config.output_dir());

    let reference_paths = pipeline::discover_references(&tree, config.reference().map(|p| p.as_path()))?;
    let mut references = vec![];
    for path in &reference_paths {
        let reference = ReferenceImage::load(path)?;
        log::info!("reference '{}': {:?}", reference.path().display(), reference.volume().shape());
        references.push(reference);
    }

    let pipeline = Pipeline::new(tree, references, params);
    let summary = pipeline.run(config.stages())?;

    log::info!("{}", summary);
    for failure in &summary.failures {
        log::warn!("failed ({}): '{}': {}", failure.stage, failure.target.display(), failure.message);
    }

    Ok(summary.succeeded())
}

fn mode_generate(config: &args::Configuration) -> Result<bool> {
    let path = match config.reference() {
        Some(path) => path,
        None => return Err(error::RegistestError::InvalidArgument("no output path given".to_string()))
    };

    let volume = generator::synthetic_spots(config.shape(), config.spots(), config.seed());
    volume::tiff::save_volume(&volume, path)?;
    log::info!("saved '{}'", path.display());

    Ok(true)
}

fn run_program() -> bool {
    print_header();
    println!();

    let config = match args::parse_command_line(std::env::args()) {
        Ok(config) => match config {
            None => return true, // help was requested
            Some(config) => config
        },
        Err(_) => { println!("\nUse --{} for more information.\n", args::cmdline::HELP); return false; }
    };

    let _logger = match logging::init(config.log_level()) {
        Ok(handle) => handle,
        Err(e) => { eprintln!("Cannot start logging: {}.", e); return false; }
    };

    let tstart = std::time::Instant::now();

    let result = match config.mode() {
        ModeOfOperation::Run => mode_run(&config),

        ModeOfOperation::Generate => mode_generate(&config)
    };

    let elapsed = tstart.elapsed();
    let mins = elapsed.as_secs() / 60;
    let secs = elapsed.as_secs() % 60;
    let frac_secs = elapsed.as_secs_f32() - (mins * 60) as f32 - secs as f32;
    log::info!("Completed in {} min {:02}.{:0.0} s.", mins, secs, frac_secs * 10.0);

    match result {
        Ok(succeeded) => succeeded,
        Err(e) => { log::error!("{}", e); false }
    }
}

fn main() {
    std::process::exit(if run_program() { 0 } else { 1 });
}
