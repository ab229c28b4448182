//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Command-line options definitions and parsing.
//!

use crate::logging;
use crate::pipeline::{self, Stage};
use std::path::PathBuf;
use strum::IntoEnumIterator;

#[derive(Copy, Clone, Debug, PartialEq, strum_macros::EnumIter)]
pub enum ModeOfOperation {
    Run,
    Generate
}

pub mod cmdline {
    pub const HELP:             &str = "help";
    pub const MODE_OF_OPERATION: &str = "mode";
    pub const REFERENCE:        &str = "reference";
    pub const OUTPUT_DIRECTORY: &str = "output_dir";
    pub const PARAMETERS:       &str = "parameters";
    pub const COMMAND:          &str = "command";
    pub const LOG_LEVEL:        &str = "log_level";
    pub const SHAPE:            &str = "shape";
    pub const SPOTS:            &str = "spots";
    pub const SEED:             &str = "seed";
}

const DEFAULT_COMMAND: &str = "transform,register,compare";
const DEFAULT_PARAMETERS: &str = "parameters.json";
const DEFAULT_SHAPE: [usize; 3] = [30, 128, 128];
const DEFAULT_SPOTS: usize = 20;

#[derive(Debug)]
pub struct Configuration {
    mode: ModeOfOperation,
    reference: Option<PathBuf>,
    output_dir: PathBuf,
    parameters: PathBuf,
    stages: Vec<Stage>,
    shape: [usize; 3],
    spots: usize,
    seed: u64,
    log_level: logging::Level
}

impl Configuration {
    pub fn mode(&self) -> ModeOfOperation { self.mode }
    pub fn reference(&self) -> Option<&PathBuf> { self.reference.as_ref() }
    pub fn output_dir(&self) -> &PathBuf { &self.output_dir }
    pub fn parameters(&self) -> &PathBuf { &self.parameters }
    pub fn stages(&self) -> &[Stage] { &self.stages }
    pub fn shape(&self) -> [usize; 3] { self.shape }
    pub fn spots(&self) -> usize { self.spots }
    pub fn seed(&self) -> u64 { self.seed }
    pub fn log_level(&self) -> logging::Level { self.log_level }
}

impl From<ModeOfOperation> for &str {
    fn from(m: ModeOfOperation) -> &'static str {
        match m {
            ModeOfOperation::Run      => "run",
            ModeOfOperation::Generate => "generate"
        }
    }
}

impl std::str::FromStr for ModeOfOperation {
    type Err = ();
    fn from_str(s: &str) -> Result<ModeOfOperation, ()> {
        for mode in ModeOfOperation::iter() {
            if s == Into::<&str>::into(mode) {
                return Ok(mode);
            }
        }

        Err(())
    }
}

impl From<logging::Level> for &str {
    fn from(level: logging::Level) -> &'static str {
        match level {
            logging::Level::Quiet   => "quiet",
            logging::Level::Info    => "info",
            logging::Level::Verbose => "verbose"
        }
    }
}

impl std::str::FromStr for logging::Level {
    type Err = ();
    fn from_str(s: &str) -> Result<logging::Level, ()> {

        for level in logging::Level::iter() {
            if s == Into::<&str>::into(level) {
                return Ok(level);
            }
        }

        Err(())
    }
}


pub fn print_help() {
    println!(
r#"Command-line options:

  --{} <mode>

    Mode of operation. Possible values:

        {:9}    transform the references, register the targets and compare the results (default)
        {:9}    write a synthetic reference volume of Gaussian spots to the --{} path


  --{} <path>

    Reference volume (.tif/.tiff), a directory of reference volumes, or a text file listing
    one reference path per line. If not given, the volumes in <output_dir>/reference are used.


  --{} <directory>

    Root of the output tree (reference, to_register, shifted, similarity). Default: current directory.


  --{} <file>

    Parameters file. Default: ./{}. If missing, a template is written next to it.


  --{} <list>

    Comma-separated stages to run: {}. Default: {}.
    "prepare" is accepted for "transform". Stages always run in the order listed above.


  --{} <{}|{}|{}>

    Chooses the amount of messages to print during processing.


  --{} <z> <x> <y>

    Size of the generated volume. Default: {} {} {}. Valid only when mode = {}.


  --{} <count>

    Number of generated spots. Default: {}. Valid only when mode = {}.


  --{} <value>

    Seed of the spot generator. Default: 0. Valid only when mode = {}.

"#,
        cmdline::MODE_OF_OPERATION,
        Into::<&str>::into(ModeOfOperation::Run),
        Into::<&str>::into(ModeOfOperation::Generate), cmdline::REFERENCE,

        cmdline::REFERENCE,

        cmdline::OUTPUT_DIRECTORY,

        cmdline::PARAMETERS, DEFAULT_PARAMETERS,

        cmdline::COMMAND, Stage::names().join(", "), DEFAULT_COMMAND,

        cmdline::LOG_LEVEL,
        Into::<&str>::into(logging::Level::Quiet),
        Into::<&str>::into(logging::Level::Info),
        Into::<&str>::into(logging::Level::Verbose),

        cmdline::SHAPE, DEFAULT_SHAPE[0], DEFAULT_SHAPE[1], DEFAULT_SHAPE[2], Into::<&str>::into(ModeOfOperation::Generate),

        cmdline::SPOTS, DEFAULT_SPOTS, Into::<&str>::into(ModeOfOperation::Generate),

        cmdline::SEED, Into::<&str>::into(ModeOfOperation::Generate),
    );
}

/// Returns the value of a single-valued option of type `T`.
fn get_option_value<T: std::str::FromStr>(
    option: &str,
    option_values: &std::collections::HashMap::<String, Vec<String>>
) -> Result<Option<T>, ()> {
    match option_values.get(option) {
        None => Ok(None),
        Some(vals) => if vals.is_empty() {
            eprintln!("Value missing for option {}.", option);
            Err(())
        } else if vals.len() > 1 {
            eprintln!("Too many values for option {}.", option);
            Err(())
        } else {
            match vals[0].parse::<T>() {
                Ok(value) => Ok(Some(value)),
                Err(_) => {
                    eprintln!("Invalid value for option {}: {}.", option, vals[0]);
                    Err(())
                }
            }
        }
    }
}

/// Fails if `option` was given while the mode is not `ModeOfOperation::Generate`.
fn check_generate_only(
    option: &str,
    mode: ModeOfOperation,
    option_values: &std::collections::HashMap::<String, Vec<String>>
) -> Result<(), ()> {
    if mode != ModeOfOperation::Generate && option_values.contains_key(option) {
        eprintln!("Unexpected option {} (mode is not {}).", option, Into::<&str>::into(ModeOfOperation::Generate));
        Err(())
    } else {
        Ok(())
    }
}

/// Returns Ok(None) if help was requested.
pub fn parse_command_line<I: Iterator<Item=String>>(stream: I) -> Result<Option<Configuration>, ()> {
    let allowed_options = vec![
     cmdline::HELP,
     cmdline::MODE_OF_OPERATION,
     cmdline::REFERENCE,
     cmdline::OUTPUT_DIRECTORY,
     cmdline::PARAMETERS,
     cmdline::COMMAND,
     cmdline::LOG_LEVEL,
     cmdline::SHAPE,
     cmdline::SPOTS,
     cmdline::SEED
    ];

    // key: option name
    let mut option_values = std::collections::HashMap::<String, Vec<String>>::new();

    let mut current: Option<String> = None;

    for arg in stream.skip(1) /*skip the binary name*/ {
        if arg.starts_with("--") {
            match &arg[2..] {
                cmdline::HELP => { print_help(); return Ok(None); },
                x if !allowed_options.contains(&x) => {
                    eprintln!("Unknown command-line option: {}.", x); return Err(());
                },
                opt => {
                    option_values.entry(opt.to_string()).or_insert(vec![]);
                    current = Some(opt.to_string());
                }
            }
        } else {
            match current.as_ref().and_then(|opt| option_values.get_mut(opt)) {
                Some(values) => values.push(arg),
                None => { eprintln!("Unexpected value: {}.", arg); return Err(()); }
            }
        }
    }

    let mode = get_option_value::<ModeOfOperation>(cmdline::MODE_OF_OPERATION, &option_values)?
        .unwrap_or(ModeOfOperation::Run);

    let reference = get_option_value::<PathBuf>(cmdline::REFERENCE, &option_values)?;
    if mode == ModeOfOperation::Generate && reference.is_none() {
        eprintln!("Output path of the generated volume (--{}) must be specified.", cmdline::REFERENCE);
        return Err(());
    }

    let output_dir = get_option_value::<PathBuf>(cmdline::OUTPUT_DIRECTORY, &option_values)?
        .unwrap_or_else(|| PathBuf::from("."));

    let parameters = get_option_value::<PathBuf>(cmdline::PARAMETERS, &option_values)?
        .unwrap_or_else(|| PathBuf::from(".").join(DEFAULT_PARAMETERS));

    let command = get_option_value::<String>(cmdline::COMMAND, &option_values)?
        .unwrap_or_else(|| DEFAULT_COMMAND.to_string());
    let stages = match pipeline::parse_stages(&command) {
        Ok(stages) => stages,
        Err(e) => { eprintln!("{}.", e); return Err(()); }
    };

    check_generate_only(cmdline::SHAPE, mode, &option_values)?;
    check_generate_only(cmdline::SPOTS, mode, &option_values)?;
    check_generate_only(cmdline::SEED, mode, &option_values)?;

    let shape = match option_values.get(cmdline::SHAPE) {
        None => DEFAULT_SHAPE,
        Some(vals) => {
            let parsed: Vec<usize> = vals.iter().filter_map(|v| v.parse::<usize>().ok()).filter(|&n| n > 0).collect();
            if vals.len() != 3 || parsed.len() != 3 {
                eprintln!("Invalid value for option {}: {}. Expected: <z> <x> <y>.", cmdline::SHAPE, vals.join(" "));
                return Err(());
            }
            [parsed[0], parsed[1], parsed[2]]
        }
    };

    let spots = get_option_value::<usize>(cmdline::SPOTS, &option_values)?.unwrap_or(DEFAULT_SPOTS);

    let seed = get_option_value::<u64>(cmdline::SEED, &option_values)?.unwrap_or(0);

    let log_level = get_option_value::<logging::Level>(cmdline::LOG_LEVEL, &option_values)?
        .unwrap_or(logging::Level::Info);

    Ok(Some(Configuration{
        mode,
        reference,
        output_dir,
        parameters,
        stages,
        shape,
        spots,
        seed,
        log_level
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Prepends "--".
    macro_rules! as_opt { ($e:expr) => { ("--".to_string() + &$e.to_string()).as_str() } }

    #[test]
    fn when_help_requested_succeed() {
        let config = parse_command_line(
            [
                "binary",
                as_opt!(cmdline::HELP)
            ].iter().map(|s| s.to_string())
        );
        assert!(config.ok().unwrap().is_none());
    }

    #[test]
    fn when_no_options_use_defaults() {
        let config = parse_command_line(
            [
                "binary"
            ].iter().map(|s| s.to_string())
        ).unwrap().unwrap();
        assert_eq!(ModeOfOperation::Run, config.mode());
        assert_eq!(&[Stage::Transform, Stage::Register, Stage::Compare], config.stages());
        assert_eq!(&PathBuf::from("."), config.output_dir());
        assert_eq!(&PathBuf::from("./parameters.json"), config.parameters());
        assert!(config.reference().is_none());
        assert_eq!(logging::Level::Info, config.log_level());
    }

    #[test]
    fn when_unknown_option_fail() {
        let config = parse_command_line(
            [
                "binary",
                "--some_unknown_option"
            ].iter().map(|s| s.to_string())
        );
        assert!(config.is_err());
    }

    #[test]
    fn when_value_without_option_fail() {
        let config = parse_command_line(
            [
                "binary",
                "ref.tif"
            ].iter().map(|s| s.to_string())
        );
        assert!(config.is_err());
    }

    #[test]
    fn when_invalid_mode_fail() {
        let config = parse_command_line(
            [
                "binary",
                as_opt!(cmdline::MODE_OF_OPERATION), "align"
            ].iter().map(|s| s.to_string())
        );
        assert!(config.is_err());
    }

    #[test]
    fn when_unknown_stage_fail() {
        let config = parse_command_line(
            [
                "binary",
                as_opt!(cmdline::COMMAND), "transform,warp"
            ].iter().map(|s| s.to_string())
        );
        assert!(config.is_err());
    }

    #[test]
    fn when_stages_given_out_of_order_sort_them() {
        let config = parse_command_line(
            [
                "binary",
                as_opt!(cmdline::COMMAND), "compare,prepare"
            ].iter().map(|s| s.to_string())
        ).unwrap().unwrap();
        assert_eq!(&[Stage::Transform, Stage::Compare], config.stages());
    }

    #[test]
    fn when_paths_given_succeed() {
        let config = parse_command_line(
            [
                "binary",
                as_opt!(cmdline::REFERENCE), "refs/ref.tif",
                as_opt!(cmdline::OUTPUT_DIRECTORY), "out",
                as_opt!(cmdline::PARAMETERS), "conf/params.json",
                as_opt!(cmdline::LOG_LEVEL), "verbose"
            ].iter().map(|s| s.to_string())
        ).unwrap().unwrap();
        assert_eq!(Some(&PathBuf::from("refs/ref.tif")), config.reference());
        assert_eq!(&PathBuf::from("out"), config.output_dir());
        assert_eq!(&PathBuf::from("conf/params.json"), config.parameters());
        assert_eq!(logging::Level::Verbose, config.log_level());
    }

    #[test]
    fn when_two_references_given_fail() {
        let config = parse_command_line(
            [
                "binary",
                as_opt!(cmdline::REFERENCE), "a.tif", "b.tif"
            ].iter().map(|s| s.to_string())
        );
        assert!(config.is_err());
    }

    #[test]
    fn when_generate_without_reference_fail() {
        let config = parse_command_line(
            [
                "binary",
                as_opt!(cmdline::MODE_OF_OPERATION), Into::<&str>::into(ModeOfOperation::Generate)
            ].iter().map(|s| s.to_string())
        );
        assert!(config.is_err());
    }

    #[test]
    fn when_generate_options_given_succeed() {
        let config = parse_command_line(
            [
                "binary",
                as_opt!(cmdline::MODE_OF_OPERATION), Into::<&str>::into(ModeOfOperation::Generate),
                as_opt!(cmdline::REFERENCE), "synthetic.tif",
                as_opt!(cmdline::SHAPE), "16", "32", "48",
                as_opt!(cmdline::SPOTS), "5",
                as_opt!(cmdline::SEED), "42"
            ].iter().map(|s| s.to_string())
        ).unwrap().unwrap();
        assert_eq!([16, 32, 48], config.shape());
        assert_eq!(5, config.spots());
        assert_eq!(42, config.seed());
    }

    #[test]
    fn when_shape_incomplete_fail() {
        let config = parse_command_line(
            [
                "binary",
                as_opt!(cmdline::MODE_OF_OPERATION), Into::<&str>::into(ModeOfOperation::Generate),
                as_opt!(cmdline::REFERENCE), "synthetic.tif",
                as_opt!(cmdline::SHAPE), "16", "32"
            ].iter().map(|s| s.to_string())
        );
        assert!(config.is_err());
    }

    #[test]
    fn given_seed_and_not_generate_mode_fail() {
        let config = parse_command_line(
            [
                "binary",
                as_opt!(cmdline::SEED), "42"
            ].iter().map(|s| s.to_string())
        );
        assert!(config.is_err());
    }
}
