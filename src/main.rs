// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Command-line entry point for the offline shader toolchain.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;

use ngf_shaderc::{compile, target, Error, Job};

const USAGE: &str = "\
Usage: ngf_shaderc <input file name> [options]

Compiles HLSL shaders for multiple different targets.

Options:

  -O <path> - Folder to store output files in. Default is the current
    working directory.

  -t <target> - Generate shaders for the given target. Accepted values are:
      * gl430;
      * gles310, gles300;
      * msl10, msl11, msl12, msl20;
      * msl10ios, msl11ios, msl12ios, msl20ios;
      * spv
    If the option is encountered multiple times, shaders for all of the
    mentioned targets will be generated.

  -h <path> - Path (relative to the output folder) for the generated
    header file with descriptor binding and set IDs. If not specified, no
    header file will be generated.

  -n <identifier> - Namespace for the generated header file. If not
    specified, the global namespace is used.
";

#[derive(Parser, Debug)]
#[command(name = "ngf_shaderc", disable_help_flag = true)]
struct Args {
    /// HLSL file with technique annotations.
    input: PathBuf,

    /// Output folder.
    #[arg(short = 'O', default_value = ".")]
    out_folder: PathBuf,

    /// Targets to generate shaders for; may be given multiple times.
    #[arg(short = 't')]
    targets: Vec<String>,

    /// Path of the generated header, relative to the output folder.
    #[arg(short = 'h')]
    header: Option<String>,

    /// Namespace for generated header symbols.
    #[arg(short = 'n')]
    namespace: Option<String>,

    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,
}

fn run(args: Args) -> ngf_shaderc::Result<()> {
    let mut targets = Vec::with_capacity(args.targets.len());
    for name in &args.targets {
        targets.push(target::find(name)?);
    }
    let job = Job {
        input: args.input,
        out_dir: args.out_folder,
        targets,
        header_path: args.header,
        namespace: args.namespace,
    };
    compile::run(&job)
}

fn main() -> ExitCode {
    env_logger::init();
    if std::env::args().len() <= 1 {
        print!("{USAGE}");
        return ExitCode::SUCCESS;
    }
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let usage = Error::Usage(e.to_string());
            eprintln!("{usage}");
            return ExitCode::FAILURE;
        }
    };
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ngf_shaderc: error: {e}");
            ExitCode::FAILURE
        }
    }
}
