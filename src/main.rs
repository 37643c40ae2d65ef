//! Binary entry point for pskit.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::Parser;
use pskit_bridge::cli::output::{OutputFormat, format_error};
use pskit_bridge::cli::{Cli, execute};
use pskit_bridge::{Error, logging};
use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = OutputFormat::parse(&cli.format);
    logging::init(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(execute(&cli)) {
        Ok(output) => {
            if !output.is_empty() {
                // Handle broken pipe gracefully (e.g., when piped to `head` or `jq`)
                if let Err(e) = write!(io::stdout(), "{output}")
                    && e.kind() != io::ErrorKind::BrokenPipe
                {
                    eprintln!("Error writing to stdout: {e}");
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            // An aborted batch still reports the files handled before it
            if let Error::BatchAborted { report, .. } = &e {
                match format {
                    OutputFormat::Json => {
                        // the report already carries the abort reason
                        println!("{report}");
                        return ExitCode::FAILURE;
                    }
                    OutputFormat::Text => print!("{report}"),
                }
            }
            let error_output = format_error(&e, format);
            match format {
                OutputFormat::Json => {
                    // JSON errors go to stdout for programmatic parsing
                    println!("{error_output}");
                }
                OutputFormat::Text => {
                    eprintln!("Error: {error_output}");
                }
            }
            ExitCode::FAILURE
        }
    }
}
