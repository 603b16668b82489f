//! Resolve paths opened by traced processes from strace output

use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::Parser as _;
use strum::IntoEnumIterator as _;

mod analyze;
mod cl;
mod report;
mod strace;
mod writer;

/// `-` means standard input/output
fn is_std_stream(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn open_input(path: Option<PathBuf>) -> anyhow::Result<Box<dyn BufRead>> {
    Ok(match path {
        Some(path) if !is_std_stream(&path) => Box::new(BufReader::new(
            File::open(&path).with_context(|| format!("Failed to open {path:?}"))?,
        )),
        _ => Box::new(io::stdin().lock()),
    })
}

fn open_output(path: Option<PathBuf>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) if !is_std_stream(&path) => Box::new(BufWriter::new(
            File::create(&path).with_context(|| format!("Failed to create {path:?}"))?,
        )),
        _ => Box::new(io::stdout().lock()),
    })
}

fn main() -> anyhow::Result<()> {
    // Init logger
    simple_logger::SimpleLogger::new()
        .with_level(if cfg!(debug_assertions) {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .env()
        .init()
        .context("Failed to setup logger")?;

    // Parse cl args
    let args = cl::Args::parse();

    // Handle CL args
    match args.action {
        cl::Action::Analyze {
            input,
            output,
            algorithm,
            path_info,
            no_counts,
            no_parse_errors,
        } => {
            let events = strace::LogParser::new(open_input(input)?);
            let mut sink = writer::DedupSink::new(open_output(output)?, !no_counts);

            match algorithm {
                cl::Algorithm::Parse => {
                    for event in events {
                        let event = event?;
                        match event {
                            strace::ParsedEvent::Empty => {}
                            strace::ParsedEvent::ParseError(_) if no_parse_errors => {}
                            event => sink
                                .push(report::OutputMessage::Parsed(event))
                                .context("Failed to write output")?,
                        }
                    }
                }
                cl::Algorithm::Paths | cl::Algorithm::PathsWithParsedData => {
                    let mut analyzer = analyze::PathAnalyzer::new(analyze::Configuration {
                        preserve_parsed_data: matches!(
                            algorithm,
                            cl::Algorithm::PathsWithParsedData
                        ),
                        path_info,
                    });
                    for event in events {
                        if let Some(message) = analyzer.analyze(event?) {
                            sink.push(message).context("Failed to write output")?;
                        }
                    }
                    log::info!(
                        "Analyzed {} messages",
                        analyzer.statistics().messages()
                    );
                }
            }

            sink.flush().context("Failed to write output")?;
        }
        cl::Action::ListAlgorithms => {
            let mut stdout = io::stdout().lock();
            for algorithm in cl::Algorithm::iter() {
                writeln!(stdout, "{algorithm}\t{}", algorithm.description())
                    .context("Failed to write output")?;
            }
        }
        #[cfg(feature = "generate-extra")]
        cl::Action::GenManPages { dir } => {
            use clap::CommandFactory as _;

            // Use the binary name instead of the default of the package name
            let cmd = cl::Args::command().name(env!("CARGO_BIN_NAME"));
            clap_mangen::generate_to(cmd, &dir)?;
        }
        #[cfg(feature = "generate-extra")]
        cl::Action::GenShellComplete { shell, dir } => {
            use clap::{CommandFactory as _, ValueEnum as _};
            use clap_complete::{Shell, generate, generate_to};

            // Use the binary name instead of the default of the package name
            let name = env!("CARGO_BIN_NAME");
            let mut cmd = cl::Args::command().name(name);

            if let Some(shell) = shell {
                if let Some(dir) = dir {
                    generate_to(shell, &mut cmd, name, dir)?;
                } else {
                    generate(shell, &mut cmd, name, &mut io::stdout());
                }
            } else if let Some(dir) = dir {
                let shells = Shell::value_variants();
                for shell_i in shells {
                    generate_to(*shell_i, &mut cmd, name, &dir)?;
                }
            }
        }
    }

    Ok(())
}
