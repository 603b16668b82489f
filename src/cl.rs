//! Command line interface

use std::path::PathBuf;

use clap::Parser;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(version, about)]
pub(crate) struct Args {
    #[command(subcommand)]
    pub action: Action,
}

/// What to do with parsed strace output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub(crate) enum Algorithm {
    /// Resolve the absolute path of every opened file, and report statistics at the end
    #[default]
    Paths,
    /// Same as paths, but also report the syscall each path comes from
    PathsWithParsedData,
    /// Only parse, and report each parsed line
    Parse,
}

impl Algorithm {
    pub(crate) fn description(self) -> &'static str {
        match self {
            Self::Paths => "resolve the absolute path of every opened file, then report statistics",
            Self::PathsWithParsedData => {
                "resolve the absolute path of every opened file along with its originating syscall, then report statistics"
            }
            Self::Parse => "report every parsed strace line, without analysis",
        }
    }
}

#[derive(Debug, clap::Subcommand)]
pub(crate) enum Action {
    /// Analyze strace output
    Analyze {
        /// Strace output file, standard input if "-" or absent.
        /// Expects output of strace without timestamps, optionally with -f
        input: Option<PathBuf>,
        /// Output file, standard output if "-" or absent
        #[arg(short, long, default_value = None)]
        output: Option<PathBuf>,
        /// Analysis to run
        #[arg(short, long, default_value_t, value_enum)]
        algorithm: Algorithm,
        /// Tag paths with information from the local filesystem.
        /// Only meaningful when analyzing on the traced system
        #[arg(long, default_value_t = false)]
        path_info: bool,
        /// Do not prefix output lines with the number of consecutive identical messages
        #[arg(long, default_value_t = false)]
        no_counts: bool,
        /// Do not report lines that failed to parse, with the parse algorithm
        #[arg(long, default_value_t = false)]
        no_parse_errors: bool,
    },
    /// List supported analysis algorithms
    ListAlgorithms,
    /// Generate man pages
    #[cfg(feature = "generate-extra")]
    GenManPages {
        /// Target directory (must exist)
        dir: PathBuf,
    },
    /// Generate shell completion
    #[cfg(feature = "generate-extra")]
    #[group(required = true, multiple = true)]
    GenShellComplete {
        /// Shell to generate for, leave empty for all
        #[arg(short = 's', long, default_value = None)]
        shell: Option<clap_complete::Shell>,
        /// Target directory, leave empty to write to standard output
        dir: Option<PathBuf>,
    },
}
