//! Strace output model

use std::{collections::BTreeMap, fmt};

use itertools::Itertools as _;

mod parser;

pub(crate) use parser::LogParser;
#[cfg(test)]
pub(crate) use parser::TraceParser;

/// Process id as reported by strace
pub(crate) type Pid = u32;

/// Closed set of syscall kinds the analysis cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum SyscallCategory {
    Access,
    Chdir,
    Close,
    Creat,
    Exec,
    Exit,
    Fork,
    Fstat,
    Getcwd,
    Lstat,
    Open,
    Readlink,
    Stat,
    Statfs,
    Unknown,
}

static SYSCALL_CATEGORIES: phf::Map<&'static str, SyscallCategory> = phf::phf_map! {
    "access" => SyscallCategory::Access,
    "chdir" => SyscallCategory::Chdir,
    "close" => SyscallCategory::Close,
    "creat" => SyscallCategory::Creat,
    "execve" => SyscallCategory::Exec,
    "exit" => SyscallCategory::Exit,
    "exit_group" => SyscallCategory::Exit,
    "clone" => SyscallCategory::Fork,
    "fork" => SyscallCategory::Fork,
    "vfork" => SyscallCategory::Fork,
    "fstat" => SyscallCategory::Fstat,
    "fstat64" => SyscallCategory::Fstat,
    "getcwd" => SyscallCategory::Getcwd,
    "lstat" => SyscallCategory::Lstat,
    "lstat64" => SyscallCategory::Lstat,
    "open" => SyscallCategory::Open,
    "readlink" => SyscallCategory::Readlink,
    "stat" => SyscallCategory::Stat,
    "stat64" => SyscallCategory::Stat,
    "statfs" => SyscallCategory::Statfs,
    "statfs64" => SyscallCategory::Statfs,
};

impl SyscallCategory {
    /// Map a syscall name to its category, unknown names map to `Unknown`
    pub(crate) fn classify(name: &str) -> Self {
        SYSCALL_CATEGORIES
            .get(name)
            .copied()
            .unwrap_or(Self::Unknown)
    }

    /// Whether the first argument of this syscall is a path string
    pub(crate) fn takes_path(self) -> bool {
        matches!(
            self,
            Self::Access
                | Self::Chdir
                | Self::Creat
                | Self::Exec
                | Self::Getcwd
                | Self::Lstat
                | Self::Open
                | Self::Readlink
                | Self::Stat
                | Self::Statfs
        )
    }
}

/// Surface form of a syscall line
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum SyscallFlag {
    /// `name(args) = result`
    Full,
    /// `name(args <unfinished ...>`
    Unfinished,
    /// `<... name resumed> args) = result`
    Resumed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum ResultKind {
    Integer,
    Pointer,
    #[default]
    Unknown,
}

/// A single syscall line, or the reassembled text of a fragmented one
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SyscallEvent {
    /// Full line text, including pid prefix
    pub original: String,
    pub name: String,
    pub category: SyscallCategory,
    pub flag: SyscallFlag,
    pub pid: Option<Pid>,
    /// Only set for fork like calls that returned
    pub child_pid: Option<Pid>,
    pub path: Option<String>,
    /// Only set for chdir & getcwd
    pub working_directory: Option<String>,
    pub result: Option<String>,
    pub result_kind: ResultKind,
    pub errno: Option<String>,
    pub errno_description: Option<String>,
    pub argv: Option<Vec<String>>,
    pub envp: Option<Vec<String>>,
    /// Decoded `envp`, only set if every entry is a valid `KEY=VALUE` pair
    pub environment: Option<BTreeMap<String, String>>,
    pub exit_code: Option<i32>,
    /// File descriptor argument of close
    pub fd: Option<i32>,
}

impl SyscallEvent {
    pub(crate) fn new(original: &str, name: &str, flag: SyscallFlag, pid: Option<Pid>) -> Self {
        Self {
            original: original.to_owned(),
            name: name.to_owned(),
            category: SyscallCategory::classify(name),
            flag,
            pid,
            child_pid: None,
            path: None,
            working_directory: None,
            result: None,
            result_kind: ResultKind::Unknown,
            errno: None,
            errno_description: None,
            argv: None,
            envp: None,
            environment: None,
            exit_code: None,
            fd: None,
        }
    }

    /// Integer return value, if the call returned one
    pub(crate) fn int_result(&self) -> Option<i64> {
        match self.result_kind {
            ResultKind::Integer => self.result.as_deref().and_then(|r| r.parse().ok()),
            ResultKind::Pointer | ResultKind::Unknown => None,
        }
    }

    pub(crate) fn failed(&self) -> bool {
        self.errno.is_some()
    }

    /// Value of an environment variable passed to execve
    pub(crate) fn env_var(&self, key: &str) -> Option<&str> {
        self.environment
            .as_ref()
            .and_then(|e| e.get(key))
            .map(String::as_str)
    }
}

impl fmt::Display for SyscallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "syscall name={} category={} flag={}",
            self.name, self.category, self.flag
        )?;
        if let Some(pid) = self.pid {
            write!(f, " pid={pid}")?;
        }
        if let Some(child_pid) = self.child_pid {
            write!(f, " child_pid={child_pid}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " path={path:?}")?;
        }
        if let Some(working_directory) = &self.working_directory {
            write!(f, " working_directory={working_directory:?}")?;
        }
        if let Some(result) = &self.result {
            write!(f, " result={result} result_kind={}", self.result_kind)?;
        }
        if let Some(errno) = &self.errno {
            write!(f, " errno={errno}")?;
        }
        if let Some(errno_description) = &self.errno_description {
            write!(f, " errno_description={errno_description:?}")?;
        }
        if let Some(argv) = &self.argv {
            write!(f, " argv=[{}]", argv.iter().map(|a| format!("{a:?}")).join(", "))?;
        }
        if let Some(environment) = &self.environment {
            write!(f, " environment_size={}", environment.len())?;
        }
        if let Some(exit_code) = self.exit_code {
            write!(f, " exit_code={exit_code}")?;
        }
        if let Some(fd) = self.fd {
            write!(f, " fd={fd}")?;
        }
        Ok(())
    }
}

/// `--- SIGCHLD (description) ---`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SignalEvent {
    pub original: String,
    pub pid: Option<Pid>,
    pub symbol: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum StatusChangeKind {
    Attached,
    Detached,
    Resumed,
    Suspended,
}

/// `Process 1234 attached`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatusChangeEvent {
    pub original: String,
    pub pid: Option<Pid>,
    pub kind: StatusChangeKind,
}

/// Line that no grammar alternative recognized
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParseFailure {
    pub original: String,
    pub reason: &'static str,
}

/// Structured result of parsing one trace line
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ParsedEvent {
    Syscall(SyscallEvent),
    Signal(SignalEvent),
    StatusChange(StatusChangeEvent),
    ParseError(ParseFailure),
    /// End of stream
    Empty,
}

impl fmt::Display for ParsedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syscall(sc) => fmt::Display::fmt(sc, f),
            Self::Signal(sig) => {
                f.write_str("signal")?;
                if let Some(pid) = sig.pid {
                    write!(f, " pid={pid}")?;
                }
                write!(
                    f,
                    " symbol={} description={:?}",
                    sig.symbol, sig.description
                )
            }
            Self::StatusChange(sc) => {
                f.write_str("process_status_change")?;
                if let Some(pid) = sc.pid {
                    write!(f, " pid={pid}")?;
                }
                write!(f, " kind={}", sc.kind)
            }
            Self::ParseError(err) => {
                write!(
                    f,
                    "parse_error reason={:?} original={:?}",
                    err.reason, err.original
                )
            }
            Self::Empty => f.write_str("empty"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn classify_aliases() {
        let _ = simple_logger::SimpleLogger::new().init();

        assert_eq!(SyscallCategory::classify("vfork"), SyscallCategory::Fork);
        assert_eq!(SyscallCategory::classify("clone"), SyscallCategory::Fork);
        assert_eq!(SyscallCategory::classify("stat64"), SyscallCategory::Stat);
        assert_eq!(SyscallCategory::classify("lstat64"), SyscallCategory::Lstat);
        assert_eq!(SyscallCategory::classify("statfs64"), SyscallCategory::Statfs);
        assert_eq!(SyscallCategory::classify("execve"), SyscallCategory::Exec);
        assert_eq!(SyscallCategory::classify("exit_group"), SyscallCategory::Exit);
        assert_eq!(SyscallCategory::classify("creat"), SyscallCategory::Creat);
        assert_eq!(SyscallCategory::classify("openat"), SyscallCategory::Unknown);
        assert_eq!(SyscallCategory::classify(""), SyscallCategory::Unknown);
    }

    #[test]
    fn category_path_argument() {
        let _ = simple_logger::SimpleLogger::new().init();

        assert!(SyscallCategory::Open.takes_path());
        assert!(SyscallCategory::Getcwd.takes_path());
        assert!(!SyscallCategory::Fork.takes_path());
        assert!(!SyscallCategory::Fstat.takes_path());
        assert!(!SyscallCategory::Close.takes_path());
        assert_eq!(SyscallCategory::Readlink.to_string(), "READLINK");
    }

    #[test]
    fn status_change_kind_from_str() {
        let _ = simple_logger::SimpleLogger::new().init();

        assert_eq!(
            "suspended".parse::<StatusChangeKind>().ok(),
            Some(StatusChangeKind::Suspended)
        );
        assert!("exited".parse::<StatusChangeKind>().is_err());
    }

    #[test]
    fn syscall_display() {
        let _ = simple_logger::SimpleLogger::new().init();

        let mut sc = SyscallEvent::new(
            "1000 open(\"a\", O_RDONLY) = 3",
            "open",
            SyscallFlag::Full,
            Some(1000),
        );
        sc.path = Some("a".to_owned());
        sc.result = Some("3".to_owned());
        sc.result_kind = ResultKind::Integer;
        assert_eq!(
            sc.to_string(),
            "syscall name=open category=OPEN flag=full pid=1000 path=\"a\" result=3 result_kind=integer"
        );
        assert_eq!(sc.int_result(), Some(3));
    }
}
