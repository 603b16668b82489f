//! Path resolving analysis of parsed strace events

use std::collections::HashMap;

use itertools::Itertools as _;

use crate::{
    report::{OutputMessage, PathResult},
    strace::{ParsedEvent, SyscallCategory, SyscallEvent, SyscallFlag},
};

mod path_info;
mod procs;
mod stats;

use procs::{OpenOutcome, ProcessModel};
pub(crate) use stats::{Event, Statistics};

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Configuration {
    /// Attach the originating syscall to each path
    pub preserve_parsed_data: bool,
    /// Tag paths with local filesystem information
    pub path_info: bool,
}

/// Maintain a process model from syscalls, and report the absolute path of opened files
pub(crate) struct PathAnalyzer {
    model: ProcessModel,
    config: Configuration,
    /// Occurrences of each syscall name
    syscall_names: HashMap<String, u64>,
}

impl PathAnalyzer {
    pub(crate) fn new(config: Configuration) -> Self {
        Self {
            model: ProcessModel::new(),
            config,
            syscall_names: HashMap::new(),
        }
    }

    /// Process one event, returning what should be reported for it, if anything
    pub(crate) fn analyze(&mut self, event: ParsedEvent) -> Option<OutputMessage> {
        match event {
            ParsedEvent::Syscall(sc) => {
                self.model.record(Event::Syscall);
                *self.syscall_names.entry(sc.name.clone()).or_default() += 1;
                self.analyze_syscall(sc)
            }
            ParsedEvent::Signal(_) => {
                self.model.record(Event::Signal);
                None
            }
            ParsedEvent::StatusChange(_) => {
                self.model.record(Event::StatusChange);
                None
            }
            ParsedEvent::ParseError(_) => {
                self.model.record(Event::ParseError);
                None
            }
            ParsedEvent::Empty => {
                self.model.log_summary();
                for (name, count) in self
                    .syscall_names
                    .iter()
                    .sorted_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)))
                {
                    log::debug!("Syscall {name}: {count}");
                }
                let stats = self.model.statistics().clone();
                log::debug!("{stats}");
                Some(OutputMessage::Statistics(stats))
            }
        }
    }

    pub(crate) fn statistics(&self) -> &Statistics {
        self.model.statistics()
    }

    fn analyze_syscall(&mut self, sc: SyscallEvent) -> Option<OutputMessage> {
        if self.model.statistics().syscalls == 1 {
            // First line, avoid counting a miss for the initial process
            if let Err(e) = self.model.create_process(sc.pid) {
                log::warn!("{e}");
            }
        }

        let kind_event = match sc.category {
            SyscallCategory::Fork => Event::Fork,
            SyscallCategory::Exec => Event::Exec,
            SyscallCategory::Exit => Event::Exit,
            SyscallCategory::Getcwd => Event::Getcwd,
            SyscallCategory::Chdir => Event::Chdir,
            SyscallCategory::Open | SyscallCategory::Creat => Event::Open,
            SyscallCategory::Close => Event::Close,
            SyscallCategory::Access
            | SyscallCategory::Fstat
            | SyscallCategory::Lstat
            | SyscallCategory::Readlink
            | SyscallCategory::Stat
            | SyscallCategory::Statfs
            | SyscallCategory::Unknown => {
                self.model.record(Event::IgnoredSyscall);
                return None;
            }
        };
        self.model.record(kind_event);

        if sc.flag == SyscallFlag::Resumed {
            // Effects were applied when the call started, or can not be derived from the result alone
            self.model.record(Event::IgnoredResumedSyscall);
            return None;
        }

        match sc.category {
            SyscallCategory::Fork => self.handle_fork(&sc),
            SyscallCategory::Exec => self.handle_exec(&sc),
            SyscallCategory::Exit => {
                if let Some(exit_code) = sc.exit_code {
                    self.model.terminate_process(sc.pid, exit_code);
                }
            }
            SyscallCategory::Getcwd | SyscallCategory::Chdir => self.handle_working_directory(&sc),
            SyscallCategory::Open | SyscallCategory::Creat => return self.handle_open(sc),
            SyscallCategory::Close => {
                if let Some(fd) = sc.fd.filter(|_| !sc.failed()) {
                    self.model.record_close(sc.pid, fd);
                }
            }
            SyscallCategory::Access
            | SyscallCategory::Fstat
            | SyscallCategory::Lstat
            | SyscallCategory::Readlink
            | SyscallCategory::Stat
            | SyscallCategory::Statfs
            | SyscallCategory::Unknown => (),
        }
        None
    }

    fn handle_fork(&mut self, sc: &SyscallEvent) {
        let Some(child_pid) = sc.child_pid else {
            log::debug!("Unknown child pid for {:?}", sc.original);
            return;
        };
        if let Err(e) = self.model.create_child(sc.pid, child_pid) {
            log::warn!("{e}");
        }
    }

    fn handle_exec(&mut self, sc: &SyscallEvent) {
        if sc.failed() {
            return;
        }
        let pwd = sc.env_var("PWD");
        let process = self.model.get_or_create_process(sc.pid);
        let seed_working_directory = process.working_directory.is_none();
        if seed_working_directory {
            process.working_directory = pwd.map(ToOwned::to_owned);
        }
        process.executable.clone_from(&sc.path);
        if seed_working_directory && pwd.is_none() {
            self.model.record(Event::NoPwdEnvVar);
        }
    }

    fn handle_working_directory(&mut self, sc: &SyscallEvent) {
        if sc.failed() {
            return;
        }
        let Some(dir) = sc.working_directory.as_deref() else {
            self.model.record(Event::UnreportedParsingFailure);
            return;
        };
        self.model.get_or_create_process(sc.pid);
        // chdir accepts relative paths
        let dir = self.model.resolve_path(sc.pid, dir);
        self.model.get_or_create_process(sc.pid).working_directory = Some(dir);
    }

    fn handle_open(&mut self, sc: SyscallEvent) -> Option<OutputMessage> {
        let Some(path) = sc.path.as_deref() else {
            self.model.record(Event::UnreportedParsingFailure);
            return None;
        };
        self.model.get_or_create_process(sc.pid);
        let path = self.model.resolve_path(sc.pid, path);

        let outcome = if sc.failed() {
            OpenOutcome::Failed
        } else {
            match sc.int_result() {
                Some(fd) if fd >= 0 => OpenOutcome::Opened {
                    fd: i32::try_from(fd).unwrap_or(i32::MAX),
                },
                Some(_) => OpenOutcome::Failed,
                None => OpenOutcome::Pending,
            }
        };
        self.model.record_open(sc.pid, &path, outcome);

        let tags = if self.config.path_info {
            path_info::tags(&path).unwrap_or_else(|e| {
                log::warn!("Failed to tag {path:?}: {e}");
                Vec::new()
            })
        } else {
            Vec::new()
        };
        Some(OutputMessage::Path(PathResult {
            path,
            tags,
            parsed: self.config.preserve_parsed_data.then_some(sc),
        }))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::strace::TraceParser;

    fn run(config: Configuration, lines: &[&str]) -> (Vec<OutputMessage>, PathAnalyzer) {
        let mut parser = TraceParser::new();
        let mut analyzer = PathAnalyzer::new(config);
        let messages = lines
            .iter()
            .flat_map(|l| parser.parse_line(l))
            .filter_map(|e| analyzer.analyze(e))
            .collect();
        (messages, analyzer)
    }

    fn paths(messages: &[OutputMessage]) -> Vec<&str> {
        messages
            .iter()
            .filter_map(|m| match m {
                OutputMessage::Path(p) => Some(p.path.as_str()),
                OutputMessage::Statistics(_) | OutputMessage::Parsed(_) => None,
            })
            .collect()
    }

    #[test]
    fn exec_pwd_seeds_working_directory() {
        let _ = simple_logger::SimpleLogger::new().init();

        let (messages, analyzer) = run(
            Configuration::default(),
            &[
                r#"1000 execve("/bin/ls", ["ls"], ["PWD=/home/u"]) = 0"#,
                r#"1000 open("file.txt", O_RDONLY) = 3"#,
            ],
        );
        assert_eq!(paths(&messages), vec!["/home/u/file.txt"]);
        let stats = analyzer.statistics();
        assert_eq!(stats.get_process_misses, 0);
        assert_eq!(stats.pwd_env_var_misses, 0);
        assert_eq!(stats.exec, 1);
        assert_eq!(stats.open, 1);
    }

    #[test]
    fn getcwd_sets_working_directory() {
        let _ = simple_logger::SimpleLogger::new().init();

        let (messages, _) = run(
            Configuration::default(),
            &[
                r#"1000 getcwd("/tmp", 128) = 4"#,
                r#"1000 open("a", O_RDONLY) = 5"#,
            ],
        );
        assert_eq!(paths(&messages), vec!["/tmp/a"]);
    }

    #[test]
    fn resumed_chdir_ignored() {
        let _ = simple_logger::SimpleLogger::new().init();

        let (messages, analyzer) = run(
            Configuration::default(),
            &[
                r#"1000 getcwd("/tmp", 128) = 4"#,
                r#"1000 chdir("/var" <unfinished ...>"#,
                "1000 <... chdir resumed> ) = 0",
                r#"1000 open("a", O_RDONLY) = 5"#,
            ],
        );
        // Unfinished call already applied the change
        assert_eq!(paths(&messages), vec!["/var/a"]);
        let stats = analyzer.statistics();
        assert_eq!(stats.ignored_resumed, 1);
        assert_eq!(stats.chdir, 2);

        let (messages, analyzer) = run(
            Configuration::default(),
            &[
                r#"1000 getcwd("/tmp", 128) = 4"#,
                "1000 <... chdir resumed> ) = 0",
                r#"1000 open("a", O_RDONLY) = 5"#,
            ],
        );
        assert_eq!(paths(&messages), vec!["/tmp/a"]);
        assert_eq!(analyzer.statistics().ignored_resumed, 1);
    }

    #[test]
    fn relative_and_failed_chdir() {
        let _ = simple_logger::SimpleLogger::new().init();

        let (messages, _) = run(
            Configuration::default(),
            &[
                r#"getcwd("/srv", 4096) = 5"#,
                r#"chdir("data") = 0"#,
                r#"chdir("/nonexistent") = -1 ENOENT (No such file or directory)"#,
                r#"open("db", O_RDWR|O_CREAT, 0644) = 3"#,
            ],
        );
        assert_eq!(paths(&messages), vec!["/srv/data/db"]);
    }

    #[test]
    fn fork_inherits_working_directory() {
        let _ = simple_logger::SimpleLogger::new().init();

        let (messages, analyzer) = run(
            Configuration::default(),
            &[
                r#"1000 chdir("/etc") = 0"#,
                "1000 clone(child_stack=NULL, flags=SIGCHLD) = 1001",
                r#"[pid 1001] chdir("/usr") = 0"#,
                r#"[pid 1001] open("lib", O_RDONLY) = 3"#,
                r#"[pid 1000] open("hosts", O_RDONLY) = 3"#,
                "[pid 1001] exit_group(0) = ?",
                "1000 --- SIGCHLD (Child exited) @ 0 (0) ---",
                "Process 1001 detached",
            ],
        );
        assert_eq!(paths(&messages), vec!["/usr/lib", "/etc/hosts"]);
        let stats = analyzer.statistics();
        assert_eq!(stats.fork, 1);
        assert_eq!(stats.exit, 1);
        assert_eq!(stats.get_process_misses, 0);
        assert_eq!(stats.terminate_process_misses, 0);
        assert_eq!(stats.signals, 1);
        assert_eq!(stats.status_changes, 1);
        assert_eq!(stats.messages(), 8);
    }

    #[test]
    fn interrupted_fork() {
        let _ = simple_logger::SimpleLogger::new().init();

        let (messages, analyzer) = run(
            Configuration::default(),
            &[
                r#"1000 getcwd("/root", 4096) = 6"#,
                "1000 vfork(Process 1001 attached",
                ") = 1001",
                r#"[pid 1001] open("x", O_RDONLY) = 3"#,
            ],
        );
        assert_eq!(paths(&messages), vec!["/root/x"]);
        let stats = analyzer.statistics();
        assert_eq!(stats.fork, 1);
        assert_eq!(stats.get_process_misses, 0);
        assert_eq!(stats.parse_errors, 0);
    }

    #[test]
    fn unknown_process_and_working_directory() {
        let _ = simple_logger::SimpleLogger::new().init();

        let (messages, analyzer) = run(
            Configuration::default(),
            &[
                "1000 close(0) = 0",
                r#"2000 open("rel", O_RDONLY) = -1 ENOENT (No such file or directory)"#,
                r#"2000 open("/abs", O_RDONLY) = 3"#,
                "3000 exit_group(1) = ?",
                "garbage",
            ],
        );
        assert_eq!(paths(&messages), vec!["rel", "/abs"]);
        let stats = analyzer.statistics();
        assert_eq!(stats.get_process_misses, 1);
        assert_eq!(stats.working_directory_misses, 1);
        assert_eq!(stats.terminate_process_misses, 1);
        assert_eq!(stats.parse_errors, 1);
    }

    #[test]
    fn exec_without_pwd() {
        let _ = simple_logger::SimpleLogger::new().init();

        let (_, analyzer) = run(
            Configuration::default(),
            &[r#"execve("/bin/true", ["true"], 0x7ffd0c1b0f58 /* 3 vars */) = 0"#],
        );
        assert_eq!(analyzer.statistics().pwd_env_var_misses, 1);
    }

    #[test]
    fn undecodable_path() {
        let _ = simple_logger::SimpleLogger::new().init();

        let (messages, analyzer) = run(
            Configuration::default(),
            &[
                "getcwd(0x7ffc8e2b5a30, 4096) = 0",
                "open(0x4005d4, O_RDONLY) = 3",
                "fstat(3, {st_mode=S_IFREG|0644, st_size=1234, ...}) = 0",
            ],
        );
        assert!(paths(&messages).is_empty());
        let stats = analyzer.statistics();
        assert_eq!(stats.unreported_parsing_failures, 2);
        assert_eq!(stats.ignored, 1);
    }

    #[test]
    fn preserve_parsed_data() {
        let _ = simple_logger::SimpleLogger::new().init();

        let line = r#"1000 creat("/tmp/out", 0644) = 3"#;
        let (messages, _) = run(
            Configuration {
                preserve_parsed_data: true,
                path_info: false,
            },
            &[line],
        );
        let [OutputMessage::Path(result)] = messages.as_slice() else {
            panic!("Unexpected messages: {messages:?}");
        };
        assert_eq!(result.path, "/tmp/out");
        let parsed = result.parsed.as_ref().unwrap();
        assert_eq!(parsed.original, line);
        assert_eq!(parsed.category, SyscallCategory::Creat);
    }

    #[test]
    fn statistics_at_end_of_stream() {
        let _ = simple_logger::SimpleLogger::new().init();

        let mut analyzer = PathAnalyzer::new(Configuration::default());
        let Some(OutputMessage::Statistics(stats)) = analyzer.analyze(ParsedEvent::Empty) else {
            panic!("No statistics");
        };
        assert_eq!(stats.messages(), 0);
    }
}
