//! Analysis counters

use std::fmt;

/// Something worth counting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    Syscall,
    IgnoredSyscall,
    IgnoredResumedSyscall,
    Signal,
    StatusChange,
    Fork,
    Exec,
    Exit,
    Open,
    Close,
    Getcwd,
    Chdir,
    GetProcessMiss,
    TerminateProcessMiss,
    WorkingDirectoryMiss,
    NoPwdEnvVar,
    ParseError,
    UnreportedParsingFailure,
}

/// Append only event counters
///
/// Does not implement `PartialEq`: two snapshots are always distinct reports.
#[derive(Debug, Clone, Default)]
pub(crate) struct Statistics {
    pub syscalls: u64,
    pub ignored: u64,
    pub ignored_resumed: u64,
    pub signals: u64,
    pub status_changes: u64,
    pub fork: u64,
    pub exec: u64,
    pub exit: u64,
    pub open: u64,
    pub close: u64,
    pub getcwd: u64,
    pub chdir: u64,
    pub get_process_misses: u64,
    pub terminate_process_misses: u64,
    pub working_directory_misses: u64,
    pub pwd_env_var_misses: u64,
    pub parse_errors: u64,
    pub unreported_parsing_failures: u64,
}

impl Statistics {
    pub(crate) fn update(&mut self, event: Event) {
        let counter = match event {
            Event::Syscall => &mut self.syscalls,
            Event::IgnoredSyscall => &mut self.ignored,
            Event::IgnoredResumedSyscall => &mut self.ignored_resumed,
            Event::Signal => &mut self.signals,
            Event::StatusChange => &mut self.status_changes,
            Event::Fork => &mut self.fork,
            Event::Exec => &mut self.exec,
            Event::Exit => &mut self.exit,
            Event::Open => &mut self.open,
            Event::Close => &mut self.close,
            Event::Getcwd => &mut self.getcwd,
            Event::Chdir => &mut self.chdir,
            Event::GetProcessMiss => &mut self.get_process_misses,
            Event::TerminateProcessMiss => &mut self.terminate_process_misses,
            Event::WorkingDirectoryMiss => &mut self.working_directory_misses,
            Event::NoPwdEnvVar => &mut self.pwd_env_var_misses,
            Event::ParseError => &mut self.parse_errors,
            Event::UnreportedParsingFailure => &mut self.unreported_parsing_failures,
        };
        *counter += 1;
    }

    /// Syscalls, signals and status changes
    pub(crate) fn messages(&self) -> u64 {
        self.syscalls + self.signals + self.status_changes
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "statistics messages={} syscalls={} ignored={} ignored_resumed={} fork={} exec={} exit={} \
             open={} close={} getcwd={} chdir={} signals={} status_changes={} get_process_misses={} \
             terminate_process_misses={} working_directory_misses={} pwd_env_var_misses={} \
             parse_errors={} unreported_parsing_failures={}",
            self.messages(),
            self.syscalls,
            self.ignored,
            self.ignored_resumed,
            self.fork,
            self.exec,
            self.exit,
            self.open,
            self.close,
            self.getcwd,
            self.chdir,
            self.signals,
            self.status_changes,
            self.get_process_misses,
            self.terminate_process_misses,
            self.working_directory_misses,
            self.pwd_env_var_misses,
            self.parse_errors,
            self.unreported_parsing_failures,
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn counters() {
        let _ = simple_logger::SimpleLogger::new().init();

        let mut stats = Statistics::default();
        stats.update(Event::Syscall);
        stats.update(Event::Syscall);
        stats.update(Event::Signal);
        stats.update(Event::StatusChange);
        stats.update(Event::ParseError);
        stats.update(Event::TerminateProcessMiss);
        assert_eq!(stats.syscalls, 2);
        assert_eq!(stats.messages(), 4);
        assert_eq!(stats.parse_errors, 1);
        assert_eq!(stats.terminate_process_misses, 1);
        assert_eq!(stats.get_process_misses, 0);
    }

    #[test]
    fn render() {
        let _ = simple_logger::SimpleLogger::new().init();

        let mut stats = Statistics::default();
        stats.update(Event::Open);
        let rendered = stats.to_string();
        assert!(rendered.starts_with("statistics messages=0 syscalls=0 ignored=0"));
        assert!(rendered.contains(" open=1 "));
        assert!(rendered.ends_with(" unreported_parsing_failures=0"));
    }
}
