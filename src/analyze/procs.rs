//! Process model

use std::collections::{BTreeMap, HashMap, btree_map::Entry};

use crate::{
    analyze::stats::{Event, Statistics},
    strace::Pid,
};

/// Model key of a process, `None` for lines without a pid prefix
pub(crate) type ProcessKey = Option<Pid>;

fn fmt_key(key: ProcessKey) -> String {
    key.map_or_else(|| "<none>".to_owned(), |p| p.to_string())
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub(crate) enum ModelError {
    #[error("Process {} is already live", fmt_key(*.pid))]
    AlreadyLive { pid: ProcessKey },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Process {
    pub pid: ProcessKey,
    pub parent: Option<Pid>,
    pub executable: Option<String>,
    pub working_directory: Option<String>,
    pub exit_code: Option<i32>,
    /// Unique among all processes ever created, unlike pid
    serial: u64,
}

impl Process {
    fn new(
        serial: u64,
        pid: ProcessKey,
        parent: Option<Pid>,
        working_directory: Option<String>,
    ) -> Self {
        Self {
            pid,
            parent,
            executable: None,
            working_directory,
            exit_code: None,
            serial,
        }
    }
}

/// Per process and path open activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct OpenFileStats {
    pub open_count: u32,
    pub close_count: u32,
    pub failed_open_count: u32,
}

/// Outcome of an open like syscall
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenOutcome {
    Opened { fd: i32 },
    Failed,
    /// Call is unfinished
    Pending,
}

/// Live and terminated processes, and the counters of everything that went wrong looking them up
#[derive(Debug, Default)]
pub(crate) struct ProcessModel {
    live: BTreeMap<ProcessKey, Process>,
    terminated: Vec<Process>,
    open_files: HashMap<(u64, String), OpenFileStats>,
    open_fds: HashMap<(u64, i32), String>,
    next_serial: u64,
    stats: Statistics,
}

impl ProcessModel {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn statistics(&self) -> &Statistics {
        &self.stats
    }

    pub(crate) fn record(&mut self, event: Event) {
        self.stats.update(event);
    }

    fn new_process(
        &mut self,
        pid: ProcessKey,
        parent: Option<Pid>,
        working_directory: Option<String>,
    ) -> Process {
        let serial = self.next_serial;
        self.next_serial += 1;
        Process::new(serial, pid, parent, working_directory)
    }

    fn insert(&mut self, process: Process) -> &mut Process {
        match self.live.entry(process.pid) {
            Entry::Occupied(mut e) => {
                e.insert(process);
                e.into_mut()
            }
            Entry::Vacant(e) => e.insert(process),
        }
    }

    /// Create a process with no known parent
    pub(crate) fn create_process(&mut self, pid: ProcessKey) -> Result<&mut Process, ModelError> {
        if self.live.contains_key(&pid) {
            return Err(ModelError::AlreadyLive { pid });
        }
        log::trace!("New process {}", fmt_key(pid));
        let process = self.new_process(pid, None, None);
        Ok(self.insert(process))
    }

    /// Create a child process, inheriting a copy of its parent working directory
    ///
    /// An unknown parent is replaced by a placeholder with unknown working directory.
    pub(crate) fn create_child(
        &mut self,
        parent: ProcessKey,
        pid: Pid,
    ) -> Result<&mut Process, ModelError> {
        if self.live.contains_key(&Some(pid)) {
            return Err(ModelError::AlreadyLive { pid: Some(pid) });
        }
        let working_directory = if let Some(parent) = self.get_process(parent) {
            parent.working_directory.clone()
        } else {
            log::trace!("Placeholder for parent process {}", fmt_key(parent));
            let placeholder = self.new_process(parent, None, None);
            self.insert(placeholder);
            None
        };
        log::trace!("New process {pid} forked from {}", fmt_key(parent));
        let child = self.new_process(Some(pid), parent, working_directory);
        Ok(self.insert(child))
    }

    /// Move a live process to the terminated ones
    pub(crate) fn terminate_process(&mut self, pid: ProcessKey, exit_code: i32) {
        if let Some(mut process) = self.live.remove(&pid) {
            log::trace!("Process {} exited with code {exit_code}", fmt_key(pid));
            process.exit_code = Some(exit_code);
            self.open_fds.retain(|(serial, _), _| *serial != process.serial);
            self.terminated.push(process);
        } else {
            self.record(Event::TerminateProcessMiss);
        }
    }

    /// Lookup a live process, counting a miss if it does not exist
    pub(crate) fn get_process(&mut self, pid: ProcessKey) -> Option<&mut Process> {
        if !self.live.contains_key(&pid) {
            self.record(Event::GetProcessMiss);
        }
        self.live.get_mut(&pid)
    }

    /// Lookup a live process, creating a minimal one if it does not exist
    pub(crate) fn get_or_create_process(&mut self, pid: ProcessKey) -> &mut Process {
        match self.live.entry(pid) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                log::trace!("Process {} appeared without being created", fmt_key(pid));
                self.stats.update(Event::GetProcessMiss);
                let serial = self.next_serial;
                self.next_serial += 1;
                e.insert(Process::new(serial, pid, None, None))
            }
        }
    }

    /// Make a path absolute using the process working directory
    ///
    /// The result stays relative if the working directory is unknown.
    pub(crate) fn resolve_path(&mut self, pid: ProcessKey, path: &str) -> String {
        if path.starts_with('/') {
            return path.to_owned();
        }
        match self
            .live
            .get(&pid)
            .and_then(|p| p.working_directory.as_deref())
        {
            Some(wd) => format!("{}/{path}", wd.trim_end_matches('/')),
            None => {
                self.stats.update(Event::WorkingDirectoryMiss);
                path.to_owned()
            }
        }
    }

    /// Count an open attempt of a path, which must already be resolved
    pub(crate) fn record_open(&mut self, pid: ProcessKey, path: &str, outcome: OpenOutcome) {
        let serial = self.get_or_create_process(pid).serial;
        let stats = self
            .open_files
            .entry((serial, path.to_owned()))
            .or_default();
        match outcome {
            OpenOutcome::Opened { fd } => {
                stats.open_count += 1;
                self.open_fds.insert((serial, fd), path.to_owned());
            }
            OpenOutcome::Failed => stats.failed_open_count += 1,
            OpenOutcome::Pending => (),
        }
    }

    /// Count a close of a file descriptor previously returned by an open
    pub(crate) fn record_close(&mut self, pid: ProcessKey, fd: i32) {
        let serial = self.get_or_create_process(pid).serial;
        match self.open_fds.remove(&(serial, fd)) {
            Some(path) => {
                if let Some(stats) = self.open_files.get_mut(&(serial, path)) {
                    stats.close_count += 1;
                }
            }
            None => log::trace!("Close of untracked fd {fd} by process {}", fmt_key(pid)),
        }
    }

    /// Open activity of a process, by path
    pub(crate) fn open_files(&self, process: &Process) -> BTreeMap<&str, OpenFileStats> {
        self.open_files
            .iter()
            .filter(|((serial, _), _)| *serial == process.serial)
            .map(|((_, path), stats)| (path.as_str(), *stats))
            .collect()
    }

    /// Live processes, then terminated ones in termination order
    pub(crate) fn processes(&self) -> impl Iterator<Item = &Process> {
        self.live.values().chain(self.terminated.iter())
    }

    pub(crate) fn log_summary(&self) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        for process in self.processes() {
            log::debug!(
                "Process {}: parent={:?} executable={:?} working_directory={:?} exit_code={:?}",
                fmt_key(process.pid),
                process.parent,
                process.executable,
                process.working_directory,
                process.exit_code
            );
            for (path, stats) in self.open_files(process) {
                log::debug!(
                    "  {path:?}: open={} close={} failed={}",
                    stats.open_count,
                    stats.close_count,
                    stats.failed_open_count
                );
            }
        }
    }
}
