//! Strace output parser

use std::{collections::VecDeque, io::BufRead, mem};

use crate::strace::{
    ParseFailure, ParsedEvent, Pid, ResultKind, SignalEvent, StatusChangeEvent, SyscallCategory,
    SyscallEvent, SyscallFlag,
};

mod args;
mod regex;

const UNKNOWN_MESSAGE: &str = "Unknown type of strace message.";

/// Text of a syscall message split by a process status notification
#[derive(Debug, Default)]
struct Backlog {
    buf: String,
    should_finalize: bool,
}

impl Backlog {
    fn append(&mut self, s: &str) {
        self.buf.push_str(s);
    }

    fn is_dirty(&self) -> bool {
        !self.buf.is_empty()
    }

    /// The interruption has ended, next drain will yield the message
    fn mark_for_finalization(&mut self) {
        debug_assert!(self.is_dirty(), "Marking clean backlog for finalization");
        debug_assert!(!self.should_finalize, "Backlog already marked for finalization");
        self.should_finalize = true;
    }

    /// Take the reassembled message if it is complete
    fn drain(&mut self) -> Option<String> {
        if !self.should_finalize {
            return None;
        }
        self.should_finalize = false;
        Some(mem::take(&mut self.buf))
    }
}

/// Stateful strace line parser
///
/// Each line yields zero, one or two events, in chronological order.
#[derive(Debug, Default)]
pub(crate) struct TraceParser {
    backlog: Backlog,
}

impl TraceParser {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Parse a single line, without its line terminator
    pub(crate) fn parse_line(&mut self, line: &str) -> Vec<ParsedEvent> {
        let event = self.parse_top_level(line);
        let mut events = Vec::with_capacity(2);
        // Backlog message was started before the current line
        if let Some(message) = self.backlog.drain() {
            log::trace!("Reassembled message: {message:?}");
            events.push(parse_detached(&message));
        }
        events.extend(event);
        events
    }

    /// Pending message fragment, if any
    pub(crate) fn pending_fragment(&self) -> Option<&str> {
        self.backlog.is_dirty().then_some(self.backlog.buf.as_str())
    }

    fn parse_top_level(&mut self, line: &str) -> Option<ParsedEvent> {
        let top = regex::split_top_level(line);

        if let Some(status) = regex::match_status_change(top.payload) {
            return Some(status_change_event(line, &status));
        }

        if let Some(status) = regex::match_interrupted(line) {
            log::trace!("Message interrupted by status change: {:?}", status.fragment);
            self.backlog.append(status.fragment);
            return Some(status_change_event(line, &status));
        }

        match parse_message(line, top.pid, top.payload) {
            Some(event) => {
                if self.backlog.is_dirty() {
                    self.backlog.mark_for_finalization();
                }
                Some(event)
            }
            None if self.backlog.is_dirty() => {
                // Continuation of the interrupted message
                self.backlog.append(line);
                None
            }
            None => Some(parse_error(line)),
        }
    }
}

/// Parse a line without any backlog interaction
fn parse_detached(line: &str) -> ParsedEvent {
    let top = regex::split_top_level(line);
    regex::match_status_change(top.payload)
        .map(|status| status_change_event(line, &status))
        .or_else(|| parse_message(line, top.pid, top.payload))
        .unwrap_or_else(|| parse_error(line))
}

/// Syscalls and signals, in priority order
fn parse_message(original: &str, pid: Option<Pid>, payload: &str) -> Option<ParsedEvent> {
    if let Some(call) = regex::match_full_call(payload) {
        let mut sc = SyscallEvent::new(original, call.name, SyscallFlag::Full, pid);
        set_result(&mut sc, &call);
        decode_arguments(&mut sc, call.args);
        return Some(ParsedEvent::Syscall(sc));
    }
    if let Some((name, args)) = regex::match_unfinished_call(payload) {
        let mut sc = SyscallEvent::new(original, name, SyscallFlag::Unfinished, pid);
        decode_arguments(&mut sc, args);
        return Some(ParsedEvent::Syscall(sc));
    }
    if let Some(call) = regex::match_resumed_call(payload) {
        // Arguments of a resumed call are incomplete, only keep the result
        let mut sc = SyscallEvent::new(original, call.name, SyscallFlag::Resumed, pid);
        set_result(&mut sc, &call);
        return Some(ParsedEvent::Syscall(sc));
    }
    regex::match_signal(payload).map(|(symbol, description)| {
        ParsedEvent::Signal(SignalEvent {
            original: original.to_owned(),
            pid,
            symbol: symbol.to_owned(),
            description: description.to_owned(),
        })
    })
}

fn status_change_event(original: &str, status: &regex::StatusChange<'_>) -> ParsedEvent {
    ParsedEvent::StatusChange(StatusChangeEvent {
        original: original.to_owned(),
        pid: status.pid,
        kind: status.kind,
    })
}

fn parse_error(line: &str) -> ParsedEvent {
    log::debug!("Unable to parse line: {line:?}");
    ParsedEvent::ParseError(ParseFailure {
        original: line.to_owned(),
        reason: UNKNOWN_MESSAGE,
    })
}

fn set_result(sc: &mut SyscallEvent, call: &regex::Call<'_>) {
    if let Some(ret) = call.ret_int {
        sc.result = Some(ret.to_owned());
        sc.result_kind = ResultKind::Integer;
    } else if let Some(ret) = call.ret_ptr {
        sc.result = Some(ret.to_owned());
        sc.result_kind = ResultKind::Pointer;
    }
    sc.errno = call.errno.map(ToOwned::to_owned);
    sc.errno_description = call.errno_description.map(ToOwned::to_owned);
}

/// Extract the arguments the analysis needs, based on syscall category
fn decode_arguments(sc: &mut SyscallEvent, args: &str) {
    match sc.category {
        category if category.takes_path() => {
            let Some((path, rest)) = args::parse_string(args) else {
                log::trace!("No path argument for {}: {args:?}", sc.name);
                return;
            };
            match category {
                SyscallCategory::Exec => decode_exec_arguments(sc, rest),
                SyscallCategory::Chdir | SyscallCategory::Getcwd => {
                    sc.working_directory = Some(path.clone());
                }
                _ => (),
            }
            sc.path = Some(path);
        }
        SyscallCategory::Fork => {
            // Unknown if the call is unfinished
            sc.child_pid = sc.int_result().and_then(|r| Pid::try_from(r).ok());
        }
        SyscallCategory::Exit => sc.exit_code = args::parse_int(args),
        SyscallCategory::Close => sc.fd = args::parse_int(args),
        _ => (),
    }
}

/// Decode argv & envp, following the executable path
fn decode_exec_arguments(sc: &mut SyscallEvent, rest: &str) {
    let Some((argv, rest)) = args::parse_string_list(rest) else {
        return;
    };
    sc.argv = Some(argv);
    let Some((envp, _)) = args::parse_string_list(rest) else {
        return;
    };
    sc.environment = envp
        .iter()
        .map(|e| {
            args::parse_env_pair(e).map(|(k, v)| (k.to_owned(), v.to_owned()))
        })
        .collect();
    if sc.environment.is_none() {
        log::debug!("Invalid environment for {:?}", sc.original);
    }
    sc.envp = Some(envp);
}

/// Iterator over events parsed from a line source
pub(crate) struct LogParser {
    reader: Box<dyn BufRead>,
    buf: String,
    parser: TraceParser,
    pending: VecDeque<ParsedEvent>,
    eof: bool,
}

impl LogParser {
    pub(crate) fn new(reader: Box<dyn BufRead>) -> Self {
        Self {
            reader,
            buf: String::new(),
            parser: TraceParser::new(),
            pending: VecDeque::with_capacity(2),
            eof: false,
        }
    }
}

impl Iterator for LogParser {
    type Item = anyhow::Result<ParsedEvent>;

    /// Yield parsed events, then a single `Empty` event at end of input
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.eof {
                return None;
            }

            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => {
                    self.eof = true;
                    if let Some(fragment) = self.parser.pending_fragment() {
                        log::debug!("Dropping unfinished message at end of input: {fragment:?}");
                    }
                    return Some(Ok(ParsedEvent::Empty));
                }
                Ok(_) => {
                    let line = self.buf.trim_end_matches(['\n', '\r']);
                    log::trace!("Line: {line:?}");
                    self.pending.extend(self.parser.parse_line(line));
                }
                Err(e) => return Some(Err(anyhow::Error::new(e).context("Failed to read line"))),
            }
        }
    }
}
