//! Regex based strace line grammar

use std::sync::LazyLock;

use crate::strace::{Pid, StatusChangeKind};

#[expect(clippy::unwrap_used)]
static TOP_LEVEL_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::RegexBuilder::new(
        r"
^
(
    (
        (?<pid>[0-9]+)
        |
        \[pid\ (?<pid_bracket>[0-9]+)\]
    )
    \ +
)?
(?<payload>.*)
$
",
    )
    .ignore_whitespace(true)
    .build()
    .unwrap()
});

/// Shared tail of full and resumed calls: return value, then optional errno
const RETURN_VALUE_REGEX: &str = r"
\ +=\ +
(
    (?<ret_int>-?[0-9]+)
    |
    (?<ret_ptr>0x[0-9a-f]+)
    |
    \?
)
(
    \ +
    (?<errno>E[^\ ]+)
    \ +
    \((?<errno_desc>.*)\)
)?
$
";

#[expect(clippy::unwrap_used)]
static FULL_CALL_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::RegexBuilder::new(&format!(
        r"
^
(?<name>[^\(]+)
\(
(?<args>.*)
\)
{RETURN_VALUE_REGEX}"
    ))
    .ignore_whitespace(true)
    .build()
    .unwrap()
});

#[expect(clippy::unwrap_used)]
static UNFINISHED_CALL_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::RegexBuilder::new(
        r"
^
(?<name>[^\(]+)
\(
(?<args>.*)
,?
\ +<unfinished\ ...>
",
    )
    .ignore_whitespace(true)
    .build()
    .unwrap()
});

#[expect(clippy::unwrap_used)]
static RESUMED_CALL_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::RegexBuilder::new(&format!(
        r"
^
<...\ +
(?<name>[^\ ]+)
\ +resumed>
\ *
(?<args>.*)
\)
{RETURN_VALUE_REGEX}"
    ))
    .ignore_whitespace(true)
    .build()
    .unwrap()
});

#[expect(clippy::unwrap_used)]
static SIGNAL_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^-{3} +(?<symbol>[A-Z0-9]+) +\((?<description>[^\)]+)\).*$").unwrap()
});

#[expect(clippy::unwrap_used)]
static STATUS_CHANGE_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"^Process +(?<pid>[0-9]+) +(?<kind>attached|detached|resumed|suspended)$",
    )
    .unwrap()
});

#[expect(clippy::unwrap_used)]
static INTERRUPTED_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"^(?<fragment>.*)Process +(?<pid>[0-9]+) +(?<kind>attached|detached|resumed|suspended)$",
    )
    .unwrap()
});

/// Line split into its optional pid prefix and the rest
#[derive(Debug, PartialEq)]
pub(super) struct TopLevel<'a> {
    pub pid: Option<Pid>,
    pub payload: &'a str,
}

/// A full or resumed syscall line
#[derive(Debug, PartialEq)]
pub(super) struct Call<'a> {
    pub name: &'a str,
    pub args: &'a str,
    pub ret_int: Option<&'a str>,
    pub ret_ptr: Option<&'a str>,
    pub errno: Option<&'a str>,
    pub errno_description: Option<&'a str>,
}

impl<'a> Call<'a> {
    fn from_captures(caps: &regex::Captures<'a>) -> Option<Self> {
        Some(Self {
            name: caps.name("name")?.as_str(),
            args: caps.name("args").map_or("", |m| m.as_str()),
            ret_int: caps.name("ret_int").map(|m| m.as_str()),
            ret_ptr: caps.name("ret_ptr").map(|m| m.as_str()),
            errno: caps.name("errno").map(|m| m.as_str()),
            errno_description: caps.name("errno_desc").map(|m| m.as_str()),
        })
    }
}

/// Status notification, possibly spliced at the end of another message
#[derive(Debug, PartialEq)]
pub(super) struct StatusChange<'a> {
    /// Text preceding the notification, empty for a standalone one
    pub fragment: &'a str,
    pub pid: Option<Pid>,
    pub kind: StatusChangeKind,
}

impl<'a> StatusChange<'a> {
    fn from_captures(caps: &regex::Captures<'a>) -> Option<Self> {
        Some(Self {
            fragment: caps.name("fragment").map_or("", |m| m.as_str()),
            pid: caps.name("pid").and_then(|m| m.as_str().parse().ok()),
            kind: caps.name("kind")?.as_str().parse().ok()?,
        })
    }
}

pub(super) fn split_top_level(line: &str) -> TopLevel<'_> {
    match TOP_LEVEL_REGEX.captures(line) {
        Some(caps) => TopLevel {
            pid: caps
                .name("pid")
                .or_else(|| caps.name("pid_bracket"))
                .and_then(|m| m.as_str().parse().ok()),
            payload: caps.name("payload").map_or(line, |m| m.as_str()),
        },
        // payload can not match if the line contains a newline
        None => TopLevel {
            pid: None,
            payload: line,
        },
    }
}

pub(super) fn match_status_change(payload: &str) -> Option<StatusChange<'_>> {
    STATUS_CHANGE_REGEX
        .captures(payload)
        .and_then(|caps| StatusChange::from_captures(&caps))
}

/// Match on the whole line, so that the fragment keeps its pid prefix
pub(super) fn match_interrupted(line: &str) -> Option<StatusChange<'_>> {
    INTERRUPTED_REGEX
        .captures(line)
        .and_then(|caps| StatusChange::from_captures(&caps))
}

pub(super) fn match_full_call(payload: &str) -> Option<Call<'_>> {
    FULL_CALL_REGEX
        .captures(payload)
        .and_then(|caps| Call::from_captures(&caps))
}

pub(super) fn match_unfinished_call(payload: &str) -> Option<(&str, &str)> {
    let caps = UNFINISHED_CALL_REGEX.captures(payload)?;
    Some((
        caps.name("name")?.as_str(),
        caps.name("args").map_or("", |m| m.as_str()),
    ))
}

pub(super) fn match_resumed_call(payload: &str) -> Option<Call<'_>> {
    RESUMED_CALL_REGEX
        .captures(payload)
        .and_then(|caps| Call::from_captures(&caps))
}

/// Returns signal symbol and description
pub(super) fn match_signal(payload: &str) -> Option<(&str, &str)> {
    let caps = SIGNAL_REGEX.captures(payload)?;
    Some((
        caps.name("symbol")?.as_str(),
        caps.name("description")?.as_str(),
    ))
}
