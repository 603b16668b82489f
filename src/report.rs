//! Analysis output messages

use std::fmt;

use itertools::Itertools as _;

use crate::{
    analyze::Statistics,
    strace::{ParsedEvent, SyscallEvent},
};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub(crate) enum TagError {
    #[error("Tag has no name")]
    EmptyName,
    #[error("Tag name {name:?} has an empty segment")]
    EmptySegment { name: String },
}

/// Hierarchical `key.sub="value"` annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Tag {
    segments: Vec<String>,
    value: String,
}

impl Tag {
    pub(crate) fn new<S: AsRef<str>>(segments: &[S], value: &str) -> Result<Self, TagError> {
        if segments.is_empty() {
            return Err(TagError::EmptyName);
        }
        if segments.iter().any(|s| s.as_ref().is_empty()) {
            return Err(TagError::EmptySegment {
                name: segments.iter().map(|s| s.as_ref()).join("."),
            });
        }
        Ok(Self {
            segments: segments.iter().map(|s| s.as_ref().to_owned()).collect(),
            value: value.to_owned(),
        })
    }

    pub(crate) fn name(&self) -> String {
        self.segments.join(".")
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={:?}", self.name(), self.value)
    }
}

/// Path opened by a traced process
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PathResult {
    /// Absolute, unless the process working directory was unknown
    pub path: String,
    pub tags: Vec<Tag>,
    /// Syscall the path comes from
    pub parsed: Option<SyscallEvent>,
}

impl fmt::Display for PathResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        for tag in &self.tags {
            write!(f, " {tag}")?;
        }
        if let Some(parsed) = &self.parsed {
            write!(f, " <- {parsed}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) enum OutputMessage {
    Path(PathResult),
    Statistics(Statistics),
    Parsed(ParsedEvent),
}

impl OutputMessage {
    /// Whether two consecutive messages can be collapsed into one
    ///
    /// Statistics are never equal, not even to themselves.
    pub(crate) fn message_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Path(a), Self::Path(b)) => a == b,
            (Self::Parsed(a), Self::Parsed(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for OutputMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => write!(f, "{p}"),
            Self::Statistics(s) => write!(f, "{s}"),
            Self::Parsed(e) => write!(f, "{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::analyze::Event;

    fn path(p: &str) -> OutputMessage {
        OutputMessage::Path(PathResult {
            path: p.to_owned(),
            tags: vec![],
            parsed: None,
        })
    }

    #[test]
    fn tag_validation() {
        let _ = simple_logger::SimpleLogger::new().init();

        assert_eq!(Tag::new::<&str>(&[], "v"), Err(TagError::EmptyName));
        assert_eq!(
            Tag::new(&["path-info", ""], "v"),
            Err(TagError::EmptySegment {
                name: "path-info.".to_owned()
            })
        );
        let tag = Tag::new(&["path-info", "exists"], "true").unwrap();
        assert_eq!(tag.name(), "path-info.exists");
        assert_eq!(tag.to_string(), "path-info.exists=\"true\"");
    }

    #[test]
    fn path_rendering() {
        let _ = simple_logger::SimpleLogger::new().init();

        let msg = OutputMessage::Path(PathResult {
            path: "/tmp/a b".to_owned(),
            tags: vec![Tag::new(&["k"], "say \"hi\"").unwrap()],
            parsed: None,
        });
        assert_eq!(msg.to_string(), "/tmp/a b k=\"say \\\"hi\\\"\"");
    }

    #[test]
    fn path_equality() {
        let _ = simple_logger::SimpleLogger::new().init();

        assert!(path("/a").message_equals(&path("/a")));
        assert!(!path("/a").message_equals(&path("/b")));
        assert!(!path("/a").message_equals(&OutputMessage::Parsed(ParsedEvent::Empty)));
    }

    #[test]
    fn statistics_never_equal() {
        let _ = simple_logger::SimpleLogger::new().init();

        let mut stats = Statistics::default();
        stats.update(Event::Syscall);
        let a = OutputMessage::Statistics(stats.clone());
        let b = OutputMessage::Statistics(stats);
        assert!(!a.message_equals(&b));
        assert!(!a.message_equals(&a));
        assert!(!OutputMessage::Statistics(Statistics::default())
            .message_equals(&OutputMessage::Statistics(Statistics::default())));
    }
}
