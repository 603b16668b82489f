//! Syscall argument decoders

use std::{str, sync::LazyLock};

/// Leading quoted string argument, with the remaining arguments after it
///
/// A backslash always escapes the next character here, escapes are resolved by `ESCAPE_REGEX`.
#[expect(clippy::unwrap_used)]
static STRING_ARG_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::RegexBuilder::new(
        r#"
^
"
(?<value>
    (?:
        [^"\\]
        |
        \\.
    )*
)
"
(?<truncated>\.{3})?
(
    ,\ (?<next>.*)
    |
    (?<end>\].*)
)?
$
"#,
    )
    .ignore_whitespace(true)
    .build()
    .unwrap()
});

/// Hex and unicode escapes starting with a zero digit are not recognized, and stay literal
#[expect(clippy::unwrap_used)]
static ESCAPE_REGEX: LazyLock<regex::bytes::Regex> = LazyLock::new(|| {
    regex::bytes::Regex::new(
        r#"\\(?<esc>[0abfnrtv\\'"?]|[1-7][0-7]{2}|x[1-9a-fA-F][0-9a-fA-F]|u[1-9a-fA-F][0-9a-fA-F]{3})"#,
    )
    .unwrap()
});

/// Parse a leading string literal argument
///
/// Returns the decoded value and the unconsumed rest of the argument list, which is empty for the
/// last argument, and starts with `]` for the last element of an array.
pub(super) fn parse_string(args: &str) -> Option<(String, &str)> {
    let caps = STRING_ARG_REGEX.captures(args)?;
    let raw = caps.name("value").map_or("", |m| m.as_str());
    if caps.name("truncated").is_some() {
        log::trace!("Truncated string argument {raw:?}");
    }
    let rest = caps
        .name("next")
        .or_else(|| caps.name("end"))
        .map_or("", |m| m.as_str());
    Some((decode_escapes(raw), rest))
}

/// Parse a leading `["a", "b"]` array argument
///
/// Returns the decoded elements and the rest after the closing bracket and its separator.
pub(super) fn parse_string_list(args: &str) -> Option<(Vec<String>, &str)> {
    let mut rest = args.strip_prefix('[')?;
    let mut items = Vec::new();
    while !rest.starts_with(']') {
        let (item, next) = parse_string(rest)?;
        if next.is_empty() {
            // missing closing bracket
            return None;
        }
        items.push(item);
        rest = next;
    }
    let rest = rest.strip_prefix(']')?;
    let rest = rest.strip_prefix(',').map_or(rest, |r| r.trim_start_matches(' '));
    Some((items, rest))
}

/// Split a `KEY=VALUE` environment entry
pub(super) fn parse_env_pair(entry: &str) -> Option<(&str, &str)> {
    entry.split_once('=').filter(|(k, _v)| !k.is_empty())
}

/// Parse a leading integer argument, like the fd of close or the status of exit
pub(super) fn parse_int(args: &str) -> Option<i32> {
    let first = args.split_once(',').map_or(args, |(a, _)| a);
    first.trim().parse().ok()
}

/// Resolve C escape sequences, leaving anything else untouched
fn decode_escapes(raw: &str) -> String {
    if !raw.contains('\\') {
        return raw.to_owned();
    }
    let decoded = ESCAPE_REGEX.replace_all(raw.as_bytes(), |caps: &regex::bytes::Captures<'_>| {
        let whole = caps.get(0).map_or(&b""[..], |m| m.as_bytes());
        caps.name("esc")
            .and_then(|m| decode_escape(m.as_bytes()))
            .unwrap_or_else(|| whole.to_vec())
    });
    String::from_utf8_lossy(&decoded).into_owned()
}

fn decode_escape(esc: &[u8]) -> Option<Vec<u8>> {
    let byte = match esc {
        [b'0'] => 0x00,
        [b'a'] => 0x07,
        [b'b'] => 0x08,
        [b'f'] => 0x0c,
        [b'n'] => 0x0a,
        [b'r'] => 0x0d,
        [b't'] => 0x09,
        [b'v'] => 0x0b,
        [c @ (b'\\' | b'\'' | b'"' | b'?')] => *c,
        [b'x', hex @ ..] => u8::from_str_radix(str::from_utf8(hex).ok()?, 16).ok()?,
        [b'u', hex @ ..] => {
            let code_point = u32::from_str_radix(str::from_utf8(hex).ok()?, 16).ok()?;
            return char::from_u32(code_point).map(|c| c.to_string().into_bytes());
        }
        // octal, may overflow a byte
        oct => u8::from_str_radix(str::from_utf8(oct).ok()?, 8).ok()?,
    };
    Some(vec![byte])
}
