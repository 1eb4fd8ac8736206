// ABOUTME: Directive grammar for reply templates
// ABOUTME: Pattern definitions plus the pure expansions that need no engine state

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::ops::Range;
use std::time::Duration;
use tracing::debug;

use super::context::InvocationContext;
use super::error::DirectiveError;

pub const DEFAULT_MAX_REPEAT: usize = 1000;

/// `name:value`, `name=value`, `name =value` at the start of a line.
static ASSIGNMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?s)([\p{L}\p{N}_]+)(?::| ?=)(.*)$").expect("valid regex"));

pub static GLOBAL_SET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$GLOBAL ([^\s$]+) ([^$]+)\$").expect("valid regex"));

pub static GLOBAL_GET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$GLOBAL ([^\s$]+)\$").expect("valid regex"));

pub static LOCAL_SET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$VAR ([^\s$]+) ([^$]+)\$").expect("valid regex"));

static LOCAL_GET: Lazy<Regex> = Lazy::new(|| Regex::new(r"%([^%\s]+)%").expect("valid regex"));

static REPEAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$REPEAT ([^$]*) ([^\s$]+)\$").expect("valid regex"));

pub static CALLBACK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$CALLBACK ([^$]+)\$").expect("valid regex"));

pub static DEFERRED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$CALL ([^$]+)\$").expect("valid regex"));

/// One directive occurrence, detached from the line it was found in.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub range: Range<usize>,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeferredCall {
    pub delay: Option<Duration>,
    pub trigger: String,
}

/// All matches of `pattern` in `line`, with capture groups copied out.
pub fn occurrences(pattern: &Regex, line: &str) -> Vec<Occurrence> {
    pattern
        .captures_iter(line)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let args = caps
                .iter()
                .skip(1)
                .map(|group| group.map(|g| g.as_str().to_string()).unwrap_or_default())
                .collect();
            Some(Occurrence {
                range: whole.range(),
                args,
            })
        })
        .collect()
}

/// Replace non-overlapping ranges of `line`, given in ascending order.
pub fn splice(line: &str, replacements: Vec<(Range<usize>, String)>) -> String {
    let mut output = String::with_capacity(line.len());
    let mut cursor = 0;

    for (range, replacement) in replacements {
        output.push_str(&line[cursor..range.start]);
        output.push_str(&replacement);
        cursor = range.end;
    }
    output.push_str(&line[cursor..]);

    output
}

/// Remove every occurrence, returning the stripped line.
pub fn strip(line: &str, found: &[Occurrence]) -> String {
    splice(
        line,
        found
            .iter()
            .map(|occurrence| (occurrence.range.clone(), String::new()))
            .collect(),
    )
}

pub fn parse_assignment(line: &str) -> Option<(String, String)> {
    let caps = ASSIGNMENT.captures(line)?;
    Some((caps[1].to_string(), caps[2].trim().to_string()))
}

pub fn expand_locals(line: &str, locals: &HashMap<String, String>) -> String {
    if locals.is_empty() {
        return line.to_string();
    }

    LOCAL_GET
        .replace_all(line, |caps: &Captures| match locals.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

pub fn repeat(token: &str, count: &str, max: usize) -> Result<String, DirectiveError> {
    let times: usize = count.parse().map_err(|_| DirectiveError::InvalidCount {
        token: token.to_string(),
        count: count.to_string(),
    })?;

    if times > max {
        return Err(DirectiveError::CountTooLarge { count: times, max });
    }

    Ok(token.repeat(times))
}

/// Expand `$REPEAT token count$`; malformed counts leave the directive untouched.
pub fn expand_repeats(line: &str, max: usize) -> String {
    REPEAT
        .replace_all(line, |caps: &Captures| match repeat(&caps[1], &caps[2], max) {
            Ok(expanded) => expanded,
            Err(e) => {
                debug!("Leaving directive unexpanded: {}", e);
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Split `[delay] trigger`. The first word is a delay in seconds only when
/// it is a non-negative number and a trigger follows it.
pub fn parse_deferred(args: &str) -> DeferredCall {
    let args = args.trim();

    if let Some((first, rest)) = args.split_once(char::is_whitespace) {
        let rest = rest.trim();
        let delay = first
            .parse::<f64>()
            .ok()
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());

        if let (Some(delay), false) = (delay, rest.is_empty()) {
            return DeferredCall {
                delay: Some(delay),
                trigger: rest.to_string(),
            };
        }
    }

    DeferredCall {
        delay: None,
        trigger: args.to_string(),
    }
}

/// Built-in placeholders, applied after every other directive.
pub fn expand_reserved(line: &str, context: &InvocationContext) -> String {
    if !line.contains('%') {
        return line.to_string();
    }

    let cost = format!("{:.2}", context.cost_ms());
    let source_line = context.line.to_string();

    line.replace("%MatchCost%", &cost)
        .replace("%匹配耗时%", &cost)
        .replace("%Line%", &source_line)
        .replace("%当前行%", &source_line)
        .replace("%Sender%", &context.sender_id)
        .replace("%Group%", &context.group_id)
        .replace("%Source%", &context.source_name)
        .replace("%Space%", " ")
}
