//! Test Name Pattern Matching
//!
//! Shell-style glob patterns (`*`, `?`, `[seq]`, `[!seq]`) select or exclude
//! tests by their dotted identifier. A pattern matches a test when it matches
//! the whole identifier or any single dotted component of it.

use crate::error::{HarnessError, HarnessResult};
use regex::Regex;
use std::path::Path;
use tracing::debug;

/// A glob compiled to an anchored regular expression
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    regex: Regex,
}

impl CompiledPattern {
    pub fn compile(pattern: &str) -> HarnessResult<Self> {
        let translated = translate_glob(pattern)?;
        let regex = Regex::new(&translated)
            .map_err(|e| HarnessError::config("pattern", format!("'{pattern}' does not compile: {e}")))?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Match against the full identifier or any of its dotted components
    pub fn matches(&self, test_id: &str) -> bool {
        self.regex.is_match(test_id) || test_id.split('.').any(|part| self.regex.is_match(part))
    }
}

/// Translate a shell glob into an anchored regex
fn translate_glob(pattern: &str) -> HarnessResult<String> {
    if pattern.is_empty() {
        return Err(HarnessError::config("pattern", "empty pattern"));
    }

    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                // Collapse runs of '*'
                while i + 1 < chars.len() && chars[i + 1] == '*' {
                    i += 1;
                }
                out.push_str(".*");
            }
            '?' => out.push('.'),
            '[' => {
                let (class, next) = translate_class(&chars, i).ok_or_else(|| {
                    HarnessError::config("pattern", format!("'{pattern}' has an unterminated character class"))
                })?;
                out.push_str(&class);
                i = next;
                continue;
            }
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
        i += 1;
    }

    out.push('$');
    Ok(out)
}

/// Translate `[...]` starting at `start`; returns the regex class and the index after `]`
fn translate_class(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut i = start + 1;
    let mut class = String::from("[");

    if chars.get(i) == Some(&'!') {
        class.push('^');
        i += 1;
    }

    let body_start = i;
    // A ']' right after the opening bracket is a literal member
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() && chars[i] != ']' {
        i += 1;
    }
    if i >= chars.len() {
        return None;
    }

    let body = &chars[body_start..i];
    for (pos, &c) in body.iter().enumerate() {
        let is_range = c == '-' && pos > 0 && pos + 1 < body.len();
        if is_range {
            class.push('-');
        } else {
            class.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
        }
    }

    class.push(']');
    Some((class, i + 1))
}

/// Accept and ignore patterns active for one suite invocation
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    accept: Vec<CompiledPattern>,
    ignore: Vec<CompiledPattern>,
}

impl PatternSet {
    pub fn compile<A: AsRef<str>, I: AsRef<str>>(accept: &[A], ignore: &[I]) -> HarnessResult<Self> {
        let accept = accept
            .iter()
            .map(|p| CompiledPattern::compile(p.as_ref()))
            .collect::<HarnessResult<Vec<_>>>()?;
        let ignore = ignore
            .iter()
            .map(|p| CompiledPattern::compile(p.as_ref()))
            .collect::<HarnessResult<Vec<_>>>()?;

        Ok(Self { accept, ignore })
    }

    pub fn is_empty(&self) -> bool {
        self.accept.is_empty() && self.ignore.is_empty()
    }
}

/// Decides which tests are included in a run
#[derive(Debug, Clone, Default)]
pub struct PatternMatcher {
    active: PatternSet,
}

impl PatternMatcher {
    pub fn new<A: AsRef<str>, I: AsRef<str>>(accept: &[A], ignore: &[I]) -> HarnessResult<Self> {
        Ok(Self {
            active: PatternSet::compile(accept, ignore)?,
        })
    }

    /// Replace the active patterns
    ///
    /// Every pattern is compiled before anything is swapped in, so a
    /// malformed pattern leaves the previous set untouched.
    pub fn configure<A: AsRef<str>, I: AsRef<str>>(&mut self, accept: &[A], ignore: &[I]) -> HarnessResult<()> {
        let compiled = PatternSet::compile(accept, ignore)?;
        debug!(
            "🎯 Test patterns configured: {} accept, {} ignore",
            compiled.accept.len(),
            compiled.ignore.len()
        );
        self.active = compiled;
        Ok(())
    }

    /// Back to default-accept
    pub fn reset(&mut self) {
        self.active = PatternSet::default();
    }

    pub fn matches(&self, test_id: &str) -> bool {
        if self.active.ignore.iter().any(|p| p.matches(test_id)) {
            return false;
        }
        if self.active.accept.is_empty() {
            return true;
        }
        self.active.accept.iter().any(|p| p.matches(test_id))
    }

    pub fn accept_patterns(&self) -> Vec<&str> {
        self.active.accept.iter().map(CompiledPattern::source).collect()
    }

    pub fn ignore_patterns(&self) -> Vec<&str> {
        self.active.ignore.iter().map(CompiledPattern::source).collect()
    }
}

/// Read patterns from a file, one per line; blank lines and `#` comments are skipped
pub fn load_patterns_file<P: AsRef<Path>>(path: P) -> HarnessResult<Vec<String>> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect())
}
