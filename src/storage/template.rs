//! Segment templates for mountpoint roots.
//!
//! A mountpoint declares its physical root as a template string such as
//! `{vfs}/{username}`. Templates are tokenized once at parse time; tokens
//! are either static (process-wide: `{root}`, `{vfs}`) or dynamic
//! (per-request: `{username}`). Unknown tokens resolve to empty strings.

use regex::Regex;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Literal(String),
    Segment(String),
}

/// Per-request values a template resolves against.
pub struct SegmentContext<'a> {
    /// Process working directory, the `{root}` token.
    pub root: &'a Path,
    /// Configured VFS storage root, the `{vfs}` token.
    pub vfs_root: &'a Path,
    /// Requesting user, the `{username}` token.
    pub username: &'a str,
}

fn is_dynamic(name: &str) -> bool {
    name == "username"
}

#[derive(Clone, Debug)]
pub struct Template {
    tokens: Vec<Token>,
}

impl Template {
    pub fn parse(raw: &str) -> Self {
        let mut tokens = Vec::new();
        let mut rest = raw;

        while let Some(open) = rest.find('{') {
            if let Some(close) = rest[open..].find('}') {
                if open > 0 {
                    tokens.push(Token::Literal(rest[..open].to_string()));
                }
                tokens.push(Token::Segment(rest[open + 1..open + close].to_string()));
                rest = &rest[open + close + 1..];
            } else {
                break;
            }
        }
        if !rest.is_empty() {
            tokens.push(Token::Literal(rest.to_string()));
        }

        Self { tokens }
    }

    fn segment_value(ctx: &SegmentContext<'_>, name: &str) -> String {
        match name {
            "root" => ctx.root.to_string_lossy().into_owned(),
            "vfs" => ctx.vfs_root.to_string_lossy().into_owned(),
            "username" => ctx.username.to_string(),
            _ => String::new(),
        }
    }

    /// Resolves the template into a physical path prefix.
    pub fn resolve(&self, ctx: &SegmentContext<'_>) -> PathBuf {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(s) => out.push_str(s),
                Token::Segment(name) => out.push_str(&Self::segment_value(ctx, name)),
            }
        }
        PathBuf::from(out)
    }

    /// Names of the dynamic tokens, in template order.
    pub fn dynamic_segments(&self) -> Vec<&str> {
        self.tokens
            .iter()
            .filter_map(|t| match t {
                Token::Segment(name) if is_dynamic(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The static part of the resolved root, up to the first dynamic
    /// token. This is the directory a native watcher is attached to.
    pub fn static_prefix(&self, ctx: &SegmentContext<'_>) -> PathBuf {
        if self.dynamic_segments().is_empty() {
            return self.resolve(ctx);
        }

        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(s) => out.push_str(s),
                Token::Segment(name) => {
                    if is_dynamic(name) {
                        break;
                    }
                    out.push_str(&Self::segment_value(ctx, name));
                }
            }
        }
        // Trim back to the last complete path component
        if !out.ends_with('/') {
            if let Some(idx) = out.rfind('/') {
                out.truncate(idx + 1);
            }
        }
        let trimmed = out.trim_end_matches('/');
        if trimmed.is_empty() {
            PathBuf::from("/")
        } else {
            PathBuf::from(trimmed)
        }
    }

    /// Builds a regex matching changed absolute paths under this root.
    /// Dynamic tokens become capture groups, and a final group captures
    /// the path relative to the fully-resolved root.
    pub fn watch_regex(&self, ctx: &SegmentContext<'_>) -> Result<Regex, regex::Error> {
        let mut pattern = String::from("^");
        for token in &self.tokens {
            match token {
                Token::Literal(s) => pattern.push_str(&regex::escape(s)),
                Token::Segment(name) => {
                    if is_dynamic(name) {
                        pattern.push_str("([^/]*)");
                    } else {
                        pattern.push_str(&regex::escape(&Self::segment_value(ctx, name)));
                    }
                }
            }
        }
        pattern.push_str("/(.*)$");
        Regex::new(&pattern)
    }
}
