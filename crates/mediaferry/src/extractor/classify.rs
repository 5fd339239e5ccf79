// Copyright 2026 Mediaferry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Failure classification by error-output signature.

use std::sync::OnceLock;

use regex::RegexSet;

use crate::error::{ErrorClass, ExtractionError};

/// Authorization, permission, and input-validity signatures. A different
/// client identity will not fix these.
const NON_RETRYABLE_SIGNATURES: &[&str] = &[
    r"(?i)unsupported url",
    r"(?i)is not a valid url",
    r"(?i)invalid url",
    r"(?i)private video",
    r"(?i)members[- ]only",
    r"(?i)join this channel",
    r"(?i)this video has been removed",
    r"(?i)account associated with this video has been terminated",
    r"(?i)copyright (claim|grounds)",
    r"(?i)http error 401",
    r"(?i)http error 404",
    r"(?i)no such file or directory",
    r"(?i)permission denied",
];

/// Network, rate-limit, rejected-request and missing-format signatures.
/// These may succeed under another strategy.
const TRANSIENT_SIGNATURES: &[&str] = &[
    r"(?i)timed? ?out",
    r"(?i)connection (reset|refused|aborted)",
    r"(?i)temporary failure in name resolution",
    r"(?i)http error 403",
    r"(?i)http error 429",
    r"(?i)too many requests",
    r"(?i)http error 5\d\d",
    r"(?i)sign in to confirm",
    r"(?i)not a bot",
    r"(?i)requested format is not available",
    r"(?i)no video formats found",
    r"(?i)unable to extract",
    r"(?i)nsig extraction failed",
    r"(?i)failed to parse json",
    r"(?i)incomplete (data|youtube id)",
];

fn non_retryable_set() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new(NON_RETRYABLE_SIGNATURES).unwrap_or_else(|_| RegexSet::empty())
    })
}

fn transient_set() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| RegexSet::new(TRANSIENT_SIGNATURES).unwrap_or_else(|_| RegexSet::empty()))
}

/// Classify raw error output from a failed attempt.
///
/// Non-retryable signatures win over transient ones when both appear.
/// Unrecognized output is treated as transient: another identity might
/// still get through.
pub fn classify_output(output: &str) -> ErrorClass {
    if non_retryable_set().is_match(output) {
        return ErrorClass::NonRetryable;
    }
    if !transient_set().is_match(output) {
        tracing::debug!("unrecognized extractor failure output, treating as transient");
    }
    ErrorClass::Transient
}

/// Build a classified error from the tool's stderr.
pub fn classify_failure(stderr: &str, exit_code: Option<i32>) -> ExtractionError {
    let message = summarize(stderr)
        .unwrap_or_else(|| match exit_code {
            Some(code) => format!("extractor exited with status {code}"),
            None => "extractor terminated by signal".to_string(),
        });
    ExtractionError {
        class: classify_output(stderr),
        message,
    }
}

/// The last `ERROR:` line is the most specific one; otherwise the last
/// non-empty line.
fn summarize(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|l| l.to_string())
}
