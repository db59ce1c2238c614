// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Secret redaction for log output.
//!
//! Every line the logger emits passes through [`redact_secrets`] before it
//! reaches a sink. Only log text is redacted; values stored in correlation
//! records are kept as captured.
//!
//! Patterns are matched against the line with ANSI escapes removed, since a
//! coloured formatter puts escapes between a field name and its `=`. Lines
//! that need masking are written without colour.

use std::borrow::Cow;
use std::io::{self, Write};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing_subscriber::fmt::MakeWriter;

/// Replacement marker for masked values.
pub const REDACTED: &str = "<REDACTED>";

/// SGR colour sequences emitted by the formatter.
static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("ansi pattern must compile"));

/// Credential patterns paired with their replacement template.
static SECRET_PATTERNS: Lazy<Vec<(Regex, String)>> = Lazy::new(|| {
    let patterns: [(&str, String); 4] = [
        // key=value / key: "value" style assignments. Names like `task_key`
        // are not credentials; `api_key` and `access_token` are.
        (
            r#"(?i)\b([a-z0-9_]*(?:token|auth|password|passwd|secret|credential|bearer)|(?:api|access|secret|private)[_-]?key|key)['"]?\s*[:=]\s*['"]?([^\s'"]+)"#,
            format!("${{1}}={REDACTED}"),
        ),
        // GitHub personal access and OAuth tokens
        (r"gh[po]_[A-Za-z0-9]{36}", REDACTED.to_string()),
        // Authorization header values
        (r"(?i)(bearer|basic)\s+[A-Za-z0-9._~+/=-]+", format!("${{1}} {REDACTED}")),
        // -Dsonar.login=... style scanner arguments that slip past the first rule
        (r"(?i)(sonar\.login)\s*=\s*\S+", format!("${{1}}={REDACTED}")),
    ];

    patterns
        .into_iter()
        .map(|(pattern, replacement)| {
            (Regex::new(pattern).expect("secret pattern must compile"), replacement)
        })
        .collect()
});

/// Mask credential-shaped substrings in `text`.
///
/// Returns the input unchanged (borrowed), colours included, when nothing
/// matched.
pub fn redact_secrets(text: &str) -> Cow<'_, str> {
    let plain = ANSI_ESCAPE.replace_all(text, "");
    match redact_plain(&plain) {
        Cow::Borrowed(_) => Cow::Borrowed(text),
        Cow::Owned(redacted) => Cow::Owned(redacted),
    }
}

fn redact_plain(text: &str) -> Cow<'_, str> {
    let mut current: Cow<'_, str> = Cow::Borrowed(text);
    for (pattern, replacement) in SECRET_PATTERNS.iter() {
        if pattern.is_match(&current) {
            let replaced = pattern.replace_all(&current, replacement.as_str()).into_owned();
            current = Cow::Owned(replaced);
        }
    }
    current
}

/// A writer that redacts each formatted log record before forwarding it.
pub struct RedactingWriter<W: Write> {
    inner: W,
}

impl<W: Write> RedactingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        self.inner.write_all(redact_secrets(&text).as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// [`MakeWriter`] adapter that wraps every writer in a [`RedactingWriter`].
#[derive(Debug, Clone)]
pub struct RedactingMakeWriter<M> {
    inner: M,
}

impl<M> RedactingMakeWriter<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<'a, M> MakeWriter<'a> for RedactingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new(self.inner.make_writer())
    }
}
