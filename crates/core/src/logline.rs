// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The record shape published on the event bus and written by the log
//! writer: one line of output, tagged with which stream it came from and
//! how its line terminator looked.

use serde::{Deserialize, Serialize};

/// Which child stream (or pseudo-stream) a [`LogLine`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamTag {
    /// Child stdout.
    Out,
    /// Child stderr.
    Err,
    /// Supervisor-generated lifecycle event (start/stop/exit).
    Evt,
    /// Text written to the child's stdin via the `stdin` RPC.
    Inp,
}

impl StreamTag {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamTag::Out => "out",
            StreamTag::Err => "err",
            StreamTag::Evt => "evt",
            StreamTag::Inp => "inp",
        }
    }
}

/// How a line's terminator looked when it was pulled out of the read buffer.
///
/// Mirrors the three cases a byte-stream line splitter has to distinguish:
/// a real newline, a bare carriage return (old Mac / progress-bar style
/// output), or a line that ran past the max length or hit end-of-stream
/// without ever seeing a terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineClass {
    /// Terminated by `\n` (an immediately preceding `\r` is stripped too).
    #[serde(rename = "n")]
    Newline,
    /// Terminated by a bare `\r` not followed by `\n`.
    #[serde(rename = "r")]
    CarriageReturn,
    /// Cut off at the max line length, or flushed at stream close, without
    /// seeing a terminator. The next bytes read continue this same line.
    #[serde(rename = "c")]
    Continued,
}

impl LineClass {
    pub fn code(self) -> char {
        match self {
            LineClass::Newline => 'n',
            LineClass::CarriageReturn => 'r',
            LineClass::Continued => 'c',
        }
    }
}

/// One line of output (or input echo, or lifecycle event), as published on
/// the bus and appended to a log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// ISO-8601 UTC timestamp, e.g. `2026-01-30T08:14:09.123456Z`.
    pub timestamp: String,
    /// Name of the service (or `"pyraptord"`/`"raptord"`-equivalent daemon
    /// logger) this line belongs to.
    pub logger_name: String,
    pub stream: StreamTag,
    pub class: LineClass,
    pub text: String,
}

impl LogLine {
    pub fn new(
        timestamp: impl Into<String>,
        logger_name: impl Into<String>,
        stream: StreamTag,
        class: LineClass,
        text: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            logger_name: logger_name.into(),
            stream,
            class,
            text: text.into(),
        }
    }

    /// Render the way it's written to the log file:
    /// `<timestamp> <logger_name> <class> <text>`.
    pub fn to_log_format(&self) -> String {
        format!(
            "{} {} {} {}",
            self.timestamp,
            self.logger_name,
            self.class.code(),
            self.text
        )
    }

    /// The topic this line publishes under, `"<logger_name>.<stream>"`.
    pub fn topic(&self) -> String {
        format!("{}.{}", self.logger_name, self.stream.as_str())
    }
}
