// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Symbolic name lookup for the handful of signals this system cares about.
//!
//! Deliberately not exhaustive: only the signals a service is realistically
//! killed by show up in status records, and anything unrecognized is shown
//! as a bare number rather than pulled in via a full libc signal table.

/// Map a signal number to its symbolic name (`"SIGTERM"`, `"SIGKILL"`, ...).
///
/// Returns `None` for numbers this table doesn't know about.
pub fn signal_name(sig_num: i32) -> Option<&'static str> {
    let name = match sig_num {
        1 => "SIGHUP",
        2 => "SIGINT",
        3 => "SIGQUIT",
        4 => "SIGILL",
        5 => "SIGTRAP",
        6 => "SIGABRT",
        7 => "SIGBUS",
        8 => "SIGFPE",
        9 => "SIGKILL",
        10 => "SIGUSR1",
        11 => "SIGSEGV",
        12 => "SIGUSR2",
        13 => "SIGPIPE",
        14 => "SIGALRM",
        15 => "SIGTERM",
        16 => "SIGSTKFLT",
        17 => "SIGCHLD",
        18 => "SIGCONT",
        19 => "SIGSTOP",
        20 => "SIGTSTP",
        21 => "SIGTTIN",
        22 => "SIGTTOU",
        23 => "SIGURG",
        24 => "SIGXCPU",
        25 => "SIGXFSZ",
        26 => "SIGVTALRM",
        27 => "SIGPROF",
        28 => "SIGWINCH",
        29 => "SIGIO",
        30 => "SIGPWR",
        31 => "SIGSYS",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        hup  = { 1,  "SIGHUP" },
        int  = { 2,  "SIGINT" },
        kill = { 9,  "SIGKILL" },
        segv = { 11, "SIGSEGV" },
        term = { 15, "SIGTERM" },
    )]
    fn knows_common_signals(sig_num: i32, expected: &str) {
        assert_eq!(signal_name(sig_num), Some(expected));
    }

    #[test]
    fn unknown_number_is_none() {
        assert_eq!(signal_name(255), None);
        assert_eq!(signal_name(0), None);
    }
}
