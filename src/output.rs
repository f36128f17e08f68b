//! Terminal formatting: ANSI color gating and the `cprintln!`/`ceprintln!`
//! macros used by every CLI subcommand. Grounded on the teacher's
//! `view/fmt.rs`, trimmed to the pieces that don't depend on MCP event
//! shapes (pricing tables, diff coloring, arg truncation for tool calls).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

static FORCE_NO_COLOR: AtomicBool = AtomicBool::new(false);
static COLOR: OnceLock<bool> = OnceLock::new();

pub fn disable_color() {
    FORCE_NO_COLOR.store(true, Ordering::Relaxed);
}

pub fn use_color() -> bool {
    if FORCE_NO_COLOR.load(Ordering::Relaxed) {
        return false;
    }
    *COLOR.get_or_init(|| std::env::var("NO_COLOR").is_err() && atty::is(atty::Stream::Stdout))
}

pub fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_esc = false;
    for ch in s.chars() {
        if in_esc {
            if ch == 'm' {
                in_esc = false;
            }
        } else if ch == '\x1b' {
            in_esc = true;
        } else {
            out.push(ch);
        }
    }
    out
}

macro_rules! cprintln {
    () => { println!() };
    ($($arg:tt)*) => {{
        let s = format!($($arg)*);
        if $crate::output::use_color() {
            println!("{s}");
        } else {
            println!("{}", $crate::output::strip_ansi(&s));
        }
    }};
}
pub(crate) use cprintln;

macro_rules! ceprintln {
    () => { eprintln!() };
    ($($arg:tt)*) => {{
        let s = format!($($arg)*);
        if $crate::output::use_color() {
            eprintln!("{s}");
        } else {
            eprintln!("{}", $crate::output::strip_ansi(&s));
        }
    }};
}
pub(crate) use ceprintln;

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const CYAN: &str = "\x1b[36m";
pub const GREEN: &str = "\x1b[32m";
pub const RED: &str = "\x1b[31m";
pub const YELLOW: &str = "\x1b[33m";
pub const BRIGHT_RED: &str = "\x1b[91m";

pub fn short_path(full: &str) -> String {
    full.rsplit('/').next().unwrap_or(full).to_string()
}

pub fn trunc(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let end = s
            .char_indices()
            .nth(max.saturating_sub(1))
            .map(|(i, _)| i)
            .unwrap_or(max.saturating_sub(1));
        format!("{}…", &s[..end])
    }
}

pub fn format_size(size: u64) -> String {
    if size >= 1_048_576 {
        format!("{:.1}MB", size as f64 / 1_048_576.0)
    } else if size >= 1024 {
        format!("{}KB", size / 1024)
    } else {
        format!("{size}B")
    }
}
