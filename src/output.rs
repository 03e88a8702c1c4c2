//! User-facing console lines.
//!
//! Prefixed, colored when the target stream is a TTY. Primary results
//! (the run summary) go through `print_user` without a prefix so scripts can
//! parse them.

use owo_colors::OwoColorize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Info,
    Warn,
    Error,
    Success,
}

impl Tone {
    fn label(self) -> &'static str {
        match self {
            Tone::Info => "info:",
            Tone::Warn => "warn:",
            Tone::Error => "error:",
            Tone::Success => "ok:",
        }
    }

    fn to_stderr(self) -> bool {
        matches!(self, Tone::Warn | Tone::Error)
    }
}

fn render(tone: Tone, msg: &str, color: bool) -> String {
    if !color {
        return format!("{} {msg}", tone.label());
    }
    let label = tone.label();
    let styled = match tone {
        Tone::Info => label.cyan().bold().to_string(),
        Tone::Warn => label.yellow().bold().to_string(),
        Tone::Error => label.red().bold().to_string(),
        Tone::Success => label.green().bold().to_string(),
    };
    format!("{styled} {msg}")
}

fn emit(tone: Tone, msg: &str) {
    if tone.to_stderr() {
        eprintln!("{}", render(tone, msg, atty::is(atty::Stream::Stderr)));
    } else {
        println!("{}", render(tone, msg, atty::is(atty::Stream::Stdout)));
    }
}

pub fn print_info(msg: &str) {
    emit(Tone::Info, msg);
}

pub fn print_warn(msg: &str) {
    emit(Tone::Warn, msg);
}

pub fn print_error(msg: &str) {
    emit(Tone::Error, msg);
}

pub fn print_success(msg: &str) {
    emit(Tone::Success, msg);
}

pub fn print_user(msg: &str) {
    println!("{msg}");
}
