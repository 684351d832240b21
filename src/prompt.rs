use {pqmigrate::core::logger::Log, std::io::BufRead};

pub(crate) const CONFIRM_YES: &str = "y";
/// Answer required before destructive operations such as dropping a database.
pub(crate) const CONFIRM_PAINFUL: &str = "yes-i-am-really-really-sure";

const LINE_BREAKS: [&str; 8] = ["\r\n", "\r", "\n", "\u{000B}", "\u{000C}", "\u{0085}", "\u{2028}", "\u{2029}"];

pub(crate) fn strip_line_breaks(text: &str) -> String {
    LINE_BREAKS
        .iter()
        .fold(text.to_string(), |acc, line_break| acc.replace(line_break, ""))
}

/// Simple answers are case-insensitive, painful ones must match exactly.
pub(crate) fn answer_matches(answer: &str, expected: &str, simple: bool) -> bool {
    let answer = strip_line_breaks(answer);
    if simple {
        answer.to_lowercase() == expected
    } else {
        answer == expected
    }
}

/// A confirmation callback that asks on stdin. End of input counts as "no".
pub(crate) fn stdin_confirm(log: Log, expected: &'static str, simple: bool) -> impl FnMut(&str) -> bool {
    move |question: &str| {
        let hint = if simple { CONFIRM_YES } else { expected };
        log.warn(format!("{}: [{}/N] ", question, hint));
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            | Ok(0) | Err(_) => false,
            | Ok(_) => answer_matches(&line, expected, simple),
        }
    }
}
