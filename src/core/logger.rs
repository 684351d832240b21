//! Leveled output used by the engine.
//!
//! The engine never prints on its own; it talks to a [`Logger`] handed in by whoever
//! constructs it. [`ConsoleLogger`] is what the binary uses.

use {
    crossterm::style::Stylize,
    std::sync::Arc,
};

/// Leveled output sink.
pub trait Logger: Send + Sync {
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);
    fn ok(&self, msg: &str);
    fn debug(&self, msg: &str);
    /// Plain output without any level decoration.
    fn print(&self, msg: &str);
}

/// Terminal logger with optional colours.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleLogger {
    color: bool,
}

impl ConsoleLogger {
    pub fn new(color: bool) -> Self {
        Self { color }
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Logger for ConsoleLogger {
    fn info(&self, msg: &str) {
        if self.color { println!("{}", msg.cyan()) } else { println!("{}", msg) }
    }

    fn warn(&self, msg: &str) {
        if self.color { println!("{}", msg.yellow()) } else { println!("WARN: {}", msg) }
    }

    fn error(&self, msg: &str) {
        let line = format!("ERROR: {}", msg);
        if self.color { eprintln!("{}", line.red()) } else { eprintln!("{}", line) }
    }

    fn ok(&self, msg: &str) {
        if self.color { println!("{}", msg.green()) } else { println!("{}", msg) }
    }

    fn debug(&self, msg: &str) {
        let line = format!("DBG: {}", msg);
        if self.color { println!("{}", line.magenta()) } else { println!("{}", line) }
    }

    fn print(&self, msg: &str) {
        println!("{}", msg);
    }
}

/// Cheap handle the engine components share: the logger plus the verbose switch.
#[derive(Clone)]
pub struct Log {
    inner: Arc<dyn Logger>,
    verbose: bool,
}

impl Log {
    pub fn new(inner: Arc<dyn Logger>, verbose: bool) -> Self {
        Self { inner, verbose }
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.inner.info(msg.as_ref());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.inner.warn(msg.as_ref());
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        self.inner.error(msg.as_ref());
    }

    pub fn ok(&self, msg: impl AsRef<str>) {
        self.inner.ok(msg.as_ref());
    }

    pub fn print(&self, msg: impl AsRef<str>) {
        self.inner.print(msg.as_ref());
    }

    /// Diagnostic line, only emitted in verbose mode.
    pub fn dbg(&self, label: &str, msg: impl AsRef<str>) {
        if self.verbose {
            self.inner.debug(&format!("[{}] {}", label, msg.as_ref()));
        }
    }
}
