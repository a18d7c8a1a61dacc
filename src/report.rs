//! Operator-facing console lines.
//!
//! Components receive a `&dyn Reporter` instead of printing, so tests can
//! capture warnings and errors without capturing process output.

pub trait Reporter {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Info lines on stdout, tagged warnings and errors on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn info(&self, message: &str) {
        println!("{message}");
    }

    fn warn(&self, message: &str) {
        eprintln!("[WARN] {message}");
    }

    fn error(&self, message: &str) {
        eprintln!("[ERROR] {message}");
    }
}

#[cfg(test)]
pub use memory::MemoryReporter;

#[cfg(test)]
mod memory {
    use std::cell::RefCell;

    use super::Reporter;

    #[derive(Debug, Default)]
    pub struct MemoryReporter {
        lines: RefCell<Vec<(&'static str, String)>>,
    }

    impl MemoryReporter {
        pub fn lines(&self, severity: &str) -> Vec<String> {
            self.lines
                .borrow()
                .iter()
                .filter(|(tag, _)| *tag == severity)
                .map(|(_, line)| line.clone())
                .collect()
        }

        pub fn infos(&self) -> Vec<String> {
            self.lines("info")
        }

        pub fn warnings(&self) -> Vec<String> {
            self.lines("warn")
        }

        pub fn errors(&self) -> Vec<String> {
            self.lines("error")
        }
    }

    impl Reporter for MemoryReporter {
        fn info(&self, message: &str) {
            self.lines.borrow_mut().push(("info", message.to_string()));
        }

        fn warn(&self, message: &str) {
            self.lines.borrow_mut().push(("warn", message.to_string()));
        }

        fn error(&self, message: &str) {
            self.lines.borrow_mut().push(("error", message.to_string()));
        }
    }
}
