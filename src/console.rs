//! Host I/O seams for the execution engine.
//!
//! The VM never touches stdio directly; everything flows through the
//! [`Console`] trait so tests and embedders can substitute their own sinks
//! and sources.

use std::io::{BufRead, Write};

/// Narrow interface between the VM and the host's I/O.
pub trait Console {
    /// Receives program output (`PRINT`, `PRINT_CHAR`, `PRINT_STR`).
    fn print(&mut self, text: &str);
    /// Supplies one integer for `READ`; `None` means the read failed.
    fn read_int(&mut self) -> Option<i32>;
    /// Receives diagnostic text (`DEBUG` dumps and the instruction trace).
    fn trace(&mut self, text: &str);
}

/// Console backed by the process's stdio: output to stdout, input from
/// stdin, diagnostics to stderr.
#[derive(Debug, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn print(&mut self, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn read_int(&mut self) -> Option<i32> {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).ok()?;
        line.trim().parse::<i32>().ok()
    }

    fn trace(&mut self, text: &str) {
        eprintln!("{text}");
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted console capturing all output for assertions.
    pub struct TestConsole {
        pub output: String,
        pub traces: String,
        pub inputs: VecDeque<i32>,
    }

    impl TestConsole {
        pub fn new() -> Self {
            Self {
                output: String::new(),
                traces: String::new(),
                inputs: VecDeque::new(),
            }
        }

        pub fn with_inputs(inputs: &[i32]) -> Self {
            let mut console = Self::new();
            console.inputs.extend(inputs);
            console
        }
    }

    impl Console for TestConsole {
        fn print(&mut self, text: &str) {
            self.output.push_str(text);
        }

        fn read_int(&mut self) -> Option<i32> {
            self.inputs.pop_front()
        }

        fn trace(&mut self, text: &str) {
            self.traces.push_str(text);
            self.traces.push('\n');
        }
    }

    #[test]
    fn test_console_captures_output() {
        let mut console = TestConsole::new();
        console.print("a");
        console.print("b");
        assert_eq!(console.output, "ab");
    }

    #[test]
    fn test_console_pops_inputs_in_order() {
        let mut console = TestConsole::with_inputs(&[1, 2]);
        assert_eq!(console.read_int(), Some(1));
        assert_eq!(console.read_int(), Some(2));
        assert_eq!(console.read_int(), None);
    }

    #[test]
    fn test_console_separates_traces_from_output() {
        let mut console = TestConsole::new();
        console.print("out");
        console.trace("diag");
        assert_eq!(console.output, "out");
        assert_eq!(console.traces, "diag\n");
    }
}
