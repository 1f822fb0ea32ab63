//! Subprocess execution primitives.
//!
//! Every external tool the agent drives (the control-channel client, the
//! network configuration tool) goes through one invocation primitive,
//! `ProcessRunner`. The `ProcessQueue` sequences invocations in FIFO
//! order with per-command tolerated exit codes: many configuration
//! operations are idempotent-but-noisy and exit non-zero when the target
//! state already exists.

use std::collections::VecDeque;
use std::process::{Command, Stdio};

use guestlink_core::{AgentError, Result};
use tracing::{debug, warn};

/// Captured outcome of one tool invocation.
///
/// The exit code is carried as the literal textual code ("0", "1", ...)
/// because tolerance sets are declared and compared as strings.
#[derive(Debug, Clone)]
pub struct ExecutableResult {
    pub exit_code: String,
    /// Output lines, stdout first, then stderr.
    pub output: Vec<String>,
}

/// The single subprocess-invocation primitive.
pub trait ProcessRunner {
    /// Run `tool` with the given argument string and capture the result.
    fn run(&mut self, tool: &str, args: &str) -> Result<ExecutableResult>;
}

/// Real runner spawning the tool as a child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl ProcessRunner for ShellRunner {
    fn run(&mut self, tool: &str, args: &str) -> Result<ExecutableResult> {
        debug!(%tool, %args, "running external tool");
        let output = Command::new(tool)
            .args(split_arguments(args))
            .stdin(Stdio::null())
            .output()?;

        let exit_code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-1".to_string());

        let mut lines: Vec<String> = Vec::new();
        for stream in [&output.stdout, &output.stderr] {
            lines.extend(
                String::from_utf8_lossy(stream)
                    .lines()
                    .map(str::to_string),
            );
        }

        Ok(ExecutableResult {
            exit_code,
            output: lines,
        })
    }
}

/// Split an argument string into argv tokens.
///
/// Double quotes group words (`name="Local Area Connection"` becomes one
/// token with the quotes stripped) and `\"` inside a token is a literal
/// quote character.
pub fn split_arguments(args: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut started = false;
    let mut chars = args.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
                started = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                started = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }
    if started {
        tokens.push(current);
    }
    tokens
}

/// One queued invocation.
#[derive(Debug, Clone)]
struct QueuedCommand {
    tool: String,
    args: String,
    tolerated: Vec<String>,
}

/// FIFO queue of tool invocations with per-command tolerated exit codes.
///
/// Nothing runs until `go()`; on an intolerable exit code execution stops
/// and the remaining entries are abandoned. The queue is empty after any
/// `go()`, success or failure.
pub struct ProcessQueue<R: ProcessRunner> {
    runner: R,
    entries: VecDeque<QueuedCommand>,
}

impl<R: ProcessRunner> ProcessQueue<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            entries: VecDeque::new(),
        }
    }

    /// Append an entry tolerating only exit code "0".
    pub fn enqueue(&mut self, tool: &str, args: &str) {
        self.enqueue_tolerating(tool, args, &["0"]);
    }

    /// Append an entry with an explicit tolerated exit-code set.
    pub fn enqueue_tolerating(&mut self, tool: &str, args: &str, tolerated: &[&str]) {
        self.entries.push_back(QueuedCommand {
            tool: tool.to_string(),
            args: args.to_string(),
            tolerated: tolerated.iter().map(|c| c.to_string()).collect(),
        });
    }

    /// Execute every queued entry in FIFO order.
    ///
    /// Already-executed entries are not rolled back on failure; the
    /// caller may enqueue and flush again.
    pub fn go(&mut self) -> Result<()> {
        let entries = std::mem::take(&mut self.entries);
        for entry in entries {
            let result = self.runner.run(&entry.tool, &entry.args)?;
            if !entry.tolerated.iter().any(|code| *code == result.exit_code) {
                warn!(
                    tool = %entry.tool,
                    args = %entry.args,
                    exit_code = %result.exit_code,
                    "command exited outside its tolerated set"
                );
                return Err(AgentError::CommandFailed {
                    tool: entry.tool,
                    args: entry.args,
                    exit_code: result.exit_code,
                    output: result.output,
                });
            }
        }
        Ok(())
    }

    /// Number of entries awaiting execution.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Runner that records invocations and returns scripted exit codes.
    struct ScriptedRunner {
        calls: Rc<RefCell<Vec<String>>>,
        /// (args substring, exit code) rules; first match wins.
        rules: Vec<(String, String)>,
    }

    impl ScriptedRunner {
        fn new(calls: Rc<RefCell<Vec<String>>>) -> Self {
            Self {
                calls,
                rules: Vec::new(),
            }
        }

        fn failing_on(mut self, pattern: &str, exit_code: &str) -> Self {
            self.rules.push((pattern.to_string(), exit_code.to_string()));
            self
        }
    }

    impl ProcessRunner for ScriptedRunner {
        fn run(&mut self, _tool: &str, args: &str) -> Result<ExecutableResult> {
            self.calls.borrow_mut().push(args.to_string());
            let exit_code = self
                .rules
                .iter()
                .find(|(pattern, _)| args.contains(pattern.as_str()))
                .map(|(_, code)| code.clone())
                .unwrap_or_else(|| "0".to_string());
            Ok(ExecutableResult {
                exit_code,
                output: vec![],
            })
        }
    }

    #[test]
    fn test_split_arguments_plain() {
        assert_eq!(
            split_arguments("interface ip set address"),
            vec!["interface", "ip", "set", "address"]
        );
    }

    #[test]
    fn test_split_arguments_quoted() {
        assert_eq!(
            split_arguments("set interface name=\"Local Area Connection\" admin=ENABLED"),
            vec!["set", "interface", "name=Local Area Connection", "admin=ENABLED"]
        );
    }

    #[test]
    fn test_split_arguments_escaped_quote() {
        assert_eq!(
            split_arguments(r#"write data/guest/k "say \"hi\"""#),
            vec!["write", "data/guest/k", "say \"hi\""]
        );
    }

    #[test]
    fn test_split_arguments_empty() {
        assert!(split_arguments("").is_empty());
        assert!(split_arguments("   ").is_empty());
    }

    #[test]
    fn test_go_runs_in_fifo_order() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut queue = ProcessQueue::new(ScriptedRunner::new(calls.clone()));
        queue.enqueue("netsh", "first");
        queue.enqueue("netsh", "second");
        queue.enqueue("netsh", "third");
        queue.go().unwrap();
        assert_eq!(*calls.borrow(), vec!["first", "second", "third"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_go_tolerates_declared_exit_codes() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let runner = ScriptedRunner::new(calls.clone()).failing_on("already", "1");
        let mut queue = ProcessQueue::new(runner);
        queue.enqueue_tolerating("netsh", "already set", &["0", "1"]);
        queue.enqueue("netsh", "next");
        queue.go().unwrap();
        assert_eq!(calls.borrow().len(), 2);
    }

    #[test]
    fn test_go_fails_fast_and_abandons_remaining() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let runner = ScriptedRunner::new(calls.clone()).failing_on("bad", "1");
        let mut queue = ProcessQueue::new(runner);
        queue.enqueue("netsh", "good");
        queue.enqueue("netsh", "bad");
        queue.enqueue("netsh", "never-run");
        let err = queue.go().unwrap_err();
        match err {
            AgentError::CommandFailed {
                tool,
                args,
                exit_code,
                ..
            } => {
                assert_eq!(tool, "netsh");
                assert_eq!(args, "bad");
                assert_eq!(exit_code, "1");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*calls.borrow(), vec!["good", "bad"]);
        // abandoned entries are dropped, not retained for replay
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_empty_after_successful_go() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut queue = ProcessQueue::new(ScriptedRunner::new(calls));
        queue.enqueue("netsh", "one");
        assert_eq!(queue.len(), 1);
        queue.go().unwrap();
        assert!(queue.is_empty());
        // a second go() on an empty queue is a no-op
        queue.go().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_runner_captures_output_and_exit_code() {
        let mut runner = ShellRunner;
        let result = runner.run("echo", "hello world").unwrap();
        assert_eq!(result.exit_code, "0");
        assert_eq!(result.output, vec!["hello world"]);

        let result = runner.run("sh", "-c \"exit 3\"").unwrap();
        assert_eq!(result.exit_code, "3");
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_runner_missing_tool_is_an_error() {
        let mut runner = ShellRunner;
        assert!(runner.run("/nonexistent/tool-xyz", "").is_err());
    }
}
