//! Confirmation gate for large inputs.

use std::io::{self, BufRead, IsTerminal, Write};

/// Answer from a confirmation provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Proceed.
    Yes,
    /// Do not proceed.
    No,
    /// Nobody could be asked.
    Unavailable,
}

/// Asks whether to go ahead with a large call.
pub trait Confirm: Send + Sync {
    /// Presents `question` and returns the answer.
    fn confirm(&self, question: &str) -> Confirmation;
}

/// Always says yes. For trusted batch jobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAllow;

impl Confirm for AlwaysAllow {
    fn confirm(&self, _question: &str) -> Confirmation {
        Confirmation::Yes
    }
}

/// Always says no.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysDeny;

impl Confirm for AlwaysDeny {
    fn confirm(&self, _question: &str) -> Confirmation {
        Confirmation::No
    }
}

/// Prompts on stderr and reads one line from stdin.
///
/// Reports [`Confirmation::Unavailable`] when stdin is not a terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleConfirm;

impl Confirm for ConsoleConfirm {
    fn confirm(&self, question: &str) -> Confirmation {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return Confirmation::Unavailable;
        }

        let mut stderr = io::stderr();
        if write!(stderr, "{question} [y/N] ").and_then(|()| stderr.flush()).is_err() {
            return Confirmation::Unavailable;
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => Confirmation::Unavailable,
            Ok(_) => parse_answer(&line),
        }
    }
}

/// `y`/`yes` in any case is yes; anything else is no.
#[must_use]
pub fn parse_answer(line: &str) -> Confirmation {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Confirmation::Yes,
        _ => Confirmation::No,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("y\n"), Confirmation::Yes);
        assert_eq!(parse_answer(" YES "), Confirmation::Yes);
        assert_eq!(parse_answer("\n"), Confirmation::No);
        assert_eq!(parse_answer("nope"), Confirmation::No);
    }

    #[test]
    fn test_fixed_policies() {
        assert_eq!(AlwaysAllow.confirm("go?"), Confirmation::Yes);
        assert_eq!(AlwaysDeny.confirm("go?"), Confirmation::No);
    }
}
