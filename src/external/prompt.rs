//! Interactive confirmation

use async_trait::async_trait;
use std::io::{self, BufRead, Write};

/// Suspends until the operator answers; there is no timeout
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ConfirmationPrompt: Send + Sync {
    async fn confirm(&self, message: &str) -> io::Result<bool>;
}

/// Reads the answer from stdin. An empty answer means yes.
pub struct StdinPrompt;

/// `None` for answers that are neither yes nor no
pub fn parse_answer(answer: &str) -> Option<bool> {
    match answer.trim().to_lowercase().as_str() {
        "" | "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

#[async_trait]
impl ConfirmationPrompt for StdinPrompt {
    async fn confirm(&self, message: &str) -> io::Result<bool> {
        let message = message.to_string();
        tokio::task::spawn_blocking(move || -> io::Result<bool> {
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            loop {
                write!(stdout, "{message} (Y/n) ")?;
                stdout.flush()?;

                let mut answer = String::new();
                // EOF: nobody is there to answer
                if stdin.lock().read_line(&mut answer)? == 0 {
                    return Ok(false);
                }
                if let Some(confirmed) = parse_answer(&answer) {
                    return Ok(confirmed);
                }
            }
        })
        .await
        .map_err(io::Error::other)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("\n"), Some(true));
        assert_eq!(parse_answer("Y\n"), Some(true));
        assert_eq!(parse_answer(" yes "), Some(true));
        assert_eq!(parse_answer("n"), Some(false));
        assert_eq!(parse_answer("No\n"), Some(false));
        assert_eq!(parse_answer("maybe"), None);
    }
}
