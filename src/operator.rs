//! Talking to the human at the keyboard.

use std::future::Future;
use std::io;

use dialoguer::Confirm;
use dialoguer::console::Term;

use crate::config::ConfirmationStyle;
use crate::errors::Error;
use crate::runtime;

type Result<T> = std::result::Result<T, Error>;

/// Console output and blocking confirmations.
///
/// Prompts have no timeout: the workflow waits as long as the operator needs
/// to walk over to the bridge.
pub trait Operator: Send {
    fn print(&mut self, lines: &[&str]);

    /// Ask a yes/no question.
    fn confirm(&mut self, prompt: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Block until any key is pressed.
    fn wait_for_key(&mut self, prompt: &str) -> impl Future<Output = Result<()>> + Send;
}

/// [`Operator`] on the process terminal.
#[derive(Debug, Clone)]
pub struct ConsoleOperator {
    style: ConfirmationStyle,
}

impl ConsoleOperator {
    pub fn new(style: ConfirmationStyle) -> Self {
        ConsoleOperator { style }
    }
}

impl Operator for ConsoleOperator {
    fn print(&mut self, lines: &[&str]) {
        for line in lines {
            println!("{line}");
        }
    }

    async fn confirm(&mut self, prompt: &str) -> Result<bool> {
        if self.style == ConfirmationStyle::AnyKey {
            self.wait_for_key(&format!("{prompt} (press any key)")).await?;
            return Ok(true);
        }

        let prompt = prompt.to_string();
        let answer = runtime::blocking(move || {
            Confirm::new()
                .with_prompt(prompt)
                .default(true)
                .interact()
                .map_err(|e| io::Error::other(e.to_string()))
        })
        .await??;
        Ok(answer)
    }

    async fn wait_for_key(&mut self, prompt: &str) -> Result<()> {
        let prompt = prompt.to_string();
        runtime::blocking(move || {
            let term = Term::stdout();
            term.write_line(&prompt)?;
            term.read_key().map(|_| ())
        })
        .await??;
        Ok(())
    }
}
