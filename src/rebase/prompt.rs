use crate::errors::Result;
use crate::rebase::collaborators::Prompter;
use dialoguer::{theme::ColorfulTheme, Confirm};

/// Asks on the terminal
#[derive(Debug, Default)]
pub struct DialoguerPrompter;

impl Prompter for DialoguerPrompter {
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
        let answer = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(question)
            .default(default)
            .interact()?;
        Ok(answer)
    }
}

/// Gives the same answer to every question and remembers what was asked
#[derive(Debug, Clone)]
pub struct FixedAnswer {
    answer: bool,
    asked: Vec<String>,
}

impl FixedAnswer {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: Vec::new(),
        }
    }

    pub fn questions(&self) -> &[String] {
        &self.asked
    }
}

impl Prompter for FixedAnswer {
    fn confirm(&mut self, question: &str, _default: bool) -> Result<bool> {
        tracing::debug!("Answering '{}' with {}", question, self.answer);
        self.asked.push(question.to_string());
        Ok(self.answer)
    }
}
