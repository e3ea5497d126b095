use anyhow::{anyhow, Context, Result};
use console::{style, Term};
use std::collections::VecDeque;
use std::fmt::Display;
use std::str::FromStr;

/// Source of answers for interactive setup.
pub trait Prompter {
    /// Ask one question. An empty answer yields `default` when there is one.
    fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String>;

    fn complain(&mut self, message: &str);
}

impl<'a> dyn Prompter + 'a {
    /// Ask until the answer passes `accept`.
    pub fn ask_validated(
        &mut self,
        question: &str,
        default: Option<&str>,
        accept: &dyn Fn(&str) -> bool,
    ) -> Result<String> {
        loop {
            let answer = self.ask(question, default)?;
            if accept(&answer) {
                return Ok(answer);
            }
            self.complain(&format!("'{}' is not valid here", answer));
        }
    }

    pub fn ask_number<T>(&mut self, question: &str, default: T) -> Result<T>
    where
        T: FromStr + Display,
    {
        let default_text = default.to_string();
        loop {
            let answer = self.ask(question, Some(&default_text))?;
            match answer.parse() {
                Ok(value) => return Ok(value),
                Err(_) => self.complain(&format!("'{}' is not a number in range", answer)),
            }
        }
    }
}

/// Prompts on the controlling terminal.
pub struct TermPrompter {
    term: Term,
}

impl TermPrompter {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }
}

impl Default for TermPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for TermPrompter {
    fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String> {
        let prompt = match default {
            Some(default) => format!("{} [{}]: ", style(question).bold(), default),
            None => format!("{}: ", style(question).bold()),
        };
        self.term
            .write_str(&prompt)
            .context("Failed to write prompt")?;

        let line = self.term.read_line().context("Failed to read answer")?;
        let answer = line.trim();

        Ok(match (answer.is_empty(), default) {
            (true, Some(default)) => default.to_string(),
            _ => answer.to_string(),
        })
    }

    fn complain(&mut self, message: &str) {
        let _ = self
            .term
            .write_line(&format!("{}", style(message).yellow()));
    }
}

/// Replays fixed answers. Used for tests and piped setups.
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    pub complaints: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            complaints: Vec::new(),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String> {
        let answer = self
            .answers
            .pop_front()
            .ok_or_else(|| anyhow!("No answer left for '{}'", question))?;
        let answer = answer.trim();

        Ok(match (answer.is_empty(), default) {
            (true, Some(default)) => default.to_string(),
            _ => answer.to_string(),
        })
    }

    fn complain(&mut self, message: &str) {
        self.complaints.push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_answer_takes_default() {
        let mut scripted = ScriptedPrompter::new([""]);
        let prompter: &mut dyn Prompter = &mut scripted;

        assert_eq!(prompter.ask_number("Hub port", 4444u16).unwrap(), 4444);
    }

    #[test]
    fn test_reasks_until_valid() {
        let mut scripted = ScriptedPrompter::new(["x", "70000", "5"]);
        let value = {
            let prompter: &mut dyn Prompter = &mut scripted;
            prompter.ask_number("Chrome nodes", 1u8).unwrap()
        };

        assert_eq!(value, 5);
        assert_eq!(scripted.complaints.len(), 2);
    }

    #[test]
    fn test_runs_out_of_answers() {
        let mut scripted = ScriptedPrompter::new(["bad"]);
        let prompter: &mut dyn Prompter = &mut scripted;

        assert!(prompter
            .ask_validated("Domain", None, &|value| value.contains('.'))
            .is_err());
    }
}
