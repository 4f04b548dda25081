use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Select};

/// Interactive decisions the sync flows need from whoever drives them.
///
/// The core never reads the terminal itself; callers inject an
/// implementation (or none, for fully scripted runs). Destructive actions go
/// through [`Prompter::confirm`] one at a time.
pub trait Prompter {
    /// Asks the user to pick one item. `None` means they backed out.
    fn select(&self, prompt: &str, items: &[String]) -> Option<usize>;

    /// Asks a yes/no question about a destructive action.
    fn confirm(&self, prompt: &str) -> bool;
}

/// Terminal-backed prompter: arrow-key menus with a trailing EXIT entry, and
/// an explicit y/n question for confirmations.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn select(&self, prompt: &str, items: &[String]) -> Option<usize> {
        let mut menu: Vec<String> = items.to_vec();
        menu.push("EXIT".to_string());

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .items(&menu)
            .default(0)
            .interact()
            .ok()?;

        if selection == menu.len() - 1 {
            None
        } else {
            Some(selection)
        }
    }

    fn confirm(&self, prompt: &str) -> bool {
        // Loops until the user types an explicit y or n; no default, so a
        // stray Enter cannot delete anything.
        loop {
            let answer: Result<String, _> = Input::with_theme(&ColorfulTheme::default())
                .with_prompt(format!("{} [y/n]", prompt))
                .allow_empty(true)
                .interact_text();
            match answer.as_deref().map(str::trim) {
                Ok("y") | Ok("Y") => return true,
                Ok("n") | Ok("N") => return false,
                _ => continue,
            }
        }
    }
}
