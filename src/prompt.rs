// Interactive decisions the core needs from whoever drives it.
//
// The terminal implementation is `ui::TerminalPrompter`; tests use a
// scripted one. Calls block until an answer is available.

use std::io;

use tracing::warn;

use crate::error::{Error, Result};

pub trait Prompter {
    /// Asks a yes/no question.
    fn confirm(&mut self, prompt: &str) -> io::Result<bool>;

    /// Shows `choices` numbered from 1 and asks for a number, 0 meaning
    /// quit. The answer is returned unchecked; see [`select_one`].
    fn select_index(&mut self, prompt: &str, choices: &[String]) -> io::Result<i64>;
}

/// Maps a 1-based `index` onto `items`.
///
/// `0` is the quit sentinel and yields `Ok(None)`. Anything else outside
/// `1..=len` is `Error::InvalidSelection`, which callers answer by asking again.
pub fn select_one<T>(items: &[T], index: i64) -> Result<Option<&T>> {
    if index == 0 {
        return Ok(None);
    }
    let invalid = || Error::InvalidSelection {
        index,
        max: items.len(),
    };
    let position = usize::try_from(index).map_err(|_| invalid())? - 1;
    items.get(position).map(Some).ok_or_else(invalid)
}

/// Asks until the answer is a valid item or 0. An empty list asks nothing.
pub fn choose<'a, T>(
    prompter: &mut dyn Prompter,
    prompt: &str,
    items: &'a [T],
    describe: impl Fn(&T) -> String,
) -> Result<Option<&'a T>> {
    if items.is_empty() {
        return Ok(None);
    }
    let choices: Vec<String> = items.iter().map(describe).collect();
    loop {
        let index = prompter
            .select_index(prompt, &choices)
            .map_err(Error::Prompt)?;
        match select_one(items, index) {
            Ok(choice) => return Ok(choice),
            Err(err @ Error::InvalidSelection { .. }) => warn!("{err}"),
            Err(err) => return Err(err),
        }
    }
}
