//! Interactive chat REPL.
//!
//! One line in, one agent turn out, all on a single session. Line editing
//! and history come from `rustyline`; history persists under the data dir.

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use rustyline::config::Configurer;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use tracing::debug;

use miniclaw_agent::{Agent, AgentError, RunOptions};

use crate::helpers;

const HISTORY_LIMIT: usize = 1000;
const PROMPT: &str = "You: ";

type LineEditor = Editor<(), DefaultHistory>;

/// What a line typed at the prompt asks for.
#[derive(Debug, PartialEq, Eq)]
enum ReplInput<'a> {
    Blank,
    Quit,
    /// Wipe the current session's history and keep chatting.
    Clear,
    Message(&'a str),
}

impl<'a> ReplInput<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ReplInput::Blank;
        }
        match line.to_ascii_lowercase().as_str() {
            "exit" | "quit" | "/exit" | "/quit" | ":q" => ReplInput::Quit,
            "/clear" => ReplInput::Clear,
            _ => ReplInput::Message(line),
        }
    }
}

/// Chat until the user quits, presses Ctrl-C at an empty prompt, or sends EOF.
pub async fn run(agent: &Agent, session_id: &str, model: Option<String>) -> Result<()> {
    helpers::print_banner(session_id);
    let mut editor = open_editor()?;

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline failed: {e}");
                break;
            }
        };

        let message = match ReplInput::parse(&line) {
            ReplInput::Blank => continue,
            ReplInput::Quit => {
                println!("\nBye.");
                break;
            }
            ReplInput::Clear => {
                match agent.sessions().clear(session_id) {
                    Ok(()) => println!("{}", format!("session \"{session_id}\" cleared").dimmed()),
                    Err(e) => eprintln!("{} {e}", "clear failed:".red()),
                }
                continue;
            }
            ReplInput::Message(text) => text,
        };
        if let Err(e) = editor.add_history_entry(line.as_str()) {
            debug!(error = %e, "history entry rejected");
        }

        let mut options = RunOptions::new().with_session(session_id);
        options.model = model.clone();

        helpers::print_thinking();
        let outcome = helpers::run_cancellable(agent, message, options).await;
        helpers::clear_thinking();

        match outcome {
            Ok(result) => {
                helpers::print_response(&result.response.content);
                if let Some(tool_results) = &result.tool_results {
                    helpers::print_tool_results(tool_results);
                }
            }
            Err(AgentError::Cancelled) => eprintln!("\n(cancelled)\n"),
            Err(e) => eprintln!("\n{} {e}\n", "error:".red().bold()),
        }
    }

    persist_history(&mut editor);
    Ok(())
}

fn open_editor() -> Result<LineEditor> {
    let mut editor = LineEditor::new()?;
    editor.set_max_history_size(HISTORY_LIMIT)?;

    let path = history_file();
    if path.is_file() {
        match editor.load_history(&path) {
            Ok(()) => debug!(path = %path.display(), "REPL history loaded"),
            Err(e) => debug!(error = %e, "REPL history unreadable, starting fresh"),
        }
    }
    Ok(editor)
}

fn persist_history(editor: &mut LineEditor) {
    let path = history_file();
    if let Some(dir) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            debug!(error = %e, "cannot create history dir");
            return;
        }
    }
    if let Err(e) = editor.save_history(&path) {
        debug!(error = %e, "cannot save REPL history");
    }
}

fn history_file() -> PathBuf {
    miniclaw_core::utils::get_data_path()
        .join("history")
        .join("chat_history")
}
