//! Shared CLI helpers — response printing, banner, cancellable turns.

use colored::Colorize;
use miniclaw_agent::{Agent, AgentError, AgentResult, RunOptions};
use miniclaw_core::types::{Message, ToolResult};
use miniclaw_core::utils::truncate_string;
use tokio_util::sync::CancellationToken;

/// Longest tool output shown inline.
const TOOL_SUMMARY_LEN: usize = 200;

/// Print an agent response to stdout.
pub fn print_response(response: &str) {
    println!();
    println!("{}", "🦀 miniclaw".cyan().bold());
    if response.is_empty() {
        println!("{}", "(no response)".dimmed());
    } else {
        println!("{response}");
    }
    println!();
}

/// Print one line per tool call made during the turn.
pub fn print_tool_results(results: &[ToolResult]) {
    for result in results {
        println!("{}", summarize_tool_result(result));
    }
    if !results.is_empty() {
        println!();
    }
}

/// `✓ name: output` or `✗ name: error`, truncated.
pub fn summarize_tool_result(result: &ToolResult) -> String {
    if result.success {
        let output = serde_json::to_string(&result.result).unwrap_or_default();
        format!(
            "  {} {}: {}",
            "✓".green(),
            result.name.bold(),
            truncate_string(&output, TOOL_SUMMARY_LEN).dimmed()
        )
    } else {
        let error = result.error.as_deref().unwrap_or("unknown error");
        format!(
            "  {} {}: {}",
            "✗".red(),
            result.name.bold(),
            truncate_string(error, TOOL_SUMMARY_LEN).red()
        )
    }
}

/// Print the banner shown at REPL start.
pub fn print_banner(session_id: &str) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "🦀 miniclaw".cyan().bold(), version.dimmed());
    println!("{}", format!("session: {session_id}").dimmed());
    println!(
        "{}",
        "Type a message, or \"exit\" to quit. Ctrl-C cancels a running turn.".dimmed()
    );
    println!();
}

pub fn print_thinking() {
    eprint!("{}", "⠿ thinking...".dimmed());
}

pub fn clear_thinking() {
    eprint!("\r{}\r", " ".repeat(40));
}

/// Run one user message as a turn that Ctrl-C cancels.
pub async fn run_cancellable(
    agent: &Agent,
    input: &str,
    options: RunOptions,
) -> Result<AgentResult, AgentError> {
    let token = CancellationToken::new();
    let trigger = token.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let result = agent
        .run(vec![Message::user(input)], options.with_cancel(token))
        .await;
    watcher.abort();
    result
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
