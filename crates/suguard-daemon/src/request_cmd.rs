//! `suguard request`: run one prompt on the terminal.
//!
//! The decision goes to stdout as a single JSON line. The prompt is rendered
//! on stderr and driven by commands read from stdin.

use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, warn};

use suguard_daemon::policy::Uid;
use suguard_daemon::request::{
    PromptController, PromptState, PromptView, RequestError, RequestHandler, SuRequest,
};

/// Exit status for a request that was rejected at intake.
pub const EXIT_MALFORMED: i32 = 2;

/// A line of user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputCommand {
    Grant,
    Deny,
    Touch,
    Select(usize),
}

fn parse_command(line: &str) -> Option<InputCommand> {
    let mut words = line.split_whitespace();
    let command = match words.next()? {
        "grant" | "g" => InputCommand::Grant,
        "deny" | "d" => InputCommand::Deny,
        "touch" => InputCommand::Touch,
        "timeout" | "t" => InputCommand::Select(words.next()?.parse().ok()?),
        _ => return None,
    };
    words.next().is_none().then_some(command)
}

/// Prompt for `uid` and return the process exit status.
pub async fn run(handler: &RequestHandler, uid: Uid) -> anyhow::Result<i32> {
    let handle = match handler.handle(SuRequest { uid }).await {
        Ok(handle) => handle,
        Err(RequestError::MalformedRequest { .. }) => return Ok(EXIT_MALFORMED),
        Err(e) => return Err(e.into()),
    };

    let render = tokio::spawn(render_views(handle.subscribe()));
    let input = tokio::spawn(read_input(handle.controller()));

    let outcome = handle.finished().await?;
    input.abort();
    // The final view is published before the prompt task exits.
    if let Err(e) = render.await {
        debug!(error = %e, "Render task ended abnormally");
    }

    if let Some(e) = &outcome.persist_error {
        warn!(error = %e, "Decision sent but policy was not saved");
    }
    Ok(0)
}

async fn read_input(controller: PromptController) -> io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Some(InputCommand::Grant) => controller.request_grant(),
            Some(InputCommand::Deny) => controller.request_deny(),
            Some(InputCommand::Touch) => controller.touch_selector(),
            Some(InputCommand::Select(index)) => controller.select_timeout(index),
            None if line.trim().is_empty() => {}
            None => warn!(input = %line.trim(), "Unknown command (grant, deny, touch, timeout <n>)"),
        }
    }
    Ok(())
}

async fn render_views(mut views: watch::Receiver<PromptView>) {
    let mut last = String::new();
    loop {
        let view = views.borrow_and_update().clone();
        let line = render_line(&view);
        if line != last {
            let mut err = io::stderr();
            if writeln!(err, "{line}").is_err() {
                return;
            }
            last = line;
        }
        if view.state.is_terminal() || views.changed().await.is_err() {
            return;
        }
    }
}

fn render_line(view: &PromptView) -> String {
    let status = match view.state {
        PromptState::Prompting => String::new(),
        PromptState::AuthPending => " [authenticating]".to_string(),
        PromptState::Finalizing | PromptState::Done => " [done]".to_string(),
    };
    let choice = view
        .choices
        .get(view.selected_choice)
        .map(|c| c.label())
        .unwrap_or_default();
    let grant = if view.grant_enabled { "Grant" } else { "(Grant)" };

    format!(
        "{} ({}) requests superuser access | {grant} | {} | remember: {choice}{status}",
        view.app.app_name,
        view.app.package_name,
        view.deny_label(),
    )
}
