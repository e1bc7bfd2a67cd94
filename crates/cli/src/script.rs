//! Runs parsed script lines through a session in order.

use std::io::Write;

use lamina_engine::{ActionContext, ActionSource, ActionStatus, Session, WaitPolicy};
use lamina_invocation::{Invocation, parse_script};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
	pub succeeded: usize,
	pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
	pub keep_going: bool,
	pub fail_fast: bool,
}

/// Executes every command of `text`, reporting each outcome on `out`.
///
/// `undo` and `redo` lines without parameters drive the undo buffer; every
/// other line is built through the session's action registry. Stops at the
/// first failure unless `keep_going` is set.
pub fn run_script(session: &Session, text: &str, options: RunOptions, out: &mut impl Write) -> anyhow::Result<Summary> {
	let lines = parse_script(text)?;
	let handle = session.handle();
	let policy = if options.fail_fast {
		WaitPolicy::FailFast
	} else {
		WaitPolicy::Suspend
	};
	let context = ActionContext::with_policy(ActionSource::Scripted, policy);
	let mut summary = Summary::default();

	for (line, invocation) in lines {
		tracing::debug!(line, command = %invocation, "script.line");
		let status = match undo_command(&invocation) {
			Some(true) => {
				handle.undo(&context)?;
				context.status()
			}
			Some(false) => {
				handle.redo(&context)?;
				context.status()
			}
			None => match handle.post_invocation(&invocation, &context) {
				Ok(()) => context.wait_done(None),
				Err(error) => {
					writeln!(out, "{line}: error: {error}")?;
					summary.failed += 1;
					if options.keep_going {
						continue;
					}
					break;
				}
			},
		};

		if status == ActionStatus::Success {
			summary.succeeded += 1;
			match context.result() {
				Some(result) => writeln!(out, "{line}: {} -> {result}", invocation.name)?,
				None => writeln!(out, "{line}: {}", invocation.name)?,
			}
			for warning in context.warnings() {
				writeln!(out, "{line}: warning: {warning}")?;
			}
			continue;
		}

		summary.failed += 1;
		let errors = context.errors();
		match errors.last() {
			Some(error) => writeln!(out, "{line}: {}: {error}", status.as_str())?,
			None => writeln!(out, "{line}: {}", status.as_str())?,
		}
		if !options.keep_going {
			break;
		}
	}
	Ok(summary)
}

/// `Some(true)` for a bare `undo`, `Some(false)` for a bare `redo`.
fn undo_command(invocation: &Invocation) -> Option<bool> {
	if !invocation.args.is_empty() || !invocation.options.is_empty() {
		return None;
	}
	match invocation.name.as_str() {
		"undo" => Some(true),
		"redo" => Some(false),
		_ => None,
	}
}

#[cfg(test)]
mod tests;
