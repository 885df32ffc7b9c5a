//! The terminal side: stdin commands, prompt answers, and the status hook.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::oneshot;
use v_utils::{elog, log};

use crate::{
	PageType,
	controller::{Command, Prompt, StatusSink},
};

#[derive(Clone, Debug, PartialEq)]
pub enum Input {
	Command(Command),
	/// Re-read the config file
	Reload,
	Quit,
	/// y/n for a pending prompt
	Answer(bool),
	Empty,
	Unknown(String),
}

pub fn parse_line(line: &str) -> Input {
	let line = line.trim().to_lowercase();
	if let Some((word, arg)) = line.split_once(char::is_whitespace)
		&& matches!(word, "force" | "f")
	{
		return match arg.parse() {
			Ok(page_type) => Input::Command(Command::ForceStart(page_type)),
			Err(_) => Input::Unknown(line.clone()),
		};
	}
	match line.as_str() {
		"" => Input::Empty,
		"toggle" | "t" => Input::Command(Command::Toggle),
		"status" | "s" => Input::Command(Command::GetStatus),
		"debug" | "d" => Input::Command(Command::Debug),
		"force" | "f" => Input::Command(Command::ForceStart(PageType::Text)),
		"reload" | "r" => Input::Reload,
		"quit" | "q" | "exit" => Input::Quit,
		"y" | "yes" => Input::Answer(true),
		"n" | "no" => Input::Answer(false),
		other => Input::Unknown(other.to_owned()),
	}
}

pub const HELP: &str = "commands: toggle (t), status (s), debug (d), force (f) [text|video|file-list|preview], reload (r), quit (q); answer prompts with y/n";

/// Asks on stderr and takes the answer from the stdin loop, which owns stdin.
#[derive(Debug, Default)]
pub struct StdinPrompt {
	pending: Mutex<Option<oneshot::Sender<bool>>>,
	/// Every question is answered "no" without asking
	non_interactive: bool,
}

impl StdinPrompt {
	pub fn new(non_interactive: bool) -> Self {
		Self { pending: Mutex::default(), non_interactive }
	}

	fn pending(&self) -> std::sync::MutexGuard<'_, Option<oneshot::Sender<bool>>> {
		match self.pending.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		}
	}

	pub fn is_waiting(&self) -> bool {
		self.pending().is_some()
	}

	/// Hands an answer to the question waiting for one. False when nothing was asking.
	pub fn answer(&self, yes: bool) -> bool {
		match self.pending().take() {
			Some(tx) => tx.send(yes).is_ok(),
			None => false,
		}
	}
}

#[async_trait]
impl Prompt for StdinPrompt {
	async fn confirm(&self, question: &str) -> bool {
		if self.non_interactive {
			log!("{question} -> no (non-interactive)");
			return false;
		}
		let (tx, rx) = oneshot::channel();
		*self.pending() = Some(tx);
		eprintln!("{question} [y/n]");
		rx.await.unwrap_or(false)
	}
}

/// Single-quotes `s` for `sh -c`.
pub fn shell_quote(s: &str) -> String {
	format!("'{}'", s.replace('\'', "'\\''"))
}

/// Logs status changes and passes them to an optional shell hook as `running` / `stopped`.
#[derive(Clone, Debug, Default, derive_new::new)]
pub struct HookSink {
	hook: Option<String>,
}

impl StatusSink for HookSink {
	fn status_changed(&self, running: bool) {
		let status = if running { "running" } else { "stopped" };
		log!("Status: {status}");
		let Some(hook) = &self.hook else {
			return;
		};
		tracing::debug!("running status hook: {hook} {status}");
		if let Err(e) = tokio::process::Command::new("sh").arg("-c").arg(format!("{hook} {}", shell_quote(status))).spawn() {
			elog!("Status hook failed to start: {e}");
		}
	}
}
