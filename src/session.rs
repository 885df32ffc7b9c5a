use std::{path::PathBuf, sync::Arc};

use tokio::time::{Duration, sleep};
use v_utils::{elog, log};

use crate::{
	config::{Config, ConfigHandle},
	controller::{Prompt, StatusSink},
	notify::Notifier,
	state::{Owner, RunState, SharedState},
	surface::{Surface, ToastLevel},
};

/// Everything a driver needs: the page, the shared state, settings and the way out to the user.
#[derive(derive_new::new)]
pub struct Session<S> {
	pub surface: Arc<S>,
	pub config: ConfigHandle,
	pub sink: Arc<dyn StatusSink>,
	pub prompt: Arc<dyn Prompt>,
	#[new(default)]
	pub state: SharedState,
	#[new(default)]
	notifier: Notifier,
	/// Where page HTML is dumped when the engine gets stuck; nothing is saved when unset
	#[new(default)]
	pub snapshot_dir: Option<PathBuf>,
}

impl<S: Surface> Session<S> {
	pub fn config(&self) -> Config {
		self.config.get()
	}

	pub fn owns(&self, owner: Owner) -> bool {
		self.state.owns(owner)
	}

	/// Sleeps, then reports whether `owner` still holds the page. Every delayed step goes through here.
	pub async fn pause(&self, owner: Owner, ms: u64) -> bool {
		sleep(Duration::from_millis(ms)).await;
		self.owns(owner)
	}

	pub async fn notify(&self, message: impl AsRef<str>, level: ToastLevel) {
		self.toast(message.as_ref(), level, false).await
	}

	pub async fn force_notify(&self, message: impl AsRef<str>, level: ToastLevel) {
		self.toast(message.as_ref(), level, true).await
	}

	async fn toast(&self, message: &str, level: ToastLevel, force: bool) {
		match level {
			ToastLevel::Error => elog!("{message}"),
			ToastLevel::Warning => tracing::warn!("{message}"),
			ToastLevel::Info | ToastLevel::Success => log!("{message}"),
		}
		if !self.notifier.admit(&self.config(), force) {
			return;
		}
		if let Err(e) = self.surface.toast(message, level).await {
			tracing::debug!("toast not shown: {e}");
		}
	}

	/// Ends the run from inside: clears all state and tells the shell.
	pub async fn halt(&self, reason: &str, level: ToastLevel) {
		self.state.update(RunState::reset);
		self.force_notify(reason, level).await;
		self.sink.status_changed(false);
	}
}
