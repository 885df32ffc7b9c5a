//! Moving on to the next page once the current one counts as done.

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use v_utils::{elog, log};

use crate::{
	config::tunable,
	heuristics::{is_valid_next, next_button},
	session::Session,
	snapshot,
	state::Owner,
	surface::{Surface, ToastLevel},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavPolicy {
	/// Searches per cycle; the button often renders late
	pub search_attempts: u32,
	pub search_interval_ms: u64,
	pub not_found_backoff_ms: u64,
	pub click_failure_backoff_ms: u64,
	/// Smooth-scroll time before the click
	pub settle_into_view_ms: u64,
	pub post_click_ms: u64,
	pub load_checks: u32,
	pub load_check_ms: u64,
	/// Between giving up and asking the user
	pub prompt_delay_ms: u64,
	/// For the new page to settle before it is classified
	pub page_loaded_ms: u64,
}

impl Default for NavPolicy {
	fn default() -> Self {
		Self {
			search_attempts: 10,
			search_interval_ms: 1000,
			not_found_backoff_ms: 3000,
			click_failure_backoff_ms: 2000,
			settle_into_view_ms: 500,
			post_click_ms: 1000,
			load_checks: 20,
			load_check_ms: 500,
			prompt_delay_ms: 2000,
			page_loaded_ms: 1500,
		}
	}
}

tunable!(NavPolicy;
	search_attempts, search_interval_ms, not_found_backoff_ms, click_failure_backoff_ms, settle_into_view_ms, post_click_ms, load_checks, load_check_ms,
	prompt_delay_ms, page_loaded_ms,
);

pub const EXHAUSTED_QUESTION: &str = "Could not find a next-page button; the course may be finished. Read this page again?";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NavOutcome {
	/// Clicked and the new page loaded (or the load wait ran out)
	Advanced,
	/// User asked to go over the current page again
	Restart,
	/// Give up; carries the reason for the user
	Stop(String),
	Cancelled,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Attempt {
	Clicked,
	NotFound,
	ClickFailed,
	Cancelled,
}

pub async fn advance<S: Surface>(session: &Session<S>) -> Result<NavOutcome> {
	let policy = session.config().policy.navigation;
	loop {
		let before = session.surface.url().await.unwrap_or_default();
		let max_retries = session.config().max_retries;
		match attempt(session, &policy).await? {
			Attempt::Cancelled => return Ok(NavOutcome::Cancelled),
			Attempt::Clicked => {
				session.state.update(|s| s.retry_count = 0);
				if !wait_for_page_load(session, &policy, &before).await {
					return Ok(NavOutcome::Cancelled);
				}
				return Ok(NavOutcome::Advanced);
			}
			Attempt::NotFound => {
				let retries = session.state.update(|s| {
					s.retry_count += 1;
					s.retry_count
				});
				if retries < max_retries {
					info!(retries, max_retries, "next button not found, backing off");
					if retries == 1 || retries % 5 == 0 {
						session.notify(format!("Next button not found ({retries}/{max_retries}), retrying shortly"), ToastLevel::Info).await;
					}
					if !session.pause(Owner::Navigation, policy.not_found_backoff_ms).await {
						return Ok(NavOutcome::Cancelled);
					}
					continue;
				}
				session.force_notify("The course may be finished, no next-page button found", ToastLevel::Warning).await;
				if let Some(dir) = &session.snapshot_dir {
					match snapshot::save_page_html(&*session.surface, dir).await {
						Ok(path) => log!("Saved page HTML to: {}", path.display()),
						Err(e) => elog!("Failed to save page HTML: {e}"),
					}
				}
				if !session.pause(Owner::Navigation, policy.prompt_delay_ms).await {
					return Ok(NavOutcome::Cancelled);
				}
				return Ok(match session.prompt.confirm(EXHAUSTED_QUESTION).await {
					true => {
						session.state.update(|s| s.retry_count = 0);
						NavOutcome::Restart
					}
					false => NavOutcome::Stop("Stopped: no next page".into()),
				});
			}
			Attempt::ClickFailed => {
				let retries = session.state.update(|s| {
					s.retry_count += 1;
					s.retry_count
				});
				if retries >= max_retries {
					return Ok(NavOutcome::Stop("Clicking next kept failing, stopped".into()));
				}
				session.notify(format!("Click failed ({retries}/{max_retries}), retrying"), ToastLevel::Info).await;
				if !session.pause(Owner::Navigation, policy.click_failure_backoff_ms).await {
					return Ok(NavOutcome::Cancelled);
				}
			}
		}
	}
}

/// One search cycle: look for the button a few times, then bring it into view and click it.
async fn attempt<S: Surface>(session: &Session<S>, policy: &NavPolicy) -> Result<Attempt> {
	let surface = &*session.surface;
	for search in 1..=policy.search_attempts {
		if let Some(button) = next_button::find(surface).await? {
			info!(search, source = %button.source, text = %button.text, "next button found");
			session.notify("Next button found, moving on", ToastLevel::Info).await;
			if let Err(e) = surface.scroll_into_view(button.element).await {
				debug!("scroll into view failed, clicking anyway: {e}");
			}
			if !session.pause(Owner::Navigation, policy.settle_into_view_ms).await {
				return Ok(Attempt::Cancelled);
			}
			let url = surface.url().await?;
			if !surface.inspect(button.element).await?.is_some_and(|el| is_valid_next(&el, &url)) {
				debug!("next button went stale before the click");
				return Ok(Attempt::ClickFailed);
			}
			return Ok(match surface.click(button.element).await {
				Ok(()) => Attempt::Clicked,
				Err(e) => {
					elog!("Clicking next failed: {e}");
					Attempt::ClickFailed
				}
			});
		}
		if search < policy.search_attempts && !session.pause(Owner::Navigation, policy.search_interval_ms).await {
			return Ok(Attempt::Cancelled);
		}
	}
	Ok(Attempt::NotFound)
}

/// Polls until the URL changes or the document reports `complete`, bounded by `load_checks`. False when cancelled.
pub async fn wait_for_page_load<S: Surface>(session: &Session<S>, policy: &NavPolicy, before: &str) -> bool {
	if !session.pause(Owner::Navigation, policy.post_click_ms).await {
		return false;
	}
	for check in 1..=policy.load_checks {
		if !session.pause(Owner::Navigation, policy.load_check_ms).await {
			return false;
		}
		// mid-navigation the page may not answer at all
		let url = session.surface.url().await.ok();
		if url.as_deref().is_some_and(|u| u != before) {
			debug!(check, "url changed");
			return true;
		}
		if session.surface.ready_state().await.is_ok_and(|s| s == "complete") {
			debug!(check, "document complete");
			return true;
		}
	}
	info!("page load wait ran out, carrying on");
	true
}
