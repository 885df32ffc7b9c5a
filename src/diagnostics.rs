//! What the engine currently sees, for the `debug` shell command.

use color_eyre::Result;
use serde::Serialize;

use crate::{
	PageType, classifier,
	heuristics::{
		Candidate,
		detect::{self, PreviewSignals, VideoSignals},
		next_button,
	},
	session::Session,
	state::RunState,
	surface::{ScrollMetrics, ScrollTarget, Surface},
};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugReport {
	pub state: RunState,
	pub url: String,
	pub title: String,
	pub scroll: ScrollMetrics,
	pub scroll_percent: f64,
	/// What a fresh classification would pick right now
	pub detected: PageType,
	pub preview: PreviewSignals,
	pub video: VideoSignals,
	pub videos: usize,
	/// Counted even when file lists are switched off, so the number explains a text verdict
	pub file_buttons: usize,
	pub next_button: Option<Candidate>,
}

/// Read-only: never clicks, scrolls or takes ownership.
pub async fn report<S: Surface>(session: &Session<S>) -> Result<DebugReport> {
	let config = session.config();
	let scan = detect::scan(&*session.surface).await?;
	let file_buttons = detect::view_controls(&*session.surface).await?.len();
	let classification = classifier::decide(&scan, config.auto_handle_file_list.then_some(file_buttons));
	let scroll = session.surface.scroll_metrics(ScrollTarget::Document).await?;
	Ok(DebugReport {
		state: session.state.snapshot(),
		scroll_percent: scroll.percent(),
		scroll,
		detected: classification.page_type,
		preview: classification.preview,
		video: classification.video,
		videos: scan.videos.len(),
		file_buttons,
		next_button: next_button::find(&*session.surface).await?,
		url: scan.url,
		title: scan.title,
	})
}
