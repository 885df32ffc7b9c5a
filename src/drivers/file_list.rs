use color_eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
	DriveOutcome,
	pdf::{self, DocumentRead, Probe},
};
use crate::{
	PageType,
	config::tunable,
	heuristics::{close_button, detect},
	session::Session,
	state::Owner,
	surface::{Frame, Surface, ToastLevel},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListPolicy {
	/// Before enumerating, and between one file's close and the next open
	pub settle_ms: u64,
	/// Between finishing a document and closing it
	pub close_wait_ms: u64,
	/// Before handing a list without controls over to text reading
	pub degrade_ms: u64,
	pub max_files: u32,
}

impl Default for FileListPolicy {
	fn default() -> Self {
		Self { settle_ms: 2000, close_wait_ms: 2000, degrade_ms: 1000, max_files: 200 }
	}
}

tunable!(FileListPolicy; settle_ms, close_wait_ms, degrade_ms, max_files);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Closed {
	Button,
	/// Escape plus a backdrop click; the viewer may or may not be gone
	Fallback,
}

/// Close control if there is one, else Escape and a click on whatever backdrop is up.
pub async fn close_viewer<S: Surface + ?Sized>(surface: &S) -> Result<Closed> {
	if let Some(button) = close_button::find(surface).await? {
		debug!(source = %button.source, "closing viewer");
		match surface.click(button.element).await {
			Ok(()) => return Ok(Closed::Button),
			Err(e) => warn!("close control refused the click: {e}"),
		}
	}
	surface.press_escape().await?;
	if let Some(backdrop) = surface.query(Frame::Main, close_button::BACKDROPS).await?.into_iter().next() {
		surface.click(backdrop.handle).await?;
	}
	Ok(Closed::Fallback)
}

pub async fn run<S: Surface>(session: &Session<S>) -> Result<DriveOutcome> {
	let config = session.config();
	let policy = config.policy.file_list.clone();
	let viewer_probe = Probe { count: config.policy.paging.viewer_probes, interval_ms: config.policy.paging.viewer_probe_ms };
	let surface = &*session.surface;

	if !session.pause(Owner::FileList, policy.settle_ms).await {
		return Ok(DriveOutcome::Cancelled);
	}
	let found = detect::view_controls(surface).await?.len();
	if found == 0 {
		session.notify("No file view controls found, reading as text instead", ToastLevel::Info).await;
		if !session.pause(Owner::FileList, policy.degrade_ms).await {
			return Ok(DriveOutcome::Cancelled);
		}
		return Ok(DriveOutcome::Degraded(PageType::Text));
	}
	let total = found.min(policy.max_files as usize);
	session.notify(format!("Found {total} files, viewing them one by one"), ToastLevel::Info).await;

	for index in 0..total {
		session.state.update(|s| s.file_list_index = index);
		// the list re-renders after every close, so locate the control afresh
		let controls = detect::view_controls(surface).await?;
		let Some(control) = controls.get(index) else {
			info!(index, remaining = controls.len(), "file list shrank, stopping early");
			break;
		};
		session.force_notify(format!("Viewing file {}/{total}", index + 1), ToastLevel::Info).await;
		if let Err(e) = surface.click(control.handle).await {
			warn!("could not open file {}: {e}", index + 1);
			continue;
		}
		if !session.pause(Owner::FileList, session.config().page_load_wait).await {
			return Ok(DriveOutcome::Cancelled);
		}

		match pdf::read_document(session, Owner::FileList, viewer_probe).await? {
			DocumentRead::Cancelled => return Ok(DriveOutcome::Cancelled),
			DocumentRead::Abandoned => warn!("gave up reading file {}", index + 1),
			read => debug!(?read, file = index + 1, "file read"),
		}

		if !session.pause(Owner::FileList, policy.close_wait_ms).await {
			return Ok(DriveOutcome::Cancelled);
		}
		match close_viewer(surface).await {
			Ok(closed) => debug!(?closed, "viewer closed"),
			Err(e) => warn!("closing file {} failed: {e}", index + 1),
		}
		if !session.pause(Owner::FileList, policy.settle_ms).await {
			return Ok(DriveOutcome::Cancelled);
		}
	}
	session.notify("All files viewed", ToastLevel::Success).await;
	Ok(DriveOutcome::Completed)
}
