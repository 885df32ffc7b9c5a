use color_eyre::{Result, eyre::bail};
use tracing::info;

use super::DriveOutcome;
use crate::{
	heuristics::scroll_container,
	scroll::{self, Containers, ReadEnd},
	session::Session,
	state::Owner,
	surface::{Frame, ScrollTarget, Surface, ToastLevel},
};

/// Time for the page to settle after being sent back to the top.
const REWIND_SETTLE_MS: u64 = 1000;

pub async fn run<S: Surface>(session: &Session<S>) -> Result<DriveOutcome> {
	let policy = session.config().policy.text;
	let surface = &*session.surface;

	let container = scroll_container::find(surface, Frame::Main).await?.filter(|s| s.score >= policy.confident_score);
	if let Some(s) = &container {
		info!(score = s.score, "scrolling content container instead of the document");
	}
	let container = container.map(|s| s.container);

	let doc = surface.scroll_metrics(ScrollTarget::Document).await?;
	let inner = match container {
		Some(c) => Some(surface.scroll_metrics(ScrollTarget::Element(c.handle)).await?),
		None => None,
	};
	if doc.scrollable() <= policy.visible_slack && inner.is_none_or(|m| m.scrollable() <= policy.visible_slack) {
		session.notify("Whole page is visible, no scrolling needed", ToastLevel::Info).await;
		return Ok(DriveOutcome::AlreadyVisible);
	}

	if doc.top > policy.rewind_above {
		surface.scroll_to(ScrollTarget::Document, 0.0).await?;
		if !session.pause(Owner::Scroller, REWIND_SETTLE_MS).await {
			return Ok(DriveOutcome::Cancelled);
		}
	}

	session.notify("Scrolling through the page", ToastLevel::Info).await;
	match scroll::read(session, Owner::Scroller, Containers::Fixed(container), &policy).await {
		ReadEnd::Finished(reason) => {
			let percent = surface.scroll_metrics(ScrollTarget::Document).await.map(|m| m.percent().round()).unwrap_or(100.0);
			session.notify(format!("Page read ({percent}%, {reason:?})"), ToastLevel::Success).await;
			Ok(DriveOutcome::Completed)
		}
		ReadEnd::Cancelled => Ok(DriveOutcome::Cancelled),
		ReadEnd::Abandoned => bail!("scrolling kept failing on {}", surface.url().await.unwrap_or_default()),
	}
}
