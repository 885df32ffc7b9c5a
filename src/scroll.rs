//! Scroll-based reading: the progress counters, the pure bottom/stuck decisions, and the ticker that drives them.

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
	config::tunable,
	heuristics::scroll_container::{self, ScrollContainer},
	session::Session,
	state::Owner,
	surface::{ScrollMetrics, ScrollTarget, Surface},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollPolicy {
	/// Safety valve: total ticks before forcing completion
	pub tick_ceiling: u32,
	/// Consecutive no-progress ticks before forcing completion
	pub stuck_ceiling: u32,
	/// Ticks before the bottom check is trusted
	pub min_ticks: u32,
	pub escalate_after: u32,
	pub escalate_factor: f64,
	pub step_cap: f64,
	/// Past this many stuck ticks the escalated step is doubled again
	pub boost_after: u32,
	/// Past this many stuck ticks, jump straight to the end
	pub jump_after: u32,
	pub bottom_tolerance: f64,
	pub bottom_percent: f64,
	/// Percentage that counts as done once `late_min_ticks` have passed, whatever the distance
	pub late_percent: f64,
	pub late_min_ticks: u32,
	pub container_tolerance: f64,
	/// Document viewers render lazily, so their bottom is fuzzier
	pub viewer_tolerance: f64,
	pub container_percent: f64,
	/// A target with at most this much scrollable height counts as fully visible
	pub visible_slack: f64,
	/// Start position above which reading begins by returning to the top
	pub rewind_above: f64,
	/// A content container scoring at least this is scrolled instead of the document
	pub confident_score: f64,
	pub min_interval_ms: u64,
	/// Delay before restarting the ticker after a failed tick
	pub restart_ms: u64,
	/// Consecutive failed ticks before the read is abandoned
	pub failure_ceiling: u32,
}

tunable!(ScrollPolicy;
	tick_ceiling, stuck_ceiling, min_ticks, escalate_after, escalate_factor, step_cap, boost_after, jump_after,
	bottom_tolerance, bottom_percent, late_percent, late_min_ticks, container_tolerance, viewer_tolerance, container_percent,
	visible_slack, rewind_above, confident_score, min_interval_ms, restart_ms, failure_ceiling,
);

impl ScrollPolicy {
	/// Page text: patient, escalates late.
	pub fn text() -> Self {
		Self {
			tick_ceiling: 1500,
			stuck_ceiling: 50,
			min_ticks: 5,
			escalate_after: 15,
			escalate_factor: 1.5,
			step_cap: 200.0,
			boost_after: 20,
			jump_after: 30,
			bottom_tolerance: 30.0,
			bottom_percent: 80.0,
			late_percent: 95.0,
			late_min_ticks: 10,
			container_tolerance: 30.0,
			viewer_tolerance: 100.0,
			container_percent: 90.0,
			visible_slack: 20.0,
			rewind_above: 100.0,
			confident_score: 60.0,
			min_interval_ms: 50,
			restart_ms: 1000,
			failure_ceiling: 5,
		}
	}

	/// An opened file: shorter leash, escalates early.
	pub fn file() -> Self {
		Self {
			tick_ceiling: 300,
			stuck_ceiling: 15,
			min_ticks: 5,
			escalate_after: 8,
			escalate_factor: 3.0,
			step_cap: 600.0,
			boost_after: 10,
			jump_after: 12,
			bottom_percent: 1.0,
			late_min_ticks: 1,
			container_percent: 95.0,
			min_interval_ms: 300,
			..Self::text()
		}
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScrollProgress {
	pub attempts: u32,
	pub last_height: f64,
	pub last_position: f64,
	pub stuck: u32,
}

impl ScrollProgress {
	/// Records one poll. A poll where neither height nor position moved is a stuck one.
	pub fn observe(&mut self, height: f64, position: f64) {
		self.attempts += 1;
		if (height - self.last_height).abs() < 0.5 && (position - self.last_position).abs() < 0.5 {
			self.stuck += 1;
		} else {
			self.stuck = 0;
			self.last_height = height;
			self.last_position = position;
		}
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompletionReason {
	Bottom,
	Stuck,
	TickCeiling,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TickDecision {
	Complete(CompletionReason),
	Scroll { step: f64, jump: bool },
}

/// Bottom check over the document and, when one is in play, the content container. Both must be done.
pub fn is_at_bottom(doc: ScrollMetrics, container: Option<(ScrollMetrics, bool)>, attempts: u32, p: &ScrollPolicy) -> bool {
	let doc_done = doc.scrollable() <= p.visible_slack || {
		let pct = doc.percent();
		(doc.distance_from_bottom() <= p.bottom_tolerance && pct >= p.bottom_percent) || (pct >= p.late_percent && attempts >= p.late_min_ticks)
	};
	let container_done = match container {
		Some((m, viewer)) if m.scrollable() > p.visible_slack => {
			let tolerance = if viewer { p.viewer_tolerance } else { p.container_tolerance };
			m.distance_from_bottom() <= tolerance || m.percent() >= p.container_percent
		}
		_ => true,
	};
	doc_done && container_done
}

pub fn decide(progress: &ScrollProgress, at_bottom: bool, speed: f64, p: &ScrollPolicy) -> TickDecision {
	if progress.stuck > p.stuck_ceiling {
		return TickDecision::Complete(CompletionReason::Stuck);
	}
	if progress.attempts > p.tick_ceiling {
		return TickDecision::Complete(CompletionReason::TickCeiling);
	}
	if progress.attempts >= p.min_ticks && at_bottom {
		return TickDecision::Complete(CompletionReason::Bottom);
	}
	let mut step = speed;
	if progress.stuck > p.escalate_after {
		step = (step * p.escalate_factor).min(p.step_cap);
	}
	if progress.stuck > p.boost_after {
		step *= 2.0;
	}
	TickDecision::Scroll { step, jump: progress.stuck > p.jump_after }
}

/// Where the container comes from on each tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Containers {
	/// Resolved once up front (or none: document only)
	Fixed(Option<ScrollContainer>),
	/// Looked up again every tick, for viewers that swap their DOM while loading
	Refind,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadEnd {
	Finished(CompletionReason),
	Cancelled,
	/// Ticks kept failing
	Abandoned,
}

/// Scrolls until done. Never returns an error: a failed tick tears the ticker down and restarts it after a pause.
pub async fn read<S: Surface>(session: &Session<S>, owner: Owner, containers: Containers, policy: &ScrollPolicy) -> ReadEnd {
	let config = session.config();
	let interval = config.scroll_delay.max(policy.min_interval_ms);
	let speed = f64::from(config.scroll_speed);
	let mut progress = ScrollProgress::default();
	let mut failures = 0;
	loop {
		if !session.owns(owner) {
			return ReadEnd::Cancelled;
		}
		match tick(&*session.surface, containers, &mut progress, speed, policy).await {
			Ok(Some(reason)) => {
				debug!(?reason, attempts = progress.attempts, "scroll read finished");
				return ReadEnd::Finished(reason);
			}
			Ok(None) => {
				failures = 0;
				if !session.pause(owner, interval).await {
					return ReadEnd::Cancelled;
				}
			}
			Err(e) => {
				failures += 1;
				warn!("scroll tick failed ({failures}/{}): {e}", policy.failure_ceiling);
				if failures >= policy.failure_ceiling {
					return ReadEnd::Abandoned;
				}
				progress.stuck = 0;
				if !session.pause(owner, policy.restart_ms).await {
					return ReadEnd::Cancelled;
				}
			}
		}
	}
}

async fn tick<S: Surface>(surface: &S, containers: Containers, progress: &mut ScrollProgress, speed: f64, policy: &ScrollPolicy) -> Result<Option<CompletionReason>> {
	let container = match containers {
		Containers::Fixed(c) => c,
		Containers::Refind => scroll_container::find_for_document(surface).await?,
	};
	let doc = surface.scroll_metrics(ScrollTarget::Document).await?;
	let inner = match container {
		Some(c) => surface.scroll_metrics(ScrollTarget::Element(c.handle)).await.ok().map(|m| (c, m)),
		None => None,
	};
	let (inner_height, inner_top) = inner.map(|(_, m)| (m.height, m.top)).unwrap_or_default();
	progress.observe(doc.height + inner_height, doc.top + inner_top);

	let bottom = is_at_bottom(doc, inner.map(|(c, m)| (m, c.viewer)), progress.attempts, policy);
	if progress.attempts % 10 == 1 || bottom {
		debug!(attempts = progress.attempts, stuck = progress.stuck, doc_top = doc.top, doc_height = doc.height, ?inner, bottom, "scroll tick");
	}
	match decide(progress, bottom, speed, policy) {
		TickDecision::Complete(reason) => Ok(Some(reason)),
		TickDecision::Scroll { step, jump } => {
			if let Some((c, m)) = inner
				&& m.scrollable() > policy.visible_slack
			{
				advance(surface, ScrollTarget::Element(c.handle), m, step, jump).await?;
			}
			if doc.scrollable() > policy.visible_slack && doc.distance_from_bottom() > 1.0 {
				advance(surface, ScrollTarget::Document, doc, step, jump).await?;
			}
			Ok(None)
		}
	}
}

async fn advance<S: Surface>(surface: &S, target: ScrollTarget, metrics: ScrollMetrics, step: f64, jump: bool) -> Result<()> {
	if jump {
		surface.scroll_to(target, metrics.height).await
	} else {
		surface.scroll_by(target, step).await
	}
}
