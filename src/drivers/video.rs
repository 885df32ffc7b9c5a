use std::collections::HashMap;

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use super::DriveOutcome;
use crate::{
	config::tunable,
	heuristics::play_button,
	session::Session,
	state::Owner,
	surface::{ElementRef, Surface, ToastLevel, VideoState},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoPolicy {
	/// Head start for third-party players to finish initializing
	pub init_delay_ms: u64,
	pub poll_ms: u64,
	/// Remaining seconds at which a video counts as finished
	pub end_epsilon: f64,
	pub rate_tolerance: f64,
	/// Quiet period after everything finished, so the host can record progress
	pub settle_ms: u64,
	/// Delay between settling and looking for the next button
	pub handoff_ms: u64,
	/// Empty polls before a page without any player is given up on
	pub player_wait_polls: u32,
	/// Hard ceiling on watch time, in polls
	pub max_polls: u32,
	/// `HAVE_CURRENT_DATA`
	pub min_ready_state: u32,
}

impl Default for VideoPolicy {
	fn default() -> Self {
		Self {
			init_delay_ms: 1500,
			poll_ms: 2000,
			end_epsilon: 2.0,
			rate_tolerance: 0.1,
			settle_ms: 5000,
			handoff_ms: 2000,
			player_wait_polls: 10,
			max_polls: 10_800,
			min_ready_state: 2,
		}
	}
}

tunable!(VideoPolicy; init_delay_ms, poll_ms, end_epsilon, rate_tolerance, settle_ms, handoff_ms, player_wait_polls, max_polls, min_ready_state);

pub fn is_finished(v: &VideoState, epsilon: f64) -> bool {
	let remaining = v.duration - v.current_time;
	v.ended || v.ended_seen || (v.duration.is_finite() && v.duration > 0.0 && v.current_time > 0.0 && remaining <= epsilon)
}

pub fn needs_tuning(v: &VideoState, rate: f64, tolerance: f64) -> bool {
	!v.muted || (v.playback_rate - rate).abs() > tolerance
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Settle {
	Watching,
	Settling { remaining: Duration },
	Done,
}

/// Tracks the quiet period after every video finished. Any regression starts it over.
#[derive(Clone, Copy, Debug, Default)]
pub struct SettleClock {
	since: Option<Instant>,
}

impl SettleClock {
	pub fn observe(&mut self, all_finished: bool, now: Instant, period: Duration) -> Settle {
		if !all_finished {
			if self.since.take().is_some() {
				debug!("video regressed while settling, starting over");
			}
			return Settle::Watching;
		}
		let since = *self.since.get_or_insert(now);
		match period.checked_sub(now.duration_since(since)) {
			Some(remaining) if !remaining.is_zero() => Settle::Settling { remaining },
			_ => Settle::Done,
		}
	}
}

pub async fn run<S: Surface>(session: &Session<S>) -> Result<DriveOutcome> {
	let policy = session.config().policy.video;
	session.force_notify(format!("Video detected, muting and playing at {}x", session.config().video_speed), ToastLevel::Info).await;
	if !session.pause(Owner::Video, policy.init_delay_ms).await {
		return Ok(DriveOutcome::Cancelled);
	}

	let mut clock = SettleClock::default();
	let mut empty_polls = 0;
	let mut play_attempts: HashMap<ElementRef, u32> = HashMap::new();
	for _ in 0..policy.max_polls {
		let speed = session.config().video_speed;
		let videos: Vec<VideoState> = session.surface.videos().await?.into_iter().filter(|v| v.visible).collect();

		if videos.is_empty() {
			empty_polls += 1;
			if empty_polls >= policy.player_wait_polls {
				session.notify("No video player showed up, moving on", ToastLevel::Warning).await;
				return Ok(DriveOutcome::Completed);
			}
			if !session.pause(Owner::Video, policy.poll_ms).await {
				return Ok(DriveOutcome::Cancelled);
			}
			continue;
		}
		empty_polls = 0;

		let mut all_finished = true;
		for v in &videos {
			if needs_tuning(v, speed, policy.rate_tolerance)
				&& let Err(e) = session.surface.tune_video(v.handle, true, speed).await
			{
				debug!("could not tune video {:?}: {e}", v.handle);
			}
			if is_finished(v, policy.end_epsilon) {
				continue;
			}
			all_finished = false;
			if v.paused && u32::from(v.ready_state) >= policy.min_ready_state {
				let attempt = play_attempts.entry(v.handle).or_default();
				start_playback(session, v, *attempt).await?;
				*attempt += 1;
			}
		}

		let wait = match clock.observe(all_finished, Instant::now(), Duration::from_millis(policy.settle_ms)) {
			Settle::Done => {
				session.force_notify("Video finished", ToastLevel::Success).await;
				return Ok(DriveOutcome::Completed);
			}
			Settle::Settling { remaining } => remaining.min(Duration::from_millis(policy.poll_ms)),
			Settle::Watching => Duration::from_millis(policy.poll_ms),
		};
		if !session.pause(Owner::Video, wait.as_millis() as u64).await {
			return Ok(DriveOutcome::Cancelled);
		}
	}
	session.notify("Watch time ceiling reached, moving on", ToastLevel::Warning).await;
	Ok(DriveOutcome::Completed)
}

/// Alternates between the player's own play control and `play()`, since either can be a dud on a given player.
async fn start_playback<S: Surface>(session: &Session<S>, video: &VideoState, attempt: u32) -> Result<()> {
	if attempt % 2 == 0
		&& let Some(button) = play_button::find(&*session.surface, video).await?
	{
		debug!(source = %button.source, "clicking play control");
		match session.surface.click(button.element).await {
			Ok(()) => return Ok(()),
			Err(e) => debug!("play control refused the click: {e}"),
		}
	}
	if let Err(e) = session.surface.play_video(video.handle).await {
		warn!("play() rejected: {e}");
		session.notify("Playback was blocked, click play on the video", ToastLevel::Warning).await;
	}
	Ok(())
}
