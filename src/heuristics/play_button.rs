use color_eyre::Result;

use super::{Candidate, TieBreak, best};
use crate::surface::{ElementInfo, Frame, Surface, VideoState, Viewport};

/// Big-play overlays of common web players.
pub const VENDOR: &str = concat!(
	".vjs-big-play-button, .vjs-play-control, .prism-big-play-btn, .xgplayer-start, .xgplayer-play, ",
	".dplayer-mobile-play, .dplayer-play-icon, .plyr__control--overlaid, .ytp-large-play-button, .jw-icon-playback, ",
	".mejs__overlay-button, .bilibili-player-video-btn-start, .ccH5playerBtn, .tcp-vod-play"
);

pub const GENERIC: &str = concat!(
	r#".play-btn, .video-play-btn, .btn-play, .play-button, .play-icon, button[title*="播放"], button[title*="Play"], "#,
	r#"[aria-label*="播放"], [aria-label*="Play"], [aria-label*="play"], [class*="play"]"#
);

/// How far up from the video a player wrapper is looked for.
pub const ANCESTOR_DEPTH: usize = 4;

#[derive(Clone, Debug, Default)]
pub struct PlayScan {
	pub video: VideoState,
	pub viewport: Viewport,
	pub near_vendor: Vec<ElementInfo>,
	pub near_generic: Vec<ElementInfo>,
	pub vendor: Vec<ElementInfo>,
	pub generic: Vec<ElementInfo>,
	pub under_center: Option<ElementInfo>,
}

pub async fn scan<S: Surface + ?Sized>(surface: &S, video: &VideoState) -> Result<PlayScan> {
	let viewport = surface.viewport().await?;
	// querying the outermost wrapper covers the nearer ones
	let wrapper = surface.ancestors(video.handle, ANCESTOR_DEPTH).await?.pop();
	let (near_vendor, near_generic) = match &wrapper {
		Some(w) => (surface.query_within(w.handle, VENDOR).await?, surface.query_within(w.handle, GENERIC).await?),
		None => Default::default(),
	};
	let vendor = surface.query(Frame::Main, VENDOR).await?;
	let generic = surface.query(Frame::Main, GENERIC).await?;
	let (x, y) = video.rect.center();
	let under_center = surface.element_at(x, y).await?;
	Ok(PlayScan { video: video.clone(), viewport, near_vendor, near_generic, vendor, generic, under_center })
}

/// Loose acceptance: anything visible, on screen, enabled, and smaller than the video it belongs to.
fn acceptable(el: &ElementInfo, scan: &PlayScan) -> bool {
	let video_area = scan.video.rect.area();
	el.handle != scan.video.handle
		&& el.displayed
		&& el.rect.has_size()
		&& el.rect.intersects(scan.viewport)
		&& !el.disabled
		&& (video_area <= 0.0 || el.rect.area() < video_area)
}

pub fn candidates(scan: &PlayScan) -> Vec<Candidate> {
	let tiers: [(&[ElementInfo], u32, &str); 4] = [(&scan.near_vendor, 90, "player"), (&scan.near_generic, 70, "player-generic"), (&scan.vendor, 60, "vendor"), (&scan.generic, 40, "generic")];
	let mut out: Vec<Candidate> = tiers
		.into_iter()
		.flat_map(|(els, priority, source)| els.iter().filter(|el| acceptable(el, scan)).map(move |el| Candidate::of(el, priority, source)))
		.collect();
	if let Some(el) = scan.under_center.as_ref().filter(|el| acceptable(el, scan)) {
		out.push(Candidate::of(el, 20, "center"));
	}
	out
}

pub fn select(scan: &PlayScan) -> Option<Candidate> {
	best(candidates(scan), TieBreak::FoundFirst)
}

pub async fn find<S: Surface + ?Sized>(surface: &S, video: &VideoState) -> Result<Option<Candidate>> {
	Ok(select(&scan(surface, video).await?))
}
