//! The single seam between the engine and a live page.
//!
//! Everything the heuristics and drivers know about the page arrives as a plain snapshot (`ElementInfo`, `ScrollMetrics`, `VideoState`),
//! and every side effect goes out through an `ElementRef`. Refs are only meaningful until the next navigation.

use async_trait::async_trait;
use color_eyre::Result;
use serde::{Deserialize, Serialize};

/// Opaque handle into the page-side element registry.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ElementRef(pub u32);

/// Which document a query runs against. Child frames are indexed in `document.querySelectorAll('iframe')` order.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Frame {
	#[default]
	Main,
	Child(u32),
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
pub struct Rect {
	pub left: f64,
	pub top: f64,
	pub width: f64,
	pub height: f64,
}

impl Rect {
	pub fn right(&self) -> f64 {
		self.left + self.width
	}

	pub fn bottom(&self) -> f64 {
		self.top + self.height
	}

	pub fn area(&self) -> f64 {
		self.width * self.height
	}

	pub fn center(&self) -> (f64, f64) {
		(self.left + self.width / 2.0, self.top + self.height / 2.0)
	}

	pub fn has_size(&self) -> bool {
		self.width > 0.0 && self.height > 0.0
	}

	pub fn intersects(&self, viewport: Viewport) -> bool {
		self.right() > 0.0 && self.bottom() > 0.0 && self.left < viewport.width && self.top < viewport.height
	}
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
pub struct Viewport {
	pub width: f64,
	pub height: f64,
}

/// `scrollTop` / `scrollHeight` / `clientHeight` of a document or element.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ScrollMetrics {
	pub top: f64,
	pub height: f64,
	pub client: f64,
}

impl ScrollMetrics {
	/// How far the target can scroll at all.
	pub fn scrollable(&self) -> f64 {
		(self.height - self.client).max(0.0)
	}

	pub fn distance_from_bottom(&self) -> f64 {
		self.height - (self.top + self.client)
	}

	/// Position as a percentage of the scrollable range; a non-scrollable target is at 100.
	pub fn percent(&self) -> f64 {
		match self.scrollable() {
			s if s > 0.0 => self.top / s * 100.0,
			_ => 100.0,
		}
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScrollTarget {
	Document,
	Element(ElementRef),
}

/// Snapshot of one element, taken page-side in a single round trip.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementInfo {
	pub handle: ElementRef,
	/// Lowercase tag name
	pub tag: String,
	#[serde(rename = "id")]
	pub element_id: String,
	pub class_name: String,
	/// Trimmed `textContent`, truncated page-side
	pub text: String,
	pub title: String,
	pub aria_label: String,
	/// `getAttribute('href')` as written in markup
	pub href: String,
	/// Resolved absolute href, empty for non-links
	pub resolved_href: String,
	pub src: String,
	pub name: String,
	pub role: String,
	pub data_action: String,
	pub value: String,
	pub disabled: bool,
	pub attached: bool,
	/// Computed `display != none && visibility != hidden`
	pub displayed: bool,
	/// Computed opacity is exactly zero
	pub transparent: bool,
	pub has_offset_parent: bool,
	pub has_onclick: bool,
	pub cursor_pointer: bool,
	pub overflow_y: String,
	pub rect: Rect,
	pub scroll: ScrollMetrics,
}

impl ElementInfo {
	pub fn has_class(&self, class: &str) -> bool {
		self.class_name.split_whitespace().any(|c| c == class)
	}

	/// Class and id, lowercased, for keyword heuristics.
	pub fn class_and_id(&self) -> (String, String) {
		(self.class_name.to_lowercase(), self.element_id.to_lowercase())
	}

	/// Tags and attributes that make an element a plausible click target.
	pub fn is_clickable(&self) -> bool {
		matches!(self.tag.as_str(), "a" | "button") || self.role == "button" || self.has_onclick || self.cursor_pointer
	}
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrameInfo {
	pub index: u32,
	pub src: String,
	/// Same-origin and readable. Cross-origin frames are listed but never queried.
	pub accessible: bool,
	pub element: ElementInfo,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoState {
	pub handle: ElementRef,
	pub paused: bool,
	pub ended: bool,
	/// An `ended` event has fired on this element since it was first seen.
	pub ended_seen: bool,
	pub muted: bool,
	pub playback_rate: f64,
	pub current_time: f64,
	pub duration: f64,
	pub ready_state: u8,
	pub visible: bool,
	pub rect: Rect,
}

/// Media events after which an earlier `ended` stops counting: the element is loading or playing something again.
pub const ENDED_RESET_EVENTS: [&str; 3] = ["playing", "loadstart", "emptied"];

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ToastLevel {
	#[default]
	Info,
	Success,
	Warning,
	Error,
}

impl ToastLevel {
	pub fn color(&self) -> &'static str {
		match self {
			ToastLevel::Success => "#4CAF50",
			ToastLevel::Warning => "#FF9800",
			ToastLevel::Error => "#f44336",
			ToastLevel::Info => "#2196F3",
		}
	}
}

/// Live page access. Implementations never panic on a vanished element; they return `Ok(None)`, an empty list, or an `Err` the caller can degrade on.
#[async_trait]
pub trait Surface: Send + Sync {
	async fn url(&self) -> Result<String>;
	async fn title(&self) -> Result<String>;
	async fn ready_state(&self) -> Result<String>;
	async fn viewport(&self) -> Result<Viewport>;

	/// `querySelectorAll` in the given document. An inaccessible frame yields an empty list.
	async fn query(&self, frame: Frame, selector: &str) -> Result<Vec<ElementInfo>>;
	async fn query_within(&self, scope: ElementRef, selector: &str) -> Result<Vec<ElementInfo>>;
	/// Ancestors of `el`, nearest first, at most `depth` of them.
	async fn ancestors(&self, el: ElementRef, depth: usize) -> Result<Vec<ElementInfo>>;
	async fn element_at(&self, x: f64, y: f64) -> Result<Option<ElementInfo>>;
	/// Fresh snapshot of a previously located element, `None` once it left the registry.
	async fn inspect(&self, el: ElementRef) -> Result<Option<ElementInfo>>;
	/// Elements with `scrollHeight > clientHeight` and `overflow-y: auto|scroll`.
	async fn scrollables(&self, frame: Frame) -> Result<Vec<ElementInfo>>;
	async fn frames(&self) -> Result<Vec<FrameInfo>>;

	async fn scroll_metrics(&self, target: ScrollTarget) -> Result<ScrollMetrics>;
	async fn scroll_by(&self, target: ScrollTarget, dy: f64) -> Result<()>;
	async fn scroll_to(&self, target: ScrollTarget, top: f64) -> Result<()>;
	async fn scroll_into_view(&self, el: ElementRef) -> Result<()>;

	/// Dispatches a click. `Err` means the page refused it.
	async fn click(&self, el: ElementRef) -> Result<()>;
	async fn press_escape(&self) -> Result<()>;

	async fn videos(&self) -> Result<Vec<VideoState>>;
	async fn tune_video(&self, el: ElementRef, muted: bool, rate: f64) -> Result<()>;
	/// Calls `play()`. `Err` carries the rejection (usually an autoplay policy).
	async fn play_video(&self, el: ElementRef) -> Result<()>;

	async fn toast(&self, message: &str, level: ToastLevel) -> Result<()>;
	async fn outer_html(&self) -> Result<String>;
}

/// Same-origin child frames, as queryable `Frame`s.
pub async fn accessible_frames<S: Surface + ?Sized>(surface: &S) -> Result<Vec<Frame>> {
	Ok(surface.frames().await?.into_iter().filter(|f| f.accessible).map(|f| Frame::Child(f.index)).collect())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn percent_of_unscrollable_target_is_full() {
		let m = ScrollMetrics { top: 0.0, height: 600.0, client: 800.0 };
		assert_eq!(m.percent(), 100.0);
		assert_eq!(m.scrollable(), 0.0);
	}

	#[test]
	fn percent_tracks_scrollable_range() {
		let m = ScrollMetrics { top: 2100.0, height: 5000.0, client: 800.0 };
		assert_eq!(m.percent(), 50.0);
		assert_eq!(m.distance_from_bottom(), 2100.0);
	}

	#[test]
	fn element_info_parses_page_snapshot() {
		let raw = serde_json::json!({
			"handle": 7,
			"tag": "a",
			"id": "nextBtn",
			"className": "btn next disabled",
			"text": "下一页",
			"rect": { "left": 10.0, "top": 20.0, "width": 80.0, "height": 30.0 },
			"hasOffsetParent": true
		});
		let info: ElementInfo = serde_json::from_value(raw).unwrap();
		assert_eq!(info.handle, ElementRef(7));
		assert_eq!(info.element_id, "nextBtn");
		assert!(info.has_class("disabled"));
		assert!(!info.has_class("dis"));
		assert!(info.is_clickable());
		assert_eq!(info.rect.right(), 90.0);
		assert!(!info.attached);
	}
}
