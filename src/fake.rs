//! Scripted in-memory page for driver tests.
//!
//! Selector matching is deliberately dumb: a query is split on commas and an element matches when one part equals its tag
//! or one of the selectors it was declared with. Videos play on the tokio clock, so paused-time tests see them progress.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use color_eyre::{Result, eyre::eyre};
use tokio::time::Instant;

use crate::{
	config::{Config, ConfigHandle},
	controller::{Prompt, StatusSink},
	session::Session,
	surface::{ENDED_RESET_EVENTS, ElementInfo, ElementRef, Frame, FrameInfo, Rect, ScrollMetrics, ScrollTarget, Surface, ToastLevel, VideoState, Viewport},
};

type Hook = Box<dyn FnMut(&mut World) + Send>;

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
	Click(ElementRef),
	/// The page refused the click
	ClickRejected(ElementRef),
	Escape,
	/// Target and its `top` after the move
	Scroll(ScrollTarget, f64),
	Play(ElementRef),
}

#[derive(Clone, Debug)]
pub struct FakeElement {
	pub info: ElementInfo,
	pub selectors: Vec<String>,
	pub frame: Frame,
	pub parent: Option<u32>,
	/// Listed in `scrollables`
	pub scrollable: bool,
	/// In the DOM right now; absent elements are invisible to every query
	pub present: bool,
}

impl FakeElement {
	pub fn new(id: u32, tag: &str) -> Self {
		let info = ElementInfo {
			handle: ElementRef(id),
			tag: tag.into(),
			attached: true,
			displayed: true,
			has_offset_parent: true,
			rect: Rect { left: 0.0, top: 0.0, width: 100.0, height: 30.0 },
			..Default::default()
		};
		Self { info, selectors: Vec::new(), frame: Frame::Main, parent: None, scrollable: false, present: true }
	}

	pub fn text(mut self, text: &str) -> Self {
		self.info.text = text.into();
		self
	}

	pub fn class(mut self, class: &str) -> Self {
		self.info.class_name = class.into();
		self
	}

	pub fn id(mut self, id: &str) -> Self {
		self.info.element_id = id.into();
		self
	}

	pub fn selectors(mut self, selectors: &[&str]) -> Self {
		self.selectors = selectors.iter().map(|s| s.to_string()).collect();
		self
	}

	pub fn rect(mut self, left: f64, top: f64, width: f64, height: f64) -> Self {
		self.info.rect = Rect { left, top, width, height };
		self
	}

	pub fn scroll(mut self, scroll: ScrollMetrics) -> Self {
		self.info.scroll = scroll;
		self
	}

	pub fn scrollable(mut self) -> Self {
		self.scrollable = true;
		self.info.overflow_y = "auto".into();
		self
	}

	pub fn inside(mut self, parent: u32) -> Self {
		self.parent = Some(parent);
		self
	}

	pub fn in_frame(mut self, frame: Frame) -> Self {
		self.frame = frame;
		self
	}

	pub fn absent(mut self) -> Self {
		self.present = false;
		self
	}

	fn matches(&self, selector: &str) -> bool {
		selector.split(',').map(str::trim).any(|part| part == self.info.tag || self.selectors.iter().any(|s| s == part))
	}
}

pub struct World {
	pub url: String,
	pub title: String,
	pub ready_state: String,
	pub viewport: Viewport,
	pub document: ScrollMetrics,
	pub elements: Vec<FakeElement>,
	pub videos: Vec<VideoState>,
	pub frames: Vec<FrameInfo>,
	pub html: String,
	/// Answers handed out to prompts in order; "no" once they run out
	pub answers: Vec<bool>,
	pub asked: Vec<String>,
	/// `play()` fails like an autoplay policy would
	pub play_rejects: bool,
	pub fail_clicks: bool,
	/// Scroll-metric reads that fail before they start answering again
	pub metrics_failures: u32,
	pub toasts: Vec<(String, ToastLevel)>,
	pub(crate) hooks: HashMap<u32, Hook>,
	pub(crate) timeline: Vec<(Instant, Event)>,
	pub(crate) queries: Vec<String>,
	pub(crate) tuned: Vec<Instant>,
	pub(crate) ended: Vec<Instant>,
	pub(crate) clock: Option<Instant>,
}

impl Default for World {
	fn default() -> Self {
		Self {
			url: "https://lms.example.edu/course/1/page/1".into(),
			title: String::new(),
			ready_state: "complete".into(),
			viewport: Viewport { width: 1280.0, height: 800.0 },
			document: ScrollMetrics { top: 0.0, height: 800.0, client: 800.0 },
			elements: Vec::new(),
			videos: Vec::new(),
			frames: Vec::new(),
			html: "<html><body></body></html>".into(),
			answers: Vec::new(),
			asked: Vec::new(),
			play_rejects: false,
			fail_clicks: false,
			metrics_failures: 0,
			toasts: Vec::new(),
			hooks: HashMap::new(),
			timeline: Vec::new(),
			queries: Vec::new(),
			tuned: Vec::new(),
			ended: Vec::new(),
			clock: None,
		}
	}
}

impl World {
	/// Runs `hook` after every successful click on element `id`.
	pub fn on_click(&mut self, id: u32, hook: impl FnMut(&mut World) + Send + 'static) {
		self.hooks.insert(id, Box::new(hook));
	}

	pub fn element(&self, id: u32) -> &FakeElement {
		self.elements.iter().find(|e| e.info.handle.0 == id).unwrap_or_else(|| panic!("no element {id}"))
	}

	pub fn element_mut(&mut self, id: u32) -> &mut FakeElement {
		self.elements.iter_mut().find(|e| e.info.handle.0 == id).unwrap_or_else(|| panic!("no element {id}"))
	}

	pub fn timeline(&self) -> &[(Instant, Event)] {
		&self.timeline
	}

	pub fn events(&self) -> Vec<Event> {
		self.timeline.iter().map(|(_, e)| e.clone()).collect()
	}

	/// Document `top` after every document scroll, in order.
	pub fn scroll_log(&self) -> Vec<f64> {
		self.timeline
			.iter()
			.filter_map(|(_, e)| match e {
				Event::Scroll(ScrollTarget::Document, top) => Some(*top),
				_ => None,
			})
			.collect()
	}

	/// Successful clicks, in order.
	pub fn clicked(&self) -> Vec<ElementRef> {
		self.timeline
			.iter()
			.filter_map(|(_, e)| match e {
				Event::Click(el) => Some(*el),
				_ => None,
			})
			.collect()
	}

	pub fn clicks_on(&self, id: u32) -> usize {
		self.clicked().into_iter().filter(|el| el.0 == id).count()
	}

	/// Clicks tried on `id`, including refused ones.
	pub fn click_attempts_on(&self, id: u32) -> usize {
		self.timeline.iter().filter(|(_, e)| matches!(e, Event::Click(el) | Event::ClickRejected(el) if el.0 == id)).count()
	}

	/// How many times exactly this selector string was queried.
	pub fn queries_of(&self, selector: &str) -> usize {
		self.queries.iter().filter(|q| *q == selector).count()
	}

	/// When `tune_video` was called, for any video.
	pub fn tuned_at(&self) -> Vec<Instant> {
		self.tuned.clone()
	}

	/// When each video reached its end, to the exact instant.
	pub fn ended_at(&self) -> Vec<Instant> {
		self.ended.clone()
	}

	fn record(&mut self, event: Event) {
		self.timeline.push((Instant::now(), event));
	}

	fn present(&self) -> impl Iterator<Item = &FakeElement> {
		self.elements.iter().filter(|e| e.present)
	}

	fn find(&self, el: ElementRef) -> Option<&FakeElement> {
		self.present().find(|e| e.info.handle == el)
	}

	fn find_mut(&mut self, el: ElementRef) -> Option<&mut FakeElement> {
		self.elements.iter_mut().find(|e| e.present && e.info.handle == el)
	}

	fn is_descendant(&self, el: &FakeElement, ancestor: u32) -> bool {
		let mut parent = el.parent;
		while let Some(id) = parent {
			if id == ancestor {
				return true;
			}
			parent = self.elements.iter().find(|e| e.info.handle.0 == id).and_then(|e| e.parent);
		}
		false
	}

	/// Plays every unpaused video forward to now.
	fn advance_videos(&mut self) {
		let now = Instant::now();
		let Some(last) = self.clock.replace(now) else {
			return;
		};
		let elapsed = now.duration_since(last).as_secs_f64();
		for v in self.videos.iter_mut().filter(|v| !v.paused && !v.ended) {
			let reached = v.current_time + elapsed * v.playback_rate;
			if v.duration.is_finite() && v.duration > 0.0 && reached >= v.duration {
				let to_end = (v.duration - v.current_time) / v.playback_rate;
				self.ended.push(last + std::time::Duration::from_secs_f64(to_end));
				v.current_time = v.duration;
				v.ended = true;
				v.ended_seen = true;
				v.paused = true;
			} else {
				v.current_time = reached;
			}
		}
	}

	/// Applies a media event to a video the way the page-side tracker does.
	pub fn media_event(&mut self, id: u32, event: &str) {
		if let Ok(v) = self.video_mut(ElementRef(id)) {
			if event == "ended" {
				v.ended_seen = true;
			} else if ENDED_RESET_EVENTS.contains(&event) {
				v.ended_seen = false;
			}
		}
	}

	fn video_mut(&mut self, el: ElementRef) -> Result<&mut VideoState> {
		self.videos.iter_mut().find(|v| v.handle == el).ok_or_else(|| eyre!("no video {el:?}"))
	}

	fn scroll(&mut self, target: ScrollTarget, top: impl FnOnce(f64) -> f64) -> Result<()> {
		let metrics = match target {
			ScrollTarget::Document => &mut self.document,
			ScrollTarget::Element(el) => &mut self.find_mut(el).ok_or_else(|| eyre!("scroll target {el:?} is gone"))?.info.scroll,
		};
		metrics.top = top(metrics.top).clamp(0.0, metrics.scrollable());
		let after = metrics.top;
		self.record(Event::Scroll(target, after));
		Ok(())
	}
}

#[derive(Clone, Default)]
pub struct FakePage(Arc<Mutex<World>>);

impl FakePage {
	pub fn new(world: World) -> Self {
		Self(Arc::new(Mutex::new(world)))
	}

	pub fn world(&self) -> MutexGuard<'_, World> {
		match self.0.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		}
	}

	/// A fresh clip starts in the same element: new duration, from zero, already playing. `events` are the media events
	/// the page gets to see along the way; without a reset event an earlier `ended` still counts.
	pub fn restart_video(&self, id: u32, duration: f64, events: &[&str]) {
		let mut world = self.world();
		world.advance_videos();
		if let Ok(v) = world.video_mut(ElementRef(id)) {
			v.duration = duration;
			v.current_time = 0.0;
			v.ended = false;
			v.paused = false;
		}
		for event in events {
			world.media_event(id, event);
		}
	}
}

#[async_trait]
impl Surface for FakePage {
	async fn url(&self) -> Result<String> {
		Ok(self.world().url.clone())
	}

	async fn title(&self) -> Result<String> {
		Ok(self.world().title.clone())
	}

	async fn ready_state(&self) -> Result<String> {
		Ok(self.world().ready_state.clone())
	}

	async fn viewport(&self) -> Result<Viewport> {
		Ok(self.world().viewport)
	}

	async fn query(&self, frame: Frame, selector: &str) -> Result<Vec<ElementInfo>> {
		let mut world = self.world();
		world.queries.push(selector.to_owned());
		Ok(world.present().filter(|e| e.frame == frame && e.matches(selector)).map(|e| e.info.clone()).collect())
	}

	async fn query_within(&self, scope: ElementRef, selector: &str) -> Result<Vec<ElementInfo>> {
		let mut world = self.world();
		world.queries.push(selector.to_owned());
		Ok(world.present().filter(|e| e.matches(selector) && world.is_descendant(e, scope.0)).map(|e| e.info.clone()).collect())
	}

	async fn ancestors(&self, el: ElementRef, depth: usize) -> Result<Vec<ElementInfo>> {
		let world = self.world();
		let mut out = Vec::new();
		let mut parent = world.find(el).and_then(|e| e.parent);
		while let Some(id) = parent
			&& out.len() < depth
		{
			let Some(p) = world.find(ElementRef(id)) else { break };
			out.push(p.info.clone());
			parent = p.parent;
		}
		Ok(out)
	}

	async fn element_at(&self, x: f64, y: f64) -> Result<Option<ElementInfo>> {
		let world = self.world();
		let hit = world.present().filter(|e| e.frame == Frame::Main && e.info.displayed).filter(|e| {
			let r = e.info.rect;
			x >= r.left && x < r.right() && y >= r.top && y < r.bottom()
		});
		Ok(hit.last().map(|e| e.info.clone()))
	}

	async fn inspect(&self, el: ElementRef) -> Result<Option<ElementInfo>> {
		Ok(self.world().find(el).map(|e| e.info.clone()))
	}

	async fn scrollables(&self, frame: Frame) -> Result<Vec<ElementInfo>> {
		let world = self.world();
		Ok(world.present().filter(|e| e.frame == frame && e.scrollable && e.info.scroll.height > e.info.scroll.client).map(|e| e.info.clone()).collect())
	}

	async fn frames(&self) -> Result<Vec<FrameInfo>> {
		Ok(self.world().frames.clone())
	}

	async fn scroll_metrics(&self, target: ScrollTarget) -> Result<ScrollMetrics> {
		let mut world = self.world();
		if world.metrics_failures > 0 {
			world.metrics_failures -= 1;
			return Err(eyre!("page did not answer"));
		}
		match target {
			ScrollTarget::Document => Ok(world.document),
			ScrollTarget::Element(el) => world.find(el).map(|e| e.info.scroll).ok_or_else(|| eyre!("scroll target {el:?} is gone")),
		}
	}

	async fn scroll_by(&self, target: ScrollTarget, dy: f64) -> Result<()> {
		self.world().scroll(target, |top| top + dy)
	}

	async fn scroll_to(&self, target: ScrollTarget, top: f64) -> Result<()> {
		self.world().scroll(target, |_| top)
	}

	async fn scroll_into_view(&self, el: ElementRef) -> Result<()> {
		self.world().find(el).map(|_| ()).ok_or_else(|| eyre!("{el:?} is gone"))
	}

	async fn click(&self, el: ElementRef) -> Result<()> {
		let mut world = self.world();
		if world.fail_clicks || world.find(el).is_none() {
			world.record(Event::ClickRejected(el));
			return Err(eyre!("click on {el:?} was refused"));
		}
		world.record(Event::Click(el));
		if let Some(mut hook) = world.hooks.remove(&el.0) {
			hook(&mut *world);
			world.hooks.insert(el.0, hook);
		}
		Ok(())
	}

	async fn press_escape(&self) -> Result<()> {
		self.world().record(Event::Escape);
		Ok(())
	}

	async fn videos(&self) -> Result<Vec<VideoState>> {
		let mut world = self.world();
		world.advance_videos();
		Ok(world.videos.clone())
	}

	async fn tune_video(&self, el: ElementRef, muted: bool, rate: f64) -> Result<()> {
		let mut world = self.world();
		world.advance_videos();
		let v = world.video_mut(el)?;
		v.muted = muted;
		v.playback_rate = rate;
		world.tuned.push(Instant::now());
		Ok(())
	}

	async fn play_video(&self, el: ElementRef) -> Result<()> {
		let mut world = self.world();
		world.advance_videos();
		if world.play_rejects {
			return Err(eyre!("NotAllowedError: play() failed because the user didn't interact with the document first"));
		}
		let v = world.video_mut(el)?;
		if v.ended {
			v.ended = false;
			v.current_time = 0.0;
		}
		v.paused = false;
		world.record(Event::Play(el));
		Ok(())
	}

	async fn toast(&self, message: &str, level: ToastLevel) -> Result<()> {
		self.world().toasts.push((message.to_owned(), level));
		Ok(())
	}

	async fn outer_html(&self) -> Result<String> {
		Ok(self.world().html.clone())
	}
}

/// Answers from `World::answers` and writes every question to `World::asked`.
struct FakePrompt(FakePage);

#[async_trait]
impl Prompt for FakePrompt {
	async fn confirm(&self, question: &str) -> bool {
		let mut world = self.0.world();
		world.asked.push(question.to_owned());
		match world.answers.is_empty() {
			true => false,
			false => world.answers.remove(0),
		}
	}
}

struct NullSink;

impl StatusSink for NullSink {
	fn status_changed(&self, _running: bool) {}
}

pub fn session_with(world: World) -> (Session<FakePage>, FakePage) {
	let page = FakePage::new(world);
	let session = Session::new(Arc::new(page.clone()), ConfigHandle::new(Config::default()), Arc::new(NullSink), Arc::new(FakePrompt(page.clone())));
	(session, page)
}
