//! Top-level run loop: classify the page, drive it to completion, hand over to navigation, repeat.
//!
//! The controller owns the one task that acts on the page. Starting spawns it, stopping resets the shared state
//! (so every driver sees it lost ownership) and aborts it.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use color_eyre::Result;
use serde::Serialize;
use serde_json::Value;
use tokio::{
	task::JoinHandle,
	time::{Duration, sleep},
};
use tracing::{debug, info};
use v_utils::{elog, log};

use crate::{
	PageType, classifier,
	diagnostics::{self, DebugReport},
	drivers::{self, DriveOutcome},
	navigation::{self, NavOutcome},
	session::Session,
	state::{Owner, RunState},
	surface::{ScrollTarget, Surface, ToastLevel},
};

/// Consecutive failed cycles before the run is given up.
const ERROR_CEILING: u32 = 3;
const ERROR_RESTART_MS: u64 = 3000;
/// Hand-off for a page that needed no scrolling at all.
const VISIBLE_HANDOFF_MS: u64 = 1000;
/// Lets the stopped run drain before a forced one starts.
const FORCE_RESTART_MS: u64 = 500;

/// Messages from the shell.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
	Toggle,
	GetStatus,
	/// Replaces the whole configuration; the payload is repaired first.
	UpdateConfig(Value),
	/// Dump what the engine currently sees
	Debug,
	/// Restart with the first page driven as the given type, skipping classification
	ForceStart(PageType),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Response {
	pub running: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub debug: Option<DebugReport>,
}

impl Response {
	pub fn status(running: bool) -> Self {
		Self { running, debug: None }
	}
}

/// Told about every run-state change. Best effort: must not block.
pub trait StatusSink: Send + Sync {
	fn status_changed(&self, running: bool);
}

/// Blocking yes/no question to the user.
#[async_trait]
pub trait Prompt: Send + Sync {
	async fn confirm(&self, question: &str) -> bool;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CycleEnd {
	Advanced,
	/// Same page again, from classification
	Restart,
	Stopped(String),
	Cancelled,
}

/// One classify, dispatch, drive, hand-off and navigate pass over the current page. `forced` replaces classification.
pub async fn run_cycle<S: Surface>(session: &Session<S>, forced: Option<PageType>) -> Result<CycleEnd> {
	if !session.state.is_running() {
		return Ok(CycleEnd::Cancelled);
	}
	let config = session.config();
	let mut page_type = match forced {
		Some(page_type) => {
			session.force_notify(format!("Forced {page_type} page"), ToastLevel::Info).await;
			page_type
		}
		None => {
			let page_type = classifier::classify(&*session.surface, &config).await?.page_type;
			session.force_notify(format!("Detected {page_type} page"), ToastLevel::Info).await;
			page_type
		}
	};

	let outcome = loop {
		session.state.dispatch(page_type);
		match drivers::drive(session, page_type).await? {
			DriveOutcome::Degraded(next) => {
				info!(from = %page_type, to = %next, "driver degraded");
				page_type = next;
			}
			DriveOutcome::Cancelled => return Ok(CycleEnd::Cancelled),
			done => break done,
		}
	};

	let handoff = match outcome {
		DriveOutcome::AlreadyVisible => VISIBLE_HANDOFF_MS,
		_ if page_type == PageType::Video => config.policy.video.handoff_ms,
		_ => config.wait_at_bottom,
	};
	session.state.update(RunState::begin_navigation);
	if !session.pause(Owner::Navigation, handoff).await {
		return Ok(CycleEnd::Cancelled);
	}
	if !config.auto_click_next {
		return Ok(CycleEnd::Stopped("Page done, auto-advance is off".into()));
	}
	Ok(match navigation::advance(session).await? {
		NavOutcome::Advanced => CycleEnd::Advanced,
		NavOutcome::Restart => CycleEnd::Restart,
		NavOutcome::Stop(reason) => CycleEnd::Stopped(reason),
		NavOutcome::Cancelled => CycleEnd::Cancelled,
	})
}

/// Cycles until stopped from outside, stopped by navigation, or failing too often in a row.
/// `first` overrides the page type of the first cycle only.
pub async fn run<S: Surface>(session: Arc<Session<S>>, mut first: Option<PageType>) {
	let mut errors = 0;
	while session.state.is_running() {
		match run_cycle(&session, first.take()).await {
			Ok(CycleEnd::Advanced) => {
				errors = 0;
				let settle = session.config().policy.navigation.page_loaded_ms;
				if !session.pause(Owner::Navigation, settle).await {
					return;
				}
				session.state.update(RunState::end_navigation);
				if let Err(e) = session.surface.scroll_to(ScrollTarget::Document, 0.0).await {
					debug!("could not scroll the new page to the top: {e}");
				}
				log!("New page: {}", session.surface.url().await.unwrap_or_default());
			}
			Ok(CycleEnd::Restart) => {
				errors = 0;
				session.state.update(RunState::end_navigation);
				log!("Going over the current page again");
			}
			Ok(CycleEnd::Stopped(reason)) => {
				session.halt(&reason, ToastLevel::Info).await;
				return;
			}
			Ok(CycleEnd::Cancelled) => return,
			Err(e) => {
				errors += 1;
				elog!("Cycle failed ({errors}/{ERROR_CEILING}): {e}");
				if errors >= ERROR_CEILING {
					session.halt("Stopped after repeated errors", ToastLevel::Error).await;
					return;
				}
				sleep(Duration::from_millis(ERROR_RESTART_MS)).await;
			}
		}
	}
}

pub struct Controller<S> {
	session: Arc<Session<S>>,
	task: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Surface + 'static> Controller<S> {
	pub fn new(session: Session<S>) -> Self {
		Self { session: Arc::new(session), task: Mutex::new(None) }
	}

	pub fn session(&self) -> &Session<S> {
		&self.session
	}

	fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
		match self.task.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		}
	}

	pub fn is_running(&self) -> bool {
		self.session.state.is_running()
	}

	/// No-op when already running.
	pub async fn start(&self) {
		if self.is_running() {
			return;
		}
		self.launch(None).await;
	}

	/// Stops whatever runs, then starts over treating the current page as `page_type`.
	pub async fn force_start(&self, page_type: PageType) {
		if self.is_running() {
			self.stop().await;
		}
		sleep(Duration::from_millis(FORCE_RESTART_MS)).await;
		self.launch(Some(page_type)).await;
	}

	async fn launch(&self, first: Option<PageType>) {
		self.session.state.update(RunState::start);
		self.session.sink.status_changed(true);
		self.session.force_notify("Auto-study started", ToastLevel::Success).await;
		let handle = tokio::spawn(run(Arc::clone(&self.session), first));
		if let Some(previous) = self.task().replace(handle) {
			previous.abort();
		}
	}

	pub async fn stop(&self) {
		self.session.state.update(RunState::reset);
		if let Some(task) = self.task().take() {
			task.abort();
		}
		self.session.force_notify("Auto-study stopped", ToastLevel::Info).await;
		self.session.sink.status_changed(false);
	}

	/// Returns the new running flag.
	pub async fn toggle(&self) -> bool {
		match self.is_running() {
			true => self.stop().await,
			false => self.start().await,
		}
		self.is_running()
	}

	pub async fn handle(&self, command: Command) -> Response {
		match command {
			Command::Toggle => Response::status(self.toggle().await),
			Command::GetStatus => Response::status(self.is_running()),
			Command::UpdateConfig(raw) => {
				let config = self.session.config.replace(&raw);
				debug!(?config, "config replaced");
				Response::status(self.is_running())
			}
			Command::Debug => match diagnostics::report(&*self.session).await {
				Ok(report) => Response { running: self.is_running(), debug: Some(report) },
				Err(e) => {
					elog!("Could not inspect the page: {e}");
					Response::status(self.is_running())
				}
			},
			Command::ForceStart(page_type) => {
				self.force_start(page_type).await;
				Response::status(self.is_running())
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use tokio::time::Instant;

	use super::*;
	use crate::{
		fake::{Event, FakeElement, FakePage, World, session_with},
		surface::{ElementRef, ScrollMetrics},
	};

	async fn until_stopped(controller: &Controller<FakePage>) {
		for _ in 0..1000 {
			if !controller.is_running() {
				return;
			}
			sleep(Duration::from_secs(1)).await;
		}
		panic!("run never stopped");
	}

	fn next_button(id: u32, text: &str) -> FakeElement {
		FakeElement::new(id, "button").text(text).rect(600.0, 700.0, 90.0, 32.0)
	}

	fn click_at(timeline: &[(Instant, Event)], id: u32) -> Instant {
		timeline.iter().find(|(_, e)| *e == Event::Click(ElementRef(id))).map(|(t, _)| *t).unwrap()
	}

	#[tokio::test(start_paused = true)]
	async fn text_page_waits_at_the_bottom_before_advancing() {
		let mut world = World {
			url: "https://lms.example.edu/course/1/page/1".into(),
			document: ScrollMetrics { top: 0.0, height: 3000.0, client: 800.0 },
			elements: vec![next_button(9, "Next")],
			..World::default()
		};
		world.on_click(9, |w| {
			w.url = "https://lms.example.edu/course/1/page/2".into();
			w.document = ScrollMetrics { top: 0.0, height: 800.0, client: 800.0 };
			w.element_mut(9).present = false;
		});
		let (session, page) = session_with(world);
		let controller = Controller::new(session);
		controller.start().await;
		until_stopped(&controller).await;

		let world = page.world();
		assert_eq!(world.clicks_on(9), 1);
		let timeline = world.timeline();
		let clicked = click_at(timeline, 9);
		let last_scroll = timeline.iter().filter(|(t, e)| matches!(e, Event::Scroll(ScrollTarget::Document, _)) && *t < clicked).map(|(t, _)| *t).max().unwrap();
		assert!(clicked.duration_since(last_scroll) >= Duration::from_millis(3000), "clicked {:?} after the last scroll", clicked.duration_since(last_scroll));
		// page 2 has no next button: the user was asked once and said no
		assert_eq!(world.asked.len(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn file_list_is_finished_before_the_single_next_click() {
		let mut elements: Vec<FakeElement> = (0..3u32).map(|i| FakeElement::new(10 + i, "a").text("查看").rect(100.0, 100.0 + 40.0 * f64::from(i), 60.0, 24.0)).collect();
		elements.push(FakeElement::new(20, "button").class("close").selectors(&[".close"]).rect(1200.0, 20.0, 24.0, 24.0).absent());
		elements.push(next_button(30, "下一页"));
		let mut world = World { url: "https://lms.example.edu/course/2/files".into(), elements, ..World::default() };
		for i in 0..3u32 {
			world.on_click(10 + i, |w| w.element_mut(20).present = true);
		}
		world.on_click(20, |w| w.element_mut(20).present = false);
		world.on_click(30, |w| {
			w.url = "https://lms.example.edu/course/2/next".into();
			for id in [10, 11, 12, 30] {
				w.element_mut(id).present = false;
			}
		});

		let (session, page) = session_with(world);
		let controller = Controller::new(session);
		controller.start().await;
		until_stopped(&controller).await;

		let clicks: Vec<u32> = page.world().clicked().into_iter().map(|r| r.0).collect();
		assert_eq!(clicks, vec![10, 20, 11, 20, 12, 20, 30]);
	}

	#[tokio::test(start_paused = true)]
	async fn auto_advance_off_stops_after_the_page() {
		let world = World { elements: vec![next_button(9, "Next")], ..World::default() };
		let (session, page) = session_with(world);
		session.config.replace(&json!({ "autoClickNext": false }));
		let controller = Controller::new(session);
		controller.start().await;
		until_stopped(&controller).await;
		assert_eq!(page.world().clicks_on(9), 0);
		assert_eq!(controller.session().state.snapshot(), RunState::default());
	}

	#[tokio::test(start_paused = true)]
	async fn commands_toggle_report_and_replace_config() {
		let world = World { document: ScrollMetrics { top: 0.0, height: 50_000.0, client: 800.0 }, ..World::default() };
		let (session, _) = session_with(world);
		let controller = Controller::new(session);

		assert_eq!(controller.handle(Command::GetStatus).await, Response::status(false));
		assert_eq!(controller.handle(Command::Toggle).await, Response::status(true));
		sleep(Duration::from_secs(5)).await;
		assert!(controller.session().state.snapshot().scrolling);

		assert_eq!(controller.handle(Command::Toggle).await, Response::status(false));
		assert_eq!(controller.session().state.snapshot(), RunState::default());

		let response = controller.handle(Command::UpdateConfig(json!({ "scrollSpeed": 150, "videoSpeed": -1 }))).await;
		assert!(!response.running);
		let config = controller.session().config();
		assert_eq!(config.scroll_speed, 150);
		assert_eq!(config.video_speed, 2.0);
	}

	#[tokio::test(start_paused = true)]
	async fn forced_video_skips_classification_on_the_first_page() {
		let mut world = World { elements: vec![next_button(9, "Next")], ..World::default() };
		world.on_click(9, |w| {
			w.url = "https://lms.example.edu/course/1/page/2".into();
			w.element_mut(9).present = false;
		});
		let (session, page) = session_with(world);
		let controller = Controller::new(session);
		let forced_at = Instant::now();
		assert_eq!(controller.handle(Command::ForceStart(PageType::Video)).await, Response::status(true));
		until_stopped(&controller).await;

		let world = page.world();
		// restart pause, player init, empty polls, hand-off, scroll into view
		assert_eq!(click_at(world.timeline(), 9).duration_since(forced_at), Duration::from_millis(500 + 1500 + 9 * 2000 + 2000 + 500));
		let toasts: Vec<&str> = world.toasts.iter().map(|(m, _)| m.as_str()).collect();
		assert!(toasts.contains(&"Forced video page"), "{toasts:?}");
		assert!(toasts.iter().any(|m| m.starts_with("Video detected")));
		// only the second page went through the classifier
		assert_eq!(toasts.iter().filter(|m| m.starts_with("Detected")).count(), 1, "{toasts:?}");
	}

	#[tokio::test(start_paused = true)]
	async fn debug_reports_without_starting() {
		let world = World { document: ScrollMetrics { top: 0.0, height: 1800.0, client: 800.0 }, elements: vec![next_button(9, "Next")], ..World::default() };
		let (session, page) = session_with(world);
		let controller = Controller::new(session);
		let response = controller.handle(Command::Debug).await;
		assert!(!response.running);
		let report = response.debug.unwrap();
		assert_eq!(report.detected, PageType::Text);
		assert_eq!(report.next_button.map(|c| c.element), Some(ElementRef(9)));
		assert_eq!(report.scroll_percent, 0.0);
		assert!(page.world().timeline().is_empty());

		let json = serde_json::to_value(controller.handle(Command::GetStatus).await).unwrap();
		assert_eq!(json, json!({ "running": false }));
	}
}
