//! Reading an opened document: page through it when the viewer has paging controls, scroll through it otherwise.

use std::sync::LazyLock;

use color_eyre::{Result, eyre::bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::DriveOutcome;
use crate::{
	config::tunable,
	scroll::{self, CompletionReason, Containers, ReadEnd},
	session::Session,
	state::Owner,
	surface::{ElementInfo, ElementRef, Frame, Surface, ToastLevel, accessible_frames},
};

/// PDF.js scroll roots; their presence means the viewer finished mounting.
pub const VIEWER_ROOTS: &str = "#viewerContainer, #viewer, .pdfViewer";

/// Tried in order, first match per selector.
pub const NEXT_PAGE: &[&str] = &[
	"#next",
	"#pageDown",
	".toolbarButton.pageDown",
	r#"button[title*="下一页"]"#,
	r#"button[title*="Next"]"#,
	r#"button[title*="next"]"#,
	r#"button[title*="下"]"#,
	r#"button[aria-label*="下一页"]"#,
	r#"button[aria-label*="Next"]"#,
	r#"button[id*="next"]"#,
	r#"button[id*="Next"]"#,
	r#"button[id*="pageDown"]"#,
	r#"button[class*="next"]"#,
	r#"button[class*="pageDown"]"#,
	r#"button[class*="page-down"]"#,
	r#"[data-l10n-id="next"]"#,
	r#"[data-l10n-id="page_down"]"#,
	r#"a[title*="下一页"]"#,
	r#"a[title*="Next"]"#,
	r#"span[title*="下一页"]"#,
	".next-page",
	".page-next",
	".btn-next",
];

/// PDF.js's own buttons; its toolbar may be collapsed, so these are trusted even when hidden.
const PRIMARY_NEXT: &[&str] = &["#next", "#pageDown"];

pub const PAGE_INPUTS: &[&str] = &["#pageNumber", r#"input[id*="pageNumber"]"#, r#"input[id*="page"]"#, ".pageNumber"];
pub const PAGE_COUNTS: &[&str] = &["#numPages", ".numPages", r#"[id*="numPages"]"#, r#"span[id*="Pages"]"#];
pub const TOOLBARS: &[&str] = &["#toolbarViewer", ".toolbar", r#"[class*="toolbar"]"#];

static PAGE_OF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*/\s*(\d+)").unwrap());

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagingPolicy {
	pub viewer_probes: u32,
	pub viewer_probe_ms: u64,
	pub button_probes: u32,
	pub button_probe_ms: u64,
	/// Flips allowed beyond the page count before giving up
	pub attempt_margin: u32,
	/// Assumed page count when the viewer shows none
	pub default_total: u32,
	pub preview_init_ms: u64,
	pub preview_probes: u32,
	pub preview_probe_ms: u64,
}

impl Default for PagingPolicy {
	fn default() -> Self {
		Self {
			viewer_probes: 5,
			viewer_probe_ms: 800,
			button_probes: 5,
			button_probe_ms: 1000,
			attempt_margin: 10,
			default_total: 100,
			preview_init_ms: 1500,
			preview_probes: 15,
			preview_probe_ms: 1000,
		}
	}
}

tunable!(PagingPolicy;
	viewer_probes, viewer_probe_ms, button_probes, button_probe_ms, attempt_margin, default_total, preview_init_ms, preview_probes, preview_probe_ms,
);

/// Bounded wait for something to show up.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Probe {
	pub count: u32,
	pub interval_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PagingControls {
	pub frame: Frame,
	pub next: ElementRef,
	/// Found through one of the PDF.js ids, where a hidden button is still fine
	pub primary: bool,
	pub page_input: Option<ElementRef>,
	pub total_pages: Option<u32>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PagingState {
	pub current_page: u32,
	pub total_pages: u32,
	pub flip_attempts: u32,
}

impl PagingState {
	pub fn new(total_pages: u32) -> Self {
		Self { current_page: 1, total_pages, flip_attempts: 0 }
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlipEnd {
	PagesDone,
	AttemptCeiling,
	/// Next control disabled, hidden or gone
	ButtonGone,
	ClickFailed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlipStep {
	Flip,
	Done(FlipEnd),
}

pub fn flip_step(state: &PagingState, usable: bool, margin: u32) -> FlipStep {
	if state.current_page >= state.total_pages {
		FlipStep::Done(FlipEnd::PagesDone)
	} else if state.flip_attempts >= state.total_pages.saturating_add(margin) {
		FlipStep::Done(FlipEnd::AttemptCeiling)
	} else if !usable {
		FlipStep::Done(FlipEnd::ButtonGone)
	} else {
		FlipStep::Flip
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DocumentRead {
	Paged(FlipEnd),
	Scrolled(CompletionReason),
	/// Scrolling kept failing
	Abandoned,
	Cancelled,
}

/// `parseInt`: leading digits after optional whitespace.
pub fn leading_number(s: &str) -> Option<u32> {
	let digits: String = s.trim_start().chars().take_while(char::is_ascii_digit).collect();
	digits.parse().ok().filter(|n| *n > 0)
}

pub fn total_from_toolbar(text: &str) -> Option<u32> {
	PAGE_OF.captures(text).and_then(|c| c[2].parse().ok()).filter(|n| *n > 0)
}

fn usable(button: &ElementInfo, primary: bool) -> bool {
	button.attached && !button.disabled && (button.has_offset_parent || primary)
}

/// First selector whose first match is usable.
pub fn pick_next(first_matches: &[Option<ElementInfo>]) -> Option<(ElementRef, bool)> {
	NEXT_PAGE.iter().zip(first_matches).find_map(|(selector, el)| {
		let primary = PRIMARY_NEXT.contains(selector);
		el.as_ref().filter(|el| usable(el, primary)).map(|el| (el.handle, primary))
	})
}

/// The document holding a PDF.js viewer: the page itself, else the first readable frame with one.
pub async fn locate_viewer<S: Surface + ?Sized>(surface: &S) -> Result<Option<Frame>> {
	let mut frames = vec![Frame::Main];
	frames.extend(accessible_frames(surface).await?);
	for frame in frames {
		if !surface.query(frame, VIEWER_ROOTS).await?.is_empty() {
			return Ok(Some(frame));
		}
	}
	Ok(None)
}

async fn first<S: Surface + ?Sized>(surface: &S, frame: Frame, selector: &str) -> Result<Option<ElementInfo>> {
	Ok(surface.query(frame, selector).await?.into_iter().next())
}

pub async fn probe_paging<S: Surface + ?Sized>(surface: &S, frame: Frame) -> Result<Option<PagingControls>> {
	let mut first_matches = Vec::with_capacity(NEXT_PAGE.len());
	for selector in NEXT_PAGE {
		first_matches.push(first(surface, frame, selector).await?);
	}
	let Some((next, primary)) = pick_next(&first_matches) else {
		return Ok(None);
	};

	let mut page_input = None;
	for selector in PAGE_INPUTS {
		if let Some(el) = first(surface, frame, selector).await? {
			page_input = Some(el.handle);
			break;
		}
	}

	let mut total_pages = None;
	for selector in PAGE_COUNTS {
		if let Some(n) = first(surface, frame, selector).await?.and_then(|el| leading_number(&el.text)) {
			total_pages = Some(n);
			break;
		}
	}
	if total_pages.is_none() {
		for selector in TOOLBARS {
			if let Some(toolbar) = first(surface, frame, selector).await? {
				total_pages = total_from_toolbar(&toolbar.text);
				break;
			}
		}
	}
	Ok(Some(PagingControls { frame, next, primary, page_input, total_pages }))
}

/// Clicks "next page" every `pdfFlipDelay` until the last page, the attempt ceiling, or the control going away.
async fn flip_through<S: Surface>(session: &Session<S>, owner: Owner, controls: PagingControls, policy: &PagingPolicy) -> Result<Option<FlipEnd>> {
	let surface = &*session.surface;
	let mut state = PagingState::new(controls.total_pages.unwrap_or(policy.default_total));
	session.notify(format!("Paging through the document ({} pages)", state.total_pages), ToastLevel::Info).await;
	loop {
		if !session.pause(owner, session.config().pdf_flip_delay).await {
			return Ok(None);
		}
		state.flip_attempts += 1;
		if let Some(input) = controls.page_input
			&& let Some(n) = surface.inspect(input).await?.and_then(|el| leading_number(&el.value))
		{
			state.current_page = n;
		}
		if state.current_page % 10 == 0 {
			session.notify(format!("Page {}/{}", state.current_page, state.total_pages), ToastLevel::Info).await;
		}
		let button_ok = surface.inspect(controls.next).await?.is_some_and(|b| usable(&b, controls.primary));
		match flip_step(&state, button_ok, policy.attempt_margin) {
			FlipStep::Done(end) => {
				info!(?end, page = state.current_page, total = state.total_pages, attempts = state.flip_attempts, "paging finished");
				return Ok(Some(end));
			}
			FlipStep::Flip => {
				if let Err(e) = surface.click(controls.next).await {
					warn!("next-page click failed: {e}");
					return Ok(Some(FlipEnd::ClickFailed));
				}
				if controls.page_input.is_none() {
					state.current_page += 1;
				}
			}
		}
	}
}

/// Reads whatever document is open right now, on behalf of `owner`.
pub async fn read_document<S: Surface>(session: &Session<S>, owner: Owner, viewer_probe: Probe) -> Result<DocumentRead> {
	let policy = session.config().policy;
	let surface = &*session.surface;

	let mut viewer = None;
	for attempt in 1..=viewer_probe.count {
		viewer = locate_viewer(surface).await?;
		if viewer.is_some() || attempt == viewer_probe.count {
			break;
		}
		if !session.pause(owner, viewer_probe.interval_ms).await {
			return Ok(DocumentRead::Cancelled);
		}
	}
	debug!(?viewer, "document viewer probe done");

	let frame = viewer.unwrap_or_default();
	for attempt in 1..=policy.paging.button_probes {
		if let Some(controls) = probe_paging(surface, frame).await? {
			debug!(?controls, "paging controls found");
			return Ok(match flip_through(session, owner, controls, &policy.paging).await? {
				Some(end) => DocumentRead::Paged(end),
				None => DocumentRead::Cancelled,
			});
		}
		if attempt < policy.paging.button_probes && !session.pause(owner, policy.paging.button_probe_ms).await {
			return Ok(DocumentRead::Cancelled);
		}
	}

	info!("no paging controls, scrolling the document instead");
	Ok(match scroll::read(session, owner, Containers::Refind, &policy.file_scroll).await {
		ReadEnd::Finished(reason) => DocumentRead::Scrolled(reason),
		ReadEnd::Cancelled => DocumentRead::Cancelled,
		ReadEnd::Abandoned => DocumentRead::Abandoned,
	})
}

/// Driver for a page that is itself a document viewer.
pub async fn read_preview<S: Surface>(session: &Session<S>) -> Result<DriveOutcome> {
	let paging = session.config().policy.paging;
	session.force_notify("Document preview detected", ToastLevel::Info).await;
	if !session.pause(Owner::Scroller, paging.preview_init_ms).await {
		return Ok(DriveOutcome::Cancelled);
	}
	let probe = Probe { count: paging.preview_probes, interval_ms: paging.preview_probe_ms };
	match read_document(session, Owner::Scroller, probe).await? {
		DocumentRead::Cancelled => Ok(DriveOutcome::Cancelled),
		DocumentRead::Abandoned => bail!("could not scroll the document preview"),
		read => {
			session.notify("Document read", ToastLevel::Success).await;
			debug!(?read, "preview finished");
			Ok(DriveOutcome::Completed)
		}
	}
}
