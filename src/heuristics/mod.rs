//! Stateless control finders. Each one takes a fresh snapshot of the page, scores what it sees, and hands back the best candidate.
//!
//! Nothing here is cached: the host page mutates under us, so every decision point scans again.

use std::{cmp::Ordering, collections::HashSet};

use serde::Serialize;

use crate::surface::{ElementInfo, ElementRef};

pub mod close_button;
pub mod detect;
pub mod next_button;
pub mod play_button;
pub mod scroll_container;

/// A scored guess at the control being looked for.
#[derive(Clone, Debug, PartialEq, Serialize, derive_new::new)]
pub struct Candidate {
	pub element: ElementRef,
	pub priority: u32,
	/// What matched, for logs
	pub source: String,
	pub text: String,
	/// Viewport-relative top edge, for vertical tie-breaks
	pub top: f64,
}

impl Candidate {
	pub fn of(info: &ElementInfo, priority: u32, source: impl Into<String>) -> Self {
		Self::new(info.handle, priority, source.into(), info.text.chars().take(40).collect(), info.rect.top)
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TieBreak {
	/// Same priority: the element lower on the page wins
	LowerWins,
	/// Same priority: whichever was found first wins
	FoundFirst,
}

/// Sorts by priority, then `tie`. An element listed twice keeps only its best-ranked entry.
/// The sort is stable, so equal candidates stay in discovery order.
pub fn ranked(mut candidates: Vec<Candidate>, tie: TieBreak) -> Vec<Candidate> {
	candidates.sort_by(|a, b| {
		b.priority.cmp(&a.priority).then_with(|| match tie {
			TieBreak::LowerWins => b.top.total_cmp(&a.top),
			TieBreak::FoundFirst => Ordering::Equal,
		})
	});
	let mut seen = HashSet::new();
	candidates.retain(|c| seen.insert(c.element));
	candidates
}

pub fn best(candidates: Vec<Candidate>, tie: TieBreak) -> Option<Candidate> {
	ranked(candidates, tie).into_iter().next()
}

/// In the DOM, rendered, not fully transparent, with a size.
pub fn is_valid_button(el: &ElementInfo) -> bool {
	el.attached && el.displayed && !el.transparent && el.rect.has_size()
}

/// Stricter check for navigation: also laid out, enabled, and not a link back to where we are.
pub fn is_valid_next(el: &ElementInfo, current_url: &str) -> bool {
	let self_link = el.href == "#" || (!el.href.is_empty() && (el.href == current_url || el.resolved_href == current_url));
	el.attached && el.has_offset_parent && el.displayed && el.rect.has_size() && !el.disabled && !el.has_class("disabled") && !self_link
}

/// Lowercased text, title and aria-label, for keyword matching.
pub(crate) fn labels(el: &ElementInfo) -> [String; 3] {
	[el.text.to_lowercase(), el.title.to_lowercase(), el.aria_label.to_lowercase()]
}
