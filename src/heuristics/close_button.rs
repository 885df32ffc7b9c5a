use color_eyre::Result;

use super::{Candidate, TieBreak, best, is_valid_button};
use crate::surface::{ElementInfo, Frame, Surface, Viewport};

pub const SELECTORS: &[&str] = &[
	".close",
	".btn-close",
	r#"button[aria-label="Close"]"#,
	r#"button[title*="关闭"]"#,
	r#"button[title*="close"]"#,
	r#"button[title*="Close"]"#,
	".modal-close",
	".dialog-close",
	r#"[data-dismiss="modal"]"#,
	r#"[data-bs-dismiss="modal"]"#,
	".pdfjs-close",
	".pdf-close",
	".viewer-close",
	r#"button[class*="close"]"#,
	r#"[onclick*="close"]"#,
];

pub const GLYPHS: &[&str] = &["×", "✕", "X", "关闭", "close", "Close", "CLOSE"];

/// Where glyph and corner matches are looked for.
pub const SCOPE: &str = r#"button, a, div, span, i, [role="button"], [onclick]"#;

/// Backdrops that dismiss a modal when clicked.
pub const BACKDROPS: &str = ".modal-backdrop, .overlay, .popup-backdrop";

#[derive(Clone, Debug, Default)]
pub struct CloseScan {
	pub viewport: Viewport,
	/// Matches per entry of `SELECTORS`, same order
	pub by_selector: Vec<Vec<ElementInfo>>,
	pub scoped: Vec<ElementInfo>,
}

pub async fn scan<S: Surface + ?Sized>(surface: &S) -> Result<CloseScan> {
	let viewport = surface.viewport().await?;
	let mut by_selector = Vec::with_capacity(SELECTORS.len());
	for selector in SELECTORS {
		by_selector.push(surface.query(Frame::Main, selector).await?);
	}
	let scoped = surface.query(Frame::Main, SCOPE).await?;
	Ok(CloseScan { viewport, by_selector, scoped })
}

fn glyph_match(el: &ElementInfo) -> bool {
	let text = el.text.trim();
	GLYPHS.iter().any(|g| text == *g || el.title.contains(g) || el.aria_label.contains(g))
}

/// Small thing tucked into the top-right 20% x 20% of the viewport.
fn in_corner(el: &ElementInfo, vp: Viewport) -> bool {
	let r = el.rect;
	let text = el.text.trim();
	let corner = r.right() > vp.width * 0.8 && r.top < vp.height * 0.2;
	let small = r.width <= vp.width * 0.2 && r.height <= vp.height * 0.2;
	let looks_closing = text.is_empty() || ["×", "✕", "X"].contains(&text) || r.width < 50.0 || r.height < 50.0;
	corner && small && looks_closing
}

pub fn candidates(scan: &CloseScan) -> Vec<Candidate> {
	let mut out = Vec::new();
	for (i, matches) in scan.by_selector.iter().enumerate() {
		let priority = 200 - i as u32;
		out.extend(matches.iter().filter(|el| is_valid_button(el)).map(|el| Candidate::of(el, priority, SELECTORS[i])));
	}
	out.extend(scan.scoped.iter().filter(|el| glyph_match(el) && el.is_clickable() && is_valid_button(el)).map(|el| Candidate::of(el, 100, "glyph")));
	out.extend(scan.scoped.iter().filter(|el| is_valid_button(el) && in_corner(el, scan.viewport)).map(|el| Candidate::of(el, 50, "corner")));
	out
}

pub fn select(scan: &CloseScan) -> Option<Candidate> {
	best(candidates(scan), TieBreak::FoundFirst)
}

pub async fn find<S: Surface + ?Sized>(surface: &S) -> Result<Option<Candidate>> {
	Ok(select(&scan(surface).await?))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::surface::{ElementRef, Rect};

	const VP: Viewport = Viewport { width: 1280.0, height: 800.0 };

	fn el(id: u32, tag: &str, text: &str, rect: Rect) -> ElementInfo {
		ElementInfo {
			handle: ElementRef(id),
			tag: tag.into(),
			text: text.into(),
			attached: true,
			displayed: true,
			has_offset_parent: true,
			rect,
			..Default::default()
		}
	}

	fn rect(left: f64, top: f64, width: f64, height: f64) -> Rect {
		Rect { left, top, width, height }
	}

	fn empty_scan() -> CloseScan {
		CloseScan { viewport: VP, by_selector: vec![Vec::new(); SELECTORS.len()], scoped: Vec::new() }
	}

	#[test]
	fn selector_order_decides() {
		let mut scan = empty_scan();
		scan.by_selector[3] = vec![el(3, "button", "", rect(10.0, 10.0, 30.0, 30.0))];
		scan.by_selector[0] = vec![el(1, "span", "", rect(10.0, 10.0, 30.0, 30.0))];
		scan.scoped = vec![el(9, "button", "×", rect(1200.0, 10.0, 30.0, 30.0))];
		assert_eq!(select(&scan).unwrap().element, ElementRef(1));
	}

	#[test]
	fn hidden_structural_match_falls_through_to_glyph() {
		let mut scan = empty_scan();
		let mut hidden = el(1, "button", "", rect(10.0, 10.0, 30.0, 30.0));
		hidden.displayed = false;
		scan.by_selector[0] = vec![hidden];
		let plain_span = el(2, "span", "关闭", rect(600.0, 400.0, 60.0, 30.0));
		let mut clickable_span = el(3, "span", "关闭", rect(600.0, 500.0, 60.0, 30.0));
		clickable_span.cursor_pointer = true;
		scan.scoped = vec![plain_span, clickable_span];
		let best = select(&scan).unwrap();
		assert_eq!(best.element, ElementRef(3));
		assert_eq!(best.source, "glyph");
	}

	#[test]
	fn corner_fallback_wants_small_elements() {
		let mut scan = empty_scan();
		let header = el(1, "div", "Course title", rect(0.0, 0.0, 1280.0, 40.0));
		let icon = el(2, "i", "", rect(1240.0, 12.0, 24.0, 24.0));
		let middle = el(3, "button", "", rect(600.0, 300.0, 24.0, 24.0));
		scan.scoped = vec![header, middle, icon];
		let best = select(&scan).unwrap();
		assert_eq!(best.element, ElementRef(2));
		assert_eq!(best.source, "corner");
	}

	#[test]
	fn nothing_plausible_yields_none() {
		let mut scan = empty_scan();
		scan.scoped = vec![el(1, "a", "Download", rect(100.0, 600.0, 120.0, 30.0))];
		assert!(select(&scan).is_none());
	}
}
