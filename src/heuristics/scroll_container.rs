use color_eyre::Result;

use crate::surface::{ElementInfo, ElementRef, Frame, Surface, Viewport, accessible_frames};

/// Class or id fragments that mark navigation chrome rather than content.
pub const SIDEBAR_KEYWORDS: &[&str] = &["sidebar", "side-bar", "aside", "nav", "menu", "toc", "catalog", "directory", "outline", "chapter-list", "left-panel", "tree"];

/// Scroll roots of embedded document viewers.
pub const VIEWER_CONTAINERS: &str = r#"#viewerContainer, #viewer, .pdfViewer, [class*="pdf-viewer"], [class*="document-viewer"]"#;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrollContainer {
	pub handle: ElementRef,
	/// Document viewer: rendered lazily, bottom checks get more slack
	pub viewer: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scored {
	pub container: ScrollContainer,
	pub score: f64,
}

/// Narrow strip hugging a viewport edge, or named like navigation.
pub fn is_sidebar(el: &ElementInfo, vp: Viewport) -> bool {
	let (class, id) = el.class_and_id();
	let named = SIDEBAR_KEYWORDS.iter().any(|k| class.contains(k) || id.contains(k));
	let r = el.rect;
	let narrow_edge = r.width < vp.width * 0.3 && (r.left < 50.0 || r.right() > vp.width - 50.0);
	named || narrow_edge
}

/// Favours large, right-of-centre, deeply scrollable regions named like content.
pub fn score(el: &ElementInfo, vp: Viewport) -> f64 {
	let r = el.rect;
	let mut score = 0.0;
	if r.left > vp.width * 0.3 {
		score += 50.0;
	}
	if r.left > vp.width * 0.5 {
		score += 30.0;
	}
	let viewport_area = vp.width * vp.height;
	if viewport_area > 0.0 {
		score += (r.area() / viewport_area * 100.0).min(50.0);
	}
	score += (el.scroll.scrollable() / 100.0).min(30.0);
	let (class, id) = el.class_and_id();
	if class.contains("content") || class.contains("main") {
		score += 20.0;
	}
	if id.contains("content") || id.contains("main") {
		score += 20.0;
	}
	score
}

/// Highest-scoring non-sidebar; the first one found wins a tie.
pub fn pick(scrollables: &[ElementInfo], vp: Viewport) -> Option<Scored> {
	scrollables
		.iter()
		.filter(|el| !is_sidebar(el, vp))
		.map(|el| Scored { container: ScrollContainer { handle: el.handle, viewer: false }, score: score(el, vp) })
		.fold(None, |acc: Option<Scored>, s| match acc {
			Some(a) if a.score >= s.score => Some(a),
			_ => Some(s),
		})
}

pub async fn find<S: Surface + ?Sized>(surface: &S, frame: Frame) -> Result<Option<Scored>> {
	let vp = surface.viewport().await?;
	Ok(pick(&surface.scrollables(frame).await?, vp))
}

/// Container for an opened document: a known viewer root in the page or a readable frame, else the best-scored region.
pub async fn find_for_document<S: Surface + ?Sized>(surface: &S) -> Result<Option<ScrollContainer>> {
	let mut frames = vec![Frame::Main];
	frames.extend(accessible_frames(surface).await?);
	for frame in frames {
		if let Some(viewer) = surface.query(frame, VIEWER_CONTAINERS).await?.into_iter().find(|el| el.scroll.height >= el.scroll.client && el.scroll.height > 0.0) {
			return Ok(Some(ScrollContainer { handle: viewer.handle, viewer: true }));
		}
	}
	Ok(find(surface, Frame::Main).await?.map(|s| s.container))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::surface::{Rect, ScrollMetrics};

	const VP: Viewport = Viewport { width: 1280.0, height: 800.0 };

	fn region(id: u32, class: &str, rect: Rect, height: f64) -> ElementInfo {
		ElementInfo {
			handle: ElementRef(id),
			tag: "div".into(),
			class_name: class.into(),
			rect,
			scroll: ScrollMetrics { top: 0.0, height, client: rect.height },
			..Default::default()
		}
	}

	#[test]
	fn sidebars_are_never_chosen() {
		let toc = region(1, "course-toc", Rect { left: 0.0, top: 60.0, width: 300.0, height: 740.0 }, 9000.0);
		let strip = region(2, "panel", Rect { left: 1100.0, top: 60.0, width: 180.0, height: 740.0 }, 3000.0);
		assert!(is_sidebar(&toc, VP));
		assert!(is_sidebar(&strip, VP));
		assert_eq!(pick(&[toc, strip], VP), None);
	}

	#[test]
	fn main_content_outscores_other_regions() {
		let comments = region(3, "comments", Rect { left: 100.0, top: 600.0, width: 800.0, height: 200.0 }, 900.0);
		let content = region(4, "lesson-content", Rect { left: 420.0, top: 60.0, width: 800.0, height: 740.0 }, 6000.0);
		let best = pick(&[comments.clone(), content.clone()], VP).unwrap();
		assert_eq!(best.container, ScrollContainer { handle: ElementRef(4), viewer: false });
		assert!(best.score >= 60.0);
		assert!(score(&comments, VP) < 60.0);
	}
}
