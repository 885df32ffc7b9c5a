use std::collections::HashSet;

use color_eyre::Result;
use tracing::debug;

use super::{Candidate, TieBreak, is_valid_next, ranked};
use crate::surface::{ElementInfo, Frame, Surface};

/// Markup known to mean "next" on the platforms seen so far.
pub const STRUCTURAL: &[&str] = &[
	r#"a[href*="learning-activity"]"#,
	r#"a[href*="nextpage"]"#,
	r#"a[href*="next-page"]"#,
	r#"a[class*="next"]"#,
	r#"button[class*="next"]"#,
	".next",
	".next-page",
	".next-lesson",
	".page-next",
	".btn-next",
	"a.next-page",
	"button.next-page",
	"button.next-lesson",
	".pagination a:last-child",
	".page-navigation a:last-child",
	".learning-nav a:last-child",
	".nav-next",
	".step-next",
	".forward",
	r#"[data-action="next"]"#,
	r#"[data-page="next"]"#,
	r#"[data-nav="next"]"#,
	".course-nav-next",
	".lesson-next",
	".chapter-next",
	".content-next",
];

pub const KEYWORDS: &[&str] = &[
	"下一个", "下一页", "下一节", "下一课", "下一章", "next", "Next", "NEXT", "继续", "下一步", "下一单元", "进入下一页", "下一项", "下个", "后一页", "下页", "→", "»", ">", "▶", "▷", "➤", "➔",
	"continue", "Continue", "CONTINUE", "forward", "Forward", "FORWARD",
];

/// Keywords that earn a bonus on top of their match tier.
pub const COMMON_KEYWORDS: &[&str] = &["下一个", "下一页", "继续", "next", "Next"];

pub const CLICKABLES: &str = r#"a, button, [onclick], [role="button"], .btn, .button"#;
pub const HREF_HINTS: &[&str] = &["next", "page", "lesson"];
pub const PAGINATION: &str = ".pagination, .pager, .page-nav, .page-navigation, .nav-pages";
pub const PAGINATION_MARKED: &str = r#".next, .page-next, [rel="next"]"#;

pub const STRUCTURAL_TIER: u32 = 100;
pub const EXACT_TIER: u32 = 80;
pub const SUBSTRING_TIER: u32 = 60;
pub const PAGINATION_TIER: u32 = 50;
pub const HREF_TIER: u32 = 40;
pub const COMMON_BONUS: u32 = 5;

#[derive(Clone, Debug, Default)]
pub struct PaginationGroup {
	/// Every `a` in the container, document order
	pub links: Vec<ElementInfo>,
	/// Elements explicitly marked as the next page
	pub marked: Vec<ElementInfo>,
}

#[derive(Clone, Debug, Default)]
pub struct NextScan {
	pub url: String,
	pub structural: Vec<ElementInfo>,
	pub clickables: Vec<ElementInfo>,
	pub pagination: Vec<PaginationGroup>,
}

pub async fn scan<S: Surface + ?Sized>(surface: &S) -> Result<NextScan> {
	let url = surface.url().await?;
	let structural = surface.query(Frame::Main, &STRUCTURAL.join(", ")).await?;
	let clickables = surface.query(Frame::Main, CLICKABLES).await?;
	let mut pagination = Vec::new();
	for container in surface.query(Frame::Main, PAGINATION).await? {
		let links = surface.query_within(container.handle, "a").await?;
		let marked = surface.query_within(container.handle, PAGINATION_MARKED).await?;
		pagination.push(PaginationGroup { links, marked });
	}
	Ok(NextScan { url, structural, clickables, pagination })
}

/// First keyword found in text, title or aria-label, and whether any of them equals it exactly.
fn keyword_match(el: &ElementInfo) -> Option<(&'static str, bool)> {
	let fields = [el.text.as_str(), el.title.as_str(), el.aria_label.as_str()];
	KEYWORDS
		.iter()
		.find(|kw| fields.iter().any(|f| f.contains(**kw)))
		.map(|kw| (*kw, fields.iter().any(|f| f == kw)))
}

fn pagination_next<'a>(groups: &'a [PaginationGroup], url: &str) -> Option<&'a ElementInfo> {
	groups
		.iter()
		.find_map(|g| g.links.last().filter(|l| is_valid_next(l, url)).or_else(|| g.marked.iter().find(|m| is_valid_next(m, url))))
}

pub fn candidates(scan: &NextScan) -> Vec<Candidate> {
	let url = scan.url.as_str();
	let mut out = Vec::new();
	let mut seen = HashSet::new();

	for el in scan.structural.iter().filter(|el| is_valid_next(el, url)) {
		if seen.insert(el.handle) {
			out.push(Candidate::of(el, STRUCTURAL_TIER, "structural"));
		}
	}

	for el in &scan.clickables {
		if seen.contains(&el.handle) || !is_valid_next(el, url) {
			continue;
		}
		if let Some((keyword, exact)) = keyword_match(el) {
			let tier = if exact { EXACT_TIER } else { SUBSTRING_TIER };
			let bonus = if COMMON_KEYWORDS.contains(&keyword) { COMMON_BONUS } else { 0 };
			out.push(Candidate::of(el, tier + bonus, format!("text:{keyword}")));
			seen.insert(el.handle);
		} else if !el.href.is_empty() && HREF_HINTS.iter().any(|h| el.href.contains(h)) {
			out.push(Candidate::of(el, HREF_TIER, format!("href:{}", el.href.chars().take(50).collect::<String>())));
			seen.insert(el.handle);
		}
	}

	if let Some(el) = pagination_next(&scan.pagination, url)
		&& seen.insert(el.handle)
	{
		out.push(Candidate::of(el, PAGINATION_TIER, "pagination"));
	}
	out
}

pub fn select(scan: &NextScan) -> Option<Candidate> {
	ranked(candidates(scan), TieBreak::LowerWins).into_iter().next()
}

pub async fn find<S: Surface + ?Sized>(surface: &S) -> Result<Option<Candidate>> {
	let scan = scan(surface).await?;
	let ranked = ranked(candidates(&scan), TieBreak::LowerWins);
	if !ranked.is_empty() {
		let summary: Vec<String> = ranked.iter().take(5).map(|c| format!("{}({}) {:?}", c.source, c.priority, c.text)).collect();
		debug!(count = ranked.len(), "next-button candidates: {}", summary.join(", "));
	}
	Ok(ranked.into_iter().next())
}
