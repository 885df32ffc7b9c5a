//! Page-type signals. Collection goes through `Surface`; the verdicts are pure functions of the collected `PageScan`.

use std::sync::LazyLock;

use color_eyre::Result;
use regex::Regex;
use serde::Serialize;

use super::{is_valid_button, labels};
use crate::surface::{ElementInfo, Frame, Surface, VideoState};

/// Anything that looks like an embedded PDF, including PDF.js internals.
pub const PDF_VIEWERS: &str = concat!(
	r#".pdf-viewer, #pdf-viewer, iframe[src*="pdf"], embed[type*="pdf"], [class*="pdf-viewer"], [id*="pdf-viewer"], "#,
	r#"object[data*="pdf"], #viewerContainer, #viewer, .pdfViewer, .textLayer, .annotationLayer, [data-page-number], .canvasWrapper"#
);

/// Generic viewers. On their own too weak, so they need the url or title to agree.
pub const DOCUMENT_VIEWERS: &str = concat!(
	r#".document-viewer, .doc-viewer, .file-viewer, .preview-viewer, [class*="preview"], [class*="viewer"], "#,
	r#"[class*="document-viewer"], [id*="document-viewer"], iframe[src*="viewer"], iframe[src*="preview"], iframe[src*="view"]"#
);

/// PDF.js markup, the one signal trusted even on course pages.
pub const PDF_JS: &str = "#viewerContainer, #viewer, .pdfViewer, .textLayer, [data-page-number]";

pub const VIEW_SCOPE: &str = concat!(
	r#"button, a, .btn, [role="button"], [onclick], [href], span[class*="btn"], div[class*="btn"], "#,
	"td a, tr a, .file-item a, .document-item a"
);

pub const VIEW_KEYWORDS: &[&str] = &["查看", "预览", "打开", "view", "open", "preview"];

static FILE_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\.(pdf|doc|docx|ppt|pptx|xls|xlsx)(\?.*)?$").unwrap());

/// Seconds before the end at which a video counts as watched, for detection only.
const NEAR_END_SECS: f64 = 2.0;

#[derive(Clone, Debug, Default)]
pub struct PageScan {
	pub url: String,
	pub title: String,
	pub pdf_viewers: usize,
	pub document_viewers: usize,
	pub pdf_js: bool,
	pub iframes: Vec<ElementInfo>,
	pub videos: Vec<VideoState>,
}

pub async fn scan<S: Surface + ?Sized>(surface: &S) -> Result<PageScan> {
	Ok(PageScan {
		url: surface.url().await?,
		title: surface.title().await?,
		pdf_viewers: surface.query(Frame::Main, PDF_VIEWERS).await?.len(),
		document_viewers: surface.query(Frame::Main, DOCUMENT_VIEWERS).await?.len(),
		pdf_js: !surface.query(Frame::Main, PDF_JS).await?.is_empty(),
		iframes: surface.query(Frame::Main, "iframe").await?,
		videos: surface.videos().await?,
	})
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PreviewSignals {
	pub pdf_viewers: usize,
	pub document_viewers: usize,
	pub pdf_js: bool,
	pub preview_url: bool,
	pub preview_title: bool,
	pub pdf_iframe: bool,
	/// Title names a `.pdf` file
	pub pdf_title: bool,
	/// Generic course page, where viewer-ish markup is common and means little
	pub learning_page: bool,
}

impl PreviewSignals {
	pub fn matched(&self) -> bool {
		let raw = self.pdf_viewers > 0
			|| self.pdf_js
			|| (self.document_viewers > 0 && (self.preview_url || self.preview_title))
			|| (self.pdf_iframe && self.preview_url && self.preview_title);
		raw && (!self.learning_page || self.pdf_js || self.pdf_title)
	}
}

fn mentions_pdf(el: &ElementInfo) -> bool {
	let (class, id) = el.class_and_id();
	let src = el.src.to_lowercase();
	src.contains("pdf") || src.contains("document-viewer") || el.name.to_lowercase().contains("pdf") || id.contains("pdf") || class.contains("pdf") || class.contains("document-viewer")
}

pub fn preview_signals(scan: &PageScan) -> PreviewSignals {
	let url = scan.url.to_lowercase();
	let title = scan.title.to_lowercase();
	let preview_url = ["preview", "file-viewer", "document-viewer", ".pdf", "pdf-view", "file-view"].iter().any(|k| url.contains(k))
		|| (url.contains("/view/") && (url.contains("pdf") || url.contains("doc")));
	let preview_title = ["pdf", "文档预览", "文件预览", "document preview", "file preview"].iter().any(|k| title.contains(k));
	let learning_page = ["learning", "course", "study"].iter().any(|k| url.contains(k)) || title.contains('学') || title.contains("课程");
	PreviewSignals {
		pdf_viewers: scan.pdf_viewers,
		document_viewers: scan.document_viewers,
		pdf_js: scan.pdf_js,
		preview_url,
		preview_title,
		pdf_iframe: scan.iframes.iter().any(mentions_pdf),
		pdf_title: title.contains(".pdf"),
		learning_page,
	}
}

pub fn is_file_preview(scan: &PageScan) -> bool {
	preview_signals(scan).matched()
}

/// Visible and not yet (nearly) finished.
pub fn is_active_video(v: &VideoState) -> bool {
	let near_end = v.current_time > 0.0 && v.duration > 0.0 && v.current_time >= v.duration - NEAR_END_SECS;
	v.visible && !(v.ended || near_end)
}

pub fn is_video_frame(el: &ElementInfo) -> bool {
	let src = el.src.to_lowercase();
	let by_src = ["player", "video", "bilibili", "youku", "mp4", "youtube"].iter().any(|k| src.contains(k));
	let by_name = el.name.to_lowercase().contains("video") || el.class_name.to_lowercase().contains("video-player");
	(by_src || by_name) && !mentions_pdf(el) && el.has_offset_parent
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct VideoSignals {
	pub active_videos: usize,
	pub video_frames: usize,
}

pub fn video_signals(scan: &PageScan) -> VideoSignals {
	VideoSignals { active_videos: scan.videos.iter().filter(|v| is_active_video(v)).count(), video_frames: scan.iframes.iter().filter(|f| is_video_frame(f)).count() }
}

pub fn is_video_page(scan: &PageScan) -> bool {
	let s = video_signals(scan);
	s.active_videos > 0 || s.video_frames > 0
}

/// "View"/"open"/"preview" controls and direct document links, valid ones only.
pub fn is_view_control(el: &ElementInfo) -> bool {
	let [text, title, _] = labels(el);
	let by_label = VIEW_KEYWORDS.iter().any(|k| text.contains(k) || title.contains(k));
	let by_action = matches!(el.data_action.as_str(), "view" | "open" | "preview");
	(by_label || by_action || FILE_LINK.is_match(&el.href)) && is_valid_button(el)
}

pub async fn view_controls<S: Surface + ?Sized>(surface: &S) -> Result<Vec<ElementInfo>> {
	Ok(surface.query(Frame::Main, VIEW_SCOPE).await?.into_iter().filter(is_view_control).collect())
}

pub fn is_file_list(controls: &[ElementInfo]) -> bool {
	!controls.is_empty()
}
