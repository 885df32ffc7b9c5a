use color_eyre::Result;
use tracing::debug;

use crate::{
	PageType,
	config::Config,
	heuristics::detect::{self, PageScan, PreviewSignals, VideoSignals},
	surface::Surface,
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Classification {
	pub page_type: PageType,
	pub preview: PreviewSignals,
	pub video: VideoSignals,
	/// Only counted when file lists are handled at all
	pub view_controls: usize,
}

/// File preview wins over video (viewer iframes look like players), video over file list, and text is the fallback.
pub fn decide(scan: &PageScan, view_controls: Option<usize>) -> Classification {
	let preview = detect::preview_signals(scan);
	let video = detect::video_signals(scan);
	let controls = view_controls.unwrap_or_default();
	let page_type = if preview.matched() {
		PageType::FilePreview
	} else if detect::is_video_page(scan) {
		PageType::Video
	} else if controls > 0 {
		PageType::FileList
	} else {
		PageType::Text
	};
	Classification { page_type, preview, video, view_controls: controls }
}

pub async fn classify<S: Surface + ?Sized>(surface: &S, config: &Config) -> Result<Classification> {
	let scan = detect::scan(surface).await?;
	let controls = match config.auto_handle_file_list {
		true => Some(detect::view_controls(surface).await?.len()),
		false => None,
	};
	let classification = decide(&scan, controls);
	debug!(url = %scan.url, page_type = %classification.page_type, preview = ?classification.preview, video = ?classification.video, view_controls = classification.view_controls, "classified");
	Ok(classification)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::surface::{ElementInfo, VideoState};

	fn course_page() -> PageScan {
		PageScan { url: "https://lms.example.edu/course/5/activity/2".into(), title: "Unit 2".into(), ..Default::default() }
	}

	#[test]
	fn plain_page_is_text() {
		assert_eq!(decide(&course_page(), Some(0)).page_type, PageType::Text);
		assert_eq!(decide(&course_page(), None).page_type, PageType::Text);
	}

	#[test]
	fn preview_beats_video_beats_file_list() {
		let mut scan = course_page();
		scan.videos = vec![VideoState { visible: true, duration: 300.0, ..Default::default() }];
		assert_eq!(decide(&scan, Some(4)).page_type, PageType::Video);
		scan.pdf_js = true;
		assert_eq!(decide(&scan, Some(4)).page_type, PageType::FilePreview);
	}

	#[test]
	fn file_list_only_when_handled() {
		let scan = course_page();
		assert_eq!(decide(&scan, Some(3)).page_type, PageType::FileList);
		assert_eq!(decide(&scan, None).page_type, PageType::Text);
	}

	#[test]
	fn pdf_iframe_needs_both_url_and_title() {
		let mut scan = PageScan { url: "https://files.example.com/preview/88".into(), title: "Slides".into(), ..Default::default() };
		scan.iframes = vec![ElementInfo { tag: "iframe".into(), src: "/static/pdf/web/index.html".into(), ..Default::default() }];
		assert_eq!(decide(&scan, None).page_type, PageType::Text);
		scan.title = "Slides (PDF)".into();
		assert_eq!(decide(&scan, None).page_type, PageType::FilePreview);
	}
}
