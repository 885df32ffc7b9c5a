use std::{fmt, str::FromStr};

use color_eyre::eyre::{Report, bail};

use serde::Serialize;

pub mod browser;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod drivers;
pub mod heuristics;
pub mod login;
pub mod navigation;
pub mod notify;
pub mod scroll;
pub mod session;
pub mod shell;
pub mod snapshot;
pub mod state;
pub mod surface;

#[cfg(test)]
pub(crate) mod fake;

/// What the classifier decided the current page is
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageType {
	#[default]
	Unknown,
	/// Plain content that only needs scrolling through
	Text,
	/// One or more `<video>` elements or embedded players
	Video,
	/// A list of documents, each opened through a view/preview control
	FileList,
	/// A single document viewer (PDF.js or similar) filling the page
	FilePreview,
	/// Driven to completion, waiting on navigation
	Completed,
}

impl fmt::Display for PageType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			PageType::Unknown => "unknown",
			PageType::Text => "text",
			PageType::Video => "video",
			PageType::FileList => "file list",
			PageType::FilePreview => "file preview",
			PageType::Completed => "completed",
		};
		f.write_str(s)
	}
}

/// The page types a run can be forced into.
impl FromStr for PageType {
	type Err = Report;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(match s.trim().to_lowercase().as_str() {
			"text" => PageType::Text,
			"video" => PageType::Video,
			"file-list" | "filelist" | "file_list" => PageType::FileList,
			"file-preview" | "preview" | "pdf" => PageType::FilePreview,
			other => bail!("no page type `{other}`, expected text, video, file-list or preview"),
		})
	}
}

/// Strips the query string, for comparing where the browser actually is against where it was sent.
pub fn url_base(url: &str) -> &str {
	url.split('?').next().unwrap_or(url)
}
