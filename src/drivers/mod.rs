//! Completion drivers, one per page type. Each runs until its page counts as done, or until it loses ownership.

use color_eyre::Result;

use crate::{PageType, session::Session, surface::Surface};

pub mod file_list;
pub mod pdf;
pub mod text;
pub mod video;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DriveOutcome {
	Completed,
	/// Nothing to scroll: the whole page was on screen from the start
	AlreadyVisible,
	/// The page is not what it was classified as; run this driver instead
	Degraded(PageType),
	/// Lost ownership part way through
	Cancelled,
}

pub async fn drive<S: Surface>(session: &Session<S>, page_type: PageType) -> Result<DriveOutcome> {
	match page_type {
		PageType::Text => text::run(session).await,
		PageType::Video => video::run(session).await,
		PageType::FileList => file_list::run(session).await,
		PageType::FilePreview => pdf::read_preview(session).await,
		PageType::Unknown | PageType::Completed => Ok(DriveOutcome::Completed),
	}
}
