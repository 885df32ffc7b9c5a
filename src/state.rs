use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::PageType;

/// The one driver (or the navigation step) allowed to act on the page right now.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Owner {
	/// Text and document-preview scrolling
	Scroller,
	Video,
	FileList,
	Navigation,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunState {
	pub running: bool,
	pub page_type: PageType,
	pub waiting_for_next_page: bool,
	pub watching_video: bool,
	pub processing_file_list: bool,
	pub scrolling: bool,
	pub file_list_index: usize,
	pub retry_count: u32,
}

impl RunState {
	pub fn start(&mut self) {
		*self = Self { running: true, ..Self::default() };
	}

	pub fn reset(&mut self) {
		*self = Self::default();
	}

	/// Hands the page to the driver for `page_type`. Every other ownership flag is cleared first.
	pub fn dispatch(&mut self, page_type: PageType) -> Option<Owner> {
		self.release();
		self.page_type = page_type;
		self.file_list_index = 0;
		let owner = match page_type {
			PageType::Text | PageType::FilePreview => Owner::Scroller,
			PageType::Video => Owner::Video,
			PageType::FileList => Owner::FileList,
			PageType::Unknown | PageType::Completed => return None,
		};
		*self.flag(owner) = true;
		Some(owner)
	}

	/// Driver finished; only navigation may act until the next dispatch.
	pub fn begin_navigation(&mut self) {
		self.release();
		self.page_type = PageType::Completed;
		self.waiting_for_next_page = true;
	}

	pub fn end_navigation(&mut self) {
		self.waiting_for_next_page = false;
		self.retry_count = 0;
	}

	pub fn owns(&self, owner: Owner) -> bool {
		self.running
			&& match owner {
				Owner::Scroller => self.scrolling,
				Owner::Video => self.watching_video,
				Owner::FileList => self.processing_file_list,
				Owner::Navigation => self.waiting_for_next_page,
			}
	}

	/// Number of page drivers currently holding the page.
	pub fn active_drivers(&self) -> usize {
		[self.scrolling, self.watching_video, self.processing_file_list].into_iter().filter(|f| *f).count()
	}

	fn release(&mut self) {
		self.scrolling = false;
		self.watching_video = false;
		self.processing_file_list = false;
		self.waiting_for_next_page = false;
	}

	fn flag(&mut self, owner: Owner) -> &mut bool {
		match owner {
			Owner::Scroller => &mut self.scrolling,
			Owner::Video => &mut self.watching_video,
			Owner::FileList => &mut self.processing_file_list,
			Owner::Navigation => &mut self.waiting_for_next_page,
		}
	}
}

/// Process-wide run state. The lock is never held across an `.await`.
#[derive(Clone, Debug, Default)]
pub struct SharedState(Arc<Mutex<RunState>>);

impl SharedState {
	fn lock(&self) -> MutexGuard<'_, RunState> {
		match self.0.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		}
	}

	pub fn snapshot(&self) -> RunState {
		self.lock().clone()
	}

	pub fn update<T>(&self, f: impl FnOnce(&mut RunState) -> T) -> T {
		f(&mut self.lock())
	}

	pub fn is_running(&self) -> bool {
		self.lock().running
	}

	pub fn owns(&self, owner: Owner) -> bool {
		self.lock().owns(owner)
	}

	pub fn dispatch(&self, page_type: PageType) -> Option<Owner> {
		self.lock().dispatch(page_type)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn dispatch_leaves_exactly_one_driver_active() {
		let mut state = RunState::default();
		state.start();
		let sequence = [PageType::Video, PageType::FileList, PageType::Text, PageType::FilePreview, PageType::Video, PageType::Text];
		for page_type in sequence {
			let owner = state.dispatch(page_type).unwrap();
			assert_eq!(state.active_drivers(), 1, "after dispatching {page_type}");
			assert!(state.owns(owner));
			assert!(!state.waiting_for_next_page);
		}
	}

	#[test]
	fn dispatch_revokes_navigation() {
		let mut state = RunState::default();
		state.start();
		state.dispatch(PageType::Text);
		state.begin_navigation();
		assert_eq!(state.active_drivers(), 0);
		assert!(state.owns(Owner::Navigation));
		assert!(!state.owns(Owner::Scroller));

		state.dispatch(PageType::Video);
		assert!(!state.owns(Owner::Navigation));
		assert!(state.owns(Owner::Video));
	}

	#[test]
	fn nothing_is_owned_once_stopped() {
		let shared = SharedState::default();
		shared.update(RunState::start);
		shared.dispatch(PageType::FileList);
		assert!(shared.owns(Owner::FileList));
		shared.update(RunState::reset);
		assert!(!shared.owns(Owner::FileList));
		assert_eq!(shared.snapshot(), RunState::default());
	}
}
