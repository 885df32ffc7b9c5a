use std::sync::Mutex;

use tokio::time::{Duration, Instant};

use crate::config::Config;

/// Rate limiter for on-page toasts. Log lines are never limited, only the toasts.
#[derive(Debug, Default)]
pub struct Notifier {
	last: Mutex<Option<Instant>>,
}

impl Notifier {
	/// Whether a toast may be shown now. Records the time when it may.
	pub fn admit(&self, config: &Config, force: bool) -> bool {
		let now = Instant::now();
		let mut last = match self.last.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		};
		if !force {
			if !config.show_notifications {
				return false;
			}
			let interval = Duration::from_millis(config.notification_interval);
			if last.is_some_and(|t| now.duration_since(t) < interval) {
				return false;
			}
		}
		*last = Some(now);
		true
	}
}
