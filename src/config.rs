use std::{
	path::Path,
	sync::{Arc, RwLock},
};

use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use v_utils::{elog, log};

use crate::{
	drivers::{file_list::FileListPolicy, pdf::PagingPolicy, video::VideoPolicy},
	navigation::NavPolicy,
	scroll::ScrollPolicy,
};

/// User-facing settings, keyed the way the options form stores them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
	/// Pixels per scroll tick
	pub scroll_speed: u32,
	/// Milliseconds between scroll ticks
	pub scroll_delay: u64,
	/// Milliseconds to linger once content is read, before looking for "next"
	pub wait_at_bottom: u64,
	pub auto_click_next: bool,
	/// Not-found and click-failure retry cycles for navigation
	pub max_retries: u32,
	/// Milliseconds to let an opened file render
	pub page_load_wait: u64,
	/// Milliseconds between document page flips
	pub pdf_flip_delay: u64,
	pub video_speed: f64,
	pub show_notifications: bool,
	/// Minimum milliseconds between two non-forced toasts
	pub notification_interval: u64,
	pub auto_handle_file_list: bool,
	/// Heuristic thresholds, grouped by driver. Rarely touched.
	#[serde(default)]
	pub policy: Policy,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			scroll_speed: 80,
			scroll_delay: 400,
			wait_at_bottom: 3000,
			auto_click_next: true,
			max_retries: 5,
			page_load_wait: 4000,
			pdf_flip_delay: 1000,
			video_speed: 2.0,
			show_notifications: true,
			notification_interval: 5000,
			auto_handle_file_list: true,
			policy: Policy::default(),
		}
	}
}

impl Config {
	/// Builds a fully valid config out of whatever was stored.
	///
	/// Missing keys, wrong types, zero, negative and non-finite values all fall back to the default for that key.
	/// Running it on its own output is a no-op.
	pub fn repair(raw: &Value) -> Self {
		let d = Self::default();
		let get = |key: &str| raw.get(key);
		Self {
			scroll_speed: count(get("scrollSpeed")).and_then(|v| u32::try_from(v).ok()).unwrap_or(d.scroll_speed),
			scroll_delay: count(get("scrollDelay")).unwrap_or(d.scroll_delay),
			wait_at_bottom: count(get("waitAtBottom")).unwrap_or(d.wait_at_bottom),
			auto_click_next: flag(get("autoClickNext")).unwrap_or(d.auto_click_next),
			max_retries: count(get("maxRetries")).and_then(|v| u32::try_from(v).ok()).unwrap_or(d.max_retries),
			page_load_wait: count(get("pageLoadWait")).unwrap_or(d.page_load_wait),
			pdf_flip_delay: count(get("pdfFlipDelay")).unwrap_or(d.pdf_flip_delay),
			video_speed: rate(get("videoSpeed")).unwrap_or(d.video_speed),
			show_notifications: flag(get("showNotifications")).unwrap_or(d.show_notifications),
			notification_interval: count(get("notificationInterval")).unwrap_or(d.notification_interval),
			auto_handle_file_list: flag(get("autoHandleFileList")).unwrap_or(d.auto_handle_file_list),
			policy: Policy::repair(get("policy")),
		}
	}

	pub fn repaired(&self) -> Self {
		serde_json::to_value(self).map(|v| Self::repair(&v)).unwrap_or_default()
	}
}

/// Strictly positive integer. Option forms hand over strings and floats, both are accepted when they round to one.
fn count(v: Option<&Value>) -> Option<u64> {
	let n = match v? {
		Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 1.0).map(|f| f.round() as u64)),
		Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite() && *f >= 1.0).map(|f| f.round() as u64),
		_ => None,
	};
	n.filter(|n| *n > 0)
}

fn rate(v: Option<&Value>) -> Option<f64> {
	let f = match v? {
		Value::Number(n) => n.as_f64(),
		Value::String(s) => s.trim().parse::<f64>().ok(),
		_ => None,
	};
	f.filter(|f| f.is_finite() && *f > 0.0)
}

fn flag(v: Option<&Value>) -> Option<bool> {
	match v? {
		Value::Bool(b) => Some(*b),
		Value::String(s) => s.trim().parse().ok(),
		_ => None,
	}
}

/// Every tunable threshold of the heuristic engine, as named values grouped by driver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
	pub text: ScrollPolicy,
	pub file_scroll: ScrollPolicy,
	pub video: VideoPolicy,
	pub paging: PagingPolicy,
	pub file_list: FileListPolicy,
	pub navigation: NavPolicy,
}

impl Default for Policy {
	fn default() -> Self {
		Self {
			text: ScrollPolicy::text(),
			file_scroll: ScrollPolicy::file(),
			video: VideoPolicy::default(),
			paging: PagingPolicy::default(),
			file_list: FileListPolicy::default(),
			navigation: NavPolicy::default(),
		}
	}
}

impl Policy {
	fn repair(raw: Option<&Value>) -> Self {
		let d = Self::default();
		let group = |key: &str| raw.and_then(|r| r.get(key));
		Self {
			text: overlay(group("text"), &d.text).sanitized(&d.text),
			file_scroll: overlay(group("fileScroll"), &d.file_scroll).sanitized(&d.file_scroll),
			video: overlay(group("video"), &d.video).sanitized(&d.video),
			paging: overlay(group("paging"), &d.paging).sanitized(&d.paging),
			file_list: overlay(group("fileList"), &d.file_list).sanitized(&d.file_list),
			navigation: overlay(group("navigation"), &d.navigation).sanitized(&d.navigation),
		}
	}
}

/// A policy group whose numeric fields must all stay strictly positive.
pub trait Tunable: Sized {
	fn sanitized(self, defaults: &Self) -> Self;
}

pub trait Positive {
	fn is_positive(&self) -> bool;
}

impl Positive for u32 {
	fn is_positive(&self) -> bool {
		*self > 0
	}
}

impl Positive for u64 {
	fn is_positive(&self) -> bool {
		*self > 0
	}
}

impl Positive for f64 {
	fn is_positive(&self) -> bool {
		self.is_finite() && *self > 0.0
	}
}

/// Implements `Tunable` by replacing every listed field that is not strictly positive with its default.
macro_rules! tunable {
	($ty:ty; $($field:ident),+ $(,)?) => {
		impl $crate::config::Tunable for $ty {
			fn sanitized(mut self, defaults: &Self) -> Self {
				$(
					if !$crate::config::Positive::is_positive(&self.$field) {
						self.$field = defaults.$field;
					}
				)+
				self
			}
		}
	};
}
pub(crate) use tunable;

/// Lays the user's keys over the defaults, dropping any value whose JSON kind differs from the default's.
fn overlay<T: Serialize + DeserializeOwned + Clone>(raw: Option<&Value>, defaults: &T) -> T {
	let (Some(Value::Object(given)), Ok(Value::Object(base))) = (raw, serde_json::to_value(defaults)) else {
		return defaults.clone();
	};
	let merged: Map<String, Value> = base
		.into_iter()
		.map(|(key, default)| {
			let value = match given.get(&key) {
				Some(v) if same_kind(v, &default) => v.clone(),
				_ => default,
			};
			(key, value)
		})
		.collect();
	serde_json::from_value(Value::Object(merged)).unwrap_or_else(|_| defaults.clone())
}

fn same_kind(given: &Value, default: &Value) -> bool {
	match default {
		Value::Number(n) if n.is_u64() => given.is_u64(),
		Value::Number(_) => given.is_number(),
		Value::Bool(_) => given.is_boolean(),
		_ => false,
	}
}

/// Shared, wholesale-replaced configuration. Readers always get a complete snapshot.
#[derive(Clone, Debug, Default)]
pub struct ConfigHandle(Arc<RwLock<Config>>);

impl ConfigHandle {
	pub fn new(config: Config) -> Self {
		Self(Arc::new(RwLock::new(config.repaired())))
	}

	pub fn get(&self) -> Config {
		match self.0.read() {
			Ok(guard) => guard.clone(),
			Err(poisoned) => poisoned.into_inner().clone(),
		}
	}

	/// Applies an `updateConfig` payload.
	pub fn replace(&self, raw: &Value) -> Config {
		let config = Config::repair(raw);
		match self.0.write() {
			Ok(mut guard) => *guard = config.clone(),
			Err(poisoned) => *poisoned.into_inner() = config.clone(),
		}
		config
	}
}

/// Reads the config file. A missing file is created with defaults; an unreadable one is reported and defaults are used.
///
/// Keys are repaired one by one rather than deserialized as a whole, so one bad value never costs the rest of the file.
pub async fn load(path: &Path) -> Result<Config> {
	let raw = match tokio::fs::read_to_string(path).await {
		Ok(raw) => raw,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
			let config = Config::default();
			save(path, &config).await?;
			log!("No config at {}, wrote defaults", path.display());
			return Ok(config);
		}
		Err(e) => bail!("Failed to read config {}: {e}", path.display()),
	};
	match serde_json::from_str::<Value>(&raw) {
		Ok(value) => Ok(Config::repair(&value)),
		Err(e) => {
			elog!("Config {} is not valid JSON ({e}), using defaults", path.display());
			Ok(Config::default())
		}
	}
}

pub async fn save(path: &Path, config: &Config) -> Result<()> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		tokio::fs::create_dir_all(parent).await.map_err(|e| eyre!("Failed to create config dir: {e}"))?;
	}
	let json = serde_json::to_string_pretty(config).map_err(|e| eyre!("Failed to serialize config: {e}"))?;
	tokio::fs::write(path, json).await.map_err(|e| eyre!("Failed to write config {}: {e}", path.display()))
}
