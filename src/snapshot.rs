use std::path::{Path, PathBuf};

use color_eyre::{Result, eyre::eyre};

use crate::surface::Surface;

/// Turns a page URL into something safe to put in a file name.
pub fn file_label(url: &str) -> String {
	let label = url.trim_start_matches("https://").trim_start_matches("http://");
	label.chars().map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' }).collect()
}

/// Dumps the current page HTML into `dir`, for working out afterwards why a page could not be handled.
pub async fn save_page_html<S: Surface + ?Sized>(surface: &S, dir: &Path) -> Result<PathBuf> {
	std::fs::create_dir_all(dir).map_err(|e| eyre!("Failed to create HTML dir: {}", e))?;

	let url = surface.url().await.unwrap_or_default();
	let html = surface.outer_html().await.map_err(|e| eyre!("Failed to get page HTML: {}", e))?;

	let timestamp = chrono::Utc::now().timestamp();
	let filepath = dir.join(format!("{}_{}.html", timestamp, file_label(&url)));
	std::fs::write(&filepath, html).map_err(|e| eyre!("Failed to write HTML file: {}", e))?;
	Ok(filepath)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fake::{FakePage, World};

	#[test]
	fn label_drops_scheme_and_punctuation() {
		assert_eq!(file_label("https://lms.example.edu/course/view.php?id=42"), "lms_example_edu_course_view_php_id_42");
		assert_eq!(file_label("http://a-b.c/x_y"), "a-b_c_x_y");
	}

	#[tokio::test]
	async fn html_lands_in_the_given_dir() {
		let dir = std::env::temp_dir().join(format!("autostudy-snapshot-{}", std::process::id()));
		let page = FakePage::new(World { url: "https://lms.example.edu/page/3".into(), html: "<html><body>stuck</body></html>".into(), ..World::default() });
		let path = save_page_html(&page, &dir).await.unwrap();
		assert!(path.starts_with(&dir));
		assert!(path.file_name().unwrap().to_string_lossy().ends_with("_lms_example_edu_page_3.html"));
		assert_eq!(std::fs::read_to_string(&path).unwrap(), "<html><body>stuck</body></html>");
		std::fs::remove_dir_all(&dir).unwrap();
	}
}
