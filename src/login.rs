use chromiumoxide::Page;
use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use tokio::time::{Duration, sleep};
use v_utils::log;

use crate::url_base;

const SUBMIT_SCRIPT: &str = r#"
	(function() {
		const submitButton = document.querySelector('button[type="submit"], input[type="submit"]');
		if (submitButton) {
			submitButton.click();
			return true;
		}
		const form = document.querySelector('form');
		if (form) {
			form.submit();
			return true;
		}
		return false;
	})()
"#;

/// Fills the first username/password pair on the page. Values are spliced in as JSON string literals.
fn fill_script(username: &str, password: &str) -> String {
	let quote = |s: &str| serde_json::to_string(s).unwrap_or_else(|_| "\"\"".into());
	format!(
		r#"
		(function() {{
			const usernameField = document.querySelector('input[name="username"], input[id="username"], input[type="email"]');
			const passwordField = document.querySelector('input[name="password"], input[id="password"], input[type="password"]');
			if (usernameField && passwordField) {{
				usernameField.value = {};
				passwordField.value = {};
				usernameField.dispatchEvent(new Event('input', {{ bubbles: true }}));
				passwordField.dispatchEvent(new Event('input', {{ bubbles: true }}));
				return true;
			}}
			return false;
		}})()
		"#,
		quote(username),
		quote(password)
	)
}

async fn current_url(page: &Page) -> String {
	page.url().await.ok().flatten().unwrap_or_default()
}

/// Signs in through whatever login form the target redirected to, then makes sure the tab ends up on the target.
pub async fn sign_in(page: &Page, target_url: &str, username: &str, password: &str) -> Result<()> {
	let current = current_url(page).await;
	if url_base(&current) == url_base(target_url) {
		log!("Already signed in, at target page");
		return Ok(());
	}

	log!("On {current}, filling login form...");
	let filled: bool = page
		.evaluate(fill_script(username, password))
		.await
		.map_err(|e| eyre!("Failed to fill login form: {}", e))?
		.into_value()
		.map_err(|e| eyre!("Unexpected fill result: {}", e))?;
	if !filled {
		bail!("No login form found at {current}");
	}
	page.evaluate(SUBMIT_SCRIPT).await.map_err(|e| eyre!("Failed to submit login form: {}", e))?;
	sleep(Duration::from_secs(3)).await;

	// some sites land on a dashboard instead of the requested page
	if url_base(&current_url(page).await) != url_base(target_url) {
		page.goto(target_url).await.map_err(|e| eyre!("Failed to navigate to target URL: {}", e))?;
		sleep(Duration::from_secs(3)).await;
	}

	let final_url = current_url(page).await;
	if url_base(&final_url) != url_base(target_url) {
		bail!("Login failed: expected to be at {}, but at {}", target_url, final_url);
	}
	log!("Login successful, at target page");
	Ok(())
}
