use std::{path::PathBuf, sync::Arc};

use autostudy::{
	browser::BrowserSurface,
	config::{self, Config, ConfigHandle},
	controller::{Command, Controller},
	login,
	session::Session,
	shell::{self, HookSink, Input, StdinPrompt},
};
use chromiumoxide::browser::{Browser, BrowserConfig};
use clap::Parser;
use color_eyre::{Result, eyre::eyre};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use v_utils::{elog, io::ExpandedPath, log};

#[derive(Debug, Parser)]
#[command(name = "autostudy")]
#[command(about = "Works through an online course page by page: scrolls text, plays videos, opens documents, clicks next", long_about = None)]
struct Args {
	/// Course page to start from
	#[arg(short, long)]
	target_url: String,

	/// Run with visible browser window (non-headless mode)
	#[arg(long)]
	visible: bool,

	/// Username for the site's login form, if it asks for one
	#[arg(short, long, requires = "password")]
	username: Option<String>,

	/// Password for the site's login form
	#[arg(short, long, requires = "username")]
	password: Option<String>,

	/// JSON settings file, `~` allowed; created with defaults when missing
	#[arg(short, long)]
	config: Option<ExpandedPath>,

	/// Browser profile directory, to keep a session between runs
	#[arg(long)]
	user_data_dir: Option<PathBuf>,

	/// Wait for `toggle` instead of starting right away
	#[arg(long)]
	paused: bool,

	/// Shell command run with `running` or `stopped` appended on every status change
	#[arg(long)]
	status_hook: Option<String>,

	/// Answer every question with "no" instead of asking
	#[arg(long)]
	non_interactive: bool,
}

#[cfg(feature = "xdg")]
fn default_config_path() -> Option<PathBuf> {
	Some(v_utils::xdg_config_file!("config.json"))
}

#[cfg(not(feature = "xdg"))]
fn default_config_path() -> Option<PathBuf> {
	None
}

async fn load_config(path: Option<&PathBuf>) -> Config {
	let Some(path) = path else {
		return Config::default();
	};
	match config::load(path).await {
		Ok(config) => config,
		Err(e) => {
			elog!("{e}, using defaults");
			Config::default()
		}
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::registry()
		.with(fmt::layer().with_target(false))
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("autostudy=info")))
		.init();
	let args = Args::parse();

	let config_path = args.config.clone().map(ExpandedPath::inner).or_else(default_config_path);
	let config = load_config(config_path.as_ref()).await;
	log!("Visible mode: {}", args.visible);

	let mut builder = BrowserConfig::builder();
	if args.visible {
		builder = builder.with_head();
	}
	if let Some(dir) = &args.user_data_dir {
		builder = builder.user_data_dir(dir);
	}
	let browser_config = builder.build().map_err(|e| eyre!("Failed to build browser config: {}", e))?;
	let (mut browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| eyre!("Failed to launch browser: {}", e))?;

	// Events must be drained or the browser hangs; their errors are mostly noise.
	let handle = tokio::spawn(async move { while handler.next().await.is_some() {} });

	let page = browser.new_page("about:blank").await.map_err(|e| eyre!("Failed to create new page: {}", e))?;
	log!("Navigating to {}", args.target_url);
	page.goto(&args.target_url).await.map_err(|e| eyre!("Failed to navigate: {}", e))?;
	tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

	if let (Some(username), Some(password)) = (&args.username, &args.password) {
		login::sign_in(&page, &args.target_url, username, password).await?;
	}

	let prompt = Arc::new(StdinPrompt::new(args.non_interactive));
	#[allow(unused_mut)]
	let mut session = Session::new(
		Arc::new(BrowserSurface::new(page)),
		ConfigHandle::new(config),
		Arc::new(HookSink::new(args.status_hook.clone())),
		prompt.clone(),
	);
	#[cfg(feature = "xdg")]
	{
		let run_id = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
		session.snapshot_dir = Some(v_utils::xdg_state_dir!("persist_htmls").join(run_id));
	}
	let controller = Controller::new(session);
	if !args.paused {
		controller.start().await;
	}
	eprintln!("{}", shell::HELP);

	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	loop {
		let line = tokio::select! {
			line = lines.next_line() => line,
			_ = tokio::signal::ctrl_c() => break,
		};
		let line = match line {
			Ok(Some(line)) => line,
			// stdin closed: keep going until Ctrl+C
			Ok(None) => {
				tokio::signal::ctrl_c().await?;
				break;
			}
			Err(e) => {
				elog!("Failed to read stdin: {e}");
				break;
			}
		};
		match shell::parse_line(&line) {
			Input::Command(command) => {
				let response = controller.handle(command).await;
				log!("{}", serde_json::to_string(&response)?);
			}
			Input::Reload => {
				let reloaded = load_config(config_path.as_ref()).await;
				controller.handle(Command::UpdateConfig(serde_json::to_value(&reloaded)?)).await;
				log!("Config reloaded");
			}
			Input::Answer(yes) =>
				if !prompt.answer(yes) {
					log!("Nothing is waiting for an answer");
				},
			Input::Quit => break,
			Input::Empty => {}
			Input::Unknown(other) => eprintln!("unknown command `{other}`; {}", shell::HELP),
		}
	}

	controller.stop().await;
	browser.close().await.map_err(|e| eyre!("Failed to close browser: {}", e))?;
	handle.abort();
	Ok(())
}
