//! `Surface` over a live Chromium tab.
//!
//! Every call evaluates one snippet against a small page-side registry (`window.__autostudy`) that hands out numeric refs
//! for elements and serializes them into the `ElementInfo` shape. The registry is reinstalled lazily, so a navigation
//! simply starts a fresh one and old refs resolve to nothing.

use async_trait::async_trait;
use chromiumoxide::{
	Page,
	cdp::{
		browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType},
		js_protocol::runtime::EvaluateParams,
	},
};
use color_eyre::{Result, eyre::eyre};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::surface::{ElementInfo, ElementRef, Frame, FrameInfo, ScrollMetrics, ScrollTarget, Surface, ToastLevel, VideoState, Viewport};

const BOOTSTRAP: &str = r#"
if (!window.__autostudy) window.__autostudy = (() => {
	const refs = new Map();
	let next = 1;
	const reg = el => {
		if (!el.__autostudyRef) el.__autostudyRef = next++;
		refs.set(el.__autostudyRef, el);
		return el.__autostudyRef;
	};
	const get = id => {
		const el = refs.get(id);
		return el && el.isConnected ? el : null;
	};
	const need = id => {
		const el = get(id);
		if (!el) throw new Error('element ' + id + ' is gone');
		return el;
	};
	const doc = frame => {
		if (frame === null) return document;
		const f = document.querySelectorAll('iframe')[frame];
		try { return (f && f.contentDocument) || null; } catch (e) { return null; }
	};
	const style = el => ((el.ownerDocument && el.ownerDocument.defaultView) || window).getComputedStyle(el);
	const info = el => {
		const s = style(el);
		const r = el.getBoundingClientRect();
		const attr = n => el.getAttribute(n) || '';
		return {
			handle: reg(el),
			tag: el.tagName.toLowerCase(),
			id: el.id || '',
			className: typeof el.className === 'string' ? el.className : attr('class'),
			text: (el.textContent || '').trim().slice(0, 200),
			title: attr('title'),
			ariaLabel: attr('aria-label'),
			href: attr('href'),
			resolvedHref: typeof el.href === 'string' ? el.href : '',
			src: attr('src'),
			name: attr('name'),
			role: attr('role'),
			dataAction: attr('data-action'),
			value: typeof el.value === 'string' ? el.value : '',
			disabled: !!el.disabled,
			attached: el.isConnected,
			displayed: s.display !== 'none' && s.visibility !== 'hidden',
			transparent: s.opacity === '0',
			hasOffsetParent: el.offsetParent !== null,
			hasOnclick: typeof el.onclick === 'function' || el.hasAttribute('onclick'),
			cursorPointer: s.cursor === 'pointer',
			overflowY: s.overflowY,
			rect: { left: r.left, top: r.top, width: r.width, height: r.height },
			scroll: { top: el.scrollTop, height: el.scrollHeight, client: el.clientHeight },
		};
	};
	const all = (root, sel) => Array.from(root.querySelectorAll(sel)).map(info);
	const page = () => document.scrollingElement || document.documentElement;
	const docs = () => {
		const out = [document];
		document.querySelectorAll('iframe').forEach((_, i) => { const d = doc(i); if (d) out.push(d); });
		return out;
	};
	return {
		query: (frame, sel) => { const d = doc(frame); return d ? all(d, sel) : []; },
		within: (id, sel) => { const el = get(id); return el ? all(el, sel) : []; },
		ancestors: (id, depth) => {
			const out = [];
			let el = get(id);
			while (el && el.parentElement && out.length < depth) { el = el.parentElement; out.push(info(el)); }
			return out;
		},
		at: (x, y) => { const el = document.elementFromPoint(x, y); return el ? info(el) : null; },
		inspect: id => { const el = get(id); return el ? info(el) : null; },
		scrollables: frame => {
			const d = doc(frame);
			if (!d) return [];
			return Array.from(d.querySelectorAll('*')).filter(el => {
				const o = style(el).overflowY;
				return el.scrollHeight > el.clientHeight && (o === 'auto' || o === 'scroll');
			}).map(info);
		},
		frames: () => Array.from(document.querySelectorAll('iframe')).map((f, index) => ({ index, src: f.src || '', accessible: doc(index) !== null, element: info(f) })),
		metrics: id => {
			if (id === null) { const s = page(); return { top: window.scrollY || s.scrollTop, height: s.scrollHeight, client: window.innerHeight }; }
			const el = need(id);
			return { top: el.scrollTop, height: el.scrollHeight, client: el.clientHeight };
		},
		scrollBy: (id, dy) => { if (id === null) window.scrollBy(0, dy); else need(id).scrollTop += dy; return true; },
		scrollTo: (id, top) => { if (id === null) window.scrollTo(0, top); else need(id).scrollTop = top; return true; },
		intoView: id => { need(id).scrollIntoView({ behavior: 'smooth', block: 'center' }); return true; },
		click: id => { need(id).click(); return true; },
		videos: () => docs().flatMap(d => Array.from(d.querySelectorAll('video'))).map(v => {
			if (!v.__autostudyWatched) {
				v.__autostudyWatched = true;
				v.addEventListener('ended', () => { v.__autostudyEnded = true; });
				['playing', 'loadstart', 'emptied'].forEach(e => v.addEventListener(e, () => { v.__autostudyEnded = false; }));
			}
			const r = v.getBoundingClientRect();
			const s = style(v);
			return {
				handle: reg(v),
				paused: v.paused,
				ended: v.ended,
				endedSeen: !!v.__autostudyEnded,
				muted: v.muted,
				playbackRate: v.playbackRate,
				currentTime: v.currentTime,
				duration: Number.isFinite(v.duration) ? v.duration : 0,
				readyState: v.readyState,
				visible: r.width > 0 && r.height > 0 && s.display !== 'none' && s.visibility !== 'hidden',
				rect: { left: r.left, top: r.top, width: r.width, height: r.height },
			};
		}),
		tune: (id, muted, rate) => { const v = need(id); v.muted = muted; v.playbackRate = rate; return true; },
		play: id => need(id).play().then(() => true),
		toast: (message, color) => {
			const box = document.createElement('div');
			box.textContent = message;
			Object.assign(box.style, {
				position: 'fixed', top: '20px', right: '20px', zIndex: '2147483647', background: color, color: '#fff',
				padding: '12px 20px', borderRadius: '6px', font: '14px sans-serif', boxShadow: '0 2px 10px rgba(0,0,0,.3)', maxWidth: '360px',
			});
			document.body.appendChild(box);
			setTimeout(() => box.remove(), 3000);
			return true;
		},
	};
})();
"#;

#[derive(Deserialize)]
struct Envelope<T> {
	v: T,
}

/// JSON literal for splicing a value into a snippet.
fn js<T: Serialize + ?Sized>(value: &T) -> String {
	serde_json::to_string(value).unwrap_or_else(|_| "null".into())
}

fn frame_arg(frame: Frame) -> String {
	match frame {
		Frame::Main => "null".into(),
		Frame::Child(i) => i.to_string(),
	}
}

fn target_arg(target: ScrollTarget) -> String {
	match target {
		ScrollTarget::Document => "null".into(),
		ScrollTarget::Element(el) => el.0.to_string(),
	}
}

/// The whole snippet for one registry call. The result is wrapped, so `null` and promises come back alike.
fn snippet(call: &str) -> String {
	format!("{BOOTSTRAP}\nPromise.resolve(window.__autostudy.{call}).then(v => ({{ v: v === undefined ? null : v }}))")
}

#[derive(Clone, Debug, derive_new::new)]
pub struct BrowserSurface {
	page: Page,
}

impl BrowserSurface {
	pub fn page(&self) -> &Page {
		&self.page
	}

	async fn eval<T: DeserializeOwned>(&self, expression: String) -> Result<T> {
		let params = EvaluateParams::builder()
			.expression(expression)
			.await_promise(true)
			.return_by_value(true)
			.build()
			.map_err(|e| eyre!("Failed to build evaluation: {e}"))?;
		let result = self.page.evaluate_expression(params).await.map_err(|e| eyre!("Evaluation failed: {e}"))?;
		result.into_value().map_err(|e| eyre!("Unexpected evaluation result: {e}"))
	}

	async fn call<T: DeserializeOwned>(&self, call: String) -> Result<T> {
		let envelope: Envelope<T> = self.eval(snippet(&call)).await.map_err(|e| eyre!("{call}: {e}"))?;
		Ok(envelope.v)
	}
}

#[async_trait]
impl Surface for BrowserSurface {
	async fn url(&self) -> Result<String> {
		self.eval("location.href".into()).await
	}

	async fn title(&self) -> Result<String> {
		self.eval("document.title".into()).await
	}

	async fn ready_state(&self) -> Result<String> {
		self.eval("document.readyState".into()).await
	}

	async fn viewport(&self) -> Result<Viewport> {
		self.eval("({ width: window.innerWidth, height: window.innerHeight })".into()).await
	}

	async fn query(&self, frame: Frame, selector: &str) -> Result<Vec<ElementInfo>> {
		self.call(format!("query({}, {})", frame_arg(frame), js(selector))).await
	}

	async fn query_within(&self, scope: ElementRef, selector: &str) -> Result<Vec<ElementInfo>> {
		self.call(format!("within({}, {})", scope.0, js(selector))).await
	}

	async fn ancestors(&self, el: ElementRef, depth: usize) -> Result<Vec<ElementInfo>> {
		self.call(format!("ancestors({}, {depth})", el.0)).await
	}

	async fn element_at(&self, x: f64, y: f64) -> Result<Option<ElementInfo>> {
		self.call(format!("at({x}, {y})")).await
	}

	async fn inspect(&self, el: ElementRef) -> Result<Option<ElementInfo>> {
		self.call(format!("inspect({})", el.0)).await
	}

	async fn scrollables(&self, frame: Frame) -> Result<Vec<ElementInfo>> {
		self.call(format!("scrollables({})", frame_arg(frame))).await
	}

	async fn frames(&self) -> Result<Vec<FrameInfo>> {
		self.call("frames()".into()).await
	}

	async fn scroll_metrics(&self, target: ScrollTarget) -> Result<ScrollMetrics> {
		self.call(format!("metrics({})", target_arg(target))).await
	}

	async fn scroll_by(&self, target: ScrollTarget, dy: f64) -> Result<()> {
		self.call::<bool>(format!("scrollBy({}, {dy})", target_arg(target))).await.map(drop)
	}

	async fn scroll_to(&self, target: ScrollTarget, top: f64) -> Result<()> {
		self.call::<bool>(format!("scrollTo({}, {top})", target_arg(target))).await.map(drop)
	}

	async fn scroll_into_view(&self, el: ElementRef) -> Result<()> {
		self.call::<bool>(format!("intoView({})", el.0)).await.map(drop)
	}

	async fn click(&self, el: ElementRef) -> Result<()> {
		self.call::<bool>(format!("click({})", el.0)).await.map(drop)
	}

	async fn press_escape(&self) -> Result<()> {
		for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
			let params = DispatchKeyEventParams::builder()
				.r#type(kind)
				.key("Escape")
				.code("Escape")
				.windows_virtual_key_code(27)
				.native_virtual_key_code(27)
				.build()
				.map_err(|e| eyre!("Failed to build key event: {e}"))?;
			self.page.execute(params).await.map_err(|e| eyre!("Failed to press Escape: {e}"))?;
		}
		Ok(())
	}

	async fn videos(&self) -> Result<Vec<VideoState>> {
		self.call("videos()".into()).await
	}

	async fn tune_video(&self, el: ElementRef, muted: bool, rate: f64) -> Result<()> {
		self.call::<bool>(format!("tune({}, {muted}, {rate})", el.0)).await.map(drop)
	}

	async fn play_video(&self, el: ElementRef) -> Result<()> {
		self.call::<bool>(format!("play({})", el.0)).await.map(drop)
	}

	async fn toast(&self, message: &str, level: ToastLevel) -> Result<()> {
		self.call::<bool>(format!("toast({}, {})", js(message), js(level.color()))).await.map(drop)
	}

	async fn outer_html(&self) -> Result<String> {
		self.eval("document.documentElement.outerHTML".into()).await
	}
}
