//! Chrome DevTools Protocol backend for `DocumentView`

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine as Base64Engine;
use headless_chrome::browser::tab::{RequestInterceptor, RequestPausedDecision, Tab};
use headless_chrome::protocol::cdp::Fetch::events::RequestPausedEvent;
use headless_chrome::{Browser, LaunchOptions};
use image::RgbaImage;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{DocumentView, ElementHandle, ElementInfo, MediaSource, ScrollMetrics};
use crate::media::classify_request;
use crate::{Error, Result, SessionConfig};

// Every element handed out gets a `data-drivecap-id` so later calls can find
// it again; ids come from a per-document counter and never change.
const COLLECT_JS: &str = r#"
(function() {
    const out = [];
    document.querySelectorAll({{SELECTOR}}).forEach((el) => {
        if (!el.dataset.drivecapId) {
            window.__drivecapSeq = (window.__drivecapSeq || 0) + 1;
            el.dataset.drivecapId = String(window.__drivecapSeq);
        }
        const r = el.getBoundingClientRect();
        const tag = el.tagName.toLowerCase();
        let width, height, naturalWidth, naturalHeight;
        if (tag === 'img') {
            width = el.width; height = el.height;
            naturalWidth = el.naturalWidth; naturalHeight = el.naturalHeight;
        } else if (tag === 'canvas') {
            width = el.width; height = el.height;
            naturalWidth = el.width; naturalHeight = el.height;
        } else {
            width = el.clientWidth;
            height = el.clientHeight;
            naturalWidth = width; naturalHeight = height;
        }
        out.push({
            handle: el.dataset.drivecapId,
            src: tag === 'img' ? el.src : null,
            width, height, naturalWidth, naturalHeight,
            rect: { top: r.top, left: r.left, width: r.width, height: r.height },
        });
    });
    return JSON.stringify(out);
})()
"#;

const SCROLL_METRICS_JS: &str = r#"
(function() {
    const el = document.querySelector({{SELECTOR}});
    if (!el) return JSON.stringify(null);
    if ({{SET}}) el.scrollTop = {{TOP}};
    return JSON.stringify({
        scrollTop: el.scrollTop,
        scrollHeight: el.scrollHeight,
        clientHeight: el.clientHeight,
    });
})()
"#;

const READ_PIXELS_JS: &str = r#"
(function() {
    const el = document.querySelector({{SELECTOR}});
    if (!el) throw new Error('element is gone');
    if (el.tagName.toLowerCase() === 'canvas') {
        return JSON.stringify(el.toDataURL('image/png'));
    }
    const c = document.createElement('canvas');
    c.width = el.naturalWidth || el.width;
    c.height = el.naturalHeight || el.height;
    c.getContext('2d').drawImage(el, 0, 0);
    return JSON.stringify(c.toDataURL('image/png'));
})()
"#;

const SERIALIZE_VECTOR_JS: &str = r#"
(function() {
    const el = document.querySelector({{SELECTOR}});
    if (!el) throw new Error('element is gone');
    const copy = el.cloneNode(true);
    copy.setAttribute('xmlns', 'http://www.w3.org/2000/svg');
    return JSON.stringify(new XMLSerializer().serializeToString(copy));
})()
"#;

const DECODE_VECTOR_JS: &str = r#"
new Promise((resolve, reject) => {
    const blob = new Blob([{{MARKUP}}], { type: 'image/svg+xml;charset=utf-8' });
    const url = URL.createObjectURL(blob);
    const timer = setTimeout(() => {
        URL.revokeObjectURL(url);
        resolve(JSON.stringify({ timedOut: true }));
    }, {{TIMEOUT}});
    const img = new Image();
    img.onload = () => {
        clearTimeout(timer);
        const c = document.createElement('canvas');
        c.width = {{WIDTH}};
        c.height = {{HEIGHT}};
        const ctx = c.getContext('2d');
        ctx.fillStyle = '#ffffff';
        ctx.fillRect(0, 0, c.width, c.height);
        ctx.drawImage(img, 0, 0, c.width, c.height);
        URL.revokeObjectURL(url);
        resolve(JSON.stringify({ dataUrl: c.toDataURL('image/png') }));
    };
    img.onerror = () => {
        clearTimeout(timer);
        URL.revokeObjectURL(url);
        reject(new Error('vector page could not be decoded'));
    };
    img.src = url;
})
"#;

const MEDIA_SOURCES_JS: &str = r#"
(function() {
    const out = [];
    document.querySelectorAll('video').forEach((v) => {
        if (v.src) out.push({ src: v.src, mime: null, fromSourceElement: false });
        v.querySelectorAll('source').forEach((s) => {
            if (s.src) out.push({ src: s.src, mime: s.type || null, fromSourceElement: true });
        });
    });
    return JSON.stringify(out);
})()
"#;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VectorDecode {
    #[serde(default)]
    data_url: Option<String>,
    #[serde(default)]
    timed_out: bool,
}

/// A Drive viewer open in a headless Chrome tab.
///
/// Every network request of the tab is paused and continued. Playback
/// requests are kept so `drain_requests` sees the player's `videoplayback`
/// traffic; everything else is let through unrecorded.
pub struct CdpView {
    browser: Browser,
    tab: Arc<Tab>,
    requests: Arc<Mutex<Vec<String>>>,
    vector_timeout: Duration,
}

impl CdpView {
    /// Launch Chrome with one blank tab.
    pub fn launch(config: &SessionConfig) -> Result<Self> {
        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .path(config.chrome_path.clone())
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::InitializationError(format!("Failed to create tab: {}", e)))?;

        tab.set_user_agent(&config.user_agent, None, None)
            .map_err(|e| Error::InitializationError(format!("Failed to set user agent: {}", e)))?;

        // Vector decodes resolve on their own timer; leave the CDP call room to see it.
        let call_timeout = config.timeout_ms.max(config.vector_decode_timeout_ms + 5_000);
        tab.set_default_timeout(Duration::from_millis(call_timeout));

        let view = Self {
            browser,
            tab,
            requests: Arc::new(Mutex::new(Vec::new())),
            vector_timeout: Duration::from_millis(config.vector_decode_timeout_ms),
        };
        if let Err(e) = view.record_requests() {
            warn!("Request recording is off, video URLs come from <video> elements only: {}", e);
        }
        Ok(view)
    }

    /// Launch Chrome and open `url`.
    pub fn open(url: &str, config: &SessionConfig) -> Result<Self> {
        let mut view = Self::launch(config)?;
        view.navigate(url, Duration::from_millis(config.settle_after_load_ms))?;
        Ok(view)
    }

    /// Navigate and wait for the load, then give the viewer `settle` to render.
    pub fn navigate(&mut self, url: &str, settle: Duration) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| Error::LoadError(format!("Navigation failed: {}", e)))?;

        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::LoadError(format!("Wait for navigation failed: {}", e)))?;

        std::thread::sleep(settle);
        debug!("navigated to {}", self.tab.get_url());
        Ok(())
    }

    /// Pause every request of the tab and keep the URLs of media streams.
    fn record_requests(&self) -> Result<()> {
        self.tab.enable_fetch(None, Some(false))?;

        let seen = Arc::clone(&self.requests);
        let interceptor: Arc<dyn RequestInterceptor + Send + Sync> = Arc::new(
            move |_transport, _session_id, event: RequestPausedEvent| {
                record_playback(&seen, &event.params.request.url);
                RequestPausedDecision::Continue(None)
            },
        );

        self.tab.enable_request_interception(interceptor)?;
        Ok(())
    }

    /// Evaluate a script that returns `JSON.stringify(...)` and parse the result.
    fn eval_json<T: DeserializeOwned>(&self, script: &str, await_promise: bool) -> Result<T> {
        let eval = self
            .tab
            .evaluate(script, await_promise)
            .map_err(|e| Error::ScriptError(format!("Evaluation failed: {}", e)))?;

        let text = match eval.value {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => {
                return Err(Error::ScriptError(format!("Expected a JSON string, got {}", other)))
            }
            None => return Err(Error::ScriptError("No value returned from evaluation".into())),
        };
        serde_json::from_str(&text)
            .map_err(|e| Error::ScriptError(format!("Malformed evaluation result: {}", e)))
    }

    fn scroll_script(selector: &str, top: Option<f64>) -> String {
        render(
            SCROLL_METRICS_JS,
            &[
                ("SELECTOR", js_string(selector)),
                ("SET", top.is_some().to_string()),
                ("TOP", top.unwrap_or(0.0).to_string()),
            ],
        )
    }

    pub fn close(self) -> Result<()> {
        drop(self.tab);
        drop(self.browser);
        Ok(())
    }
}

impl DocumentView for CdpView {
    fn title(&self) -> Result<String> {
        self.tab
            .get_title()
            .map_err(|e| Error::RenderError(format!("Failed to get title: {}", e)))
    }

    fn url(&self) -> Result<String> {
        Ok(self.tab.get_url())
    }

    fn viewport_height(&self) -> Result<f64> {
        self.eval_json("JSON.stringify(window.innerHeight)", false)
    }

    fn collect(&self, selector: &str) -> Result<Vec<ElementInfo>> {
        let script = render(COLLECT_JS, &[("SELECTOR", js_string(selector))]);
        self.eval_json(&script, false)
    }

    fn scroll_metrics(&self, selector: &str) -> Result<Option<ScrollMetrics>> {
        self.eval_json(&Self::scroll_script(selector, None), false)
    }

    fn set_scroll_top(&mut self, selector: &str, top: f64) -> Result<ScrollMetrics> {
        let metrics: Option<ScrollMetrics> =
            self.eval_json(&Self::scroll_script(selector, Some(top)), false)?;
        metrics.ok_or_else(|| Error::ScriptError(format!("No element matches {}", selector)))
    }

    fn read_pixels(&self, handle: &ElementHandle) -> Result<RgbaImage> {
        let script = render(READ_PIXELS_JS, &[("SELECTOR", handle_selector(handle))]);
        let data_url: String = self.eval_json(&script, false)?;
        decode_data_url(&data_url)
    }

    fn serialize_vector(&self, handle: &ElementHandle) -> Result<String> {
        let script = render(SERIALIZE_VECTOR_JS, &[("SELECTOR", handle_selector(handle))]);
        self.eval_json(&script, false)
    }

    fn decode_vector(&self, markup: &str, width: u32, height: u32) -> Result<RgbaImage> {
        let timeout_ms = self.vector_timeout.as_millis() as u64;
        let script = render(
            DECODE_VECTOR_JS,
            &[
                ("MARKUP", js_string(markup)),
                ("TIMEOUT", timeout_ms.to_string()),
                ("WIDTH", width.to_string()),
                ("HEIGHT", height.to_string()),
            ],
        );
        let decoded: VectorDecode = self.eval_json(&script, true)?;
        if decoded.timed_out {
            return Err(Error::Timeout(timeout_ms));
        }
        match decoded.data_url {
            Some(url) => decode_data_url(&url),
            None => Err(Error::RenderError("Vector decode returned no image".into())),
        }
    }

    fn media_sources(&self) -> Result<Vec<MediaSource>> {
        self.eval_json(MEDIA_SOURCES_JS, false)
    }

    fn drain_requests(&self) -> Vec<String> {
        match self.requests.lock() {
            Ok(mut urls) => std::mem::take(&mut *urls),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

/// Keep `url` for `drain_requests` if it carries a video or audio stream.
fn record_playback(seen: &Mutex<Vec<String>>, url: &str) {
    if classify_request(url).is_none() {
        return;
    }
    if let Ok(mut urls) = seen.lock() {
        urls.push(url.to_string());
    }
}

/// Replace `{{NAME}}` placeholders in a script template.
fn render(template: &str, vars: &[(&str, String)]) -> String {
    vars.iter().fold(template.to_string(), |script, (name, value)| {
        script.replace(&format!("{{{{{}}}}}", name), value)
    })
}

/// A JS string literal for `s`
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn handle_selector(handle: &ElementHandle) -> String {
    js_string(&format!("[data-drivecap-id=\"{}\"]", handle.as_str()))
}

/// Decode a `data:image/...;base64,` URL into pixels.
fn decode_data_url(data_url: &str) -> Result<RgbaImage> {
    let (_, payload) = data_url
        .split_once(";base64,")
        .ok_or_else(|| Error::RenderError("Expected a base64 data URL".into()))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| Error::RenderError(format!("Invalid base64 image data: {}", e)))?;
    Ok(image::load_from_memory(&bytes)?.to_rgba8())
}
