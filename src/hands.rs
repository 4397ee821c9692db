//! Chrome-backed [`Driver`] over `headless_chrome`.
//!
//! Every query is resolved in-page by [`resolve_query_js`], which stamps the
//! match with a scratch attribute so the CDP element lookup can use plain CSS.

use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;
use serde_json::Value;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::LaunchConfig;
use crate::dom::{SETTLE_PROBE_JS, resolve_query_js};
use crate::driver::{Driver, Query, quote};
use crate::error::{DriverError, DriverResult};
use crate::types::SelectOption;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Resource count must stay flat this long for the page to count as settled.
const QUIET_WINDOW: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct ElementState {
    visible: bool,
    enabled: bool,
    checked: bool,
}

#[derive(Debug, Deserialize)]
struct SettleProbe {
    ready: String,
    resources: u64,
}

fn state_js(css: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({});
  if (!el) return null;
  const s = getComputedStyle(el);
  const r = el.getBoundingClientRect();
  return JSON.stringify({{
    visible: s.display !== 'none' && s.visibility !== 'hidden' && r.width > 0 && r.height > 0,
    enabled: !el.disabled && el.getAttribute('aria-disabled') !== 'true',
    checked: !!el.checked || el.getAttribute('aria-checked') === 'true',
  }});
}})()"#,
        quote(css)
    )
}

fn clear_js(css: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({});
  if (!el) return false;
  if (el.isContentEditable) el.textContent = '';
  else el.value = '';
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return true;
}})()"#,
        quote(css)
    )
}

fn options_js(css: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({}); \
         return el && el.options ? JSON.stringify(Array.from(el.options).map((o) => ({{ value: o.value, text: o.text.trim() }}))) : null; }})()",
        quote(css)
    )
}

fn select_js(css: &str, index: usize) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({});
  if (!el || !el.options || {index} >= el.options.length) return false;
  el.selectedIndex = {index};
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return true;
}})()"#,
        quote(css)
    )
}

fn attribute_js(css: &str, name: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({}); return el ? el.getAttribute({}) : null; }})()",
        quote(css),
        quote(name)
    )
}

/// Browser-side failures that mean the session is gone are fatal; anything
/// else is attributed to the script or element.
fn classify(e: impl std::fmt::Display) -> DriverError {
    let message = e.to_string();
    let lower = message.to_lowercase();
    if ["connection", "closed", "disconnected", "channel"]
        .iter()
        .any(|t| lower.contains(t))
    {
        DriverError::Transport(message)
    } else {
        DriverError::Evaluation(message)
    }
}

/// Chrome binary from the config, the usual install locations, then
/// whatever `headless_chrome` can find on `PATH`.
pub fn find_chrome(configured: Option<&Path>) -> DriverResult<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        warn!(target: "formpilot::hands", "[Hands] Configured Chrome not found: {}", path.display());
    }

    let mut candidates = vec![
        PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
        PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
        PathBuf::from("/usr/bin/google-chrome"),
        PathBuf::from("/usr/bin/chromium"),
        PathBuf::from("/usr/bin/chromium-browser"),
    ];
    if let Some(local) = dirs::data_local_dir() {
        candidates.push(
            local
                .join("Google")
                .join("Chrome")
                .join("Application")
                .join("chrome.exe"),
        );
    }

    if let Some(path) = candidates.into_iter().find(|p| p.exists()) {
        return Ok(path);
    }

    headless_chrome::browser::default_executable().map(PathBuf::from).map_err(|e| {
        DriverError::Launch(format!(
            "Chrome executable not found ({e}). Set FORMPILOT_CHROME to its path."
        ))
    })
}

/// One Chrome tab driven over the DevTools protocol.
pub struct ChromeDriver {
    _browser: Browser,
    tab: Arc<Tab>,
    stamp: AtomicU64,
    /// Payloads pushed by the page through an exposed binding.
    channel: Arc<Mutex<Vec<Value>>>,
}

impl ChromeDriver {
    /// Attach to a running Chrome when `attach_url` is set, otherwise (or if
    /// attaching fails) launch a new one.
    pub fn launch(config: &LaunchConfig) -> DriverResult<Self> {
        if let Some(url) = &config.attach_url {
            info!(target: "formpilot::hands", "[Hands] Attempting to attach to Chrome at {url}");
            match Browser::connect(url.clone()) {
                Ok(browser) => {
                    let existing = browser
                        .get_tabs()
                        .lock()
                        .map_err(|e| DriverError::Transport(e.to_string()))?
                        .first()
                        .cloned();
                    let tab = match existing {
                        Some(tab) => tab,
                        None => browser.new_tab().map_err(classify)?,
                    };
                    info!(target: "formpilot::hands", "[Hands] Attached to existing Chrome");
                    return Ok(Self::from_parts(browser, tab));
                }
                Err(e) => {
                    warn!(target: "formpilot::hands", "[Hands] Could not attach ({e}), launching instead");
                }
            }
        }

        let path = find_chrome(config.chrome_path.as_deref())?;
        if let Some(dir) = &config.user_data_dir {
            std::fs::create_dir_all(dir)?;
        }

        let options = LaunchOptions {
            headless: config.headless,
            path: Some(path),
            window_size: Some(config.window_size),
            user_data_dir: config.user_data_dir.clone(),
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-infobars"),
                OsStr::new("--password-store=basic"),
            ],
            idle_browser_timeout: config.idle_timeout,
            ..Default::default()
        };

        info!(target: "formpilot::hands", "[Hands] Starting Chrome (headless: {})", config.headless);
        let browser = Browser::new(options).map_err(|e| DriverError::Launch(e.to_string()))?;
        let tab = browser.new_tab().map_err(|e| DriverError::Launch(e.to_string()))?;
        info!(target: "formpilot::hands", "[Hands] Chrome ready");
        Ok(Self::from_parts(browser, tab))
    }

    fn from_parts(browser: Browser, tab: Arc<Tab>) -> Self {
        Self {
            _browser: browser,
            tab,
            stamp: AtomicU64::new(0),
            channel: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    fn eval_string(&self, script: &str) -> DriverResult<Option<String>> {
        Ok(self.evaluate(script)?.as_str().map(String::from))
    }

    /// CSS for the element `selector` currently points at, if any.
    fn resolve(&self, selector: &str) -> DriverResult<Option<String>> {
        let query = Query::parse(selector)?;
        let stamp = self.stamp.fetch_add(1, Ordering::Relaxed);
        self.eval_string(&resolve_query_js(&query, stamp))
    }

    fn state(&self, css: &str) -> DriverResult<Option<ElementState>> {
        match self.eval_string(&state_js(css))? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| DriverError::Evaluation(e.to_string())),
            None => Ok(None),
        }
    }

    /// Resolved CSS and state of the first match satisfying `accept`, polled
    /// until `timeout`.
    fn wait_for(
        &self,
        selector: &str,
        timeout: Duration,
        accept: impl Fn(&ElementState) -> bool,
    ) -> DriverResult<Option<(String, ElementState)>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(css) = self.resolve(selector)? {
                if let Some(state) = self.state(&css)? {
                    if accept(&state) {
                        return Ok(Some((css, state)));
                    }
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn require(&self, selector: &str) -> DriverResult<String> {
        self.resolve(selector)?
            .ok_or_else(|| DriverError::NotFound(selector.to_string()))
    }

    fn click_css(&self, selector: &str, css: &str) -> DriverResult<()> {
        let element = self.tab.find_element(css).map_err(|e| DriverError::NotFound(format!("{selector}: {e}")))?;
        element
            .click()
            .map_err(|e| DriverError::NotInteractable {
                selector: selector.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

impl Driver for ChromeDriver {
    fn url(&self) -> DriverResult<String> {
        Ok(self.tab.get_url())
    }

    fn goto(&self, url: &str) -> DriverResult<()> {
        debug!(target: "formpilot::hands", "[Hands] Navigating to {url}");
        self.tab.navigate_to(url).map_err(classify)?;
        self.tab.wait_until_navigated().map_err(|e| DriverError::Timeout {
            what: format!("navigation to {url}: {e}"),
            ms: 0,
        })?;
        Ok(())
    }

    fn evaluate(&self, script: &str) -> DriverResult<Value> {
        let result = self.tab.evaluate(script, false).map_err(classify)?;
        Ok(result.value.unwrap_or(Value::Null))
    }

    fn is_visible(&self, selector: &str, timeout: Duration) -> DriverResult<bool> {
        Ok(self.wait_for(selector, timeout, |s| s.visible)?.is_some())
    }

    fn wait_enabled(&self, selector: &str, timeout: Duration) -> DriverResult<bool> {
        Ok(self
            .wait_for(selector, timeout, |s| s.visible && s.enabled)?
            .is_some())
    }

    fn click(&self, selector: &str, timeout: Duration) -> DriverResult<()> {
        let Some((css, state)) = self.wait_for(selector, timeout, |s| s.visible)? else {
            return Err(DriverError::Timeout {
                what: format!("{selector} to become visible"),
                ms: timeout.as_millis() as u64,
            });
        };
        if !state.enabled {
            return Err(DriverError::NotInteractable {
                selector: selector.to_string(),
                reason: "disabled".into(),
            });
        }
        self.click_css(selector, &css)
    }

    fn is_checked(&self, selector: &str) -> DriverResult<bool> {
        let css = self.require(selector)?;
        Ok(self.state(&css)?.is_some_and(|s| s.checked))
    }

    fn set_checked(&self, selector: &str, checked: bool) -> DriverResult<()> {
        let css = self.require(selector)?;
        let current = self
            .state(&css)?
            .ok_or_else(|| DriverError::NotFound(selector.to_string()))?;
        if current.checked == checked {
            return Ok(());
        }
        if !current.enabled {
            return Err(DriverError::NotInteractable {
                selector: selector.to_string(),
                reason: "disabled".into(),
            });
        }
        self.click_css(selector, &css)
    }

    fn attribute(&self, selector: &str, name: &str) -> DriverResult<Option<String>> {
        let css = self.require(selector)?;
        self.eval_string(&attribute_js(&css, name))
    }

    fn clear(&self, selector: &str) -> DriverResult<()> {
        let css = self.require(selector)?;
        match self.evaluate(&clear_js(&css))?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(DriverError::NotFound(selector.to_string())),
        }
    }

    fn type_text(&self, selector: &str, text: &str) -> DriverResult<()> {
        let css = self.require(selector)?;
        let element = self
            .tab
            .find_element(&css)
            .map_err(|e| DriverError::NotFound(format!("{selector}: {e}")))?;
        element.focus().map_err(|e| DriverError::NotInteractable {
            selector: selector.to_string(),
            reason: e.to_string(),
        })?;
        self.tab.type_str(text).map_err(classify)?;
        Ok(())
    }

    fn options(&self, selector: &str) -> DriverResult<Vec<SelectOption>> {
        let css = self.require(selector)?;
        let json = self
            .eval_string(&options_js(&css))?
            .ok_or_else(|| DriverError::NotInteractable {
                selector: selector.to_string(),
                reason: "not a select".into(),
            })?;
        serde_json::from_str(&json).map_err(|e| DriverError::Evaluation(e.to_string()))
    }

    fn select_index(&self, selector: &str, index: usize) -> DriverResult<()> {
        let css = self.require(selector)?;
        match self.evaluate(&select_js(&css, index))?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(DriverError::NotInteractable {
                selector: selector.to_string(),
                reason: format!("no option at index {index}"),
            }),
        }
    }

    fn wait_for_settle(&self, timeout: Duration) -> DriverResult<()> {
        let deadline = Instant::now() + timeout;
        let mut last: Option<(u64, Instant)> = None;
        loop {
            let probe = self
                .eval_string(SETTLE_PROBE_JS)?
                .and_then(|json| serde_json::from_str::<SettleProbe>(&json).ok());
            if let Some(probe) = probe {
                let now = Instant::now();
                match last {
                    Some((count, since))
                        if count == probe.resources
                            && probe.ready == "complete"
                            && now.duration_since(since) >= QUIET_WINDOW =>
                    {
                        return Ok(());
                    }
                    Some((count, _)) if count == probe.resources => {}
                    _ => last = Some((probe.resources, now)),
                }
            }
            if Instant::now() >= deadline {
                debug!(target: "formpilot::hands", "[Hands] Settle wait timed out after {timeout:?}");
                return Ok(());
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn screenshot(&self, path: &Path) -> DriverResult<()> {
        let png = self
            .tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(classify)?;
        std::fs::write(path, png)?;
        Ok(())
    }

    fn open_event_channel(&self, name: &str) -> DriverResult<bool> {
        let queue = Arc::clone(&self.channel);
        self.tab.enable_runtime().map_err(classify)?;
        self.tab
            .expose_function(
                name,
                Arc::new(move |payload: Value| {
                    if let Ok(mut queue) = queue.lock() {
                        queue.push(payload);
                    }
                }),
            )
            .map_err(classify)?;
        debug!(target: "formpilot::hands", "[Hands] Event channel {name} open");
        Ok(true)
    }

    fn take_channel_events(&self) -> DriverResult<Vec<Value>> {
        let mut queue = self
            .channel
            .lock()
            .map_err(|e| DriverError::Transport(format!("event channel: {e}")))?;
        Ok(std::mem::take(&mut *queue))
    }
}
