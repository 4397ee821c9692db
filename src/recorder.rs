//! Capture of a human's interactive session as [`RecordedAction`]s.
//!
//! An in-page listener hands raw click/input/submit events to the host
//! through the driver's event channel the moment they fire, so a click that
//! leaves for another origin is not lost. Drivers without a channel get a
//! `sessionStorage` queue instead. [`Recorder::poll`] re-injects the listener
//! (navigation tears it down), collects both sources, ranks selectors with
//! the same synthesizer used for filling, and watches the URL for
//! navigations.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::config::RecorderConfig;
use crate::driver::Driver;
use crate::error::{DriverError, Result};
use crate::selector::{SelectorSource, SelectorStrategy, selector_for};
use crate::types::{FieldDescriptor, HIDDEN_VALUE};

/// Page-scoped flag that makes injection idempotent.
pub const RECORDER_MARKER: &str = "__formpilotRecorder";

const QUEUE_KEY: &str = "__formpilotQueue";

/// Name of the page-callable function behind the driver's event channel.
pub const EVENT_CHANNEL: &str = "__formpilotEmit";

/// Returns the queued raw events as a JSON string and empties the queue.
pub const DRAIN_JS: &str = r#"
(() => {
  let queue = [];
  try {
    queue = JSON.parse(sessionStorage.getItem('__formpilotQueue') || '[]');
    sessionStorage.removeItem('__formpilotQueue');
  } catch (e) {}
  if (window.__formpilotFallback) {
    queue = queue.concat(window.__formpilotFallback);
    window.__formpilotFallback = [];
  }
  return JSON.stringify(queue);
})()
"#;

/// Listener script. Returns `true` when it attached, `false` when the page
/// already had it.
pub fn inject_js(keep_passwords: bool) -> String {
    format!(
        r#"
(() => {{
  if (window.{RECORDER_MARKER}) return false;
  window.{RECORDER_MARKER} = true;
  const KEEP_PASSWORDS = {keep_passwords};
  const KEY = '{QUEUE_KEY}';
  const opt = (v) => (v === undefined || v === null || v === '' ? null : String(v));

  const push = (event) => {{
    const emit = window.{EVENT_CHANNEL};
    if (typeof emit === 'function') {{
      try {{
        emit(JSON.stringify(event));
        return;
      }} catch (e) {{}}
    }}
    try {{
      const queue = JSON.parse(sessionStorage.getItem(KEY) || '[]');
      queue.push(event);
      sessionStorage.setItem(KEY, JSON.stringify(queue));
    }} catch (e) {{
      (window.__formpilotFallback = window.__formpilotFallback || []).push(event);
    }}
  }};

  const labelOf = (el) => {{
    if (el.id) {{
      const byFor = document.querySelector('label[for="' + CSS.escape(el.id) + '"]');
      if (byFor) return opt(byFor.textContent.trim());
    }}
    const parent = el.closest && el.closest('label');
    return parent ? opt(parent.textContent.trim()) : null;
  }};

  const ordinal = (el) => {{
    let n = 1;
    for (let sib = el.previousElementSibling; sib; sib = sib.previousElementSibling) {{
      if (sib.tagName === el.tagName) n++;
    }}
    return n;
  }};

  const snapshot = (el) => {{
    const isPassword = (el.type || '').toLowerCase() === 'password';
    return {{
      tagName: el.tagName.toLowerCase(),
      type: opt(el.type),
      id: opt(el.id),
      name: opt(el.getAttribute && el.getAttribute('name')),
      className: typeof el.className === 'string' ? opt(el.className.trim()) : null,
      placeholder: opt(el.getAttribute && el.getAttribute('placeholder')),
      ariaLabel: opt(el.getAttribute && el.getAttribute('aria-label')),
      role: opt(el.getAttribute && el.getAttribute('role')),
      text: opt((el.textContent || '').trim().slice(0, 100)),
      value: isPassword ? null : opt(el.value),
      label: labelOf(el),
      ordinal: ordinal(el),
    }};
  }};

  document.addEventListener('click', (e) => {{
    const target = e.target;
    if (!(target instanceof Element)) return;
    const el = target.closest('button, a, input, select, textarea, label, [role="button"], [role="switch"], [role="link"]') || target;
    push({{ kind: 'click', timestamp: Date.now(), url: location.href, element: snapshot(el) }});
  }}, true);

  document.addEventListener('input', (e) => {{
    const el = e.target;
    if (!el || !['INPUT', 'TEXTAREA', 'SELECT'].includes(el.tagName)) return;
    const hidden = (el.type || '').toLowerCase() === 'password' && !KEEP_PASSWORDS;
    push({{
      kind: 'input',
      timestamp: Date.now(),
      url: location.href,
      element: snapshot(el),
      value: hidden ? '{HIDDEN_VALUE}' : String(el.value),
    }});
  }}, true);

  document.addEventListener('submit', (e) => {{
    const form = e.target;
    if (!(form instanceof Element)) return;
    push({{ kind: 'submit', timestamp: Date.now(), url: location.href, element: snapshot(form) }});
  }}, true);

  return true;
}})()
"#
    )
}

/// Identity and state of the element an action targeted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementSnapshot {
    pub tag_name: String,
    #[serde(rename = "type")]
    pub input_type: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub class_name: Option<String>,
    pub placeholder: Option<String>,
    pub aria_label: Option<String>,
    pub role: Option<String>,
    pub text: Option<String>,
    pub value: Option<String>,
    pub label: Option<String>,
    pub ordinal: usize,
}

impl ElementSnapshot {
    pub fn is_password(&self) -> bool {
        self.input_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("password"))
    }

    /// Key used when turning recorded inputs into an override table:
    /// name, then id, then label, then placeholder.
    pub fn field_key(&self) -> Option<&str> {
        [
            self.name.as_deref(),
            self.id.as_deref(),
            self.label.as_deref(),
            self.placeholder.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|k| !k.is_empty())
    }

    /// Short human description for comments and logs.
    pub fn describe(&self) -> &str {
        [
            self.text.as_deref(),
            self.aria_label.as_deref(),
            self.name.as_deref(),
            self.placeholder.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|k| !k.is_empty())
        .unwrap_or(&self.tag_name)
    }
}

impl From<&FieldDescriptor> for ElementSnapshot {
    fn from(field: &FieldDescriptor) -> Self {
        Self {
            tag_name: field.tag_name.clone(),
            input_type: Some(field.input_type.clone()),
            id: field.id.clone(),
            name: field.name.clone(),
            class_name: field.class_name.clone(),
            placeholder: field.placeholder.clone(),
            aria_label: field.aria_label.clone(),
            role: field.role.clone(),
            text: field.text.clone(),
            value: field.value.clone(),
            label: (!field.label.is_empty()).then(|| field.label.clone()),
            ordinal: field.ordinal,
        }
    }
}

impl SelectorSource for ElementSnapshot {
    fn tag_name(&self) -> &str {
        &self.tag_name
    }
    fn input_type(&self) -> Option<&str> {
        self.input_type.as_deref()
    }
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    fn placeholder(&self) -> Option<&str> {
        self.placeholder.as_deref()
    }
    fn aria_label(&self) -> Option<&str> {
        self.aria_label.as_deref()
    }
    fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
    fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }
    fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }
    fn ordinal(&self) -> usize {
        self.ordinal
    }
}

/// One captured user action. Stored logs are JSON arrays of these, tagged by
/// `type`; types this version does not know load as [`RecordedAction::Unknown`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecordedAction {
    Click {
        timestamp: i64,
        url: String,
        selector: SelectorStrategy,
        element: ElementSnapshot,
    },
    Input {
        timestamp: i64,
        url: String,
        selector: SelectorStrategy,
        element: ElementSnapshot,
        value: String,
    },
    Submit {
        timestamp: i64,
        url: String,
        selector: SelectorStrategy,
    },
    Navigation {
        timestamp: i64,
        from: String,
        to: String,
    },
    #[serde(other)]
    Unknown,
}

impl RecordedAction {
    pub fn kind(&self) -> &'static str {
        match self {
            RecordedAction::Click { .. } => "click",
            RecordedAction::Input { .. } => "input",
            RecordedAction::Submit { .. } => "submit",
            RecordedAction::Navigation { .. } => "navigation",
            RecordedAction::Unknown => "unknown",
        }
    }

    /// URL active when the action happened; navigations have none.
    pub fn url(&self) -> Option<&str> {
        match self {
            RecordedAction::Click { url, .. }
            | RecordedAction::Input { url, .. }
            | RecordedAction::Submit { url, .. } => Some(url),
            RecordedAction::Navigation { .. } | RecordedAction::Unknown => None,
        }
    }

    pub fn selector(&self) -> Option<&SelectorStrategy> {
        match self {
            RecordedAction::Click { selector, .. }
            | RecordedAction::Input { selector, .. }
            | RecordedAction::Submit { selector, .. } => Some(selector),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> Option<i64> {
        match self {
            RecordedAction::Click { timestamp, .. }
            | RecordedAction::Input { timestamp, .. }
            | RecordedAction::Submit { timestamp, .. }
            | RecordedAction::Navigation { timestamp, .. } => Some(*timestamp),
            RecordedAction::Unknown => None,
        }
    }
}

/// Event as queued by the in-page listener.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    kind: String,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    url: String,
    #[serde(default)]
    element: ElementSnapshot,
    #[serde(default)]
    value: Option<String>,
}

/// Unwrap one event-channel payload into the event object.
///
/// Pages loaded after the channel opened call it through a wrapper that
/// nests the argument list as `{name, seq, args}`; the current page calls the
/// raw binding with the event JSON directly.
pub fn decode_channel_payload(payload: &serde_json::Value) -> Option<serde_json::Value> {
    let mut value = payload.clone();
    loop {
        if let serde_json::Value::String(json) = &value {
            value = serde_json::from_str(json).ok()?;
            continue;
        }
        let wrapped = value.get("name").and_then(|n| n.as_str()) == Some(EVENT_CHANNEL)
            && value.get("seq").is_some();
        if !wrapped {
            return value.is_object().then_some(value);
        }
        value = value.get("args")?.get(0)?.clone();
    }
}

/// Recorded field values in first-seen key order; a later input to the same
/// key replaces the value.
pub fn form_data(actions: &[RecordedAction]) -> Vec<(String, String)> {
    let mut data: Vec<(String, String)> = Vec::new();
    for action in actions {
        let RecordedAction::Input { element, value, .. } = action else {
            continue;
        };
        let Some(key) = element.field_key() else {
            continue;
        };
        let value = value.trim().to_string();
        match data.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => data.push((key.to_string(), value)),
        }
    }
    data
}

/// Counts per action type plus the captured field values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSummary {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    /// Field key and display value; hidden passwords show as `(hidden)`.
    pub fields: Vec<(String, String)>,
}

impl RecordingSummary {
    pub fn from_actions(actions: &[RecordedAction]) -> Self {
        let mut by_type = BTreeMap::new();
        for action in actions {
            *by_type.entry(action.kind().to_string()).or_insert(0) += 1;
        }
        let fields = form_data(actions)
            .into_iter()
            .map(|(k, v)| {
                let shown = if v == HIDDEN_VALUE { "(hidden)".to_string() } else { v };
                (k, shown)
            })
            .collect();
        Self {
            total: actions.len(),
            by_type,
            fields,
        }
    }
}

impl std::fmt::Display for RecordingSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Total actions: {}", self.total)?;
        for (kind, count) in &self.by_type {
            writeln!(f, "  {kind}: {count}")?;
        }
        if !self.fields.is_empty() {
            writeln!(f, "Recorded fields:")?;
            for (key, value) in &self.fields {
                writeln!(f, "  {key}: {value}")?;
            }
        }
        Ok(())
    }
}

/// Passive session capture. Performs no writes to the page beyond its
/// listener.
pub struct Recorder<'a, D: Driver + ?Sized> {
    driver: &'a D,
    config: RecorderConfig,
    actions: Vec<RecordedAction>,
    last_url: Option<String>,
    recording: bool,
    channel: bool,
}

impl<'a, D: Driver + ?Sized> Recorder<'a, D> {
    pub fn new(driver: &'a D, config: RecorderConfig) -> Self {
        Self {
            driver,
            config,
            actions: Vec::new(),
            last_url: None,
            recording: false,
            channel: false,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn actions(&self) -> &[RecordedAction] {
        &self.actions
    }

    pub fn summary(&self) -> RecordingSummary {
        RecordingSummary::from_actions(&self.actions)
    }

    /// Reset the log and attach to the current page.
    pub fn start_recording(&mut self) -> Result<()> {
        info!(target: "formpilot::recorder", "[Recorder] Starting action recording");
        self.actions.clear();
        self.last_url = Some(self.driver.url()?);
        self.recording = true;
        if !self.channel {
            self.channel = match self.driver.open_event_channel(EVENT_CHANNEL) {
                Ok(open) => open,
                Err(e) if e.is_recoverable() => {
                    warn!(target: "formpilot::recorder", "[Recorder] No event channel, using page queue: {e}");
                    false
                }
                Err(e) => return Err(e.into()),
            };
        }
        self.inject()?;
        Ok(())
    }

    fn inject(&self) -> std::result::Result<(), DriverError> {
        match self.driver.evaluate(&inject_js(self.config.keep_passwords)) {
            Ok(attached) => {
                if attached.as_bool() == Some(true) {
                    debug!(target: "formpilot::recorder", "[Recorder] Listener attached");
                }
                Ok(())
            }
            // The page is mid-navigation; the next poll attaches again.
            Err(e) if e.is_recoverable() => {
                debug!(target: "formpilot::recorder", "[Recorder] Injection skipped: {e}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Channel events first, then whatever the page queue still holds.
    fn drain(&self) -> std::result::Result<Vec<RawEvent>, DriverError> {
        let mut items: Vec<serde_json::Value> = Vec::new();
        if self.channel {
            for payload in self.driver.take_channel_events()? {
                match decode_channel_payload(&payload) {
                    Some(event) => items.push(event),
                    None => debug!(target: "formpilot::recorder", "[Recorder] Undecodable channel payload"),
                }
            }
        }

        let raw = match self.driver.evaluate(DRAIN_JS) {
            Ok(value) => value,
            Err(e) if e.is_recoverable() => serde_json::Value::Null,
            Err(e) => return Err(e),
        };
        let parsed = match raw {
            serde_json::Value::String(json) => serde_json::from_str::<Vec<serde_json::Value>>(&json),
            serde_json::Value::Array(items) => Ok(items),
            _ => Ok(Vec::new()),
        };
        items.extend(parsed.map_err(|e| DriverError::Evaluation(format!("event queue: {e}")))?);
        Ok(items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<RawEvent>(item) {
                Ok(event) => Some(event),
                Err(e) => {
                    debug!(target: "formpilot::recorder", "[Recorder] Dropping malformed event: {e}");
                    None
                }
            })
            .collect())
    }

    /// Turn a raw event into an action, or `None` for kinds we do not record.
    fn normalize(&self, event: RawEvent) -> Option<RecordedAction> {
        let RawEvent {
            kind,
            timestamp,
            url,
            mut element,
            value,
        } = event;
        if element.is_password() {
            element.value = None;
        }
        let selector = selector_for(&element);

        match kind.as_str() {
            "click" => Some(RecordedAction::Click {
                timestamp,
                url,
                selector,
                element,
            }),
            "input" => {
                let value = if element.is_password() && !self.config.keep_passwords {
                    HIDDEN_VALUE.to_string()
                } else {
                    value.unwrap_or_default()
                };
                Some(RecordedAction::Input {
                    timestamp,
                    url,
                    selector,
                    element,
                    value,
                })
            }
            "submit" => Some(RecordedAction::Submit {
                timestamp,
                url,
                selector,
            }),
            other => {
                debug!(target: "formpilot::recorder", "[Recorder] Ignoring event kind {other}");
                None
            }
        }
    }

    fn push(&mut self, action: RecordedAction) {
        // Keystrokes into one field collapse into its final value.
        if let RecordedAction::Input {
            url, selector, value, ..
        } = &action
        {
            if let Some(RecordedAction::Input {
                url: last_url,
                selector: last_selector,
                value: last_value,
                timestamp: last_ts,
                ..
            }) = self.actions.last_mut()
            {
                if *last_url == *url && *last_selector == *selector {
                    *last_value = value.clone();
                    if let Some(ts) = action.timestamp() {
                        *last_ts = ts;
                    }
                    return;
                }
            }
        }

        match &action {
            RecordedAction::Input { selector, value, element, .. } => {
                let shown = if element.is_password() { HIDDEN_VALUE } else { value.as_str() };
                debug!(target: "formpilot::recorder", "[Recorder] input {} = {shown}", selector.selector);
            }
            RecordedAction::Navigation { to, .. } => {
                info!(target: "formpilot::recorder", "[Recorder] navigation -> {to}");
            }
            other => {
                if let Some(selector) = other.selector() {
                    debug!(target: "formpilot::recorder", "[Recorder] {} {}", other.kind(), selector.selector);
                }
            }
        }
        self.actions.push(action);
    }

    /// Re-attach, drain queued events and detect a URL change. Returns how
    /// many actions the log grew by.
    pub fn poll(&mut self) -> Result<usize> {
        if !self.recording {
            return Ok(0);
        }
        let before = self.actions.len();

        self.inject()?;
        let mut events = self.drain()?;
        events.sort_by_key(|e| e.timestamp);

        let current = self.driver.url()?;
        let previous = self.last_url.clone().unwrap_or_default();

        if current == previous {
            for event in events {
                if let Some(action) = self.normalize(event) {
                    self.push(action);
                }
            }
        } else {
            // Events from the old page come first, then the navigation.
            let (old, new): (Vec<_>, Vec<_>) = events.into_iter().partition(|e| e.url == previous);
            for event in old {
                if let Some(action) = self.normalize(event) {
                    self.push(action);
                }
            }
            self.push(RecordedAction::Navigation {
                timestamp: Utc::now().timestamp_millis(),
                from: previous,
                to: current.clone(),
            });
            for event in new {
                if let Some(action) = self.normalize(event) {
                    self.push(action);
                }
            }
            self.last_url = Some(current);
        }

        Ok(self.actions.len() - before)
    }

    /// Final drain, then hand back everything captured.
    pub fn stop_recording(&mut self) -> Result<Vec<RecordedAction>> {
        if let Err(e) = self.poll() {
            warn!(target: "formpilot::recorder", "[Recorder] Final poll failed: {e}");
        }
        self.recording = false;
        info!(target: "formpilot::recorder", "[Recorder] Recorded {} actions", self.actions.len());
        Ok(self.actions.clone())
    }

    /// Poll until `stop` is raised or the browser goes away. Actions captured
    /// so far are always returned.
    pub fn run_until(&mut self, stop: &AtomicBool) -> Result<Vec<RecordedAction>> {
        if !self.recording {
            self.start_recording()?;
        }
        while !stop.load(Ordering::SeqCst) {
            if let Err(e) = self.poll() {
                warn!(target: "formpilot::recorder", "[Recorder] Browser unavailable, stopping: {e}");
                break;
            }
            self.driver.pause(self.config.poll_interval);
        }
        self.stop_recording()
    }
}
