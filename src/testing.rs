//! Scripted in-memory page for exercising the engine without a browser.

use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dom::{FIELD_SCAN_JS, TITLE_JS};
use crate::driver::{Driver, Query};
use crate::error::{DriverError, DriverResult};
use crate::recorder::{DRAIN_JS, ElementSnapshot, RECORDER_MARKER};
use crate::selector::selector_for;
use crate::types::{FieldDescriptor, FieldKind, Rect, SelectOption};

/// A visible field fixture with the given tag and input subtype.
pub fn field(index: usize, tag: &str, input_type: &str) -> FieldDescriptor {
    let kind = match tag {
        "textarea" => FieldKind::Textarea,
        "select" => FieldKind::Select,
        "input" => FieldKind::Input,
        _ => FieldKind::ContentEditable,
    };
    let mut f = FieldDescriptor::new(index, kind, tag);
    f.input_type = input_type.to_string();
    f.rect = Rect {
        x: 10.0,
        y: 10.0 + 30.0 * index as f64,
        width: 200.0,
        height: 24.0,
    };
    f
}

#[derive(Debug, Clone)]
pub struct FakeButton {
    pub label: String,
    pub css: Option<String>,
    pub goes_to: Option<String>,
    pub enabled: bool,
    /// Only reachable through the scripted cross-frame click.
    pub in_frame: bool,
}

impl FakeButton {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            css: None,
            goes_to: None,
            enabled: true,
            in_frame: false,
        }
    }

    pub fn to(mut self, url: &str) -> Self {
        self.goes_to = Some(url.to_string());
        self
    }

    pub fn css(mut self, css: &str) -> Self {
        self.css = Some(css.to_string());
        self
    }

    pub fn in_frame(mut self) -> Self {
        self.in_frame = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct FakeToggle {
    pub selector: String,
    pub switch: bool,
    pub agreed: bool,
    /// Agreeing enables every button on the page.
    pub unlocks_buttons: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PageFixture {
    pub text: String,
    pub fields: Vec<FieldDescriptor>,
    pub buttons: Vec<FakeButton>,
    pub toggles: Vec<FakeToggle>,
    pub options: HashMap<String, Vec<SelectOption>>,
    /// Extra selectors that resolve to visible elements.
    pub elements: Vec<String>,
}

impl PageFixture {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::default()
        }
    }

    pub fn button(mut self, button: FakeButton) -> Self {
        self.buttons.push(button);
        self
    }

    pub fn toggle(mut self, selector: &str, switch: bool, unlocks_buttons: bool) -> Self {
        self.toggles.push(FakeToggle {
            selector: selector.to_string(),
            switch,
            agreed: false,
            unlocks_buttons,
        });
        self
    }

    pub fn element(mut self, selector: &str) -> Self {
        self.elements.push(selector.to_string());
        self
    }
}

#[derive(Default)]
struct State {
    url: String,
    pages: HashMap<String, PageFixture>,
    calls: Vec<String>,
    values: HashMap<String, String>,
    checked: HashMap<String, bool>,
    selected: HashMap<String, usize>,
    failing: HashSet<String>,
    /// Listener queues keyed by origin, like `sessionStorage`.
    queues: HashMap<String, Vec<Value>>,
    channel_supported: bool,
    channel_open: bool,
    channel: Vec<Value>,
    injections: usize,
    clock: i64,
    screenshots: Vec<PathBuf>,
}

/// `scheme://host[:port]` of `url`.
fn origin(url: &str) -> &str {
    let start = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[start..].find('/') {
        Some(end) => &url[..start + end],
        None => url,
    }
}

impl State {
    /// Hand an event over the way the in-page listener would.
    fn enqueue(&mut self, event: Value) {
        if self.channel_open {
            self.channel.push(Value::String(event.to_string()));
        } else {
            let origin = origin(&self.url).to_string();
            self.queues.entry(origin).or_default().push(event);
        }
    }

    fn page(&self) -> Option<&PageFixture> {
        self.pages.get(&self.url)
    }

    fn page_mut(&mut self) -> Option<&mut PageFixture> {
        let url = self.url.clone();
        self.pages.get_mut(&url)
    }

    fn field_selectors(&self) -> Vec<String> {
        self.page()
            .map(|p| p.fields.iter().map(|f| selector_for(f).selector).collect())
            .unwrap_or_default()
    }

    fn knows(&self, selector: &str) -> bool {
        self.page().is_some_and(|p| {
            p.elements.iter().any(|e| e == selector)
                || p.toggles.iter().any(|t| t.selector == selector)
                || p.buttons
                    .iter()
                    .any(|b| !b.in_frame && b.css.as_deref() == Some(selector))
        }) || self.field_selectors().iter().any(|s| s == selector)
    }

    /// Index of the main-document button a query points at.
    fn find_button(&self, selector: &str) -> Option<usize> {
        let page = self.page()?;
        let query = Query::parse(selector).ok()?;
        page.buttons.iter().position(|b| {
            if b.in_frame {
                return false;
            }
            let label = b.label.to_lowercase();
            match &query {
                Query::ExactText(text) => b.label == *text,
                Query::Role { role, name } => {
                    role == "button" && label.contains(&name.to_lowercase())
                }
                Query::HasText { text, .. } => label.contains(&text.to_lowercase()),
                Query::Css(css) => b.css.as_deref() == Some(css.as_str()),
            }
        })
    }

    /// Queue the event a live listener would have seen, once one is attached.
    fn observe(&mut self, kind: &str, element: Value, value: Option<&str>) {
        if self.injections == 0 {
            return;
        }
        self.clock += 1;
        let mut event = serde_json::json!({
            "kind": kind,
            "timestamp": self.clock,
            "url": self.url,
            "element": element,
        });
        if let Some(value) = value {
            event["value"] = Value::String(value.to_string());
        }
        self.enqueue(event);
    }

    fn field_snapshot(&self, selector: &str) -> Option<Value> {
        let field = self
            .page()?
            .fields
            .iter()
            .find(|f| selector_for(*f).selector == selector)?;
        serde_json::to_value(ElementSnapshot::from(field)).ok()
    }

    fn activate(&mut self, index: usize) -> DriverResult<()> {
        let Some(button) = self.page().map(|p| p.buttons[index].clone()) else {
            return Err(DriverError::NotFound("no page".into()));
        };
        if !button.enabled {
            return Err(DriverError::NotInteractable {
                selector: button.label,
                reason: "disabled".into(),
            });
        }
        self.calls.push(format!("press {}", button.label));
        let element = serde_json::json!({"tagName": "button", "text": button.label, "ordinal": index + 1});
        self.observe("click", element, None);
        if let Some(url) = button.goes_to {
            self.url = url;
        }
        Ok(())
    }
}

/// In-memory [`Driver`] backed by a map of page fixtures keyed by URL.
pub struct FakePage {
    state: RefCell<State>,
}

impl FakePage {
    pub fn new(url: &str) -> Self {
        let state = State {
            url: url.to_string(),
            ..State::default()
        };
        Self {
            state: RefCell::new(state),
        }
    }

    pub fn with_fields(self, fields: Vec<FieldDescriptor>) -> Self {
        let url = self.state.borrow().url.clone();
        self.state
            .borrow_mut()
            .pages
            .entry(url)
            .or_default()
            .fields = fields;
        self
    }

    pub fn with_page(self, url: &str, page: PageFixture) -> Self {
        self.state.borrow_mut().pages.insert(url.to_string(), page);
        self
    }

    /// Options whose value equals their visible text.
    pub fn with_options(self, selector: &str, options: &[&str]) -> Self {
        let pairs: Vec<(&str, &str)> = options.iter().map(|o| (*o, *o)).collect();
        self.with_valued_options(selector, &pairs)
    }

    /// Options as `(value, text)` pairs.
    pub fn with_valued_options(self, selector: &str, options: &[(&str, &str)]) -> Self {
        let url = self.state.borrow().url.clone();
        self.state
            .borrow_mut()
            .pages
            .entry(url)
            .or_default()
            .options
            .insert(
                selector.to_string(),
                options
                    .iter()
                    .map(|(value, text)| SelectOption::new(*value, *text))
                    .collect(),
            );
        self
    }

    /// Offer a page-to-host event channel to the recorder.
    pub fn with_event_channel(self) -> Self {
        self.state.borrow_mut().channel_supported = true;
        self
    }

    /// Make every interaction with `selector` fail as not interactable.
    pub fn failing(self, selector: &str) -> Self {
        self.state.borrow_mut().failing.insert(selector.to_string());
        self
    }

    /// Queue a raw recorder event as the in-page script would.
    pub fn push_event(&self, event: Value) {
        self.state.borrow_mut().enqueue(event);
    }

    /// Simulate a navigation the engine did not cause.
    pub fn navigate(&self, url: &str) {
        self.state.borrow_mut().url = url.to_string();
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn value_of(&self, selector: &str) -> Option<String> {
        self.state.borrow().values.get(selector).cloned()
    }

    pub fn checked(&self, selector: &str) -> Option<bool> {
        self.state.borrow().checked.get(selector).copied()
    }

    pub fn selected(&self, selector: &str) -> Option<usize> {
        self.state.borrow().selected.get(selector).copied()
    }

    pub fn toggle_agreed(&self, selector: &str) -> Option<bool> {
        let state = self.state.borrow();
        state
            .page()?
            .toggles
            .iter()
            .find(|t| t.selector == selector)
            .map(|t| t.agreed)
    }

    pub fn injections(&self) -> usize {
        self.state.borrow().injections
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.state.borrow().screenshots.clone()
    }

    fn guard(&self, selector: &str) -> DriverResult<()> {
        let state = self.state.borrow();
        if state.failing.contains(selector) {
            return Err(DriverError::NotInteractable {
                selector: selector.to_string(),
                reason: "scripted failure".into(),
            });
        }
        if !state.knows(selector) {
            return Err(DriverError::NotFound(selector.to_string()));
        }
        Ok(())
    }
}

impl Driver for FakePage {
    fn url(&self) -> DriverResult<String> {
        Ok(self.state.borrow().url.clone())
    }

    fn goto(&self, url: &str) -> DriverResult<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("goto {url}"));
        state.url = url.to_string();
        Ok(())
    }

    fn evaluate(&self, script: &str) -> DriverResult<Value> {
        let mut state = self.state.borrow_mut();
        if script == FIELD_SCAN_JS {
            let fields = state.page().map(|p| p.fields.clone()).unwrap_or_default();
            let json = serde_json::to_string(&fields)
                .map_err(|e| DriverError::Evaluation(e.to_string()))?;
            return Ok(Value::String(json));
        }
        if script == TITLE_JS {
            return Ok(Value::String("Fake page".into()));
        }
        if script == DRAIN_JS {
            let origin = origin(&state.url).to_string();
            let events = state.queues.remove(&origin).unwrap_or_default();
            return Ok(Value::String(Value::Array(events).to_string()));
        }
        if script.contains(RECORDER_MARKER) {
            state.injections += 1;
            return Ok(Value::Bool(true));
        }
        Ok(Value::Null)
    }

    fn body_text(&self) -> DriverResult<String> {
        Ok(self
            .state
            .borrow()
            .page()
            .map(|p| p.text.clone())
            .unwrap_or_default())
    }

    fn is_visible(&self, selector: &str, _timeout: Duration) -> DriverResult<bool> {
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("visible {selector}"));
        Ok(state.knows(selector) || state.find_button(selector).is_some())
    }

    fn wait_enabled(&self, selector: &str, _timeout: Duration) -> DriverResult<bool> {
        let state = self.state.borrow();
        Ok(state
            .find_button(selector)
            .and_then(|i| state.page().map(|p| p.buttons[i].enabled))
            .unwrap_or(false))
    }

    fn click(&self, selector: &str, _timeout: Duration) -> DriverResult<()> {
        if self.state.borrow().failing.contains(selector) {
            return Err(DriverError::NotInteractable {
                selector: selector.to_string(),
                reason: "scripted failure".into(),
            });
        }
        let button = self.state.borrow().find_button(selector);
        if let Some(index) = button {
            return self.state.borrow_mut().activate(index);
        }
        self.guard(selector)?;
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("click {selector}"));
        if let Some(page) = state.page_mut() {
            let mut unlock = false;
            if let Some(toggle) = page.toggles.iter_mut().find(|t| t.selector == selector) {
                toggle.agreed = !toggle.agreed;
                unlock = toggle.agreed && toggle.unlocks_buttons;
            }
            if unlock {
                page.buttons.iter_mut().for_each(|b| b.enabled = true);
            }
        }
        Ok(())
    }

    fn is_checked(&self, selector: &str) -> DriverResult<bool> {
        if let Some(agreed) = self.toggle_agreed(selector) {
            return Ok(agreed);
        }
        Ok(self.checked(selector).unwrap_or(false))
    }

    fn set_checked(&self, selector: &str, checked: bool) -> DriverResult<()> {
        self.guard(selector)?;
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("check {selector} {checked}"));
        let mut unlock = false;
        if let Some(page) = state.page_mut() {
            if let Some(toggle) = page.toggles.iter_mut().find(|t| t.selector == selector) {
                toggle.agreed = checked;
                unlock = checked && toggle.unlocks_buttons;
            }
            if unlock {
                page.buttons.iter_mut().for_each(|b| b.enabled = true);
            }
        }
        state.checked.insert(selector.to_string(), checked);
        Ok(())
    }

    fn attribute(&self, selector: &str, name: &str) -> DriverResult<Option<String>> {
        let state = self.state.borrow();
        let toggle = state
            .page()
            .and_then(|p| p.toggles.iter().find(|t| t.selector == selector));
        Ok(match (toggle, name) {
            (Some(t), "role") if t.switch => Some("switch".into()),
            (Some(t), "aria-checked" | "aria-pressed") if t.switch => Some(t.agreed.to_string()),
            _ => None,
        })
    }

    fn clear(&self, selector: &str) -> DriverResult<()> {
        self.guard(selector)?;
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("clear {selector}"));
        state.values.insert(selector.to_string(), String::new());
        Ok(())
    }

    fn type_text(&self, selector: &str, text: &str) -> DriverResult<()> {
        self.guard(selector)?;
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("type {selector}"));
        let value = {
            let slot = state.values.entry(selector.to_string()).or_default();
            slot.push_str(text);
            slot.clone()
        };
        if let Some(element) = state.field_snapshot(selector) {
            state.observe("input", element, Some(&value));
        }
        Ok(())
    }

    fn options(&self, selector: &str) -> DriverResult<Vec<SelectOption>> {
        self.guard(selector)?;
        Ok(self
            .state
            .borrow()
            .page()
            .and_then(|p| p.options.get(selector).cloned())
            .unwrap_or_default())
    }

    fn select_index(&self, selector: &str, index: usize) -> DriverResult<()> {
        self.guard(selector)?;
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("select {selector} {index}"));
        state.selected.insert(selector.to_string(), index);
        Ok(())
    }

    fn wait_for_settle(&self, _timeout: Duration) -> DriverResult<()> {
        Ok(())
    }

    fn pause(&self, _duration: Duration) {}

    fn click_text_in_frames(&self, text: &str) -> DriverResult<bool> {
        let needle = text.to_lowercase();
        let index = {
            let state = self.state.borrow();
            state.page().and_then(|p| {
                p.buttons
                    .iter()
                    .position(|b| b.enabled && b.label.to_lowercase().contains(&needle))
            })
        };
        match index {
            Some(i) => self.state.borrow_mut().activate(i).map(|_| true),
            None => Ok(false),
        }
    }

    fn screenshot(&self, path: &Path) -> DriverResult<()> {
        self.state.borrow_mut().screenshots.push(path.to_path_buf());
        Ok(())
    }

    fn open_event_channel(&self, _name: &str) -> DriverResult<bool> {
        let mut state = self.state.borrow_mut();
        state.channel_open = state.channel_supported;
        Ok(state.channel_open)
    }

    fn take_channel_events(&self) -> DriverResult<Vec<Value>> {
        Ok(std::mem::take(&mut self.state.borrow_mut().channel))
    }
}
