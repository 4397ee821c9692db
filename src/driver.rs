//! Browser-driver seam.
//!
//! Everything above this module talks to the page through [`Driver`], so the
//! classification, filling and navigation logic can run against a real Chrome
//! tab ([`crate::hands::ChromeDriver`]) or a scripted page in tests.

use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::dom;
use crate::error::{DriverError, DriverResult, FlowError};
use crate::types::SelectOption;

/// Primitive page operations consumed by the engine.
///
/// Selectors use the syntax understood by [`Query::parse`].
pub trait Driver {
    fn url(&self) -> DriverResult<String>;

    fn goto(&self, url: &str) -> DriverResult<()>;

    /// Evaluate a script in the main document and return its JSON value.
    fn evaluate(&self, script: &str) -> DriverResult<Value>;

    /// Visible text of the page body.
    fn body_text(&self) -> DriverResult<String> {
        let value = self.evaluate(dom::BODY_TEXT_JS)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// `Ok(false)` when the element does not become visible before `timeout`.
    fn is_visible(&self, selector: &str, timeout: Duration) -> DriverResult<bool>;

    /// `Ok(false)` when the element stays disabled (or absent) until `timeout`.
    fn wait_enabled(&self, selector: &str, timeout: Duration) -> DriverResult<bool>;

    fn click(&self, selector: &str, timeout: Duration) -> DriverResult<()>;

    fn is_checked(&self, selector: &str) -> DriverResult<bool>;

    fn set_checked(&self, selector: &str, checked: bool) -> DriverResult<()>;

    fn attribute(&self, selector: &str, name: &str) -> DriverResult<Option<String>>;

    fn clear(&self, selector: &str) -> DriverResult<()>;

    fn type_text(&self, selector: &str, text: &str) -> DriverResult<()>;

    /// Options of a select element, in document order.
    fn options(&self, selector: &str) -> DriverResult<Vec<SelectOption>>;

    fn select_index(&self, selector: &str, index: usize) -> DriverResult<()>;

    /// Wait for network and DOM activity to quiesce, bounded by `timeout`.
    /// Reaching the timeout is not an error.
    fn wait_for_settle(&self, timeout: Duration) -> DriverResult<()>;

    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    /// Scripted click on the first button (main document or same-origin
    /// iframe) whose text or value contains `text`, case-insensitively.
    fn click_text_in_frames(&self, text: &str) -> DriverResult<bool> {
        let script = dom::frame_click_js(text);
        Ok(self.evaluate(&script)?.as_bool().unwrap_or(false))
    }

    fn screenshot(&self, path: &Path) -> DriverResult<()>;

    /// Expose a page-callable function `name` whose calls reach the host
    /// immediately and survive navigations. `Ok(false)` when the driver has
    /// no such channel.
    fn open_event_channel(&self, _name: &str) -> DriverResult<bool> {
        Ok(false)
    }

    /// Payloads delivered through the event channel since the last call.
    fn take_channel_events(&self) -> DriverResult<Vec<Value>> {
        Ok(Vec::new())
    }
}

/// Parsed form of a rendered selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Plain CSS, handed to `querySelector` as-is.
    Css(String),
    /// `text="Sign in"`: element whose trimmed visible text equals the value.
    ExactText(String),
    /// `role=button[name="Next"]`: element with the role whose accessible
    /// name contains the value, case-insensitively.
    Role { role: String, name: String },
    /// `button:has-text("Next")`: tag whose text contains the value.
    HasText { tag: String, text: String },
}

impl Query {
    pub fn parse(selector: &str) -> DriverResult<Self> {
        let selector = selector.trim();
        if selector.is_empty() {
            return Err(DriverError::InvalidSelector("empty selector".into()));
        }

        if let Some(rest) = selector.strip_prefix("text=") {
            return Ok(Query::ExactText(unquote(rest).to_string()));
        }

        if let Some(rest) = selector.strip_prefix("role=") {
            let (role, name) = match rest.find('[') {
                Some(open) => {
                    let role = &rest[..open];
                    let inner = rest[open + 1..]
                        .strip_suffix(']')
                        .ok_or_else(|| DriverError::InvalidSelector(selector.to_string()))?;
                    let name = inner
                        .strip_prefix("name=")
                        .ok_or_else(|| DriverError::InvalidSelector(selector.to_string()))?;
                    (role, unquote(name))
                }
                None => (rest, ""),
            };
            return Ok(Query::Role {
                role: role.to_string(),
                name: name.to_string(),
            });
        }

        if let Some(pos) = selector.find(":has-text(") {
            let tag = &selector[..pos];
            let arg = selector[pos + ":has-text(".len()..]
                .strip_suffix(')')
                .ok_or_else(|| DriverError::InvalidSelector(selector.to_string()))?;
            return Ok(Query::HasText {
                tag: if tag.is_empty() { "*" } else { tag }.to_string(),
                text: unquote(arg).to_string(),
            });
        }

        Ok(Query::Css(selector.to_string()))
    }
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(s)
}

/// Escape a value for use inside a double-quoted selector or script string.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// One named attempt in an ordered fallback chain.
pub type Attempt<'a, T> = (String, Box<dyn FnMut() -> DriverResult<T> + 'a>);

/// Run `attempts` in order and return the first success with its name.
///
/// Recoverable failures fall through to the next attempt; a fatal driver
/// error stops the chain immediately. Exhaustion reports every tried name.
pub fn try_in_order<T>(step: &str, attempts: Vec<Attempt<'_, T>>) -> Result<(String, T), FlowError> {
    let mut tried = Vec::with_capacity(attempts.len());
    for (name, mut attempt) in attempts {
        match attempt() {
            Ok(value) => {
                debug!(target: "formpilot::driver", "[Driver] {step}: {name} succeeded");
                return Ok((name, value));
            }
            Err(e) if e.is_recoverable() => {
                debug!(target: "formpilot::driver", "[Driver] {step}: {name} failed: {e}");
                tried.push(name);
            }
            Err(e) => return Err(FlowError::Driver(e)),
        }
    }
    Err(FlowError::Exhausted {
        step: step.to_string(),
        tried,
    })
}

/// Box a closure as a named attempt.
pub fn attempt<'a, T>(
    name: impl Into<String>,
    f: impl FnMut() -> DriverResult<T> + 'a,
) -> Attempt<'a, T> {
    (name.into(), Box::new(f))
}
