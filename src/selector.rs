//! Selector synthesis.
//!
//! Produces locators from an element's identity attributes, most robust
//! first. Structural paths are never generated; the tag + ordinal form is the
//! single positional fallback.

use serde::{Deserialize, Serialize};

use crate::driver::quote;
use crate::types::{FieldDescriptor, TEXT_SELECTOR_MAX_CHARS};

/// Which attribute a strategy is built from, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StrategyKind {
    Id,
    Name,
    Placeholder,
    #[serde(rename = "aria-label")]
    AriaLabel,
    TypeAndPlaceholder,
    Text,
    Class,
    Role,
    #[serde(rename = "tag-index")]
    TagIndex,
}

/// A ranked candidate locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorStrategy {
    #[serde(rename = "type")]
    pub kind: StrategyKind,
    pub value: String,
    pub selector: String,
}

impl SelectorStrategy {
    fn new(kind: StrategyKind, value: &str, selector: String) -> Self {
        Self {
            kind,
            value: value.to_string(),
            selector,
        }
    }

    /// Whether this strategy avoids positional information.
    pub fn is_robust(&self) -> bool {
        self.kind != StrategyKind::TagIndex
    }
}

/// Identity attributes a selector can be synthesized from.
pub trait SelectorSource {
    fn tag_name(&self) -> &str;
    fn input_type(&self) -> Option<&str>;
    fn id(&self) -> Option<&str>;
    fn name(&self) -> Option<&str>;
    fn placeholder(&self) -> Option<&str>;
    fn aria_label(&self) -> Option<&str>;
    fn text(&self) -> Option<&str>;
    fn class_name(&self) -> Option<&str>;
    fn role(&self) -> Option<&str>;
    /// 1-based position among same-tag siblings.
    fn ordinal(&self) -> usize;
}

impl SelectorSource for FieldDescriptor {
    fn tag_name(&self) -> &str {
        &self.tag_name
    }
    fn input_type(&self) -> Option<&str> {
        Some(self.input_type.as_str())
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

/// Characters that make `#id` invalid or ambiguous as a bare CSS id selector.
fn needs_attribute_form(id: &str) -> bool {
    id.starts_with(|c: char| c.is_ascii_digit() || c == '-')
        || id.chars().any(|c| {
            c.is_whitespace()
                || matches!(
                    c,
                    ':' | '[' | ']' | '(' | ')' | '{' | '}' | '.' | '#' | '"' | '\'' | ','
                        | '>' | '+' | '~' | '*' | '=' | '!' | '$' | '^' | '|' | '@' | '%'
                        | '&' | ';' | '?' | '/' | '\\' | '`'
                )
        })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Class names generated by frameworks change between builds.
fn is_framework_class(class: &str) -> bool {
    class.starts_with("ng-") || class.starts_with('_') || class.starts_with("css-")
}

fn attr(name: &str, value: &str) -> String {
    format!("[{name}={}]", quote(value))
}

/// Every applicable strategy, most robust first.
pub fn rank<S: SelectorSource + ?Sized>(el: &S) -> Vec<SelectorStrategy> {
    let mut out = Vec::new();
    let tag = el.tag_name().to_ascii_lowercase();

    if let Some(id) = el.id().filter(|v| !v.is_empty()) {
        let selector = if needs_attribute_form(id) {
            attr("id", id)
        } else {
            format!("#{id}")
        };
        out.push(SelectorStrategy::new(StrategyKind::Id, id, selector));
    }

    if let Some(name) = non_empty(el.name()) {
        out.push(SelectorStrategy::new(StrategyKind::Name, name, attr("name", name)));
    }

    if let Some(placeholder) = non_empty(el.placeholder()) {
        out.push(SelectorStrategy::new(
            StrategyKind::Placeholder,
            placeholder,
            attr("placeholder", placeholder),
        ));
    }

    if let Some(label) = non_empty(el.aria_label()) {
        out.push(SelectorStrategy::new(
            StrategyKind::AriaLabel,
            label,
            attr("aria-label", label),
        ));
    }

    if let (Some(input_type), Some(placeholder)) =
        (non_empty(el.input_type()), non_empty(el.placeholder()))
    {
        if tag == "input" {
            out.push(SelectorStrategy::new(
                StrategyKind::TypeAndPlaceholder,
                placeholder,
                format!(
                    "input[type={}][placeholder={}]",
                    quote(input_type),
                    quote(placeholder)
                ),
            ));
        }
    }

    if let Some(text) = non_empty(el.text()) {
        if text.chars().count() < TEXT_SELECTOR_MAX_CHARS {
            out.push(SelectorStrategy::new(
                StrategyKind::Text,
                text,
                format!("text={}", quote(text)),
            ));
        }
    }

    if let Some(class) = el
        .class_name()
        // Utility classes such as `md:flex` or `w-1/2` are not valid bare CSS.
        .and_then(|c| {
            c.split_whitespace()
                .find(|c| !is_framework_class(c) && !needs_attribute_form(c))
        })
    {
        out.push(SelectorStrategy::new(
            StrategyKind::Class,
            class,
            format!(".{class}"),
        ));
    }

    if let Some(role) = non_empty(el.role()) {
        out.push(SelectorStrategy::new(StrategyKind::Role, role, attr("role", role)));
    }

    let ordinal = el.ordinal().max(1);
    out.push(SelectorStrategy::new(
        StrategyKind::TagIndex,
        &tag,
        format!("{tag}:nth-of-type({ordinal})"),
    ));

    out
}

/// The single most robust strategy. Liveness and uniqueness are left to the
/// driver at use time.
pub fn selector_for<S: SelectorSource + ?Sized>(el: &S) -> SelectorStrategy {
    // rank() always ends with the tag + ordinal fallback.
    rank(el).swap_remove(0)
}
