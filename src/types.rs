use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Hard cap on auto-navigation iterations.
pub const DEFAULT_MAX_STEPS: usize = 10;
/// Consecutive identical URL observations (without a state change) that count as stuck.
pub const DEFAULT_STUCK_THRESHOLD: usize = 3;
/// Nearby free text kept per field as a classification signal.
pub const CONTEXT_MAX_CHARS: usize = 200;
/// Longest sibling text accepted as a label.
pub const LABEL_SIBLING_MAX_CHARS: usize = 100;
/// Longest text content that may be used as a text selector.
pub const TEXT_SELECTOR_MAX_CHARS: usize = 50;
/// Stored in place of password values unless plaintext capture is enabled.
pub const HIDDEN_VALUE: &str = "***HIDDEN***";
/// Written into generated scripts where a hidden password was recorded.
pub const PASSWORD_PLACEHOLDER: &str = "YOUR_PASSWORD_HERE";

/// Element category of a discovered field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Input,
    Textarea,
    Select,
    ContentEditable,
    Aria,
}

/// Semantic purpose assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    Email,
    Password,
    Phone,
    FirstName,
    LastName,
    Name,
    Username,
    Address,
    City,
    State,
    Zip,
    Country,
    Company,
    Website,
    Date,
    DateTime,
    Age,
    Gender,
    Message,
    Subject,
    Card,
    Cvv,
    Ssn,
    Number,
    Checkbox,
    Radio,
    Select,
    File,
    Color,
    Time,
    Month,
    Week,
    Range,
    Text,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Email => "email",
            FieldType::Password => "password",
            FieldType::Phone => "phone",
            FieldType::FirstName => "firstName",
            FieldType::LastName => "lastName",
            FieldType::Name => "name",
            FieldType::Username => "username",
            FieldType::Address => "address",
            FieldType::City => "city",
            FieldType::State => "state",
            FieldType::Zip => "zip",
            FieldType::Country => "country",
            FieldType::Company => "company",
            FieldType::Website => "website",
            FieldType::Date => "date",
            FieldType::DateTime => "dateTime",
            FieldType::Age => "age",
            FieldType::Gender => "gender",
            FieldType::Message => "message",
            FieldType::Subject => "subject",
            FieldType::Card => "card",
            FieldType::Cvv => "cvv",
            FieldType::Ssn => "ssn",
            FieldType::Number => "number",
            FieldType::Checkbox => "checkbox",
            FieldType::Radio => "radio",
            FieldType::Select => "select",
            FieldType::File => "file",
            FieldType::Color => "color",
            FieldType::Time => "time",
            FieldType::Month => "month",
            FieldType::Week => "week",
            FieldType::Range => "range",
            FieldType::Text => "text",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Validation attributes read from the element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Constraints {
    pub required: bool,
    pub disabled: bool,
    pub readonly: bool,
    pub max_length: Option<u32>,
    pub pattern: Option<String>,
    /// Raw `min` attribute; may be non-numeric.
    pub min: Option<String>,
    /// Raw `max` attribute; may be non-numeric.
    pub max: Option<String>,
}

/// Bounding box, only used to decide visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// One `<option>` of a select: the submitted value and the visible text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectOption {
    pub value: String,
    pub text: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            text: text.into(),
        }
    }

    /// Case-insensitive match on either the value or the visible text.
    pub fn matches(&self, wanted: &str) -> bool {
        let wanted = wanted.trim().to_lowercase();
        !wanted.is_empty()
            && (self.value.trim().to_lowercase() == wanted
                || self.text.trim().to_lowercase() == wanted)
    }
}

/// Supplementary hint from the optional vision collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionHint {
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: bool,
    pub hints: Option<String>,
}

impl Default for VisionHint {
    fn default() -> Self {
        Self {
            label: String::new(),
            field_type: "text".to_string(),
            required: false,
            hints: None,
        }
    }
}

/// One discovered interactive element on a page snapshot.
///
/// Built fresh on every scan and never carried across navigations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    /// Position within the snapshot, in document order.
    pub index: usize,
    pub kind: FieldKind,
    /// Lowercase tag name as found in the document.
    pub tag_name: String,
    /// HTML input subtype (`text`, `email`, `checkbox`, ...).
    #[serde(rename = "type", default = "default_input_type")]
    pub input_type: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub aria_label: Option<String>,
    #[serde(default)]
    pub autocomplete: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub rect: Rect,
    /// 1-based position among same-tag siblings.
    #[serde(default = "default_ordinal")]
    pub ordinal: usize,
    #[serde(default = "default_detected_type")]
    pub detected_type: FieldType,
    #[serde(default = "default_confidence")]
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision: Option<VisionHint>,
}

fn default_input_type() -> String {
    "text".to_string()
}

fn default_ordinal() -> usize {
    1
}

fn default_detected_type() -> FieldType {
    FieldType::Text
}

fn default_confidence() -> Confidence {
    Confidence::Low
}

impl FieldDescriptor {
    /// Blank descriptor of the given kind; mostly useful for building fixtures.
    pub fn new(index: usize, kind: FieldKind, tag_name: &str) -> Self {
        Self {
            index,
            kind,
            tag_name: tag_name.to_string(),
            input_type: default_input_type(),
            id: None,
            name: None,
            placeholder: None,
            aria_label: None,
            autocomplete: None,
            class_name: None,
            role: None,
            text: None,
            label: String::new(),
            context: String::new(),
            value: None,
            constraints: Constraints::default(),
            rect: Rect::default(),
            ordinal: 1,
            detected_type: FieldType::Text,
            confidence: Confidence::Low,
            vision: None,
        }
    }

    /// Human-facing name used in logs and summaries.
    pub fn display_name(&self) -> &str {
        [self.name.as_deref(), self.id.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .or_else(|| (!self.label.is_empty()).then_some(self.label.as_str()))
            .or(self.placeholder.as_deref())
            .unwrap_or("field")
    }

    pub fn is_password(&self) -> bool {
        self.input_type.eq_ignore_ascii_case("password")
    }

    pub fn is_fillable(&self) -> bool {
        !self.constraints.disabled && !self.constraints.readonly
    }
}

/// A value to apply to a field: text for inputs, a flag for checkboxes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Text(String),
}

impl FieldValue {
    /// Checkbox interpretation: text counts as `true` when non-empty.
    pub fn as_bool(&self) -> bool {
        match self {
            FieldValue::Bool(b) => *b,
            FieldValue::Text(s) => !s.is_empty(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// Caller-supplied values keyed by field id, name, or label text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Overrides(HashMap<String, FieldValue>);

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Value for the first of id, name, label that has an entry.
    pub fn lookup(&self, field: &FieldDescriptor) -> Option<&FieldValue> {
        [
            field.id.as_deref(),
            field.name.as_deref(),
            Some(field.label.as_str()),
        ]
        .into_iter()
        .flatten()
        .filter(|key| !key.is_empty())
        .find_map(|key| self.0.get(key))
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Overrides {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
