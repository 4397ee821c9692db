//! Field discovery and semantic classification.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::dom::FIELD_SCAN_JS;
use crate::driver::Driver;
use crate::error::{DriverError, DriverResult};
use crate::types::{Confidence, FieldDescriptor, FieldKind, FieldType};

/// Ordered classification table. The first matching row wins.
static FIELD_PATTERNS: Lazy<Vec<(FieldType, Regex)>> = Lazy::new(|| {
    // `(^|[^a-z])x([^a-z]|$)` keeps short tokens like "age" from matching
    // inside "message" or "page".
    [
        (FieldType::Email, r"email|e-mail|correo"),
        (FieldType::Password, r"password|passwd|pwd|contraseña"),
        (FieldType::Phone, r"phone|(^|[^a-z])tel([^a-z]|$)|mobile|celular"),
        (FieldType::FirstName, r"first.*name|fname|given.*name|nombre.*pila"),
        (FieldType::LastName, r"last.*name|lname|surname|family.*name|apellido"),
        (FieldType::Address, r"address|direccion|street|calle"),
        (FieldType::City, r"city|ciudad|town"),
        (FieldType::State, r"(^|[^a-z])state([^a-z]|$)|province|provincia|region"),
        (FieldType::Zip, r"zip|postal|codigo.*postal"),
        (FieldType::Country, r"country|pais|nation"),
        (FieldType::Company, r"company|organi[sz]ation|empresa|organizacion"),
        (FieldType::Website, r"website|(^|[^a-z])url([^a-z]|$)|web.*site|sitio.*web|homepage"),
        (FieldType::Date, r"(^|[^a-z])date([^a-z]|$)|fecha|birthday|birth.*date|(^|[^a-z])dob([^a-z]|$)|bday"),
        (FieldType::Age, r"(^|[^a-z])age([^a-z]|$)|edad"),
        (FieldType::Gender, r"gender|(^|[^a-z])sex([^a-z]|$)|genero|sexo"),
        (FieldType::Username, r"username|user.*name|login|usuario|userid|user_id"),
        (FieldType::Name, r"name|nombre"),
        (FieldType::Message, r"message|comment|mensaje|comentario|description"),
        (FieldType::Subject, r"subject|asunto|topic"),
        (FieldType::Card, r"card.*number|credit.*card|tarjeta|cc-number"),
        (FieldType::Cvv, r"cvv|cvc|csc|security.*code"),
        (FieldType::Ssn, r"(^|[^a-z])ssn([^a-z]|$)|social.*security"),
    ]
    .into_iter()
    .filter_map(|(ty, pattern)| Regex::new(pattern).ok().map(|re| (ty, re)))
    .collect()
});

/// Case-insensitive classification signal built from the element's text
/// attributes and nearby context.
pub fn search_text(field: &FieldDescriptor) -> String {
    [
        field.id.as_deref(),
        field.name.as_deref(),
        field.placeholder.as_deref(),
        Some(field.label.as_str()),
        field.aria_label.as_deref(),
        field.autocomplete.as_deref(),
        Some(field.context.as_str()),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

/// Map a non-generic HTML input subtype to a semantic type.
fn native_type(input_type: &str) -> Option<FieldType> {
    let ty = match input_type {
        "email" => FieldType::Email,
        "password" => FieldType::Password,
        "tel" => FieldType::Phone,
        "date" => FieldType::Date,
        "datetime-local" => FieldType::DateTime,
        "number" => FieldType::Number,
        "checkbox" => FieldType::Checkbox,
        "radio" => FieldType::Radio,
        "file" => FieldType::File,
        "url" => FieldType::Website,
        "color" => FieldType::Color,
        "time" => FieldType::Time,
        "month" => FieldType::Month,
        "week" => FieldType::Week,
        "range" => FieldType::Range,
        _ => return None,
    };
    Some(ty)
}

/// Pure classification of a descriptor's textual attributes.
pub fn classify_field(field: &FieldDescriptor) -> (FieldType, Confidence) {
    let text = search_text(field);
    if let Some((ty, _)) = FIELD_PATTERNS.iter().find(|(_, re)| re.is_match(&text)) {
        return (*ty, Confidence::High);
    }

    if field.kind == FieldKind::Input {
        if let Some(ty) = native_type(&field.input_type.to_ascii_lowercase()) {
            return (ty, Confidence::High);
        }
    }

    match field.kind {
        FieldKind::Textarea => (FieldType::Message, Confidence::Medium),
        FieldKind::Select => (FieldType::Select, Confidence::High),
        _ => (FieldType::Text, Confidence::Low),
    }
}

/// Attach the detected type and confidence.
pub fn classify(mut field: FieldDescriptor) -> FieldDescriptor {
    let (detected_type, confidence) = classify_field(&field);
    field.detected_type = detected_type;
    field.confidence = confidence;
    field
}

fn is_fillable_control(field: &FieldDescriptor) -> bool {
    !(field.kind == FieldKind::Input
        && matches!(
            field.input_type.as_str(),
            "hidden" | "submit" | "button" | "reset" | "image"
        ))
}

/// Scan the live document and classify every visible fillable field.
pub fn detect_fields<D: Driver + ?Sized>(driver: &D) -> DriverResult<Vec<FieldDescriptor>> {
    let raw = driver.evaluate(FIELD_SCAN_JS)?;
    let fields: Vec<FieldDescriptor> = match raw {
        serde_json::Value::String(json) => serde_json::from_str(&json)
            .map_err(|e| DriverError::Evaluation(format!("field scan: {e}")))?,
        serde_json::Value::Null => Vec::new(),
        other => serde_json::from_value(other)
            .map_err(|e| DriverError::Evaluation(format!("field scan: {e}")))?,
    };

    let fields: Vec<FieldDescriptor> = fields
        .into_iter()
        .filter(|f| f.rect.has_area() && is_fillable_control(f))
        .map(classify)
        .collect();

    for f in &fields {
        debug!(
            target: "formpilot::detector",
            "[Detector] #{} {} -> {} ({:?})",
            f.index,
            f.display_name(),
            f.detected_type,
            f.confidence
        );
    }
    info!(target: "formpilot::detector", "[Detector] Found {} fields", fields.len());
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePage, field};
    use crate::types::Rect;

    fn input(id: &str) -> FieldDescriptor {
        let mut f = FieldDescriptor::new(0, FieldKind::Input, "input");
        f.id = Some(id.into());
        f
    }

    #[test]
    fn first_pattern_in_table_order_wins() {
        let mut f = input("contact");
        f.label = "Email address".into();
        assert_eq!(classify_field(&f), (FieldType::Email, Confidence::High));

        let f = input("UserName");
        assert_eq!(classify_field(&f).0, FieldType::Username);

        let f = input("first_name");
        assert_eq!(classify_field(&f).0, FieldType::FirstName);

        let f = input("company_name");
        assert_eq!(classify_field(&f).0, FieldType::Company);
    }

    #[test]
    fn short_tokens_do_not_match_inside_words() {
        let mut f = FieldDescriptor::new(0, FieldKind::Textarea, "textarea");
        f.placeholder = Some("Your page notes".into());
        assert_eq!(classify_field(&f), (FieldType::Message, Confidence::Medium));

        let f = input("user_age");
        assert_eq!(classify_field(&f).0, FieldType::Age);
    }

    #[test]
    fn native_subtype_used_when_no_text_matches() {
        let mut f = input("q1");
        f.input_type = "tel".into();
        assert_eq!(classify_field(&f), (FieldType::Phone, Confidence::High));

        let mut f = input("opt");
        f.input_type = "checkbox".into();
        assert_eq!(classify_field(&f).0, FieldType::Checkbox);
    }

    #[test]
    fn fallbacks_by_element_kind() {
        let f = FieldDescriptor::new(0, FieldKind::Select, "select");
        assert_eq!(classify_field(&f), (FieldType::Select, Confidence::High));
        let f = input("x1");
        assert_eq!(classify_field(&f), (FieldType::Text, Confidence::Low));
    }

    #[test]
    fn classification_is_deterministic() {
        let mut f = input("billing_zip");
        f.context = "Shipping details".into();
        let once = classify(f.clone());
        let twice = classify(once.clone());
        assert_eq!(once.detected_type, twice.detected_type);
        assert_eq!(once.confidence, twice.confidence);
        assert_eq!(once.detected_type, FieldType::Zip);
    }

    #[test]
    fn detect_drops_zero_size_and_button_inputs() {
        let mut hidden = field(1, "input", "text");
        hidden.id = Some("ghost".into());
        hidden.rect = Rect::default();
        let mut submit = field(2, "input", "submit");
        submit.id = Some("go".into());
        let mut email = field(0, "input", "email");
        email.id = Some("mail".into());

        let page = FakePage::new("https://example.com/signup").with_fields(vec![email, hidden, submit]);
        let fields = detect_fields(&page).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].detected_type, FieldType::Email);
    }
}
