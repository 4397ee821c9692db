//! Synthetic value generation per semantic field type.

use chrono::{Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::types::{FieldDescriptor, FieldKind, FieldType, FieldValue, Overrides};

const FIRST_NAMES: &[&str] = &[
    "Olivia", "Liam", "Emma", "Noah", "Ava", "Elijah", "Sophia", "Lucas", "Mia", "Mateo",
    "Amelia", "Ethan", "Harper", "James", "Aria", "Henry", "Nora", "Samuel", "Layla", "Leo",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Garcia", "Brown", "Miller", "Davis", "Martinez", "Lopez", "Wilson",
    "Anderson", "Thomas", "Moore", "Jackson", "Martin", "Lee", "Perez", "Thompson", "White",
];

const STREETS: &[&str] = &[
    "Maple", "Oak", "Cedar", "Elm", "Pine", "Washington", "Lake", "Hill", "Park", "River",
];

const STREET_SUFFIXES: &[&str] = &["Street", "Avenue", "Road", "Lane", "Drive", "Court"];

const CITIES: &[&str] = &[
    "Springfield", "Riverside", "Fairview", "Georgetown", "Franklin", "Madison", "Clinton",
    "Salem", "Arlington", "Ashland",
];

const STATES: &[&str] = &[
    "California", "Texas", "New York", "Florida", "Illinois", "Ohio", "Georgia", "Oregon",
    "Colorado", "Virginia",
];

const COUNTRIES: &[&str] = &[
    "United States", "Canada", "Mexico", "United Kingdom", "Germany", "France", "Spain",
    "Australia", "Japan", "Brazil",
];

const COMPANY_SUFFIXES: &[&str] = &["LLC", "Inc", "Group", "Partners", "and Sons", "Labs"];

const GENDERS: &[&str] = &["female", "male"];

const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "example.net"];

const LOREM: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua",
    "enim", "minim", "veniam", "quis", "nostrud", "exercitation", "ullamco", "laboris",
];

/// Password that satisfies the usual upper/lower/digit/symbol validation patterns.
const PATTERN_SAFE_PASSWORD: &str = "Test@1234";

/// Produces values for classified fields, consulting overrides first.
pub struct DataGenerator {
    rng: StdRng,
}

impl Default for DataGenerator {
    fn default() -> Self {
        Self::new(None)
    }
}

impl DataGenerator {
    /// A `seed` makes every generated value reproducible.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Random index in `range`; shared with option selection so one seed
    /// covers a whole fill.
    pub fn pick_index(&mut self, range: std::ops::Range<usize>) -> usize {
        self.rng.gen_range(range)
    }

    /// Value for `field`: an override keyed by id, name or label wins verbatim;
    /// otherwise a synthetic value for its detected type. Selects and file
    /// inputs get `None` since they are not filled with text.
    pub fn generate(&mut self, field: &FieldDescriptor, overrides: &Overrides) -> Option<FieldValue> {
        if let Some(value) = overrides.lookup(field) {
            debug!(target: "formpilot::generator", "[Generator] override for {}", field.display_name());
            return Some(value.clone());
        }

        // Element category decides before semantics: a checkbox named
        // "email_optin" still takes a flag.
        match field.kind {
            FieldKind::Select => return None,
            FieldKind::Input => match field.input_type.as_str() {
                "checkbox" => return Some(FieldValue::Bool(self.rng.gen_bool(0.5))),
                "radio" => return Some(FieldValue::Bool(true)),
                "file" => return None,
                _ => {}
            },
            _ => {}
        }

        let value = match field.detected_type {
            FieldType::Select | FieldType::File => return None,
            FieldType::Checkbox => return Some(FieldValue::Bool(self.rng.gen_bool(0.5))),
            FieldType::Radio => return Some(FieldValue::Bool(true)),
            FieldType::Email => self.email(),
            FieldType::Password => self.password(field),
            FieldType::Phone => self.phone(),
            FieldType::FirstName => self.pick(FIRST_NAMES).to_string(),
            FieldType::LastName => self.pick(LAST_NAMES).to_string(),
            FieldType::Name => format!("{} {}", self.pick(FIRST_NAMES), self.pick(LAST_NAMES)),
            FieldType::Username => self.username(),
            FieldType::Address => format!(
                "{} {} {}",
                self.rng.gen_range(100..9999),
                self.pick(STREETS),
                self.pick(STREET_SUFFIXES)
            ),
            FieldType::City => self.pick(CITIES).to_string(),
            FieldType::State => self.pick(STATES).to_string(),
            FieldType::Zip => format!("{:05}", self.rng.gen_range(10000..99999)),
            FieldType::Country => self.pick(COUNTRIES).to_string(),
            FieldType::Company => format!("{} {}", self.pick(LAST_NAMES), self.pick(COMPANY_SUFFIXES)),
            FieldType::Website => format!("https://www.{}.com", self.pick(LOREM)),
            FieldType::Date => self.date(field),
            FieldType::DateTime => self.datetime(),
            FieldType::Age => self.rng.gen_range(18..=80).to_string(),
            FieldType::Gender => self.pick(GENDERS).to_string(),
            FieldType::Message => self.paragraph(),
            FieldType::Subject => self.sentence(),
            FieldType::Card => self.card_number(),
            FieldType::Cvv => format!("{:03}", self.rng.gen_range(0..1000)),
            FieldType::Ssn => format!(
                "{:03}-{:02}-{:04}",
                self.rng.gen_range(100..666),
                self.rng.gen_range(1..100),
                self.rng.gen_range(1..10000)
            ),
            FieldType::Number | FieldType::Range => match self.number(field) {
                Some(n) => n,
                None => self.generic_text(field),
            },
            FieldType::Color => format!("#{:06x}", self.rng.gen_range(0..0x0100_0000u32)),
            FieldType::Time => "10:30".to_string(),
            FieldType::Month => self.past_date().format("%Y-%m").to_string(),
            FieldType::Week => self.past_date().format("%G-W%V").to_string(),
            FieldType::Text => self.generic_text(field),
        };

        Some(FieldValue::Text(truncate(value, field.constraints.max_length)))
    }

    fn pick(&mut self, items: &'static [&'static str]) -> &'static str {
        items.choose(&mut self.rng).copied().unwrap_or_default()
    }

    fn email(&mut self) -> String {
        format!(
            "{}.{}{}@{}",
            self.pick(FIRST_NAMES).to_lowercase(),
            self.pick(LAST_NAMES).to_lowercase(),
            self.rng.gen_range(1..100),
            self.pick(EMAIL_DOMAINS)
        )
    }

    fn username(&mut self) -> String {
        format!(
            "{}_{}{}",
            self.pick(FIRST_NAMES).to_lowercase(),
            self.pick(LAST_NAMES).to_lowercase(),
            self.rng.gen_range(10..1000)
        )
    }

    fn phone(&mut self) -> String {
        format!(
            "({}) {}-{:04}",
            self.rng.gen_range(201..990),
            self.rng.gen_range(200..1000),
            self.rng.gen_range(0..10000)
        )
    }

    fn password(&mut self, field: &FieldDescriptor) -> String {
        if field.constraints.pattern.as_deref().is_some_and(|p| !p.is_empty()) {
            return PATTERN_SAFE_PASSWORD.to_string();
        }
        let length = field
            .constraints
            .max_length
            .map(|max| max as usize)
            .unwrap_or(12)
            .clamp(4, 64);

        const CLASSES: [&[u8]; 4] = [
            b"ABCDEFGHJKLMNPQRSTUVWXYZ",
            b"abcdefghijkmnopqrstuvwxyz",
            b"23456789",
            b"!@#$%",
        ];
        let mut chars: Vec<char> = (0..length)
            .map(|i| {
                let class = CLASSES[i % CLASSES.len()];
                class[self.rng.gen_range(0..class.len())] as char
            })
            .collect();
        chars.shuffle(&mut self.rng);
        chars.into_iter().collect()
    }

    fn past_date(&mut self) -> chrono::DateTime<Utc> {
        Utc::now() - ChronoDuration::days(self.rng.gen_range(1..=365))
    }

    fn date(&mut self, field: &FieldDescriptor) -> String {
        let date = self.past_date();
        match field.input_type.as_str() {
            "date" => date.format("%Y-%m-%d").to_string(),
            "datetime-local" => date.format("%Y-%m-%dT%H:%M").to_string(),
            _ => date.format("%m/%d/%Y").to_string(),
        }
    }

    fn datetime(&mut self) -> String {
        let recent = Utc::now() - ChronoDuration::minutes(self.rng.gen_range(1..60 * 24 * 7));
        recent.format("%Y-%m-%dT%H:%M").to_string()
    }

    /// Integer in `[min, max]`; `None` when either bound is not a finite
    /// number. Bounds beyond the `i64` range saturate.
    fn number(&mut self, field: &FieldDescriptor) -> Option<String> {
        let bound = |raw: &Option<String>, default: i64| match raw.as_deref().map(str::trim) {
            None | Some("") => Some(default),
            Some(s) => s
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v as i64),
        };
        let min = bound(&field.constraints.min, 0)?;
        let max = bound(&field.constraints.max, min.max(0).saturating_add(100))?;
        if min > max {
            return None;
        }
        Some(self.rng.gen_range(min..=max).to_string())
    }

    fn card_number(&mut self) -> String {
        let mut digits: Vec<u32> = std::iter::once(4)
            .chain((0..14).map(|_| self.rng.gen_range(0..10)))
            .collect();
        digits.push(luhn_check_digit(&digits));
        digits.iter().map(|d| char::from_digit(*d, 10).unwrap_or('0')).collect()
    }

    fn words(&mut self, count: usize) -> String {
        (0..count).map(|_| self.pick(LOREM)).collect::<Vec<_>>().join(" ")
    }

    fn sentence(&mut self) -> String {
        let count = self.rng.gen_range(5..10);
        let words = self.words(count);
        let mut chars = words.chars();
        match chars.next() {
            Some(first) => format!("{}{}.", first.to_uppercase(), chars.as_str()),
            None => String::new(),
        }
    }

    fn paragraph(&mut self) -> String {
        let count = self.rng.gen_range(3..6);
        (0..count).map(|_| self.sentence()).collect::<Vec<_>>().join(" ")
    }

    /// Lorem text sized by `maxLength`.
    fn generic_text(&mut self, field: &FieldDescriptor) -> String {
        match field.constraints.max_length {
            Some(max) if max < 20 => self.words(1),
            Some(max) if max < 50 => self.words(3),
            _ if field.kind == FieldKind::Textarea => self.paragraph(),
            _ => self.words(2),
        }
    }
}

fn luhn_check_digit(digits: &[u32]) -> u32 {
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 0 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    (10 - sum % 10) % 10
}

fn truncate(value: String, max_length: Option<u32>) -> String {
    match max_length {
        Some(max) if max > 0 && value.chars().count() > max as usize => {
            value.chars().take(max as usize).collect()
        }
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::classify;
    use crate::testing::field;

    fn typed(input_type: &str, detected: FieldType) -> FieldDescriptor {
        let mut f = field(0, "input", input_type);
        f.detected_type = detected;
        f
    }

    #[test]
    fn id_override_beats_name_and_label() {
        let mut f = typed("text", FieldType::Username);
        f.id = Some("UserName".into());
        f.name = Some("login".into());
        f.label = "User name".into();
        let overrides: Overrides = [
            ("User name", "by-label"),
            ("login", "by-name"),
            ("UserName", "by-id"),
        ]
        .into_iter()
        .collect();

        let mut generator = DataGenerator::new(Some(1));
        assert_eq!(
            generator.generate(&f, &overrides),
            Some(FieldValue::Text("by-id".into()))
        );
    }

    #[test]
    fn overrides_are_returned_verbatim() {
        let mut f = typed("checkbox", FieldType::Checkbox);
        f.name = Some("terms".into());
        f.constraints.max_length = Some(2);
        let overrides: Overrides = [("terms", false)].into_iter().collect();
        let mut generator = DataGenerator::new(Some(1));
        assert_eq!(generator.generate(&f, &overrides), Some(FieldValue::Bool(false)));
    }

    #[test]
    fn typed_values_look_right() {
        let mut generator = DataGenerator::new(Some(7));
        let none = Overrides::new();

        let email = generator.generate(&typed("email", FieldType::Email), &none).unwrap();
        assert!(email.as_text().contains('@'));

        let date = generator.generate(&typed("date", FieldType::Date), &none).unwrap();
        let parsed = chrono::NaiveDate::parse_from_str(&date.as_text(), "%Y-%m-%d").unwrap();
        let today = Utc::now().date_naive();
        assert!(parsed < today && parsed >= today - ChronoDuration::days(366));

        let card = generator.generate(&typed("text", FieldType::Card), &none).unwrap().as_text();
        assert_eq!(card.len(), 16);
        let digits: Vec<u32> = card.chars().filter_map(|c| c.to_digit(10)).collect();
        assert_eq!(luhn_check_digit(&digits[..15]), digits[15]);
    }

    #[test]
    fn numbers_respect_bounds_and_bad_bounds_fall_back() {
        let mut generator = DataGenerator::new(Some(3));
        let none = Overrides::new();
        let mut f = typed("number", FieldType::Number);
        f.constraints.min = Some("5".into());
        f.constraints.max = Some("9".into());
        for _ in 0..20 {
            let n: i64 = generator.generate(&f, &none).unwrap().as_text().parse().unwrap();
            assert!((5..=9).contains(&n));
        }

        f.constraints.min = Some("abc".into());
        let text = generator.generate(&f, &none).unwrap().as_text();
        assert!(text.parse::<i64>().is_err());
        assert!(!text.is_empty());
    }

    #[test]
    fn huge_and_non_finite_bounds_do_not_panic() {
        let mut generator = DataGenerator::new(Some(3));
        let none = Overrides::new();
        let mut f = typed("number", FieldType::Number);

        for min in ["9223372036854775807", "1e300"] {
            f.constraints.min = Some(min.into());
            let n = generator.generate(&f, &none).unwrap().as_text();
            assert_eq!(n, i64::MAX.to_string());
        }

        f.constraints.min = Some("-1e300".into());
        f.constraints.max = Some("10".into());
        let n: i64 = generator.generate(&f, &none).unwrap().as_text().parse().unwrap();
        assert!(n <= 10);

        f.constraints.min = Some("NaN".into());
        let text = generator.generate(&f, &none).unwrap().as_text();
        assert!(text.parse::<i64>().is_err());
    }

    #[test]
    fn password_with_pattern_uses_safe_value() {
        let mut generator = DataGenerator::new(Some(3));
        let mut f = typed("password", FieldType::Password);
        f.constraints.pattern = Some("(?=.*\\d).{8,}".into());
        assert_eq!(
            generator.generate(&f, &Overrides::new()),
            Some(FieldValue::Text(PATTERN_SAFE_PASSWORD.into()))
        );

        f.constraints.pattern = None;
        let pw = generator.generate(&f, &Overrides::new()).unwrap().as_text();
        assert_eq!(pw.len(), 12);
        assert!(pw.chars().any(|c| c.is_ascii_uppercase()));
        assert!(pw.chars().any(|c| c.is_ascii_digit()));
    }

    #[test]
    fn generic_text_sized_by_max_length() {
        let mut generator = DataGenerator::new(Some(11));
        let none = Overrides::new();

        let mut short = typed("text", FieldType::Text);
        short.constraints.max_length = Some(10);
        let v = generator.generate(&short, &none).unwrap().as_text();
        assert!(!v.contains(' ') && v.chars().count() <= 10);

        let mut medium = typed("text", FieldType::Text);
        medium.constraints.max_length = Some(40);
        let v = generator.generate(&medium, &none).unwrap().as_text();
        assert!(v.split(' ').count() <= 3);

        let area = classify(field(0, "textarea", "textarea"));
        let v = generator.generate(&area, &none).unwrap().as_text();
        assert!(v.ends_with('.'));
    }

    #[test]
    fn selects_and_files_get_no_value() {
        let mut generator = DataGenerator::new(Some(1));
        let select = classify(field(0, "select", "select"));
        assert_eq!(generator.generate(&select, &Overrides::new()), None);
        let file = typed("file", FieldType::File);
        assert_eq!(generator.generate(&file, &Overrides::new()), None);
    }
}
