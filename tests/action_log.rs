use formpilot::codegen::{CodegenOptions, EMPTY_SCRIPT, ScriptFormat, generate_script};
use formpilot::recorder::{ElementSnapshot, RecordingSummary};
use formpilot::selector::selector_for;
use formpilot::types::HIDDEN_VALUE;
use formpilot::{RecordedAction, load_actions, save_actions};

const LOGIN: &str = "https://portal.test/s/login";
const HOME: &str = "https://portal.test/s/home";

fn input(id: &str, input_type: &str, value: &str, timestamp: i64) -> RecordedAction {
    let element = ElementSnapshot {
        tag_name: "input".into(),
        input_type: Some(input_type.into()),
        id: Some(id.into()),
        ordinal: 1,
        ..ElementSnapshot::default()
    };
    RecordedAction::Input {
        timestamp,
        url: LOGIN.into(),
        selector: selector_for(&element),
        element,
        value: value.into(),
    }
}

fn session() -> Vec<RecordedAction> {
    let button = ElementSnapshot {
        tag_name: "button".into(),
        input_type: Some("submit".into()),
        text: Some("Log In".into()),
        ordinal: 1,
        ..ElementSnapshot::default()
    };
    vec![
        input("UserName", "text", "ann@example.com", 1),
        input("Password", "password", HIDDEN_VALUE, 2),
        RecordedAction::Click {
            timestamp: 3,
            url: LOGIN.into(),
            selector: selector_for(&button),
            element: button,
        },
        RecordedAction::Navigation {
            timestamp: 4,
            from: LOGIN.into(),
            to: HOME.into(),
        },
    ]
}

#[test]
fn saved_log_loads_back_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs").join("session.json");

    save_actions(&path, &session()).unwrap();
    let loaded = load_actions(&path).unwrap();
    assert_eq!(loaded, session());

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("\"type\": \"input\""));
    assert!(raw.contains("\"tagName\": \"input\""));
}

#[test]
fn missing_log_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = load_actions(&dir.path().join("absent.json")).unwrap();
    assert!(loaded.is_empty());
    assert_eq!(
        generate_script(&loaded, &CodegenOptions::default()),
        EMPTY_SCRIPT
    );
}

#[test]
fn unknown_types_and_fields_are_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(
        &path,
        r#"[
  {"type": "scroll", "timestamp": 1, "url": "https://portal.test/s/login", "deltaY": 300},
  {"type": "navigation", "timestamp": 2, "from": "a", "to": "b", "tabId": 7}
]"#,
    )
    .unwrap();

    let loaded = load_actions(&path).unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0], RecordedAction::Unknown);
    assert_eq!(loaded[1].kind(), "navigation");
}

#[test]
fn malformed_log_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(load_actions(&path).is_err());
}

#[test]
fn regenerating_from_a_reloaded_log_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    save_actions(&path, &session()).unwrap();

    for format in [ScriptFormat::Driver, ScriptFormat::SmartFiller] {
        let options = CodegenOptions::with_format(format);
        let first = generate_script(&load_actions(&path).unwrap(), &options);
        let second = generate_script(&load_actions(&path).unwrap(), &options);
        assert_eq!(first, second);
        assert_eq!(first, generate_script(&session(), &options));
        assert!(first.contains("YOUR_PASSWORD_HERE"));
        assert!(!first.contains(HIDDEN_VALUE));
    }
}

#[test]
fn summary_reports_counts_and_hidden_fields() {
    let summary = RecordingSummary::from_actions(&session());
    assert_eq!(summary.total, 4);
    assert_eq!(summary.by_type.get("input"), Some(&2));
    let text = summary.to_string();
    assert!(text.contains("(hidden)"));
    assert!(text.contains("ann@example.com"));
}
