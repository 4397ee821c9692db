//! Credential login followed by auto-navigation to the landing page.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::{FillerConfig, NavigatorConfig};
use crate::detector::detect_fields;
use crate::driver::{Attempt, Driver, attempt, try_in_order};
use crate::error::{FlowError, Result};
use crate::filler::{FormFiller, capture_diagnostics};
use crate::navigator::{NavigationReport, Navigator};
use crate::selector::rank;
use crate::types::{FieldDescriptor, FieldKind, FieldType, HIDDEN_VALUE};

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginReport {
    /// Selector that accepted the username.
    pub username_selector: String,
    pub password_selector: String,
    pub submitted: bool,
    pub navigation: NavigationReport,
    pub screenshot: Option<PathBuf>,
}

impl LoginReport {
    pub fn landed(&self) -> bool {
        self.navigation.landed()
    }
}

fn password_field(fields: &[FieldDescriptor]) -> Option<&FieldDescriptor> {
    fields
        .iter()
        .filter(|f| f.is_fillable())
        .find(|f| f.is_password() || f.detected_type == FieldType::Password)
}

/// Prefer a field classified as email/username; fall back to the first plain
/// text or email input.
fn username_field(fields: &[FieldDescriptor]) -> Option<&FieldDescriptor> {
    let candidates = || {
        fields
            .iter()
            .filter(|f| f.is_fillable() && !f.is_password() && f.kind == FieldKind::Input)
    };
    candidates()
        .find(|f| matches!(f.detected_type, FieldType::Email | FieldType::Username))
        .or_else(|| candidates().find(|f| matches!(f.input_type.as_str(), "text" | "email")))
}

/// Type `value` through the field's ranked selectors; returns the one that
/// worked. Exhaustion is reported as [`FlowError::UnusableLoginField`] with
/// page diagnostics.
fn enter<D: Driver + ?Sized>(
    driver: &D,
    step: &'static str,
    field: &FieldDescriptor,
    value: &str,
    screenshot_dir: Option<&Path>,
) -> Result<String> {
    let attempts: Vec<Attempt<'_, ()>> = rank(field)
        .into_iter()
        .map(|strategy| {
            let selector = strategy.selector;
            attempt(selector.clone(), move || {
                driver.clear(&selector)?;
                driver.type_text(&selector, value)
            })
        })
        .collect();
    match try_in_order(step, attempts) {
        Ok((selector, ())) => Ok(selector),
        Err(FlowError::Exhausted { tried, .. }) => {
            warn!(target: "formpilot::login", "[Login] No selector accepted the {step}");
            Err(FlowError::UnusableLoginField {
                field: step,
                tried,
                diagnostics: Box::new(capture_diagnostics(
                    driver,
                    screenshot_dir,
                    "login-unusable-field",
                )),
            })
        }
        Err(e) => Err(e),
    }
}

/// Fill the login pair on the current page, submit, then walk the
/// post-login flow until a landing page or a stop condition.
///
/// A page without a password field fails with
/// [`FlowError::MissingLoginField`]; a field that no selector can type into
/// fails with [`FlowError::UnusableLoginField`].
pub fn smart_login<D: Driver + ?Sized>(
    driver: &D,
    credentials: &Credentials,
    filler_config: FillerConfig,
    navigator_config: NavigatorConfig,
) -> Result<LoginReport> {
    let fields = detect_fields(driver)?;
    let screenshot_dir = filler_config.screenshot_dir.clone();
    let missing = |field: &'static str| FlowError::MissingLoginField {
        field,
        diagnostics: Box::new(capture_diagnostics(
            driver,
            screenshot_dir.as_deref(),
            "login-missing-field",
        )),
    };

    let Some(password) = password_field(&fields) else {
        return Err(missing("password"));
    };
    let Some(username) = username_field(&fields) else {
        return Err(missing("username"));
    };

    let username_selector = enter(
        driver,
        "username",
        username,
        &credentials.username,
        screenshot_dir.as_deref(),
    )?;
    info!(
        target: "formpilot::login",
        "[Login] Username -> {username_selector}: {}", credentials.username
    );
    let password_selector = enter(
        driver,
        "password",
        password,
        &credentials.password,
        screenshot_dir.as_deref(),
    )?;
    info!(target: "formpilot::login", "[Login] Password -> {password_selector}: {HIDDEN_VALUE}");

    let filler = FormFiller::new(driver, filler_config);
    let submitted = filler.submit(None)?;
    if !submitted {
        warn!(target: "formpilot::login", "[Login] No submit control found, continuing");
    }
    let screenshot = filler.screenshot("login")?;

    let navigation = Navigator::new(driver, navigator_config).run()?;
    if navigation.landed() {
        info!(target: "formpilot::login", "[Login] Landed on {}", navigation.final_url);
    } else {
        warn!(
            target: "formpilot::login",
            "[Login] Stopped at {} ({:?})", navigation.final_url, navigation.outcome
        );
    }

    Ok(LoginReport {
        username_selector,
        password_selector,
        submitted,
        navigation,
        screenshot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::NavigationOutcome;
    use crate::testing::{FakeButton, FakePage, PageFixture, field};

    const LOGIN: &str = "https://portal.test/s/login";
    const TERMS: &str = "https://portal.test/s/flow/terms";
    const HOME: &str = "https://portal.test/s/home";

    fn login_fields() -> Vec<FieldDescriptor> {
        let mut search = field(0, "input", "search");
        search.name = Some("q".into());
        let mut user = field(1, "input", "text");
        user.id = Some("UserName".into());
        let mut pass = field(2, "input", "password");
        pass.id = Some("Password".into());
        vec![search, user, pass]
    }

    fn portal() -> FakePage {
        FakePage::new(LOGIN)
            .with_page(
                LOGIN,
                PageFixture::text("Sign in to the portal").button(FakeButton::new("Log In").to(TERMS)),
            )
            .with_fields(login_fields())
            .with_page(
                TERMS,
                PageFixture::text("Please accept the terms of use")
                    .toggle(r#"input[type="checkbox"]"#, false, false)
                    .button(FakeButton::new("Finish").to(HOME)),
            )
            .with_page(HOME, PageFixture::text("Welcome back"))
    }

    #[test]
    fn logs_in_and_navigates_to_landing() {
        let page = portal();
        let report = smart_login(
            &page,
            &Credentials::new("ann@example.com", "Secr3t!"),
            FillerConfig::default(),
            NavigatorConfig::default(),
        )
        .unwrap();

        assert_eq!(page.value_of("#UserName").as_deref(), Some("ann@example.com"));
        assert_eq!(page.value_of("#Password").as_deref(), Some("Secr3t!"));
        assert_eq!(page.value_of(r#"[name="q"]"#), None);
        assert_eq!(report.username_selector, "#UserName");
        assert!(report.submitted);
        assert!(report.landed());
        assert_eq!(report.navigation.final_url, HOME);
        assert!(page.calls().contains(&"press Finish".to_string()));
    }

    #[test]
    fn email_field_wins_over_earlier_text_input() {
        let mut company = field(0, "input", "text");
        company.id = Some("company".into());
        company.detected_type = FieldType::Company;
        let mut email = field(1, "input", "email");
        email.id = Some("email".into());
        email.detected_type = FieldType::Email;
        let fields = vec![company, email];
        assert_eq!(username_field(&fields).and_then(|f| f.id.as_deref()), Some("email"));
    }

    #[test]
    fn disabled_password_field_is_ignored() {
        let mut pass = field(0, "input", "password");
        pass.constraints.disabled = true;
        assert!(password_field(&[pass]).is_none());
    }

    #[test]
    fn missing_password_is_a_hard_failure_with_diagnostics() {
        let mut user = field(0, "input", "text");
        user.id = Some("UserName".into());
        let page = FakePage::new(LOGIN)
            .with_page(LOGIN, PageFixture::text("Enter your username to continue"))
            .with_fields(vec![user]);

        let err = smart_login(
            &page,
            &Credentials::new("ann", "pw"),
            FillerConfig::default(),
            NavigatorConfig::default(),
        )
        .unwrap_err();

        match err {
            FlowError::MissingLoginField { field, diagnostics } => {
                assert_eq!(field, "password");
                assert_eq!(diagnostics.url, LOGIN);
                assert!(diagnostics.text_sample.contains("username"));
                assert!(diagnostics.screenshot.is_none());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(page.value_of("#UserName").is_none());
    }

    #[test]
    fn password_rejecting_every_selector_keeps_diagnostics() {
        let mut fields = login_fields();
        fields[2].name = Some("pw".into());
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::new(LOGIN)
            .with_page(LOGIN, PageFixture::text("Sign in to the portal"))
            .with_fields(fields)
            .failing("#Password")
            .failing(r#"[name="pw"]"#)
            .failing("input:nth-of-type(1)");
        let config = FillerConfig {
            screenshot_dir: Some(dir.path().to_path_buf()),
            ..FillerConfig::default()
        };

        let err = smart_login(
            &page,
            &Credentials::new("ann", "pw"),
            config,
            NavigatorConfig::default(),
        )
        .unwrap_err();

        match err {
            FlowError::UnusableLoginField { field, tried, diagnostics } => {
                assert_eq!(field, "password");
                assert_eq!(tried.len(), 3);
                assert_eq!(diagnostics.url, LOGIN);
                assert!(diagnostics.text_sample.contains("Sign in"));
                assert!(diagnostics.screenshot.as_deref().is_some_and(|p| p.starts_with(dir.path())));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(page.value_of("#UserName").as_deref(), Some("ann"));
        assert!(page.calls().iter().all(|c| c != "press Log In"));
    }

    #[test]
    fn unsubmittable_page_still_reports_navigation() {
        let page = FakePage::new(LOGIN)
            .with_page(LOGIN, PageFixture::text("Sign in"))
            .with_fields(login_fields());
        let report = smart_login(
            &page,
            &Credentials::new("ann", "pw"),
            FillerConfig::default(),
            NavigatorConfig::default(),
        )
        .unwrap();
        assert!(!report.submitted);
        assert_eq!(report.navigation.outcome, NavigationOutcome::NoProgress);
    }
}
