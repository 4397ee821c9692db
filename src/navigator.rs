//! Bounded greedy navigation through multi-step flows
//! (login → agreement → continue → landing).

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::NavigatorConfig;
use crate::driver::{Attempt, Driver, attempt, quote, try_in_order};
use crate::error::{DriverError, FlowError, Result};

/// Toggle/checkbox patterns for agreement controls, in search order.
const TOGGLE_SELECTORS: &[&str] = &[
    r#"button[role="switch"]"#,
    r#"[role="switch"]"#,
    ".slds-checkbox_toggle",
    r#"input[type="checkbox"]"#,
    "lightning-input",
];

/// Universal button ordering used after any page-instructed family.
const UNIVERSAL_LABELS: &[&str] = &[
    "Finish", "Done", "Complete", "Next", "Continue", "Proceed", "Submit", "Accept", "Confirm",
    "OK",
];

/// Instruction word → label family, checked in order.
const INSTRUCTED_FAMILIES: &[(&str, &[&str])] = &[
    ("finish", &["Finish", "Done", "Complete"]),
    ("next", &["Next", "Continue", "Proceed"]),
    ("continue", &["Continue", "Next", "Proceed"]),
    ("submit", &["Submit", "Send", "Confirm"]),
    ("accept", &["Accept", "Agree", "Confirm"]),
];

const SUBMIT_FALLBACK: &str = r#"button[type="submit"]"#;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NavigationOutcome {
    /// A landing page was recognized.
    Landed,
    /// The same URL kept coming back with nothing changing.
    Stuck,
    /// Nothing actionable was found on the page.
    NoProgress,
    /// The step limit ran out before any of the above.
    BudgetExhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationStep {
    pub step: usize,
    pub url: String,
    pub agreed: bool,
    /// Button label that was clicked, with the strategy that worked.
    pub clicked: Option<ClickedButton>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickedButton {
    pub label: String,
    pub strategy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationReport {
    pub steps: usize,
    pub outcome: NavigationOutcome,
    pub final_url: String,
    pub history: Vec<NavigationStep>,
}

impl NavigationReport {
    pub fn landed(&self) -> bool {
        self.outcome == NavigationOutcome::Landed
    }
}

fn contains_any(tokens: &[String], haystack: &str) -> bool {
    tokens.iter().any(|t| haystack.contains(t.as_str()))
}

/// URL half of the landing heuristic: a landing token is present, or none of
/// the in-flow tokens are.
pub fn is_landing_url(config: &NavigatorConfig, url: &str) -> bool {
    let url = url.to_lowercase();
    contains_any(&config.landing_url_tokens, &url) || !contains_any(&config.flow_url_tokens, &url)
}

pub struct Navigator<'a, D: Driver + ?Sized> {
    driver: &'a D,
    config: NavigatorConfig,
}

impl<'a, D: Driver + ?Sized> Navigator<'a, D> {
    pub fn new(driver: &'a D, config: NavigatorConfig) -> Self {
        Self { driver, config }
    }

    /// Run with the configured step budget.
    pub fn run(&self) -> Result<NavigationReport> {
        self.auto_navigate(self.config.max_steps)
    }

    /// Scan, act, settle, repeat until a terminal condition.
    ///
    /// Each iteration checks, in order: the step budget, stuck detection,
    /// then the landing heuristic. Only then is an agreement toggled and a
    /// continuation button clicked. An iteration with neither ends the run.
    pub fn auto_navigate(&self, max_steps: usize) -> Result<NavigationReport> {
        info!(target: "formpilot::navigator", "[Navigator] Starting auto-navigation (max {max_steps} steps)");

        let mut steps = 0;
        let mut history = Vec::new();
        let mut last_url: Option<String> = None;
        let mut same_url = 0;
        let mut state_changed = false;

        let outcome = loop {
            if steps >= max_steps {
                warn!(target: "formpilot::navigator", "[Navigator] Reached maximum steps");
                break NavigationOutcome::BudgetExhausted;
            }

            let url = self.driver.url()?;
            if last_url.as_deref() == Some(url.as_str()) && !state_changed {
                same_url += 1;
            } else {
                same_url = 1;
            }
            steps += 1;
            debug!(target: "formpilot::navigator", "[Navigator] Step {steps}: {url}");

            if same_url >= self.config.stuck_threshold {
                warn!(
                    target: "formpilot::navigator",
                    "[Navigator] Same URL seen {same_url} times in a row, stopping"
                );
                break NavigationOutcome::Stuck;
            }

            let text = self.page_text()?;
            if self.is_landing(&url, &text) {
                info!(target: "formpilot::navigator", "[Navigator] Reached landing page: {url}");
                break NavigationOutcome::Landed;
            }

            let agreed = self.handle_agreement_with(&text)?;
            let clicked = self.click_navigation_button_with(&text)?;

            history.push(NavigationStep {
                step: steps,
                url: url.clone(),
                agreed,
                clicked: clicked.clone(),
            });

            if !agreed && clicked.is_none() {
                info!(target: "formpilot::navigator", "[Navigator] No more actions to take");
                break NavigationOutcome::NoProgress;
            }

            self.driver.wait_for_settle(self.config.settle_timeout)?;
            state_changed = agreed;
            last_url = Some(url);
        };

        let final_url = self.driver.url()?;
        info!(
            target: "formpilot::navigator",
            "[Navigator] Auto-navigation finished after {steps} steps: {outcome:?}"
        );
        Ok(NavigationReport {
            steps,
            outcome,
            final_url,
            history,
        })
    }

    fn page_text(&self) -> Result<String> {
        match self.driver.body_text() {
            Ok(text) => Ok(text.to_lowercase()),
            Err(e) if e.is_recoverable() => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Landing heuristic over the URL and the lowercased page text.
    pub fn is_landing(&self, url: &str, text: &str) -> bool {
        let text = text.to_lowercase();
        is_landing_url(&self.config, url)
            || contains_any(&self.config.landing_text_indicators, &text)
    }

    /// Toggle the first visible agreement control into its agreed state.
    /// Controls that are already agreed are left alone.
    pub fn handle_agreement(&self) -> Result<bool> {
        let text = self.page_text()?;
        self.handle_agreement_with(&text)
    }

    fn handle_agreement_with(&self, text: &str) -> Result<bool> {
        let consent = self
            .config
            .consent_vocabulary
            .iter()
            .any(|word| text.contains(word.as_str()));
        if !consent {
            debug!(target: "formpilot::navigator", "[Navigator] No consent wording, toggles left alone");
            return Ok(false);
        }

        for selector in TOGGLE_SELECTORS {
            match self.try_agree(selector) {
                Ok(true) => {
                    info!(target: "formpilot::navigator", "[Navigator] Agreement toggled: {selector}");
                    return Ok(true);
                }
                Ok(false) => {}
                Err(e) if e.is_recoverable() => {
                    debug!(target: "formpilot::navigator", "[Navigator] {selector}: {e}");
                }
                Err(e) => return Err(e.into()),
            }
        }
        debug!(target: "formpilot::navigator", "[Navigator] No agreement toggles found");
        Ok(false)
    }

    fn try_agree(&self, selector: &str) -> std::result::Result<bool, DriverError> {
        if !self.driver.is_visible(selector, self.config.visible_timeout)? {
            return Ok(false);
        }

        let is_switch = self.driver.attribute(selector, "role")?.as_deref() == Some("switch");
        if is_switch {
            let on = |name: &str| -> std::result::Result<bool, DriverError> {
                Ok(self.driver.attribute(selector, name)?.as_deref() == Some("true"))
            };
            if on("aria-checked")? || on("aria-pressed")? {
                return Ok(false);
            }
            self.driver.click(selector, self.config.click_timeout)?;
        } else {
            if self.driver.is_checked(selector)? {
                return Ok(false);
            }
            self.driver.set_checked(selector, true)?;
        }
        Ok(true)
    }

    /// Ordered candidate labels: the family the page tells the user to
    /// click, then the universal ordering, without duplicates.
    pub fn candidate_labels(text: &str) -> Vec<&'static str> {
        let text = text.to_lowercase();
        let instructed = if text.contains("click") {
            INSTRUCTED_FAMILIES
                .iter()
                .find(|(word, _)| text.contains(word))
                .map(|(_, family)| *family)
                .unwrap_or_default()
        } else {
            &[]
        };

        let mut labels: Vec<&'static str> = Vec::new();
        for label in instructed.iter().chain(UNIVERSAL_LABELS) {
            if !labels.contains(label) {
                labels.push(*label);
            }
        }
        labels
    }

    /// Click the best continuation button. `None` when nothing was clickable.
    pub fn click_navigation_button(&self) -> Result<Option<ClickedButton>> {
        let text = self.page_text()?;
        self.click_navigation_button_with(&text)
    }

    fn click_navigation_button_with(&self, text: &str) -> Result<Option<ClickedButton>> {
        for label in Self::candidate_labels(text) {
            match try_in_order(&format!("button {label}"), self.label_strategies(label)) {
                Ok((strategy, ())) => {
                    info!(
                        target: "formpilot::navigator",
                        "[Navigator] Clicked \"{label}\" using {strategy}"
                    );
                    return Ok(Some(ClickedButton {
                        label: label.to_string(),
                        strategy,
                    }));
                }
                Err(FlowError::Exhausted { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        match self.driver.click(SUBMIT_FALLBACK, self.config.click_timeout) {
            Ok(()) => {
                info!(target: "formpilot::navigator", "[Navigator] Clicked fallback submit button");
                Ok(Some(ClickedButton {
                    label: "Submit".to_string(),
                    strategy: SUBMIT_FALLBACK.to_string(),
                }))
            }
            Err(e) if e.is_recoverable() => {
                debug!(target: "formpilot::navigator", "[Navigator] No navigation buttons found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn label_strategies(&self, label: &'static str) -> Vec<Attempt<'_, ()>> {
        let driver = self.driver;
        let enable = self.config.enable_timeout;
        let click = self.config.click_timeout;

        let locators = [
            ("exact-text", format!("text={}", quote(label))),
            ("role", format!("role=button[name={}]", quote(label))),
            ("has-text", format!("button:has-text({})", quote(label))),
        ];

        let mut attempts: Vec<Attempt<'_, ()>> = locators
            .into_iter()
            .map(|(name, selector)| {
                attempt(name, move || {
                    if !driver.wait_enabled(&selector, enable)? {
                        debug!(target: "formpilot::navigator", "[Navigator] {selector} not enabled yet");
                    }
                    driver.click(&selector, click)
                })
            })
            .collect();

        attempts.push(attempt("frame-scan", move || {
            if driver.click_text_in_frames(label)? {
                Ok(())
            } else {
                Err(DriverError::NotFound(format!("button containing {label:?}")))
            }
        }));
        attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeButton, FakePage, PageFixture};

    const AGREEMENT: &str = "https://app.test/flow/agreement";
    const HOME: &str = "https://app.test/lightning/page/home";

    fn navigator(page: &FakePage) -> Navigator<'_, FakePage> {
        Navigator::new(page, NavigatorConfig::default())
    }

    #[test]
    fn nothing_actionable_ends_after_one_step() {
        let url = "https://app.test/flow/wait";
        let page = FakePage::new(url).with_page(url, PageFixture::text("Please wait"));
        let report = navigator(&page).auto_navigate(10).unwrap();
        assert_eq!(report.outcome, NavigationOutcome::NoProgress);
        assert_eq!(report.steps, 1);
    }

    #[test]
    fn ineffective_clicks_are_detected_as_stuck() {
        let url = "https://app.test/login/step";
        let page = FakePage::new(url)
            .with_page(url, PageFixture::text("Review").button(FakeButton::new("Next")));
        let report = navigator(&page).auto_navigate(10).unwrap();
        assert_eq!(report.outcome, NavigationOutcome::Stuck);
        assert_eq!(report.steps, 3);
        assert_eq!(
            page.calls().iter().filter(|c| *c == "press Next").count(),
            2
        );
    }

    #[test]
    fn agreement_then_next_reaches_landing() {
        let page = FakePage::new(AGREEMENT)
            .with_page(
                AGREEMENT,
                PageFixture::text("I agree to the terms. Click Next to continue.")
                    .toggle(r#"button[role="switch"]"#, true, true)
                    .button(FakeButton::new("Next").to(HOME).disabled()),
            )
            .with_page(HOME, PageFixture::text("Lightning Experience"));

        let report = navigator(&page).auto_navigate(10).unwrap();
        assert!(report.landed());
        assert_eq!(report.steps, 2);
        assert_eq!(report.final_url, HOME);
        assert!(report.history[0].agreed);
        assert_eq!(
            report.history[0].clicked,
            Some(ClickedButton {
                label: "Next".into(),
                strategy: "exact-text".into()
            })
        );
        let calls = page.calls();
        let toggle = calls
            .iter()
            .position(|c| c == r#"click button[role="switch"]"#)
            .unwrap();
        let next = calls.iter().position(|c| c == "press Next").unwrap();
        assert!(toggle < next);
    }

    #[test]
    fn agreement_is_not_toggled_twice() {
        let page = FakePage::new(AGREEMENT).with_page(
            AGREEMENT,
            PageFixture::text("Accept the terms").toggle(r#"input[type="checkbox"]"#, false, false),
        );
        let nav = navigator(&page);
        assert!(nav.handle_agreement().unwrap());
        assert!(!nav.handle_agreement().unwrap());
        assert_eq!(page.toggle_agreed(r#"input[type="checkbox"]"#), Some(true));
        assert_eq!(
            page.calls().iter().filter(|c| c.starts_with("check")).count(),
            1
        );
    }

    #[test]
    fn toggle_without_consent_text_is_ignored() {
        let page = FakePage::new(AGREEMENT).with_page(
            AGREEMENT,
            PageFixture::text("Notifications").toggle(r#"[role="switch"]"#, true, false),
        );
        assert!(!navigator(&page).handle_agreement().unwrap());
        assert_eq!(page.toggle_agreed(r#"[role="switch"]"#), Some(false));
        assert!(page.calls().iter().all(|c| !c.starts_with("visible")));
    }

    #[test]
    fn instructed_family_comes_first() {
        let labels = Navigator::<FakePage>::candidate_labels("Click ACCEPT to proceed");
        assert_eq!(&labels[..4], &["Accept", "Agree", "Confirm", "Finish"]);
        assert_eq!(labels.iter().filter(|l| **l == "Accept").count(), 1);

        let plain = Navigator::<FakePage>::candidate_labels("Next steps");
        assert_eq!(plain[0], "Finish");
    }

    #[test]
    fn frame_scan_is_the_last_label_strategy() {
        let url = "https://app.test/flow/frame";
        let page = FakePage::new(url)
            .with_page(
                url,
                PageFixture::text("Ready").button(FakeButton::new("Continue").to(HOME).in_frame()),
            )
            .with_page(HOME, PageFixture::text("Start"));
        let report = navigator(&page).auto_navigate(10).unwrap();
        assert!(report.landed());
        let clicked = report.history[0].clicked.clone().unwrap();
        assert_eq!(clicked.label, "Continue");
        assert_eq!(clicked.strategy, "frame-scan");
    }

    #[test]
    fn plain_submit_button_is_the_final_fallback() {
        let url = "https://app.test/flow/custom";
        let page = FakePage::new(url)
            .with_page(
                url,
                PageFixture::text("Ready")
                    .button(FakeButton::new("Go").css(r#"button[type="submit"]"#).to(HOME)),
            )
            .with_page(HOME, PageFixture::text("Start"));
        let report = navigator(&page).auto_navigate(10).unwrap();
        assert!(report.landed());
        assert_eq!(
            report.history[0].clicked.as_ref().map(|c| c.strategy.as_str()),
            Some(SUBMIT_FALLBACK)
        );
    }

    #[test]
    fn bouncing_pages_exhaust_the_budget() {
        let a = "https://app.test/flow/a";
        let b = "https://app.test/flow/b";
        let page = FakePage::new(a)
            .with_page(a, PageFixture::text("Step A").button(FakeButton::new("Next").to(b)))
            .with_page(b, PageFixture::text("Step B").button(FakeButton::new("Next").to(a)));
        let report = navigator(&page).auto_navigate(3).unwrap();
        assert_eq!(report.outcome, NavigationOutcome::BudgetExhausted);
        assert_eq!(report.steps, 3);
    }

    #[test]
    fn landing_heuristic_uses_url_and_text() {
        let page = FakePage::new(AGREEMENT);
        let nav = navigator(&page);
        assert!(nav.is_landing("https://app.test/dashboard", ""));
        assert!(nav.is_landing("https://app.test/account", ""));
        assert!(!nav.is_landing("https://app.test/login", "enter your password"));
        assert!(nav.is_landing("https://app.test/login", "Welcome back"));
    }
}
