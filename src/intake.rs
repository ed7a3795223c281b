//! License requests arriving as free-text messages.
//!
//! Turns a message (sender header, subject and body) into an
//! [`IntakeRequest`]: who asked, which plan they most likely want, and any
//! phone number or company name mentioned. Fetching the message from a
//! mailbox is the caller's business.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::{LicenseError, LicenseResult};
use crate::logging::{log_license_event, LicenseEvent};
use crate::plans::{Plan, PlanOverrides};
use crate::records::{normalize_email, CustomerRecord, LicenseRecord, NewCustomer};
use crate::store::Store;

/// Trial length granted to requests that came in through intake.
pub const INTAKE_TRIAL_DAYS: u32 = 30;

lazy_static! {
    static ref EMAIL: Regex = Regex::new(r"[\w.-]+@[\w.-]+").expect("valid email regex");

    /// Checked in order; the first plan with a matching keyword wins.
    static ref PLAN_KEYWORDS: Vec<(Plan, Regex)> = vec![
        (Plan::Trial, keyword_regex(&["trial", "test", "try", "demo", "thử"])),
        (Plan::Lifetime, keyword_regex(&["lifetime", "permanent", "vĩnh viễn", "mãi mãi"])),
        (Plan::Monthly, keyword_regex(&["monthly", "month", "tháng"])),
        (Plan::Quarterly, keyword_regex(&["quarterly", "quarter", "quý"])),
        (Plan::MultiDevice, keyword_regex(&["multi", "multiple", "nhiều thiết bị"])),
    ];

    static ref PHONE_PATTERNS: Vec<Regex> = [
        r"\+?84[\s-]?\d{9,10}",
        r"\+?\d{1,3}[\s-]?\d{10,12}",
        r"\d{10,11}",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid phone regex"))
    .collect();

    static ref COMPANY_PATTERNS: Vec<Regex> = [
        r"(?i)company[:\s]+([^\n]+)",
        r"(?i)công ty[:\s]+([^\n]+)",
        r"(?i)from\s+([a-z][a-z\s]+(?:corp|inc|ltd|co\.|company))",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid company regex"))
    .collect();
}

/// Keywords match at the start of a word, so "months" counts as "month" but
/// "country" does not count as "try".
fn keyword_regex(words: &[&str]) -> Regex {
    let alternatives: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
    Regex::new(&format!(r"(?i)\b(?:{})", alternatives.join("|"))).expect("valid keyword regex")
}

/// A parsed license request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeRequest {
    pub sender_email: String,
    pub sender_name: String,
    pub subject: String,
    pub plan: Plan,
    pub phone: Option<String>,
    pub company: Option<String>,
}

impl IntakeRequest {
    /// Parse a request from its `From` header, subject and plain-text body.
    pub fn parse(from_header: &str, subject: &str, body: &str) -> LicenseResult<Self> {
        let sender_email = EMAIL
            .find(from_header)
            .map(|m| m.as_str().to_lowercase())
            .ok_or_else(|| {
                LicenseError::InvalidRequest(format!("no sender address in '{from_header}'"))
            })?;

        Ok(Self {
            sender_name: sender_name(from_header, &sender_email),
            plan: detect_plan(&format!("{subject} {body}")),
            phone: extract_phone(body),
            company: extract_company(body),
            subject: subject.trim().to_string(),
            sender_email,
        })
    }

    /// Parse a raw message: `Header: value` lines, a blank line, the body.
    pub fn parse_message(raw: &str) -> LicenseResult<Self> {
        let raw = raw.replace("\r\n", "\n");
        let (headers, body) = raw.split_once("\n\n").unwrap_or((raw.as_str(), ""));

        let header = |name: &str| {
            headers.lines().find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.trim()
                    .eq_ignore_ascii_case(name)
                    .then(|| value.trim().to_string())
            })
        };

        let from = header("From")
            .ok_or_else(|| LicenseError::InvalidRequest("message has no From header".to_string()))?;
        let subject = header("Subject").unwrap_or_default();
        Self::parse(&from, &subject, body)
    }

    /// Generation overrides for the detected plan.
    pub fn overrides(&self) -> PlanOverrides {
        match self.plan {
            Plan::Trial => PlanOverrides {
                duration_days: Some(INTAKE_TRIAL_DAYS),
                ..Default::default()
            },
            _ => PlanOverrides::default(),
        }
    }

    pub fn new_customer(&self) -> NewCustomer {
        NewCustomer {
            email: self.sender_email.clone(),
            name: Some(self.sender_name.clone()),
            phone: self.phone.clone(),
            company: self.company.clone(),
        }
    }
}

/// Display name from a `From` header, falling back to the title-cased local
/// part of the address.
fn sender_name(from_header: &str, email: &str) -> String {
    let name = from_header
        .split('<')
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| c == ' ' || c == '"');
    if !name.is_empty() && !name.contains('@') {
        return name.to_string();
    }
    title_case(email.split('@').next().unwrap_or(email))
}

fn title_case(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut at_start = true;
    for c in word.chars() {
        if c.is_alphabetic() {
            if at_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_start = false;
        } else {
            out.push(c);
            at_start = true;
        }
    }
    out
}

/// Guess the requested plan from free text. Defaults to trial.
pub fn detect_plan(text: &str) -> Plan {
    PLAN_KEYWORDS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(plan, _)| *plan)
        .unwrap_or(Plan::Trial)
}

pub fn extract_phone(text: &str) -> Option<String> {
    PHONE_PATTERNS
        .iter()
        .find_map(|re| re.find(text))
        .map(|m| m.as_str().to_string())
}

pub fn extract_company(text: &str) -> Option<String> {
    COMPANY_PATTERNS
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|c| !c.is_empty())
}

impl Store {
    /// Create (or reuse) the requesting customer, mint a key for the detected
    /// plan and assign it, all in one write.
    pub fn fulfil_request(
        &mut self,
        request: &IntakeRequest,
    ) -> LicenseResult<(LicenseRecord, CustomerRecord)> {
        self.fulfil_request_at(request, Utc::now())
    }

    pub fn fulfil_request_at(
        &mut self,
        request: &IntakeRequest,
        now: DateTime<Utc>,
    ) -> LicenseResult<(LicenseRecord, CustomerRecord)> {
        let result = self.try_fulfil(request, now);
        let (license, customer, created) = match result {
            Ok(done) => done,
            Err(e) => {
                tracing::warn!(
                    customer = %request.sender_email,
                    plan = %request.plan,
                    error = %e,
                    "license request failed"
                );
                return Err(e);
            }
        };

        if created {
            log_license_event(LicenseEvent::CustomerCreated, &customer.email, Some("intake"));
        }
        let details = format!(
            "plan={} days={} devices={} price={}",
            license.plan, license.duration_days, license.max_devices, license.price
        );
        log_license_event(LicenseEvent::Generated, &license.key, Some(&details));
        log_license_event(
            LicenseEvent::Assigned,
            &license.key,
            Some(&format!("customer={}", customer.email)),
        );
        tracing::info!(
            customer = %customer.email,
            plan = %request.plan,
            key = %license.key,
            "fulfilled license request"
        );
        Ok((license, customer))
    }

    fn try_fulfil(
        &mut self,
        request: &IntakeRequest,
        now: DateTime<Utc>,
    ) -> LicenseResult<(LicenseRecord, CustomerRecord, bool)> {
        let email = normalize_email(&request.sender_email)?;
        let new_customer = match self.customer_index(&email) {
            Some(_) => None,
            None => Some(CustomerRecord::new(request.new_customer(), now)?),
        };
        let created = new_customer.is_some();
        let minted = self.generator.mint(request.plan, &request.overrides(), now, |key| {
            self.contains_key(key)
        })?;

        self.commit(|store| {
            let idx = store.doc.keys.len();
            store.insert_license(minted);
            let key = store.apply_assignment(idx, &email, new_customer, now)?;

            let license = store.license(&key)?.clone();
            let customer = store
                .lookup_customer(&email)
                .cloned()
                .ok_or_else(|| LicenseError::InvalidRequest(format!("unknown customer {email}")))?;
            Ok((license, customer, created))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_plans_by_keyword() {
        assert_eq!(detect_plan("I'd like to try the app"), Plan::Trial);
        assert_eq!(detect_plan("Lifetime license please"), Plan::Lifetime);
        assert_eq!(detect_plan("Cho tôi gói tháng"), Plan::Monthly);
        assert_eq!(detect_plan("3 months subscription"), Plan::Monthly);
        assert_eq!(detect_plan("QUARTERLY plan"), Plan::Quarterly);
        assert_eq!(detect_plan("we need multiple seats"), Plan::MultiDevice);
        assert_eq!(detect_plan("hello there"), Plan::Trial);
    }

    #[test]
    fn trial_keywords_take_precedence() {
        assert_eq!(detect_plan("can I test the lifetime plan?"), Plan::Trial);
    }

    #[test]
    fn keywords_need_word_start() {
        assert_eq!(detect_plan("Buying from another country, lifetime"), Plan::Lifetime);
    }

    #[test]
    fn extracts_phone_numbers() {
        assert_eq!(
            extract_phone("call me at +84 912345678 today").as_deref(),
            Some("+84 912345678")
        );
        assert_eq!(extract_phone("phone 0912345678").as_deref(), Some("0912345678"));
        assert_eq!(extract_phone("no digits here"), None);
    }

    #[test]
    fn extracts_company() {
        assert_eq!(
            extract_company("Hi,\nCompany: Acme Media\nThanks").as_deref(),
            Some("Acme Media")
        );
        assert_eq!(
            extract_company("Công ty: ABC Studio\n").as_deref(),
            Some("ABC Studio")
        );
        assert_eq!(
            extract_company("greetings from Globex Corp, we want keys").as_deref(),
            Some("Globex Corp")
        );
        assert_eq!(extract_company("just me"), None);
    }

    #[test]
    fn sender_name_falls_back_to_local_part() {
        let req = IntakeRequest::parse("john.doe@example.com", "trial", "").unwrap();
        assert_eq!(req.sender_name, "John.Doe");

        let req = IntakeRequest::parse("\"Jane Roe\" <Jane@Example.com>", "", "").unwrap();
        assert_eq!(req.sender_name, "Jane Roe");
        assert_eq!(req.sender_email, "jane@example.com");
    }

    #[test]
    fn parses_raw_message() {
        let raw = "From: Nam Nguyen <nam@example.vn>\r\nSubject: Lifetime license\r\n\r\nCompany: Saigon Films\nPhone: +84 987654321\n";
        let req = IntakeRequest::parse_message(raw).unwrap();
        assert_eq!(req.plan, Plan::Lifetime);
        assert_eq!(req.sender_name, "Nam Nguyen");
        assert_eq!(req.company.as_deref(), Some("Saigon Films"));
        assert_eq!(req.phone.as_deref(), Some("+84 987654321"));
        assert_eq!(req.overrides(), PlanOverrides::default());
    }

    #[test]
    fn missing_sender_is_rejected() {
        assert!(matches!(
            IntakeRequest::parse("nobody", "trial", ""),
            Err(LicenseError::InvalidRequest(_))
        ));
        assert!(IntakeRequest::parse_message("Subject: hi\n\nbody").is_err());
    }

    #[test]
    fn trial_requests_get_longer_trial() {
        let req = IntakeRequest::parse("a@example.com", "demo please", "").unwrap();
        assert_eq!(req.overrides().duration_days, Some(INTAKE_TRIAL_DAYS));
    }

    #[test]
    fn failed_fulfilment_changes_nothing() {
        use crate::config::LicenseStoreConfig;
        use crate::generator::KeyGenerator;
        use crate::license_key::LicenseKeyConfig;

        let mut store = Store::in_memory(&LicenseStoreConfig::default());
        store.generator = KeyGenerator::new(
            LicenseKeyConfig {
                prefix: "T".to_string(),
                segments: 1,
                segment_length: 1,
            },
            10_000,
        );
        // Take every one of the 31 possible keys.
        store
            .generate_batch(Plan::Monthly, PlanOverrides::default(), 31)
            .unwrap();
        let keys_before = store.licenses().to_vec();

        let req = IntakeRequest::parse("new@example.com", "monthly plan", "").unwrap();
        assert!(matches!(
            store.fulfil_request(&req),
            Err(LicenseError::KeySpaceExhausted(10_000))
        ));
        assert!(store.customers().is_empty());
        assert!(store.lookup_customer("new@example.com").is_none());
        assert_eq!(store.licenses(), keys_before.as_slice());
    }
}
