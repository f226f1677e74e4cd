//! Built-in classification rules.
//!
//! Matching is substring/regex based and bilingual (German/English).
//! Every rule lowercases its inputs once and never touches mailbox
//! state; patterns are compiled at construction.

use regex::Regex;

use crate::error::RuleError;
use crate::mail::NormalizedEmail;
use crate::rules::{Category, Rule, RuleMatch};

const SECURITY_CONFIDENCE: f32 = 0.9;
const JOB_CONFIDENCE: f32 = 0.85;
const NEWSLETTER_HEADER_CONFIDENCE: f32 = 0.9;
const NEWSLETTER_HEURISTIC_CONFIDENCE: f32 = 0.7;

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

// ── Security alerts ─────────────────────────────────────────────────

/// Account security notifications: an `accounts.`-style sender domain
/// combined with a security-sounding subject.
pub struct SecurityAlertRule {
    sender: Regex,
}

const SECURITY_TOPICS: &[&str] = &["security", "sicherheits", "alert", "warn"];

impl SecurityAlertRule {
    pub fn new() -> Self {
        Self {
            sender: Regex::new(r"(?i)\baccounts\.[a-z0-9.-]+").unwrap(),
        }
    }
}

impl Default for SecurityAlertRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for SecurityAlertRule {
    fn name(&self) -> &'static str {
        "security-alert"
    }

    fn evaluate(&self, email: &NormalizedEmail) -> Result<Option<RuleMatch>, RuleError> {
        let subject = email.subject.to_lowercase();
        if self.sender.is_match(&email.from) && contains_any(&subject, SECURITY_TOPICS) {
            return Ok(Some(RuleMatch {
                reason: "security sender and subject".into(),
                category: Category::Security,
                labels: vec!["Security".into()],
                confidence: SECURITY_CONFIDENCE,
            }));
        }
        Ok(None)
    }
}

// ── Job applications ────────────────────────────────────────────────

/// Stage of the application process a job mail belongs to, derived
/// from the matched wording. Drives the nested label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Confirmation,
    Interview,
    Rejection,
}

impl JobStage {
    pub fn label_suffix(&self) -> &'static str {
        match self {
            Self::Confirmation => "Confirmation",
            Self::Interview => "Interview",
            Self::Rejection => "Rejection",
        }
    }
}

/// Parent label for all application mail; stage labels nest under it.
pub const APPLICATIONS_LABEL: &str = "Applications";

// Strong "we got your application" signals.
const CONFIRM_PHRASES: &[&str] = &[
    "vielen dank für ihre bewerbung",
    "vielen dank fuer ihre bewerbung",
    "danke für ihre bewerbung",
    "danke fuer ihre bewerbung",
    "danke für deine bewerbung",
    "danke fuer deine bewerbung",
    "wir haben ihre bewerbung erhalten",
    "wir haben deine bewerbung erhalten",
    "eingangsbestätigung",
    "eingangsbestaetigung",
    "bestätigung ihrer bewerbung",
    "bestätigung deiner bewerbung",
    "thank you for your application",
    "thank you for applying",
    "we received your application",
    "application received",
    "your application has been received",
    "thank you for your interest",
    "we appreciate your interest",
];

// Rejections are still part of the process; guarded by recruiting
// context below to avoid false positives.
const REJECTION_PHRASES: &[&str] = &[
    "nicht weiter berücksichtigen",
    "nicht weiter beruecksichtigen",
    "leider mitteilen",
    "konnten wir sie leider nicht",
    "konnten wir dich leider nicht",
    "nicht in den engsten kreis",
    "bei der besetzung der stelle",
    "absage",
    "wir bedauern",
    "keinen günstigeren bescheid",
    "keinen guenstigeren bescheid",
    "alles gute für die zukunft",
    "alles gute fuer die zukunft",
    "we will not be moving forward",
    "decided to move forward with other candidates",
    "unfortunately",
];

// Interview and scheduling signals.
const INTERVIEW_PHRASES: &[&str] = &[
    "vorstellungsgespräch",
    "vorstellungs-gespräch",
    "interview",
    "wir möchten dich gerne kennenlernen",
    "wir moechten dich gerne kennenlernen",
    "laden dich ein",
    "einladung zum gespräch",
    "einladung zum gespraech",
    "einladung zum interview",
    "termin",
    "besprechungs-id",
    "microsoft teams",
    "jetzt an der besprechung teilnehmen",
];

// General recruiting context words.
const RECRUITING_WORDS: &[&str] = &[
    "bewerbung",
    "bewerbungsunterlagen",
    "application",
    "candidate",
    "recruit",
    "recruiting",
    "recruiter",
    "talent acquisition",
    "career",
    "position",
    "stelle",
    "m/w/d",
];

// Mails that say "Unterlagen" instead of "Bewerbung".
const APPLICATION_DOC_WORDS: &[&str] = &["unterlagen", "einreichung"];

// Applicant tracking systems; sender or body mentions.
const ATS_MARKERS: &[&str] = &[
    "greenhouse",
    "lever",
    "workday",
    "smartrecruiters",
    "personio",
    "ashby",
    "icims",
    "recruitee",
    "teamtailor",
    "breezy",
    "jobvite",
    "successfactors",
];

/// Application lifecycle mail: confirmations, rejections, interview
/// scheduling, ATS traffic.
pub struct JobApplicationRule {
    title_guard: Regex,
    thanks_then_application: Regex,
    application_then_thanks: Regex,
    received_then_application: Regex,
    application_then_received: Regex,
    interview_word: Regex,
    invite_word: Regex,
}

impl JobApplicationRule {
    pub fn new() -> Self {
        Self {
            title_guard: Regex::new(
                r"(?i)\b(m/w/d|junior|senior|data engineer|software|entwickler)\b",
            )
            .unwrap(),
            thanks_then_application: Regex::new(r"(?is)\b(?:be)?dank\w*\b.*\bbewerb\w*").unwrap(),
            application_then_thanks: Regex::new(r"(?is)\bbewerb\w*\b.*\b(?:be)?dank\w*").unwrap(),
            received_then_application: Regex::new(r"(?is)\breceiv\w*\b.*\bapplicat\w*").unwrap(),
            application_then_received: Regex::new(r"(?is)\bapplicat\w*\b.*\breceiv\w*").unwrap(),
            interview_word: Regex::new(r"(?i)\b(interview|vorstellungsgespräch)\b").unwrap(),
            invite_word: Regex::new(r"(?i)\b(einlad\w*|invite\w*|termin)\b").unwrap(),
        }
    }

    /// Checks ordered from strongest to weakest signal; the first hit
    /// decides the stage.
    fn signal(&self, hay: &str) -> Option<(Option<JobStage>, &'static str)> {
        if contains_any(hay, CONFIRM_PHRASES) {
            return Some((Some(JobStage::Confirmation), "application confirmation phrase"));
        }

        if contains_any(hay, REJECTION_PHRASES)
            && (contains_any(hay, RECRUITING_WORDS) || contains_any(hay, APPLICATION_DOC_WORDS))
        {
            return Some((Some(JobStage::Rejection), "rejection with recruiting context"));
        }

        if contains_any(hay, INTERVIEW_PHRASES)
            && (contains_any(hay, RECRUITING_WORDS) || self.title_guard.is_match(hay))
        {
            return Some((Some(JobStage::Interview), "interview invitation"));
        }

        if contains_any(hay, ATS_MARKERS) && contains_any(hay, RECRUITING_WORDS) {
            return Some((None, "applicant-tracking sender"));
        }

        if self.thanks_then_application.is_match(hay) || self.application_then_thanks.is_match(hay)
        {
            return Some((Some(JobStage::Confirmation), "thanks-for-application phrasing"));
        }

        if self.received_then_application.is_match(hay)
            || self.application_then_received.is_match(hay)
        {
            return Some((Some(JobStage::Confirmation), "application receipt phrasing"));
        }

        if self.interview_word.is_match(hay) && self.invite_word.is_match(hay) {
            return Some((Some(JobStage::Interview), "interview scheduling wording"));
        }

        None
    }
}

impl Default for JobApplicationRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for JobApplicationRule {
    fn name(&self) -> &'static str {
        "job-application"
    }

    fn evaluate(&self, email: &NormalizedEmail) -> Result<Option<RuleMatch>, RuleError> {
        let hay = format!("{}\n{}\n{}", email.subject, email.from, email.body_text).to_lowercase();

        let Some((stage, reason)) = self.signal(&hay) else {
            return Ok(None);
        };

        let mut labels = vec![APPLICATIONS_LABEL.to_string()];
        if let Some(stage) = stage {
            labels.push(format!("{APPLICATIONS_LABEL}/{}", stage.label_suffix()));
        }

        Ok(Some(RuleMatch {
            reason: reason.into(),
            category: Category::JobApplication,
            labels,
            confidence: JOB_CONFIDENCE,
        }))
    }
}

// ── Newsletters ─────────────────────────────────────────────────────

const NEWSLETTER_SENDERS: &[&str] = &["newsletter", "noreply", "no-reply", "mailchimp"];
const NEWSLETTER_SUBJECTS: &[&str] = &["newsletter", "weekly", "digest"];

/// Bulk mail detection. The List-Unsubscribe header is the strongest
/// signal; sender/subject/body wording is weaker.
pub struct NewsletterRule {
    unsubscribe: Regex,
}

impl NewsletterRule {
    pub fn new() -> Self {
        Self {
            unsubscribe: Regex::new(r"(?i)\b(unsubscribe|abbestellen)\b").unwrap(),
        }
    }
}

impl Default for NewsletterRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for NewsletterRule {
    fn name(&self) -> &'static str {
        "newsletter"
    }

    fn evaluate(&self, email: &NormalizedEmail) -> Result<Option<RuleMatch>, RuleError> {
        let newsletter = |reason: &str, confidence: f32| {
            Ok(Some(RuleMatch {
                reason: reason.into(),
                category: Category::Newsletter,
                labels: vec!["Newsletter".into()],
                confidence,
            }))
        };

        if email.headers.contains("List-Unsubscribe") {
            return newsletter("list-unsubscribe header", NEWSLETTER_HEADER_CONFIDENCE);
        }

        let from = email.from.to_lowercase();
        if contains_any(&from, NEWSLETTER_SENDERS) {
            return newsletter("newsletter-style sender", NEWSLETTER_HEURISTIC_CONFIDENCE);
        }

        let subject = email.subject.to_lowercase();
        if contains_any(&subject, NEWSLETTER_SUBJECTS) {
            return newsletter("newsletter-style subject", NEWSLETTER_HEURISTIC_CONFIDENCE);
        }

        if self.unsubscribe.is_match(&email.body_text) {
            return newsletter("unsubscribe wording in body", NEWSLETTER_HEURISTIC_CONFIDENCE);
        }

        Ok(None)
    }
}
