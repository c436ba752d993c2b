//! Plain-text outreach drafts for ranked contacts.

use crate::models::{Contact, RankedContact};
use crate::outreach_config::OutreachConfig;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailDraft {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Everything a draft needs besides the contact.
#[derive(Debug, Clone, Default)]
pub struct DraftSettings {
    pub sender_name: String,
    pub background_summary: String,
    pub portfolio_url: String,
    pub resume_url: Option<String>,
    pub custom_subject: Option<String>,
}

impl DraftSettings {
    pub fn from_config(config: &OutreachConfig, category: &str) -> Self {
        let background_summary = config.background_for(category).trim().to_string();
        let sender_name = match config.sender_name.trim() {
            "" => background_summary
                .split(',')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string(),
            name => name.to_string(),
        };

        Self {
            sender_name,
            background_summary,
            portfolio_url: config.portfolio_url.trim().to_string(),
            resume_url: None,
            custom_subject: None,
        }
    }
}

pub fn build_subject(contact: &Contact, custom: Option<&str>) -> String {
    match custom.map(str::trim).filter(|s| !s.is_empty()) {
        Some(subject) => subject.to_string(),
        None => format!("Exploring product opportunities at {}", contact.company),
    }
}

pub fn build_body(contact: &Contact, settings: &DraftSettings) -> String {
    let greeting = match contact.first_name.trim() {
        "" => "there",
        name => name,
    };

    let intro = [&settings.background_summary, &settings.sender_name]
        .into_iter()
        .find(|s| !s.is_empty())
        .map(|s| format!("I'm {}.", s))
        .unwrap_or_default();

    let mut links = Vec::new();
    if !settings.portfolio_url.is_empty() {
        links.push(format!("Portfolio: {}", settings.portfolio_url));
    }
    if let Some(resume) = settings.resume_url.as_deref().filter(|r| !r.trim().is_empty()) {
        links.push(format!("Resume: {}", resume.trim()));
    }

    let body = format!(
        "Hi {greeting},\n\n\
         {intro}\n\n\
         I've been following {company}'s work and I'm exploring product roles where I can \
         contribute to meaningful product decisions.\n\n\
         Would you be open to sharing how the product team at {company} works? \
         I'd value your perspective.\n\n\
         {links}\n\n\
         Best regards,\n\
         {sender}",
        greeting = greeting,
        intro = intro,
        company = contact.company,
        links = links.join("\n"),
        sender = settings.sender_name,
    );

    clean_multiline(&body)
}

pub fn generate_drafts(ranked: &[RankedContact], settings: &DraftSettings) -> Vec<EmailDraft> {
    ranked
        .iter()
        .map(|r| EmailDraft {
            to: r.contact.email.clone(),
            subject: build_subject(&r.contact, settings.custom_subject.as_deref()),
            body: build_body(&r.contact, settings),
        })
        .collect()
}

/// Short human-readable report of a search.
pub fn format_summary(total: usize, filtered: usize, ranked: &[RankedContact], limit: usize) -> String {
    let mut lines = vec![
        format!("Total leads found: {}", total),
        format!("Leads after filtering: {}", filtered),
        "Top prioritized contacts:".to_string(),
    ];
    lines.extend(ranked.iter().take(limit).map(|r| {
        format!(
            "- {} | {} | {} | {}",
            r.contact.full_name(),
            r.contact.role,
            r.contact.email,
            r.contact.confidence
        )
    }));
    lines.join("\n")
}

/// Trims trailing whitespace on every line and collapses runs of blank lines.
fn clean_multiline(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim_end) {
        if line.is_empty() && out.last().map_or(true, |prev| prev.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}
