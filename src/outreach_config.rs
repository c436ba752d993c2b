//! Role-matching and draft settings, loaded from a TOML file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Role list and background for one search category (e.g. `pm`, `consulting`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfig {
    #[serde(default)]
    pub target_roles: Vec<String>,
    #[serde(default)]
    pub background: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutreachConfig {
    pub target_roles: Vec<String>,
    pub excluded_roles: Vec<String>,
    pub min_email_confidence: u8,
    pub sender_name: String,
    pub background_summary: String,
    pub portfolio_url: String,
    pub categories: HashMap<String, CategoryConfig>,
}

impl Default for OutreachConfig {
    fn default() -> Self {
        let pm_roles: Vec<String> = [
            "founder",
            "chief product officer",
            "head of product",
            "group product manager",
            "senior product manager",
            "product manager",
        ]
        .iter()
        .map(|r| r.to_string())
        .collect();

        let mut categories = HashMap::new();
        categories.insert(
            "product_management".to_string(),
            CategoryConfig {
                target_roles: pm_roles.clone(),
                background: None,
            },
        );

        Self {
            target_roles: pm_roles,
            excluded_roles: vec!["recruiter".to_string(), "intern".to_string()],
            min_email_confidence: 80,
            sender_name: String::new(),
            background_summary: String::new(),
            portfolio_url: String::new(),
            categories,
        }
    }
}

impl OutreachConfig {
    /// Loads the file at `path`, or the defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No outreach config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read outreach config: {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse outreach config: {}", path.display()))?;

        tracing::info!(
            "Loaded outreach config from {} ({} categories)",
            path.display(),
            config.categories.len()
        );
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.normalize();
        Ok(config)
    }

    fn normalize(&mut self) {
        fn clean(roles: &mut Vec<String>) {
            roles.iter_mut().for_each(|r| *r = r.trim().to_string());
            roles.retain(|r| !r.is_empty());
        }

        clean(&mut self.target_roles);
        clean(&mut self.excluded_roles);
        self.categories
            .values_mut()
            .for_each(|c| clean(&mut c.target_roles));
        self.min_email_confidence = self.min_email_confidence.min(100);
    }

    /// Target roles for a category, falling back to the top-level list.
    pub fn roles_for(&self, category: &str) -> &[String] {
        self.categories
            .get(category)
            .map(|c| c.target_roles.as_slice())
            .filter(|roles| !roles.is_empty())
            .unwrap_or(&self.target_roles)
    }

    pub fn background_for(&self, category: &str) -> &str {
        self.categories
            .get(category)
            .and_then(|c| c.background.as_deref())
            .unwrap_or(&self.background_summary)
    }
}
