//! Typed site settings over the `admin_settings` key/value table.
//!
//! Rows are parsed once per load into [`SiteSettings`]. A stored value that
//! no longer parses falls back to the key's default with a warning; writes
//! are validated in full before anything is persisted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::database::DbPool;
use crate::models::admin_setting::AdminSetting;
use crate::utils::error::{AppError, AppResult};
use crate::utils::helpers::now_rfc3339;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSettings {
    pub brand_name: String,
    /// Base URL used when building links sent to users
    pub site_url: String,
    pub support_email: String,
    /// Skip email verification for new registrations
    pub auth_auto_verify: bool,
    pub registration_open: bool,
    /// Display price of the paid plan, decimal string with two places
    pub monthly_price_usd: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            brand_name: "YukiFiles".to_string(),
            site_url: "http://localhost:3000".to_string(),
            support_email: String::new(),
            auth_auto_verify: false,
            registration_open: true,
            monthly_price_usd: "1.00".to_string(),
        }
    }
}

pub const SETTING_KEYS: [&str; 6] = [
    "brand_name",
    "site_url",
    "support_email",
    "auth_auto_verify",
    "registration_open",
    "monthly_price_usd",
];

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_price(value: &str) -> Option<String> {
    let price: f64 = value.trim().parse().ok()?;
    if price.is_finite() && price >= 0.0 {
        Some(format!("{:.2}", price))
    } else {
        None
    }
}

impl SiteSettings {
    /// Apply one raw key/value pair, validating it against the key's type.
    pub fn apply(&mut self, key: &str, value: &str) -> AppResult<()> {
        let invalid = |expected: &str| {
            AppError::Validation(format!(
                "Invalid value for {}: expected {}, got {:?}",
                key, expected, value
            ))
        };

        match key {
            "brand_name" => {
                let name = value.trim();
                if name.is_empty() || name.len() > 64 {
                    return Err(invalid("1 to 64 characters"));
                }
                self.brand_name = name.to_string();
            }
            "site_url" => {
                let url = value.trim().trim_end_matches('/');
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(invalid("an http(s) URL"));
                }
                self.site_url = url.to_string();
            }
            "support_email" => {
                let email = value.trim();
                if !email.is_empty() {
                    crate::utils::validation::validate_email(email)
                        .map_err(|_| invalid("an email address"))?;
                }
                self.support_email = email.to_string();
            }
            "auth_auto_verify" => {
                self.auth_auto_verify = parse_bool(value).ok_or_else(|| invalid("a boolean"))?;
            }
            "registration_open" => {
                self.registration_open = parse_bool(value).ok_or_else(|| invalid("a boolean"))?;
            }
            "monthly_price_usd" => {
                self.monthly_price_usd =
                    parse_price(value).ok_or_else(|| invalid("a non-negative decimal"))?;
            }
            _ => {
                return Err(AppError::Validation(format!(
                    "Unknown setting: {}",
                    key
                )));
            }
        }

        Ok(())
    }

    /// Build settings from stored rows. Unknown keys are ignored and
    /// unparseable values keep their default.
    pub fn from_rows(rows: &[AdminSetting]) -> Self {
        let mut settings = SiteSettings::default();
        for row in rows {
            if let Err(e) = settings.apply(&row.setting_key, &row.setting_value) {
                tracing::warn!(
                    key = %row.setting_key,
                    "Ignoring stored setting: {}",
                    e
                );
            }
        }
        settings
    }

    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("brand_name", self.brand_name.clone()),
            ("site_url", self.site_url.clone()),
            ("support_email", self.support_email.clone()),
            ("auth_auto_verify", self.auth_auto_verify.to_string()),
            ("registration_open", self.registration_open.to_string()),
            ("monthly_price_usd", self.monthly_price_usd.clone()),
        ]
    }
}

/// Stringify a JSON value the way settings are stored: strings verbatim,
/// everything else in its JSON text form.
pub fn setting_value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub async fn load_settings(pool: &DbPool) -> AppResult<SiteSettings> {
    let rows = sqlx::query_as::<_, AdminSetting>(
        "SELECT setting_key, setting_value, updated_at FROM admin_settings",
    )
    .fetch_all(pool.as_ref())
    .await?;

    Ok(SiteSettings::from_rows(&rows))
}

/// Validate every pair against the current settings, then upsert the
/// normalized values in one transaction.
pub async fn update_settings(
    pool: &DbPool,
    updates: &BTreeMap<String, String>,
) -> AppResult<SiteSettings> {
    let mut settings = load_settings(pool).await?;
    for (key, value) in updates {
        settings.apply(key, value)?;
    }

    let now = now_rfc3339();
    let mut tx = pool.begin().await?;
    for (key, value) in settings.to_pairs() {
        if !updates.contains_key(key) {
            continue;
        }
        sqlx::query(
            "INSERT INTO admin_settings (setting_key, setting_value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(setting_key) DO UPDATE SET setting_value = excluded.setting_value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(&value)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    tracing::info!(
        keys = ?updates.keys().collect::<Vec<_>>(),
        "Site settings updated"
    );

    Ok(settings)
}
