use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BrainError, Result};

/// Per-gift budget in whole Canadian dollars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRange {
    pub min: u32,
    pub max: u32,
}

impl BudgetRange {
    pub fn new(min: u32, max: u32) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Parse free text such as `"$50-$200 per gift"`, `"under $100"` or
    /// `"$1,000 - $2,500"`.
    pub fn parse(text: &str) -> Option<Self> {
        static AMOUNT: OnceLock<Regex> = OnceLock::new();
        let amount = AMOUNT.get_or_init(|| {
            Regex::new(r"(\d[\d,]*(?:\.\d+)?)([kK]\b)?").expect("budget regex is valid")
        });

        let amounts: Vec<u32> = amount
            .captures_iter(text)
            .filter_map(|caps| {
                let digits = caps.get(1)?.as_str().replace(',', "");
                let value: f64 = digits.parse().ok()?;
                let value = if caps.get(2).is_some() {
                    value * 1000.0
                } else {
                    value
                };
                Some(value.round() as u32)
            })
            .collect();

        match amounts.as_slice() {
            [] => None,
            [single] => {
                let lower = text.to_lowercase();
                let is_ceiling = ["under", "up to", "below", "less than", "max", "within"]
                    .iter()
                    .any(|marker| lower.contains(marker));
                if is_ceiling {
                    Some(Self::new(0, *single))
                } else {
                    Some(Self::new(*single, *single))
                }
            }
            [first, second, ..] => Some(Self::new(*first, *second)),
        }
    }
}

impl fmt::Display for BudgetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == 0 {
            write!(f, "up to ${}", self.max)
        } else if self.min == self.max {
            write!(f, "${}", self.min)
        } else {
            write!(f, "${}-${}", self.min, self.max)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftRecipient {
    pub relation: String,
    #[serde(default)]
    pub traits: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShoppingPreferences {
    pub style: String,
    #[serde(default)]
    pub priorities: Vec<String>,
}

impl fmt::Display for ShoppingPreferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.priorities.is_empty() {
            write!(f, "{}", self.style)
        } else {
            write!(f, "{} (cares about: {})", self.style, self.priorities.join(", "))
        }
    }
}

/// A generated shopper, before it has a store id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaProfile {
    pub name: String,
    pub age: u32,
    pub description: String,
    pub shopping_preferences: ShoppingPreferences,
    pub budget_range: BudgetRange,
    pub gift_recipients: Vec<GiftRecipient>,
}

impl PersonaProfile {
    /// Shape loosely structured LLM JSON into a profile.
    ///
    /// Models regularly return numbers as strings, recipients as bare
    /// strings and budgets as prose; all of those are accepted. Anything that
    /// still lacks a name, an age or a budget is malformed.
    pub fn from_llm_json(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| malformed("persona output is not a JSON object"))?;

        let name = object
            .get("name")
            .map(text_of)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| malformed("persona is missing a name"))?;

        let age = object
            .get("age")
            .and_then(age_of)
            .ok_or_else(|| malformed("persona age is missing or not a number"))?;

        let description = object.get("description").map(text_of).unwrap_or_default();

        let shopping_preferences = object
            .get("shopping_preferences")
            .map(preferences_of)
            .unwrap_or_default();

        let budget_range = object
            .get("budget_range")
            .and_then(budget_of)
            .ok_or_else(|| malformed("persona budget_range could not be understood"))?;

        let gift_recipients = object
            .get("gift_recipients")
            .map(recipients_of)
            .unwrap_or_default();

        Ok(Self {
            name,
            age,
            description,
            shopping_preferences,
            budget_range,
            gift_recipients,
        })
    }

    pub fn recipient_summary(&self) -> String {
        self.gift_recipients
            .iter()
            .map(|r| {
                if r.traits.is_empty() {
                    r.relation.clone()
                } else {
                    format!("{} ({})", r.relation, r.traits)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: i64,
    pub profile: PersonaProfile,
    pub created_at: DateTime<Utc>,
}

impl Persona {
    pub fn new(id: i64, profile: PersonaProfile) -> Self {
        Self {
            id,
            profile,
            created_at: Utc::now(),
        }
    }
}

fn malformed(message: &str) -> BrainError {
    BrainError::MalformedOutput(message.to_string())
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn age_of(value: &Value) -> Option<u32> {
    let age = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if (1.0..=120.0).contains(&age) {
        Some(age.round() as u32)
    } else {
        None
    }
}

fn number_of(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_f64().map(|v| v.max(0.0).round() as u32),
        Value::String(s) => BudgetRange::parse(s).map(|b| b.max),
        _ => None,
    }
}

fn budget_of(value: &Value) -> Option<BudgetRange> {
    match value {
        Value::String(s) => BudgetRange::parse(s),
        Value::Object(map) => {
            let min = map.get("min").and_then(number_of);
            let max = map.get("max").and_then(number_of);
            match (min, max) {
                (Some(min), Some(max)) => Some(BudgetRange::new(min, max)),
                (None, Some(max)) => Some(BudgetRange::new(0, max)),
                (Some(min), None) => Some(BudgetRange::new(min, min)),
                (None, None) => None,
            }
        }
        Value::Number(_) => number_of(value).map(|n| BudgetRange::new(n, n)),
        _ => None,
    }
}

fn preferences_of(value: &Value) -> ShoppingPreferences {
    match value {
        Value::Object(map) => ShoppingPreferences {
            style: map.get("style").map(text_of).unwrap_or_default(),
            priorities: map
                .get("priorities")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(text_of).collect())
                .unwrap_or_default(),
        },
        other => ShoppingPreferences {
            style: text_of(other),
            priorities: Vec::new(),
        },
    }
}

fn recipients_of(value: &Value) -> Vec<GiftRecipient> {
    match value {
        Value::Array(items) => items.iter().filter_map(recipient_of).collect(),
        Value::Null => Vec::new(),
        other => recipient_of(other).into_iter().collect(),
    }
}

fn recipient_of(value: &Value) -> Option<GiftRecipient> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(GiftRecipient {
            relation: s.trim().to_string(),
            traits: String::new(),
        }),
        Value::Object(map) => {
            let relation = map.get("relation").map(text_of)?;
            let traits = match map.get("traits") {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(text_of)
                    .collect::<Vec<_>>()
                    .join(", "),
                Some(other) => text_of(other),
                None => String::new(),
            };
            Some(GiftRecipient { relation, traits })
        }
        _ => None,
    }
}
