// SPDX-License-Identifier: Apache-2.0
//! A minimal 5-field cron expression matcher, used by the `cron` trigger.
//!
//! Fields are `minute hour day-of-month month day-of-week`, each accepting
//! `*`, `*/N`, `A,B,C`, or `A-B`, combined freely (e.g. `*/15,0`). Matching
//! is against a single `DateTime<Utc>`; the caller (the trigger evaluator)
//! is responsible for firing at most once per matching minute.

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::error::TriggerError;

/// A parsed cron expression.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
}

#[derive(Debug, Clone)]
struct Field {
    allowed: Vec<u32>,
}

impl Field {
    fn matches(&self, value: u32) -> bool {
        self.allowed.contains(&value)
    }

    fn parse(spec: &str, max: u32) -> Result<Self, TriggerError> {
        let mut allowed = Vec::new();
        for part in spec.split(',') {
            if part == "*" {
                allowed.extend(0..=max);
                continue;
            }
            if let Some(step_spec) = part.strip_prefix("*/") {
                let step: u32 = step_spec
                    .parse()
                    .map_err(|_| TriggerError::InvalidCron(spec.to_owned()))?;
                if step == 0 {
                    return Err(TriggerError::InvalidCron(spec.to_owned()));
                }
                allowed.extend((0..=max).step_by(step as usize));
                continue;
            }
            if let Some((lo, hi)) = part.split_once('-') {
                let lo: u32 = lo.parse().map_err(|_| TriggerError::InvalidCron(spec.to_owned()))?;
                let hi: u32 = hi.parse().map_err(|_| TriggerError::InvalidCron(spec.to_owned()))?;
                if lo > hi {
                    return Err(TriggerError::InvalidCron(spec.to_owned()));
                }
                allowed.extend(lo..=hi);
                continue;
            }
            let v: u32 = part.parse().map_err(|_| TriggerError::InvalidCron(spec.to_owned()))?;
            allowed.push(v);
        }
        if allowed.is_empty() || allowed.iter().any(|v| *v > max) {
            return Err(TriggerError::InvalidCron(spec.to_owned()));
        }
        Ok(Self { allowed })
    }
}

impl CronSchedule {
    /// Parses a 5-field cron expression.
    ///
    /// # Errors
    /// Returns [`TriggerError::InvalidCron`] if the expression does not
    /// have exactly five space-separated fields, or any field's values
    /// fall outside its valid range.
    pub fn parse(expr: &str) -> Result<Self, TriggerError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields.as_slice() else {
            return Err(TriggerError::InvalidCron(expr.to_owned()));
        };
        Ok(Self {
            minute: Field::parse(minute, 59)?,
            hour: Field::parse(hour, 23)?,
            day_of_month: Field::parse(dom, 31)?,
            month: Field::parse(month, 12)?,
            day_of_week: Field::parse(dow, 6)?,
        })
    }

    /// Returns whether `instant` falls within a matching minute.
    ///
    /// Day-of-month and day-of-week are OR'd together when both are
    /// restricted (standard cron semantics); either field left as `*`
    /// contributes no constraint.
    #[must_use]
    pub fn matches(&self, instant: DateTime<Utc>) -> bool {
        let dom_is_wild = self.day_of_month.allowed.len() == 32;
        let dow_is_wild = self.day_of_week.allowed.len() == 7;
        let day_ok = if dom_is_wild || dow_is_wild {
            self.day_of_month.matches(instant.day())
                && self.day_of_week.matches(instant.weekday().num_days_from_sunday())
        } else {
            self.day_of_month.matches(instant.day())
                || self.day_of_week.matches(instant.weekday().num_days_from_sunday())
        };
        self.minute.matches(instant.minute())
            && self.hour.matches(instant.hour())
            && self.month.matches(instant.month())
            && day_ok
    }
}
