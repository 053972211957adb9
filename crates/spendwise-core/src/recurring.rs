//! Recurring payment detection
//!
//! Groups a user's transactions by merchant key and infers, per group:
//! - frequency, from the median interval between charges matched against
//!   configurable day bands
//! - confidence, from how tightly the intervals cluster around that median
//! - typical amount (median magnitude) and whether the amount is stable
//! - the next expected charge date
//!
//! Amount variation never overrides the timing classification; it only sets
//! `amount_variance`.
//!
//! `detect_groups` is a pure function. `RecurringDetector` wraps it with the
//! per-user snapshot so dashboards don't rescan history on every load.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::merchant;
use crate::models::{
    AmountVariance, Confidence, Frequency, RecurringGroup, Transaction, UpcomingPayment,
};

/// Longest merchant display name
const MAX_MERCHANT_NAME: usize = 50;
/// Sample descriptions kept per group
const MAX_SAMPLES: usize = 3;
/// Interval spread (relative to the median) still rated high confidence
const HIGH_CONFIDENCE_SPREAD: f64 = 0.10;
/// Interval spread still rated medium confidence
const MEDIUM_CONFIDENCE_SPREAD: f64 = 0.25;

/// Largest look-ahead accepted for upcoming payments
pub const MAX_UPCOMING_DAYS: i64 = 30;
/// Look-ahead used when none is given
pub const DEFAULT_UPCOMING_DAYS: i64 = 7;

/// A median interval within `tolerance_days` of `center_days` classifies as
/// `frequency`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub frequency: Frequency,
    pub center_days: f64,
    pub tolerance_days: f64,
}

impl FrequencyBand {
    pub const fn new(frequency: Frequency, center_days: f64, tolerance_days: f64) -> Self {
        Self {
            frequency,
            center_days,
            tolerance_days,
        }
    }

    fn contains(&self, interval: f64) -> bool {
        (interval - self.center_days).abs() <= self.tolerance_days
    }
}

/// Detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Groups with fewer members are not reported
    pub min_occurrences: usize,
    /// Checked in order; the first band containing the median wins
    pub bands: Vec<FrequencyBand>,
    /// `(max - min) / median` below this counts as a stable amount
    pub stable_amount_spread: f64,
    /// Only consider negative amounts
    pub expenses_only: bool,
    /// Ignore transactions older than this many days
    pub lookback_days: Option<u64>,
    /// Categories never considered recurring charges
    pub excluded_categories: Vec<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 3,
            bands: vec![
                FrequencyBand::new(Frequency::Weekly, 7.0, 2.0),
                FrequencyBand::new(Frequency::Monthly, 30.0, 5.0),
                FrequencyBand::new(Frequency::Quarterly, 90.0, 10.0),
            ],
            stable_amount_spread: 0.05,
            expenses_only: true,
            lookback_days: None,
            excluded_categories: vec!["Income".to_string()],
        }
    }
}

impl DetectionConfig {
    /// Default bands plus biweekly (14±3) and yearly (365±15)
    pub fn extended() -> Self {
        let mut config = Self::default();
        config.bands = vec![
            FrequencyBand::new(Frequency::Weekly, 7.0, 2.0),
            FrequencyBand::new(Frequency::Biweekly, 14.0, 3.0),
            FrequencyBand::new(Frequency::Monthly, 30.0, 5.0),
            FrequencyBand::new(Frequency::Quarterly, 90.0, 10.0),
            FrequencyBand::new(Frequency::Yearly, 365.0, 15.0),
        ];
        config
    }

    /// Same configuration with a different occurrence threshold
    pub fn with_min_occurrences(mut self, min_occurrences: usize) -> Self {
        self.min_occurrences = min_occurrences;
        self
    }

    /// Stable fingerprint of every setting that affects detection
    pub fn fingerprint(&self) -> String {
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&encoded))
    }

    /// Classify a median interval (in days)
    pub fn classify(&self, median_interval: f64) -> Frequency {
        self.bands
            .iter()
            .find(|b| b.contains(median_interval))
            .map(|b| b.frequency)
            .unwrap_or(Frequency::Irregular)
    }

    fn includes(&self, tx: &Transaction) -> bool {
        if self.expenses_only && tx.amount >= 0.0 {
            return false;
        }
        !self
            .excluded_categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&tx.category))
    }
}

/// Detect recurring groups in a transaction set
///
/// Deterministic: the same input always yields the same groups, ordered by
/// monthly cost (largest first), then merchant key.
pub fn detect_groups(transactions: &[Transaction], config: &DetectionConfig) -> Vec<RecurringGroup> {
    let mut by_merchant: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
    for tx in transactions.iter().filter(|t| config.includes(t)) {
        by_merchant.entry(tx.merchant_key.as_str()).or_default().push(tx);
    }

    let mut groups: Vec<RecurringGroup> = by_merchant
        .into_iter()
        .filter(|(_, members)| members.len() >= config.min_occurrences.max(1))
        .map(|(key, mut members)| {
            members.sort_by_key(|t| (t.date, t.id));
            build_group(key, &members, config)
        })
        .collect();

    groups.sort_by(|a, b| {
        b.monthly_amount
            .total_cmp(&a.monthly_amount)
            .then_with(|| a.merchant_key.cmp(&b.merchant_key))
    });
    groups
}

fn build_group(merchant_key: &str, members: &[&Transaction], config: &DetectionConfig) -> RecurringGroup {
    // Same-day repeats say nothing about the period
    let intervals: Vec<f64> = members
        .windows(2)
        .map(|w| (w[1].date - w[0].date).num_days() as f64)
        .filter(|d| *d > 0.0)
        .collect();

    let median_interval = median(&intervals);
    let frequency = match median_interval {
        Some(m) if intervals.len() >= 2 => config.classify(m),
        _ => Frequency::Unknown,
    };
    let confidence = interval_confidence(&intervals, median_interval, frequency);

    let amounts: Vec<f64> = members.iter().map(|t| t.amount.abs()).collect();
    let typical_amount = round_cents(median(&amounts).unwrap_or(0.0));
    let amount_variance = amount_variance(&amounts, config.stable_amount_spread);

    let first = members[0];
    let last = members[members.len() - 1];

    RecurringGroup {
        merchant_key: merchant_key.to_string(),
        merchant_name: merchant::display_name(
            &most_frequent(members.iter().map(|t| t.description_raw.as_str())),
            MAX_MERCHANT_NAME,
        ),
        category: most_frequent(members.iter().map(|t| t.category.as_str())),
        frequency,
        typical_amount,
        monthly_amount: round_cents(typical_amount * frequency.monthly_multiplier()),
        amount_variance,
        confidence,
        transaction_count: members.len(),
        interval_days: median_interval,
        first_transaction_date: first.date,
        last_transaction_date: last.date,
        next_expected_date: frequency.advance(last.date),
        transaction_ids: members.iter().map(|t| t.id).collect(),
        sample_descriptions: sample_descriptions(members),
    }
}

fn interval_confidence(intervals: &[f64], median: Option<f64>, frequency: Frequency) -> Confidence {
    let Some(median) = median.filter(|m| *m > 0.0) else {
        return Confidence::Low;
    };
    if !frequency.is_periodic() {
        return Confidence::Low;
    }

    let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
    let variance =
        intervals.iter().map(|i| (i - mean).powi(2)).sum::<f64>() / intervals.len() as f64;
    let spread = variance.sqrt() / median;

    if spread <= HIGH_CONFIDENCE_SPREAD {
        Confidence::High
    } else if spread <= MEDIUM_CONFIDENCE_SPREAD {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

fn amount_variance(amounts: &[f64], stable_spread: f64) -> AmountVariance {
    let min = amounts.iter().copied().fold(f64::INFINITY, f64::min);
    let max = amounts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    match median(amounts) {
        Some(m) if m > 0.0 && (max - min) / m < stable_spread => AmountVariance::Stable,
        Some(_) if max == min => AmountVariance::Stable,
        _ => AmountVariance::Variable,
    }
}

/// Most common value; ties go to the one seen last
fn most_frequent<'t>(values: impl Iterator<Item = &'t str>) -> String {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (i, v) in values.enumerate() {
        let entry = counts.entry(v).or_insert((0, i));
        entry.0 += 1;
        entry.1 = i;
    }
    counts
        .into_iter()
        .max_by_key(|(_, (count, last_seen))| (*count, *last_seen))
        .map(|(v, _)| v.to_string())
        .unwrap_or_default()
}

/// Distinct descriptions, most recent first
fn sample_descriptions(members: &[&Transaction]) -> Vec<String> {
    let mut samples: Vec<String> = Vec::new();
    for tx in members.iter().rev() {
        if samples.len() == MAX_SAMPLES {
            break;
        }
        if !samples.contains(&tx.description_raw) {
            samples.push(tx.description_raw.clone());
        }
    }
    samples
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Monthly and yearly cost of the periodic groups
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RecurringTotals {
    pub total_monthly: f64,
    pub total_yearly: f64,
}

/// Sum each periodic group's monthly-equivalent cost
pub fn monthly_totals(groups: &[RecurringGroup]) -> RecurringTotals {
    let monthly: f64 = groups
        .iter()
        .filter(|g| g.frequency.is_periodic())
        .map(|g| g.typical_amount * g.frequency.monthly_multiplier())
        .sum();
    let total_monthly = round_cents(monthly);
    RecurringTotals {
        total_monthly,
        total_yearly: round_cents(total_monthly * 12.0),
    }
}

/// Groups whose next charge falls within `[today, today + days]`, soonest first
pub fn upcoming_payments(groups: &[RecurringGroup], today: NaiveDate, days: u64) -> Vec<UpcomingPayment> {
    let horizon = today.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX);

    let mut upcoming: Vec<UpcomingPayment> = groups
        .iter()
        .filter_map(|g| {
            let expected = g.next_expected_date?;
            if expected < today || expected > horizon {
                return None;
            }
            Some(UpcomingPayment {
                merchant_key: g.merchant_key.clone(),
                merchant_name: g.merchant_name.clone(),
                category: g.category.clone(),
                frequency: g.frequency,
                amount: g.typical_amount,
                expected_date: expected,
                days_until: (expected - today).num_days(),
            })
        })
        .collect();

    upcoming.sort_by(|a, b| {
        a.expected_date
            .cmp(&b.expected_date)
            .then_with(|| a.merchant_key.cmp(&b.merchant_key))
    });
    upcoming
}

/// Detection output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringDetection {
    pub recurring: Vec<RecurringGroup>,
    pub total_count: usize,
    pub computed_at: DateTime<Utc>,
    /// Whether this came from a stored snapshot
    pub from_snapshot: bool,
}

/// Recurring payments (periodic groups only) with their cost
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringSummary {
    pub recurring_payments: Vec<RecurringGroup>,
    pub total_count: usize,
    pub total_monthly: f64,
    pub total_yearly: f64,
}

/// Snapshot-backed detection for one database
pub struct RecurringDetector<'a> {
    db: &'a Database,
    config: DetectionConfig,
}

impl<'a> RecurringDetector<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            config: DetectionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DetectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Detect recurring groups for a user
    ///
    /// Without `force_refresh`, a stored snapshot computed with an identical
    /// config is returned as is. A result computed while the user's
    /// transactions changed is returned but not stored.
    pub fn detect(&self, user_id: i64, force_refresh: bool) -> Result<RecurringDetection> {
        if self.config.min_occurrences < 2 {
            return Err(Error::Validation(
                "min_occurrences must be at least 2".to_string(),
            ));
        }

        let config_key = self.config.fingerprint();

        if !force_refresh {
            if let Some(snapshot) = self.db.load_recurring_snapshot(user_id)? {
                if snapshot.config_key == config_key {
                    debug!(user_id, groups = snapshot.groups.len(), "Serving recurring snapshot");
                    return Ok(RecurringDetection {
                        total_count: snapshot.groups.len(),
                        recurring: snapshot.groups,
                        computed_at: snapshot.computed_at,
                        from_snapshot: true,
                    });
                }
            }
        }

        let generation = self.db.recurring_generation(user_id)?;
        let mut transactions = self.db.list_user_transactions(user_id)?;
        if let Some(days) = self.config.lookback_days {
            let today = Utc::now().date_naive();
            if let Some(cutoff) = today.checked_sub_days(Days::new(days)) {
                transactions.retain(|t| t.date >= cutoff);
            }
        }

        let groups = detect_groups(&transactions, &self.config);
        let stored = self
            .db
            .save_recurring_snapshot(user_id, generation, &config_key, &groups)?;
        if !stored {
            debug!(user_id, "Transactions changed during detection, snapshot not stored");
        }

        info!(
            user_id,
            scanned = transactions.len(),
            groups = groups.len(),
            "Recurring detection complete"
        );

        Ok(RecurringDetection {
            total_count: groups.len(),
            recurring: groups,
            computed_at: Utc::now(),
            from_snapshot: false,
        })
    }

    /// Periodic groups with monthly and yearly totals
    pub fn recurring_payments(&self, user_id: i64, force_refresh: bool) -> Result<RecurringSummary> {
        let detection = self.detect(user_id, force_refresh)?;
        let recurring_payments: Vec<RecurringGroup> = detection
            .recurring
            .into_iter()
            .filter(|g| g.frequency.is_periodic())
            .collect();
        let totals = monthly_totals(&recurring_payments);

        Ok(RecurringSummary {
            total_count: recurring_payments.len(),
            recurring_payments,
            total_monthly: totals.total_monthly,
            total_yearly: totals.total_yearly,
        })
    }

    /// Charges expected within `days` (1..=30) of `today`
    pub fn upcoming(&self, user_id: i64, days: i64, today: NaiveDate) -> Result<Vec<UpcomingPayment>> {
        if !(1..=MAX_UPCOMING_DAYS).contains(&days) {
            return Err(Error::Validation(format!(
                "days must be between 1 and {}",
                MAX_UPCOMING_DAYS
            )));
        }
        let detection = self.detect(user_id, false)?;
        Ok(upcoming_payments(&detection.recurring, today, days as u64))
    }
}
