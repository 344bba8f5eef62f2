use serde::{Deserialize, Serialize};
use wayfare_catalog::pricing::divide_rounded;
use wayfare_core::{CoreError, CoreResult};

use crate::models::{RefundPolicy, RefundTier};

/// Days-before-start thresholds mapped to refund percentages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefundSchedule {
    /// Sorted by `min_days`, descending.
    tiers: Vec<RefundTier>,
}

impl RefundSchedule {
    pub fn new(mut tiers: Vec<RefundTier>) -> CoreResult<Self> {
        if let Some(bad) = tiers.iter().find(|t| t.percent > 100 || t.min_days < 0) {
            return Err(CoreError::validation(format!(
                "refund tier {} days / {}% is out of range",
                bad.min_days, bad.percent
            )));
        }
        tiers.sort_by(|a, b| b.min_days.cmp(&a.min_days));
        Ok(Self { tiers })
    }

    /// 100% from 7 days out, 80% from 5, 40% from 3, nothing after.
    pub fn standard() -> Self {
        Self {
            tiers: vec![
                RefundTier { min_days: 7, percent: 100 },
                RefundTier { min_days: 5, percent: 80 },
                RefundTier { min_days: 3, percent: 40 },
            ],
        }
    }

    pub fn from_policy(policy: &RefundPolicy) -> CoreResult<Self> {
        Self::new(policy.tiers.clone())
    }

    pub fn tiers(&self) -> &[RefundTier] {
        &self.tiers
    }

    pub fn percent_for(&self, days_before: i64) -> u8 {
        self.tiers
            .iter()
            .find(|t| days_before >= t.min_days)
            .map(|t| t.percent)
            .unwrap_or(0)
    }

    pub fn refund_cents(&self, total_cents: i64, days_before: i64) -> i64 {
        divide_rounded(total_cents * self.percent_for(days_before) as i64, 100)
    }
}

impl Default for RefundSchedule {
    fn default() -> Self {
        Self::standard()
    }
}
