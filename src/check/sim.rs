use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::check::{CheckOutcome, InsuranceCheck, ResolvedCheck};

const COMPANIES: &[&str] = &[
    "Pasha Sigorta",
    "AtaSigorta",
    "Meqa Sigorta",
    "Qala Sigorta",
    "AzSigorta",
];

const BRANDS: &[(&str, &str)] = &[
    ("BMW", "520"),
    ("Mercedes", "E200"),
    ("Toyota", "Camry"),
    ("Hyundai", "Santa Fe"),
    ("Nissan", "Altima"),
];

/// Deterministic stand-in for the registry, for local runs and end-to-end
/// tests without the real lookup. Each plate gets a fixed renewal
/// anniversary derived from its hash, and the insurer rotates every policy
/// year, so point-in-time answers flip exactly at the anniversary and the
/// search has a real boundary to find.
pub struct SimulatedRegistry;

impl SimulatedRegistry {
    pub fn new() -> Self {
        Self
    }

    fn seed(plate: &str) -> u64 {
        // FNV-1a
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for b in plate.as_bytes() {
            h ^= u64::from(*b);
            h = h.wrapping_mul(0x0000_0100_0000_01b3);
        }
        h
    }

    /// Renewal anniversary for a plate (month 1-12, day 1-28).
    pub fn anniversary(plate: &str) -> (u32, u32) {
        let seed = Self::seed(plate);
        let month = 1 + (seed % 12) as u32;
        let day = 1 + ((seed / 12) % 28) as u32;
        (month, day)
    }

    fn uninsured(seed: u64) -> bool {
        seed % 7 == 0
    }
}

impl Default for SimulatedRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InsuranceCheck for SimulatedRegistry {
    async fn check(
        &self,
        plate: &str,
        target_date: DateTime<Utc>,
    ) -> anyhow::Result<CheckOutcome> {
        let seed = Self::seed(plate);

        if Self::uninsured(seed) {
            return Ok(CheckOutcome::Resolved(ResolvedCheck::not_found(format!(
                "no insurer record for {plate}"
            ))));
        }

        let (month, day) = Self::anniversary(plate);
        let target = target_date.date_naive();
        let anniversary_this_year = NaiveDate::from_ymd_opt(target.year(), month, day)
            .unwrap_or(target);

        // Policy year = year of the most recent anniversary on or before the
        // target date; the insurer rotates with it.
        let policy_year = if target >= anniversary_this_year {
            target.year()
        } else {
            target.year() - 1
        };

        let company = COMPANIES[((seed as i64 + i64::from(policy_year)).unsigned_abs() as usize)
            % COMPANIES.len()];
        let (brand, model) = BRANDS[(seed / 31) as usize % BRANDS.len()];

        let raw_text = format!(
            "plate={plate} date={} company={company} vehicle={brand} {model} status=active",
            target.format("%Y-%m-%d"),
        );

        Ok(CheckOutcome::Resolved(ResolvedCheck {
            has_coverage: true,
            company: Some(company.to_string()),
            vehicle_brand: Some(brand.to_string()),
            vehicle_model: Some(model.to_string()),
            raw_text,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn company_flips_exactly_at_anniversary() {
        let sim = SimulatedRegistry::new();
        let plate = ["10RL035", "10RL033", "90HB986", "90AA123"]
            .into_iter()
            .find(|p| !SimulatedRegistry::uninsured(SimulatedRegistry::seed(p)))
            .expect("at least one simulated plate is insured");
        let (month, day) = SimulatedRegistry::anniversary(plate);

        let at = NaiveDate::from_ymd_opt(2025, month, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc();
        let before = at - chrono::Duration::days(2);

        let a = sim.check(plate, before).await.unwrap();
        let b = sim.check(plate, at).await.unwrap();
        let (CheckOutcome::Resolved(a), CheckOutcome::Resolved(b)) = (a, b) else {
            panic!("simulation never rate-limits");
        };
        assert_ne!(a.company, b.company);
    }

    #[tokio::test]
    async fn answers_are_deterministic() {
        let sim = SimulatedRegistry::new();
        let when = Utc::now();
        let first = sim.check("90HB986", when).await.unwrap();
        let second = sim.check("90HB986", when).await.unwrap();
        let (CheckOutcome::Resolved(first), CheckOutcome::Resolved(second)) = (first, second)
        else {
            panic!("simulation never rate-limits");
        };
        assert_eq!(first.company, second.company);
        assert_eq!(first.raw_text, second.raw_text);
    }
}
