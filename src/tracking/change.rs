//! Pure comparison of two resolved checks, used to bracket the renewal
//! transition during the year and month search phases.

use crate::check::CheckJob;

/// Whether coverage "changed" between two resolved checks: coverage
/// presence flips, or insurer/brand/model differs. Absent and empty are the
/// same thing, and both are distinct from any non-empty value. Symmetric by
/// construction.
pub fn differs(a: &CheckJob, b: &CheckJob) -> bool {
    a.coverage() != b.coverage()
        || field(&a.company) != field(&b.company)
        || field(&a.vehicle_brand) != field(&b.vehicle_brand)
        || field(&a.vehicle_model) != field(&b.vehicle_model)
}

fn field(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}
