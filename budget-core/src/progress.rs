//! Progress ledger rules for level-5 items.
//!
//! The summary is always recomputed from the complete entry set so totals
//! cannot drift from the entries they describe.

use rust_decimal::Decimal;

use crate::error::{LedgerError, Result};
use crate::types::{EstimateNode, NewProgressEntry, ProgressEntry, ProgressKind, ProgressSummary};

/// Upper bound of every cumulative percentage.
pub const FULL_PROGRESS: Decimal = Decimal::ONE_HUNDRED;

/// Sum an item's entries into a summary.
///
/// Fails with `Validation` when a stored total no longer fits in a `Decimal`.
pub fn summarize(item_id: &str, entries: &[ProgressEntry]) -> Result<ProgressSummary> {
    let mut total_physical = Decimal::ZERO;
    let mut total_financial = Decimal::ZERO;
    let mut total_amount = Decimal::ZERO;
    let mut count = 0;

    for entry in entries.iter().filter(|e| e.activity_item_id == item_id) {
        total_physical = checked_sum(
            total_physical,
            entry.physical_progress_percentage,
            "physical progress total",
        )?;
        total_financial = checked_sum(
            total_financial,
            entry.financial_progress_percentage,
            "financial progress total",
        )?;
        total_amount = checked_sum(
            total_amount,
            entry.financial_progress_amount,
            "financial spend total",
        )?;
        count += 1;
    }

    Ok(ProgressSummary {
        activity_item_id: item_id.to_string(),
        total_physical_progress: total_physical,
        total_financial_progress: total_financial,
        total_financial_amount: total_amount,
        entry_count: count,
        completed: total_physical >= FULL_PROGRESS,
        financially_complete: total_financial >= FULL_PROGRESS,
    })
}

fn checked_sum(total: Decimal, value: Decimal, what: &str) -> Result<Decimal> {
    total
        .checked_add(value)
        .ok_or_else(|| LedgerError::out_of_range(what))
}

fn validate_percentage(kind: ProgressKind, value: Decimal) -> Result<()> {
    if value <= Decimal::ZERO || value > FULL_PROGRESS {
        return Err(LedgerError::Validation(format!(
            "{} progress percentage must be in (0, 100], got {}",
            kind, value
        )));
    }
    Ok(())
}

/// Validate entry input on its own, before looking at the ledger.
pub fn validate_entry(input: &NewProgressEntry) -> Result<()> {
    let (from, to) = match (input.from_date, input.to_date) {
        (Some(from), Some(to)) => (from, to),
        (None, _) => return Err(LedgerError::Validation("from date is required".to_string())),
        (_, None) => return Err(LedgerError::Validation("to date is required".to_string())),
    };
    if from > to {
        return Err(LedgerError::Validation(format!(
            "from date {} is after to date {}",
            from, to
        )));
    }

    validate_percentage(ProgressKind::Physical, input.physical_progress_percentage)?;
    validate_percentage(ProgressKind::Financial, input.financial_progress_percentage)?;

    if input.financial_progress_amount < Decimal::ZERO {
        return Err(LedgerError::Validation(format!(
            "financial progress amount cannot be negative, got {}",
            input.financial_progress_amount
        )));
    }

    Ok(())
}

/// Check an entry against the item's current summary.
///
/// A completed item reports `Locked` before any ceiling check.
pub fn check_entry(summary: &ProgressSummary, input: &NewProgressEntry) -> Result<()> {
    if summary.completed {
        return Err(LedgerError::Locked {
            item_id: summary.activity_item_id.clone(),
        });
    }

    if exceeds_full(summary.total_physical_progress, input.physical_progress_percentage) {
        return Err(LedgerError::ProgressExceeded {
            kind: ProgressKind::Physical,
            current: summary.total_physical_progress,
            requested: input.physical_progress_percentage,
        });
    }

    if exceeds_full(summary.total_financial_progress, input.financial_progress_percentage) {
        return Err(LedgerError::ProgressExceeded {
            kind: ProgressKind::Financial,
            current: summary.total_financial_progress,
            requested: input.financial_progress_percentage,
        });
    }

    checked_sum(
        summary.total_financial_amount,
        input.financial_progress_amount,
        "financial spend total",
    )?;

    Ok(())
}

fn exceeds_full(total: Decimal, requested: Decimal) -> bool {
    total
        .checked_add(requested)
        .map_or(true, |sum| sum > FULL_PROGRESS)
}

/// Build the stored entry from validated input.
pub fn build_entry(item_id: &str, input: NewProgressEntry) -> Result<ProgressEntry> {
    validate_entry(&input)?;
    let (from_date, to_date) = match (input.from_date, input.to_date) {
        (Some(from), Some(to)) => (from, to),
        _ => return Err(LedgerError::Validation("entry dates are required".to_string())),
    };

    Ok(ProgressEntry {
        id: uuid::Uuid::new_v4().to_string(),
        activity_item_id: item_id.to_string(),
        from_date,
        to_date,
        physical_progress_description: input.physical_progress_description,
        physical_progress_percentage: input.physical_progress_percentage,
        financial_progress_amount: input.financial_progress_amount,
        financial_progress_percentage: input.financial_progress_percentage,
        recorded_at: chrono::Utc::now(),
    })
}

/// Share of the item's estimate already spent, as a percentage.
pub fn budget_utilization(item: &EstimateNode, entries: &[ProgressEntry]) -> Result<Decimal> {
    if item.estimated_amount.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let mut spent = Decimal::ZERO;
    for entry in entries.iter().filter(|e| e.activity_item_id == item.id) {
        spent = checked_sum(spent, entry.financial_progress_amount, "financial spend total")?;
    }
    percent_of(spent, item.estimated_amount)
        .ok_or_else(|| LedgerError::out_of_range("budget utilization"))
}

/// `part / whole * 100`, `None` on overflow or a zero `whole`.
pub fn percent_of(part: Decimal, whole: Decimal) -> Option<Decimal> {
    part.checked_div(whole)?.checked_mul(Decimal::ONE_HUNDRED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EstimateLevel, NewNode};
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn input(physical: &str, financial: &str, amount: &str) -> NewProgressEntry {
        NewProgressEntry::new(day(1), day(10), dec(physical), dec(financial), dec(amount))
    }

    fn entries(item_id: &str, parts: &[(&str, &str, &str)]) -> Vec<ProgressEntry> {
        parts
            .iter()
            .map(|(p, f, a)| build_entry(item_id, input(p, f, a)).unwrap())
            .collect()
    }

    #[test]
    fn test_summary_totals() {
        let ledger = entries("item-1", &[("30", "20", "200"), ("25.5", "10", "150.25")]);
        let summary = summarize("item-1", &ledger).unwrap();

        assert_eq!(summary.total_physical_progress, dec("55.5"));
        assert_eq!(summary.total_financial_progress, dec("30"));
        assert_eq!(summary.total_financial_amount, dec("350.25"));
        assert_eq!(summary.entry_count, 2);
        assert!(!summary.completed);
    }

    #[test]
    fn test_empty_summary_is_open() {
        let summary = summarize("item-1", &[]).unwrap();
        assert_eq!(summary.total_physical_progress, Decimal::ZERO);
        assert!(!summary.completed);
    }

    #[test]
    fn test_validation_failures() {
        let mut missing = input("10", "10", "0");
        missing.from_date = None;
        assert!(matches!(validate_entry(&missing), Err(LedgerError::Validation(_))));

        let mut reversed = input("10", "10", "0");
        reversed.from_date = Some(day(11));
        assert!(matches!(validate_entry(&reversed), Err(LedgerError::Validation(_))));

        assert!(validate_entry(&input("0", "10", "0")).is_err());
        assert!(validate_entry(&input("100.01", "10", "0")).is_err());
        assert!(validate_entry(&input("10", "0", "0")).is_err());
        assert!(validate_entry(&input("10", "10", "-1")).is_err());
        assert!(validate_entry(&input("100", "100", "0")).is_ok());
    }

    #[test]
    fn test_physical_ceiling() {
        let ledger = entries("item-1", &[("60", "10", "0")]);
        let summary = summarize("item-1", &ledger).unwrap();

        assert!(check_entry(&summary, &input("40", "10", "0")).is_ok());
        assert_eq!(
            check_entry(&summary, &input("40.5", "10", "0")),
            Err(LedgerError::ProgressExceeded {
                kind: ProgressKind::Physical,
                current: dec("60"),
                requested: dec("40.5"),
            })
        );
    }

    #[test]
    fn test_financial_ceiling() {
        let ledger = entries("item-1", &[("10", "95", "0")]);
        let summary = summarize("item-1", &ledger).unwrap();

        assert!(matches!(
            check_entry(&summary, &input("10", "6", "0")),
            Err(LedgerError::ProgressExceeded { kind: ProgressKind::Financial, .. })
        ));
    }

    #[test]
    fn test_completed_item_is_locked() {
        let ledger = entries("item-1", &[("70", "10", "0"), ("30", "10", "0")]);
        let summary = summarize("item-1", &ledger).unwrap();
        assert!(summary.completed);

        assert_eq!(
            check_entry(&summary, &input("1", "1", "0")),
            Err(LedgerError::Locked {
                item_id: "item-1".to_string()
            })
        );
    }

    #[test]
    fn test_financial_completion_does_not_lock() {
        let ledger = entries("item-1", &[("50", "100", "0")]);
        let summary = summarize("item-1", &ledger).unwrap();
        assert!(summary.financially_complete);
        assert!(!summary.completed);

        assert!(matches!(
            check_entry(&summary, &input("10", "1", "0")),
            Err(LedgerError::ProgressExceeded { kind: ProgressKind::Financial, .. })
        ));
    }

    #[test]
    fn test_budget_utilization() {
        let item = EstimateNode::from_new(NewNode::child(
            EstimateLevel::Item,
            "parent",
            "I",
            "Item",
            dec("2000"),
        ));
        let ledger = entries(&item.id, &[("10", "10", "250"), ("10", "10", "250")]);
        assert_eq!(budget_utilization(&item, &ledger).unwrap(), dec("25"));

        let mut free = item.clone();
        free.estimated_amount = Decimal::ZERO;
        assert_eq!(budget_utilization(&free, &ledger).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_oversized_totals_are_rejected() {
        let mut ledger = entries("item-1", &[("10", "10", "0"), ("10", "10", "0")]);
        for entry in ledger.iter_mut() {
            entry.financial_progress_amount = Decimal::MAX;
        }
        assert!(matches!(
            summarize("item-1", &ledger),
            Err(LedgerError::Validation(_))
        ));

        let loaded = summarize("item-1", &ledger[..1]).unwrap();
        let empty = summarize("item-1", &[]).unwrap();
        let mut spend = input("10", "10", "0");
        spend.financial_progress_amount = Decimal::MAX;

        assert!(check_entry(&empty, &spend).is_ok());
        assert!(matches!(check_entry(&loaded, &spend), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_utilization_overflow_is_rejected() {
        let item = EstimateNode::from_new(NewNode::child(
            EstimateLevel::Item,
            "parent",
            "I",
            "Item",
            dec("0.01"),
        ));
        let ledger = entries(&item.id, &[("10", "10", "1000000000000000000000000000")]);
        assert!(matches!(
            budget_utilization(&item, &ledger),
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(percent_of(dec("1"), dec("4")), Some(dec("25")));
        assert_eq!(percent_of(dec("1"), Decimal::ZERO), None);
    }
}
