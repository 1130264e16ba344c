//! Allocation calculator.
//!
//! Pure functions over a freshly fetched child set. Callers are expected to
//! read the current children immediately before calling these, never a
//! cached copy.

use rust_decimal::Decimal;

use crate::error::{LedgerError, Result};
use crate::types::{EstimateNode, NewNode};

/// Sum of the children's estimated amounts.
pub fn used_amount(children: &[EstimateNode]) -> Decimal {
    children.iter().map(|c| c.estimated_amount).sum()
}

/// What the parent has left to allocate, never negative.
///
/// A missing parent has nothing left; this is a soft condition, not an error.
pub fn remaining_amount(parent: Option<&EstimateNode>, children: &[EstimateNode]) -> Decimal {
    match parent {
        Some(parent) => (parent.estimated_amount - used_amount(children)).max(Decimal::ZERO),
        None => Decimal::ZERO,
    }
}

/// Estimated amounts must be strictly positive.
pub fn validate_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::Validation(format!(
            "estimated amount must be greater than zero, got {}",
            amount
        )));
    }
    Ok(())
}

/// Check the parent reference is consistent with the requested level.
///
/// `parent` is the node `input.parent_id` resolved to, if any.
pub fn validate_placement(input: &NewNode, parent: Option<&EstimateNode>) -> Result<()> {
    match (input.level.parent_level(), &input.parent_id, parent) {
        (None, None, _) => Ok(()),
        (None, Some(_), _) => Err(LedgerError::Validation(format!(
            "{} nodes cannot have a parent",
            input.level
        ))),
        (Some(_), None, _) => Err(LedgerError::Validation(format!(
            "{} nodes require a parent",
            input.level
        ))),
        (Some(_), Some(parent_id), None) => Err(LedgerError::NotFound(parent_id.clone())),
        (Some(expected), Some(_), Some(parent)) if parent.level != expected => {
            Err(LedgerError::Validation(format!(
                "{} nodes must sit under a {} node, parent {} is {}",
                input.level, expected, parent.id, parent.level
            )))
        }
        (Some(_), Some(_), Some(_)) => Ok(()),
    }
}

/// Check a new child fits in what its parent has left.
pub fn check_new_child(
    parent: &EstimateNode,
    siblings: &[EstimateNode],
    requested: Decimal,
) -> Result<()> {
    let remaining = remaining_amount(Some(parent), siblings);
    if requested > remaining {
        return Err(LedgerError::BudgetExceeded {
            requested,
            remaining,
        });
    }
    Ok(())
}

/// Check an edit of `node` to `requested`.
///
/// `siblings` is the parent's full current child set, `node` included; the
/// node's own prior contribution is added back before comparing. The new
/// amount must also still cover what the node already hands to its own
/// children.
pub fn check_update(
    node: &EstimateNode,
    parent: Option<&EstimateNode>,
    siblings: &[EstimateNode],
    own_children: &[EstimateNode],
    requested: Decimal,
) -> Result<()> {
    validate_amount(requested)?;

    if let Some(parent) = parent {
        let adjusted_remaining = remaining_amount(Some(parent), siblings) + node.estimated_amount;
        if requested > adjusted_remaining {
            return Err(LedgerError::BudgetExceeded {
                requested,
                remaining: adjusted_remaining,
            });
        }
    }

    let allocated = used_amount(own_children);
    if requested < allocated {
        return Err(LedgerError::Validation(format!(
            "estimated amount {} is below the {} already allocated to children of {}",
            requested, allocated, node.id
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EstimateLevel;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn component(amount: &str) -> EstimateNode {
        EstimateNode::from_new(NewNode::component("C", "Component", dec(amount)))
    }

    fn child_of(parent: &EstimateNode, amount: &str) -> EstimateNode {
        EstimateNode::from_new(NewNode::child(
            EstimateLevel::SubComponent,
            parent.id.clone(),
            "S",
            "Sub",
            dec(amount),
        ))
    }

    #[test]
    fn test_used_and_remaining() {
        let parent = component("10000");
        let children = vec![child_of(&parent, "4000"), child_of(&parent, "2500.50")];

        assert_eq!(used_amount(&children), dec("6500.50"));
        assert_eq!(remaining_amount(Some(&parent), &children), dec("3499.50"));
        assert_eq!(remaining_amount(Some(&parent), &[]), dec("10000"));
        assert_eq!(used_amount(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_remaining_missing_parent_is_zero() {
        assert_eq!(remaining_amount(None, &[]), Decimal::ZERO);
    }

    #[test]
    fn test_exact_remaining_fits() {
        let parent = component("100");
        let siblings = vec![child_of(&parent, "60")];

        assert!(check_new_child(&parent, &siblings, dec("40")).is_ok());
        assert_eq!(
            check_new_child(&parent, &siblings, dec("40.01")),
            Err(LedgerError::BudgetExceeded {
                requested: dec("40.01"),
                remaining: dec("40"),
            })
        );
    }

    #[test]
    fn test_update_rebases_own_contribution() {
        let parent = component("1000");
        let node = child_of(&parent, "500");
        let other = child_of(&parent, "500");
        let siblings = vec![node.clone(), other];

        assert!(check_update(&node, Some(&parent), &siblings, &[], dec("500")).is_ok());
        assert!(matches!(
            check_update(&node, Some(&parent), &siblings, &[], dec("501")),
            Err(LedgerError::BudgetExceeded { remaining, .. }) if remaining == dec("500")
        ));
    }

    #[test]
    fn test_update_cannot_undercut_children() {
        let parent = component("1000");
        let children = vec![child_of(&parent, "700")];

        let err = check_update(&parent, None, &[], &children, dec("699")).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(check_update(&parent, None, &[], &children, dec("700")).is_ok());
    }

    #[test]
    fn test_non_positive_amounts_rejected() {
        assert!(validate_amount(Decimal::ZERO).is_err());
        assert!(validate_amount(dec("-1")).is_err());
        assert!(validate_amount(dec("0.01")).is_ok());
    }

    #[test]
    fn test_placement_rules() {
        let parent = component("100");
        let ok = NewNode::child(EstimateLevel::SubComponent, parent.id.clone(), "S", "S", dec("1"));
        assert!(validate_placement(&ok, Some(&parent)).is_ok());

        let skip = NewNode::child(EstimateLevel::Activity, parent.id.clone(), "A", "A", dec("1"));
        assert!(matches!(
            validate_placement(&skip, Some(&parent)),
            Err(LedgerError::Validation(_))
        ));

        let orphan = NewNode {
            parent_id: None,
            ..ok.clone()
        };
        assert!(matches!(
            validate_placement(&orphan, None),
            Err(LedgerError::Validation(_))
        ));

        assert!(matches!(
            validate_placement(&ok, None),
            Err(LedgerError::NotFound(_))
        ));

        let root_with_parent = NewNode {
            parent_id: Some("x".to_string()),
            ..NewNode::component("C", "C", dec("1"))
        };
        assert!(matches!(
            validate_placement(&root_with_parent, None),
            Err(LedgerError::Validation(_))
        ));
    }
}
