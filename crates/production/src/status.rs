//! Order and item state machines.

use serde::{Deserialize, Serialize};

use shopfloor_core::DomainError;

/// Order priority (informational; does not affect transitions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl core::str::FromStr for Priority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(DomainError::validation(format!(
                "unknown priority '{other}' (expected low, medium, high or urgent)"
            ))),
        }
    }
}

/// Production order lifecycle.
///
/// ```text
/// requested ──► approved ──► in_production ──► completed
///               ▲    │            ▲
/// pending ──────┘    └────────────┤
///    └────────────────────────────┘
/// pending | approved | in_production ──► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Raised by a worker; needs approval.
    Requested,
    /// Raised by a manager; approval is optional.
    Pending,
    Approved,
    InProduction,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Requested,
        OrderStatus::Pending,
        OrderStatus::Approved,
        OrderStatus::InProduction,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Requested, Approved)
                | (Pending, Approved)
                | (Pending, InProduction)
                | (Approved, InProduction)
                | (InProduction, Completed)
                | (Pending, Cancelled)
                | (Approved, Cancelled)
                | (InProduction, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Item progress (status updates) is accepted in these states.
    pub fn accepts_item_progress(self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Approved | OrderStatus::InProduction
        )
    }

    /// Workers can be assigned in these states.
    pub fn accepts_assignment(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Approved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Requested => "requested",
            OrderStatus::Pending => "pending",
            OrderStatus::Approved => "approved",
            OrderStatus::InProduction => "in_production",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Validate an edge, naming it on failure.
    pub fn ensure_transition(self, to: OrderStatus) -> Result<(), DomainError> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(DomainError::invalid_transition("order", self, to))
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown order status '{s}'")))
    }
}

/// Per-item production progress: `pending → assigned → in_progress → completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
}

impl ItemStatus {
    pub fn can_transition_to(self, to: ItemStatus) -> bool {
        matches!(
            (self, to),
            (ItemStatus::Pending, ItemStatus::Assigned)
                | (ItemStatus::Assigned, ItemStatus::InProgress)
                | (ItemStatus::InProgress, ItemStatus::Completed)
        )
    }

    /// Work on the item has begun; its worker binding is frozen.
    pub fn is_started(self) -> bool {
        matches!(self, ItemStatus::InProgress | ItemStatus::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Assigned => "assigned",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Completed => "completed",
        }
    }

    pub fn ensure_transition(self, to: ItemStatus) -> Result<(), DomainError> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(DomainError::invalid_transition("item", self, to))
        }
    }
}

impl core::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ItemStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ItemStatus::Pending),
            "assigned" => Ok(ItemStatus::Assigned),
            "in_progress" => Ok(ItemStatus::InProgress),
            "completed" => Ok(ItemStatus::Completed),
            other => Err(DomainError::validation(format!("unknown item status '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_edges_are_exactly_the_legal_set() {
        use OrderStatus::*;
        let legal = [
            (Requested, Approved),
            (Pending, Approved),
            (Pending, InProduction),
            (Approved, InProduction),
            (InProduction, Completed),
            (Pending, Cancelled),
            (Approved, Cancelled),
            (InProduction, Cancelled),
        ];

        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for to in OrderStatus::ALL {
            assert!(!OrderStatus::Completed.can_transition_to(to));
            assert!(!OrderStatus::Cancelled.can_transition_to(to));
        }
    }

    #[test]
    fn item_cannot_skip_or_reverse() {
        assert!(ItemStatus::Pending.can_transition_to(ItemStatus::Assigned));
        assert!(!ItemStatus::Pending.can_transition_to(ItemStatus::InProgress));
        assert!(!ItemStatus::Assigned.can_transition_to(ItemStatus::Completed));
        assert!(!ItemStatus::Completed.can_transition_to(ItemStatus::InProgress));

        let err = ItemStatus::InProgress
            .ensure_transition(ItemStatus::Assigned)
            .unwrap_err();
        match err {
            DomainError::InvalidTransition { entity, from, to } => {
                assert_eq!(entity, "item");
                assert_eq!(from, "in_progress");
                assert_eq!(to, "assigned");
            }
            other => panic!("Expected InvalidTransition, got {other:?}"),
        }
    }

    #[test]
    fn statuses_parse_from_their_wire_names() {
        assert_eq!("in_production".parse::<OrderStatus>().unwrap(), OrderStatus::InProduction);
        assert_eq!("in_progress".parse::<ItemStatus>().unwrap(), ItemStatus::InProgress);
        assert_eq!("urgent".parse::<Priority>().unwrap(), Priority::Urgent);
        assert!("done".parse::<OrderStatus>().is_err());
    }
}
