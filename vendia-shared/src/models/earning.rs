use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Settlement state of a seller's proceeds. Moves forward only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EarningStatus {
    Pending,
    Available,
    Paid,
}

impl EarningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EarningStatus::Pending => "pending",
            EarningStatus::Available => "available",
            EarningStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<EarningStatus> {
        match s {
            "pending" => Some(EarningStatus::Pending),
            "available" => Some(EarningStatus::Available),
            "paid" => Some(EarningStatus::Paid),
            _ => None,
        }
    }

    /// pending → available → paid, never backward
    pub fn can_advance_to(&self, next: EarningStatus) -> bool {
        matches!(
            (self, next),
            (EarningStatus::Pending, EarningStatus::Available)
                | (EarningStatus::Available, EarningStatus::Paid)
        )
    }
}

/// A seller's net proceeds from one sub-order, held until `available_on`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Earning {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub sub_order_id: Uuid,
    pub order_id: Uuid,
    pub gross_cents: i64,
    pub commission_cents: i64,
    pub commission_rate_bps: i64,
    pub net_cents: i64,
    pub status: EarningStatus,
    pub available_on: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Earning {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        seller_id: Uuid,
        sub_order_id: Uuid,
        order_id: Uuid,
        gross_cents: i64,
        commission_cents: i64,
        commission_rate_bps: i64,
        available_on: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            seller_id,
            sub_order_id,
            order_id,
            gross_cents,
            commission_cents,
            commission_rate_bps,
            net_cents: gross_cents - commission_cents,
            status: EarningStatus::Pending,
            available_on,
            created_at: now,
            updated_at: now,
        }
    }

    /// Invariant: net + commission = gross, exactly
    pub fn is_balanced(&self) -> bool {
        self.net_cents + self.commission_cents == self.gross_cents
    }
}
