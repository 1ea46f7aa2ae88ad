use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::Audit;

/// Seniority / price tier. Closed set; anything else is rejected or coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Entry,
    Mid,
    Senior,
    Exec,
    Csuite,
}

impl Tier {
    pub const ALL: [Tier; 5] = [Tier::Entry, Tier::Mid, Tier::Senior, Tier::Exec, Tier::Csuite];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Entry => "ENTRY",
            Tier::Mid => "MID",
            Tier::Senior => "SENIOR",
            Tier::Exec => "EXEC",
            Tier::Csuite => "CSUITE",
        }
    }

    /// Lenient parse used for LLM output and price keys.
    /// Accepts case and separator variants (`c-suite`, ` senior `, `executive`).
    pub fn parse_lenient(raw: &str) -> Option<Tier> {
        let key: String = raw
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase();
        match key.as_str() {
            "ENTRY" | "ENTRYLEVEL" | "JUNIOR" => Some(Tier::Entry),
            "MID" | "MIDLEVEL" => Some(Tier::Mid),
            "SENIOR" => Some(Tier::Senior),
            "EXEC" | "EXECUTIVE" => Some(Tier::Exec),
            "CSUITE" | "CLEVEL" => Some(Tier::Csuite),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown tier '{s}'"))
    }
}

/// Workflow status of an order. Ranks only ever increase; see `lifecycle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    AnalysisComplete,
    CheckoutStarted,
    Paid,
    RevisedReady,
    DeliveryFailed,
    Delivered,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::AnalysisComplete,
        OrderStatus::CheckoutStarted,
        OrderStatus::Paid,
        OrderStatus::RevisedReady,
        OrderStatus::DeliveryFailed,
        OrderStatus::Delivered,
        OrderStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::AnalysisComplete => "analysis_complete",
            OrderStatus::CheckoutStarted => "checkout_started",
            OrderStatus::Paid => "paid",
            OrderStatus::RevisedReady => "revised_ready",
            OrderStatus::DeliveryFailed => "delivery_failed",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Refunded => "refunded",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            OrderStatus::AnalysisComplete => 0,
            OrderStatus::CheckoutStarted => 1,
            OrderStatus::Paid => 2,
            OrderStatus::RevisedReady => 3,
            OrderStatus::DeliveryFailed => 4,
            OrderStatus::Delivered => 5,
            OrderStatus::Refunded => 6,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Refunded)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("unknown order status '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub session_id: String,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

/// One order per submitted resume. `id` is the sole correlation key across the
/// order store, blob keys and payment session metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    pub tier: Tier,
    pub score: u8,
    pub audit: Audit,
    pub customer: Customer,
    pub filename: String,
    pub original_file_ref: Option<String>,
    pub revised_file_ref: Option<String>,
    pub payment: Option<Payment>,
    pub interview_prep: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    /// A freshly analysed order, before it is written to the store.
    pub fn new_analysed(
        id: Uuid,
        customer: Customer,
        filename: String,
        audit: Audit,
        original_file_ref: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: OrderStatus::AnalysisComplete,
            tier: audit.suggested_tier,
            score: audit.score,
            audit,
            customer,
            filename,
            original_file_ref,
            revised_file_ref: None,
            payment: None,
            interview_prep: false,
            version: 0,
            created_at: now,
            updated_at: now,
            delivered_at: None,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.payment
            .as_ref()
            .is_some_and(|p| p.status == PaymentStatus::Paid)
    }
}

/// Field-level merge applied by `OrderStore::update`. `None` leaves a field
/// untouched. `expected_version`, when set, rejects the write if another
/// writer got there first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub customer: Option<Customer>,
    pub original_file_ref: Option<String>,
    pub revised_file_ref: Option<String>,
    pub payment: Option<Payment>,
    pub interview_prep: Option<bool>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub expected_version: Option<i64>,
}

impl OrderPatch {
    pub fn expecting(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Applies the patch to an in-memory order, mirroring the merge that
    /// `PgOrderStore::update` performs in SQL.
    #[cfg(test)]
    pub fn merge_into(&self, order: &mut Order) {
        if let Some(status) = self.status {
            order.status = status;
        }
        if let Some(customer) = &self.customer {
            order.customer = customer.clone();
        }
        if let Some(key) = &self.original_file_ref {
            order.original_file_ref = Some(key.clone());
        }
        if let Some(key) = &self.revised_file_ref {
            order.revised_file_ref = Some(key.clone());
        }
        if let Some(payment) = &self.payment {
            order.payment = Some(payment.clone());
        }
        if let Some(flag) = self.interview_prep {
            order.interview_prep = flag;
        }
        if let Some(at) = self.delivered_at {
            order.delivered_at = Some(at);
        }
        order.version += 1;
        order.updated_at = Utc::now();
    }
}

/// Operator-facing view of an order. Drops the version counter and raw
/// storage keys.
#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    pub id: Uuid,
    pub status: OrderStatus,
    pub tier: Tier,
    pub score: u8,
    pub summary: String,
    pub customer: Customer,
    pub filename: String,
    pub has_original: bool,
    pub has_revised: bool,
    pub payment: Option<Payment>,
    pub interview_prep: bool,
    pub audit: Audit,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl From<Order> for OrderSummary {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            status: order.status,
            tier: order.tier,
            score: order.score,
            summary: order.audit.summary.clone(),
            customer: order.customer,
            filename: order.filename,
            has_original: order.original_file_ref.is_some(),
            has_revised: order.revised_file_ref.is_some(),
            payment: order.payment,
            interview_prep: order.interview_prep,
            audit: order.audit,
            created_at: order.created_at,
            updated_at: order.updated_at,
            delivered_at: order.delivered_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_lenient_parse() {
        assert_eq!(Tier::parse_lenient(" senior "), Some(Tier::Senior));
        assert_eq!(Tier::parse_lenient("C-Suite"), Some(Tier::Csuite));
        assert_eq!(Tier::parse_lenient("Executive"), Some(Tier::Exec));
        assert_eq!(Tier::parse_lenient("wizard"), None);
        assert_eq!(Tier::parse_lenient(""), None);
    }

    #[test]
    fn test_tier_serde_is_uppercase() {
        assert_eq!(serde_json::to_string(&Tier::Csuite).unwrap(), "\"CSUITE\"");
        let t: Tier = serde_json::from_str("\"EXEC\"").unwrap();
        assert_eq!(t, Tier::Exec);
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_status_ranks_are_strictly_increasing() {
        let ranks: Vec<u8> = OrderStatus::ALL.iter().map(|s| s.rank()).collect();
        assert!(ranks.windows(2).all(|w| w[0] < w[1]));
    }
}
