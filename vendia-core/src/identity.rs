use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vendia_shared::models::order::{Order, SubOrder};

/// Caller role, resolved by an upstream auth collaborator and trusted here
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Seller,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "customer" => Some(Role::Customer),
            "seller" => Some(Role::Seller),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Seller => "seller",
            Role::Admin => "admin",
        }
    }
}

/// The authenticated identity a request acts as
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Customers see their own orders; sellers see orders they fulfil a
    /// part of; admins see everything.
    pub fn can_view_order(&self, order: &Order, sub_orders: &[SubOrder]) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Customer => order.buyer_id == self.user_id,
            Role::Seller => sub_orders.iter().any(|s| s.seller_id == self.user_id),
        }
    }

    pub fn can_view_sub_order(&self, sub: &SubOrder, parent_buyer_id: Option<Uuid>) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Seller => sub.seller_id == self.user_id,
            Role::Customer => parent_buyer_id == Some(self.user_id),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
