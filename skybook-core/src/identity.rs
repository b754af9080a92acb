use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Admin,
}

/// An authenticated caller. Authentication itself happens at the edge (JWT);
/// by the time a principal reaches the saga it is trusted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub role: Role,
}

impl Principal {
    pub fn customer(id: impl Into<String>) -> Self {
        Self { id: id.into(), role: Role::Customer }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self { id: id.into(), role: Role::Admin }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Customers only see their own bookings; admins see everything.
    pub fn may_act_for(&self, owner_id: &str) -> bool {
        self.is_admin() || self.id == owner_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ownership_rules() {
        let alice = Principal::customer("alice");
        let ops = Principal::admin("ops-1");

        assert!(alice.may_act_for("alice"));
        assert!(!alice.may_act_for("bob"));
        assert!(ops.may_act_for("bob"));
    }
}
