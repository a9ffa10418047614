// src/core/access.rs
//! Owner scoping for user-owned tables.
//!
//! Every query against a user-owned table is built through an [`OwnerScope`],
//! so a row belonging to another user is indistinguishable from a missing row.
//! The owner id is always the LAST placeholder of the generated statement.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPolicy {
    pub table: &'static str,
    pub owner_column: &'static str,
}

impl AccessPolicy {
    pub const fn new(table: &'static str, owner_column: &'static str) -> Self {
        Self {
            table,
            owner_column,
        }
    }

    pub fn scope(self, owner_id: i64) -> OwnerScope {
        OwnerScope {
            policy: self,
            owner_id,
        }
    }
}

pub const SECTIONS: AccessPolicy = AccessPolicy::new("sections", "owner_id");
pub const PROFILES: AccessPolicy = AccessPolicy::new("profiles", "user_id");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerScope {
    policy: AccessPolicy,
    owner_id: i64,
}

impl OwnerScope {
    pub fn owner_id(&self) -> i64 {
        self.owner_id
    }

    pub fn table(&self) -> &'static str {
        self.policy.table
    }

    fn where_clause(&self, filter: Option<&str>) -> String {
        match filter {
            Some(filter) => format!("WHERE ({}) AND {} = ?", filter, self.policy.owner_column),
            None => format!("WHERE {} = ?", self.policy.owner_column),
        }
    }

    pub fn select(&self, columns: &str, filter: Option<&str>, order_by: Option<&str>) -> String {
        let mut sql = format!(
            "SELECT {} FROM {} {}",
            columns,
            self.policy.table,
            self.where_clause(filter)
        );
        if let Some(order) = order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        sql
    }

    pub fn update(&self, assignments: &str, filter: Option<&str>) -> String {
        format!(
            "UPDATE {} SET {} {}",
            self.policy.table,
            assignments,
            self.where_clause(filter)
        )
    }

    pub fn delete(&self, filter: Option<&str>) -> String {
        format!("DELETE FROM {} {}", self.policy.table, self.where_clause(filter))
    }
}
