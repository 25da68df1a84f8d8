use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;

/// Organization role lattice. Levels: founder=4, co_founder=3, heads=2,
/// employee=1. Authority is strictly greater-than; equal levels never
/// outrank each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Founder,
    CoFounder,
    TechnicalHead,
    SalesHead,
    FinanceHead,
    Employee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    Technical,
    Sales,
    Finance,
}

/// Authority level for a stored role name. Total over arbitrary strings:
/// anything unrecognized maps to 0 and therefore fails every strict
/// comparison the engine makes.
pub fn level(role_name: &str) -> u8 {
    match role_name {
        "founder" => 4,
        "co_founder" => 3,
        "technical_head" | "sales_head" | "finance_head" => 2,
        "employee" => 1,
        _ => 0,
    }
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Founder,
        Role::CoFounder,
        Role::TechnicalHead,
        Role::SalesHead,
        Role::FinanceHead,
        Role::Employee,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Founder => "founder",
            Role::CoFounder => "co_founder",
            Role::TechnicalHead => "technical_head",
            Role::SalesHead => "sales_head",
            Role::FinanceHead => "finance_head",
            Role::Employee => "employee",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "founder" => Some(Role::Founder),
            "co_founder" => Some(Role::CoFounder),
            "technical_head" => Some(Role::TechnicalHead),
            "sales_head" => Some(Role::SalesHead),
            "finance_head" => Some(Role::FinanceHead),
            "employee" => Some(Role::Employee),
            _ => None,
        }
    }

    pub fn level(&self) -> u8 {
        level(self.as_str())
    }

    /// The department a head role manages. Non-head roles are not bound.
    pub fn bound_department(&self) -> Option<Department> {
        match self {
            Role::TechnicalHead => Some(Department::Technical),
            Role::SalesHead => Some(Department::Sales),
            Role::FinanceHead => Some(Department::Finance),
            _ => None,
        }
    }

    /// Heads and employees belong to a department; founder and co-founder
    /// sit above the department structure.
    pub fn requires_department(&self) -> bool {
        !matches!(self, Role::Founder | Role::CoFounder)
    }

    /// Decide the department column value for a user carrying this role.
    ///
    /// - head roles are pinned to their bound department; a conflicting
    ///   supplied value is a validation error
    /// - employee keeps the supplied value, falling back to the existing one
    /// - founder/co-founder always end up with no department
    pub fn resolve_department(
        &self,
        supplied: Option<Department>,
        existing: Option<Department>,
    ) -> Result<Option<Department>, AppError> {
        match self.bound_department() {
            Some(bound) => {
                if let Some(dept) = supplied {
                    if dept != bound {
                        return Err(AppError::bad_request(format!(
                            "role {} is bound to department {}",
                            self.as_str(),
                            bound.as_str()
                        )));
                    }
                }
                Ok(Some(bound))
            }
            None if !self.requires_department() => Ok(None),
            None => supplied
                .or(existing)
                .map(Some)
                .ok_or_else(|| AppError::bad_request("department is required for employees")),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Department {
    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Technical => "technical",
            Department::Sales => "sales",
            Department::Finance => "finance",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "technical" => Some(Department::Technical),
            "sales" => Some(Department::Sales),
            "finance" => Some(Department::Finance),
            _ => None,
        }
    }
}

impl std::fmt::Display for Department {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_orders_the_lattice() {
        assert!(Role::Founder.level() > Role::CoFounder.level());
        assert!(Role::CoFounder.level() > Role::TechnicalHead.level());
        assert_eq!(Role::TechnicalHead.level(), Role::SalesHead.level());
        assert_eq!(Role::SalesHead.level(), Role::FinanceHead.level());
        assert!(Role::FinanceHead.level() > Role::Employee.level());
        assert!(Role::Employee.level() > 0);
    }

    #[test]
    fn unknown_role_name_has_no_authority() {
        assert_eq!(level("intern"), 0);
        assert_eq!(level(""), 0);
        assert_eq!(level("FOUNDER"), 0);
    }

    #[test]
    fn parse_round_trips_every_role() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("manager"), None);
    }

    #[test]
    fn heads_are_bound_to_their_department() {
        assert_eq!(Role::TechnicalHead.bound_department(), Some(Department::Technical));
        assert_eq!(Role::SalesHead.bound_department(), Some(Department::Sales));
        assert_eq!(Role::FinanceHead.bound_department(), Some(Department::Finance));
        assert_eq!(Role::Founder.bound_department(), None);
        assert_eq!(Role::Employee.bound_department(), None);
    }

    #[test]
    fn head_department_mismatch_is_rejected() {
        let err = Role::SalesHead.resolve_department(Some(Department::Finance), None);
        assert!(err.is_err());
        let ok = Role::SalesHead.resolve_department(None, None).unwrap();
        assert_eq!(ok, Some(Department::Sales));
    }

    #[test]
    fn founder_department_is_cleared() {
        let resolved = Role::Founder
            .resolve_department(Some(Department::Technical), Some(Department::Sales))
            .unwrap();
        assert_eq!(resolved, None);
    }

    #[test]
    fn employee_needs_some_department() {
        assert!(Role::Employee.resolve_department(None, None).is_err());
        let kept = Role::Employee
            .resolve_department(None, Some(Department::Finance))
            .unwrap();
        assert_eq!(kept, Some(Department::Finance));
    }
}
