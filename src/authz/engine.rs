use uuid::Uuid;

use super::actor::{Actor, TargetRef};
use super::role::{level, Department, Role};

/// What slice of user-owned records an actor may read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    /// Founder: everything.
    All,
    /// Co-founder: everything except records owned by the founder.
    ExcludeFounder,
    /// Department head: employees of the bound department only.
    DepartmentEmployees(Department),
    /// Employee: own records only.
    SelfOnly(Uuid),
}

pub fn visibility(actor: &Actor) -> Visibility {
    match actor.role {
        Role::Founder => Visibility::All,
        Role::CoFounder => Visibility::ExcludeFounder,
        Role::TechnicalHead | Role::SalesHead | Role::FinanceHead => {
            match actor.role.bound_department() {
                Some(dept) => Visibility::DepartmentEmployees(dept),
                // unreachable for head roles, but fail closed
                None => Visibility::SelfOnly(actor.id),
            }
        }
        Role::Employee => Visibility::SelfOnly(actor.id),
    }
}

impl Visibility {
    /// Point check used for single-record reads.
    pub fn matches(&self, target: &TargetRef) -> bool {
        match self {
            Visibility::All => true,
            Visibility::ExcludeFounder => target.role != "founder",
            Visibility::DepartmentEmployees(dept) => {
                target.role == "employee" && target.department == Some(*dept)
            }
            Visibility::SelfOnly(id) => target.id == *id,
        }
    }

    /// SQL predicate over the owning user's columns, with positional binds.
    /// Every list endpoint appends this to its WHERE clause so reads and
    /// point checks cannot drift apart.
    pub fn sql_predicate(
        &self,
        role_col: &str,
        dept_col: &str,
        user_col: &str,
    ) -> (String, Vec<String>) {
        match self {
            Visibility::All => ("1 = 1".to_string(), Vec::new()),
            Visibility::ExcludeFounder => {
                (format!("{role_col} <> ?"), vec!["founder".to_string()])
            }
            Visibility::DepartmentEmployees(dept) => (
                format!("{role_col} = ? AND {dept_col} = ?"),
                vec!["employee".to_string(), dept.as_str().to_string()],
            ),
            Visibility::SelfOnly(id) => (format!("{user_col} = ?"), vec![id.to_string()]),
        }
    }
}

/// May the actor read this record. Defined as agreement with the list
/// filter: whatever a list would include, a point read allows.
pub fn can_access_record(actor: &Actor, target: &TargetRef) -> bool {
    visibility(actor).matches(target)
}

/// May the actor write records owned by the target. Strictly-higher level
/// is required, so equal ranks (head vs head, founder vs founder) never
/// mutate each other, and nobody mutates upward. Heads are additionally
/// confined to their bound department.
pub fn can_mutate(actor: &Actor, target: &TargetRef) -> bool {
    if actor.role.level() <= level(&target.role) {
        return false;
    }
    match actor.role.bound_department() {
        Some(dept) => target.department == Some(dept),
        None => true,
    }
}

/// May the actor move the target to `new_role`. Mutation authority plus a
/// ceiling: the granted role must sit strictly below the actor's own level,
/// which rules out self-promotion and peer-creation in one check.
pub fn can_assign_role(actor: &Actor, target: &TargetRef, new_role: Role) -> bool {
    can_mutate(actor, target) && new_role.level() < actor.role.level()
}
