use std::fmt::{self, Display, Formatter};

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::model::common::Role;

/// A marker for the privilege level a route requires.
///
/// All users live in the same `students` collection; these markers select
/// which roles an [`AuthToken`](super::AuthToken) guard will accept.
pub trait User {
    /// The minimum rights this user type requires.
    const REQUIRED: Rights;
}

/// Privilege levels as encoded in auth tokens, in increasing order.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Rights {
    Student = 0,
    Observer = 1,
    Admin = 2,
}

impl Rights {
    /// Does a token with these rights satisfy the given requirement?
    pub fn permits(self, required: Rights) -> bool {
        self as u8 >= required as u8
    }
}

impl Display for Rights {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Student => "student",
                Self::Observer => "observer",
                Self::Admin => "admin",
            }
        )
    }
}

impl From<Role> for Rights {
    fn from(role: Role) -> Self {
        match role {
            Role::Student => Rights::Student,
            Role::Observer => Rights::Observer,
            Role::Admin => Rights::Admin,
        }
    }
}

/// Any authenticated account.
pub struct Student;

impl User for Student {
    const REQUIRED: Rights = Rights::Student;
}

/// Admins or observers, e.g. for read-only analytics.
pub struct AdminOrObserver;

impl User for AdminOrObserver {
    const REQUIRED: Rights = Rights::Observer;
}

/// Admins only.
pub struct Admin;

impl User for Admin {
    const REQUIRED: Rights = Rights::Admin;
}
