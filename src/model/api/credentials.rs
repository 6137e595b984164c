use argon2::Config;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{Role, YearGroup},
    db::student::NewStudentProfile,
};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    // 16 bytes is recommended for password hashing:
    //  https://en.wikipedia.org/wiki/Argon2
    let mut salt = [0_u8; 16];
    rand::thread_rng().fill(&mut salt);
    argon2::hash_encoded(password.as_bytes(), &salt, &Config::default()).unwrap() // Safe because the default `Config` is valid.
}

/// A registration request, received from a new student. Never stored
/// directly, since the password is in plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub student_id: String,
    pub year_group: YearGroup,
}

impl TryFrom<RegistrationRequest> for NewStudentProfile {
    type Error = &'static str;

    /// Convert a [`RegistrationRequest`] into a new profile by hashing the
    /// password. Enforces the form-level validation rules; uniqueness of
    /// username and student ID is left to the database indexes.
    fn try_from(req: RegistrationRequest) -> Result<Self, Self::Error> {
        if req.username.trim().is_empty() {
            return Err("Username must not be empty.");
        }
        if req.password.len() < MIN_PASSWORD_LENGTH {
            return Err("Password must be at least 8 characters long.");
        }
        if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
            return Err("First and last name are required.");
        }
        // Cheap plausibility check, not RFC 5322.
        if !req.email.contains('@') || req.email.trim().is_empty() {
            return Err("A valid email address is required.");
        }
        if req.student_id.trim().is_empty() {
            return Err("Student ID must not be empty.");
        }

        Ok(Self {
            username: req.username,
            password_hash: hash_password(&req.password),
            first_name: req.first_name,
            last_name: req.last_name,
            email: req.email,
            student_id: req.student_id,
            year_group: req.year_group,
            role: Role::Student,
            is_eligible: true,
        })
    }
}

/// Raw login credentials, received from a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// A profile update. Only these fields may be changed by the account holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub year_group: YearGroup,
}


/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl RegistrationRequest {
        pub fn example() -> Self {
            Self {
                username: "amira.k".into(),
                password: "correct horse battery".into(),
                first_name: "Amira".into(),
                last_name: "Khan".into(),
                email: "amira.khan@school.example".into(),
                student_id: "STU01234".into(),
                year_group: YearGroup::Year9,
            }
        }

        pub fn example2() -> Self {
            Self {
                username: "billy-o".into(),
                password: "totallysecurepassword".into(),
                first_name: "Billy".into(),
                last_name: "Odinga".into(),
                email: "billy.odinga@school.example".into(),
                student_id: "STU05678".into(),
                year_group: YearGroup::Year10,
            }
        }

        pub fn example_admin() -> Self {
            Self {
                username: "coordinator".into(),
                password: "ballots4lyfe".into(),
                first_name: "Carol".into(),
                last_name: "Mistry".into(),
                email: "c.mistry@school.example".into(),
                student_id: "STAFF001".into(),
                year_group: YearGroup::Year7,
            }
        }

        pub fn example_observer() -> Self {
            Self {
                username: "governor".into(),
                password: "lookdonttouch".into(),
                first_name: "Gavin".into(),
                last_name: "Okafor".into(),
                email: "g.okafor@school.example".into(),
                student_id: "STAFF002".into(),
                year_group: YearGroup::Year7,
            }
        }

        pub fn empty() -> Self {
            Self {
                username: "".into(),
                password: "".into(),
                first_name: "".into(),
                last_name: "".into(),
                email: "".into(),
                student_id: "".into(),
                year_group: YearGroup::Year7,
            }
        }
    }

    impl LoginRequest {
        pub fn example() -> Self {
            let req = RegistrationRequest::example();
            Self {
                username: req.username,
                password: req.password,
            }
        }

        pub fn example_admin() -> Self {
            let req = RegistrationRequest::example_admin();
            Self {
                username: req.username,
                password: req.password,
            }
        }

        pub fn example_observer() -> Self {
            let req = RegistrationRequest::example_observer();
            Self {
                username: req.username,
                password: req.password,
            }
        }
    }
}
