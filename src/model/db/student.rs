use std::ops::{Deref, DerefMut};

use mongodb::bson::doc;
use mongodb::error::Error as DbError;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{Role, YearGroup},
    mongodb::{Coll, Id},
};

/// Username of the bootstrap admin account created on first launch.
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";

/// Core student profile data, as stored in the database.
///
/// Admins and observers are profiles too; they are distinguished by `role`.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct StudentProfileCore {
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// School-issued student identification number.
    pub student_id: String,
    pub year_group: YearGroup,
    pub role: Role,
    /// Suspended students keep their account but cannot vote.
    pub is_eligible: bool,
}

impl StudentProfileCore {
    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        // Unwrap safe because profiles are only ever created via
        // `RegistrationRequest`, so the hash is always well-formed.
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap()
    }

    /// The student's full name, as shown on ballots and in exports.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A student profile without an ID.
pub type NewStudentProfile = StudentProfileCore;

/// A student profile from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub profile: StudentProfileCore,
}

impl Deref for StudentProfile {
    type Target = StudentProfileCore;

    fn deref(&self) -> &Self::Target {
        &self.profile
    }
}

impl DerefMut for StudentProfile {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.profile
    }
}

/// Ensure there is at least one admin account, creating the default one if not.
///
/// Deployments without shell access need a way to bootstrap the first admin;
/// the password comes from the `default_admin_password` config value.
pub async fn ensure_admin_exists(
    students: &Coll<NewStudentProfile>,
    default_password: &str,
) -> Result<(), DbError> {
    let any_admin = doc! {
        "role": Role::Admin,
    };
    if students.find_one(any_admin, None).await?.is_none() {
        let admin = NewStudentProfile {
            username: DEFAULT_ADMIN_USERNAME.to_string(),
            password_hash: crate::model::api::credentials::hash_password(default_password),
            first_name: "Election".to_string(),
            last_name: "Coordinator".to_string(),
            email: "admin@campusvote.example".to_string(),
            student_id: "STU00001".to_string(),
            year_group: YearGroup::Year7,
            role: Role::Admin,
            is_eligible: false,
        };
        students.insert_one(admin, None).await?;
        warn!("No admin account found; created default admin '{DEFAULT_ADMIN_USERNAME}'");
    }
    Ok(())
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    use crate::model::api::credentials::RegistrationRequest;

    impl StudentProfileCore {
        /// A regular year 9 student.
        pub fn example() -> Self {
            RegistrationRequest::example().try_into().unwrap()
        }

        /// Another student, in year 10.
        pub fn example2() -> Self {
            RegistrationRequest::example2().try_into().unwrap()
        }

        /// An admin account.
        pub fn example_admin() -> Self {
            let mut profile: Self = RegistrationRequest::example_admin().try_into().unwrap();
            profile.role = Role::Admin;
            profile
        }

        /// An observer account.
        pub fn example_observer() -> Self {
            let mut profile: Self = RegistrationRequest::example_observer().try_into().unwrap();
            profile.role = Role::Observer;
            profile
        }
    }
}
