use mongodb::bson::doc;
use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    api::{
        auth::{AuthToken, Student, AUTH_TOKEN_COOKIE},
        credentials::{LoginRequest, ProfileUpdate, RegistrationRequest},
        student::StudentDescription,
    },
    db::student::{NewStudentProfile, StudentProfile},
    mongodb::{errors::is_duplicate_key_error, Coll, Id},
};

use super::common::profile_by_token;

pub fn routes() -> Vec<Route> {
    routes![register, authenticate, logout, get_profile, update_profile]
}

/// Create a student account and log it in.
#[post("/auth/register", data = "<request>", format = "json")]
pub(crate) async fn register(
    cookies: &CookieJar<'_>,
    request: Json<RegistrationRequest>,
    new_students: Coll<NewStudentProfile>,
    students: Coll<StudentProfile>,
    config: &State<Config>,
) -> Result<Json<StudentDescription>> {
    let new_profile: NewStudentProfile = request
        .0
        .try_into()
        .map_err(|msg: &'static str| Error::Status(Status::BadRequest, msg.to_string()))?;

    // Uniqueness of username and student ID is enforced by the indexes.
    let id: Id = match new_students.insert_one(&new_profile, None).await {
        Ok(result) => result.inserted_id.as_object_id().unwrap().into(), // Valid because the ID comes directly from the DB
        Err(err) if is_duplicate_key_error(&err) => {
            return Err(Error::Status(
                Status::BadRequest,
                "That username or student ID is already registered.".to_string(),
            ));
        }
        Err(err) => return Err(err.into()),
    };

    let profile = students.find_one(id.as_doc(), None).await?.unwrap(); // Just inserted.

    let token = AuthToken::<Student>::for_profile(&profile);
    cookies.add(token.into_cookie(config));

    Ok(Json(profile.into()))
}

/// Verify credentials and set the auth cookie.
#[post("/auth/login", data = "<credentials>", format = "json")]
pub(crate) async fn authenticate(
    cookies: &CookieJar<'_>,
    credentials: Json<LoginRequest>,
    students: Coll<StudentProfile>,
    config: &State<Config>,
) -> Result<Json<StudentDescription>> {
    let with_username = doc! {
        "username": &credentials.username,
    };
    // One message for both failure modes; don't reveal which was wrong.
    let profile = students
        .find_one(with_username, None)
        .await?
        .filter(|profile| profile.verify_password(&credentials.password))
        .ok_or_else(|| Error::unauthorized("Incorrect username or password.".to_string()))?;

    let token = AuthToken::<Student>::for_profile(&profile);
    cookies.add(token.into_cookie(config));

    Ok(Json(profile.into()))
}

/// Log out by removing the auth cookie.
#[delete("/auth")]
fn logout(cookies: &CookieJar<'_>) {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
}

#[get("/profile")]
async fn get_profile(
    token: AuthToken<Student>,
    students: Coll<StudentProfile>,
) -> Result<Json<StudentDescription>> {
    let profile = profile_by_token(&token, &students).await?;
    Ok(Json(profile.into()))
}

/// Update the account holder's own contact details and year group.
#[put("/profile", data = "<update>", format = "json")]
async fn update_profile(
    token: AuthToken<Student>,
    update: Json<ProfileUpdate>,
    students: Coll<StudentProfile>,
) -> Result<Json<StudentDescription>> {
    if update.first_name.trim().is_empty() || update.last_name.trim().is_empty() {
        return Err(Error::Status(
            Status::BadRequest,
            "First and last name are required.".to_string(),
        ));
    }
    if !update.email.contains('@') {
        return Err(Error::Status(
            Status::BadRequest,
            "A valid email address is required.".to_string(),
        ));
    }

    let set_fields = doc! {
        "$set": {
            "first_name": &update.first_name,
            "last_name": &update.last_name,
            "email": &update.email,
            "year_group": update.year_group,
        }
    };
    students.update_one(token.id.as_doc(), set_fields, None).await?;

    let profile = profile_by_token(&token, &students).await?;
    Ok(Json(profile.into()))
}

#[cfg(test)]
mod tests {
    use mongodb::Database;
    use rocket::{
        http::ContentType,
        local::asynchronous::Client,
        serde::json::{serde_json, json},
    };

    use crate::model::common::YearGroup;

    use super::*;

    #[backend_test]
    async fn register_creates_and_logs_in(client: Client, students: Coll<StudentProfile>) {
        let request = RegistrationRequest::example();
        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(json!(request).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        // The auth cookie is set, so the student is logged in.
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());

        // The profile is stored, with the password hashed.
        let profile = students
            .find_one(doc! {"username": &request.username}, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.student_id, request.student_id);
        assert_ne!(profile.password_hash, request.password);
        assert!(profile.verify_password(&request.password));
        assert!(profile.is_eligible);
    }

    #[backend_test]
    async fn register_rejects_duplicates(client: Client, students: Coll<StudentProfile>) {
        register_expect_status(&client, &RegistrationRequest::example(), Status::Ok).await;

        // Same username again.
        let mut request = RegistrationRequest::example();
        request.student_id = "STU09999".to_string();
        register_expect_status(&client, &request, Status::BadRequest).await;

        // Same student ID, different username.
        let mut request = RegistrationRequest::example();
        request.username = "someone.else".to_string();
        register_expect_status(&client, &request, Status::BadRequest).await;

        let count = students.count_documents(None, None).await.unwrap();
        assert_eq!(count, 1);
    }

    #[backend_test]
    async fn register_validates_fields(client: Client, students: Coll<StudentProfile>) {
        let mut request = RegistrationRequest::example();
        request.password = "2short".to_string();
        register_expect_status(&client, &request, Status::BadRequest).await;

        let mut request = RegistrationRequest::example();
        request.email = "nothing-like-an-email".to_string();
        register_expect_status(&client, &request, Status::BadRequest).await;

        register_expect_status(&client, &RegistrationRequest::empty(), Status::BadRequest).await;

        let count = students.count_documents(None, None).await.unwrap();
        assert_eq!(count, 0);
    }

    #[backend_test(student)]
    async fn login_logout(client: Client) {
        // The test harness has registered and logged us in.
        let response = client.get(uri!(get_profile)).dispatch().await;
        assert_eq!(Status::Ok, response.status());

        // Log out; the guarded route no longer matches.
        let response = client.delete(uri!(logout)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_none());
        let response = client.get(uri!(get_profile)).dispatch().await;
        assert_eq!(Status::NotFound, response.status());

        // Log back in.
        let response = client
            .post(uri!(authenticate))
            .header(ContentType::JSON)
            .body(json!(LoginRequest::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let response = client.get(uri!(get_profile)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
    }

    #[backend_test(student)]
    async fn wrong_credentials_rejected(client: Client) {
        client.delete(uri!(logout)).dispatch().await;

        let mut credentials = LoginRequest::example();
        credentials.password = "not the password".to_string();
        let response = client
            .post(uri!(authenticate))
            .header(ContentType::JSON)
            .body(json!(credentials).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());

        let credentials = LoginRequest {
            username: "no.such.user".to_string(),
            password: LoginRequest::example().password,
        };
        let response = client
            .post(uri!(authenticate))
            .header(ContentType::JSON)
            .body(json!(credentials).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_none());
    }

    #[backend_test]
    async fn expired_tokens_rejected(client: Client) {
        // A token whose `exp` is in the past must be answered with a 401, not
        // silently dropped as if no cookie was sent.
        let claims = json!({"id": "000000000000000000000000", "rgt": 0, "exp": 1});
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"test-jwt-secret"),
        )
        .unwrap();

        let response = client
            .get(uri!(get_profile))
            .cookie(Cookie::new(AUTH_TOKEN_COOKIE, token))
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
    }

    #[backend_test(student)]
    async fn profile_update(client: Client, db: Database) {
        let update = ProfileUpdate {
            first_name: "Amira".to_string(),
            last_name: "Khan-Ortiz".to_string(),
            email: "amira.khan-ortiz@school.example".to_string(),
            year_group: YearGroup::Year10,
        };
        let response = client
            .put(uri!(update_profile))
            .header(ContentType::JSON)
            .body(json!(update).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let description: StudentDescription =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(description.last_name, update.last_name);
        assert_eq!(description.year_group, YearGroup::Year10);

        // The stored profile changed, but not the username or student ID.
        let profile = Coll::<StudentProfile>::from_db(&db)
            .find_one(doc! {"username": &RegistrationRequest::example().username}, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.email, update.email);
        assert_eq!(profile.student_id, RegistrationRequest::example().student_id);

        // Invalid updates are rejected.
        let mut bad_update = update.clone();
        bad_update.email = "not an email".to_string();
        let response = client
            .put(uri!(update_profile))
            .header(ContentType::JSON)
            .body(json!(bad_update).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    async fn register_expect_status(
        client: &Client,
        request: &RegistrationRequest,
        status: Status,
    ) {
        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(json!(request).to_string())
            .dispatch()
            .await;
        assert_eq!(status, response.status());
    }
}
