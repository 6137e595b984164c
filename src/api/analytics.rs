use std::fmt::Write;

use mongodb::bson::{doc, Bson, Document};
use mongodb::options::FindOptions;
use rocket::{
    futures::TryStreamExt,
    http::{ContentType, Header},
    serde::json::Json,
    Response, Route,
};

use crate::error::Result;
use crate::model::{
    api::{
        analytics::{ElectionAnalytics, YearGroupTurnout},
        audit::AuditLogDescription,
        auth::{Admin, AdminOrObserver, AuthToken},
        results::percentage,
    },
    common::{AuditAction, Role, YearGroup},
    db::{
        audit_log::{AuditLog, NewAuditLog},
        candidate::Candidate,
        election::Election,
        position::Position,
        student::StudentProfile,
        vote::Vote,
    },
    mongodb::{Coll, Id},
};

use super::common::{audit, election_by_id, profile_by_token, results_for_election, ClientIp};

pub fn routes() -> Vec<Route> {
    routes![election_analytics, export_results, audit_logs]
}

#[get("/elections/<election_id>/analytics")]
#[allow(clippy::too_many_arguments)]
async fn election_analytics(
    _token: AuthToken<AdminOrObserver>,
    election_id: Id,
    elections: Coll<Election>,
    positions: Coll<Position>,
    candidates: Coll<Candidate>,
    students: Coll<StudentProfile>,
    votes: Coll<Vote>,
) -> Result<Json<ElectionAnalytics>> {
    let election = election_by_id(election_id, &elections).await?;

    // Turnout counts distinct voters, not votes: a student voting for three
    // positions is still one student.
    let voter_ids: Vec<Bson> = votes
        .distinct("student_id", doc! {"election_id": election_id}, None)
        .await?;

    let mut eligible_groups: Vec<YearGroup> = YearGroup::ALL
        .into_iter()
        .filter(|group| election.eligible_year_groups.contains(group))
        .collect();
    eligible_groups.sort();

    let mut turnout = Vec::with_capacity(eligible_groups.len());
    let mut total_eligible = 0;
    let mut total_voted = 0;
    for year_group in eligible_groups {
        let eligible = students
            .count_documents(
                doc! {
                    "role": Role::Student,
                    "is_eligible": true,
                    "year_group": year_group,
                },
                None,
            )
            .await?;
        // Filtered like the eligible count, so a voter suspended after voting
        // (or a non-student account) cannot push turnout past 100%.
        let voted = students
            .count_documents(
                doc! {
                    "_id": {"$in": voter_ids.clone()},
                    "role": Role::Student,
                    "is_eligible": true,
                    "year_group": year_group,
                },
                None,
            )
            .await?;
        total_eligible += eligible;
        total_voted += voted;
        turnout.push(YearGroupTurnout::new(year_group, eligible, voted));
    }

    let results = results_for_election(&election, &positions, &candidates, &students, &votes)
        .await?;
    let position_count = results.positions.len() as u64;

    Ok(Json(ElectionAnalytics {
        election_id,
        title: election.election.title,
        turnout,
        results: results.positions,
        position_count,
        total_eligible,
        total_voted,
        overall_turnout: percentage(total_voted, total_eligible),
    }))
}

/// A CSV file served as a download.
pub struct CsvDownload {
    filename: String,
    content: String,
}

impl<'r> rocket::response::Responder<'r, 'static> for CsvDownload {
    fn respond_to(self, _req: &rocket::Request<'_>) -> rocket::response::Result<'static> {
        // The BOM makes spreadsheet tools detect UTF-8.
        let body = format!("\u{feff}{}", self.content);
        Response::build()
            .header(ContentType::CSV)
            .header(Header::new(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", self.filename),
            ))
            .sized_body(body.len(), std::io::Cursor::new(body))
            .ok()
    }
}

#[get("/elections/<election_id>/export")]
#[allow(clippy::too_many_arguments)]
async fn export_results(
    token: AuthToken<Admin>,
    election_id: Id,
    elections: Coll<Election>,
    positions: Coll<Position>,
    candidates: Coll<Candidate>,
    students: Coll<StudentProfile>,
    votes: Coll<Vote>,
    logs: Coll<NewAuditLog>,
    ip: ClientIp,
) -> Result<CsvDownload> {
    let election = election_by_id(election_id, &elections).await?;
    let results = results_for_election(&election, &positions, &candidates, &students, &votes)
        .await?;

    let mut content = String::from("Position,Candidate,Year Group,Votes,Percentage\r\n");
    for position in &results.positions {
        for candidate in &position.candidates {
            // Infallible for String targets.
            let _ = writeln!(
                content,
                "{},{},{},{},{}\r",
                csv_escape(&position.title),
                csv_escape(&candidate.name),
                csv_escape(&candidate.year_group.to_string()),
                candidate.votes,
                candidate.percentage,
            );
        }
    }

    let admin = profile_by_token(&token, &students).await?;
    audit(
        &logs,
        &admin,
        AuditAction::Export,
        format!("Exported results for election: {}", election.title),
        "Election",
        Some(election_id),
        &ip,
    )
    .await?;

    Ok(CsvDownload {
        filename: format!("results_{}.csv", election_id),
        content,
    })
}

/// Quote a CSV field if it contains a delimiter, quote, or line break.
fn csv_escape(field: &str) -> String {
    if field.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// How many audit entries a single request returns.
const AUDIT_LOG_PAGE: i64 = 100;

#[get("/audit-logs?<action>")]
async fn audit_logs(
    _token: AuthToken<Admin>,
    action: Option<AuditAction>,
    logs: Coll<AuditLog>,
) -> Result<Json<Vec<AuditLogDescription>>> {
    let filter = action.map(|action| doc! {"action": action});
    let newest_first = FindOptions::builder()
        .sort(doc! {"timestamp": -1})
        .limit(AUDIT_LOG_PAGE)
        .build();
    let entries = logs
        .find(filter.unwrap_or_else(Document::new), newest_first)
        .await?
        .map_ok(Into::into)
        .try_collect()
        .await?;
    Ok(Json(entries))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mongodb::Database;
    use rocket::{
        http::Status,
        local::asynchronous::Client,
        serde::json::serde_json,
    };

    use crate::api::common::fixtures::ElectionFixture;
    use crate::model::{
        api::credentials::RegistrationRequest,
        db::{audit_log::AuditLogCore, vote::NewVote},
    };

    use super::*;

    #[backend_test(admin)]
    async fn turnout_counts_distinct_voters(client: Client, db: Database) {
        let fixture = ElectionFixture::insert(&db).await;

        // Billy votes for both positions; Casey doesn't vote at all.
        let votes = Coll::<NewVote>::from_db(&db);
        votes
            .insert_one(
                NewVote::new(
                    fixture.candidate_profile_id,
                    fixture.election_id,
                    fixture.position_id,
                    fixture.candidate_id,
                ),
                None,
            )
            .await
            .unwrap();
        let second_candidate = Coll::<Candidate>::from_db(&db)
            .insert_one(
                Candidate {
                    id: Id::new(),
                    candidate: crate::model::db::candidate::NewCandidate::example(
                        fixture.second_position_id,
                        fixture.election_id,
                        fixture.candidate_profile_id,
                    ),
                },
                None,
            )
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap()
            .into();
        votes
            .insert_one(
                NewVote::new(
                    fixture.candidate_profile_id,
                    fixture.election_id,
                    fixture.second_position_id,
                    second_candidate,
                ),
                None,
            )
            .await
            .unwrap();

        let analytics = get_analytics(&client, fixture.election_id).await;
        assert_eq!(analytics.position_count, 2);
        // Two eligible Year 10 students, one of whom voted (twice).
        assert_eq!(analytics.total_voted, 1);
        let year10 = analytics
            .turnout
            .iter()
            .find(|t| t.year_group == YearGroup::Year10)
            .unwrap();
        assert_eq!(year10.eligible, 2);
        assert_eq!(year10.voted, 1);
        assert_eq!(year10.percentage, 50.0);

        // Ineligible year groups of the election don't appear at all.
        assert!(analytics
            .turnout
            .iter()
            .all(|t| t.year_group != YearGroup::Year7));
    }

    #[backend_test(admin)]
    async fn suspended_students_not_counted_eligible(client: Client, db: Database) {
        let fixture = ElectionFixture::insert(&db).await;
        Coll::<StudentProfile>::from_db(&db)
            .update_one(
                fixture.candidate_profile_id.as_doc(),
                doc! {"$set": {"is_eligible": false}},
                None,
            )
            .await
            .unwrap();

        let analytics = get_analytics(&client, fixture.election_id).await;
        let year10 = analytics
            .turnout
            .iter()
            .find(|t| t.year_group == YearGroup::Year10)
            .unwrap();
        assert_eq!(year10.eligible, 1);
    }

    #[backend_test(admin)]
    async fn turnout_ignores_suspended_voters(client: Client, db: Database) {
        let fixture = ElectionFixture::insert(&db).await;
        Coll::<NewVote>::from_db(&db)
            .insert_one(
                NewVote::new(
                    fixture.candidate_profile_id,
                    fixture.election_id,
                    fixture.position_id,
                    fixture.candidate_id,
                ),
                None,
            )
            .await
            .unwrap();
        // Billy is suspended after voting; his vote no longer counts towards
        // turnout on either side of the ratio.
        Coll::<StudentProfile>::from_db(&db)
            .update_one(
                fixture.candidate_profile_id.as_doc(),
                doc! {"$set": {"is_eligible": false}},
                None,
            )
            .await
            .unwrap();

        let analytics = get_analytics(&client, fixture.election_id).await;
        let year10 = analytics
            .turnout
            .iter()
            .find(|t| t.year_group == YearGroup::Year10)
            .unwrap();
        assert_eq!(year10.eligible, 1);
        assert_eq!(year10.voted, 0);
        assert_eq!(year10.percentage, 0.0);
    }

    #[backend_test(observer)]
    async fn observers_can_read_analytics(client: Client, db: Database) {
        let fixture = ElectionFixture::insert(&db).await;
        let response = client
            .get(uri!(election_analytics(fixture.election_id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        // But not the export.
        let response = client
            .get(uri!(export_results(fixture.election_id)))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test(admin)]
    async fn export_is_csv_with_bom(client: Client, db: Database) {
        let fixture = ElectionFixture::insert(&db).await;
        Coll::<NewVote>::from_db(&db)
            .insert_one(
                NewVote::new(
                    fixture.candidate_profile_id,
                    fixture.election_id,
                    fixture.position_id,
                    fixture.candidate_id,
                ),
                None,
            )
            .await
            .unwrap();

        let response = client
            .get(uri!(export_results(fixture.election_id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert_eq!(response.content_type(), Some(ContentType::CSV));
        let disposition = response
            .headers()
            .get_one("Content-Disposition")
            .unwrap()
            .to_string();
        assert!(disposition.contains(&format!("results_{}.csv", fixture.election_id)));

        let body = response.into_string().await.unwrap();
        assert!(body.starts_with('\u{feff}'));
        let mut lines = body.trim_start_matches('\u{feff}').lines();
        assert_eq!(
            lines.next().unwrap().trim_end(),
            "Position,Candidate,Year Group,Votes,Percentage"
        );
        // The approved candidate's row, with the single vote at 100%.
        let billy = lines
            .find(|line| line.contains("Billy Odinga"))
            .unwrap();
        assert!(billy.starts_with("Head Student,Billy Odinga,Year 10,1,100"));
        // Unapproved candidates are not exported.
        assert!(!body.contains("Casey Wu"));

        // The export itself is audited.
        let count = Coll::<AuditLog>::from_db(&db)
            .count_documents(doc! {"action": AuditAction::Export}, None)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn fields_are_escaped() {
        assert_eq!(csv_escape("Head Student"), "Head Student");
        assert_eq!(csv_escape("Smith, Jones"), "\"Smith, Jones\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("two\nlines"), "\"two\nlines\"");
    }

    #[backend_test(admin)]
    async fn audit_logs_filter_by_action(client: Client, db: Database) {
        let admin = Coll::<StudentProfile>::from_db(&db)
            .find_one(
                doc! {"username": &RegistrationRequest::example_admin().username},
                None,
            )
            .await
            .unwrap()
            .unwrap();
        let logs = Coll::<NewAuditLog>::from_db(&db);
        for (action, description) in [
            (AuditAction::Create, "Created election: A"),
            (AuditAction::Create, "Created election: B"),
            (AuditAction::Delete, "Deleted election: A"),
        ] {
            logs.insert_one(
                AuditLogCore {
                    user_id: admin.id,
                    username: admin.username.clone(),
                    action,
                    description: description.to_string(),
                    target_kind: "Election".to_string(),
                    target_id: None,
                    ip_address: None,
                    timestamp: Utc::now(),
                },
                None,
            )
            .await
            .unwrap();
        }

        let all = list_logs(&client, "/audit-logs").await;
        assert_eq!(all.len(), 3);
        // Newest first.
        assert_eq!(all[0].description, "Deleted election: A");

        let creates = list_logs(&client, "/audit-logs?action=create").await;
        assert_eq!(creates.len(), 2);
        assert!(creates.iter().all(|e| e.action == AuditAction::Create));

        let exports = list_logs(&client, "/audit-logs?action=export").await;
        assert!(exports.is_empty());
    }

    #[backend_test(student)]
    async fn students_cannot_read_analytics(client: Client, db: Database) {
        let fixture = ElectionFixture::insert(&db).await;

        let response = client
            .get(uri!(election_analytics(fixture.election_id)))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());

        let response = client.get("/audit-logs").dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }

    async fn get_analytics(client: &Client, election_id: Id) -> ElectionAnalytics {
        let response = client
            .get(uri!(election_analytics(election_id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap()
    }

    async fn list_logs(client: &Client, path: &str) -> Vec<AuditLogDescription> {
        let response = client.get(path).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap()
    }
}
