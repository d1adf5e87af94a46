use std::net::SocketAddr;

use aws_sdk_sns::Client as SnsClient;
use chrono::Utc;
use mongodb::bson::doc;
use mongodb::options::{FindOneAndUpdateOptions, FindOneOptions, ReturnDocument};
use rocket::{serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    messaging::{DeliveryError, Mailer},
    model::{
        api::otp::{OtpIssueRequest, OtpIssueResponse, OtpVerifyRequest, OtpVerifyResponse},
        db::{
            audit::{self, AuditEvent, AuditLogEntryCore, NewAuditLogEntry},
            otp_request::{NewOtpRequest, OtpRequest, OtpRequestCore},
            voter::Voter,
        },
        mongodb::Coll,
        otp::Code,
    },
    Config,
};

#[cfg(not(test))]
use crate::messaging;

pub fn routes() -> Vec<Route> {
    routes![request_otp, verify_otp]
}

/// Issue a fresh OTP code and dispatch it over the requested channel(s).
///
/// The request row is persisted before dispatch is attempted, so the rate
/// limit and attempt budgets always count real issuances. Success means at
/// least one requested channel delivered.
#[cfg_attr(test, allow(unused_variables))]
#[post("/otp/request", data = "<request>", format = "json")]
async fn request_otp(
    request: Json<OtpIssueRequest>,
    remote: SocketAddr,
    config: &State<Config>,
    sender: &State<SnsClient>,
    mailer: &State<Mailer>,
    voters: Coll<Voter>,
    otp_requests: Coll<OtpRequest>,
    new_otp_requests: Coll<NewOtpRequest>,
    audit_log: Coll<NewAuditLogEntry>,
) -> Result<Json<OtpIssueResponse>> {
    let request = request.into_inner();
    let client_addr = remote.ip().to_string();

    // The identity provider vouches for the ID, but the voter must exist.
    voters
        .find_one(request.voter_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Voter with ID '{}'", request.voter_id)))?;

    // The requested channel must come with somewhere to send to.
    let email = match (request.channel.wants_email(), &request.email) {
        (true, None) => {
            return Err(Error::BadRequest(
                "Channel includes email but no email address was supplied".to_string(),
            ))
        }
        (true, Some(address)) => Some(address.clone()),
        (false, _) => None,
    };
    let phone = match (request.channel.wants_sms(), &request.phone) {
        (true, None) => {
            return Err(Error::BadRequest(
                "Channel includes SMS but no phone number was supplied".to_string(),
            ))
        }
        (true, Some(number)) => Some(number.clone()),
        (false, _) => None,
    };

    // Sliding-window rate limit, counted against stored issuance rows so it
    // holds across server instances.
    let window_start = Utc::now() - config.otp_rate_window();
    let recent = otp_requests
        .count_documents(
            doc! {
                "voter_id": request.voter_id,
                "created_at": { "$gt": mongodb::bson::DateTime::from_chrono(window_start) },
            },
            None,
        )
        .await?;
    if recent >= u64::from(config.otp_rate_limit()) {
        audit::record(
            &audit_log,
            AuditLogEntryCore::new(
                AuditEvent::OtpFailed,
                request.voter_id,
                client_addr,
                doc! { "reason": "rate_limited" },
            ),
        )
        .await;
        return Err(Error::RateLimited);
    }

    // Generate and persist before dispatch: the row must exist whatever the
    // messaging providers do.
    let code = Code::random();
    let otp_request = OtpRequestCore::new(request.voter_id, &code, request.channel, config);
    new_otp_requests.insert_one(&otp_request, None).await?;

    // Fan out to the requested channels; each is independently fallible and
    // a timeout counts as that channel failing. Test builds skip dispatch.
    let mut email_result: Option<std::result::Result<(), DeliveryError>> = None;
    let mut sms_result: Option<std::result::Result<(), DeliveryError>> = None;
    if let Some(address) = &email {
        #[cfg(not(test))]
        {
            email_result = Some(
                mailer
                    .send(
                        address,
                        "Your voting code",
                        &format!(
                            "<p>Your voting code is <strong>{code}</strong>. \
                             It expires in {} minutes.</p>",
                            config.otp_ttl().num_minutes()
                        ),
                    )
                    .await,
            );
        }
        #[cfg(test)]
        {
            email_result = Some(Ok(()));
        }
    }
    if let Some(number) = &phone {
        #[cfg(not(test))]
        {
            sms_result =
                Some(messaging::send_sms(sender, number, &format!("Your voting code: {code}")).await);
        }
        #[cfg(test)]
        {
            sms_result = Some(Ok(()));
        }
    }

    let email_delivered = email_result.as_ref().map(|result| result.is_ok());
    let sms_delivered = sms_result.as_ref().map(|result| result.is_ok());

    audit::record(
        &audit_log,
        AuditLogEntryCore::new(
            AuditEvent::OtpIssued,
            request.voter_id,
            client_addr,
            doc! {
                "channel": request.channel,
                "email_delivered": email_delivered,
                "sms_delivered": sms_delivered,
            },
        ),
    )
    .await;

    if !email_delivered.unwrap_or(false) && !sms_delivered.unwrap_or(false) {
        return Err(Error::DeliveryFailed {
            email: email_result.and_then(|result| result.err().map(|err| err.to_string())),
            sms: sms_result.and_then(|result| result.err().map(|err| err.to_string())),
        });
    }

    Ok(Json(OtpIssueResponse {
        email_delivered,
        sms_delivered,
        #[cfg(test)]
        code: code.to_string(),
    }))
}

/// Verify a submitted code against the voter's most recent pending request.
///
/// Every call past the expiry and exhaustion gates consumes one attempt,
/// whether or not the code turns out to be correct; the increment is guarded
/// so concurrent guesses cannot overspend the budget.
#[post("/otp/verify", data = "<submission>", format = "json")]
async fn verify_otp(
    submission: Json<OtpVerifyRequest>,
    remote: SocketAddr,
    config: &State<Config>,
    voters: Coll<Voter>,
    otp_requests: Coll<OtpRequest>,
    audit_log: Coll<NewAuditLogEntry>,
) -> Result<Json<OtpVerifyResponse>> {
    let submission = submission.into_inner();
    let client_addr = remote.ip().to_string();

    // Fail fast on malformed codes, before touching storage.
    let code = submission
        .code
        .parse::<Code>()
        .map_err(|err| Error::InvalidFormat(err.to_string()))?;

    // Only the most recent unverified request is eligible for matching;
    // `_id` breaks creation-time ties deterministically.
    let options = FindOneOptions::builder()
        .sort(doc! { "created_at": -1, "_id": -1 })
        .build();
    let pending = otp_requests
        .find_one(
            doc! { "voter_id": submission.voter_id, "verified": false },
            options,
        )
        .await?
        .ok_or(Error::NoPendingRequest)?;

    if pending.expired_at(Utc::now()) {
        audit::record(
            &audit_log,
            AuditLogEntryCore::new(
                AuditEvent::OtpFailed,
                submission.voter_id,
                client_addr,
                doc! { "reason": "expired" },
            ),
        )
        .await;
        return Err(Error::Expired);
    }

    if pending.attempts_exhausted() {
        audit::record(
            &audit_log,
            AuditLogEntryCore::new(
                AuditEvent::OtpFailed,
                submission.voter_id,
                client_addr,
                doc! { "reason": "attempts_exceeded" },
            ),
        )
        .await;
        return Err(Error::AttemptsExceeded);
    }

    // Consume one attempt before comparing. The `$lt` guard makes the
    // increment atomic against concurrent verification calls, so parallel
    // guessing cannot bypass the budget.
    let update_options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let pending = match otp_requests
        .find_one_and_update(
            doc! { "_id": pending.id, "attempts": { "$lt": pending.max_attempts } },
            doc! { "$inc": { "attempts": 1 } },
            update_options,
        )
        .await?
    {
        Some(request) => request,
        None => {
            // Lost the guard race: the budget was spent by concurrent calls.
            audit::record(
                &audit_log,
                AuditLogEntryCore::new(
                    AuditEvent::OtpFailed,
                    submission.voter_id,
                    client_addr,
                    doc! { "reason": "attempts_exceeded" },
                ),
            )
            .await;
            return Err(Error::AttemptsExceeded);
        }
    };

    if !pending.matches(&code, config.hmac_secret()) {
        let remaining = pending.remaining_attempts();
        audit::record(
            &audit_log,
            AuditLogEntryCore::new(
                AuditEvent::OtpFailed,
                submission.voter_id,
                client_addr,
                doc! { "reason": "invalid_code", "remaining_attempts": remaining },
            ),
        )
        .await;
        return Err(Error::InvalidCode {
            remaining_attempts: remaining,
        });
    }

    // Correct code: retire the request and mark the voter verified.
    otp_requests
        .update_one(
            pending.id.as_doc(),
            doc! { "$set": { "verified": true } },
            None,
        )
        .await?;
    voters
        .update_one(
            submission.voter_id.as_doc(),
            doc! { "$set": { "verified": true } },
            None,
        )
        .await?;

    audit::record(
        &audit_log,
        AuditLogEntryCore::new(
            AuditEvent::OtpVerified,
            submission.voter_id,
            client_addr,
            doc! { "channel": pending.channel },
        ),
    )
    .await;

    Ok(Json(OtpVerifyResponse { verified: true }))
}

#[cfg(test)]
mod tests {
    use mongodb::bson::DateTime as BsonDateTime;
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::{serde_json::json, Value},
    };

    use crate::model::{common::channel::DeliveryChannel, db::voter::NewVoter, mongodb::Id, sms::Sms};

    use super::*;

    async fn insert_voter(voters: &Coll<NewVoter>) -> Id {
        voters
            .insert_one(NewVoter::example(), None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap()
            .into()
    }

    async fn issue(client: &Client, voter_id: Id) -> OtpIssueResponse {
        let response = client
            .post(uri!(request_otp))
            .header(ContentType::JSON)
            .body(
                json!({
                    "voter_id": voter_id,
                    "channel": "email",
                    "email": "alice@example.com",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        response.into_json().await.unwrap()
    }

    async fn submit<'c>(
        client: &'c Client,
        voter_id: Id,
        code: &str,
    ) -> rocket::local::asynchronous::LocalResponse<'c> {
        client
            .post(uri!(verify_otp))
            .header(ContentType::JSON)
            .body(json!({ "voter_id": voter_id, "code": code }).to_string())
            .dispatch()
            .await
    }

    #[backend_test]
    async fn issue_and_verify(
        client: Client,
        voters: Coll<NewVoter>,
        voter_rows: Coll<Voter>,
        requests: Coll<OtpRequest>,
    ) {
        let voter_id = insert_voter(&voters).await;

        let issued = issue(&client, voter_id).await;
        assert_eq!(Some(true), issued.email_delivered);
        assert_eq!(None, issued.sms_delivered);

        // The row stores a salted hash, never the plaintext code.
        let stored = requests
            .find_one(doc! { "voter_id": voter_id }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(DeliveryChannel::Email, stored.channel);
        assert_eq!(0, stored.attempts);
        assert!(!stored.verified);
        assert!(!stored.salt.is_empty());

        let response = submit(&client, voter_id, &issued.code).await;
        assert_eq!(Status::Ok, response.status());

        // Both the request and the voter are now marked verified.
        let stored = requests
            .find_one(doc! { "voter_id": voter_id }, None)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.verified);
        assert_eq!(1, stored.attempts);

        let voter = voter_rows
            .find_one(voter_id.as_doc(), None)
            .await
            .unwrap()
            .unwrap();
        assert!(voter.verified);

        // Verifying again finds no pending request: the terminal state.
        let response = submit(&client, voter_id, &issued.code).await;
        assert_eq!(Status::NotFound, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!("no_pending_request", body["error"]);
    }

    #[backend_test]
    async fn wrong_code_consumes_attempts(client: Client, voters: Coll<NewVoter>) {
        let voter_id = insert_voter(&voters).await;
        let issued = issue(&client, voter_id).await;

        // A wrong code that can never collide with the real one.
        let wrong = wrong_code(&issued.code);

        for expected_remaining in [2, 1, 0] {
            let response = submit(&client, voter_id, &wrong).await;
            assert_eq!(Status::Unauthorized, response.status());
            let body: Value = response.into_json().await.unwrap();
            assert_eq!("invalid_code", body["error"]);
            assert_eq!(expected_remaining, body["remaining_attempts"]);
        }

        // Budget spent: even the correct code is now rejected.
        let response = submit(&client, voter_id, &issued.code).await;
        assert_eq!(Status::Unauthorized, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!("attempts_exceeded", body["error"]);
    }

    #[backend_test]
    async fn expired_code_is_rejected(
        client: Client,
        voters: Coll<NewVoter>,
        requests: Coll<OtpRequest>,
    ) {
        let voter_id = insert_voter(&voters).await;
        let issued = issue(&client, voter_id).await;

        // Push the request past its expiry.
        requests
            .update_one(
                doc! { "voter_id": voter_id },
                doc! { "$set": { "expires_at": BsonDateTime::from_chrono(Utc::now() - chrono::Duration::seconds(1)) } },
                None,
            )
            .await
            .unwrap();

        let response = submit(&client, voter_id, &issued.code).await;
        assert_eq!(Status::Unauthorized, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!("expired", body["error"]);

        // Expiry does not consume attempts.
        let stored = requests
            .find_one(doc! { "voter_id": voter_id }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(0, stored.attempts);
    }

    #[backend_test]
    async fn malformed_codes_fail_fast(client: Client, voters: Coll<NewVoter>) {
        let voter_id = insert_voter(&voters).await;

        for bad in ["123", "1234567", "12a456", ""] {
            let response = submit(&client, voter_id, bad).await;
            assert_eq!(Status::BadRequest, response.status());
            let body: Value = response.into_json().await.unwrap();
            assert_eq!("invalid_format", body["error"]);
        }
    }

    #[backend_test]
    async fn verify_without_issuance(client: Client, voters: Coll<NewVoter>) {
        let voter_id = insert_voter(&voters).await;

        let response = submit(&client, voter_id, "123456").await;
        assert_eq!(Status::NotFound, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!("no_pending_request", body["error"]);
    }

    #[backend_test]
    async fn resend_supersedes_previous_code(client: Client, voters: Coll<NewVoter>) {
        let voter_id = insert_voter(&voters).await;

        let first = issue(&client, voter_id).await;
        let second = issue(&client, voter_id).await;

        // Codes could theoretically collide; skip the superseded check then.
        if first.code != second.code {
            let response = submit(&client, voter_id, &first.code).await;
            assert_eq!(Status::Unauthorized, response.status());
            let body: Value = response.into_json().await.unwrap();
            assert_eq!("invalid_code", body["error"]);
        }

        let response = submit(&client, voter_id, &second.code).await;
        assert_eq!(Status::Ok, response.status());
    }

    #[backend_test]
    async fn issuance_rate_limited(
        client: Client,
        voters: Coll<NewVoter>,
        requests: Coll<OtpRequest>,
    ) {
        let voter_id = insert_voter(&voters).await;

        for _ in 0..5 {
            issue(&client, voter_id).await;
        }

        // The 6th inside the window is rejected and leaves no new row.
        let response = client
            .post(uri!(request_otp))
            .header(ContentType::JSON)
            .body(
                json!({
                    "voter_id": voter_id,
                    "channel": "email",
                    "email": "alice@example.com",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::TooManyRequests, response.status());
        let count = requests
            .count_documents(doc! { "voter_id": voter_id }, None)
            .await
            .unwrap();
        assert_eq!(5, count);

        // Slide the window forward past the old requests; issuance works again.
        requests
            .update_many(
                doc! { "voter_id": voter_id },
                doc! { "$set": { "created_at": BsonDateTime::from_chrono(Utc::now() - chrono::Duration::hours(2)) } },
                None,
            )
            .await
            .unwrap();
        issue(&client, voter_id).await;
    }

    #[backend_test]
    async fn channel_requires_matching_contact(client: Client, voters: Coll<NewVoter>) {
        let voter_id = insert_voter(&voters).await;

        // SMS channel without a phone number.
        let response = client
            .post(uri!(request_otp))
            .header(ContentType::JSON)
            .body(json!({ "voter_id": voter_id, "channel": "sms" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        // Both channels need both addresses.
        let response = client
            .post(uri!(request_otp))
            .header(ContentType::JSON)
            .body(
                json!({
                    "voter_id": voter_id,
                    "channel": "both",
                    "phone": Sms::example(),
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test]
    async fn unknown_voter_is_rejected(client: Client) {
        let response = client
            .post(uri!(request_otp))
            .header(ContentType::JSON)
            .body(
                json!({
                    "voter_id": Id::new(),
                    "channel": "email",
                    "email": "alice@example.com",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }

    /// A code guaranteed to differ from `code` in its first digit.
    fn wrong_code(code: &str) -> String {
        let flipped = if code.starts_with('0') { '1' } else { '0' };
        format!("{flipped}{}", &code[1..])
    }
}
