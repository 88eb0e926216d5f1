//! User service clients: approver lookups and till assignment.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kassa_core::{ApproverProfile, CoreError, CoreResult, TillAssigner, UserDirectory};
use serde::Deserialize;
use tonic::transport::Channel;
use tracing::{debug, warn};

use super::grpc::{self, UpdateTillRequest, UpdateTillResponse, UserRequest, UserResponse};

const SERVICE: &str = "user";

/// The fields of the user document an approval needs.
#[derive(Debug, Deserialize)]
struct UserDetails {
    username: String,
    #[serde(default)]
    cash_rollups: bool,
    #[serde(default)]
    token: String,
    /// Expiry of `token`
    token_date: Option<DateTime<Utc>>,
}

impl From<UserDetails> for ApproverProfile {
    fn from(details: UserDetails) -> Self {
        ApproverProfile {
            username: details.username,
            cash_rollups: details.cash_rollups,
            token: details.token,
            // a user without a token date holds no live token
            token_expires: details.token_date.unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }
}

fn parse_user(raw: &str) -> CoreResult<ApproverProfile> {
    serde_json::from_str::<UserDetails>(raw)
        .map(ApproverProfile::from)
        .map_err(|e| CoreError::upstream(SERVICE, format!("undecodable user document: {}", e)))
}

/// `user.UserService` client.
pub struct UserServiceClient {
    channel: Channel,
    timeout: Duration,
}

impl UserServiceClient {
    pub fn new(channel: Channel, timeout: Duration) -> Self {
        UserServiceClient { channel, timeout }
    }
}

#[async_trait]
impl UserDirectory for UserServiceClient {
    async fn approver(&self, username: &str) -> CoreResult<ApproverProfile> {
        let request = UserRequest {
            username: username.to_string(),
        };
        let response: UserResponse = grpc::unary(self.channel.clone(), grpc::FETCH_USER, request, self.timeout)
            .await
            .map_err(|status| {
                warn!(username, code = ?status.code(), "FetchUser failed");
                CoreError::upstream(SERVICE, status.message())
            })?;

        debug!(username, "Fetched user");
        parse_user(&response.user_details)
    }
}

/// `user.TillService` client.
pub struct TillServiceClient {
    channel: Channel,
    timeout: Duration,
}

impl TillServiceClient {
    pub fn new(channel: Channel, timeout: Duration) -> Self {
        TillServiceClient { channel, timeout }
    }
}

#[async_trait]
impl TillAssigner for TillServiceClient {
    async fn assign(&self, teller: &str, till_no: i64) -> CoreResult<()> {
        let request = UpdateTillRequest {
            username: teller.to_string(),
            till_num: till_no,
        };
        let response: UpdateTillResponse =
            grpc::unary(self.channel.clone(), grpc::UPDATE_TILL, request, self.timeout)
                .await
                .map_err(|status| {
                    warn!(teller, till_no, code = ?status.code(), "UpdateTill failed");
                    CoreError::upstream(SERVICE, status.message())
                })?;

        debug!(teller, till_no, response = %response.response, "Till assigned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_document() {
        let raw = r#"{
            "username": "otieno",
            "first_name": "Otieno",
            "cash_rollups": true,
            "token": "4821",
            "token_date": "2026-10-16T09:30:00Z"
        }"#;
        let profile = parse_user(raw).unwrap();
        assert_eq!(profile.username, "otieno");
        assert!(profile.cash_rollups);
        assert_eq!(profile.token, "4821");
        assert_eq!(profile.token_expires.to_rfc3339(), "2026-10-16T09:30:00+00:00");
    }

    #[test]
    fn test_user_without_token_date_has_expired_token() {
        let profile = parse_user(r#"{"username": "otieno"}"#).unwrap();
        assert!(profile.token_expires < Utc::now());
        assert!(!profile.cash_rollups);
    }

    #[test]
    fn test_garbage_is_upstream() {
        let err = parse_user("<html>").unwrap_err();
        assert!(matches!(err, CoreError::Upstream { .. }));
    }
}
