//! Wire messages and the unary call shared by the remote clients.
//!
//! The user and inventory services speak a thin protobuf envelope around
//! JSON documents, so the messages are declared here with `prost` derives
//! instead of being generated from `.proto` files.

use std::time::Duration;

use http::uri::PathAndQuery;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::transport::Channel;
use tonic::{Request, Status};

// =============================================================================
// Paths
// =============================================================================

pub const FETCH_USER: &str = "/user.UserService/FetchUser";
pub const UPDATE_TILL: &str = "/user.TillService/UpdateTill";
pub const SEARCH_PRODUCT: &str = "/inventory.InventoryService/SearchProduct";

// =============================================================================
// Messages
// =============================================================================

#[derive(Clone, PartialEq, prost::Message)]
pub struct UserRequest {
    #[prost(string, tag = "1")]
    pub username: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UserResponse {
    /// JSON user document
    #[prost(string, tag = "1")]
    pub user_details: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateTillRequest {
    #[prost(string, tag = "1")]
    pub username: String,
    #[prost(int64, tag = "2")]
    pub till_num: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateTillResponse {
    #[prost(string, tag = "1")]
    pub response: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SearchRequest {
    /// JSON query, e.g. `{"item_code": "SKU1"}`
    #[prost(string, tag = "1")]
    pub query_string: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SearchResponse {
    /// JSON product document
    #[prost(string, tag = "1")]
    pub result: String,
}

// =============================================================================
// Unary Call
// =============================================================================

/// Sends one request on `channel` and waits for its reply.
pub async fn unary<Req, Resp>(
    channel: Channel,
    path: &'static str,
    message: Req,
    timeout: Duration,
) -> Result<Resp, Status>
where
    Req: prost::Message + Send + Sync + 'static,
    Resp: prost::Message + Default + Send + Sync + 'static,
{
    let mut client = Grpc::new(channel);
    client
        .ready()
        .await
        .map_err(|e| Status::unavailable(format!("Service was not ready: {}", e)))?;

    let mut request = Request::new(message);
    request.set_timeout(timeout);

    let codec: ProstCodec<Req, Resp> = ProstCodec::default();
    let response = client
        .unary(request, PathAndQuery::from_static(path), codec)
        .await?;
    Ok(response.into_inner())
}
