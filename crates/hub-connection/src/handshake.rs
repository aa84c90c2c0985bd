//! Credentialed handshake performed on every new connection.

use tracing::debug;

use harmonyctl_protocol::constants::{WS_REQUEST_TIMEOUT, cmd};
use harmonyctl_protocol::messages::PairResponse;

use crate::types::HubCredentials;
use crate::ws_client::{WsClient, WsError};

/// Presents the account credentials to the hub.
///
/// An authorization rejection becomes [`WsError::AuthFailed`]; any other
/// hub error is passed through unchanged.
pub(crate) async fn perform_handshake(
    client: &WsClient,
    credentials: &HubCredentials,
) -> Result<PairResponse, WsError> {
    let req = credentials.pair_request();
    let resp = match client
        .send_request(cmd::PAIR, Some(&req), Some(WS_REQUEST_TIMEOUT))
        .await
    {
        Ok(resp) => resp,
        Err(WsError::Hub { code: 401 | 403, message }) => {
            return Err(WsError::AuthFailed(message));
        }
        Err(e) => return Err(e),
    };

    let pair = resp.parse_data::<PairResponse>()?.unwrap_or_default();
    debug!(identity = %pair.identity, "hub accepted credentials");
    Ok(pair)
}
