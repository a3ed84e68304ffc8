//! services/api/src/web/protocol.rs
//!
//! Messages exchanged on the package updates WebSocket.

use serde::{Deserialize, Serialize};

use crate::web::packages::PackageListResponse;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Asks for a fresh snapshot without waiting for a change.
    Refresh,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The full package list of the report. Sent on connect and after every change.
    Snapshot { packages: PackageListResponse },

    /// A refresh failed. The connection stays open and later changes still arrive.
    Error { message: String },
}
