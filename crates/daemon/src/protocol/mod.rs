// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-channel protocol for daemon communication.
//!
//! Wire format: UTF-8 JSON text frames over WebSocket. Requests carry a
//! `type` discriminator and a correlation `id`; replies echo the id with
//! `type = <request type> + "Response"` or `type = "error"`. Messages
//! without an `id` are push events (server → client).

mod request;
mod response;

pub use request::{ControlRequest, FolderAddPayload, FolderPathPayload};
pub use response::{
    ControlResponse, FolderInfo, HardwareInfo, PushMessage, ServerInfo,
};

use fmcp_core::CoreError;

/// Parse a client text frame into a request.
///
/// Returns the correlation id (when one could be extracted) alongside the
/// error so the caller can address the error reply.
pub fn parse_request(text: &str) -> Result<ControlRequest, (Option<String>, CoreError)> {
    match serde_json::from_str::<ControlRequest>(text) {
        Ok(request) => Ok(request),
        Err(e) => {
            let id = serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string));
            Err((id, CoreError::protocol(format!("invalid request: {e}"))))
        }
    }
}
