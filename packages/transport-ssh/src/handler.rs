//! SSH client handler. Trust is established by the WebSocket bearer token
//! (spec §4.6: "auth is the WebSocket token"), so the SSH layer itself is
//! configured with dummy credentials and accepts whatever host key the
//! in-process server presents.

use async_trait::async_trait;
use russh::client::{Handler, Session};
use russh::ChannelId;
use russh_keys::key::PublicKey;

pub struct DummyClientHandler;

#[async_trait]
impl Handler for DummyClientHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn data(
        &mut self,
        _channel: ChannelId,
        _data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        Ok(())
    }
}
