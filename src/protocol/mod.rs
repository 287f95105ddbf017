// Protocol module - WHAT INSTANCES SAY
// Wire types exchanged with the master: instance messages, handshake
// payloads, ping replies, sync entries and instance details

mod message;
mod wire;

pub use message::{InstanceMessage, MessageTarget, ReferenceId, REPLY_SUFFIX};
pub use wire::{
    AuthAck, AuthGrant, AuthRequest, AuthSealed, AuthSyn, ClientVarsPush, DetailsListReply,
    DetailsReply, InstanceDetails, KeyExchange, NetHealthData, NetworkSyncEntry, PingResponse,
    PluginInfo, SyncDump,
};
