//! Wire protocol shared by the extension, the native host and the bridge.

pub mod bridge;
pub mod codec;
pub mod message;
pub mod request_id;

pub use bridge::{BridgeReply, StatusReply};
pub use codec::{encode_message, read_frame, write_frame, FrameDecoder};
pub use message::{Action, AppStatus, Credential, Message};
pub use request_id::RequestIdGenerator;

/// Largest frame accepted on the stdio channel (1 MiB)
pub const HOST_MAX_FRAME: usize = 1024 * 1024;

/// Largest request body accepted by the bridge server (64 KiB)
pub const BRIDGE_MAX_BODY: usize = 64 * 1024;

/// First loopback port the bridge tries to bind
pub const DEFAULT_BRIDGE_PORT: u16 = 17865;

/// Number of consecutive ports tried before the bridge gives up
pub const DEFAULT_PORT_ATTEMPTS: u16 = 10;

/// Header asserting the caller is the native messaging host
pub const NATIVE_HOST_HEADER: &str = "x-vaultlink-native-host";

/// Value expected in [`NATIVE_HOST_HEADER`]
pub const NATIVE_HOST_IDENTITY: &str = "com.vaultlink.native_host";

/// Unauthenticated liveness endpoint
pub const STATUS_PATH: &str = "/api/status";

/// Endpoint receiving bridged native messages
pub const NATIVE_MESSAGE_PATH: &str = "/api/native-message";
