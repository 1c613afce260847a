//! Server side of SOCKS5 (RFC 1928), CONNECT only, no authentication.

mod handshake;

pub use handshake::{
    REPLY_ADDRESS_TYPE_NOT_SUPPORTED, REPLY_COMMAND_NOT_SUPPORTED, REPLY_GENERAL_FAILURE,
    REPLY_HOST_UNREACHABLE, REPLY_NETWORK_UNREACHABLE, REPLY_SUCCEEDED, accept_connect,
    send_reply,
};
