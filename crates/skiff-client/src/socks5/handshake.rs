use std::net::{Ipv4Addr, Ipv6Addr};

use skiff_proto::{ATYP_DOMAIN, ATYP_IPV4, ATYP_IPV6, Address, CMD_CONNECT, Host};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::Socks5Error;

const SOCKS5_VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_NO_ACCEPTABLE: u8 = 0xFF;

pub const REPLY_SUCCEEDED: u8 = 0x00;
pub const REPLY_GENERAL_FAILURE: u8 = 0x01;
pub const REPLY_NETWORK_UNREACHABLE: u8 = 0x03;
pub const REPLY_HOST_UNREACHABLE: u8 = 0x04;
pub const REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;
pub const REPLY_ADDRESS_TYPE_NOT_SUPPORTED: u8 = 0x08;

/// Run method selection and read a CONNECT request.
///
/// On an unsupported command or address type the matching failure reply is
/// written before the error is returned. The success reply is left to the
/// caller, who only knows the outcome once the tunnel stream is open.
pub async fn accept_connect<S>(stream: &mut S) -> Result<Address, Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    negotiate_method(stream).await?;

    // VER CMD RSV ATYP
    let mut header = [0u8; 4];
    stream
        .read_exact(&mut header)
        .await
        .map_err(|_| Socks5Error::Truncated)?;
    if header[0] != SOCKS5_VERSION {
        return Err(Socks5Error::InvalidVersion(header[0]));
    }
    let (command, atyp) = (header[1], header[3]);

    let address = match read_address(stream, atyp).await {
        Ok(address) => address,
        Err(e @ (Socks5Error::UnsupportedAddressType(_) | Socks5Error::InvalidDomain)) => {
            let _ = send_reply(stream, REPLY_ADDRESS_TYPE_NOT_SUPPORTED).await;
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    if command != CMD_CONNECT {
        let _ = send_reply(stream, REPLY_COMMAND_NOT_SUPPORTED).await;
        return Err(Socks5Error::UnsupportedCommand(command));
    }
    Ok(address)
}

async fn negotiate_method<S>(stream: &mut S) -> Result<(), Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = [0u8; 2];
    stream
        .read_exact(&mut header)
        .await
        .map_err(|_| Socks5Error::Truncated)?;
    if header[0] != SOCKS5_VERSION {
        return Err(Socks5Error::InvalidVersion(header[0]));
    }

    let mut methods = vec![0u8; header[1] as usize];
    stream
        .read_exact(&mut methods)
        .await
        .map_err(|_| Socks5Error::Truncated)?;

    if !methods.contains(&METHOD_NO_AUTH) {
        let _ = stream
            .write_all(&[SOCKS5_VERSION, METHOD_NO_ACCEPTABLE])
            .await;
        return Err(Socks5Error::NoAcceptableMethods);
    }
    stream
        .write_all(&[SOCKS5_VERSION, METHOD_NO_AUTH])
        .await
        .map_err(|_| Socks5Error::Truncated)
}

async fn read_address<S>(stream: &mut S, atyp: u8) -> Result<Address, Socks5Error>
where
    S: AsyncRead + Unpin,
{
    let host = match atyp {
        ATYP_IPV4 => {
            let mut ip = [0u8; 4];
            read_exact(stream, &mut ip).await?;
            Host::Ipv4(Ipv4Addr::from(ip))
        }
        ATYP_IPV6 => {
            let mut ip = [0u8; 16];
            read_exact(stream, &mut ip).await?;
            Host::Ipv6(Ipv6Addr::from(ip))
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            read_exact(stream, &mut len).await?;
            let mut domain = vec![0u8; len[0] as usize];
            read_exact(stream, &mut domain).await?;
            if domain.is_empty() {
                return Err(Socks5Error::InvalidDomain);
            }
            Host::Domain(String::from_utf8(domain).map_err(|_| Socks5Error::InvalidDomain)?)
        }
        other => return Err(Socks5Error::UnsupportedAddressType(other)),
    };
    let mut port = [0u8; 2];
    read_exact(stream, &mut port).await?;
    Ok(Address {
        host,
        port: u16::from_be_bytes(port),
    })
}

async fn read_exact<S>(stream: &mut S, buf: &mut [u8]) -> Result<(), Socks5Error>
where
    S: AsyncRead + Unpin,
{
    stream
        .read_exact(buf)
        .await
        .map(|_| ())
        .map_err(|_| Socks5Error::Truncated)
}

/// Send a reply with a zeroed IPv4 bind address.
pub async fn send_reply<S>(stream: &mut S, reply: u8) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(&[SOCKS5_VERSION, reply, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0])
        .await
}
