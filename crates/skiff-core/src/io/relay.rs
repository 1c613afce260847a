//! Bidirectional byte pump between a local connection and a tunnel stream.
//!
//! Each direction is driven as an independent poll-based state machine within
//! a single future, so back-pressure on one direction never stalls the other.
//! There is no idle timeout here: liveness belongs to the transport session.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Bytes moved by a finished relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Local -> tunnel.
    pub uploaded: u64,
    /// Tunnel -> local.
    pub downloaded: u64,
}

enum CopyState {
    Reading,
    Writing(usize, usize), // (pos, len)
    Flushing(usize),
    ShuttingDown,
    Done,
}

enum CopyPoll {
    Flushed(usize),
    Finished,
}

fn poll_copy_direction<R, W>(
    cx: &mut Context<'_>,
    reader: &mut R,
    writer: &mut W,
    buf: &mut [u8],
    state: &mut CopyState,
) -> Poll<io::Result<CopyPoll>>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    loop {
        match state {
            CopyState::Reading => {
                let mut read_buf = ReadBuf::new(buf);
                match Pin::new(&mut *reader).poll_read(cx, &mut read_buf) {
                    Poll::Ready(Ok(())) => {
                        let n = read_buf.filled().len();
                        *state = if n == 0 {
                            CopyState::ShuttingDown
                        } else {
                            CopyState::Writing(0, n)
                        };
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            CopyState::Writing(pos, len) => {
                match Pin::new(&mut *writer).poll_write(cx, &buf[*pos..*len]) {
                    Poll::Ready(Ok(0)) => {
                        return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
                    }
                    Poll::Ready(Ok(n)) => {
                        *pos += n;
                        if *pos >= *len {
                            *state = CopyState::Flushing(*len);
                        }
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            CopyState::Flushing(bytes) => {
                let bytes = *bytes;
                match Pin::new(&mut *writer).poll_flush(cx) {
                    Poll::Ready(Ok(())) => {
                        *state = CopyState::Reading;
                        return Poll::Ready(Ok(CopyPoll::Flushed(bytes)));
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            // A peer that already went away cannot refuse our half-close.
            CopyState::ShuttingDown => match Pin::new(&mut *writer).poll_shutdown(cx) {
                Poll::Ready(_) => {
                    *state = CopyState::Done;
                    return Poll::Ready(Ok(CopyPoll::Finished));
                }
                Poll::Pending => return Poll::Pending,
            },
            CopyState::Done => return Poll::Ready(Ok(CopyPoll::Finished)),
        }
    }
}

/// Pump bytes between `local` and `tunnel` until both directions reach EOF.
///
/// EOF on one side is forwarded as a half-close to the other. The first I/O
/// error from either direction aborts the relay and is returned as-is, so a
/// reset tunnel stream surfaces to the caller as an error rather than a
/// clean close.
pub async fn relay_bidirectional<A, B>(
    local: A,
    tunnel: B,
    buffer_size: usize,
) -> io::Result<RelayStats>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut local_r, mut local_w) = tokio::io::split(local);
    let (mut tunnel_r, mut tunnel_w) = tokio::io::split(tunnel);

    let mut up_buf = vec![0u8; buffer_size];
    let mut down_buf = vec![0u8; buffer_size];
    let mut up_state = CopyState::Reading;
    let mut down_state = CopyState::Reading;
    let mut up_done = false;
    let mut down_done = false;
    let mut stats = RelayStats::default();

    std::future::poll_fn(|cx| {
        loop {
            let mut progressed = false;

            if !up_done {
                match poll_copy_direction(
                    cx,
                    &mut local_r,
                    &mut tunnel_w,
                    &mut up_buf,
                    &mut up_state,
                ) {
                    Poll::Ready(Ok(CopyPoll::Flushed(n))) => {
                        stats.uploaded += n as u64;
                        progressed = true;
                    }
                    Poll::Ready(Ok(CopyPoll::Finished)) => {
                        up_done = true;
                        progressed = true;
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => {}
                }
            }

            if !down_done {
                match poll_copy_direction(
                    cx,
                    &mut tunnel_r,
                    &mut local_w,
                    &mut down_buf,
                    &mut down_state,
                ) {
                    Poll::Ready(Ok(CopyPoll::Flushed(n))) => {
                        stats.downloaded += n as u64;
                        progressed = true;
                    }
                    Poll::Ready(Ok(CopyPoll::Finished)) => {
                        down_done = true;
                        progressed = true;
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => {}
                }
            }

            if up_done && down_done {
                return Poll::Ready(Ok(stats));
            }
            if !progressed {
                return Poll::Pending;
            }
        }
    })
    .await
}
