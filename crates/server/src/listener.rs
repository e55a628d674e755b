//! TCP accept loop with a graceful shutdown channel.

use crate::dispatcher::Dispatcher;
use common::GodisError;
use protocol::{BincodeCodec, Codec, frame};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

/// Binds a TCP socket and drives the accept loop. Each accepted connection
/// runs as its own task; signalling `shutdown` stops new accepts and lets
/// in-flight connection tasks drain on their next socket error or clean
/// close — there is no active cancellation of in-flight requests.
pub struct Listener {
    listener: TcpListener,
    dispatcher: Dispatcher,
    max_frame_bytes: u32,
}

impl Listener {
    pub async fn bind(
        addr: &str,
        dispatcher: Dispatcher,
        max_frame_bytes: u32,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            dispatcher,
            max_frame_bytes,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs until `shutdown` is signalled. Transient accept errors are
    /// logged and the loop continues; a persistent accept failure (the
    /// listening socket itself breaking) terminates the loop.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("listener shutting down");
                        break;
                    }
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((socket, peer)) => {
                            let dispatcher = self.dispatcher.clone();
                            let max_frame_bytes = self.max_frame_bytes;
                            tokio::spawn(async move {
                                if let Err(err) = handle_connection(socket, dispatcher, max_frame_bytes).await {
                                    tracing::warn!(peer = %peer, error = %err, "connection ended with an error");
                                }
                            });
                        }
                        Err(err) if is_permanent(&err) => {
                            tracing::error!(error = %err, "listener accept failed permanently");
                            break;
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "transient accept error");
                        }
                    }
                }
            }
        }
    }
}

/// Classifies an accept error as unrecoverable. Most `io::Error`s returned
/// by `accept()` describe a single failed connection attempt and the loop
/// should continue; a handful indicate the listening socket itself is
/// unusable.
fn is_permanent(err: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(err.kind(), InvalidInput | NotConnected | Unsupported)
}

/// Drives one connection's request/response loop: read a framed request,
/// dispatch it, write the framed response, repeat until clean EOF or any
/// read, decode, or write error. A decode error closes the connection
/// rather than replying — it indicates the frame boundary can no longer
/// be trusted to align with the codec.
async fn handle_connection(
    mut socket: TcpStream,
    dispatcher: Dispatcher,
    max_frame_bytes: u32,
) -> Result<(), GodisError> {
    let codec = BincodeCodec;
    loop {
        let payload = match frame::read_message_async(&mut socket, max_frame_bytes).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return Ok(()),
            Err(err) => return Err(GodisError::Io(err)),
        };

        let request = codec.unmarshal(&payload)?;

        let response = dispatcher.dispatch(request).await;
        let bytes = codec.marshal(&response)?;
        frame::write_message_async(&mut socket, &bytes)
            .await
            .map_err(GodisError::Io)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_errors_are_classified_correctly() {
        use std::io::{Error, ErrorKind};
        assert!(is_permanent(&Error::from(ErrorKind::InvalidInput)));
        assert!(!is_permanent(&Error::from(ErrorKind::ConnectionReset)));
        assert!(!is_permanent(&Error::from(ErrorKind::WouldBlock)));
    }
}
