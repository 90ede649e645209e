//! Unix Socket Server
//!
//! Newline-delimited JSON front end for the engine.
//!
//! # Security Features
//! - **Socket permissions**: owner and group only, symlink attack prevention
//! - **Peer credentials**: UID/GID/PID audit logging for every write request
//! - **Connection limits**: maximum concurrent connections enforced
//! - **Timeouts**: read/write timeouts prevent resource exhaustion
//! - **Message limits**: maximum message size prevents memory exhaustion
//! - **Input validation**: every request is validated before it is queued

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use tarb_protocol::{Request, RequestEnvelope, Response, ResponseEnvelope};

use crate::work_queue::WorkQueue;

// ============================================================================
// Security Constants
// ============================================================================

/// Maximum concurrent client connections
const MAX_CONNECTIONS: usize = 64;

/// Maximum message size in bytes
const MAX_MESSAGE_SIZE: usize = tarb_protocol::MAX_MESSAGE_SIZE;

/// Read timeout per message
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Write timeout per message
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Socket permissions: policy processes connect through the socket's group
const SOCKET_MODE: u32 = 0o660;

static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

async fn read_line_bounded<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
    out: &mut Vec<u8>,
    max_len: usize,
) -> std::io::Result<usize> {
    out.clear();

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(0);
        }

        let mut take_len = available.len();
        let mut found_newline = false;
        if let Some(pos) = available.iter().position(|b| *b == b'\n') {
            take_len = pos + 1;
            found_newline = true;
        }

        let remaining = max_len.saturating_sub(out.len());
        if take_len > remaining {
            let consume_len = remaining.min(available.len());
            reader.consume(consume_len);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Message too large",
            ));
        }

        out.extend_from_slice(&available[..take_len]);
        reader.consume(take_len);

        if found_newline {
            return Ok(out.len());
        }
    }
}

// ============================================================================
// Server
// ============================================================================

pub async fn run_server(socket_path: &str, queue: WorkQueue) -> anyhow::Result<()> {
    let path = Path::new(socket_path);

    if path.exists() {
        let metadata = path.symlink_metadata()?;
        if metadata.file_type().is_symlink() {
            anyhow::bail!("Socket path is a symlink - refusing for security");
        }
        std::fs::remove_file(path)?;
        debug!("Removed existing socket file");
    }

    let listener = UnixListener::bind(socket_path)?;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(SOCKET_MODE))?;

    info!("Listening on {} (mode {:o})", socket_path, SOCKET_MODE);
    info!("Limits: max_conn={}, max_msg={}", MAX_CONNECTIONS, MAX_MESSAGE_SIZE);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let current = ACTIVE_CONNECTIONS.load(Ordering::SeqCst);
                        if current >= MAX_CONNECTIONS {
                            warn!("Connection limit reached ({}), rejecting new connection", current);
                            drop(stream);
                            continue;
                        }

                        ACTIVE_CONNECTIONS.fetch_add(1, Ordering::SeqCst);
                        let queue = queue.clone();
                        tokio::spawn(async move {
                            handle_client(stream, queue).await;
                            ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    let _ = std::fs::remove_file(socket_path);
    info!("Server stopped");
    Ok(())
}

/// Client credentials from Unix socket peer
#[derive(Debug, Clone, Copy)]
struct PeerCredentials {
    uid: u32,
    gid: u32,
    pid: i32,
}

async fn handle_client(stream: UnixStream, queue: WorkQueue) {
    let cred = match get_peer_credentials(&stream) {
        Some(c) => c,
        None => {
            error!("Failed to get peer credentials, rejecting connection");
            return;
        }
    };
    debug!("Connection from uid={}, gid={}, pid={}", cred.uid, cred.gid, cred.pid);

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line: Vec<u8> = Vec::with_capacity(MAX_MESSAGE_SIZE);
    let mut request_count: u64 = 0;
    let connection_start = Instant::now();

    loop {
        let read_result = timeout(
            READ_TIMEOUT,
            read_line_bounded(&mut reader, &mut line, MAX_MESSAGE_SIZE),
        )
        .await;

        match read_result {
            Ok(Ok(0)) => {
                debug!(
                    "Client disconnected: uid={}, pid={}, requests={}, duration={:?}",
                    cred.uid,
                    cred.pid,
                    request_count,
                    connection_start.elapsed()
                );
                break;
            }
            Ok(Ok(n)) => {
                request_count += 1;
                trace!("Request #{} from uid={}: {} bytes", request_count, cred.uid, n);

                let envelope = process_request(&line, &cred, &queue).await;
                if send_response(&mut writer, &envelope).await.is_err() {
                    break;
                }
            }
            Ok(Err(e)) => {
                if e.kind() == std::io::ErrorKind::InvalidData {
                    warn!(
                        "Message too large (>{} bytes) from uid={}, pid={}",
                        MAX_MESSAGE_SIZE, cred.uid, cred.pid
                    );
                    let envelope = ResponseEnvelope::new(0, Response::error("Message too large"));
                    let _ = send_response(&mut writer, &envelope).await;
                } else {
                    error!("Read error from uid={}, pid={}: {}", cred.uid, cred.pid, e);
                }
                break;
            }
            Err(_) => {
                debug!("Read timeout for uid={}, pid={}", cred.uid, cred.pid);
                break;
            }
        }
    }
}

async fn send_response(
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    envelope: &ResponseEnvelope,
) -> Result<(), ()> {
    let json = serde_json::to_string(envelope).unwrap_or_else(|_| {
        r#"{"id":0,"status":"error","message":"Serialization error"}"#.to_string()
    });

    let write_result = timeout(WRITE_TIMEOUT, async {
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        Ok::<_, std::io::Error>(())
    })
    .await;

    match write_result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!("Write error: {}", e);
            Err(())
        }
        Err(_) => {
            error!("Write timeout");
            Err(())
        }
    }
}

/// `SO_PEERCRED` of the connected policy process
fn get_peer_credentials(stream: &UnixStream) -> Option<PeerCredentials> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: ucred is a plain C struct; all-zero is a valid value.
    let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

    // SAFETY: the fd is a live socket owned by `stream`, and cred/len
    // describe a correctly sized ucred buffer.
    let result = unsafe {
        libc::getsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            &mut cred as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };

    (result == 0).then_some(PeerCredentials {
        uid: cred.uid,
        gid: cred.gid,
        pid: cred.pid,
    })
}

fn is_write_request(request: &Request) -> bool {
    !matches!(
        request,
        Request::Ping | Request::Version | Request::GetStatus | Request::GetModes
    )
}

async fn process_request(line: &[u8], cred: &PeerCredentials, queue: &WorkQueue) -> ResponseEnvelope {
    // Non-UTF8 input fails here like any other malformed line
    let envelope: RequestEnvelope = match serde_json::from_slice(line) {
        Ok(e) => e,
        Err(e) => {
            debug!("Invalid JSON from uid={}: {}", cred.uid, e);
            return ResponseEnvelope::new(0, Response::error("Invalid request format"));
        }
    };

    let request_id = envelope.id;
    let request = envelope.request;

    if let Err(e) = request.validate() {
        warn!("Request validation failed from uid={}: {}", cred.uid, e);
        return ResponseEnvelope::new(request_id, Response::error(e));
    }

    let request_type = request.type_name();
    if is_write_request(&request) {
        info!(
            "AUDIT: {} (id={}) by uid={}, pid={}",
            request_type, request_id, cred.uid, cred.pid
        );
    } else {
        debug!("Processing {} (id={}) from uid={}", request_type, request_id, cred.uid);
    }

    let response = match queue.submit(request).await {
        Ok(response) => response,
        Err(e) => {
            error!("Engine unavailable for {}: {}", request_type, e);
            Response::error(e.to_string())
        }
    };
    ResponseEnvelope::new(request_id, response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work_queue::{spawn_engine, Engine};
    use thermarb::ThermarbConfig;

    #[tokio::test]
    async fn test_read_line_bounded_splits_lines() {
        let input: &[u8] = b"{\"id\":1}\n{\"id\":2}\n";
        let mut reader = BufReader::new(input);
        let mut line = Vec::new();

        let n = read_line_bounded(&mut reader, &mut line, 64).await.unwrap();
        assert_eq!(n, 9);
        assert_eq!(line, b"{\"id\":1}\n");

        read_line_bounded(&mut reader, &mut line, 64).await.unwrap();
        assert_eq!(line, b"{\"id\":2}\n");

        assert_eq!(read_line_bounded(&mut reader, &mut line, 64).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_read_line_bounded_rejects_oversized() {
        let input = vec![b'x'; 100];
        let mut reader = BufReader::new(input.as_slice());
        let mut line = Vec::new();
        let err = read_line_bounded(&mut reader, &mut line, 16).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_process_request_rejects_malformed_lines() {
        let engine = Engine::new(&ThermarbConfig::default(), Vec::new()).unwrap();
        let (queue, _handle) = spawn_engine(engine);
        let cred = PeerCredentials { uid: 0, gid: 0, pid: 1 };

        let reply = process_request(b"{\"id\":7,\"cmd\":\"Ping\"}\n", &cred, &queue).await;
        assert_eq!(reply.id, 7);
        assert!(matches!(reply.response, Response::Ok(_)));

        for line in [&b"\xff\xfe\n"[..], &b"not json\n"[..], &b"\n"[..]] {
            let reply = process_request(line, &cred, &queue).await;
            assert_eq!(reply.id, 0);
            assert!(matches!(reply.response, Response::Error { .. }));
        }
    }

    #[test]
    fn test_write_requests_are_audited() {
        assert!(!is_write_request(&Request::GetModes));
        assert!(is_write_request(&Request::RemovePolicy { policy: 1 }));
    }
}
