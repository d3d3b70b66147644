//! Protocol probes: one live validation attempt per (candidate, protocol)
//!
//! Each probe opens a real TCP connection to the candidate, performs the
//! minimal per-protocol exchange that proves the proxy relays traffic, and
//! classifies the result as an [`Outcome`]. The whole exchange runs under a
//! single absolute deadline; dropping the stream on any exit path closes
//! the socket.

use crate::proxy::models::{Candidate, Outcome, ProbeResult, ProxyType};
use crate::proxy::target::TestTarget;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};

/// User agent sent on probe requests
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Upper bound on a status line before the response is declared non-HTTP
const MAX_STATUS_LINE: usize = 2048;

// SOCKS5 (RFC 1928)
const SOCKS5_VERSION: u8 = 0x05;
const SOCKS5_METHOD_NO_AUTH: u8 = 0x00;
const SOCKS5_CMD_CONNECT: u8 = 0x01;
const SOCKS5_ATYP_IPV4: u8 = 0x01;
const SOCKS5_ATYP_DOMAIN: u8 = 0x03;
const SOCKS5_ATYP_IPV6: u8 = 0x04;
const SOCKS5_REP_SUCCESS: u8 = 0x00;

// SOCKS4
const SOCKS4_VERSION: u8 = 0x04;
const SOCKS4_CMD_CONNECT: u8 = 0x01;
const SOCKS4_REPLY_VERSION: u8 = 0x00;
const SOCKS4_REPLY_GRANTED: u8 = 0x5A;

/// A handshake step: `Err` carries the non-working classification.
/// I/O errors convert to `Outcome::Error` through `?`.
type Step<T = ()> = std::result::Result<T, Outcome>;

/// Probe one candidate with one protocol under an absolute deadline.
///
/// The deadline spans connect, handshake and relay confirmation; a probe
/// that makes partial progress but does not finish in time is a `Timeout`.
/// Failures never propagate past this function.
pub async fn probe(
    candidate: &Candidate,
    protocol: ProxyType,
    target: &TestTarget,
    deadline: Duration,
) -> ProbeResult {
    let start = Instant::now();
    let outcome = match timeout(deadline, attempt(candidate, protocol, target)).await {
        Ok(outcome) => outcome,
        Err(_) => Outcome::Timeout,
    };

    ProbeResult::new(
        candidate.clone(),
        protocol,
        outcome,
        start.elapsed().as_millis() as u64,
    )
}

/// One unbounded probe attempt; the caller supplies the deadline.
async fn attempt(candidate: &Candidate, protocol: ProxyType, target: &TestTarget) -> Outcome {
    let mut stream = match TcpStream::connect((candidate.host.as_str(), candidate.port)).await {
        Ok(stream) => stream,
        // Refused, unroutable and DNS failures all land here
        Err(_) => return Outcome::Unreachable,
    };

    let step = match protocol {
        ProxyType::Http => http_forward(&mut stream, target).await,
        ProxyType::Https => http_connect(&mut stream, target).await,
        ProxyType::Socks4 => socks4_tunnel(&mut stream, target).await,
        ProxyType::Socks5 => socks5_tunnel(&mut stream, target).await,
    };

    match step {
        Ok(()) => Outcome::Working,
        Err(outcome) => outcome,
    }
}

/// HTTP: absolute-URI GET through the proxy, accept any 2xx/3xx reply.
async fn http_forward(stream: &mut TcpStream, target: &TestTarget) -> Step {
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nAccept: */*\r\nConnection: close\r\n\r\n",
        target.absolute_uri(),
        target.host_header(),
        USER_AGENT,
    );
    stream.write_all(request.as_bytes()).await?;

    let status = read_status_line(stream).await?;
    if (200..400).contains(&status) {
        Ok(())
    } else {
        Err(Outcome::ProtocolMismatch)
    }
}

/// HTTPS: CONNECT to the target's TLS port, accept a 2xx acknowledgment.
async fn http_connect(stream: &mut TcpStream, target: &TestTarget) -> Step {
    let authority = target.connect_authority();
    let request = format!(
        "CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\nUser-Agent: {USER_AGENT}\r\n\r\n",
    );
    stream.write_all(request.as_bytes()).await?;

    let status = read_status_line(stream).await?;
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(Outcome::ProtocolMismatch)
    }
}

/// SOCKS5: no-auth greeting, CONNECT by domain name, then relay check.
async fn socks5_tunnel(stream: &mut TcpStream, target: &TestTarget) -> Step {
    // Greeting: VER, NMETHODS=1, no-auth
    stream
        .write_all(&[SOCKS5_VERSION, 0x01, SOCKS5_METHOD_NO_AUTH])
        .await?;

    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice[0] != SOCKS5_VERSION {
        return Err(Outcome::ProtocolMismatch);
    }
    if choice[1] != SOCKS5_METHOD_NO_AUTH {
        // 0xFF (no acceptable method) or an auth demand we cannot satisfy:
        // the server speaks SOCKS5 but will not serve this client.
        return Err(Outcome::Unreachable);
    }

    // CONNECT request with DOMAIN address type, no client-side DNS
    let host_bytes = target.host().as_bytes();
    if host_bytes.len() > 255 {
        return Err(Outcome::Error("target hostname too long".to_string()));
    }
    let mut request = vec![
        SOCKS5_VERSION,
        SOCKS5_CMD_CONNECT,
        0x00, // RSV
        SOCKS5_ATYP_DOMAIN,
        host_bytes.len() as u8,
    ];
    request.extend_from_slice(host_bytes);
    request.extend_from_slice(&target.port().to_be_bytes());
    stream.write_all(&request).await?;

    // Reply: VER, REP, RSV, ATYP then the bound address
    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).await?;
    if reply[0] != SOCKS5_VERSION {
        return Err(Outcome::ProtocolMismatch);
    }
    if reply[1] != SOCKS5_REP_SUCCESS {
        return Err(Outcome::Unreachable);
    }
    match reply[3] {
        SOCKS5_ATYP_IPV4 => {
            let mut bound = [0u8; 6];
            stream.read_exact(&mut bound).await?;
        }
        SOCKS5_ATYP_IPV6 => {
            let mut bound = [0u8; 18];
            stream.read_exact(&mut bound).await?;
        }
        SOCKS5_ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            let mut bound = vec![0u8; len[0] as usize + 2];
            stream.read_exact(&mut bound).await?;
        }
        _ => return Err(Outcome::ProtocolMismatch),
    }

    confirm_relay(stream, target).await
}

/// SOCKS4: CONNECT request, SOCKS4A hostname form for non-IPv4 targets,
/// then relay check.
async fn socks4_tunnel(stream: &mut TcpStream, target: &TestTarget) -> Step {
    let ipv4: Option<[u8; 4]> = target
        .host()
        .parse::<std::net::Ipv4Addr>()
        .ok()
        .map(|addr| addr.octets());

    let mut request: Vec<u8> = vec![SOCKS4_VERSION, SOCKS4_CMD_CONNECT];
    request.extend_from_slice(&target.port().to_be_bytes());
    if let Some(ip) = ipv4 {
        request.extend_from_slice(&ip);
        request.push(0x00); // empty userid
    } else {
        // SOCKS4A: dummy IP 0.0.0.1, hostname appended after the userid
        request.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        request.push(0x00);
        request.extend_from_slice(target.host().as_bytes());
        request.push(0x00);
    }
    stream.write_all(&request).await?;

    // Reply: VN, CD, DSTPORT(2), DSTIP(4)
    let mut reply = [0u8; 8];
    stream.read_exact(&mut reply).await?;
    if reply[0] != SOCKS4_REPLY_VERSION {
        return Err(Outcome::ProtocolMismatch);
    }
    if reply[1] != SOCKS4_REPLY_GRANTED {
        return Err(Outcome::Unreachable);
    }

    confirm_relay(stream, target).await
}

/// Relay confirmation: push a minimal HTTP request through an established
/// tunnel and require a parseable 2xx/3xx status line back. A tunnel that
/// accepts the handshake but cannot move payload is a mismatch, not a
/// working proxy.
async fn confirm_relay(stream: &mut TcpStream, target: &TestTarget) -> Step {
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nAccept: */*\r\nConnection: close\r\n\r\n",
        target.path(),
        target.host_header(),
        USER_AGENT,
    );
    stream.write_all(request.as_bytes()).await?;

    let status = read_status_line(stream).await?;
    if (200..400).contains(&status) {
        Ok(())
    } else {
        Err(Outcome::ProtocolMismatch)
    }
}

/// Read an HTTP status line (`HTTP/1.x CODE ...`) and return the code.
///
/// A clean EOF before any usable line, a non-HTTP preamble, or an oversized
/// line all classify as `ProtocolMismatch`.
async fn read_status_line(stream: &mut TcpStream) -> Step<u16> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            // Peer closed without speaking HTTP
            return Err(Outcome::ProtocolMismatch);
        }
        buf.push(byte[0]);
        if buf.ends_with(b"\r\n") {
            break;
        }
        if buf.len() > MAX_STATUS_LINE {
            return Err(Outcome::ProtocolMismatch);
        }
    }

    let line = String::from_utf8_lossy(&buf);
    let line = line.trim_end();
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(Outcome::ProtocolMismatch);
    }
    parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or(Outcome::ProtocolMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn candidate(port: u16) -> Candidate {
        Candidate::new("127.0.0.1".to_string(), port, 0)
    }

    fn target() -> TestTarget {
        TestTarget::parse("http://example.com/ip").unwrap()
    }

    /// Bind a listener and run `handler` on the first accepted connection.
    async fn spawn_once<F, Fut>(handler: F) -> u16
    where
        F: FnOnce(TcpStream) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                handler(stream).await;
            }
        });
        port
    }

    #[tokio::test]
    async fn test_probe_unreachable_port() {
        // Bind then drop so nothing is listening on the port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = probe(
            &candidate(port),
            ProxyType::Http,
            &target(),
            Duration::from_secs(2),
        )
        .await;
        assert_eq!(result.outcome, Outcome::Unreachable);
    }

    #[tokio::test]
    async fn test_probe_silent_socks5_server_times_out() {
        // Accepts TCP but never completes the handshake
        let port = spawn_once(|stream| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        })
        .await;

        let started = Instant::now();
        let result = probe(
            &candidate(port),
            ProxyType::Socks5,
            &target(),
            Duration::from_millis(300),
        )
        .await;
        assert_eq!(result.outcome, Outcome::Timeout);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_http_probe_working() {
        let port = spawn_once(|mut stream| async move {
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
                .await;
        })
        .await;

        let result = probe(
            &candidate(port),
            ProxyType::Http,
            &target(),
            Duration::from_secs(2),
        )
        .await;
        assert_eq!(result.outcome, Outcome::Working);
    }

    #[tokio::test]
    async fn test_http_probe_error_status_is_mismatch() {
        let port = spawn_once(|mut stream| async move {
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await;
        })
        .await;

        let result = probe(
            &candidate(port),
            ProxyType::Http,
            &target(),
            Duration::from_secs(2),
        )
        .await;
        assert_eq!(result.outcome, Outcome::ProtocolMismatch);
    }

    #[tokio::test]
    async fn test_http_probe_garbage_response_is_mismatch() {
        let port = spawn_once(|mut stream| async move {
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(b"SSH-2.0-OpenSSH_9.6\r\n").await;
        })
        .await;

        let result = probe(
            &candidate(port),
            ProxyType::Http,
            &target(),
            Duration::from_secs(2),
        )
        .await;
        assert_eq!(result.outcome, Outcome::ProtocolMismatch);
    }

    #[tokio::test]
    async fn test_https_connect_acknowledged() {
        let port = spawn_once(|mut stream| async move {
            let mut buf = Vec::new();
            let mut byte = [0u8; 1];
            while stream.read(&mut byte).await.unwrap_or(0) > 0 {
                buf.push(byte[0]);
                if buf.ends_with(b"\r\n\r\n") {
                    break;
                }
            }
            assert!(buf.starts_with(b"CONNECT example.com:443 "));
            let _ = stream
                .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                .await;
        })
        .await;

        let result = probe(
            &candidate(port),
            ProxyType::Https,
            &target(),
            Duration::from_secs(2),
        )
        .await;
        assert_eq!(result.outcome, Outcome::Working);
    }

    #[tokio::test]
    async fn test_socks5_full_relay_working() {
        let port = spawn_once(|mut stream| async move {
            let mut greeting = [0u8; 3];
            stream.read_exact(&mut greeting).await.unwrap();
            assert_eq!(greeting, [0x05, 0x01, 0x00]);
            stream.write_all(&[0x05, 0x00]).await.unwrap();

            // CONNECT head + domain + port
            let mut head = [0u8; 5];
            stream.read_exact(&mut head).await.unwrap();
            assert_eq!(&head[..4], &[0x05, 0x01, 0x00, 0x03]);
            let mut rest = vec![0u8; head[4] as usize + 2];
            stream.read_exact(&mut rest).await.unwrap();

            // Success reply with IPv4 bound address
            stream
                .write_all(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
                .await
                .unwrap();

            // Relay: swallow the request, answer as the target would
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(b"HTTP/1.1 200 OK\r\n\r\n").await;
        })
        .await;

        let result = probe(
            &candidate(port),
            ProxyType::Socks5,
            &target(),
            Duration::from_secs(2),
        )
        .await;
        assert_eq!(result.outcome, Outcome::Working);
    }

    #[tokio::test]
    async fn test_socks5_no_acceptable_method_is_unreachable() {
        let port = spawn_once(|mut stream| async move {
            let mut greeting = [0u8; 3];
            stream.read_exact(&mut greeting).await.unwrap();
            let _ = stream.write_all(&[0x05, 0xFF]).await;
        })
        .await;

        let result = probe(
            &candidate(port),
            ProxyType::Socks5,
            &target(),
            Duration::from_secs(2),
        )
        .await;
        assert_eq!(result.outcome, Outcome::Unreachable);
    }

    #[tokio::test]
    async fn test_socks5_handshake_only_is_mismatch() {
        // Grants the tunnel, then closes instead of relaying
        let port = spawn_once(|mut stream| async move {
            let mut greeting = [0u8; 3];
            stream.read_exact(&mut greeting).await.unwrap();
            stream.write_all(&[0x05, 0x00]).await.unwrap();

            let mut head = [0u8; 5];
            stream.read_exact(&mut head).await.unwrap();
            let mut rest = vec![0u8; head[4] as usize + 2];
            stream.read_exact(&mut rest).await.unwrap();
            let _ = stream
                .write_all(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
                .await;
            // Drop without answering the relayed request
        })
        .await;

        let result = probe(
            &candidate(port),
            ProxyType::Socks5,
            &target(),
            Duration::from_secs(2),
        )
        .await;
        assert_eq!(result.outcome, Outcome::ProtocolMismatch);
    }

    #[tokio::test]
    async fn test_socks4_rejected_is_unreachable() {
        let port = spawn_once(|mut stream| async move {
            // Read through the NUL-terminated request, then reject
            let mut buf = [0u8; 256];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(&[0x00, 0x5B, 0, 0, 0, 0, 0, 0]).await;
        })
        .await;

        let result = probe(
            &candidate(port),
            ProxyType::Socks4,
            &target(),
            Duration::from_secs(2),
        )
        .await;
        assert_eq!(result.outcome, Outcome::Unreachable);
    }

    #[tokio::test]
    async fn test_socks4_granted_with_relay_working() {
        let port = spawn_once(|mut stream| async move {
            let mut buf = [0u8; 256];
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n >= 9);
            assert_eq!(buf[0], 0x04);
            stream
                .write_all(&[0x00, 0x5A, 0, 0, 0, 0, 0, 0])
                .await
                .unwrap();

            let mut req = [0u8; 1024];
            let _ = stream.read(&mut req).await;
            let _ = stream.write_all(b"HTTP/1.1 301 Moved\r\n\r\n").await;
        })
        .await;

        let result = probe(
            &candidate(port),
            ProxyType::Socks4,
            &target(),
            Duration::from_secs(2),
        )
        .await;
        assert_eq!(result.outcome, Outcome::Working);
    }
}
