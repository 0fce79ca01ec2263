use crate::constants::{limits as limit_constants, network as network_constants, pty};
use crate::errors::FleetErrorKind;
use crate::services::auth::AuthContext;
use crate::services::config::FleetConfig;
use crate::services::dispatch::{ExecutionResult, HostFailure, RemoteExecutor};
use crate::services::hosts::Host;
use crate::services::logger::Logger;
use async_trait::async_trait;
use base64::Engine;
use ssh2::{Channel, PtyModeOpcode, PtyModes, Session};
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
struct ExecLimits {
    connect_timeout: Duration,
    exec_timeout: Option<Duration>,
    max_capture: usize,
}

/// Remote command executor over ssh2. Each call opens its own connection.
#[derive(Clone)]
pub struct SshExecutor {
    logger: Logger,
    auth: AuthContext,
    limits: ExecLimits,
}

impl SshExecutor {
    pub fn new(logger: Logger, auth: AuthContext, config: &FleetConfig) -> Self {
        Self {
            logger: logger.child("ssh"),
            auth,
            limits: ExecLimits {
                connect_timeout: config.connect_timeout,
                exec_timeout: config.exec_timeout,
                max_capture: config.max_capture_bytes.max(1),
            },
        }
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(&self, host: &Host, command: &str) -> ExecutionResult {
        let logger = self.logger.for_host(host);
        let target = host.clone();
        let auth = self.auth.clone();
        let command = command.to_string();
        let limits = self.limits;
        let task_logger = logger.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            exec_blocking(&task_logger, &target, &auth, &command, limits)
        })
        .await;

        match outcome {
            Ok(Ok(captured)) => {
                if captured.dropped_bytes > 0 {
                    logger.warn(
                        "output exceeded the capture limit",
                        Some(&serde_json::json!({
                            "dropped_bytes": captured.dropped_bytes,
                            "max_capture_bytes": limits.max_capture,
                        })),
                    );
                }
                logger.debug(
                    "finished",
                    Some(&serde_json::json!({
                        "stdout_bytes": captured.stdout.len(),
                        "stderr_bytes": captured.stderr.len(),
                    })),
                );
                ExecutionResult::success(host.clone(), &captured.stdout)
            }
            Ok(Err(failure)) => {
                logger.debug(
                    "failed",
                    Some(&serde_json::json!({ "kind": failure.kind, "detail": failure.detail })),
                );
                ExecutionResult::failed(host.clone(), failure)
            }
            Err(err) => ExecutionResult::failed(
                host.clone(),
                HostFailure::new(
                    FleetErrorKind::Internal,
                    format!("SSH exec task failed: {}", err),
                ),
            ),
        }
    }
}

struct Captured {
    stdout: String,
    stderr: String,
    dropped_bytes: u64,
}

/// Output of one stream, kept up to `limit` bytes. Anything past the limit is
/// counted and dropped.
struct CaptureBuffer {
    bytes: Vec<u8>,
    total: u64,
    limit: usize,
}

impl CaptureBuffer {
    fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            total: 0,
            limit,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        self.total += chunk.len() as u64;
        let room = self.limit.saturating_sub(self.bytes.len());
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    fn dropped(&self) -> u64 {
        self.total - self.bytes.len() as u64
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Authenticated session; disconnects when dropped so every exit path
/// releases the connection.
struct Connection {
    session: Session,
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.session.disconnect(None, "fleetcmd done", None);
    }
}

/// libssh2 treats 0 as "no timeout", so sub-millisecond limits round up.
fn session_timeout_ms(limit: Duration) -> u32 {
    limit.as_millis().clamp(1, u32::MAX as u128) as u32
}

fn connect_session(
    logger: &Logger,
    host: &Host,
    auth: &AuthContext,
    connect_timeout: Duration,
) -> Result<Connection, HostFailure> {
    let connection_failure =
        |detail: String| HostFailure::new(FleetErrorKind::Connection, detail);

    let port = host.port().ok_or_else(|| {
        connection_failure(format!("Failed to connect: invalid port in {}", host))
    })?;
    let addrs: Vec<_> = (host.address(), port)
        .to_socket_addrs()
        .map_err(|err| connection_failure(format!("Failed to connect: {}", err)))?
        .collect();
    let mut last_err = None;
    let mut tcp = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, connect_timeout) {
            Ok(stream) => {
                tcp = Some(stream);
                break;
            }
            Err(err) => last_err = Some(err),
        }
    }
    let tcp = tcp.ok_or_else(|| {
        connection_failure(format!(
            "Failed to connect: {}",
            last_err
                .map(|err| err.to_string())
                .unwrap_or_else(|| "no addresses resolved".to_string())
        ))
    })?;

    let mut session = Session::new()
        .map_err(|_| connection_failure("Failed to create SSH session".to_string()))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(session_timeout_ms(connect_timeout));
    session
        .handshake()
        .map_err(|err| connection_failure(format!("Failed to connect: {}", describe(err))))?;
    let connection = Connection { session };

    if let Some(fingerprint) = fingerprint_host_key_sha256(&connection.session) {
        logger.debug(
            "host key",
            Some(&serde_json::json!({ "fingerprint": fingerprint })),
        );
    }

    connection
        .session
        .userauth_pubkey_memory(auth.username(), None, auth.private_key(), auth.passphrase())
        .map_err(|err| connection_failure(format!("Failed to connect: {}", describe(err))))?;
    if !connection.session.authenticated() {
        return Err(connection_failure(
            "Failed to connect: SSH authentication failed".to_string(),
        ));
    }
    Ok(connection)
}

fn request_pty(channel: &mut Channel) -> Result<(), ssh2::Error> {
    let mut modes = PtyModes::new();
    modes.set_boolean(PtyModeOpcode::ECHO, false);
    modes.set_u32(PtyModeOpcode::TTY_OP_ISPEED, pty::BAUD);
    modes.set_u32(PtyModeOpcode::TTY_OP_OSPEED, pty::BAUD);
    channel.request_pty(pty::TERM, Some(modes), Some((pty::COLUMNS, pty::ROWS, 0, 0)))
}

fn exec_blocking(
    logger: &Logger,
    host: &Host,
    auth: &AuthContext,
    command: &str,
    limits: ExecLimits,
) -> Result<Captured, HostFailure> {
    let connection = connect_session(logger, host, auth, limits.connect_timeout)?;
    let session = &connection.session;

    // The connect timeout still bounds channel setup, the pty request and exec.
    let mut channel = session.channel_session().map_err(|err| {
        HostFailure::new(
            FleetErrorKind::Session,
            format!("Failed to create session: {}", describe(err)),
        )
    })?;
    request_pty(&mut channel).map_err(|err| {
        HostFailure::new(
            FleetErrorKind::Session,
            format!("Request for pseudo terminal failed: {}", describe(err)),
        )
    })?;

    let mut buf = [0u8; limit_constants::READ_CHUNK_BYTES];
    let mut stdout = CaptureBuffer::new(limits.max_capture);
    let mut stderr = CaptureBuffer::new(limits.max_capture);
    let mut stderr_stream = channel.stderr();
    if let Err(err) = channel.exec(command) {
        session.set_blocking(false);
        let _ = read_chunk(&mut stderr_stream, &mut buf, &mut stderr);
        return Err(HostFailure::new(
            FleetErrorKind::Start,
            format!("Failed to run: {}", describe(err)),
        )
        .with_stderr(&stderr.text()));
    }
    // From here the read loop enforces the exec deadline.
    session.set_timeout(0);
    session.set_blocking(false);

    let started = Instant::now();
    let mut timed_out = false;

    loop {
        let out_progress = read_chunk(&mut channel, &mut buf, &mut stdout)
            .map_err(|err| wait_failure(format!("SSH stdout read failed: {}", err), &stderr))?;
        let err_progress = read_chunk(&mut stderr_stream, &mut buf, &mut stderr)
            .map_err(|err| wait_failure(format!("SSH stderr read failed: {}", err), &stderr))?;

        if channel.eof() {
            break;
        }
        if let Some(timeout) = limits.exec_timeout {
            if started.elapsed() > timeout {
                timed_out = true;
                break;
            }
        }
        if !out_progress && !err_progress {
            std::thread::sleep(Duration::from_millis(
                network_constants::READ_POLL_INTERVAL_MS,
            ));
        }
    }

    if timed_out {
        let _ = channel.close();
        let grace = Duration::from_millis(network_constants::TIMEOUT_SSH_CLOSE_GRACE_MS);
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline && !channel.eof() {
            std::thread::sleep(Duration::from_millis(
                network_constants::READ_POLL_INTERVAL_MS,
            ));
        }
        let waited = limits.exec_timeout.unwrap_or_default();
        return Err(HostFailure::new(
            FleetErrorKind::Timeout,
            format!("Command timed out after {}ms", waited.as_millis()),
        )
        .with_stderr(&stderr.text()));
    }

    session.set_blocking(true);
    session.set_timeout(network_constants::TIMEOUT_SSH_CLOSE_GRACE_MS as u32);
    channel
        .wait_close()
        .map_err(|err| wait_failure(format!("Command failed: {}", describe(err)), &stderr))?;

    let signal = channel.exit_signal().ok().and_then(|sig| sig.exit_signal);
    let exit_code = channel.exit_status().unwrap_or(-1);
    let stdout_text = stdout.text();
    let stderr_text = stderr.text();
    classify_exit(signal.as_deref(), exit_code, &stdout_text, &stderr_text)?;

    Ok(Captured {
        stdout: stdout_text,
        stderr: stderr_text,
        dropped_bytes: stdout.dropped() + stderr.dropped(),
    })
}

/// One non-blocking read into `sink`. Returns whether any bytes arrived.
fn read_chunk<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    sink: &mut CaptureBuffer,
) -> std::io::Result<bool> {
    match reader.read(buf) {
        Ok(0) => Ok(false),
        Ok(n) => {
            sink.push(&buf[..n]);
            Ok(true)
        }
        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
        Err(err) => Err(err),
    }
}

/// A signal takes precedence over the exit status.
fn classify_exit(
    signal: Option<&str>,
    exit_code: i32,
    stdout: &str,
    stderr: &str,
) -> Result<(), HostFailure> {
    if let Some(signal) = signal {
        return Err(HostFailure::new(
            FleetErrorKind::Wait,
            format!("Command failed: killed by signal {}", signal),
        )
        .with_stderr(failure_text(stderr, stdout)));
    }
    if exit_code != 0 {
        return Err(HostFailure::new(
            FleetErrorKind::Wait,
            format!("Command failed: process exited with status {}", exit_code),
        )
        .with_exit_code(exit_code)
        .with_stderr(failure_text(stderr, stdout)));
    }
    Ok(())
}

fn wait_failure(detail: String, stderr: &CaptureBuffer) -> HostFailure {
    HostFailure::new(FleetErrorKind::Wait, detail).with_stderr(&stderr.text())
}

// The pty merges stderr into stdout, so stdout is the fallback error text.
fn failure_text<'a>(stderr: &'a str, stdout: &'a str) -> &'a str {
    if stderr.trim().is_empty() {
        stdout
    } else {
        stderr
    }
}

fn fingerprint_host_key_sha256(session: &Session) -> Option<String> {
    let hash = session.host_key_hash(ssh2::HashType::Sha256)?;
    let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(hash);
    Some(format!("SHA256:{}", encoded))
}

fn describe(err: ssh2::Error) -> String {
    let io_err: std::io::Error = err.into();
    match io_err.kind() {
        std::io::ErrorKind::TimedOut => "SSH operation timed out".to_string(),
        _ => io_err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        classify_exit, failure_text, read_chunk, session_timeout_ms, CaptureBuffer,
    };
    use crate::constants::limits::READ_CHUNK_BYTES;
    use crate::errors::FleetErrorKind;
    use std::io::{Cursor, Read};
    use std::time::Duration;

    struct NotReady;

    impl Read for NotReady {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::WouldBlock.into())
        }
    }

    #[test]
    fn read_chunk_returns_after_one_chunk_of_an_endless_stream() {
        let mut reader = std::io::repeat(b'y');
        let mut buf = [0u8; READ_CHUNK_BYTES];
        let mut sink = CaptureBuffer::new(usize::MAX);
        assert!(read_chunk(&mut reader, &mut buf, &mut sink).expect("read"));
        assert_eq!(sink.bytes.len(), READ_CHUNK_BYTES);
        assert_eq!(sink.total, READ_CHUNK_BYTES as u64);
    }

    #[test]
    fn capture_limit_holds_while_the_stream_keeps_flowing() {
        let mut reader = std::io::repeat(b'y');
        let mut buf = [0u8; READ_CHUNK_BYTES];
        let mut sink = CaptureBuffer::new(10_000);
        for _ in 0..5 {
            assert!(read_chunk(&mut reader, &mut buf, &mut sink).expect("read"));
        }
        assert_eq!(sink.bytes.len(), 10_000);
        assert_eq!(sink.total, 5 * READ_CHUNK_BYTES as u64);
        assert_eq!(sink.dropped(), 5 * READ_CHUNK_BYTES as u64 - 10_000);
    }

    #[test]
    fn read_chunk_treats_would_block_and_eof_as_idle() {
        let mut buf = [0u8; READ_CHUNK_BYTES];
        let mut sink = CaptureBuffer::new(64);
        assert!(!read_chunk(&mut NotReady, &mut buf, &mut sink).expect("read"));

        let mut reader = Cursor::new(b"4096 /var/log/big\n".to_vec());
        assert!(read_chunk(&mut reader, &mut buf, &mut sink).expect("read"));
        assert!(!read_chunk(&mut reader, &mut buf, &mut sink).expect("read"));
        assert_eq!(sink.text(), "4096 /var/log/big\n");
        assert_eq!(sink.dropped(), 0);
    }

    #[test]
    fn zero_exit_without_signal_is_success() {
        assert!(classify_exit(None, 0, "done", "").is_ok());
    }

    #[test]
    fn non_zero_exit_is_a_wait_failure_with_code_and_text() {
        let failure = classify_exit(None, 3, "sudo: a password is required", "").unwrap_err();
        assert_eq!(failure.kind, FleetErrorKind::Wait);
        assert_eq!(failure.exit_code, Some(3));
        assert_eq!(failure.detail, "Command failed: process exited with status 3");
        assert_eq!(failure.stderr.as_deref(), Some("sudo: a password is required"));
    }

    #[test]
    fn signal_wins_over_exit_status() {
        let failure = classify_exit(Some("KILL"), 0, "", "oom").unwrap_err();
        assert_eq!(failure.kind, FleetErrorKind::Wait);
        assert_eq!(failure.exit_code, None);
        assert_eq!(failure.detail, "Command failed: killed by signal KILL");
        assert_eq!(failure.stderr.as_deref(), Some("oom"));
    }

    #[test]
    fn session_timeout_never_becomes_unbounded() {
        assert_eq!(session_timeout_ms(Duration::from_micros(10)), 1);
        assert_eq!(session_timeout_ms(Duration::from_secs(10)), 10_000);
        assert_eq!(session_timeout_ms(Duration::from_secs(u64::MAX)), u32::MAX);
    }

    #[test]
    fn failure_text_falls_back_to_stdout() {
        assert_eq!(failure_text("  \n", "sudo: a password is required"), "sudo: a password is required");
        assert_eq!(failure_text("denied", "ignored"), "denied");
    }
}
