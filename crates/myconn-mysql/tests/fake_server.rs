//! Session tests against an in-process fake MySQL server.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use myconn_core::error::{ConnectionErrorKind, QueryErrorKind};
use myconn_core::{Error, NativeClient, OpenParams, Session};
use myconn_mysql::auth;
use myconn_mysql::protocol::capabilities::{CLIENT_CONNECT_WITH_DB, DEFAULT_CLIENT_FLAGS};
use myconn_mysql::{MySqlClient, MySqlConfig, MySqlSession};

const SCRAMBLE: &[u8; 20] = b"0123456789abcdefghij";

#[derive(Clone, Copy)]
enum Behavior {
    /// Authenticate, then serve commands until COM_QUIT
    Serve,
    /// Reject the handshake response with ER_ACCESS_DENIED_ERROR
    DenyAccess,
    /// Hang up right after the greeting
    HangUp,
    /// Ask the client to switch to caching_sha2_password, then fast-auth
    SwitchToSha2,
    /// Ask the client to switch to mysql_clear_password
    SwitchToCleartext,
    /// Announce mysql_clear_password in the greeting itself
    GreetCleartext,
}

fn write_packet(stream: &mut TcpStream, seq: u8, payload: &[u8]) {
    let len = (payload.len() as u32).to_le_bytes();
    stream.write_all(&[len[0], len[1], len[2], seq]).unwrap();
    stream.write_all(payload).unwrap();
}

fn read_packet(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).ok()?;
    let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).ok()?;
    Some((header[3], payload))
}

fn greeting(plugin: &str) -> Vec<u8> {
    let caps = DEFAULT_CLIENT_FLAGS | CLIENT_CONNECT_WITH_DB;
    let mut p = vec![10];
    p.extend_from_slice(b"8.0.36-fake\0");
    p.extend_from_slice(&7u32.to_le_bytes());
    p.extend_from_slice(&SCRAMBLE[..8]);
    p.push(0);
    p.extend_from_slice(&(caps as u16).to_le_bytes());
    p.push(255);
    p.extend_from_slice(&2u16.to_le_bytes());
    p.extend_from_slice(&((caps >> 16) as u16).to_le_bytes());
    p.push(21);
    p.extend_from_slice(&[0; 10]);
    p.extend_from_slice(&SCRAMBLE[8..]);
    p.push(0);
    p.extend_from_slice(plugin.as_bytes());
    p.push(0);
    p
}

fn ok() -> Vec<u8> {
    vec![0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00]
}

fn err(code: u16, state: &str, message: &str) -> Vec<u8> {
    let mut p = vec![0xFF];
    p.extend_from_slice(&code.to_le_bytes());
    p.push(b'#');
    p.extend_from_slice(state.as_bytes());
    p.extend_from_slice(message.as_bytes());
    p
}

/// Column definition for a single VARCHAR column named `v`.
fn column_def() -> Vec<u8> {
    let mut p = Vec::new();
    for s in ["def", "", "", "", "v", ""] {
        p.push(s.len() as u8);
        p.extend_from_slice(s.as_bytes());
    }
    p.push(0x0c);
    p.extend_from_slice(&45u16.to_le_bytes());
    p.extend_from_slice(&255u32.to_le_bytes());
    p.push(0xfd);
    p.extend_from_slice(&[0, 0, 0, 0, 0]);
    p
}

/// Extract the auth response from a HandshakeResponse41 payload.
fn auth_response_of(payload: &[u8]) -> (String, Vec<u8>) {
    let rest = &payload[32..];
    let nul = rest.iter().position(|&b| b == 0).unwrap();
    let user = String::from_utf8(rest[..nul].to_vec()).unwrap();
    let len = rest[nul + 1] as usize;
    (user, rest[nul + 2..nul + 2 + len].to_vec())
}

fn serve_commands(stream: &mut TcpStream, log: &mut Vec<String>) {
    while let Some((_, payload)) = read_packet(stream) {
        let body = String::from_utf8_lossy(&payload[1..]).into_owned();
        match payload[0] {
            0x01 => {
                log.push("QUIT".to_string());
                return;
            }
            0x02 => {
                log.push(format!("INIT_DB {body}"));
                if body == "missing" {
                    write_packet(stream, 1, &err(1049, "42000", "Unknown database 'missing'"));
                } else {
                    write_packet(stream, 1, &ok());
                }
            }
            0x03 => {
                log.push(body.clone());
                if body.contains("bogus") {
                    write_packet(
                        stream,
                        1,
                        &err(1193, "HY000", "Unknown system variable 'bogus'"),
                    );
                } else if body.starts_with("select") {
                    let mut terminator = vec![0xFE, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00];
                    if body.contains("info") {
                        // An OK-style terminator may carry a session info string.
                        terminator.push(10);
                        terminator.extend_from_slice(b"1 row sent");
                    }
                    write_packet(stream, 1, &[1]);
                    write_packet(stream, 2, &column_def());
                    write_packet(stream, 3, &[3, b'a', b'b', b'c']);
                    write_packet(stream, 4, &terminator);
                } else {
                    write_packet(stream, 1, &ok());
                }
            }
            0x0e => {
                log.push("PING".to_string());
                write_packet(stream, 1, &ok());
            }
            other => panic!("fake server got unexpected command {other:#x}"),
        }
    }
}

/// Spawn a one-connection fake server; the handle yields the command log.
fn spawn(behavior: Behavior, password: &'static str) -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut log = Vec::new();

        let plugin = match behavior {
            Behavior::GreetCleartext => "mysql_clear_password",
            _ => "mysql_native_password",
        };
        write_packet(&mut stream, 0, &greeting(plugin));
        match behavior {
            Behavior::HangUp => return log,
            Behavior::GreetCleartext => {
                if let Some((_, response)) = read_packet(&mut stream) {
                    log.push(format!("RESPONSE {}", String::from_utf8_lossy(&response)));
                }
                return log;
            }
            _ => {}
        }

        let (seq, response) = read_packet(&mut stream).unwrap();
        assert_eq!(seq, 1);
        let (user, scramble) = auth_response_of(&response);
        log.push(format!("AUTH {user}"));

        match behavior {
            Behavior::DenyAccess => {
                write_packet(
                    &mut stream,
                    2,
                    &err(
                        1045,
                        "28000",
                        "Access denied for user 'app'@'localhost' (using password: YES)",
                    ),
                );
                return log;
            }
            Behavior::SwitchToSha2 => {
                let mut switch = vec![0xFE];
                switch.extend_from_slice(b"caching_sha2_password\0");
                switch.extend_from_slice(SCRAMBLE);
                switch.push(0);
                write_packet(&mut stream, 2, &switch);
                let (_, sha2) = read_packet(&mut stream).unwrap();
                assert_eq!(sha2, auth::caching_sha2_password(password, SCRAMBLE));
                log.push("SWITCHED".to_string());
                write_packet(&mut stream, 4, &[0x01, 0x03]);
                write_packet(&mut stream, 5, &ok());
            }
            Behavior::SwitchToCleartext => {
                let mut switch = vec![0xFE];
                switch.extend_from_slice(b"mysql_clear_password\0");
                write_packet(&mut stream, 2, &switch);
                let Some((_, clear)) = read_packet(&mut stream) else {
                    return log;
                };
                let clear = clear.strip_suffix(&[0u8]).unwrap_or(&clear);
                log.push(format!("CLEARTEXT {}", String::from_utf8_lossy(clear)));
                write_packet(&mut stream, 4, &ok());
            }
            _ => {
                assert_eq!(scramble, auth::mysql_native_password(password, SCRAMBLE));
                write_packet(&mut stream, 2, &ok());
            }
        }

        serve_commands(&mut stream, &mut log);
        log
    });
    (port, handle)
}

fn config(port: u16) -> MySqlConfig {
    MySqlConfig::new()
        .host("127.0.0.1")
        .port(port)
        .user("app")
        .password("secret")
        .connect_timeout(Duration::from_secs(5))
}

#[test]
fn connect_run_statements_and_quit() {
    let (port, server) = spawn(Behavior::Serve, "secret");

    let mut session = MySqlSession::connect(config(port)).unwrap();
    assert_eq!(session.server_version(), "8.0.36-fake");
    assert_eq!(session.connection_id(), 7);

    session.select_db("shop").unwrap();
    assert_eq!(session.database(), Some("shop"));
    session.execute("set names 'utf8mb4'").unwrap();
    session.execute("select @@sql_mode").unwrap();
    session.ping().unwrap();
    session.close();

    let log = server.join().unwrap();
    assert_eq!(
        log,
        vec![
            "AUTH app",
            "INIT_DB shop",
            "set names 'utf8mb4'",
            "select @@sql_mode",
            "PING",
            "QUIT",
        ]
    );
}

#[test]
fn statement_errors_carry_sql() {
    let (port, server) = spawn(Behavior::Serve, "secret");
    let mut session = MySqlSession::connect(config(port)).unwrap();

    let err = session.execute("set bogus = 1").unwrap_err();
    match &err {
        Error::Query(q) => {
            assert_eq!(q.code, Some(1193));
            assert_eq!(q.kind, QueryErrorKind::NotFound);
            assert_eq!(q.sql.as_deref(), Some("set bogus = 1"));
        }
        other => panic!("expected query error, got {other:?}"),
    }

    let err = session.select_db("missing").unwrap_err();
    assert!(err.to_string().contains("Unknown database 'missing'"));

    // The session stays usable after statement errors.
    session.execute("set time_zone=\"+00:00\"").unwrap();
    session.close();
    server.join().unwrap();
}

#[test]
fn access_denied_is_authentication_error() {
    let (port, server) = spawn(Behavior::DenyAccess, "secret");
    let err = MySqlSession::connect(config(port)).unwrap_err();
    match &err {
        Error::Connection(c) => {
            assert_eq!(c.kind, ConnectionErrorKind::Authentication);
            assert!(c.message.contains("Access denied"));
        }
        other => panic!("expected connection error, got {other:?}"),
    }
    assert!(!err.is_lost_connection());
    server.join().unwrap();
}

#[test]
fn hang_up_after_greeting_is_lost_connection() {
    let (port, server) = spawn(Behavior::HangUp, "secret");
    let err = MySqlSession::connect(config(port)).unwrap_err();
    assert!(err.is_lost_connection(), "{err}");
    server.join().unwrap();
}

#[test]
fn auth_switch_to_caching_sha2() {
    let (port, server) = spawn(Behavior::SwitchToSha2, "secret");
    let session = MySqlSession::connect(config(port)).unwrap();
    session.close();
    let log = server.join().unwrap();
    assert_eq!(log, vec!["AUTH app", "SWITCHED", "QUIT"]);
}

#[test]
fn client_opens_sessions_from_open_params() {
    let (port, server) = spawn(Behavior::Serve, "secret");
    let params = OpenParams {
        host: "127.0.0.1".to_string(),
        port,
        username: "app".to_string(),
        password: Some("secret".to_string()),
        ..OpenParams::default()
    };

    let mut session = MySqlClient::new().open(&params).unwrap();
    session.execute_statement("set names 'utf8mb4'").unwrap();
    session.select_database("shop").unwrap();
    session.close();

    let log = server.join().unwrap();
    assert_eq!(log, vec!["AUTH app", "set names 'utf8mb4'", "INIT_DB shop", "QUIT"]);
}

#[test]
fn cleartext_auth_switch_is_refused() {
    let (port, server) = spawn(Behavior::SwitchToCleartext, "secret");
    let err = MySqlSession::connect(config(port)).unwrap_err();
    match &err {
        Error::Connection(c) => {
            assert_eq!(c.kind, ConnectionErrorKind::Authentication);
            assert!(c.message.contains("mysql_clear_password"));
        }
        other => panic!("expected connection error, got {other:?}"),
    }
    assert!(!err.is_lost_connection());

    let log = server.join().unwrap();
    assert_eq!(log, vec!["AUTH app"]);
}

#[test]
fn cleartext_greeting_sends_nothing() {
    let (port, server) = spawn(Behavior::GreetCleartext, "secret");
    let err = MySqlSession::connect(config(port)).unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(ref c) if c.kind == ConnectionErrorKind::Authentication
    ));

    let log = server.join().unwrap();
    assert!(log.is_empty(), "server received {log:?}");
}

#[test]
fn cleartext_auth_switch_when_enabled() {
    let (port, server) = spawn(Behavior::SwitchToCleartext, "secret");
    let session = MySqlSession::connect(config(port).allow_cleartext_password(true)).unwrap();
    session.close();

    let log = server.join().unwrap();
    assert_eq!(log, vec!["AUTH app", "CLEARTEXT secret", "QUIT"]);
}

#[test]
fn result_set_with_long_terminator_completes() {
    let (port, server) = spawn(Behavior::Serve, "secret");
    let mut session = MySqlSession::connect(config(port)).unwrap();

    assert_eq!(session.execute("select 'info'").unwrap(), 0);
    session.ping().unwrap();
    session.close();

    let log = server.join().unwrap();
    assert_eq!(log, vec!["AUTH app", "select 'info'", "PING", "QUIT"]);
}
