//! End-to-end tests over real TCP connections.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use irc_relayd::config::ServerConfig;
use irc_relayd::server::Server;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn start_server() -> SocketAddr {
    let config = ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        server_name: "testserver".to_string(),
    };
    let (addr, _handle) = Server::new(config).start().await.expect("server start");
    addr
}

struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (read, writer) = stream.into_split();
        Self { lines: BufReader::new(read).lines(), writer }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .expect("write");
    }

    async fn register(&mut self, nick: &str) {
        self.send(&format!("NICK {nick}")).await;
        self.send(&format!("USER user host server :{nick} real")).await;
        self.expect_line(|l| l.contains(" 376 ")).await;
    }

    /// Read lines until one matches, panicking on timeout or EOF.
    async fn expect_line(&mut self, predicate: impl Fn(&str) -> bool) -> String {
        timeout(TIMEOUT, async {
            loop {
                match self.lines.next_line().await.expect("read") {
                    Some(line) if predicate(&line) => return line,
                    Some(_) => continue,
                    None => panic!("connection closed while waiting for line"),
                }
            }
        })
        .await
        .expect("timed out waiting for line")
    }
}

#[tokio::test]
async fn registration_gets_welcome_then_end_of_motd() {
    let addr = start_server().await;
    let mut client = TestClient::connect(addr).await;

    client.send("NICK kirk").await;
    client.send("USER user host server :kirk real").await;

    let welcome = client.expect_line(|l| l.contains(" 001 ")).await;
    assert!(welcome.starts_with(":testserver 001 kirk"), "got: {welcome}");

    let motd = client.expect_line(|l| l.contains(" 376 ")).await;
    assert!(motd.starts_with(":testserver 376 kirk"), "got: {motd}");
}

#[tokio::test]
async fn second_claimant_of_a_nick_gets_433() {
    let addr = start_server().await;
    let mut first = TestClient::connect(addr).await;
    let mut second = TestClient::connect(addr).await;

    first.send("NICK same").await;
    // an unregistered PING draws a 451, proving the server has processed
    // the first claim before the second connection races for it
    first.send("PING sync").await;
    first.expect_line(|l| l.contains(" 451 ")).await;
    second.send("NICK same").await;

    let reply = second.expect_line(|l| l.contains(" 433 ")).await;
    assert_eq!(reply, ":testserver 433 * same :Nickname already in use.");
}

#[tokio::test]
async fn commands_before_registration_are_rejected() {
    let addr = start_server().await;
    let mut client = TestClient::connect(addr).await;

    client.send("JOIN #test").await;
    let reply = client.expect_line(|l| l.contains(" 451 ")).await;
    assert_eq!(reply, ":testserver 451 * :Register first.");
}

#[tokio::test]
async fn join_fan_out_and_names_listing() {
    let addr = start_server().await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;
    alice.register("alice").await;
    bob.register("bob").await;

    alice.send("JOIN #test").await;
    alice.expect_line(|l| l.contains("JOIN #test")).await;

    bob.send("JOIN #test").await;

    // alice sees bob arrive; bob sees his own join and a names listing
    // carrying both nicks
    let seen = alice.expect_line(|l| l.contains("JOIN #test")).await;
    assert!(seen.starts_with(":bob!user@"), "got: {seen}");

    let names = bob.expect_line(|l| l.contains(" 353 ")).await;
    assert!(names.contains("alice") && names.contains("bob"), "got: {names}");
    bob.expect_line(|l| l.contains(" 366 ")).await;
}

#[tokio::test]
async fn channel_message_reaches_everyone_but_the_sender() {
    let addr = start_server().await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;
    alice.register("alice").await;
    bob.register("bob").await;

    alice.send("JOIN #room").await;
    alice.expect_line(|l| l.contains(" 366 ")).await;
    bob.send("JOIN #room").await;
    bob.expect_line(|l| l.contains(" 366 ")).await;
    alice.expect_line(|l| l.contains("JOIN #room")).await;

    alice.send("PRIVMSG #room :hello there").await;
    let relayed = bob.expect_line(|l| l.contains("PRIVMSG #room")).await;
    assert!(relayed.starts_with(":alice!user@"), "got: {relayed}");
    assert!(relayed.ends_with(":hello there"), "got: {relayed}");

    // the sender gets no echo; a follow-up PING/PONG proves nothing else
    // was queued for alice
    alice.send("PING marker").await;
    let next = alice.expect_line(|_| true).await;
    assert_eq!(next, ":testserver PONG :marker");
}

#[tokio::test]
async fn quit_is_relayed_to_channel_peers() {
    let addr = start_server().await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;
    alice.register("alice").await;
    bob.register("bob").await;

    alice.send("JOIN #room").await;
    alice.expect_line(|l| l.contains(" 366 ")).await;
    bob.send("JOIN #room").await;
    bob.expect_line(|l| l.contains(" 366 ")).await;
    alice.expect_line(|l| l.contains("JOIN #room")).await;

    bob.send("QUIT :bye").await;
    let quit = alice.expect_line(|l| l.contains("QUIT")).await;
    assert!(quit.starts_with(":bob!user@"), "got: {quit}");
    assert!(quit.ends_with("QUIT :bye"), "got: {quit}");
}
