//! Simple client that sends messages to a framelink server and prints
//! replies.
//!
//! Run the server first:
//! - cargo run -p framelink --example server -- 127.0.0.1:7700 127.0.0.1:7701
//!
//! Then run the client:
//! - cargo run -p framelink --example client -- 127.0.0.1:7701 127.0.0.1:7700
//! - cargo run -p framelink --example client -- 127.0.0.1:7701 127.0.0.1:7700 10 200
//!   (sends 10 messages, 200ms apart)

use std::{env, net::SocketAddr, thread, time::Duration};

use framelink::{Config, Node, SocketEvent, UdpBinding};

const SERVER_SOCKET: u8 = 0;
const CLIENT_SOCKET: u8 = 1;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Args: <local_addr> <server_addr> [count] [interval_ms]
    let mut args = env::args().skip(1);
    let local: SocketAddr = args.next().unwrap_or_else(|| "127.0.0.1:7701".into()).parse()?;
    let peer: SocketAddr = args.next().unwrap_or_else(|| "127.0.0.1:7700".into()).parse()?;
    let count: usize = args.next().unwrap_or_else(|| "5".into()).parse().unwrap_or(5);
    let interval_ms: u64 = args.next().unwrap_or_else(|| "300".into()).parse().unwrap_or(300);

    let mut node = Node::udp(
        &[UdpBinding { port: 0, local, peer }],
        Config::default(),
    )?;
    node.open_port(0)?;
    node.open_socket(0, CLIENT_SOCKET)?;

    node.listen(
        CLIENT_SOCKET,
        Box::new(|_, event| match event {
            SocketEvent::Received { payload } => {
                println!("[reply] \"{}\"", String::from_utf8_lossy(payload));
            }
            SocketEvent::SendComplete { result: Ok(()) } => {
                println!("[sent] acknowledged by server");
            }
            SocketEvent::SendComplete { result: Err(err) } => {
                println!("[sent] failed: {}", err);
            }
        }),
    )?;

    println!(
        "framelink client on {} -> sending {} messages to {} (every {}ms)",
        local, count, peer, interval_ms
    );

    for i in 0..count {
        let msg = format!("hello {} from {}", i, local);
        node.send(CLIENT_SOCKET, SERVER_SOCKET, msg.as_bytes())?;

        let ticks = interval_ms.max(1);
        for _ in 0..ticks {
            node.tick();
            thread::sleep(Duration::from_millis(1));
        }
    }

    // Drain any late replies before exiting.
    for _ in 0..200 {
        node.tick();
        thread::sleep(Duration::from_millis(1));
    }
    Ok(())
}
