//! Simple server that prints messages from a framelink client and replies.
//!
//! Run the server first:
//! - cargo run -p framelink --example server -- 127.0.0.1:7700 127.0.0.1:7701
//!
//! Then run the client against it:
//! - cargo run -p framelink --example client -- 127.0.0.1:7701 127.0.0.1:7700

use std::{env, net::SocketAddr, thread, time::Duration};

use framelink::{Config, Node, SocketEvent, UdpBinding};

/// Socket ids used by the examples: the server listens on 0, clients on 1.
const SERVER_SOCKET: u8 = 0;
const CLIENT_SOCKET: u8 = 1;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let local: SocketAddr = args.next().unwrap_or_else(|| "127.0.0.1:7700".into()).parse()?;
    let peer: SocketAddr = args.next().unwrap_or_else(|| "127.0.0.1:7701".into()).parse()?;

    let mut node = Node::udp(
        &[UdpBinding { port: 0, local, peer }],
        Config::default(),
    )?;
    node.open_port(0)?;
    node.open_socket(0, SERVER_SOCKET)?;

    let replies = node.message_sender();
    node.listen(
        SERVER_SOCKET,
        Box::new(move |socket, event| {
            if let SocketEvent::Received { payload } = event {
                let text = String::from_utf8_lossy(payload);
                println!("[recv] socket={} payload=\"{}\"", socket, text);
                let reply = format!("ack: {}", text);
                let _ = replies.send(framelink::OutboundMessage {
                    src: socket,
                    dst: CLIENT_SOCKET,
                    payload: reply.into_bytes(),
                });
            }
        }),
    )?;

    println!("framelink server on {} (peer {})", local, peer);
    loop {
        node.tick();
        thread::sleep(Duration::from_millis(1));
    }
}
