//! Two sockets chatting over an in-process loopback pair.
//!
//! Run with:
//! - cargo run -p framelink --example loopback

use framelink::{Node, SocketEvent};

fn main() {
    let mut node = Node::loopback();
    node.open_port(0).unwrap();
    node.open_port(1).unwrap();
    node.open_socket(0, 0).unwrap();
    node.open_socket(1, 1).unwrap();

    // Socket 1 echoes everything it hears back to socket 0 through the
    // cross-thread send handle (listeners cannot touch the node directly).
    let echo = node.message_sender();
    node.listen(
        1,
        Box::new(move |socket, event| {
            if let SocketEvent::Received { payload } = event {
                println!("[socket {}] received {:?}", socket, String::from_utf8_lossy(payload));
                let _ = echo.send(framelink::OutboundMessage {
                    src: socket,
                    dst: 0,
                    payload: payload.to_vec(),
                });
            }
        }),
    )
    .unwrap();

    node.listen(
        0,
        Box::new(|socket, event| match event {
            SocketEvent::Received { payload } => {
                println!("[socket {}] echo came back: {:?}", socket, String::from_utf8_lossy(payload));
            }
            SocketEvent::SendComplete { result } => {
                println!("[socket {}] send completed: {:?}", socket, result);
            }
        }),
    )
    .unwrap();

    node.send(0, 1, b"ping over the loopback").unwrap();

    for _ in 0..10 {
        node.tick();
    }
}
