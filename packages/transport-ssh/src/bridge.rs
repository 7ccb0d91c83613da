//! Splices a WebSocket's binary frames into a plain `AsyncRead + AsyncWrite`
//! byte stream that `russh` can drive directly (spec §4.6 framing rule:
//! binary frames only, concatenated unmodified; no text frames produced).

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

const BRIDGE_BUFFER: usize = 64 * 1024;
const CHUNK: usize = 16 * 1024;

pub struct IoBridge {
    pub ssh_side: DuplexStream,
    read_pump: JoinHandle<()>,
    write_pump: JoinHandle<()>,
}

impl IoBridge {
    pub fn spawn(ws: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        let (ssh_side, bridge_side) = tokio::io::duplex(BRIDGE_BUFFER);
        let (mut ws_sink, mut ws_stream) = ws.split();
        let (mut bridge_read, mut bridge_write) = tokio::io::split(bridge_side);

        // ssh_side -> websocket: every write becomes exactly one binary frame.
        let read_pump = tokio::spawn(async move {
            let mut buf = [0u8; CHUNK];
            loop {
                match bridge_read.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if ws_sink.send(Message::Binary(buf[..n].to_vec())).await.is_err() {
                            break;
                        }
                    }
                }
            }
            let _ = ws_sink.close().await;
        });

        // websocket -> ssh_side: binary frames are concatenated unmodified;
        // any other frame kind is dropped (undefined behavior per spec).
        let write_pump = tokio::spawn(async move {
            while let Some(msg) = ws_stream.next().await {
                match msg {
                    Ok(Message::Binary(data)) => {
                        if bridge_write.write_all(&data).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        });

        Self {
            ssh_side,
            read_pump,
            write_pump,
        }
    }

    pub fn abort(&self) {
        self.read_pump.abort();
        self.write_pump.abort();
    }
}
