// Copyright (C) 2025  Tom Waddington
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Websocket client for the ttyd terminal bridge
//!
//! Keys go out as input frames. Terminal output coming back is optionally
//! mirrored to stdout.

use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

// ttyd frame prefixes, client to server
const INPUT: u8 = b'0';
// server to client
const OUTPUT: u8 = b'0';

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

pub struct BridgeConnection {
    sink: WsSink,
    reader: JoinHandle<()>,
}

impl BridgeConnection {
    pub async fn connect(port: u16, size: (u16, u16), mirror: bool) -> Result<Self, tungstenite::Error> {
        let mut request = format!("ws://127.0.0.1:{port}/ws").into_client_request()?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("tty"));

        let (socket, _response) = connect_async(request).await?;
        let (mut sink, mut stream) = socket.split();

        // The first frame opens the terminal at the given size
        let (columns, rows) = size;
        let init = json!({ "AuthToken": "", "columns": columns, "rows": rows });
        sink.send(Message::Text(init.to_string())).await?;

        let reader = tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(frame) = stream.next().await {
                let data = match frame {
                    Ok(Message::Binary(data)) => data,
                    Ok(Message::Text(text)) => text.into_bytes(),
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };

                if !mirror {
                    continue;
                }
                if let Some((&OUTPUT, output)) = data.split_first() {
                    if stdout.write_all(output).await.is_err() || stdout.flush().await.is_err() {
                        break;
                    }
                }
            }
            debug!("terminal bridge output closed");
        });

        Ok(Self { sink, reader })
    }

    pub async fn send_input(&mut self, bytes: &[u8]) -> Result<(), tungstenite::Error> {
        let mut frame = Vec::with_capacity(bytes.len() + 1);
        frame.push(INPUT);
        frame.extend_from_slice(bytes);
        self.sink.send(Message::Binary(frame)).await
    }

    pub async fn close(mut self) {
        let _ = self.sink.close().await;
    }
}

impl Drop for BridgeConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
