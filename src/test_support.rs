//! HTTP fixtures for provider tests

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Full HTTP/1.1 response with a JSON body
pub fn json_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Serve `responses` in order, one per connection
///
/// Each request is read in full (headers plus `Content-Length` body) before
/// its response is written. Returns the bound port.
pub async fn spawn_mock_server(responses: Vec<String>) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let (reader, mut writer) = stream.split();
            let mut reader = BufReader::new(reader);

            let mut line = String::new();
            let mut content_length = 0usize;
            loop {
                line.clear();
                let read = reader.read_line(&mut line).await.unwrap_or(0);
                if read == 0 || line == "\r\n" || line == "\n" {
                    break;
                }
                let lower = line.to_lowercase();
                if let Some(value) = lower.strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }

            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).await.ok();

            writer.write_all(response.as_bytes()).await.ok();
            writer.shutdown().await.ok();
        }
    });

    (port, handle)
}
