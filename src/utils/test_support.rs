/// Mock-server tests need a loopback listener; some sandboxes refuse one.
pub fn loopback_unavailable() -> bool {
    match std::net::TcpListener::bind(("127.0.0.1", 0)) {
        Ok(listener) => {
            drop(listener);
            false
        }
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            eprintln!("skipping mock server test: binding 127.0.0.1 is not permitted");
            true
        }
        Err(err) => panic!("failed to bind localhost for mock server tests: {err}"),
    }
}

/// Serves one `GET` with a chunked body that never ends, for exercising
/// size caps. Returns the URL to fetch.
#[cfg(test)]
pub(crate) async fn endless_chunked_body(content_type: &'static str) -> String {
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
        .await
        .expect("bind chunked server");
    let addr = listener.local_addr().expect("chunked server addr");
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;
        let head = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: {content_type}\r\ntransfer-encoding: chunked\r\n\r\n"
        );
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        let chunk = format!("400\r\n{}\r\n", "a".repeat(0x400));
        while socket.write_all(chunk.as_bytes()).await.is_ok() {}
    });
    format!("http://{addr}/endless")
}
