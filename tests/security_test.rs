// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

#[cfg(test)]
mod security_tests {
    //! # 安全回归测试
    //!
    //! 覆盖范围：
    //! - 路径遍历，包括百分号编码的 `..`
    //! - 超长标头
    //! - 畸形请求行与标头行
    //! - 中途断开的连接不会影响后续请求

    use std::{fs, net::SocketAddr, path::Path, sync::Arc, time::Duration};

    use naive_webserver::{
        Config, Exception, ScriptEngine, ScriptOutput, ScriptRecord, Server, ServerHandle,
    };
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    /// 安全测试不会执行到任何脚本
    struct NoScripts;

    impl ScriptEngine for NoScripts {
        fn execute(&self, _: &Path, _: &ScriptRecord) -> Result<ScriptOutput, Exception> {
            Err(Exception::ScriptExecuteFailed)
        }
    }

    /// 文档根目录位于 `<tmp>/www`，`<tmp>/secret.txt` 不应被访问到
    async fn start() -> (TempDir, SocketAddr, ServerHandle) {
        let dir = TempDir::new().unwrap();
        let www = dir.path().join("www");
        fs::create_dir(&www).unwrap();
        fs::write(www.join("index.html"), "public").unwrap();
        fs::write(dir.path().join("secret.txt"), "TOP-SECRET").unwrap();

        let config = Config::new()
            .with_root(www.to_str().unwrap())
            .with_port(0)
            .with_max_connections(2);
        let server = Server::bind(&config, Arc::new(NoScripts)).unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();
        tokio::spawn(server.run());
        (dir, addr, handle)
    }

    async fn send_request(addr: SocketAddr, request: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut buffer = Vec::new();
        // 设置硬超时限制，防止测试用例因服务器挂起而永久阻塞
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buffer))
            .await
            .unwrap()
            .unwrap();
        String::from_utf8_lossy(&buffer).to_string()
    }

    /// 从原始响应字符串中提取 HTTP 状态码
    fn extract_status_code(response: &str) -> u16 {
        response
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|code| code.parse().ok())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_path_traversal() {
        let (_dir, addr, _) = start().await;
        let attacks = [
            "/../secret.txt",
            "/%2e%2e/secret.txt",
            "/%2E%2E/%2e%2e/secret.txt",
            "/sub/../../secret.txt",
            "/..%2fsecret.txt",
        ];
        for path in attacks {
            let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path);
            let response = send_request(addr, request.as_bytes()).await;
            assert_eq!(extract_status_code(&response), 400, "{}", path);
            assert!(!response.contains("TOP-SECRET"), "{}", path);
        }
    }

    #[tokio::test]
    async fn test_invalid_percent_escape() {
        let (_dir, addr, _) = start().await;
        let response = send_request(addr, b"GET /%zz HTTP/1.1\r\n\r\n").await;
        assert_eq!(extract_status_code(&response), 400);
    }

    /// 恰好达到上限字节数且没有换行的请求行
    #[tokio::test]
    async fn test_oversized_header() {
        let (_dir, addr, _) = start().await;
        let mut request = b"GET /".to_vec();
        request.resize(8192, b'a');
        let response = send_request(addr, &request).await;
        assert_eq!(extract_status_code(&response), 400);
    }

    #[tokio::test]
    async fn test_malformed_requests() {
        let (_dir, addr, _) = start().await;
        let requests: [&[u8]; 4] = [
            b"GET\r\n\r\n",
            b"GET /\r\n\r\n",
            b"GET / HTTP/1.1\r\nBrokenHeader\r\n\r\n",
            b"GET /\xff HTTP/1.1\r\n\r\n",
        ];
        for request in requests {
            let response = send_request(addr, request).await;
            assert_eq!(
                extract_status_code(&response),
                400,
                "{}",
                String::from_utf8_lossy(request)
            );
        }
    }

    #[tokio::test]
    async fn test_abandoned_connections() {
        let (_dir, addr, handle) = start().await;

        // 连接后立刻关闭，以及只发送半个请求行后关闭
        drop(TcpStream::connect(addr).await.unwrap());
        let mut partial = TcpStream::connect(addr).await.unwrap();
        partial.write_all(b"GET /index.ht").await.unwrap();
        partial.shutdown().await.unwrap();
        let mut buffer = Vec::new();
        partial.read_to_end(&mut buffer).await.unwrap();
        assert_eq!(extract_status_code(&String::from_utf8_lossy(&buffer)), 400);

        let response = send_request(addr, b"GET /index.html HTTP/1.1\r\n\r\n").await;
        assert_eq!(extract_status_code(&response), 200);
        assert!(response.ends_with("public"));
        assert!(handle.active() <= handle.capacity());
    }

    /// 客户端提供的 Content-Length 与 Connection 不会影响响应
    #[tokio::test]
    async fn test_request_headers_do_not_leak() {
        let (_dir, addr, _) = start().await;
        let response = send_request(
            addr,
            b"GET /index.html HTTP/1.1\r\nConnection: keep-alive\r\nContent-Length: 999\r\n\r\n",
        )
        .await;
        assert!(response.contains("Connection: close\r\n"));
        assert!(response.contains("Content-Length: 6\r\n"));
    }
}
