use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::header::AUTHORIZATION;
use std::io::Read;

use crate::config::HttpConfig;

/// Status and raw body of a completed request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Blocking HTTP seam used by the session, query and download code.
///
/// `Err` means the request never produced a response (DNS, connect, timeout).
/// Any status code, including errors, comes back as `Ok`.
pub trait Transport {
    fn get(&self, url: &str, authorization: &str) -> Result<HttpResponse>;
    fn post_json(&self, url: &str, authorization: &str, body: Vec<u8>) -> Result<HttpResponse>;
}

/// `read_timeout` bounds the wait for the response head and then each
/// individual read of the body, not the transfer as a whole. A large message
/// on a slow link finishes as long as bytes keep arriving.
pub struct HttpTransport {
    client: Client,
}

/// Drain the body with `Read` so the client timeout is applied per read.
/// `Response::bytes` would apply it to the whole body instead.
fn read_body(mut resp: Response, url: &str) -> Result<HttpResponse> {
    let status = resp.status().as_u16();
    let mut body = Vec::new();
    resp.read_to_end(&mut body)
        .with_context(|| format!("reading body of {url}"))?;
    Ok(HttpResponse { status, body })
}

impl HttpTransport {
    pub fn new(cfg: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(cfg.connect_timeout)
            .timeout(cfg.read_timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, authorization: &str) -> Result<HttpResponse> {
        let resp = self
            .client
            .get(url)
            .header(AUTHORIZATION, authorization)
            .send()
            .with_context(|| format!("GET {url}"))?;
        read_body(resp, url)
    }

    fn post_json(&self, url: &str, authorization: &str, body: Vec<u8>) -> Result<HttpResponse> {
        let resp = self
            .client
            .post(url)
            .header(AUTHORIZATION, authorization)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .with_context(|| format!("POST {url}"))?;
        read_body(resp, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Serve one response whose body trickles out in `chunks` pieces,
    /// `gap` apart. Returns the URL to fetch.
    fn trickle_server(chunks: usize, gap: Duration) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/blob", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut seen = Vec::new();
            let mut buf = [0u8; 1024];
            while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = conn.read(&mut buf).unwrap();
                if n == 0 {
                    return;
                }
                seen.extend_from_slice(&buf[..n]);
            }
            write!(
                conn,
                "HTTP/1.1 200 OK\r\nContent-Length: {chunks}\r\nConnection: close\r\n\r\n"
            )
            .unwrap();
            conn.flush().unwrap();
            for _ in 0..chunks {
                thread::sleep(gap);
                conn.write_all(b"x").unwrap();
                conn.flush().unwrap();
            }
        });
        (url, handle)
    }

    #[test]
    fn slow_body_outlives_read_timeout_when_bytes_keep_coming() {
        let transport = HttpTransport::new(HttpConfig {
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
        })
        .unwrap();
        let (url, server) = trickle_server(8, Duration::from_millis(300));

        let started = Instant::now();
        let resp = transport.get(&url, "Bearer t").unwrap();
        assert!(started.elapsed() > Duration::from_secs(2));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"xxxxxxxx");
        server.join().unwrap();
    }

    #[test]
    fn stalled_body_times_out() {
        let transport = HttpTransport::new(HttpConfig {
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_millis(300),
        })
        .unwrap();
        let (url, server) = trickle_server(2, Duration::from_millis(1500));

        assert!(transport.get(&url, "Bearer t").is_err());
        // the server may see a reset once the client gives up
        let _ = server.join();
    }
}
