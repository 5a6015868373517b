//! A throwaway HTTP/1.1 server for exercising the WebGIS client without the
//! real service. One request per connection, answered from a fixed route
//! table, every request recorded for later assertions.
#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;

use lib_webgis::configs::{ConfigLayer, DatasetDescriptor, RawNaming, TrafficConfig};

pub const BASE_PATH: &str = "/MAppEnterprise";
pub const TOKEN_PATH: &str = "/MAppEnterprise/api/v1/oauth2/token";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path plus query, as sent.
    pub target: String,
    /// Lower-cased names.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Route {
    method: &'static str,
    path_prefix: String,
    status: u16,
    body: String,
}

impl Route {
    pub fn new(method: &'static str, path_prefix: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            method,
            path_prefix: path_prefix.into(),
            status,
            body: body.into(),
        }
    }

    pub fn token(status: u16, body: impl Into<String>) -> Self {
        Self::new("POST", TOKEN_PATH, status, body)
    }

    pub fn dataset(id: &str, status: u16, body: impl Into<String>) -> Self {
        Self::new(
            "GET",
            format!("{}/api/v1/featureanalyzer/datasets/{}/values", BASE_PATH, id),
            status,
            body,
        )
    }
}

pub struct MockServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServer {
    /// Binds a random local port and serves `routes` until the test process
    /// exits. Unmatched requests get a 404.
    pub fn start(routes: Vec<Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port");
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let _ = serve(stream, &routes, &recorded);
            }
        });

        Self {
            base_url: format!("http://127.0.0.1:{}{}", port, BASE_PATH),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path_prefix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.target.starts_with(path_prefix))
            .collect()
    }
}

/// Answers one request. It is recorded before the response goes out so the
/// client never observes a reply whose request is missing from the log.
fn serve(stream: TcpStream, routes: &[Route], recorded: &Mutex<Vec<RecordedRequest>>) -> Option<()> {
    let mut reader = BufReader::new(stream.try_clone().ok()?);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }

    let length = headers
        .iter()
        .find(|(n, _)| n == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).ok()?;

    let (status, payload) = routes
        .iter()
        .find(|r| r.method == method && target.starts_with(&r.path_prefix))
        .map(|r| (r.status, r.body.clone()))
        .unwrap_or((404, r#"{"error":"not found"}"#.to_string()));

    recorded.lock().unwrap().push(RecordedRequest {
        method,
        target,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let mut stream = stream;
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason(status),
        payload.len(),
        payload
    );
    stream.write_all(response.as_bytes()).ok()?;
    stream.flush().ok()
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// A run configuration pointing at `base_url` and writing into `output_dir`.
pub fn test_config(base_url: &str, output_dir: &Path, datasets: &[&str], raw_naming: RawNaming) -> TrafficConfig {
    let layer = ConfigLayer {
        base_url: Some(base_url.to_string()),
        output_dir: Some(output_dir.to_path_buf()),
        datasets: Some(
            datasets
                .iter()
                .map(|id| DatasetDescriptor::new(*id, Vec::new()))
                .collect(),
        ),
        timeout_secs: Some(10),
        raw_naming: Some(raw_naming),
        ..Default::default()
    };
    TrafficConfig::from_layer(layer).unwrap()
}
