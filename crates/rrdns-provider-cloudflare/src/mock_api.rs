//! Minimal in-process stand-in for the Cloudflare v4 API
//!
//! Serves one request per connection over plain HTTP on localhost and keeps
//! records in memory. Only the endpoints the backend calls are implemented.

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct MockRecord {
    pub id: String,
    pub name: String,
    pub record_type: String,
    pub content: String,
    pub ttl: u64,
}

#[derive(Debug)]
struct State {
    token: String,
    zones: Vec<String>,
    records: Vec<MockRecord>,
    next_id: u64,
}

pub struct MockApi {
    port: u16,
    state: Arc<Mutex<State>>,
}

impl MockApi {
    pub async fn start(token: &str, zones: &[&str]) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(State {
            token: token.to_string(),
            zones: zones.iter().map(|z| z.to_string()).collect(),
            records: Vec::new(),
            next_id: 1,
        }));

        let shared = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let state = Arc::clone(&shared);
                tokio::spawn(async move {
                    let _ = serve(socket, state).await;
                });
            }
        });

        Self { port, state }
    }

    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}/client/v4", self.port)
    }

    pub fn records(&self) -> Vec<MockRecord> {
        self.state.lock().unwrap().records.clone()
    }
}

struct Request {
    method: String,
    path: String,
    query: Vec<(String, String)>,
    authorization: Option<String>,
    body: Vec<u8>,
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                match u8::from_str_radix(hex, 16) {
                    Ok(b) => {
                        out.push(b);
                        i += 3;
                    }
                    Err(_) => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

async fn read_request(socket: &mut TcpStream) -> std::io::Result<Request> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_header_end(&buf) {
            break end;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    let mut authorization = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().unwrap_or(0),
                "authorization" => authorization = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (target.clone(), String::new()),
    };
    let query = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(k), percent_decode(v))
        })
        .collect();

    Ok(Request {
        method,
        path,
        query,
        authorization,
        body: buf[header_end..].to_vec(),
    })
}

fn param<'a>(request: &'a Request, key: &str) -> Option<&'a str> {
    request
        .query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn failure(status: u16, message: &str) -> (u16, Value) {
    (
        status,
        json!({ "success": false, "errors": [{ "code": status, "message": message }], "result": null }),
    )
}

fn route(request: &Request, state: &Mutex<State>) -> (u16, Value) {
    let mut state = state.lock().unwrap();

    let expected = format!("Bearer {}", state.token);
    if request.authorization.as_deref() != Some(expected.as_str()) {
        return failure(403, "Authentication error");
    }

    let path = request.path.strip_prefix("/client/v4").unwrap_or(&request.path);
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match (request.method.as_str(), segments.as_slice()) {
        ("GET", ["zones"]) => {
            let name = param(request, "name").unwrap_or_default();
            let result: Vec<Value> = state
                .zones
                .iter()
                .enumerate()
                .filter(|(_, zone)| zone.as_str() == name)
                .map(|(i, zone)| json!({ "id": format!("zone-{i}"), "name": zone }))
                .collect();
            (200, json!({ "success": true, "errors": [], "result": result }))
        }
        ("GET", ["zones", _, "dns_records"]) => {
            let name = param(request, "name");
            let record_type = param(request, "type");
            let content = param(request, "content");
            let result: Vec<Value> = state
                .records
                .iter()
                .filter(|r| name.is_none_or(|n| r.name == n))
                .filter(|r| record_type.is_none_or(|t| r.record_type == t))
                .filter(|r| content.is_none_or(|c| r.content == c))
                .map(|r| {
                    json!({
                        "id": r.id, "name": r.name, "type": r.record_type,
                        "content": r.content, "ttl": r.ttl
                    })
                })
                .collect();
            (
                200,
                json!({
                    "success": true, "errors": [], "result": result,
                    "result_info": { "page": 1, "total_pages": 1 }
                }),
            )
        }
        ("POST", ["zones", _, "dns_records"]) => {
            let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
                return failure(400, "Invalid JSON body");
            };
            let id = format!("rec-{}", state.next_id);
            state.next_id += 1;
            let record = MockRecord {
                id: id.clone(),
                name: body["name"].as_str().unwrap_or_default().to_string(),
                record_type: body["type"].as_str().unwrap_or_default().to_string(),
                content: body["content"].as_str().unwrap_or_default().to_string(),
                ttl: body["ttl"].as_u64().unwrap_or(1),
            };
            state.records.push(record);
            (200, json!({ "success": true, "errors": [], "result": { "id": id } }))
        }
        ("DELETE", ["zones", _, "dns_records", id]) => {
            let before = state.records.len();
            state.records.retain(|r| r.id != *id);
            if state.records.len() == before {
                return failure(404, "Record not found");
            }
            (200, json!({ "success": true, "errors": [], "result": { "id": id } }))
        }
        _ => failure(404, "No route"),
    }
}

async fn serve(mut socket: TcpStream, state: Arc<Mutex<State>>) -> std::io::Result<()> {
    let request = read_request(&mut socket).await?;
    let (status, body) = route(&request, &state);
    let body = body.to_string();
    let response = format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        if status < 400 { "OK" } else { "Error" },
        body.len()
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}
