use super::*;
use std::io::ErrorKind;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

struct FakeGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl KeywordGenerator for FakeGenerator {
    async fn generate(&self, title: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if title.contains("fail") {
            anyhow::bail!("boom");
        }
        Ok(format!("kw {}", title.to_lowercase()))
    }
}

fn fake() -> FakeGenerator {
    FakeGenerator {
        calls: AtomicUsize::new(0),
    }
}

fn sheet(headers: &[&str], rows: &[&[&str]]) -> Dataset {
    Dataset {
        headers: headers.iter().map(|h| h.to_string()).collect(),
        rows: rows
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect(),
    }
}

#[test]
fn detects_columns_case_and_space_insensitively() {
    let headers: Vec<String> = ["Product Title", "product_url", "Search Terms", "Price"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    let detected = detect_columns(&headers);
    assert_eq!(detected.title.as_deref(), Some("Product Title"));
    assert_eq!(detected.link.as_deref(), Some("product_url"));
    assert_eq!(detected.keywords.as_deref(), Some("Search Terms"));

    let none = detect_columns(&["Price".to_string()]);
    assert_eq!(none, DetectedColumns::default());
}

#[tokio::test]
async fn fills_only_missing_or_failed_keywords() {
    let data = sheet(
        &["Title", "Keywords", "Links"],
        &[
            &["Red Shoes", "", "http://a"],
            &["Blue Hat", "existing kw", "http://b"],
            &["Green Bag", "Error: timeout", "http://c"],
            &["", "", "http://d"],
            &["will fail", " ", "http://e"],
        ],
    );
    let generator = fake();
    let mut progress = Vec::new();

    let (output, stats) =
        fill_missing_keywords(&data, &generator, Duration::ZERO, |done, total| {
            progress.push((done, total))
        })
        .await
        .expect("fill");

    assert_eq!(
        stats,
        KeywordStats {
            generated: 2,
            failed: 1,
            skipped: 2
        }
    );
    assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    assert_eq!(output.headers, vec!["Keywords", "Links"]);
    assert_eq!(output.rows[0], vec!["kw red shoes", "http://a"]);
    assert_eq!(output.rows[1], vec!["existing kw", "http://b"]);
    assert_eq!(output.rows[2][0], "kw green bag");
    assert_eq!(output.rows[3][0], "");
    assert_eq!(output.rows[4][0], "ERROR: boom");
    assert_eq!(progress.len(), 5);
    assert_eq!(progress.last(), Some(&(5, 5)));
}

#[tokio::test]
async fn missing_keyword_and_link_columns() {
    let data = sheet(&["product title"], &[&["Lamp"]]);
    let (output, stats) = fill_missing_keywords(&data, &fake(), Duration::ZERO, |_, _| {})
        .await
        .expect("fill");

    assert_eq!(output.headers, vec!["Keywords"]);
    assert_eq!(output.rows, vec![vec!["kw lamp".to_string()]]);
    assert_eq!(stats.generated, 1);
}

#[tokio::test]
async fn missing_title_column_is_an_error() {
    let data = sheet(&["Keywords"], &[&[""]]);
    let err = fill_missing_keywords(&data, &fake(), Duration::ZERO, |_, _| {})
        .await
        .unwrap_err();
    assert!(format!("{err}").contains("No product title column"));
}

/// Reads one HTTP request (headers plus Content-Length body).
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
        let content_length = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= header_end + 4 + content_length {
            return;
        }
    }
}

async fn start_test_server(
    status_line: &str,
    body: &str,
    expected_requests: usize,
    request_counter: Arc<AtomicUsize>,
) -> Option<String> {
    let listener = match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        // Sandboxed environments may forbid binding; callers skip.
        Err(e) if e.kind() == ErrorKind::PermissionDenied => return None,
        Err(e) => panic!("failed to bind test listener: {e}"),
    };

    let addr = listener.local_addr().expect("local_addr");
    let base_url = format!("http://{addr}/openai/v1/chat/completions");
    let status_line = status_line.to_string();
    let body = body.to_string();

    tokio::spawn(async move {
        for _ in 0..expected_requests {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };

            read_request(&mut socket).await;
            request_counter.fetch_add(1, Ordering::SeqCst);

            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Length: {len}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{body}",
                len = body.len(),
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    Some(base_url)
}

fn test_config(api_url: String, retries: u32) -> KeywordsConfig {
    KeywordsConfig {
        api_url,
        retries,
        retry_delay_ms: 0,
        timeout_seconds: 5,
        ..KeywordsConfig::default()
    }
}

#[tokio::test]
async fn groq_generator_returns_trimmed_content() {
    let counter = Arc::new(AtomicUsize::new(0));
    let Some(url) = start_test_server(
        "200 OK",
        r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"  running shoes\n"}}]}"#,
        1,
        counter.clone(),
    )
    .await
    else {
        eprintln!("Skipping test: unable to bind local HTTP server");
        return;
    };

    let generator = GroqGenerator::new(&test_config(url, 3), "TEST_KEY".to_string()).unwrap();
    let keyword = generator.generate("Nike Air Zoom 42").await.expect("keyword");

    assert_eq!(keyword, "running shoes");
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn groq_generator_retries_server_errors() {
    let counter = Arc::new(AtomicUsize::new(0));
    let Some(url) = start_test_server(
        "500 Internal Server Error",
        r#"{"error":"down"}"#,
        3,
        counter.clone(),
    )
    .await
    else {
        eprintln!("Skipping test: unable to bind local HTTP server");
        return;
    };

    let generator = GroqGenerator::new(&test_config(url, 3), "TEST_KEY".to_string()).unwrap();
    let err = generator.generate("Lamp").await.unwrap_err();

    assert!(format!("{err}").contains("500"), "unexpected error: {err}");
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn groq_generator_gives_up_when_rate_limited() {
    let counter = Arc::new(AtomicUsize::new(0));
    let Some(url) = start_test_server(
        "429 Too Many Requests",
        r#"{"error":"slow down"}"#,
        2,
        counter.clone(),
    )
    .await
    else {
        eprintln!("Skipping test: unable to bind local HTTP server");
        return;
    };

    let generator = GroqGenerator::new(&test_config(url, 2), "TEST_KEY".to_string()).unwrap();
    let err = generator.generate("Lamp").await.unwrap_err();

    assert!(format!("{err}").contains("Rate limited"));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}
