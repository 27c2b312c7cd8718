use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

static COVER_JPG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0xFF, 0xD9];

/// Local stand-in for the catalog site: two wish-list pages for `reader`,
/// an empty third page, one working cover, one 404 cover, and a `broken`
/// user whose list always fails with 500.
pub struct CatalogStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CatalogStub {
    pub fn spawn() -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start catalog stub server");
        let base_url = format!("http://{}", server.server_addr());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let log = Arc::clone(&requests);
        let page_base = base_url.clone();
        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let url = request.url().to_string();
                log.lock().expect("lock request log").push(url.clone());

                let (status, content_type, body) = match url.as_str() {
                    "/people/reader/wish?start=0" => {
                        (200, "text/html; charset=utf-8", first_page(&page_base).into_bytes())
                    }
                    "/people/reader/wish?start=15" => {
                        (200, "text/html; charset=utf-8", second_page(&page_base).into_bytes())
                    }
                    "/people/reader/wish?start=30" => (
                        200,
                        "text/html; charset=utf-8",
                        EMPTY_PAGE.as_bytes().to_vec(),
                    ),
                    _ if url.split('?').next() == Some("/covers/101.jpg") => {
                        (200, "image/jpeg", COVER_JPG.to_vec())
                    }
                    _ if url.starts_with("/people/broken/") => {
                        (500, "text/plain", b"internal error".to_vec())
                    }
                    _ => (404, "text/plain", b"not found".to_vec()),
                };

                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
                        .expect("build header");
                let response = tiny_http::Response::from_data(body)
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.requests
            .lock()
            .expect("lock request log")
            .iter()
            .filter(|url| url.as_str() == path)
            .count()
    }

    pub fn cover_jpg() -> &'static [u8] {
        COVER_JPG
    }
}

impl Drop for CatalogStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

const EMPTY_PAGE: &str = r#"<!doctype html>
<html><body>
<ul class="interest-list"></ul>
<div class="paginator"><span class="next"><a href="?start=45">后页&gt;</a></span></div>
</body></html>
"#;

fn first_page(base: &str) -> String {
    format!(
        r#"<!doctype html>
<html><body>
<ul class="interest-list">
  <li class="subject-item">
    <div class="pic"><a href="{base}/subject/101/"><img src="{base}/covers/101.jpg?w=90"></a></div>
    <div class="info">
      <h2><a href="{base}/subject/101/?from=wish">Book A</a></h2>
      <div class="pub">Author A / Press A / 2001-1</div>
      <div class="short-note"><span class="date">2024-01-02 想读</span></div>
      <span class="rating_nums">9.1</span>
      <span class="rating_people"><span class="pl">(42人评价)</span></span>
    </div>
  </li>
  <li class="subject-item">
    <div class="pic"><a href="{base}/subject/102/"><img src="{base}/covers/missing.jpg"></a></div>
    <div class="info">
      <h2><a href="{base}/subject/102/">Book B</a></h2>
      <div class="pub">Press B</div>
    </div>
  </li>
</ul>
<div class="paginator"><span class="next"><a href="?start=15">后页&gt;</a></span></div>
</body></html>
"#
    )
}

fn second_page(base: &str) -> String {
    format!(
        r#"<!doctype html>
<html><body>
<ul class="interest-list">
  <li class="subject-item">
    <div class="info">
      <h2><a href="{base}/subject/103/">Book C</a></h2>
      <p>A book without a cover.</p>
    </div>
  </li>
</ul>
<div class="paginator"><span class="next"><a href="?start=30">后页&gt;</a></span></div>
</body></html>
"#
    )
}
