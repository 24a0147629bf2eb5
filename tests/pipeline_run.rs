//! End-to-end runs of the pipeline against a mock HTTP server.
//!
//! Each test gets its own directory under the system temp dir holding the
//! source list, template, override lists and outputs.

use chanlist::config::Config;
use chanlist::pipeline;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEMPLATE: &str = "\
# Test template
News,#genre#
CCTV1|CCTV-1|中央一套
CNN
Dead News
Sports,#genre#
ESPN
";

struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("chanlist-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        Self { dir }
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn read(&self, path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    fn config(&self, source_url: &str) -> Config {
        let mut config = Config::default();
        config.paths.sources = self.write("urls.txt", &format!("# sources\n{source_url}\n"));
        config.paths.template = self.write("templates.txt", TEMPLATE);
        config.paths.whitelist = self.dir.join("whitelist.txt");
        config.paths.blacklist = self.write("blacklist.txt", "blocked.m3u8\n");
        config.paths.failed_urls = self.dir.join("failed_urls.txt");
        config.paths.uncategorized = self.dir.join("uncategorized.txt");
        config.main.output_dir = self.dir.join("outputs");
        config.fetcher.retries = 0;
        config.fetcher.timeout_secs = 5.0;
        config.tester.max_attempts = 1;
        config.tester.retry_delay_ms = 0;
        config.tester.chunk_pause_ms = 0;
        config.tester.timeout_secs = 5.0;
        config
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

async fn mock_streams() -> MockServer {
    let server = MockServer::start().await;
    let uri = server.uri();
    let playlist = format!(
        "新闻,#genre#\n\
         CCTV1 HD,{uri}/cctv1.m3u8\n\
         中央一套,{uri}/cctv1.m3u8\n\
         ESPN,{uri}/espn.m3u8\n\
         Random Channel,{uri}/random.m3u8\n\
         CNN,{uri}/blocked.m3u8\n\
         Dead News,{uri}/dead.m3u8\n"
    );
    Mock::given(path("/list.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(playlist))
        .mount(&server)
        .await;
    for live in ["/cctv1.m3u8", "/espn.m3u8"] {
        Mock::given(path(live))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 2048]))
            .mount(&server)
            .await;
    }
    Mock::given(path("/dead.m3u8"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_full_run_classifies_probes_and_exports() {
    let server = mock_streams().await;
    let uri = server.uri();
    let ws = Workspace::new("full-run");
    let config = ws.config(&format!("{uri}/list.txt"));

    let summary = pipeline::run(&config, false).await.unwrap();

    assert_eq!(summary.sources, 1);
    assert_eq!(summary.parsed, 6);
    assert_eq!(summary.uncategorized, 1);
    assert_eq!(summary.blacklisted, 1);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.probed, 3);
    assert_eq!(summary.online, 2);
    assert_eq!(summary.failed_urls, 1);
    assert_eq!(summary.files_failed, 0);

    let all_txt = ws.read(&config.main.output_dir.join("all.txt"));
    assert_eq!(
        all_txt,
        format!("News,#genre#\nCCTV1,{uri}/cctv1.m3u8\n\nSports,#genre#\nESPN,{uri}/espn.m3u8\n")
    );

    let all_m3u = ws.read(&config.main.output_dir.join("all.m3u"));
    assert!(all_m3u.starts_with("#EXTM3U"));
    assert!(all_m3u.contains("group-title=\"Sports\""));
    assert!(!all_m3u.contains("dead.m3u8"));

    let failed = ws.read(&config.paths.failed_urls);
    assert_eq!(failed, format!("{uri}/dead.m3u8\n"));

    let uncategorized = ws.read(&config.paths.uncategorized);
    assert!(uncategorized.contains(&format!("新闻,#genre#\nRandom Channel,{uri}/random.m3u8\n")));
}

#[tokio::test]
async fn test_whitelisted_channel_online_and_first() {
    let server = mock_streams().await;
    let uri = server.uri();
    let ws = Workspace::new("whitelist");
    let mut config = ws.config(&format!("{uri}/list.txt"));
    config.paths.whitelist = ws.write("whitelist.txt", "# trusted\ndead.m3u8\n");

    let summary = pipeline::run(&config, false).await.unwrap();

    assert_eq!(summary.online, 3);
    assert_eq!(summary.failed_urls, 0);
    assert!(!config.paths.failed_urls.exists());

    let all_txt = ws.read(&config.main.output_dir.join("all.txt"));
    let lines: Vec<&str> = all_txt.lines().collect();
    assert_eq!(lines[0], "News,#genre#");
    assert_eq!(lines[1], format!("Dead News,{uri}/dead.m3u8"));
    assert_eq!(lines[2], format!("CCTV1,{uri}/cctv1.m3u8"));
}

#[tokio::test]
async fn test_keep_uncategorized_probes_and_exports_them() {
    let server = mock_streams().await;
    let uri = server.uri();
    Mock::given(path("/random.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 1024]))
        .mount(&server)
        .await;
    let ws = Workspace::new("keep-uncategorized");
    let mut config = ws.config(&format!("{uri}/list.txt"));
    config.matcher.keep_uncategorized = true;

    let summary = pipeline::run(&config, false).await.unwrap();

    assert_eq!(summary.probed, 4);
    assert_eq!(summary.online, 3);
    let all_txt = ws.read(&config.main.output_dir.join("all.txt"));
    assert!(all_txt.ends_with(&format!("uncategorized,#genre#\nRandom Channel,{uri}/random.m3u8\n")));
    let uncategorized = ws.read(&config.paths.uncategorized);
    assert!(uncategorized.contains(&format!("新闻,#genre#\nRandom Channel,{uri}/random.m3u8\n")));
}

#[tokio::test]
async fn test_kept_uncategorized_dead_stream_left_out_of_report() {
    // /random.m3u8 is not mounted, so the mock server answers 404
    let server = mock_streams().await;
    let uri = server.uri();
    let ws = Workspace::new("keep-uncategorized-dead");
    let mut config = ws.config(&format!("{uri}/list.txt"));
    config.matcher.keep_uncategorized = true;

    let summary = pipeline::run(&config, false).await.unwrap();

    assert_eq!(summary.online, 2);
    let failed = ws.read(&config.paths.failed_urls);
    assert!(failed.contains(&format!("{uri}/random.m3u8")));
    // No live uncategorized channel remains, so no report is written
    assert!(!config.paths.uncategorized.exists());
    let all_txt = ws.read(&config.main.output_dir.join("all.txt"));
    assert!(!all_txt.contains("random.m3u8"));
}

/// Serves one connection with a live body that never ends, a packet at a time.
async fn endless_stream() -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = [0u8; 1024];
        let _ = socket.read(&mut request).await;
        let head = b"HTTP/1.1 200 OK\r\nContent-Type: video/mp2t\r\nConnection: close\r\n\r\n";
        if socket.write_all(head).await.is_err() {
            return;
        }
        loop {
            if socket.write_all(&[0x47; 188]).await.is_err() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    });
    format!("http://{addr}/live.ts")
}

#[tokio::test]
async fn test_endless_slow_stream_measured_at_deadline() {
    let stream_url = endless_stream().await;
    let server = MockServer::start().await;
    Mock::given(path("/list.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("ESPN,{stream_url}\n")))
        .mount(&server)
        .await;
    let ws = Workspace::new("endless-stream");
    let mut config = ws.config(&format!("{}/list.txt", server.uri()));
    config.tester.timeout_secs = 0.3;

    let summary = pipeline::run(&config, false).await.unwrap();

    assert_eq!(summary.online, 1);
    assert_eq!(summary.failed_urls, 0);
    assert!(!config.paths.failed_urls.exists());
    let all_txt = ws.read(&config.main.output_dir.join("all.txt"));
    assert_eq!(all_txt, format!("Sports,#genre#\nESPN,{stream_url}\n"));
}

#[tokio::test]
async fn test_unreachable_source_still_exports() {
    let server = MockServer::start().await;
    Mock::given(path("/list.txt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let ws = Workspace::new("dead-source");
    let config = ws.config(&format!("{}/list.txt", server.uri()));

    let summary = pipeline::run(&config, false).await.unwrap();

    assert_eq!(summary.parsed, 0);
    assert_eq!(summary.online, 0);
    assert_eq!(ws.read(&config.main.output_dir.join("all.txt")), "");
}

#[tokio::test]
async fn test_missing_template_is_fatal() {
    let ws = Workspace::new("no-template");
    let mut config = ws.config("http://127.0.0.1:9/list.txt");
    config.paths.template = ws.dir.join("missing-templates.txt");

    let err = pipeline::run(&config, false).await.unwrap_err();
    assert!(err.to_string().contains("template"));
}
