#![allow(deprecated)] // Command::cargo_bin: the macro alternative requires a same-package binary

use assert_cmd::Command;
use predicates::str::contains;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::process::{Child, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const CONFIG: &str = r#"{"backbone":{"kind":"grid_pool","grid":2},"preprocess":{"image_size":32}}"#;

// ---------------------------------------------------------------------------
// Helper: a Command with every MEDANN_* variable removed, so tests are
// hermetic regardless of the runner's environment.
// ---------------------------------------------------------------------------
fn medann_cmd() -> Command {
    let mut cmd = Command::cargo_bin("medann").unwrap();
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.env("NO_COLOR", "1");
    cmd
}

const ENV_VARS: [&str; 7] = [
    "MEDANN_EMBEDDINGS_DIR",
    "MEDANN_CONFIG",
    "MEDANN_DATA_DIR",
    "MEDANN_BIND_ADDR",
    "MEDANN_PORT",
    "MEDANN_WEIGHTS",
    "RUST_LOG",
];

fn solid_png(path: &Path, rgb: [u8; 3], jitter: u8) {
    let img = image::RgbImage::from_fn(32, 32, |x, y| {
        let d = ((x + y) % 2) as u8 * jitter;
        image::Rgb([
            rgb[0].saturating_add(d),
            rgb[1].saturating_add(d),
            rgb[2].saturating_add(d),
        ])
    });
    img.save(path).unwrap();
}

/// Two well-separated classes plus a `test/` directory that must be skipped.
fn dataset() -> TempDir {
    let data = TempDir::new().unwrap();
    for (label, rgb) in [("COVID", [230, 230, 230]), ("Normal", [20, 20, 20])] {
        let dir = data.path().join(label);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..4u8 {
            solid_png(&dir.join(format!("{label}-{i}.png")), rgb, i * 3);
        }
    }
    let test_dir = data.path().join("test");
    std::fs::create_dir_all(&test_dir).unwrap();
    solid_png(&test_dir.join("held-out.png"), [128, 128, 128], 0);
    data
}

fn embeddings_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("medann.json"), CONFIG).unwrap();
    dir
}

fn embed(data: &TempDir, out: &TempDir) {
    medann_cmd()
        .arg("embed")
        .arg("--data-dir")
        .arg(data.path())
        .arg("--embeddings-dir")
        .arg(out.path())
        .assert()
        .success()
        .stdout(contains("COVID: 4 embeddings"))
        .stdout(contains("Normal: 4 embeddings"));
}

#[test]
fn help_lists_subcommands() {
    medann_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("embed"))
        .stdout(contains("classify"))
        .stdout(contains("serve"));
}

#[test]
fn classify_without_corpus_fails() {
    let out = embeddings_dir();
    let data = TempDir::new().unwrap();
    let img = data.path().join("scan.png");
    solid_png(&img, [200, 200, 200], 0);

    medann_cmd()
        .arg("classify")
        .arg(&img)
        .arg("--embeddings-dir")
        .arg(out.path())
        .assert()
        .failure();
}

#[test]
fn explicit_missing_config_fails() {
    medann_cmd()
        .args(["classify", "scan.png", "--config", "/nonexistent/medann.json"])
        .assert()
        .failure();
}

#[test]
fn embed_then_classify() {
    let data = dataset();
    let out = embeddings_dir();
    embed(&data, &out);

    assert!(out.path().join("COVID_embeddings.json").exists());
    assert!(out.path().join("Normal_embeddings.json").exists());
    assert!(!out.path().join("test_embeddings.json").exists());

    let query = data.path().join("query.png");
    solid_png(&query, [225, 225, 225], 2);
    medann_cmd()
        .arg("classify")
        .arg(&query)
        .args(["-k", "3", "--embeddings-dir"])
        .arg(out.path())
        .assert()
        .success()
        .stdout(contains("Predicted class: COVID-19"))
        .stdout(contains("COVID-19: 3 neighbors"));
}

#[test]
fn classify_json_output() {
    let data = dataset();
    let out = embeddings_dir();
    embed(&data, &out);

    let query = data.path().join("query.png");
    solid_png(&query, [25, 25, 25], 1);
    let output = medann_cmd()
        .arg("classify")
        .arg(&query)
        .args(["-k", "5", "--json", "--embeddings-dir"])
        .arg(out.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["predicted_class"], "Normal");
    assert_eq!(json["k"], 5);
}

#[test]
fn classify_rejects_k_above_max() {
    let data = dataset();
    let out = embeddings_dir();
    embed(&data, &out);

    let query = data.path().join("query.png");
    solid_png(&query, [25, 25, 25], 1);
    medann_cmd()
        .arg("classify")
        .arg(&query)
        .args(["-k", "51", "--embeddings-dir"])
        .arg(out.path())
        .assert()
        .failure();
}

#[test]
fn embed_csv_format() {
    let data = dataset();
    let out = embeddings_dir();
    medann_cmd()
        .arg("embed")
        .arg("--data-dir")
        .arg(data.path())
        .args(["--format", "csv", "--embeddings-dir"])
        .arg(out.path())
        .assert()
        .success();
    assert!(out.path().join("COVID_embeddings.csv").exists());
}

#[test]
fn re_embedding_in_other_format_keeps_one_file_per_class() {
    let data = dataset();
    let out = embeddings_dir();
    embed(&data, &out);
    medann_cmd()
        .arg("embed")
        .arg("--data-dir")
        .arg(data.path())
        .args(["--format", "csv", "--embeddings-dir"])
        .arg(out.path())
        .assert()
        .success();

    assert!(out.path().join("COVID_embeddings.csv").exists());
    assert!(!out.path().join("COVID_embeddings.json").exists());
    assert!(!out.path().join("Normal_embeddings.json").exists());

    let query = data.path().join("query.png");
    solid_png(&query, [25, 25, 25], 1);
    let output = medann_cmd()
        .arg("classify")
        .arg(&query)
        .args(["-k", "50", "--json", "--embeddings-dir"])
        .arg(out.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    // k is clamped to the corpus size: 4 + 4 samples, not 16.
    assert_eq!(json["k"], 8);
}

#[cfg(not(feature = "resnet"))]
#[test]
fn default_backbone_without_resnet_feature_suggests_grid_pool() {
    let data = dataset();
    let out = TempDir::new().unwrap();
    medann_cmd()
        .arg("embed")
        .arg("--data-dir")
        .arg(data.path())
        .arg("--embeddings-dir")
        .arg(out.path())
        .assert()
        .failure()
        .stderr(contains("--features resnet"))
        .stderr(contains("grid_pool"));
}

// ---------------------------------------------------------------------------
// Serve: spawn the real binary on an OS-assigned port and hit /health.
// ---------------------------------------------------------------------------

struct RunningServer {
    child: Child,
    bind_addr: String,
}

impl RunningServer {
    fn spawn_auto_port(embeddings_dir: &Path) -> Self {
        let mut command = std::process::Command::new(env!("CARGO_BIN_EXE_medann"));
        command
            .arg("--auto-port")
            .arg("--embeddings-dir")
            .arg(embeddings_dir)
            .env("NO_COLOR", "1")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for var in ENV_VARS {
            command.env_remove(var);
        }
        let mut child = command.spawn().expect("failed to spawn medann process");

        let bind_addr = wait_for_startup_bind_addr(&mut child, Duration::from_secs(10));
        Self { child, bind_addr }
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn wait_for_startup_bind_addr(child: &mut Child, timeout: Duration) -> String {
    let stdout = child.stdout.take().expect("stdout should be piped");
    let stderr = child.stderr.take().expect("stderr should be piped");

    let (tx, rx) = mpsc::channel::<String>();
    spawn_pipe_reader(stdout, tx.clone());
    spawn_pipe_reader(stderr, tx);

    let start = Instant::now();
    let mut observed = Vec::new();
    loop {
        if let Some(status) = child.try_wait().expect("failed checking child status") {
            panic!(
                "medann exited before startup banner ({status}). output:\n{}",
                observed.join("\n")
            );
        }
        if start.elapsed() > timeout {
            panic!(
                "timed out waiting for startup banner. output:\n{}",
                observed.join("\n")
            );
        }
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(line) => {
                if let Some(addr) = extract_bind_addr(&line) {
                    return addr;
                }
                observed.push(line);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                panic!("output closed early. output:\n{}", observed.join("\n"));
            }
        }
    }
}

fn spawn_pipe_reader<R: Read + Send + 'static>(reader: R, tx: mpsc::Sender<String>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let trimmed = line.trim_end_matches(['\r', '\n']).to_string();
                    if tx.send(trimmed).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

fn extract_bind_addr(line: &str) -> Option<String> {
    let marker = "http://127.0.0.1:";
    let start = line.find(marker)?;
    let candidate = &line[start + "http://".len()..];
    let end = candidate
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ':'))
        .unwrap_or(candidate.len());
    let addr = &candidate[..end];
    (!addr.ends_with(":0")).then(|| addr.to_string())
}

fn http_get(bind_addr: &str, path: &str) -> Option<(u16, String)> {
    let mut stream = TcpStream::connect(bind_addr).ok()?;
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .ok()?;
    write!(
        stream,
        "GET {path} HTTP/1.1\r\nHost: {bind_addr}\r\nConnection: close\r\n\r\n"
    )
    .ok()?;
    let mut raw = String::new();
    stream.read_to_string(&mut raw).ok()?;
    let status = raw.split_whitespace().nth(1)?.parse().ok()?;
    let body = raw.split("\r\n\r\n").nth(1).unwrap_or("").to_string();
    Some((status, body))
}

#[test]
fn serve_auto_port_reports_health() {
    let data = dataset();
    let out = embeddings_dir();
    embed(&data, &out);

    let server = RunningServer::spawn_auto_port(out.path());
    let start = Instant::now();
    loop {
        if let Some((200, body)) = http_get(&server.bind_addr, "/health") {
            assert!(body.contains("\"status\":\"ok\""), "body: {body}");
            assert!(body.contains("\"corpus_size\":8"), "body: {body}");
            break;
        }
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "timed out waiting for /health on {}",
            server.bind_addr
        );
        thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn serve_without_corpus_fails() {
    let out = embeddings_dir();
    medann_cmd()
        .arg("serve")
        .arg("--embeddings-dir")
        .arg(out.path())
        .arg("--auto-port")
        .assert()
        .failure();
}
