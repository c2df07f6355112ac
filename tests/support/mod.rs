#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_tlinkyd");
        let mut child = Command::new(exe)
            .arg("--stdio")
            .env("TLINKY_JWT_KEY", "integration-test-signing-key")
            .env("RUST_LOG", "warn")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn tlinkyd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    /// Spawns the sidecar and selects a fresh workspace.
    pub fn with_workspace(prefix: &str) -> (Self, PathBuf) {
        let workspace = temp_dir(prefix);
        let mut sidecar = Self::spawn();
        sidecar.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
        (sidecar, workspace)
    }

    pub fn send_line(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    /// Raw response envelope.
    pub fn call(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        let value = self.send_line(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn ok(&mut self, method: &str, params: Value) -> Value {
        let value = self.call(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error")
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Asserts failure and returns (code, message).
    pub fn fail(&mut self, method: &str, params: Value) -> (String, String) {
        let value = self.call(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        let field = |k: &str| {
            value
                .get("error")
                .and_then(|e| e.get(k))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };
        (field("code"), field("message"))
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn id_of(result: &Value, key: &str) -> i64 {
    result
        .get(key)
        .and_then(|v| v.as_i64())
        .unwrap_or_else(|| panic!("missing {} in {}", key, result))
}
