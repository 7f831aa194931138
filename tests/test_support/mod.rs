#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

/// Fixed so enrollment windows and activity codes are stable.
pub const TODAY: &str = "2026-02-01";

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
    pub child: Child,
    pub stdin: ChildStdin,
    pub reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn spawn_sidecar() -> Sidecar {
    spawn_sidecar_with_env(&[])
}

pub fn spawn_sidecar_with_env(env: &[(&str, &str)]) -> Sidecar {
    let exe = env!("CARGO_BIN_EXE_schoold");
    let mut cmd = Command::new(exe);
    cmd.env_remove("SCHOOLD_WORKSPACE")
        .env("SCHOOLD_TODAY", TODAY)
        .env("SCHOOLD_LOG", "warn");
    for (k, v) in env {
        cmd.env(k, v);
    }
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoold");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    Sidecar {
        child,
        stdin,
        reader: BufReader::new(stdout),
        next_id: 0,
    }
}

impl Sidecar {
    pub fn send_raw(&mut self, line: &str) -> serde_json::Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        let value = self.send_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn request_ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Returns the error code of a request that must fail.
    pub fn request_err(&mut self, method: &str, params: serde_json::Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .pointer("/error/code")
            .and_then(|v| v.as_str())
            .expect("error code")
            .to_string()
    }

    pub fn open_workspace(&mut self, prefix: &str) -> PathBuf {
        let workspace = temp_dir(prefix);
        self.request_ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        workspace
    }

    pub fn create_student(&mut self, control: &str) -> String {
        let res = self.request_ok(
            "students.create",
            json!({ "controlNumber": control, "firstName": "Ana", "lastName": "Lopez" }),
        );
        str_at(&res, "/student/id")
    }

    pub fn create_subject(&mut self, code: &str, english_level: Option<u8>) -> String {
        let res = self.request_ok(
            "subjects.create",
            json!({
                "code": code,
                "name": format!("Subject {}", code),
                "credits": 5,
                "isEnglish": english_level.is_some(),
                "englishLevel": english_level,
            }),
        );
        str_at(&res, "/subject/id")
    }

    pub fn create_group(&mut self, subject_id: &str, name: &str, capacity: i64) -> String {
        let res = self.request_ok(
            "groups.create",
            json!({
                "subjectId": subject_id,
                "name": name,
                "period": "2026-1",
                "capacity": capacity,
                "startDate": "2026-01-10",
                "endDate": "2026-06-30",
            }),
        );
        str_at(&res, "/group/id")
    }
}

pub fn str_at(v: &serde_json::Value, pointer: &str) -> String {
    v.pointer(pointer)
        .and_then(|x| x.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", pointer, v))
        .to_string()
}
