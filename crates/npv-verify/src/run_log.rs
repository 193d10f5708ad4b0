#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::VERIFY_REASON_CODES;

pub const RUN_LOG_SUITE: &str = "npy_fixture_verify";
pub const RUN_LOG_ENV_VAR: &str = "NPV_VERIFY_LOG_PATH";

/// One JSON Lines entry per fixture the verifier opened (or tried to).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureLogRecord {
    pub suite: String,
    pub ts_unix_ms: u128,
    pub fixture_id: String,
    pub fixture_path: String,
    pub input_digest: Option<String>,
    pub npy_version: Option<String>,
    pub descr: Option<String>,
    pub shape: Option<Vec<usize>>,
    pub element_count: Option<usize>,
    pub outcome: String,
    pub reason_code: String,
    pub detail: String,
    pub duration_ms: u64,
}

impl FixtureLogRecord {
    #[must_use]
    pub fn is_replay_complete(&self) -> bool {
        if self.suite != RUN_LOG_SUITE
            || self.fixture_id.trim().is_empty()
            || self.fixture_path.trim().is_empty()
            || self.reason_code.trim().is_empty()
        {
            return false;
        }

        let digest_present = self
            .input_digest
            .as_deref()
            .is_some_and(|digest| !digest.trim().is_empty());
        match self.outcome.as_str() {
            "pass" => {
                if !digest_present
                    || self.descr.is_none()
                    || self.shape.is_none()
                    || self.element_count.is_none()
                {
                    return false;
                }
            }
            "fail" => {
                if self.detail.trim().is_empty() {
                    return false;
                }
            }
            _ => return false,
        }

        VERIFY_REASON_CODES
            .iter()
            .any(|code| *code == self.reason_code)
    }
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(7 + digest.len() * 2);
    out.push_str("sha256:");
    for byte in digest {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

pub(crate) fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

pub fn append_run_log(path: &Path, record: &FixtureLogRecord) -> Result<(), String> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed creating {}: {err}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| format!("failed opening {}: {err}", path.display()))?;
    let line = serde_json::to_string(record)
        .map_err(|err| format!("failed serializing fixture log record: {err}"))?;
    let mut payload = line.into_bytes();
    payload.push(b'\n');
    file.write_all(&payload)
        .map_err(|err| format!("failed appending run log {}: {err}", path.display()))
}

/// Reads back a run log written by [`append_run_log`].
pub fn read_run_log(path: &Path) -> Result<Vec<FixtureLogRecord>, String> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("failed reading {}: {err}", path.display()))?;
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(line_no, line)| {
            serde_json::from_str(line)
                .map_err(|err| format!("{}:{}: invalid record: {err}", path.display(), line_no + 1))
        })
        .collect()
}
