#![forbid(unsafe_code)]

pub mod run_log;

use core::fmt;
use npv_io::{IOError, NpyArray};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::run_log::{
    FixtureLogRecord, RUN_LOG_ENV_VAR, RUN_LOG_SUITE, append_run_log, now_unix_ms, sha256_hex,
};

/// Fixtures checked by [`verify_fixture_dir`], in check order.
pub const FIXTURE_NAMES: [&str; 10] = [
    "version_1_0_int.npy",
    "version_2_0_int.npy",
    "version_1_0_double.npy",
    "version_2_0_double.npy",
    "two_dimension_fixed.npy",
    "two_dimension_variable.npy",
    "one_dimension_fixed.npy",
    "one_dimension_variable.npy",
    "zero_dimension_fixed.npy",
    "zero_dimension_variable.npy",
];

pub const VERIFY_REASON_CODES: [&str; 6] = [
    "verify_ok",
    "verify_fixture_missing",
    "verify_fixture_unreadable",
    "verify_fixture_malformed",
    "verify_content_mismatch",
    "verify_run_log_failed",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    pub fixture_root: PathBuf,
    /// JSON Lines run log; `None` keeps the run free of writes.
    pub log_path: Option<PathBuf>,
}

impl VerifierConfig {
    #[must_use]
    pub fn new(fixture_root: impl Into<PathBuf>) -> Self {
        Self {
            fixture_root: fixture_root.into(),
            log_path: None,
        }
    }

    /// Like [`VerifierConfig::new`], taking the log path from `NPV_VERIFY_LOG_PATH`.
    #[must_use]
    pub fn from_env(fixture_root: impl Into<PathBuf>) -> Self {
        let log_path = std::env::var_os(RUN_LOG_ENV_VAR)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Self {
            log_path,
            ..Self::new(fixture_root)
        }
    }

    #[must_use]
    pub fn with_log_path(mut self, log_path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(log_path.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    FixtureMissing {
        fixture: String,
        path: PathBuf,
    },
    FixtureUnreadable {
        fixture: String,
        path: PathBuf,
        detail: String,
    },
    FixtureMalformed {
        fixture: String,
        source: IOError,
    },
    ContentMismatch {
        fixture: String,
        index: usize,
        expected: u64,
        found: String,
    },
    RunLogFailed(String),
    /// A fixture failure whose run log record could not be written.
    Unlogged {
        error: Box<VerifyError>,
        log_error: String,
    },
}

impl VerifyError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::FixtureMissing { .. } => "verify_fixture_missing",
            Self::FixtureUnreadable { .. } => "verify_fixture_unreadable",
            Self::FixtureMalformed { .. } => "verify_fixture_malformed",
            Self::ContentMismatch { .. } => "verify_content_mismatch",
            Self::RunLogFailed(_) => "verify_run_log_failed",
            Self::Unlogged { error, .. } => error.reason_code(),
        }
    }

    /// The decoder's reason code for malformed fixtures, otherwise [`Self::reason_code`].
    #[must_use]
    pub fn root_reason_code(&self) -> &'static str {
        match self {
            Self::FixtureMalformed { source, .. } => source.reason_code(),
            Self::Unlogged { error, .. } => error.root_reason_code(),
            other => other.reason_code(),
        }
    }

    #[must_use]
    pub fn fixture(&self) -> Option<&str> {
        match self {
            Self::FixtureMissing { fixture, .. }
            | Self::FixtureUnreadable { fixture, .. }
            | Self::FixtureMalformed { fixture, .. }
            | Self::ContentMismatch { fixture, .. } => Some(fixture.as_str()),
            Self::RunLogFailed(_) => None,
            Self::Unlogged { error, .. } => error.fixture(),
        }
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixtureMissing { fixture, path } => {
                write!(f, "{fixture}: fixture file not found at {}", path.display())
            }
            Self::FixtureUnreadable {
                fixture,
                path,
                detail,
            } => write!(f, "{fixture}: failed reading {}: {detail}", path.display()),
            Self::FixtureMalformed { fixture, source } => write!(
                f,
                "{fixture}: malformed npy data: {source} (reason_code={})",
                source.reason_code()
            ),
            Self::ContentMismatch {
                fixture,
                index,
                expected,
                found,
            } => write!(
                f,
                "{fixture}: flat element {index} is {found}, expected {expected}"
            ),
            Self::RunLogFailed(msg) => write!(f, "{msg}"),
            Self::Unlogged { error, log_error } => {
                write!(f, "{error} (run log not written: {log_error})")
            }
        }
    }
}

impl std::error::Error for VerifyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::FixtureMalformed { source, .. } => Some(source),
            Self::Unlogged { error, .. } => Some(error.as_ref()),
            _ => None,
        }
    }
}

/// What a passing fixture contained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureOutcome {
    pub fixture: String,
    pub version: (u8, u8),
    pub descr: String,
    pub shape: Vec<usize>,
    pub size: usize,
    pub input_digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub fixture_root: PathBuf,
    pub outcomes: Vec<FixtureOutcome>,
}

impl VerifyReport {
    #[must_use]
    pub fn fixture_count(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn total_elements(&self) -> usize {
        self.outcomes.iter().map(|outcome| outcome.size).sum()
    }
}

/// Checks that `array.flat` is `0, 1, ..., size-1`, returning `size`.
pub fn check_arange(fixture: &str, array: &NpyArray) -> Result<usize, VerifyError> {
    let mut count = 0usize;
    for (index, value) in array.flat().enumerate() {
        let expected = index as u64;
        if !value.equals_integer(expected) {
            return Err(VerifyError::ContentMismatch {
                fixture: fixture.to_string(),
                index,
                expected,
                found: value.to_string(),
            });
        }
        count += 1;
    }

    if count != array.size() {
        return Err(VerifyError::FixtureMalformed {
            fixture: fixture.to_string(),
            source: IOError::ReadPayloadIncomplete("flat iteration ended before declared size"),
        });
    }
    Ok(count)
}

fn read_fixture_bytes(dir: &Path, fixture: &str) -> Result<Vec<u8>, VerifyError> {
    let path = dir.join(fixture);
    fs::read(&path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => VerifyError::FixtureMissing {
            fixture: fixture.to_string(),
            path,
        },
        _ => VerifyError::FixtureUnreadable {
            fixture: fixture.to_string(),
            path,
            detail: err.to_string(),
        },
    })
}

/// Decodes in-memory file contents and runs [`check_arange`] over them.
pub fn verify_fixture_bytes(fixture: &str, bytes: &[u8]) -> Result<FixtureOutcome, VerifyError> {
    let array =
        NpyArray::from_bytes(bytes, false).map_err(|source| VerifyError::FixtureMalformed {
            fixture: fixture.to_string(),
            source,
        })?;
    let size = check_arange(fixture, &array)?;

    Ok(FixtureOutcome {
        fixture: fixture.to_string(),
        version: array.version,
        descr: array.descr().descr(),
        shape: array.shape().to_vec(),
        size,
        input_digest: sha256_hex(bytes),
    })
}

pub fn verify_fixture(dir: &Path, fixture: &str) -> Result<FixtureOutcome, VerifyError> {
    let bytes = read_fixture_bytes(dir, fixture)?;
    verify_fixture_bytes(fixture, &bytes)
}

fn log_record(
    config: &VerifierConfig,
    fixture: &str,
    digest: Option<String>,
    result: &Result<FixtureOutcome, VerifyError>,
    started: Instant,
) -> FixtureLogRecord {
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let fixture_path = config.fixture_root.join(fixture).display().to_string();
    let mut record = FixtureLogRecord {
        suite: RUN_LOG_SUITE.to_string(),
        ts_unix_ms: now_unix_ms(),
        fixture_id: fixture.to_string(),
        fixture_path,
        input_digest: digest,
        npy_version: None,
        descr: None,
        shape: None,
        element_count: None,
        outcome: "pass".to_string(),
        reason_code: "verify_ok".to_string(),
        detail: String::new(),
        duration_ms,
    };
    match result {
        Ok(outcome) => {
            record.npy_version = Some(format!("{}.{}", outcome.version.0, outcome.version.1));
            record.descr = Some(outcome.descr.clone());
            record.shape = Some(outcome.shape.clone());
            record.element_count = Some(outcome.size);
        }
        Err(err) => {
            record.outcome = "fail".to_string();
            record.reason_code = err.reason_code().to_string();
            record.detail = err.to_string();
        }
    }
    record
}

/// Verifies every name in [`FIXTURE_NAMES`] in order, stopping at the first
/// failure; later fixtures are not opened.
pub fn verify_fixture_dir(config: &VerifierConfig) -> Result<VerifyReport, VerifyError> {
    let mut outcomes = Vec::with_capacity(FIXTURE_NAMES.len());

    for fixture in FIXTURE_NAMES {
        let started = Instant::now();
        let (digest, result) = match read_fixture_bytes(&config.fixture_root, fixture) {
            Ok(bytes) => (
                Some(sha256_hex(&bytes)),
                verify_fixture_bytes(fixture, &bytes),
            ),
            Err(err) => (None, Err(err)),
        };

        if let Some(log_path) = &config.log_path {
            let record = log_record(config, fixture, digest, &result, started);
            if let Err(log_error) = append_run_log(log_path, &record) {
                return Err(match result {
                    Ok(_) => VerifyError::RunLogFailed(log_error),
                    // The fixture failure stays primary; the log failure rides along.
                    Err(err) => VerifyError::Unlogged {
                        error: Box::new(err),
                        log_error,
                    },
                });
            }
        }

        outcomes.push(result?);
    }

    Ok(VerifyReport {
        fixture_root: config.fixture_root.clone(),
        outcomes,
    })
}
