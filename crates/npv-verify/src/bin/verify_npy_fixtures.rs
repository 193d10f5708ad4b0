#![forbid(unsafe_code)]

use npv_verify::{VerifierConfig, verify_fixture_dir};
use std::ffi::OsString;
use std::path::PathBuf;

const USAGE: &str = "Usage: verify_npy_fixtures <fixture-dir>";

fn main() {
    let fixture_root = match parse_args(std::env::args_os().skip(1)) {
        Ok(path) => path,
        Err(msg) => {
            eprintln!("{msg}\n{USAGE}");
            std::process::exit(2);
        }
    };

    if let Err(err) = run(fixture_root) {
        eprintln!("verify_npy_fixtures failed: {err}");
        std::process::exit(1);
    }
}

fn run(fixture_root: PathBuf) -> Result<(), String> {
    let cfg = VerifierConfig::from_env(fixture_root);
    verify_fixture_dir(&cfg)
        .map(|_| ())
        .map_err(|err| format!("{err} (reason_code={})", err.reason_code()))
}

fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<PathBuf, String> {
    let dir = args
        .next()
        .ok_or_else(|| "missing fixture directory argument".to_string())?;
    if let Some(extra) = args.next() {
        return Err(format!("unexpected argument: {}", extra.to_string_lossy()));
    }
    Ok(PathBuf::from(dir))
}
