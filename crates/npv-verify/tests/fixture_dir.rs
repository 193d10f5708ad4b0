mod common;

use common::{
    REFERENCE_FIXTURES, arange_elements, element_count, encode_fixture, spec,
    write_fixture_elements, write_reference_fixtures,
};
use npv_dtype::ByteOrder;
use npv_io::NpyElements;
use npv_verify::run_log::read_run_log;
use npv_verify::{FIXTURE_NAMES, VerifierConfig, VerifyError, verify_fixture, verify_fixture_dir};
use std::fs;

#[test]
fn reference_fixture_set_matches_checked_names() {
    let names = REFERENCE_FIXTURES.map(|spec| spec.name);
    assert_eq!(names, FIXTURE_NAMES);
}

#[test]
fn well_formed_directory_passes_every_fixture() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_reference_fixtures(dir.path());

    let report = verify_fixture_dir(&VerifierConfig::new(dir.path())).expect("all fixtures pass");
    assert_eq!(report.fixture_count(), FIXTURE_NAMES.len());
    assert_eq!(report.total_elements(), 4 * 1320 + 2 * 110 + 2 * 10 + 2);

    let names = report
        .outcomes
        .iter()
        .map(|outcome| outcome.fixture.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, FIXTURE_NAMES);

    for outcome in &report.outcomes {
        let expected = spec(&outcome.fixture);
        assert_eq!(outcome.shape, expected.shape, "{}", outcome.fixture);
        assert_eq!(outcome.version, expected.version, "{}", outcome.fixture);
    }
}

#[test]
fn zero_dimensional_fixture_is_the_single_element_zero() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_reference_fixtures(dir.path());

    let outcome = verify_fixture(dir.path(), "zero_dimension_fixed.npy").expect("scalar");
    assert_eq!(outcome.size, 1);
    assert!(outcome.shape.is_empty());

    let scalar = spec("zero_dimension_variable.npy");
    write_fixture_elements(dir.path(), &scalar, &NpyElements::Int(vec![1]));
    let err = verify_fixture(dir.path(), scalar.name).expect_err("scalar must be 0");
    assert!(matches!(err, VerifyError::ContentMismatch { index: 0, .. }));
}

#[test]
fn repeated_runs_give_identical_results() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_reference_fixtures(dir.path());
    let cfg = VerifierConfig::new(dir.path());

    let first = verify_fixture_dir(&cfg).expect("first run");
    let second = verify_fixture_dir(&cfg).expect("second run");
    assert_eq!(first, second);

    fs::remove_file(dir.path().join("version_1_0_double.npy")).expect("remove");
    let first = verify_fixture_dir(&cfg).expect_err("first failing run");
    let second = verify_fixture_dir(&cfg).expect_err("second failing run");
    assert_eq!(first, second);
}

#[test]
fn corrupted_element_fails_at_that_fixture() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_reference_fixtures(dir.path());

    let target = spec("version_2_0_int.npy");
    let NpyElements::Int(mut values) = arange_elements(target.dtype, element_count(&target)) else {
        panic!("int fixture decodes to ints");
    };
    values[2] = 99;
    write_fixture_elements(dir.path(), &target, &NpyElements::Int(values));

    let log_path = dir.path().join("logs/run.jsonl");
    let cfg = VerifierConfig::new(dir.path()).with_log_path(&log_path);
    let err = verify_fixture_dir(&cfg).expect_err("content mismatch");
    assert_eq!(
        err,
        VerifyError::ContentMismatch {
            fixture: "version_2_0_int.npy".to_string(),
            index: 2,
            expected: 2,
            found: "99".to_string(),
        }
    );

    let records = read_run_log(&log_path).expect("run log");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].outcome, "pass");
    assert_eq!(records[1].fixture_id, "version_2_0_int.npy");
    assert_eq!(records[1].outcome, "fail");
    assert_eq!(records[1].reason_code, "verify_content_mismatch");
    assert!(records.iter().all(|record| record.is_replay_complete()));
}

#[test]
fn missing_fixture_stops_before_later_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_reference_fixtures(dir.path());
    fs::remove_file(dir.path().join("one_dimension_variable.npy")).expect("remove");

    let log_path = dir.path().join("run.jsonl");
    let cfg = VerifierConfig::new(dir.path()).with_log_path(&log_path);
    let err = verify_fixture_dir(&cfg).expect_err("missing fixture");
    assert_eq!(err.reason_code(), "verify_fixture_missing");
    assert_eq!(err.fixture(), Some("one_dimension_variable.npy"));

    let records = read_run_log(&log_path).expect("run log");
    let checked = records
        .iter()
        .map(|record| record.fixture_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(checked, FIXTURE_NAMES[..8]);
    let last = records.last().expect("failing record");
    assert_eq!(last.input_digest, None);
    assert!(last.is_replay_complete());
}

#[test]
fn nonexistent_directory_fails_on_first_fixture() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = VerifierConfig::new(dir.path().join("absent"));
    let err = verify_fixture_dir(&cfg).expect_err("no directory");
    assert_eq!(err.fixture(), Some(FIXTURE_NAMES[0]));
    assert_eq!(err.reason_code(), "verify_fixture_missing");
}

#[test]
fn truncated_fixture_is_malformed() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_reference_fixtures(dir.path());

    let path = dir.path().join("version_1_0_double.npy");
    let mut bytes = fs::read(&path).expect("read fixture");
    bytes.truncate(bytes.len() - 8);
    fs::write(&path, bytes).expect("rewrite fixture");

    let err = verify_fixture_dir(&VerifierConfig::new(dir.path())).expect_err("truncated");
    assert_eq!(err.fixture(), Some("version_1_0_double.npy"));
    assert_eq!(err.reason_code(), "verify_fixture_malformed");
    assert_eq!(err.root_reason_code(), "io_read_payload_incomplete");
}

#[test]
fn fortran_order_and_big_endian_fixtures_pass() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_reference_fixtures(dir.path());

    // Column-major storage of arange(110).reshape(10, 11).
    let two_d = spec("two_dimension_fixed.npy");
    let column_major = (0..11)
        .flat_map(|col| (0..10).map(move |row| row * 11 + col))
        .collect::<Vec<i64>>();
    let bytes = encode_fixture(
        &two_d,
        ByteOrder::native(),
        true,
        &NpyElements::Int(column_major),
    );
    fs::write(dir.path().join(two_d.name), bytes).expect("write fortran fixture");

    let double = spec("version_2_0_double.npy");
    let bytes = encode_fixture(
        &double,
        ByteOrder::Big,
        false,
        &arange_elements(double.dtype, element_count(&double)),
    );
    fs::write(dir.path().join(double.name), bytes).expect("write big-endian fixture");

    let report = verify_fixture_dir(&VerifierConfig::new(dir.path())).expect("variants pass");
    let big = &report.outcomes[3];
    assert_eq!(big.descr, ">f8");
}

#[test]
fn passing_run_log_has_one_complete_record_per_fixture() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_reference_fixtures(dir.path());
    let log_path = dir.path().join("run.jsonl");

    let report = verify_fixture_dir(&VerifierConfig::new(dir.path()).with_log_path(&log_path))
        .expect("pass");
    let records = read_run_log(&log_path).expect("run log");
    assert_eq!(records.len(), FIXTURE_NAMES.len());
    for (record, outcome) in records.iter().zip(&report.outcomes) {
        assert!(record.is_replay_complete(), "{}", record.fixture_id);
        assert_eq!(record.input_digest.as_deref(), Some(outcome.input_digest.as_str()));
        assert_eq!(record.element_count, Some(outcome.size));
    }
    assert_eq!(records[1].npy_version.as_deref(), Some("2.0"));
}

#[test]
fn unwritable_run_log_does_not_hide_the_fixture_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_reference_fixtures(dir.path());
    let target = spec("version_1_0_int.npy");
    let mut values = (0..1320).collect::<Vec<i64>>();
    values[2] = 99;
    write_fixture_elements(dir.path(), &target, &NpyElements::Int(values));

    // A directory cannot be opened for appending.
    let log_dir = dir.path().join("log_is_a_dir");
    fs::create_dir(&log_dir).expect("log dir");
    let cfg = VerifierConfig::new(dir.path()).with_log_path(&log_dir);

    let err = verify_fixture_dir(&cfg).expect_err("content mismatch");
    assert_eq!(err.reason_code(), "verify_content_mismatch");
    assert_eq!(err.fixture(), Some("version_1_0_int.npy"));
    let VerifyError::Unlogged { error, log_error } = &err else {
        panic!("expected the mismatch with the log failure attached, got {err:?}");
    };
    assert!(matches!(**error, VerifyError::ContentMismatch { index: 2, .. }));
    assert!(!log_error.is_empty());
    let message = err.to_string();
    assert!(message.contains("version_1_0_int.npy: flat element 2 is 99, expected 2"));
    assert!(message.contains("run log not written"));

    write_reference_fixtures(dir.path());
    let err = verify_fixture_dir(&cfg).expect_err("passing fixture, failed log");
    assert!(matches!(err, VerifyError::RunLogFailed(_)));
    assert_eq!(err.reason_code(), "verify_run_log_failed");
}
