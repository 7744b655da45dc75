use assert_cmd::Command;
use predicates::prelude::*;
use sealpost_core::testing::{Enrolled, TestPki};
use sealpost_core::{DirectorySettings, MailSettings};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

struct Setup {
    dir: TempDir,
    alice: PathBuf,
    bob: PathBuf,
}

/// Writes `<home>/config.json` for an enrolled account.
fn write_home(home: &Path, pki: &TestPki, enrolled: &Enrolled) -> PathBuf {
    let mut settings = MailSettings::new(enrolled.address.clone());
    settings.private_key = enrolled.key_path.clone();
    settings.trust_anchor = pki.anchor_path().to_path_buf();
    settings.directory = DirectorySettings::Local {
        root: pki.dir().to_path_buf(),
    };
    let config = home.join("config.json");
    settings.save(&config).unwrap();
    config
}

fn setup() -> Setup {
    let dir = tempdir().unwrap();
    let pki = TestPki::new(&dir.path().join("pki")).unwrap();
    let alice = pki.enroll("alice@example.org").unwrap();
    let bob = pki.enroll("bob@example.org").unwrap();
    let alice = write_home(&dir.path().join("alice"), &pki, &alice);
    let bob = write_home(&dir.path().join("bob"), &pki, &bob);
    Setup { dir, alice, bob }
}

fn sealpost(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sealpost").unwrap();
    cmd.env_remove("RUST_LOG").arg("--config").arg(config);
    cmd
}

#[test]
fn send_then_receive() {
    let s = setup();
    let envelope = s.dir.path().join("envelope.txt");

    sealpost(&s.alice)
        .args(["send", "bob@example.org", "--message", "hello"])
        .arg("--output")
        .arg(&envelope)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let text = fs::read_to_string(&envelope).unwrap();
    assert!(text.starts_with("from: alice@example.org, to: bob@example.org\n"));

    sealpost(&s.bob)
        .arg("receive")
        .arg(&envelope)
        .assert()
        .success()
        .stdout("hello");
}

#[test]
fn envelope_on_stdout_can_be_piped_back() {
    let s = setup();
    let out = sealpost(&s.alice)
        .args(["send", "bob@example.org", "-m", "piped"])
        .output()
        .unwrap();
    assert!(out.status.success());

    sealpost(&s.bob)
        .args(["receive", "-"])
        .write_stdin(out.stdout)
        .assert()
        .success()
        .stdout("piped");
}

#[test]
fn send_without_body_uses_test_message() {
    let s = setup();
    let envelope = s.dir.path().join("envelope.txt");
    sealpost(&s.alice)
        .args(["send", "bob@example.org", "-o"])
        .arg(&envelope)
        .assert()
        .success();

    sealpost(&s.bob)
        .arg("receive")
        .arg(&envelope)
        .assert()
        .success()
        .stdout(predicate::str::contains("intended for testing purposes only"))
        .stdout(predicate::str::contains("alice@example.org"));
}

#[test]
fn list_shows_cached_certificates_after_send() {
    let s = setup();
    sealpost(&s.alice)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("0 certificate(s)"));

    sealpost(&s.alice)
        .args(["send", "bob@example.org", "-m", "hi"])
        .assert()
        .success();

    sealpost(&s.alice)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("1 certificate(s)"))
        .stdout(predicate::str::contains("email:       bob@example.org"))
        .stdout(predicate::str::contains("issuer:      root-ca"));

    let index = fs::read_to_string(s.alice.with_file_name("index.db")).unwrap();
    assert!(index.starts_with("bob "));
    assert!(!index.ends_with('\n'));
}

#[test]
fn tampered_envelope_fails_without_output() {
    let s = setup();
    let envelope = s.dir.path().join("envelope.txt");
    sealpost(&s.alice)
        .args(["send", "bob@example.org", "-m", "secret"])
        .arg("-o")
        .arg(&envelope)
        .assert()
        .success();

    let text = fs::read_to_string(&envelope).unwrap();
    let lines: Vec<&str> = text.split('\n').collect();
    // line 4 is the encrypted body block
    let mut body: Vec<char> = lines[4].chars().collect();
    body[0] = if body[0] == 'A' { 'B' } else { 'A' };
    let body: String = body.into_iter().collect();
    let tampered = text.replacen(lines[4], &body, 1);
    fs::write(&envelope, tampered).unwrap();

    sealpost(&s.bob)
        .arg("receive")
        .arg(&envelope)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Signature verification failed"));
}

#[test]
fn unknown_recipient_fails_and_writes_nothing() {
    let s = setup();
    let envelope = s.dir.path().join("envelope.txt");
    sealpost(&s.alice)
        .args(["send", "nobody@example.org", "-m", "hi"])
        .arg("-o")
        .arg(&envelope)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No certificate found for nobody"));
    assert!(!envelope.exists());
}

#[test]
fn config_is_found_through_sealpost_home() {
    let s = setup();
    let home = s.alice.parent().unwrap();
    Command::cargo_bin("sealpost")
        .unwrap()
        .env("SEALPOST_HOME", home)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("certificate(s) cached in"));
}

#[test]
fn missing_config_is_reported() {
    let dir = tempdir().unwrap();
    sealpost(&dir.path().join("config.json"))
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading settings"));
}

#[test]
fn list_does_not_need_key_material() {
    let s = setup();
    let pki = s.dir.path().join("pki");
    fs::remove_file(pki.join("alice.key.json")).unwrap();
    fs::remove_file(pki.join("root-ca.crt")).unwrap();

    sealpost(&s.alice)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("0 certificate(s)"));

    sealpost(&s.alice)
        .args(["send", "bob@example.org", "-m", "hi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading private key"));
}
