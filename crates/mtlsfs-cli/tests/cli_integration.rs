#![allow(deprecated)] // cargo_bin! macro doesn't exist yet in assert_cmd 2.1

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn mtlsfs() -> Command {
    let mut cmd = Command::cargo_bin("mtlsfs").unwrap();
    for var in [
        "MTLSFS_CAFILE",
        "MTLSFS_CERTFILE",
        "MTLSFS_KEYFILE",
        "MTLSFS_LISTEN",
        "MTLSFS_ADMIN",
        "MTLSFS_ROOT",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_no_arguments_prints_usage() {
    mtlsfs()
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("--cafile"));
}

#[test]
fn test_help() {
    mtlsfs()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--certfile"))
        .stdout(predicate::str::contains("--keyfile"))
        .stdout(predicate::str::contains("[default: :8443]"))
        .stdout(predicate::str::contains("[default: Admin]"));
}

#[test]
fn test_go_style_help() {
    mtlsfs()
        .arg("-help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--listen"));
}

#[test]
fn test_missing_required_flag() {
    mtlsfs()
        .args(["-cafile", "ca.pem"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--certfile"));
}

#[test]
fn test_unknown_flag() {
    mtlsfs()
        .args(["--bogus"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_ca_file_fails_startup() {
    let dir = TempDir::new().unwrap();
    let ca = dir.path().join("ca.pem");

    mtlsfs()
        .arg("-cafile")
        .arg(&ca)
        .arg("-certfile")
        .arg(dir.path().join("server.pem"))
        .arg("-keyfile")
        .arg(dir.path().join("server.key"))
        .args(["-listen", "127.0.0.1:0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to start server"))
        .stderr(predicate::str::contains("ca.pem"));
}

#[test]
fn test_invalid_listen_address() {
    let dir = TempDir::new().unwrap();

    mtlsfs()
        .arg("--cafile")
        .arg(dir.path().join("ca.pem"))
        .arg("--certfile")
        .arg(dir.path().join("server.pem"))
        .arg("--keyfile")
        .arg(dir.path().join("server.key"))
        .arg("-listen=not-an-address")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid listen address"));
}

#[test]
fn test_env_fallbacks() {
    let dir = TempDir::new().unwrap();

    mtlsfs()
        .env("MTLSFS_CAFILE", dir.path().join("ca.pem"))
        .env("MTLSFS_CERTFILE", dir.path().join("server.pem"))
        .env("MTLSFS_KEYFILE", dir.path().join("server.key"))
        .env("MTLSFS_LISTEN", "127.0.0.1:0")
        .arg("-v")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to start server"));
}
