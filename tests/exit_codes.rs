use assert_cmd::Command;
use predicates::prelude::*;

fn cmd(home: &std::path::Path, vault: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("pass-cli").expect("binary exists");
    cmd.env("HOME", home)
        .env("PASS_CLI_VAULT", vault)
        .env_remove("PASS_CLI_CONFIG");
    cmd
}

#[test]
fn get_against_missing_vault_is_environment_failure() {
    let home = tempfile::tempdir().expect("temp home");
    let vault = home.path().join("does-not-exist.enc");

    let output = cmd(home.path(), &vault)
        .args(["get", "github"])
        .write_stdin("whatever-password\n")
        .output()
        .expect("get output");

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn wrong_master_password_is_user_failure() {
    let home = tempfile::tempdir().expect("temp home");
    let vault = home.path().join("vault.enc");

    cmd(home.path(), &vault)
        .args(["init", "--no-recovery"])
        .write_stdin("correct horse battery staple\ncorrect horse battery staple\n")
        .assert()
        .success();

    cmd(home.path(), &vault)
        .args(["list"])
        .write_stdin("definitely the wrong password\n")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("wrong password"));
}

#[test]
fn get_unknown_service_is_user_failure() {
    let home = tempfile::tempdir().expect("temp home");
    let vault = home.path().join("vault.enc");

    cmd(home.path(), &vault)
        .args(["init", "--no-recovery"])
        .write_stdin("correct horse battery staple\ncorrect horse battery staple\n")
        .assert()
        .success();

    let output = cmd(home.path(), &vault)
        .args(["get", "nonexistent"])
        .write_stdin("correct horse battery staple\n")
        .output()
        .expect("get output");

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn init_on_existing_vault_is_user_failure() {
    let home = tempfile::tempdir().expect("temp home");
    let vault = home.path().join("vault.enc");

    cmd(home.path(), &vault)
        .args(["init", "--no-recovery"])
        .write_stdin("correct horse battery staple\ncorrect horse battery staple\n")
        .assert()
        .success();

    let output = cmd(home.path(), &vault)
        .args(["init", "--no-recovery"])
        .write_stdin("another long enough password\nanother long enough password\n")
        .output()
        .expect("init output");

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn weak_password_on_init_is_user_failure() {
    let home = tempfile::tempdir().expect("temp home");
    let vault = home.path().join("vault.enc");

    let output = cmd(home.path(), &vault)
        .args(["init", "--no-recovery"])
        .write_stdin("short\nshort\n")
        .output()
        .expect("init output");

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn no_subcommand_prints_help_and_exits_user_code() {
    let home = tempfile::tempdir().expect("temp home");
    let vault = home.path().join("vault.enc");

    let output = cmd(home.path(), &vault).output().expect("no-args output");
    assert_eq!(output.status.code(), Some(1));
}
