use assert_cmd::Command;
use serde_json::Value;

fn cmd(home: &std::path::Path, vault: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("pass-cli").expect("binary exists");
    cmd.env("HOME", home)
        .env("PASS_CLI_VAULT", vault)
        .env_remove("PASS_CLI_CONFIG");
    cmd
}

#[test]
fn backup_create_then_info_lists_it() {
    let home = tempfile::tempdir().expect("temp home");
    let vault = home.path().join("vault.enc");

    cmd(home.path(), &vault)
        .args(["init", "--no-recovery"])
        .write_stdin("correct horse battery staple\ncorrect horse battery staple\n")
        .assert()
        .success();

    let create = cmd(home.path(), &vault)
        .args(["vault", "backup", "create", "--json"])
        .output()
        .expect("backup create output");
    assert!(create.status.success(), "{:?}", create);

    let info = cmd(home.path(), &vault)
        .args(["vault", "backup", "info", "--json"])
        .output()
        .expect("backup info output");
    assert!(info.status.success());
    let json: Value = serde_json::from_str(&String::from_utf8_lossy(&info.stdout)).expect("valid json");
    let backups = json.get("backups").and_then(Value::as_array).expect("backups array");
    assert!(!backups.is_empty(), "expected at least one backup listed");
}

#[test]
fn vault_remove_deletes_the_vault_file() {
    let home = tempfile::tempdir().expect("temp home");
    let vault = home.path().join("vault.enc");

    cmd(home.path(), &vault)
        .args(["init", "--no-recovery"])
        .write_stdin("correct horse battery staple\ncorrect horse battery staple\n")
        .assert()
        .success();
    assert!(vault.exists());

    cmd(home.path(), &vault)
        .args(["vault", "remove", "--yes"])
        .assert()
        .success();

    assert!(!vault.exists(), "vault file should be gone after removal");
}
