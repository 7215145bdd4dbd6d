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
fn init_add_get_list_update_delete_roundtrip() {
    let home = tempfile::tempdir().expect("temp home");
    let vault = home.path().join("vault.enc");

    let init = cmd(home.path(), &vault)
        .args(["init", "--no-recovery", "--json"])
        .write_stdin("correct horse battery staple\ncorrect horse battery staple\n")
        .output()
        .expect("init output");
    assert!(init.status.success(), "{:?}", init);
    assert!(vault.exists(), "vault file created");

    let add = cmd(home.path(), &vault)
        .args(["add", "github"])
        .write_stdin("correct horse battery staple\noctocat\nsecret-token\n\n\n\n")
        .output()
        .expect("add output");
    assert!(add.status.success(), "{:?}", add);

    let get = cmd(home.path(), &vault)
        .args(["get", "github", "--json"])
        .write_stdin("correct horse battery staple\n")
        .output()
        .expect("get output");
    assert!(get.status.success(), "{:?}", get);
    let json: Value = serde_json::from_str(&String::from_utf8_lossy(&get.stdout)).expect("valid json");
    assert_eq!(json.get("username").and_then(Value::as_str), Some("octocat"));
    assert_eq!(json.get("password").and_then(Value::as_str), Some("secret-token"));

    let list = cmd(home.path(), &vault)
        .args(["list", "--json"])
        .write_stdin("correct horse battery staple\n")
        .output()
        .expect("list output");
    assert!(list.status.success(), "{:?}", list);
    let json: Value = serde_json::from_str(&String::from_utf8_lossy(&list.stdout)).expect("valid json");
    assert_eq!(
        json.get("services").and_then(Value::as_array).map(|a| a.len()),
        Some(1)
    );

    // update (no prior usage, so no confirmation prompt is needed)
    let update = cmd(home.path(), &vault)
        .args(["update", "github"])
        .write_stdin("correct horse battery staple\n\nN\n\n\n\n")
        .output()
        .expect("update output");
    assert!(update.status.success(), "{:?}", update);

    let delete = cmd(home.path(), &vault)
        .args(["delete", "github", "--force"])
        .write_stdin("correct horse battery staple\n")
        .output()
        .expect("delete output");
    assert!(delete.status.success(), "{:?}", delete);

    let list_after = cmd(home.path(), &vault)
        .args(["list", "--json"])
        .write_stdin("correct horse battery staple\n")
        .output()
        .expect("list output");
    assert!(list_after.status.success());
    let json: Value = serde_json::from_str(&String::from_utf8_lossy(&list_after.stdout)).expect("valid json");
    assert_eq!(
        json.get("services").and_then(Value::as_array).map(|a| a.len()),
        Some(0)
    );
}

#[test]
fn get_field_flag_restricts_output() {
    let home = tempfile::tempdir().expect("temp home");
    let vault = home.path().join("vault.enc");

    cmd(home.path(), &vault)
        .args(["init", "--no-recovery"])
        .write_stdin("correct horse battery staple\ncorrect horse battery staple\n")
        .assert()
        .success();

    cmd(home.path(), &vault)
        .args(["add", "gitlab"])
        .write_stdin("correct horse battery staple\nalice\nhunter2\n\n\n\n")
        .assert()
        .success();

    let get = cmd(home.path(), &vault)
        .args(["get", "gitlab", "--field", "password", "--json"])
        .write_stdin("correct horse battery staple\n")
        .output()
        .expect("get output");
    assert!(get.status.success());
    let json: Value = serde_json::from_str(&String::from_utf8_lossy(&get.stdout)).expect("valid json");
    assert_eq!(json.get("password").and_then(Value::as_str), Some("hunter2"));
}

#[test]
fn change_password_then_unlock_with_new_password() {
    let home = tempfile::tempdir().expect("temp home");
    let vault = home.path().join("vault.enc");

    cmd(home.path(), &vault)
        .args(["init", "--no-recovery"])
        .write_stdin("correct horse battery staple\ncorrect horse battery staple\n")
        .assert()
        .success();

    cmd(home.path(), &vault)
        .args(["change-password"])
        .write_stdin("correct horse battery staple\nnew password entirely\nnew password entirely\n")
        .assert()
        .success();

    cmd(home.path(), &vault)
        .args(["list"])
        .write_stdin("new password entirely\n")
        .assert()
        .success();
}
