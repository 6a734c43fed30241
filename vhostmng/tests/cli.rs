use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const SITE: &str = "server {\n    listen 80;\n    server_name example.com;\n}\n";

fn server_root() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("sites-enabled")).unwrap();
    fs::write(
        dir.path().join("nginx.conf"),
        "http {\n    include sites-enabled/*.conf;\n}\n",
    )
    .unwrap();
    fs::write(dir.path().join("sites-enabled/example.conf"), SITE).unwrap();
    fs::write(
        dir.path().join("settings.toml"),
        format!("server_root = {:?}\n", dir.path().to_string_lossy()),
    )
    .unwrap();
    dir
}

fn vhostmng(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_vhostmng"))
        .arg("--settings")
        .arg(dir.join("settings.toml"))
        .args(args)
        .output()
        .expect("Failed to run vhostmng")
}

#[test]
fn test_hosts_json() {
    let dir = server_root();
    let output = vhostmng(dir.path(), &["hosts", "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let hosts: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let hosts = hosts.as_array().unwrap();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0]["server_name"], "example.com");
    assert_eq!(hosts[0]["ssl"], false);
    assert_eq!(hosts[0]["enabled"], true);
}

#[test]
fn test_hosts_filter_by_name() {
    let dir = server_root();
    let output = vhostmng(dir.path(), &["hosts", "--server-name", "other.com"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No virtual hosts found"));
}

#[test]
fn test_lint() {
    let dir = server_root();
    let good = vhostmng(dir.path(), &["lint", &dir.path().join("nginx.conf").to_string_lossy()]);
    assert!(good.status.success());

    let broken = dir.path().join("broken.conf");
    fs::write(&broken, "server {\n    listen 80;\n").unwrap();
    let bad = vhostmng(dir.path(), &["lint", &broken.to_string_lossy()]);
    assert!(!bad.status.success());
    assert!(String::from_utf8_lossy(&bad.stderr).contains("broken.conf"));
}

#[cfg(unix)]
#[test]
fn test_deploy_certificate() {
    use std::os::unix::fs::PermissionsExt;

    let dir = server_root();
    let bin = dir.path().join("fake-nginx");
    fs::write(&bin, "#!/bin/sh\necho \"$@\" >> \"$(dirname \"$0\")/calls\"\n").unwrap();
    fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();

    let output = vhostmng(
        dir.path(),
        &[
            "--control-bin",
            &bin.to_string_lossy(),
            "deploy-certificate",
            "--server-name",
            "example.com",
            "--fullchain",
            "/tls/fullchain.pem",
            "--key",
            "/tls/key.pem",
            "--strategy",
            "clone",
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let cloned = fs::read_to_string(dir.path().join("sites-enabled/example-ssl.conf")).unwrap();
    assert!(cloned.contains("listen 443 ssl;"));
    assert!(cloned.contains("ssl_certificate /tls/fullchain.pem;"));
    assert_eq!(fs::read_to_string(dir.path().join("sites-enabled/example.conf")).unwrap(), SITE);
    assert_eq!(fs::read_to_string(dir.path().join("calls")).unwrap(), "-t\n-s reload\n");
}
