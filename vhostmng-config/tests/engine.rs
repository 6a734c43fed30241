use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use vhostmng_config::{
    dump, get_hosts, get_hosts_by_server_name, make_tls_clone, parse, ConfigStore, DirectiveSpec,
};
use vhostmng_core::{backup_path, HostSwitch, Reverter, Settings};

#[derive(Default)]
struct RecordingSwitch {
    disabled: Mutex<Vec<PathBuf>>,
}

impl HostSwitch for RecordingSwitch {
    fn enable(&self, _path: &Path) -> vhostmng_core::Result<bool> {
        Ok(true)
    }

    fn disable(&self, path: &Path) -> vhostmng_core::Result<()> {
        self.disabled.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

fn server_root(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    dir
}

const SITE: &str = "\
server {
    listen 80;
    listen [::]:80;
    server_name example.com www.example.com;
    root /var/www/example;

    rewritecond $scheme http;
    rewrite ^ https://$host$request_uri permanent;

    rewrite ^/old http://example.com/new;
}
";

#[test]
fn test_round_trip_corpus() {
    let inputs = [
        "",
        "\n\n",
        "user www-data;\nworker_processes auto;\n",
        "# leading comment\nhttp {\n\tinclude mime.types; # trailing\n\n\n\tserver {\n\t\tlisten 80;\n\t}\n}\n",
        "server {\r\n    listen 80;\r\n    root \"/srv/my site\";\r\n}\r\n",
        "log_format main '$remote_addr - $remote_user'\n                 '\"$request\" $status';\n",
        "location ~* \\.(png|jpg)$ {\n    expires 30d;\n}",
        "server{listen 80;server_name a;}",
        "if ($host = 'a') { return 301 https://$host$request_uri; }\n",
        "map $http_upgrade $connection_upgrade {\n    default upgrade;\n    websocket  '';\n}\n",
        "server {\n    listen 80 # port\n    ;\n}\n",
        "   \t  indented;\n  # end",
    ];

    for input in inputs {
        let config = parse(input).unwrap_or_else(|e| panic!("{:?}: {}", input, e));
        assert_eq!(dump(&config), input);
    }
}

#[test]
fn test_parse_is_idempotent() {
    let dir = server_root(&[("nginx.conf", "include sites/*;\n"), ("sites/a", SITE)]);
    let mut store = ConfigStore::open(Settings::nginx(dir.path())).unwrap();
    let before: Vec<String> = store.files().map(dump).collect();

    let pattern = dir.path().join("sites/*");
    assert!(store.parse_files_by_path(&pattern.to_string_lossy(), false).is_empty());
    let after: Vec<String> = store.files().map(dump).collect();
    assert_eq!(before, after);
    assert!(store.changed_files().is_empty());
}

#[test]
fn test_tls_clone_keeps_source_and_suppresses_loops() {
    let dir = server_root(&[
        ("nginx.conf", "http {\n    include sites-enabled/*;\n}\n"),
        ("sites-enabled/example.conf", SITE),
    ]);
    let mut store = ConfigStore::open(Settings::nginx(dir.path())).unwrap();
    let mut reverter = Reverter::new(Arc::new(RecordingSwitch::default()));

    let vhost = get_hosts_by_server_name(&store, "www.example.com").remove(0);
    let clone = make_tls_clone(&mut store, &mut reverter, &vhost).unwrap();
    assert!(clone.suppressed_rewrites);
    store.dump().unwrap();

    let cloned = fs::read_to_string(dir.path().join("sites-enabled/example-ssl.conf")).unwrap();
    assert!(cloned.contains("\n\n#     rewritecond $scheme http;"));
    assert!(cloned.contains("#     rewrite ^ https://$host$request_uri permanent;"));
    assert!(cloned.contains("\n    rewrite ^/old http://example.com/new;"));
    assert!(cloned.contains("listen 443 ssl;"));
    assert!(cloned.contains("listen [::]:443 ssl;"));
    assert!(!cloned.contains("listen 80"));

    assert_eq!(fs::read_to_string(dir.path().join("sites-enabled/example.conf")).unwrap(), SITE);

    // The TLS host now shadows the plaintext one on the same addresses
    store.parse();
    let hosts = get_hosts_by_server_name(&store, "example.com");
    assert!(hosts[0].host.ssl);
}

#[test]
fn test_rollback_restores_original_bytes() {
    let dir = server_root(&[("nginx.conf", "http {\n    include sites/*.conf;\n}\n"), ("sites/a.conf", SITE)]);
    let site = dir.path().join("sites/a.conf");

    let mut store = ConfigStore::open(Settings::nginx(dir.path())).unwrap();
    let switch = Arc::new(RecordingSwitch::default());
    let mut reverter = Reverter::new(switch.clone());

    let vhost = get_hosts(&store).remove(0);
    store
        .add_directives(
            &vhost.locator,
            &[DirectiveSpec::new("ssl_certificate", &["/etc/tls/fullchain.pem"])],
            false,
        )
        .unwrap();
    reverter.backup_files(&store.changed_files()).unwrap();

    let clone = make_tls_clone(&mut store, &mut reverter, &vhost).unwrap();
    reverter.add_host_config_to_disable(&clone.vhost.host.file_path).unwrap();
    store.dump().unwrap();
    assert_ne!(fs::read_to_string(&site).unwrap(), SITE);

    // The server rejected the new configuration
    reverter.rollback().unwrap();

    assert_eq!(fs::read_to_string(&site).unwrap(), SITE);
    assert!(!backup_path(&site).exists());
    assert!(!dir.path().join("sites/a-ssl.conf").exists());
    assert_eq!(*switch.disabled.lock().unwrap(), vec![dir.path().join("sites/a-ssl.conf")]);
}

#[test]
fn test_commit_removes_backups() {
    let dir = server_root(&[("nginx.conf", "server {\n    listen 80;\n}\n")]);
    let root = dir.path().join("nginx.conf");

    let mut store = ConfigStore::open(Settings::nginx(dir.path())).unwrap();
    let mut reverter = Reverter::new(Arc::new(RecordingSwitch::default()));
    let vhost = get_hosts(&store).remove(0);

    reverter.backup_file(&root).unwrap();
    store
        .update_or_add_directives(&vhost.locator, &[DirectiveSpec::new("server_name", &["a.com"])], true)
        .unwrap();
    store.dump().unwrap();
    reverter.commit().unwrap();

    assert!(!backup_path(&root).exists());
    assert_eq!(
        fs::read_to_string(&root).unwrap(),
        "server {\n    server_name a.com;\n    listen 80;\n}\n"
    );
}
