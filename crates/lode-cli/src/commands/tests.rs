use std::collections::HashMap;
use std::time::Duration;

use camino::Utf8PathBuf;
use tempfile::TempDir;

use lode_config::{read_manifest, ProjectMetadata, MANIFEST_FILE, METADATA_FILE};
use lode_core::error::LodeError;
use lode_core::types::ProjectType;

use super::lock::{self, LockRequest};
use super::*;
use crate::output::OutputHandler;

const SNAPSHOT: &str = r#"{
  "registries": {
    "pypi": {
      "requests": {
        "2.30.0": {"dependencies": ["idna>=2.5", "urllib3<3,>=1.21"]},
        "2.31.0": {"dependencies": ["idna>=2.5", "urllib3<3,>=1.21"]}
      },
      "idna": {"3.4": {}, "3.6": {}},
      "urllib3": {"1.26.18": {}, "2.1.0": {}},
      "click": {"8.1.7": {}}
    },
    "corp": {
      "utils": {"1.0.0": {"dependencies": ["click>=8"]}}
    }
  }
}"#;

const METADATA: &str = r#"[project]
name = "demo"
version = "0.1.0"
requires-python = ">=3.9"
# pinned by the platform team
dependencies = ["requests>=2.30"]

[project.optional-dependencies]
cli = ["click>=8"]

[tool.lode.project]
type = "package"

[[tool.lode.registries]]
alias = "corp"
url = "https://pkgs.corp.example/simple"
"#;

struct Fixture {
    _dir: TempDir,
    root: Utf8PathBuf,
    ctx: CommandContext,
}

impl Fixture {
    fn new() -> Self {
        Self::with_metadata(Some(METADATA))
    }

    fn with_metadata(metadata: Option<&str>) -> Self {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let snapshot = root.join("snapshot.json");
        std::fs::write(&snapshot, SNAPSHOT).unwrap();
        if let Some(metadata) = metadata {
            std::fs::write(root.join(METADATA_FILE), metadata).unwrap();
        }

        let ctx = CommandContext {
            cwd: root.clone(),
            output: OutputHandler::new(),
            offline_index: Some(snapshot.into_std_path_buf()),
            env: HashMap::new(),
            home: Some(root.join("home")),
        };
        Self {
            _dir: dir,
            root,
            ctx,
        }
    }

    fn metadata(&self) -> String {
        std::fs::read_to_string(self.root.join(METADATA_FILE)).unwrap()
    }

    async fn manifest(&self) -> Option<lode_core::types::Manifest> {
        read_manifest(&self.root.join(MANIFEST_FILE)).await.unwrap()
    }
}

#[test]
fn test_suggest_similar_command() {
    assert_eq!(suggest_similar_command("lokc"), Some("lock".to_string()));
    assert_eq!(suggest_similar_command("stat"), Some("status".to_string()));
    assert_eq!(suggest_similar_command("registry"), None);
    assert_eq!(suggest_similar_command("xyzzy"), None);
}

#[test]
fn test_edit_distance() {
    assert_eq!(edit_distance("", "add"), 3);
    assert_eq!(edit_distance("lock", "lock"), 0);
    assert_eq!(edit_distance("kitten", "sitting"), 3);
}

#[tokio::test]
async fn test_unknown_command_is_an_error() {
    let fixture = Fixture::new();
    let result = dispatch_command(Commands::External(vec!["lokc".to_string()]), &fixture.ctx).await;
    assert!(matches!(result, Err(LodeError::Configuration { .. })));
}

#[tokio::test]
async fn test_init_writes_metadata_once() {
    let fixture = Fixture::with_metadata(None);
    init::execute(Some("fresh-app".to_string()), ProjectType::Application, &fixture.ctx)
        .await
        .unwrap();

    let written = fixture.metadata();
    let metadata = ProjectMetadata::parse(&written, METADATA_FILE).unwrap();
    assert_eq!(metadata.name, "fresh-app");
    assert!(written.contains("type = \"application\""));

    // A second init leaves the file alone
    init::execute(Some("other".to_string()), ProjectType::Package, &fixture.ctx)
        .await
        .unwrap();
    assert_eq!(fixture.metadata(), written);
}

#[tokio::test]
async fn test_init_rejects_invalid_name() {
    let fixture = Fixture::with_metadata(None);
    let result = init::execute(Some("not a name".to_string()), ProjectType::Package, &fixture.ctx).await;
    assert!(matches!(result, Err(LodeError::InvalidMetadata { .. })));
    assert!(!fixture.root.join(METADATA_FILE).exists());
}

#[tokio::test]
async fn test_lock_writes_manifest() {
    let fixture = Fixture::new();
    lock::execute(LockRequest::default(), &fixture.ctx).await.unwrap();

    let manifest = fixture.manifest().await.unwrap();
    let pins: Vec<String> = manifest
        .dependencies
        .iter()
        .map(|entry| format!("{} {}", entry.identity.label(), entry.version))
        .collect();
    assert_eq!(
        pins,
        vec!["idna@pypi 3.6", "requests@pypi 2.31.0", "urllib3@pypi 2.1.0"]
    );
    assert!(manifest.entries_named("click").is_empty());

    lock::check(&[], &fixture.ctx).await.unwrap();
}

#[tokio::test]
async fn test_lock_with_extra_group() {
    let fixture = Fixture::new();
    let request = LockRequest {
        extras: vec!["cli".to_string()],
        ..LockRequest::default()
    };
    lock::execute(request, &fixture.ctx).await.unwrap();
    let manifest = fixture.manifest().await.unwrap();
    assert_eq!(manifest.entries_named("click").len(), 1);

    let request = LockRequest {
        extras: vec!["gui".to_string()],
        ..LockRequest::default()
    };
    let result = lock::execute(request, &fixture.ctx).await;
    assert!(matches!(result, Err(LodeError::InvalidMetadata { .. })));
}

#[tokio::test]
async fn test_keep_locked_prefers_pinned_versions() {
    let fixture = Fixture::new();
    lock::execute(LockRequest::default(), &fixture.ctx).await.unwrap();

    // Pin an older urllib3 by hand, then re-lock keeping it
    let path = fixture.root.join(MANIFEST_FILE);
    let content = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, content.replace("\"2.1.0\"", "\"1.26.18\"")).unwrap();

    let request = LockRequest {
        keep_locked: true,
        timeout: Some(Duration::from_secs(30)),
        ..LockRequest::default()
    };
    lock::execute(request, &fixture.ctx).await.unwrap();
    let manifest = fixture.manifest().await.unwrap();
    let urllib3 = manifest.entries_named("urllib3");
    assert_eq!(urllib3[0].version.to_string(), "1.26.18");
}

#[tokio::test]
async fn test_check_reports_missing_and_stale_manifest() {
    let fixture = Fixture::new();
    assert!(matches!(
        lock::check(&[], &fixture.ctx).await,
        Err(LodeError::InvalidManifest { .. })
    ));

    lock::execute(LockRequest::default(), &fixture.ctx).await.unwrap();
    let narrowed = METADATA.replace("requests>=2.30", "requests>=2.31");
    std::fs::write(fixture.root.join(METADATA_FILE), narrowed).unwrap();

    match lock::check(&[], &fixture.ctx).await {
        Err(LodeError::InvalidManifest { field, .. }) => assert_eq!(field, "manifest.project-hash"),
        other => panic!("expected a stale manifest, got {:?}", other),
    }
}

#[tokio::test]
async fn test_check_compares_the_extra_selection() {
    let fixture = Fixture::new();
    let cli = vec!["cli".to_string()];
    let request = LockRequest {
        extras: cli.clone(),
        ..LockRequest::default()
    };
    lock::execute(request, &fixture.ctx).await.unwrap();

    lock::check(&cli, &fixture.ctx).await.unwrap();
    match lock::check(&[], &fixture.ctx).await {
        Err(LodeError::InvalidManifest { field, .. }) => assert_eq!(field, "manifest.project-hash"),
        other => panic!("expected a stale manifest, got {:?}", other),
    }
    assert!(matches!(
        lock::check(&["gui".to_string()], &fixture.ctx).await,
        Err(LodeError::InvalidMetadata { .. })
    ));

    // Locking without the group makes the plain check pass again
    lock::execute(LockRequest::default(), &fixture.ctx).await.unwrap();
    lock::check(&[], &fixture.ctx).await.unwrap();
    assert!(lock::check(&cli, &fixture.ctx).await.is_err());
}

#[tokio::test]
async fn test_check_command_uses_extra_flag() {
    let fixture = Fixture::new();
    let lock_with_cli = Commands::Lock {
        extras: vec!["cli".to_string()],
        keep_locked: false,
        timeout: None,
        check: false,
    };
    dispatch_command(lock_with_cli, &fixture.ctx).await.unwrap();

    let check_with_cli = Commands::Lock {
        extras: vec!["cli".to_string()],
        keep_locked: false,
        timeout: None,
        check: true,
    };
    dispatch_command(check_with_cli, &fixture.ctx).await.unwrap();

    let check_plain = Commands::Lock {
        extras: Vec::new(),
        keep_locked: false,
        timeout: None,
        check: true,
    };
    assert!(dispatch_command(check_plain, &fixture.ctx).await.is_err());
}

#[tokio::test]
async fn test_add_binds_to_private_registry() {
    let fixture = Fixture::new();
    add::execute("utils>=1".to_string(), Some("corp".to_string()), &fixture.ctx)
        .await
        .unwrap();

    let metadata = fixture.metadata();
    assert!(metadata.contains("# pinned by the platform team"));
    assert!(metadata.contains("utils>=1"));
    assert!(metadata.contains("utils = \"corp\""));

    let manifest = fixture.manifest().await.unwrap();
    let utils = manifest.entries_named("utils");
    assert_eq!(utils.len(), 1);
    assert_eq!(utils[0].identity.registry().alias, "corp");
    assert!(utils[0].direct);
    // click is bound to the default registry even when a corp package asks for it
    let click = manifest.entries_named("click");
    assert_eq!(click[0].identity.registry().alias, "pypi");
    assert_eq!(click[0].required_by[0].label(), "utils@corp");
}

#[tokio::test]
async fn test_failed_add_leaves_files_untouched() {
    let fixture = Fixture::new();
    lock::execute(LockRequest::default(), &fixture.ctx).await.unwrap();
    let metadata = fixture.metadata();
    let manifest = fixture.manifest().await;

    let result = add::execute("utils".to_string(), Some("nowhere".to_string()), &fixture.ctx).await;
    assert!(matches!(result, Err(LodeError::UnknownRegistry { .. })));

    // utils only exists on corp
    let result = add::execute("utils".to_string(), None, &fixture.ctx).await;
    assert!(matches!(result, Err(LodeError::PackageNotFound { .. })));

    assert_eq!(fixture.metadata(), metadata);
    assert_eq!(fixture.manifest().await, manifest);
}

#[tokio::test]
async fn test_remove_relocks() {
    let fixture = Fixture::new();
    add::execute("click".to_string(), None, &fixture.ctx).await.unwrap();
    assert_eq!(fixture.manifest().await.unwrap().entries_named("click").len(), 1);

    remove::execute("click".to_string(), &fixture.ctx).await.unwrap();
    assert!(!fixture.metadata().contains("\"click\""));
    assert!(fixture.manifest().await.unwrap().entries_named("click").is_empty());

    let result = remove::execute("click".to_string(), &fixture.ctx).await;
    assert!(matches!(result, Err(LodeError::InvalidMetadata { .. })));
}

#[tokio::test]
async fn test_status_without_and_with_manifest() {
    let fixture = Fixture::new();
    status::execute(None, None, false, &[], &fixture.ctx).await.unwrap();

    lock::execute(LockRequest::default(), &fixture.ctx).await.unwrap();
    status::execute(None, None, false, &[], &fixture.ctx).await.unwrap();
    status::execute(None, None, true, &[], &fixture.ctx).await.unwrap();
    status::execute(None, Some("idna".to_string()), false, &[], &fixture.ctx)
        .await
        .unwrap();
    status::execute(None, Some("missing".to_string()), true, &[], &fixture.ctx)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_status_for_another_environment() {
    let fixture = Fixture::new();
    let other = Fixture::with_metadata(None);
    let target = fixture.root.clone().into_std_path_buf();
    status::execute(Some(target), None, false, &[], &other.ctx).await.unwrap();

    let result = status::execute(None, None, false, &[], &other.ctx).await;
    assert!(matches!(result, Err(LodeError::Io { .. })));
}

#[tokio::test]
async fn test_registries_lists_layers() {
    let fixture = Fixture::new();
    registries::execute(&fixture.ctx).await.unwrap();

    let outside = Fixture::with_metadata(None);
    registries::execute(&outside.ctx).await.unwrap();
}

#[tokio::test]
async fn test_registries_rejects_unknown_default() {
    let mut fixture = Fixture::new();
    fixture
        .ctx
        .env
        .insert("LODE_DEFAULT_REGISTRY".to_string(), "nowhere".to_string());
    assert!(registries::execute(&fixture.ctx).await.is_err());
}

#[tokio::test]
async fn test_version_and_help() {
    let fixture = Fixture::new();
    dispatch_command(Commands::Version, &fixture.ctx).await.unwrap();
    show_help(&fixture.ctx);
}
