//! Unit tests for manifest rendering, parsing and writing

use super::*;
use camino::Utf8PathBuf;
use tempfile::TempDir;

fn identity(name: &str, registry: &Arc<Registry>) -> PackageIdentity {
    PackageIdentity::new(name, Arc::clone(registry)).unwrap()
}

fn sample() -> Manifest {
    let pypi = Arc::new(Registry::default_index());
    let corp = Arc::new(
        Registry::new("corp", "https://pkgs.corp.example/simple")
            .with_uuid(Uuid::parse_str("6f1c2a7e-9a53-4c1e-8d0e-2b7f5e3c9a11").unwrap()),
    );
    let requests = identity("requests", &pypi);
    let internal = identity("internal-lib", &corp)
        .with_uuid(Some(Uuid::parse_str("5d2b8d0e-2c4f-4c3a-9b55-1f3e2d6a7c01").unwrap()));

    Manifest {
        tool_version: "lode 0.1.0".to_string(),
        python_version: ">=3.9".to_string(),
        project_hash: "sha256:1234".to_string(),
        dependencies: vec![
            ManifestEntry {
                identity: identity("idna", &pypi),
                version: "3.6".parse().unwrap(),
                content_hash: "sha256:aa".to_string(),
                direct: false,
                required_by: vec![requests.clone(), internal.clone()],
            },
            ManifestEntry {
                identity: requests,
                version: "2.31.0".parse().unwrap(),
                content_hash: "sha256:bb".to_string(),
                direct: true,
                required_by: Vec::new(),
            },
            ManifestEntry {
                identity: internal,
                version: "1.2.0".parse().unwrap(),
                content_hash: "sha256:cc".to_string(),
                direct: true,
                required_by: Vec::new(),
            },
        ],
    }
}

fn field_of(err: LodeError) -> String {
    match err {
        LodeError::InvalidManifest { field, .. } => field,
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_render_layout() {
    let rendered = render_manifest(&sample());
    assert!(rendered.starts_with("[python]\nversion = \">=3.9\"\n"));
    assert!(rendered.contains("[manifest]\nversion = \"1\"\ntool = \"lode 0.1.0\""));
    assert!(rendered.contains("[dependencies.registry]\nalias = \"pypi\""));
    let by = rendered.find("by = [{").unwrap();
    let first = rendered[by..].find("name = \"internal-lib\", registry = \"corp\"").unwrap();
    let second = rendered[by..].find("name = \"requests\", registry = \"pypi\"").unwrap();
    assert!(first < second);

    // Sorted by (name, registry alias)
    let idna = rendered.find("name = \"idna\"").unwrap();
    let internal = rendered.find("name = \"internal-lib\"\nuuid").unwrap();
    let requests = rendered.find("name = \"requests\"\nversion").unwrap();
    assert!(idna < internal && internal < requests);
}

#[test]
fn test_render_is_stable_under_input_order() {
    let manifest = sample();
    let mut shuffled = manifest.clone();
    shuffled.dependencies.reverse();
    shuffled.dependencies[2].required_by.reverse();
    assert_eq!(render_manifest(&manifest), render_manifest(&shuffled));
}

#[test]
fn test_parse_round_trip() {
    let manifest = sample();
    let parsed = parse_manifest(&render_manifest(&manifest), MANIFEST_FILE).unwrap();

    assert_eq!(parsed.python_version, ">=3.9");
    assert_eq!(parsed.project_hash, "sha256:1234");
    assert_eq!(parsed.len(), 3);

    let idna = &parsed.entries_named("idna")[0];
    assert!(!idna.direct);
    assert_eq!(idna.required_by.len(), 2);
    assert!(idna.required_by[0].uuid().is_some());
    assert_eq!(idna.required_by[1].name(), "requests");

    // Identities survive, including registry UUIDs
    for entry in &manifest.dependencies {
        assert_eq!(parsed.entry(&entry.identity).unwrap().version, entry.version);
    }
}

#[test]
fn test_empty_manifest() {
    let mut manifest = sample();
    manifest.dependencies.clear();
    let rendered = render_manifest(&manifest);
    assert!(!rendered.contains("[[dependencies]]"));
    assert!(parse_manifest(&rendered, MANIFEST_FILE).unwrap().is_empty());
}

#[test]
fn test_invalid_fields_are_named() {
    let rendered = render_manifest(&sample());

    let no_python = rendered.replace("[python]\nversion = \">=3.9\"\n", "");
    assert_eq!(
        field_of(parse_manifest(&no_python, MANIFEST_FILE).unwrap_err()),
        "python.version"
    );

    let future = rendered.replace("version = \"1\"", "version = \"9\"");
    assert_eq!(
        field_of(parse_manifest(&future, MANIFEST_FILE).unwrap_err()),
        "manifest.version"
    );

    let bad_version = rendered.replace("version = \"2.31.0\"", "version = \"two\"");
    assert_eq!(
        field_of(parse_manifest(&bad_version, MANIFEST_FILE).unwrap_err()),
        "dependencies[2].version"
    );

    let missing_hash = rendered.replace("hash = \"sha256:aa\"\n", "");
    assert_eq!(
        field_of(parse_manifest(&missing_hash, MANIFEST_FILE).unwrap_err()),
        "dependencies[0].hash"
    );

    let dangling = rendered.replace(
        "name = \"requests\", registry = \"pypi\"",
        "name = \"requests\", registry = \"elsewhere\"",
    );
    assert_eq!(
        field_of(parse_manifest(&dangling, MANIFEST_FILE).unwrap_err()),
        "dependencies[0].by[1]"
    );
}

#[tokio::test]
async fn test_write_replaces_atomically() {
    let dir = TempDir::new().unwrap();
    let path = Utf8PathBuf::try_from(dir.path().join(MANIFEST_FILE)).unwrap();
    assert!(read_manifest(&path).await.unwrap().is_none());

    std::fs::write(&path, "stale content").unwrap();
    let manifest = sample();
    write_manifest(&path, &manifest).unwrap();

    let first = std::fs::read_to_string(&path).unwrap();
    assert_eq!(first, render_manifest(&manifest));
    let loaded = read_manifest(&path).await.unwrap().unwrap();
    assert_eq!(loaded.len(), 3);

    write_manifest(&path, &manifest).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), first);

    // No temporary files left behind
    let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftovers, 1);
}
