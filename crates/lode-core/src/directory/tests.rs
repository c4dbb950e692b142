//! Unit tests for the registry directory

use super::*;

fn corp_uuid() -> Uuid {
    Uuid::parse_str("6f1c2a7e-9a53-4c1e-8d0e-2b7f5e3c9a11").unwrap()
}

fn directory() -> RegistryDirectory {
    RegistryDirectory::new(
        vec![
            Registry::default_index(),
            Registry::new("corp", "https://pkgs.corp.example/simple/")
                .private()
                .with_uuid(corp_uuid()),
            Registry::new("mirror", "https://mirror.example/simple"),
        ],
        "pypi",
    )
    .unwrap()
}

#[test]
fn test_with_defaults_has_public_index() {
    let directory = RegistryDirectory::with_defaults();
    assert_eq!(directory.len(), 1);
    assert_eq!(directory.default_registry().alias, "pypi");
    assert_eq!(directory.default_registry().url, "https://pypi.org/simple");
}

#[test]
fn test_lookup_by_each_key() {
    let directory = directory();

    let by_alias = directory.resolve(&RegistryRef::Alias("corp".into())).unwrap();
    let by_url = directory
        .resolve(&RegistryRef::Url("https://pkgs.corp.example/simple".into()))
        .unwrap();
    let by_uuid = directory.resolve(&RegistryRef::Uuid(corp_uuid())).unwrap();

    assert_eq!(by_alias, by_url);
    assert_eq!(by_url, by_uuid);
    assert!(by_alias.private);
}

#[test]
fn test_url_lookup_ignores_trailing_slash() {
    let directory = directory();
    let registry = directory
        .resolve(&RegistryRef::Url("https://mirror.example/simple/".into()))
        .unwrap();
    assert_eq!(registry.alias, "mirror");
}

#[test]
fn test_unknown_reference() {
    let directory = directory();
    let err = directory
        .resolve(&RegistryRef::Alias("nowhere".into()))
        .unwrap_err();
    match err {
        LodeError::UnknownRegistry { reference } => assert_eq!(reference, "nowhere"),
        other => panic!("unexpected error: {other:?}"),
    }

    let err = directory.resolve(&RegistryRef::Uuid(Uuid::new_v4())).unwrap_err();
    assert!(matches!(err, LodeError::UnknownRegistry { .. }));
}

#[test]
fn test_duplicate_alias_is_ambiguous() {
    let directory = RegistryDirectory::new(
        vec![
            Registry::default_index(),
            Registry::new("corp", "https://a.example/simple"),
            Registry::new("corp", "https://b.example/simple"),
        ],
        "pypi",
    )
    .unwrap();

    let err = directory.resolve(&RegistryRef::Alias("corp".into())).unwrap_err();
    match err {
        LodeError::AmbiguousReference {
            reference,
            candidates,
        } => {
            assert_eq!(reference, "corp");
            assert_eq!(candidates, 2);
        },
        other => panic!("unexpected error: {other:?}"),
    }

    // A URL still picks one of them out
    let registry = directory
        .resolve(&RegistryRef::Url("https://b.example/simple".into()))
        .unwrap();
    assert_eq!(registry.url, "https://b.example/simple");
}

#[test]
fn test_uuid_takes_precedence_over_alias() {
    let directory = directory();
    let lookup = RegistryLookup {
        alias: Some("pypi".into()),
        url: None,
        uuid: Some(corp_uuid()),
    };
    let registry = directory.lookup(&lookup).unwrap();
    assert_eq!(registry.alias, "corp");
}

#[test]
fn test_url_takes_precedence_over_alias() {
    let directory = directory();
    let lookup = RegistryLookup {
        alias: Some("pypi".into()),
        url: Some("https://mirror.example/simple".into()),
        uuid: None,
    };
    assert_eq!(directory.lookup(&lookup).unwrap().alias, "mirror");
}

#[test]
fn test_contradicting_keys_are_rejected() {
    let directory = directory();
    let lookup = RegistryLookup {
        alias: None,
        url: Some("https://mirror.example/simple".into()),
        uuid: Some(corp_uuid()),
    };
    let err = directory.lookup(&lookup).unwrap_err();
    assert!(matches!(err, LodeError::UnknownRegistry { .. }));
}

#[test]
fn test_empty_lookup_is_configuration_error() {
    let directory = directory();
    let err = directory.lookup(&RegistryLookup::default()).unwrap_err();
    assert!(matches!(err, LodeError::Configuration { .. }));
}

#[test]
fn test_construction_validation() {
    let err = RegistryDirectory::new(vec![Registry::new("  ", "https://x.example")], "pypi")
        .unwrap_err();
    match err {
        LodeError::Configuration { field, .. } => assert_eq!(field, "registries[0].alias"),
        other => panic!("unexpected error: {other:?}"),
    }

    let err = RegistryDirectory::new(
        vec![Registry::default_index(), Registry::new("bad", "not a url")],
        "pypi",
    )
    .unwrap_err();
    match err {
        LodeError::Configuration { field, .. } => assert_eq!(field, "registries[1].url"),
        other => panic!("unexpected error: {other:?}"),
    }

    let uuid = Uuid::new_v4();
    let err = RegistryDirectory::new(
        vec![
            Registry::default_index().with_uuid(uuid),
            Registry::new("corp", "https://corp.example/simple").with_uuid(uuid),
        ],
        "pypi",
    )
    .unwrap_err();
    assert!(matches!(err, LodeError::Configuration { .. }));

    let err = RegistryDirectory::new(vec![Registry::default_index()], "corp").unwrap_err();
    match err {
        LodeError::Configuration { field, .. } => assert_eq!(field, "default"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_default_can_be_replaced() {
    let directory = RegistryDirectory::new(
        vec![
            Registry::default_index(),
            Registry::new("corp", "https://corp.example/simple"),
        ],
        "corp",
    )
    .unwrap();
    assert_eq!(directory.default_registry().alias, "corp");
    assert!(directory.by_uuid(Uuid::new_v4()).is_none());
}
