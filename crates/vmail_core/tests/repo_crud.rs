use vmail_core::db::open_db_in_memory;
use vmail_core::{
    AliasDraft, AliasRepository, ForwardingDraft, ForwardingRepository, RepoError,
    SqliteAliasRepository, SqliteForwardingRepository, NEVER_EXPIRES,
};

fn alias_draft(address: &str) -> AliasDraft {
    AliasDraft {
        address: address.to_string(),
        name: "foo".to_string(),
        domain: "bar.baz".to_string(),
        expired: NEVER_EXPIRES.to_string(),
        active: true,
    }
}

fn forwarding_draft(dest: &str, is_alias: bool) -> ForwardingDraft {
    ForwardingDraft {
        address: "foo@bar.baz".to_string(),
        forwarding: dest.to_string(),
        domain: "bar.baz".to_string(),
        dest_domain: "bar.baz".to_string(),
        is_alias,
        active: true,
    }
}

#[test]
fn alias_create_sets_database_timestamps() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteAliasRepository::new(&conn);

    repo.create_alias(&alias_draft("foo@bar.baz")).unwrap();

    let loaded = repo.get_alias("foo@bar.baz").unwrap().unwrap();
    assert_eq!(loaded.name, "foo");
    assert_eq!(loaded.domain, "bar.baz");
    assert_eq!(loaded.accesspolicy, "");
    assert!(loaded.never_expires());
    assert!(loaded.active);
    assert_eq!(loaded.created.len(), "YYYY-MM-DD HH:MM:SS".len());
    assert_eq!(loaded.created, loaded.modified);
}

#[test]
fn alias_lookup_ignores_case() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteAliasRepository::new(&conn);

    repo.create_alias(&alias_draft("Foo@Bar.baz")).unwrap();

    let loaded = repo.get_alias("foo@bar.BAZ").unwrap().unwrap();
    assert_eq!(loaded.address, "Foo@Bar.baz");
}

#[test]
fn alias_update_and_delete_report_affected_rows() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteAliasRepository::new(&conn);

    let mut draft = alias_draft("foo@bar.baz");
    assert_eq!(repo.update_alias(&draft).unwrap(), 0);

    repo.create_alias(&draft).unwrap();
    draft.name = "Foo Bar".to_string();
    draft.active = false;
    assert_eq!(repo.update_alias(&draft).unwrap(), 1);

    let loaded = repo.get_alias("foo@bar.baz").unwrap().unwrap();
    assert_eq!(loaded.name, "Foo Bar");
    assert!(!loaded.active);

    assert_eq!(repo.delete_alias("foo@bar.baz").unwrap(), 1);
    assert_eq!(repo.delete_alias("foo@bar.baz").unwrap(), 0);
    assert!(repo.get_alias("foo@bar.baz").unwrap().is_none());
}

#[test]
fn forwarding_create_writes_complementary_flags() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteForwardingRepository::new(&conn);

    repo.create_forwarding(&forwarding_draft("boo@bar.baz", false))
        .unwrap();

    let loaded = repo
        .get_forwarding("foo@bar.baz", "boo@bar.baz")
        .unwrap()
        .unwrap();
    assert!(!loaded.is_alias);
    assert!(loaded.is_forwarding);
    assert!(!loaded.is_list);
    assert!(!loaded.is_maillist);
    assert!(loaded.id > 0);
}

#[test]
fn forwarding_update_rewrites_flags_for_pair_only() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteForwardingRepository::new(&conn);

    repo.create_forwarding(&forwarding_draft("boo@bar.baz", false))
        .unwrap();
    repo.create_forwarding(&forwarding_draft("zoo@bar.baz", false))
        .unwrap();

    assert_eq!(
        repo.update_forwarding(&forwarding_draft("boo@bar.baz", true))
            .unwrap(),
        1
    );

    let updated = repo
        .get_forwarding("foo@bar.baz", "boo@bar.baz")
        .unwrap()
        .unwrap();
    assert!(updated.is_alias);
    assert!(!updated.is_forwarding);

    let untouched = repo
        .get_forwarding("foo@bar.baz", "zoo@bar.baz")
        .unwrap()
        .unwrap();
    assert!(untouched.is_forwarding);
}

#[test]
fn forwarding_deletes_by_pair_and_by_source() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteForwardingRepository::new(&conn);

    for dest in ["a@bar.baz", "b@bar.baz", "c@bar.baz"] {
        repo.create_forwarding(&forwarding_draft(dest, true)).unwrap();
    }

    assert_eq!(repo.delete_forwarding("foo@bar.baz", "a@bar.baz").unwrap(), 1);
    assert_eq!(repo.delete_forwarding("foo@bar.baz", "a@bar.baz").unwrap(), 0);
    assert_eq!(repo.delete_forwardings_from("foo@bar.baz").unwrap(), 2);
    assert_eq!(repo.delete_forwardings_from("foo@bar.baz").unwrap(), 0);
}

#[test]
fn invalid_persisted_boolean_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO forwardings (address, forwarding, is_alias) VALUES ('foo@bar.baz', 'boo@bar.baz', 7);",
        [],
    )
    .unwrap();

    let repo = SqliteForwardingRepository::new(&conn);
    let err = repo
        .get_forwarding("foo@bar.baz", "boo@bar.baz")
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(message) if message.contains("forwardings.is_alias")));
}
