//! Conditional-write behaviour of the catalog over a shared backend.

use cinedex_core::{
    Accounts, AccountsConfig, Catalog, CatalogConfig, CoreError, CredentialStore, Movie,
    MoviePatch, RecordStore, Runtime, StoreError,
};
use cinedex_storage::MemoryBackend;
use std::sync::Arc;

fn heat() -> Movie {
    Movie::new("Heat", 1995, Runtime(170), vec!["crime".into(), "drama".into()])
}

async fn catalog_with_movie() -> (Catalog, Arc<MemoryBackend>, i64) {
    let backend = Arc::new(MemoryBackend::new());
    let catalog = Catalog::new(backend.clone(), CatalogConfig::default());
    let movie = catalog.create(heat()).await.unwrap();
    (catalog, backend, movie.id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_writers_from_same_version_exactly_one_wins() {
    let (catalog, _, id) = catalog_with_movie().await;
    let base = catalog.get(id).await.unwrap();
    assert_eq!(base.version, 1);

    let mut handles = Vec::new();
    for year in 1990..2000 {
        let catalog = catalog.clone();
        let mut copy = base.clone();
        handles.push(tokio::spawn(async move {
            copy.year = year;
            catalog.update(&mut copy).await
        }));
    }

    let mut wins = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(version) => {
                assert_eq!(version, 2);
                wins += 1;
            }
            Err(StoreError::EditConflict) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(wins, 1);
    assert_eq!(conflicts, 9);
    assert_eq!(catalog.get(id).await.unwrap().version, 2);
}

#[tokio::test]
async fn version_three_scenario() {
    let (catalog, _, id) = catalog_with_movie().await;

    // Bring the record to version 3.
    for _ in 0..2 {
        let mut m = catalog.get(id).await.unwrap();
        catalog.update(&mut m).await.unwrap();
    }

    let mut a = catalog.get(id).await.unwrap();
    let mut b = catalog.get(id).await.unwrap();
    assert_eq!(a.version, 3);

    a.title = "Heat (Director's Cut)".into();
    assert_eq!(catalog.update(&mut a).await.unwrap(), 4);

    b.runtime = Runtime(171);
    assert!(matches!(
        catalog.update(&mut b).await,
        Err(StoreError::EditConflict)
    ));

    let stored = catalog.get(id).await.unwrap();
    assert_eq!(stored.version, 4);
    assert_eq!(stored.title, "Heat (Director's Cut)");
    assert_eq!(stored.runtime, Runtime(170));
}

#[tokio::test]
async fn non_positive_ids_are_not_found() {
    let (catalog, _, _) = catalog_with_movie().await;
    for id in [0, -1, i64::MIN] {
        assert!(matches!(catalog.get(id).await, Err(StoreError::NotFound)));
        assert!(matches!(catalog.delete(id).await, Err(StoreError::NotFound)));
    }
}

#[tokio::test]
async fn patch_with_matching_expected_version_succeeds() {
    let (catalog, _, id) = catalog_with_movie().await;
    let patched = catalog
        .patch(
            id,
            Some(1),
            MoviePatch {
                year: Some(1996),
                ..MoviePatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(patched.version, 2);
    assert_eq!(patched.year, 1996);

    let err = catalog
        .patch(id, Some(1), MoviePatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Store(StoreError::EditConflict)));
}

#[tokio::test]
async fn deleted_record_update_is_conflict() {
    let (catalog, backend, id) = catalog_with_movie().await;
    let mut m = catalog.get(id).await.unwrap();
    backend.delete(id).await.unwrap();
    assert!(matches!(
        catalog.update(&mut m).await,
        Err(StoreError::EditConflict)
    ));
}

#[tokio::test]
async fn offline_backend_surfaces_transient_error() {
    let (catalog, backend, id) = catalog_with_movie().await;
    backend.set_offline(true);
    let err = catalog.get(id).await.unwrap_err();
    assert!(err.is_transient());
}

fn accounts(backend: Arc<MemoryBackend>) -> Accounts {
    Accounts::new(backend, AccountsConfig::default().with_password_cost(4))
}

#[tokio::test]
async fn register_activate_authenticate() {
    let backend = Arc::new(MemoryBackend::new());
    let accounts = accounts(backend.clone());

    let (user, activation) = accounts
        .register("Alice Smith", "alice@example.com", "pa55word123")
        .await
        .unwrap();
    assert!(!user.activated);
    assert_eq!(user.version, 1);

    let activated = accounts.activate(&activation.plaintext).await.unwrap();
    assert!(activated.activated);
    assert_eq!(activated.version, 2);

    // The activation token is single-use.
    let err = accounts.activate(&activation.plaintext).await.unwrap_err();
    match err {
        CoreError::Invalid(errors) => {
            assert_eq!(errors.get("token"), Some("invalid or expired activation token"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let token = accounts
        .authenticate("alice@example.com", "pa55word123")
        .await
        .unwrap();
    let owner = accounts
        .user_for_token(cinedex_core::TokenScope::Authentication, &token.plaintext)
        .await
        .unwrap();
    assert_eq!(owner.id, user.id);
    assert!(owner.activated);
}

#[tokio::test]
async fn duplicate_registration_is_a_validation_error() {
    let backend = Arc::new(MemoryBackend::new());
    let accounts = accounts(backend);

    accounts
        .register("Alice Smith", "alice@example.com", "pa55word123")
        .await
        .unwrap();
    let err = accounts
        .register("Alice Again", "alice@example.com", "pa55word456")
        .await
        .unwrap_err();
    match err {
        CoreError::Invalid(errors) => assert_eq!(
            errors.get("email"),
            Some("a user with this email address already exists")
        ),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn wrong_password_is_invalid_credentials() {
    let backend = Arc::new(MemoryBackend::new());
    let accounts = accounts(backend);
    accounts
        .register("Alice Smith", "alice@example.com", "pa55word123")
        .await
        .unwrap();

    assert!(matches!(
        accounts.authenticate("alice@example.com", "wrong-password").await,
        Err(CoreError::InvalidCredentials)
    ));
    assert!(matches!(
        accounts.authenticate("nobody@example.com", "pa55word123").await,
        Err(CoreError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn concurrent_user_update_conflicts() {
    let backend = Arc::new(MemoryBackend::new());
    let accounts = accounts(backend.clone());
    let (user, _) = accounts
        .register("Alice Smith", "alice@example.com", "pa55word123")
        .await
        .unwrap();

    let mut first = backend.user_by_email("alice@example.com").await.unwrap();
    let mut second = first.clone();
    first.name = "Alice B. Smith".into();
    backend.update_user(&mut first).await.unwrap();

    second.activated = true;
    assert!(matches!(
        backend.update_user(&mut second).await,
        Err(StoreError::EditConflict)
    ));
    assert_eq!(first.id, user.id);
}
